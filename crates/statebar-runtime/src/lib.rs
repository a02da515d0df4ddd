#![forbid(unsafe_code)]

//! Worker plumbing for statebar: pollers, one-shot tasks and the UI-thread
//! runtime that marshals their results into reactive cells.
//!
//! # Threading model
//!
//! The reactive graph (`statebar-reactive`) lives on one thread. Producers
//! and task operations run on worker threads under a cancellable [`Cx`];
//! their results travel through [`Inlet`]s and are applied on the owning
//! thread by [`Runtime::run_pending`] and friends.
//!
//! # Failure containment
//!
//! Producer and task errors (and panics) are caught at the tick or task
//! boundary and surface as a [`Fault`] to optional hooks. Scheduling
//! continues; nothing unwinds into a cell read or write.

pub mod cx;
pub mod error;
pub mod poller;
pub mod runtime;
pub mod schedule;
pub mod shell;
pub mod task;

pub use cx::{Cancelled, Cx, CxController};
pub use error::{Fault, Result, RuntimeError};
pub use poller::{Poll, PollerHandle, PollerStats};
pub use runtime::{Inlet, Runtime};
pub use schedule::TickSchedule;
pub use shell::{CommandOutput, CommandRunner, SharedRunner, ShellError, ShellRunner, shell_quote};
pub use task::{InFlight, InFlightGuard, Task, TaskHandle, TaskState};
