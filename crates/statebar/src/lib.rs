#![forbid(unsafe_code)]

//! statebar public facade crate.
//!
//! Re-exports the reactive core, the runtime and the widget view models,
//! and hosts the `statebar` command-line runner.

pub mod cli;
pub mod error;
pub mod logging;
pub mod run;
pub mod util;

pub use cli::{run, run_from_env};
pub use error::{CliError, Result};

pub mod prelude {
    pub use statebar_reactive as reactive;
    pub use statebar_runtime as runtime;
    pub use statebar_widgets as widgets;

    pub use statebar_reactive::{Binding, Observable, Subscription, batch, bind, bind2, bind3};
    pub use statebar_runtime::{Cx, InFlight, Poll, Runtime, Task};
    pub use statebar_widgets::{Bar, BarConfig, BarContext, Segment};
}
