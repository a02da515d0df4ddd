#![forbid(unsafe_code)]

//! Reactive state propagation for statebar.
//!
//! This crate provides the change-tracking primitives every bar widget is
//! built from:
//!
//! - [`Observable`]: a shared, version-tracked cell with `(old, new)` change
//!   notification.
//! - [`Subscription`]: RAII guard that unsubscribes on drop or `cancel()`.
//! - [`Binding`]: a read-only projection of one or more sources through a
//!   transform ([`bind`], [`try_bind`], [`bind2`], [`bind3`], [`bind_many`]).
//! - [`BatchScope`]: RAII guard that defers writes so that related updates
//!   recompute dependents once.
//!
//! # Architecture
//!
//! Everything here is single-threaded: cells use `Rc<RefCell<..>>`, and the
//! notification queue is thread-local. Values produced on other threads must
//! be delivered to the owning thread first (see `statebar-runtime`).
//!
//! # Invariants
//!
//! 1. Version increments exactly once per write that changes the value.
//! 2. Subscribers are notified in registration order, before the outermost
//!    `set()` returns.
//! 3. Setting a value equal to the current value is a no-op.
//! 4. A write made while a notification cycle is running is applied after
//!    that cycle, never recursively.
//! 5. `Binding::current()` never returns a stale value, and a fault in a
//!    transform leaves the last good value in place.

mod batch;
mod binding;
pub mod dispatch;
mod error;
mod observable;
mod source;
mod subscription;

pub use batch::{BatchScope, batch};
pub use binding::{Binding, WeakBinding, bind, bind_many, bind2, bind3, try_bind};
pub use error::{TransformFault, panic_message};
pub use observable::{Observable, WeakObservable};
pub use source::{Source, WeakSource};
pub use subscription::Subscription;
