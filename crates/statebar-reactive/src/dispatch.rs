#![forbid(unsafe_code)]

//! Thread-local notification cycle and deferred-write queue.
//!
//! Every value-changing write runs inside a *cycle*. The first write on an
//! idle thread opens the cycle, applies itself, and then drains whatever the
//! notification fan-out queued (writes made by subscribers, binding
//! recomputations). Writes issued while a cycle is open are appended to the
//! queue instead of running recursively, so a subscriber that writes to the
//! cell it is observing cannot recurse without bound.
//!
//! [`BatchScope`](crate::BatchScope) opens a cycle without a leading write:
//! everything written inside it is queued and applied when the outermost
//! scope closes.
//!
//! # Invariants
//!
//! 1. Jobs run in FIFO order.
//! 2. Only the outermost guard drains; nested guards only adjust depth.
//! 3. Depth is restored even when a job unwinds.
//! 4. A cycle that unwinds discards whatever it queued; those writes never
//!    land on a later, unrelated cycle.

use std::cell::RefCell;
use std::collections::VecDeque;

use tracing::warn;

type Job = Box<dyn FnOnce()>;

#[derive(Default)]
struct Dispatcher {
    depth: usize,
    pending: VecDeque<Job>,
}

thread_local! {
    static DISPATCHER: RefCell<Dispatcher> = RefCell::new(Dispatcher::default());
}

/// Whether a notification cycle (or batch) is currently open on this thread.
#[must_use]
pub fn in_cycle() -> bool {
    DISPATCHER.with(|d| d.borrow().depth > 0)
}

/// Number of jobs waiting for the current cycle to drain.
#[must_use]
pub fn pending_jobs() -> usize {
    DISPATCHER.with(|d| d.borrow().pending.len())
}

/// Run `job` now if the thread is idle, otherwise queue it behind the
/// current cycle.
pub(crate) fn run_or_defer(job: impl FnOnce() + 'static) {
    if in_cycle() {
        defer(job);
        return;
    }
    let _cycle = CycleGuard::enter();
    job();
}

/// Queue `job` unconditionally. If no cycle is open, one is opened and
/// drained immediately.
pub(crate) fn defer(job: impl FnOnce() + 'static) {
    let idle = DISPATCHER.with(|d| {
        let mut d = d.borrow_mut();
        d.pending.push_back(Box::new(job));
        d.depth == 0
    });
    if idle {
        let _cycle = CycleGuard::enter();
    }
}

fn drain() {
    loop {
        let next = DISPATCHER.with(|d| d.borrow_mut().pending.pop_front());
        match next {
            Some(job) => job(),
            None => break,
        }
    }
}

/// RAII marker for an open cycle. The outermost guard drains the queue on
/// drop.
pub(crate) struct CycleGuard {
    outermost: bool,
}

impl CycleGuard {
    pub(crate) fn enter() -> Self {
        let outermost = DISPATCHER.with(|d| {
            let mut d = d.borrow_mut();
            d.depth += 1;
            d.depth == 1
        });
        Self { outermost }
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let _release = DepthRelease {
            outermost: self.outermost,
        };
        if self.outermost && !std::thread::panicking() {
            drain();
        }
    }
}

/// Restores depth. Also runs when a drained job unwinds out of
/// [`CycleGuard::drop`].
struct DepthRelease {
    outermost: bool,
}

impl Drop for DepthRelease {
    fn drop(&mut self) {
        let discarded = DISPATCHER.with(|d| {
            let mut d = d.borrow_mut();
            d.depth = d.depth.saturating_sub(1);
            if self.outermost && std::thread::panicking() {
                std::mem::take(&mut d.pending)
            } else {
                VecDeque::new()
            }
        });
        if !discarded.is_empty() {
            warn!(
                target: "statebar.dispatch",
                jobs = discarded.len(),
                "notification cycle panicked; discarding queued writes"
            );
        }
    }
}
