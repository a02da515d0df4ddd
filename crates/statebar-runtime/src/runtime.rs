#![forbid(unsafe_code)]

//! UI-thread runtime: marshals worker results onto the thread that owns the
//! reactive graph.
//!
//! # Design
//!
//! Workers never touch cells. They hold an [`Inlet<T>`], a `Send` handle to
//! a typed inbox registered with the [`Runtime`]. Sending a value wakes the
//! runtime; the owning thread then drains the inbox inside one of the
//! `run_*` methods and hands each value to the inbox's sink, which is the
//! only place cell writes happen.
//!
//! ```text
//!   worker thread                    UI thread
//!   ─────────────                    ─────────
//!   producer() ──▶ Inlet::send ──▶ wake channel ──▶ Runtime::run_*
//!                                                      │
//!                                                      ▼
//!                                            sink(value) ──▶ Observable::set
//! ```
//!
//! # Invariants
//!
//! 1. Sinks only run on the thread that created the `Runtime`.
//! 2. Values of one inlet are delivered in send order.
//! 3. An inbox is removed once every clone of its inlet has been dropped and
//!    its queued values were delivered.
//! 4. A panicking sink loses only the value it was handed; the inbox stays
//!    registered and later values are still delivered.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::{Arc, mpsc};

use ahash::AHashMap;
use statebar_reactive::panic_message;
use tracing::{debug, trace, warn};
use web_time::{Duration, Instant};

use crate::cx::{Cx, CxController};

pub(crate) type InboxId = u64;

trait Inbox {
    /// Deliver everything queued. Returns the number of values delivered and
    /// whether every sender is gone.
    fn drain(&mut self) -> (usize, bool);
}

struct TypedInbox<T> {
    rx: mpsc::Receiver<T>,
    sink: Box<dyn FnMut(T)>,
    on_close: Option<Box<dyn FnOnce()>>,
}

impl<T> Inbox for TypedInbox<T> {
    fn drain(&mut self) -> (usize, bool) {
        let mut delivered = 0;
        loop {
            match self.rx.try_recv() {
                Ok(value) => {
                    let sink = &mut self.sink;
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| sink(value))) {
                        warn!(
                            panic = %panic_message(payload.as_ref()),
                            "inbox sink panicked; value dropped"
                        );
                    }
                    delivered += 1;
                }
                Err(mpsc::TryRecvError::Empty) => return (delivered, false),
                Err(mpsc::TryRecvError::Disconnected) => {
                    if let Some(on_close) = self.on_close.take() {
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(on_close)) {
                            warn!(
                                panic = %panic_message(payload.as_ref()),
                                "inbox close hook panicked"
                            );
                        }
                    }
                    return (delivered, true);
                }
            }
        }
    }
}

/// Wakes the runtime once the last clone of an inlet is dropped so the
/// inbox can observe the disconnect.
#[derive(Debug)]
struct CloseNotice {
    id: InboxId,
    wake: mpsc::Sender<InboxId>,
}

impl Drop for CloseNotice {
    fn drop(&mut self) {
        let _ = self.wake.send(self.id);
    }
}

/// Sending half of a runtime inbox. `Send`, cloneable.
#[derive(Debug)]
pub struct Inlet<T> {
    // Field order matters: `tx` must be dropped before `_close` fires.
    tx: mpsc::Sender<T>,
    wake: mpsc::Sender<InboxId>,
    id: InboxId,
    _close: Arc<CloseNotice>,
}

impl<T> Clone for Inlet<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            wake: self.wake.clone(),
            id: self.id,
            _close: Arc::clone(&self._close),
        }
    }
}

impl<T: Send> Inlet<T> {
    /// Queue `value` for the sink and wake the runtime.
    ///
    /// Returns `false` if the runtime has been dropped.
    pub fn send(&self, value: T) -> bool {
        if self.tx.send(value).is_err() {
            return false;
        }
        self.wake.send(self.id).is_ok()
    }
}

/// Owner of the UI-thread side of every poller and task.
///
/// Not `Send`: sinks close over `Rc`-based cells.
pub struct Runtime {
    cx: Cx,
    ctrl: CxController,
    wake_tx: mpsc::Sender<InboxId>,
    wake_rx: mpsc::Receiver<InboxId>,
    inboxes: RefCell<AHashMap<InboxId, Box<dyn Inbox>>>,
    next_id: Cell<InboxId>,
    _not_send: PhantomData<Rc<()>>,
}

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        let (cx, ctrl) = Cx::root("runtime");
        let (wake_tx, wake_rx) = mpsc::channel();
        Self {
            cx,
            ctrl,
            wake_tx,
            wake_rx,
            inboxes: RefCell::new(AHashMap::new()),
            next_id: Cell::new(1),
            _not_send: PhantomData,
        }
    }

    /// Root context. Pollers and tasks run under children of it.
    #[must_use]
    pub fn cx(&self) -> &Cx {
        &self.cx
    }

    /// Register an inbox whose values are passed to `sink` on this thread.
    pub fn inlet<T: Send + 'static>(&self, sink: impl FnMut(T) + 'static) -> Inlet<T> {
        self.register(Box::new(sink), None)
    }

    /// Like [`inlet`](Self::inlet); `on_close` runs on this thread once
    /// every inlet clone is gone and the queue is empty.
    pub(crate) fn inlet_with_close<T: Send + 'static>(
        &self,
        sink: impl FnMut(T) + 'static,
        on_close: impl FnOnce() + 'static,
    ) -> Inlet<T> {
        self.register(Box::new(sink), Some(Box::new(on_close)))
    }

    fn register<T: Send + 'static>(
        &self,
        sink: Box<dyn FnMut(T)>,
        on_close: Option<Box<dyn FnOnce()>>,
    ) -> Inlet<T> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let (tx, rx) = mpsc::channel();
        self.inboxes
            .borrow_mut()
            .insert(id, Box::new(TypedInbox { rx, sink, on_close }));
        trace!(inbox_id = id, "inbox registered");
        Inlet {
            tx,
            wake: self.wake_tx.clone(),
            id,
            _close: Arc::new(CloseNotice {
                id,
                wake: self.wake_tx.clone(),
            }),
        }
    }

    /// Number of inboxes that still have a live inlet.
    #[must_use]
    pub fn open_inboxes(&self) -> usize {
        self.inboxes.borrow().len()
    }

    /// Deliver everything already queued, without blocking.
    ///
    /// Returns the number of values delivered.
    pub fn run_pending(&self) -> usize {
        let mut delivered = 0;
        while let Ok(id) = self.wake_rx.try_recv() {
            delivered += self.dispatch(id);
        }
        delivered
    }

    /// Deliver values as they arrive for `duration`.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut delivered = 0;
        while let Some(id) = self.wait_wake(deadline) {
            delivered += self.dispatch(id);
        }
        delivered
    }

    /// Deliver values until `done` returns `true` or `timeout` elapses.
    ///
    /// Returns whether `done` was satisfied.
    pub fn run_until(&self, mut done: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            match self.wait_wake(deadline) {
                Some(id) => {
                    self.dispatch(id);
                }
                None => return done(),
            }
        }
    }

    /// Deliver values until no inbox has a live inlet (every worker has
    /// finished) or `timeout` elapses. Live pollers keep the runtime busy.
    pub fn run_until_idle(&self, timeout: Duration) -> bool {
        self.run_until(|| self.open_inboxes() == 0, timeout)
    }

    /// Cancel every poller and pending task started from this runtime.
    pub fn shutdown(&self) {
        if !self.ctrl.is_cancelled() {
            debug!(open_inboxes = self.open_inboxes(), "runtime shutdown");
        }
        self.ctrl.cancel();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.ctrl.is_cancelled()
    }

    fn wait_wake(&self, deadline: Instant) -> Option<InboxId> {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        self.wake_rx.recv_timeout(remaining).ok()
    }

    fn dispatch(&self, id: InboxId) -> usize {
        // Taken out of the map so sinks may register new inboxes.
        let Some(mut inbox) = self.inboxes.borrow_mut().remove(&id) else {
            return 0;
        };
        let (delivered, closed) = inbox.drain();
        if closed {
            trace!(inbox_id = id, "inbox closed");
        } else {
            self.inboxes.borrow_mut().insert(id, inbox);
        }
        delivered
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.ctrl.cancel();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("open_inboxes", &self.open_inboxes())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
