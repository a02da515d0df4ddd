#![forbid(unsafe_code)]

//! Cancellation context (`Cx`) shared between the UI thread and workers.
//!
//! Every poller and task runs under its own `Cx`, derived from the runtime's
//! root context. Holders check `cx.is_cancelled()` at natural yield points
//! (between ticks, while waiting on a child process) and bail out early.
//!
//! # Design
//!
//! `Cx` is cheaply cloneable (`Arc` inside) and immutable from the outside.
//! To cancel, hold the companion [`CxController`]. Cancelling a parent
//! cancels every descendant; the check walks the parent chain.
//!
//! # Example
//!
//! ```
//! use statebar_runtime::Cx;
//!
//! let (root, root_ctrl) = Cx::root("bar");
//! let (poller, _ctrl) = root.child("cpu");
//! assert!(!poller.is_cancelled());
//!
//! root_ctrl.cancel();
//! assert!(poller.is_cancelled());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;
use tracing::debug;
use web_time::{Duration, Instant};

/// Granularity of cancellation checks while sleeping.
const SLEEP_CHUNK: Duration = Duration::from_millis(10);

static NEXT_CX_ID: AtomicU64 = AtomicU64::new(1);

fn next_cx_id() -> u64 {
    NEXT_CX_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
struct CxInner {
    id: u64,
    label: String,
    cancelled: AtomicBool,
    parent: Option<Arc<CxInner>>,
}

impl CxInner {
    fn is_cancelled(&self) -> bool {
        let mut node = Some(self);
        while let Some(inner) = node {
            if inner.cancelled.load(Ordering::Acquire) {
                return true;
            }
            node = inner.parent.as_deref();
        }
        false
    }
}

/// Cancellation context handle.
#[derive(Clone, Debug)]
pub struct Cx {
    inner: Arc<CxInner>,
}

impl Cx {
    /// Create a root context.
    #[must_use]
    pub fn root(label: impl Into<String>) -> (Self, CxController) {
        Self::new_inner(label.into(), None)
    }

    /// Derive a child context. Cancelling `self` also cancels the child;
    /// cancelling the child leaves `self` untouched.
    #[must_use]
    pub fn child(&self, label: impl Into<String>) -> (Self, CxController) {
        Self::new_inner(label.into(), Some(Arc::clone(&self.inner)))
    }

    fn new_inner(label: String, parent: Option<Arc<CxInner>>) -> (Self, CxController) {
        let inner = Arc::new(CxInner {
            id: next_cx_id(),
            label,
            cancelled: AtomicBool::new(false),
            parent,
        });
        (
            Self {
                inner: Arc::clone(&inner),
            },
            CxController { inner },
        )
    }

    /// Unique identifier, used as `poller_id` / `task_id` in logs.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether this context or any ancestor has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Return `Err` once cancelled. Intended for `?` at yield points.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        self.sleep_until(Instant::now() + duration)
    }

    /// Sleep until `deadline` unless cancelled first.
    ///
    /// Returns `true` if the deadline was reached without cancellation. A
    /// deadline in the past returns immediately.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_CHUNK));
        }
    }
}

/// Control handle for a [`Cx`].
///
/// Dropping the controller does **not** cancel the context; cancellation is
/// always explicit.
#[derive(Debug)]
pub struct CxController {
    inner: Arc<CxInner>,
}

impl CxController {
    /// Cancel the context and all of its descendants. Idempotent.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::AcqRel);
        if !was_cancelled {
            debug!(cx_id = self.inner.id, label = %self.inner.label, "cx cancelled");
        }
    }

    /// Whether this context (or an ancestor) has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// A fresh handle to the controlled context.
    #[must_use]
    pub fn cx(&self) -> Cx {
        Cx {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// The operation observed a cancelled [`Cx`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("context cancelled")]
pub struct Cancelled;
