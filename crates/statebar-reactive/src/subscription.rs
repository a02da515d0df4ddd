#![forbid(unsafe_code)]

//! Subscriber storage shared by [`Observable`](crate::Observable) and
//! [`Binding`](crate::Binding).
//!
//! Callbacks are owned by the [`Subscription`] guard and reachable from the
//! notifier only through a `Weak`. Dropping or cancelling the guard therefore
//! detaches the callback immediately, including in the middle of a
//! notification pass: each `Weak` is upgraded right before its call.

use std::any::Any;
use std::rc::{Rc, Weak};

type CallbackRc<T> = Rc<dyn Fn(&T, &T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T, &T)>;

/// Ordered list of weakly-held `(old, new)` callbacks.
pub(crate) struct SubscriberList<T> {
    entries: Vec<CallbackWeak<T>>,
}

impl<T: 'static> SubscriberList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        self.entries.push(Rc::downgrade(&strong));
        Subscription {
            guard: Some(Box::new(strong)),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Prune dead entries and return the live ones in registration order.
    ///
    /// The caller must release any borrow on the owner before invoking the
    /// returned callbacks.
    pub(crate) fn snapshot(&mut self) -> Vec<CallbackWeak<T>> {
        self.entries.retain(|w| w.strong_count() > 0);
        self.entries.clone()
    }
}

/// Invoke a snapshot taken with [`SubscriberList::snapshot`].
pub(crate) fn notify_all<T>(snapshot: &[CallbackWeak<T>], old: &T, new: &T) {
    for weak in snapshot {
        if let Some(cb) = weak.upgrade() {
            cb(old, new);
        }
    }
}

/// Handle for a registered callback.
///
/// Dropping the guard or calling [`cancel`](Subscription::cancel) removes
/// the callback permanently.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    guard: Option<Box<dyn Any>>,
}

impl Subscription {
    /// Remove the callback. It will not be invoked again, even if a
    /// notification pass is currently running.
    pub fn cancel(&mut self) {
        self.guard.take();
    }

    /// Whether the callback is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
