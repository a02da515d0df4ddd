#![forbid(unsafe_code)]

//! Observable cell with change notification and version tracking.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value of type `T` in shared, reference-counted
//! storage (`Rc<RefCell<..>>`). When the value changes (determined by
//! `PartialEq`), all live subscribers are notified in registration order with
//! the previous and the new value.
//!
//! # Performance
//!
//! | Operation     | Complexity                 |
//! |---------------|----------------------------|
//! | `get()`       | O(1) + clone               |
//! | `set()`       | O(S) where S = subscribers |
//! | `subscribe()` | O(1) amortized             |
//!
//! # Failure Modes
//!
//! - **Re-entrant set**: Calling `set()` from within a subscriber callback is
//!   allowed. The write is queued and applied once the current notification
//!   cycle has finished, still before the outermost `set()` returns.
//! - **Subscriber leak**: If `Subscription` guards are stored indefinitely
//!   without being dropped, callbacks accumulate. Dead weak references are
//!   pruned lazily during notification.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::dispatch;
use crate::source::{Source, WeakSource};
use crate::subscription::{SubscriberList, Subscription, notify_all};

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: SubscriberList<T>,
}

/// A shared, version-tracked value with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** cell. Every
/// clone may write; concurrent logical writers resolve as last-write-wins.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each value-changing write.
/// 2. `set(v)` where `v == current` is a no-op.
/// 3. Subscribers are notified in registration order, synchronously, before
///    the outermost `set()` returns.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a new cell with the given initial value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: SubscriberList::new(),
            })),
        }
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Set a new value.
    ///
    /// If the value differs from the current one, the version is bumped and
    /// every live subscriber receives `(old, new)`. Called from inside a
    /// notification cycle, the write is deferred until that cycle completes.
    pub fn set(&self, value: T) {
        let this = self.clone();
        dispatch::run_or_defer(move || this.apply(value));
    }

    /// Modify the value via a closure applied to a copy of the current
    /// value. Notifies only if the result differs.
    pub fn update(&self, f: impl FnOnce(&mut T) + 'static) {
        let this = self.clone();
        dispatch::run_or_defer(move || {
            let mut next = this.get();
            f(&mut next);
            this.apply(next);
        });
    }

    /// Subscribe to value changes.
    ///
    /// The callback is not invoked for the current value; it fires on every
    /// later change with the previous and the new value.
    pub fn subscribe(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        self.inner.borrow_mut().subscribers.add(callback)
    }

    /// Current version number. Increments by 1 on each value-changing write.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered subscribers (including dead ones not yet pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Weak handle that does not keep the cell alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakObservable<T> {
        WeakObservable {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn apply(&self, value: T) {
        let (old, new, snapshot) = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            let old = std::mem::replace(&mut inner.value, value);
            inner.version += 1;
            (old, inner.value.clone(), inner.subscribers.snapshot())
        };
        notify_all(&snapshot, &old, &new);
    }
}

impl<T: Clone + PartialEq + 'static> Source for Observable<T> {
    type Value = T;
    type Weak = WeakObservable<T>;

    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.with(f)
    }

    fn version(&self) -> u64 {
        Observable::version(self)
    }

    fn subscribe(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        Observable::subscribe(self, callback)
    }

    fn downgrade(&self) -> WeakObservable<T> {
        Observable::downgrade(self)
    }
}

/// Non-owning handle to an [`Observable`].
pub struct WeakObservable<T> {
    inner: Weak<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for WeakObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> WeakSource for WeakObservable<T> {
    type Strong = Observable<T>;

    fn upgrade(&self) -> Option<Observable<T>> {
        self.inner.upgrade().map(|inner| Observable { inner })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn get_set_basic() {
        let obs = Observable::new(42);
        assert_eq!(obs.get(), 42);
        assert_eq!(obs.version(), 0);

        obs.set(99);
        assert_eq!(obs.get(), 99);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn no_change_no_version_bump() {
        let obs = Observable::new(42);
        obs.set(42);
        assert_eq!(obs.version(), 0);
    }

    #[test]
    fn update_mutates_copy() {
        let obs = Observable::new(vec![1, 2, 3]);
        obs.update(|v| v.push(4));
        assert_eq!(obs.get(), vec![1, 2, 3, 4]);
        assert_eq!(obs.version(), 1);

        obs.update(|v| v[0] = 1);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn subscriber_receives_old_and_new() {
        let obs = Observable::new(String::from("0.00"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = obs.subscribe(move |old: &String, new: &String| {
            s.borrow_mut().push((old.clone(), new.clone()));
        });

        obs.set("42.50".into());
        obs.set("42.50".into());
        obs.set("7.00".into());

        assert_eq!(
            *seen.borrow(),
            vec![
                ("0.00".to_string(), "42.50".to_string()),
                ("42.50".to_string(), "7.00".to_string()),
            ]
        );
    }

    #[test]
    fn subscribe_does_not_fire_retroactively() {
        let obs = Observable::new(1);
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let _sub = obs.subscribe(move |_, _| c.set(c.get() + 1));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn cancel_removes_callback() {
        let obs = Observable::new(0);
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let mut sub = obs.subscribe(move |_, _| c.set(c.get() + 1));

        obs.set(1);
        sub.cancel();
        assert!(!sub.is_active());
        obs.set(2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn drop_unsubscribes() {
        let obs = Observable::new(0);
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let sub = obs.subscribe(move |_, _| c.set(c.get() + 1));

        obs.set(1);
        drop(sub);
        obs.set(2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let obs = Observable::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let log1 = Rc::clone(&log);
        let _s1 = obs.subscribe(move |_, _| log1.borrow_mut().push('A'));
        let log2 = Rc::clone(&log);
        let _s2 = obs.subscribe(move |_, _| log2.borrow_mut().push('B'));
        let log3 = Rc::clone(&log);
        let _s3 = obs.subscribe(move |_, _| log3.borrow_mut().push('C'));

        obs.set(1);
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
    }

    #[test]
    fn reentrant_write_is_deferred_not_recursive() {
        let obs = Observable::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let writer = obs.clone();
        let l1 = Rc::clone(&log);
        let _s1 = obs.subscribe(move |old: &i32, new: &i32| {
            l1.borrow_mut().push(format!("a:{old}->{new}"));
            if *new < 3 {
                writer.set(new + 1);
            }
        });
        let l2 = Rc::clone(&log);
        let _s2 = obs.subscribe(move |old: &i32, new: &i32| {
            l2.borrow_mut().push(format!("b:{old}->{new}"));
        });

        obs.set(1);

        assert_eq!(obs.get(), 3);
        assert_eq!(
            *log.borrow(),
            vec!["a:0->1", "b:0->1", "a:1->2", "b:1->2", "a:2->3", "b:2->3"]
        );
    }

    #[test]
    fn cancel_during_notification_skips_later_subscriber() {
        let obs = Observable::new(0);
        let count = Rc::new(Cell::new(0u32));

        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let v = Rc::clone(&victim);
        let _killer = obs.subscribe(move |_, _| {
            if let Some(mut sub) = v.borrow_mut().take() {
                sub.cancel();
            }
        });
        let c = Rc::clone(&count);
        *victim.borrow_mut() = Some(obs.subscribe(move |_, _| c.set(c.get() + 1)));

        obs.set(1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn write_from_failed_cycle_never_lands() {
        let a = Observable::new(0);
        let b = Observable::new(0);
        let c = Observable::new(0);
        let target = b.clone();
        let _sub = a.subscribe(move |_, new: &i32| {
            target.set(*new);
            panic!("subscriber failed");
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| a.set(5)));
        assert!(result.is_err());
        assert_eq!(dispatch::pending_jobs(), 0);

        c.set(1);
        assert_eq!(b.get(), 0);
        assert_eq!(a.get(), 5);
    }

    #[test]
    fn clone_shares_state_last_write_wins() {
        let a = Observable::new(0);
        let b = a.clone();

        a.set(42);
        b.set(7);
        assert_eq!(a.get(), 7);
        assert_eq!(a.version(), 2);
    }

    #[test]
    fn subscriber_count_prunes_lazily() {
        let obs = Observable::new(0);
        let _s1 = obs.subscribe(|_, _| {});
        let s2 = obs.subscribe(|_, _| {});
        assert_eq!(obs.subscriber_count(), 2);

        drop(s2);
        assert_eq!(obs.subscriber_count(), 2);

        obs.set(1);
        assert_eq!(obs.subscriber_count(), 1);
    }

    #[test]
    fn weak_handle_does_not_keep_cell_alive() {
        let obs = Observable::new(5);
        let weak = obs.downgrade();
        assert_eq!(weak.upgrade().map(|o| o.get()), Some(5));
        drop(obs);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn debug_format() {
        let obs = Observable::new(42);
        let dbg = format!("{obs:?}");
        assert!(dbg.contains("Observable"));
        assert!(dbg.contains("42"));
        assert!(dbg.contains("version"));
    }
}
