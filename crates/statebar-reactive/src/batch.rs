#![forbid(unsafe_code)]

//! Batching of related writes.
//!
//! Inside a [`BatchScope`], writes are queued instead of applied. When the
//! outermost scope ends they are applied in order, and every binding that
//! depends on several of the written cells recomputes once.
//!
//! Prefer a single structured cell for values that must never be observed
//! half-updated (for example disk total/used/available). A batch only
//! coalesces notifications; it does not make the intermediate state
//! unobservable to code reading cells from inside the scope, which still sees
//! the old values.

use crate::dispatch::CycleGuard;

/// RAII guard that defers writes until the outermost scope is dropped.
///
/// ```
/// use statebar_reactive::{BatchScope, Observable, bind2};
///
/// let used = Observable::new(2u32);
/// let total = Observable::new(8u32);
/// let label = bind2(&used, &total, |u, t| format!("{u}/{t}"));
/// {
///     let _batch = BatchScope::new();
///     used.set(3);
///     total.set(16);
///     assert_eq!(used.get(), 2);
/// }
/// assert_eq!(label.current(), "3/16");
/// assert_eq!(label.evaluations(), 2);
/// ```
#[must_use = "writes are applied when the scope is dropped"]
pub struct BatchScope {
    _cycle: CycleGuard,
}

impl BatchScope {
    /// Open a batch. Nested scopes are allowed; only the outermost one
    /// applies the queued writes.
    pub fn new() -> Self {
        Self {
            _cycle: CycleGuard::enter(),
        }
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope").finish_non_exhaustive()
    }
}

/// Run `f` inside a [`BatchScope`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _scope = BatchScope::new();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Observable;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn writes_apply_when_scope_ends() {
        let obs = Observable::new(0);
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let _sub = obs.subscribe(move |_, _| c.set(c.get() + 1));

        {
            let _batch = BatchScope::new();
            obs.set(1);
            obs.set(2);
            assert_eq!(obs.get(), 0);
            assert_eq!(count.get(), 0);
        }

        assert_eq!(obs.get(), 2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn nested_scopes_flush_at_outermost() {
        let obs = Observable::new(0);
        {
            let _outer = BatchScope::new();
            {
                let _inner = BatchScope::new();
                obs.set(5);
            }
            assert_eq!(obs.get(), 0);
        }
        assert_eq!(obs.get(), 5);
    }

    #[test]
    fn batch_fn_returns_value() {
        let obs = Observable::new(1);
        let out = batch(|| {
            obs.set(10);
            "done"
        });
        assert_eq!(out, "done");
        assert_eq!(obs.get(), 10);
    }
}
