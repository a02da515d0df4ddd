#![forbid(unsafe_code)]

//! Read side shared by cells and bindings, so bindings can be built on top
//! of either.

use crate::subscription::Subscription;

/// Anything that holds a current value and notifies on change.
pub trait Source: Clone + 'static {
    type Value: 'static;

    /// Non-owning counterpart used by dependents.
    type Weak: WeakSource<Strong = Self>;

    /// Borrow the current value.
    fn with_value<R>(&self, f: impl FnOnce(&Self::Value) -> R) -> R;

    /// Change counter. Increments each time the value changes, so equal
    /// versions mean an unchanged value.
    fn version(&self) -> u64;

    /// Register an `(old, new)` change callback.
    fn subscribe(&self, callback: impl Fn(&Self::Value, &Self::Value) + 'static) -> Subscription;

    /// Weak handle to this source.
    fn downgrade(&self) -> Self::Weak;
}

/// Weak handle to a [`Source`].
pub trait WeakSource: Clone + 'static {
    /// The strong handle type.
    type Strong: Source;

    /// Recover a strong handle, or `None` once the source has been dropped.
    fn upgrade(&self) -> Option<Self::Strong>;
}
