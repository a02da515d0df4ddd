#![forbid(unsafe_code)]

//! Derived values that follow one or more [`Source`]s.
//!
//! # Design
//!
//! [`Binding<T>`] stores a transform and its last result in shared,
//! reference-counted storage. It subscribes to each source through a weak
//! back-reference; a change marks the binding dirty and queues exactly one
//! recomputation behind the current notification cycle.
//!
//! Alongside the value the binding remembers the version of every source it
//! was computed from. A read compares those against the sources' current
//! versions and recomputes on a mismatch, so a read never observes a stale
//! value, even from a cell subscriber that runs before the binding has been
//! told about the change.
//!
//! Sources are held weakly as well: a binding never keeps a cell alive. Once
//! any source is gone, the binding keeps its last value.
//!
//! # Invariants
//!
//! 1. `current()` equals the transform applied to the sources' current
//!    values whenever the last evaluation succeeded.
//! 2. At most one recomputation per notification cycle, regardless of how
//!    many sources changed in it.
//! 3. `version` increments by exactly 1 per change of the derived value.
//!
//! # Failure Modes
//!
//! - **Transform returns an error or panics** (after construction): the
//!   cached value is kept, the fault is stored in [`Binding::last_fault`],
//!   logged, and passed to every handler registered with
//!   [`Binding::on_fault`]. A panic during the *initial* evaluation of
//!   an infallible binding propagates to the constructor's caller.

use std::cell::RefCell;
use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::dispatch;
use crate::error::TransformFault;
use crate::source::{Source, WeakSource};
use crate::subscription::{SubscriberList, Subscription, notify_all};

/// `None` means a source has been dropped.
type Compute<T> = Rc<dyn Fn() -> Option<Result<T, TransformFault>>>;
/// Source versions in declaration order; `None` once a source is gone.
type Versions = Rc<dyn Fn() -> Option<Vec<u64>>>;
type FaultHandler = Rc<dyn Fn(&TransformFault)>;

struct BindingInner<T> {
    compute: Compute<T>,
    versions: Versions,
    /// Source versions the cached value was computed from.
    seen: Vec<u64>,
    value: T,
    dirty: bool,
    scheduled: bool,
    version: u64,
    evaluations: u64,
    fault: Option<TransformFault>,
    fault_handlers: Vec<FaultHandler>,
    subscribers: SubscriberList<T>,
    sources: Vec<Subscription>,
}

/// A read-only projection of one or more sources.
///
/// Cloning a `Binding` creates a new handle to the **same** projection.
/// Dropping the last handle detaches it from its sources.
pub struct Binding<T> {
    inner: Rc<RefCell<BindingInner<T>>>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Binding")
            .field("value", &inner.value)
            .field("dirty", &inner.dirty)
            .field("version", &inner.version)
            .field("fault", &inner.fault)
            .finish()
    }
}

/// Project one source through `map`.
pub fn bind<Src, T>(source: &Src, map: impl Fn(&Src::Value) -> T + 'static) -> Binding<T>
where
    Src: Source,
    T: Clone + PartialEq + 'static,
{
    let initial = source.with_value(&map);
    let weak = source.downgrade();
    let versions = versions_of(std::slice::from_ref(&weak));
    let compute: Compute<T> = Rc::new(move || -> Option<Result<T, TransformFault>> {
        weak.upgrade().map(|s| Ok(s.with_value(&map)))
    });
    Binding::assemble(compute, versions, initial, None, |hook| {
        vec![source.subscribe(move |_, _| hook())]
    })
}

/// Project one source through a fallible `map`.
///
/// `fallback` is the visible value if the very first evaluation fails.
pub fn try_bind<Src, T, E>(
    source: &Src,
    map: impl Fn(&Src::Value) -> Result<T, E> + 'static,
    fallback: T,
) -> Binding<T>
where
    Src: Source,
    T: Clone + PartialEq + 'static,
    E: Display + 'static,
{
    let (initial, fault) = match source.with_value(&map) {
        Ok(value) => (value, None),
        Err(err) => (fallback, Some(TransformFault::failed(err.to_string()))),
    };
    let weak = source.downgrade();
    let versions = versions_of(std::slice::from_ref(&weak));
    let compute: Compute<T> = Rc::new(move || -> Option<Result<T, TransformFault>> {
        weak.upgrade().map(|s| {
            s.with_value(&map)
                .map_err(|err| TransformFault::failed(err.to_string()))
        })
    });
    Binding::assemble(compute, versions, initial, fault, |hook| {
        vec![source.subscribe(move |_, _| hook())]
    })
}

/// Combine two sources. Either one changing triggers one recomputation that
/// reads both current values.
pub fn bind2<Src1, Src2, T>(
    s1: &Src1,
    s2: &Src2,
    map: impl Fn(&Src1::Value, &Src2::Value) -> T + 'static,
) -> Binding<T>
where
    Src1: Source,
    Src2: Source,
    T: Clone + PartialEq + 'static,
{
    let initial = s1.with_value(|a| s2.with_value(|b| map(a, b)));
    let (w1, w2) = (s1.downgrade(), s2.downgrade());
    let versions: Versions = {
        let (w1, w2) = (w1.clone(), w2.clone());
        Rc::new(move || -> Option<Vec<u64>> {
            Some(vec![w1.upgrade()?.version(), w2.upgrade()?.version()])
        })
    };
    let compute: Compute<T> = Rc::new(move || -> Option<Result<T, TransformFault>> {
        let (s1, s2) = (w1.upgrade()?, w2.upgrade()?);
        Some(Ok(s1.with_value(|a| s2.with_value(|b| map(a, b)))))
    });
    Binding::assemble(compute, versions, initial, None, |hook| {
        let h1 = Rc::clone(&hook);
        vec![
            s1.subscribe(move |_, _| h1()),
            s2.subscribe(move |_, _| hook()),
        ]
    })
}

/// Combine three sources.
pub fn bind3<Src1, Src2, Src3, T>(
    s1: &Src1,
    s2: &Src2,
    s3: &Src3,
    map: impl Fn(&Src1::Value, &Src2::Value, &Src3::Value) -> T + 'static,
) -> Binding<T>
where
    Src1: Source,
    Src2: Source,
    Src3: Source,
    T: Clone + PartialEq + 'static,
{
    let initial = s1.with_value(|a| s2.with_value(|b| s3.with_value(|c| map(a, b, c))));
    let (w1, w2, w3) = (s1.downgrade(), s2.downgrade(), s3.downgrade());
    let versions: Versions = {
        let (w1, w2, w3) = (w1.clone(), w2.clone(), w3.clone());
        Rc::new(move || -> Option<Vec<u64>> {
            Some(vec![
                w1.upgrade()?.version(),
                w2.upgrade()?.version(),
                w3.upgrade()?.version(),
            ])
        })
    };
    let compute: Compute<T> = Rc::new(move || -> Option<Result<T, TransformFault>> {
        let (s1, s2, s3) = (w1.upgrade()?, w2.upgrade()?, w3.upgrade()?);
        Some(Ok(s1.with_value(|a| {
            s2.with_value(|b| s3.with_value(|c| map(a, b, c)))
        })))
    });
    Binding::assemble(compute, versions, initial, None, |hook| {
        let h1 = Rc::clone(&hook);
        let h2 = Rc::clone(&hook);
        vec![
            s1.subscribe(move |_, _| h1()),
            s2.subscribe(move |_, _| h2()),
            s3.subscribe(move |_, _| hook()),
        ]
    })
}

/// Combine any number of same-typed sources. `map` receives their current
/// values in declaration order.
pub fn bind_many<Src, T>(sources: &[Src], map: impl Fn(&[Src::Value]) -> T + 'static) -> Binding<T>
where
    Src: Source,
    Src::Value: Clone,
    T: Clone + PartialEq + 'static,
{
    let snapshot = |strong: &[Src]| -> Vec<Src::Value> {
        strong.iter().map(|s| s.with_value(Clone::clone)).collect()
    };
    let initial = map(&snapshot(sources));
    let weak: Vec<Src::Weak> = sources.iter().map(|s| s.downgrade()).collect();
    let versions = versions_of(&weak);
    let compute: Compute<T> = Rc::new(move || -> Option<Result<T, TransformFault>> {
        let strong = weak
            .iter()
            .map(|w| w.upgrade())
            .collect::<Option<Vec<Src>>>()?;
        Some(Ok(map(&snapshot(&strong))))
    });
    Binding::assemble(compute, versions, initial, None, |hook| {
        sources
            .iter()
            .map(|s| {
                let h = Rc::clone(&hook);
                s.subscribe(move |_, _| h())
            })
            .collect()
    })
}

fn versions_of<W: WeakSource>(weak: &[W]) -> Versions {
    let weak = weak.to_vec();
    Rc::new(move || -> Option<Vec<u64>> {
        weak.iter().map(|w| w.upgrade().map(|s| s.version())).collect()
    })
}

impl<T: Clone + PartialEq + 'static> Binding<T> {
    fn assemble(
        compute: Compute<T>,
        versions: Versions,
        value: T,
        fault: Option<TransformFault>,
        wire: impl FnOnce(Rc<dyn Fn()>) -> Vec<Subscription>,
    ) -> Self {
        if let Some(fault) = &fault {
            warn!(target: "statebar.binding", error = %fault, "initial binding evaluation failed");
        }
        let seen = versions().unwrap_or_default();
        let inner = Rc::new(RefCell::new(BindingInner {
            compute,
            versions,
            seen,
            value,
            dirty: false,
            scheduled: false,
            version: 0,
            evaluations: 1,
            fault,
            fault_handlers: Vec::new(),
            subscribers: SubscriberList::new(),
            sources: Vec::new(),
        }));

        let weak = Rc::downgrade(&inner);
        let hook: Rc<dyn Fn()> = Rc::new(move || Self::source_changed(&weak));
        let sources = wire(hook);
        inner.borrow_mut().sources = sources;

        Self { inner }
    }

    /// A binding without sources. Its value never changes.
    #[must_use]
    pub fn constant(value: T) -> Self {
        let compute: Compute<T> = Rc::new(|| -> Option<Result<T, TransformFault>> { None });
        let versions: Versions = Rc::new(|| -> Option<Vec<u64>> { None });
        Self::assemble(compute, versions, value, None, |_| Vec::new())
    }

    fn source_changed(weak: &Weak<RefCell<BindingInner<T>>>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let schedule = {
            let mut inner = inner.borrow_mut();
            inner.dirty = true;
            !std::mem::replace(&mut inner.scheduled, true)
        };
        if schedule {
            let weak = Rc::downgrade(&inner);
            dispatch::defer(move || {
                if let Some(inner) = weak.upgrade() {
                    Binding { inner }.flush();
                }
            });
        }
    }

    fn flush(&self) {
        let dirty = {
            let mut inner = self.inner.borrow_mut();
            inner.scheduled = false;
            std::mem::replace(&mut inner.dirty, false)
        };
        if dirty && self.is_stale() {
            self.refresh();
        }
    }

    /// Whether a source moved past the versions the cached value was
    /// computed from. A dropped source never makes the binding stale.
    fn is_stale(&self) -> bool {
        let versions = Rc::clone(&self.inner.borrow().versions);
        match versions() {
            Some(now) => now != self.inner.borrow().seen,
            None => false,
        }
    }

    fn refresh(&self) {
        let (compute, versions) = {
            let mut inner = self.inner.borrow_mut();
            inner.dirty = false;
            (Rc::clone(&inner.compute), Rc::clone(&inner.versions))
        };
        let Some(seen) = versions() else {
            return;
        };
        self.inner.borrow_mut().seen = seen;
        let outcome = match catch_unwind(AssertUnwindSafe(|| compute())) {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return,
            Err(payload) => Err(TransformFault::from_panic(payload.as_ref())),
        };

        match outcome {
            Ok(value) => {
                let change = {
                    let mut inner = self.inner.borrow_mut();
                    inner.evaluations += 1;
                    inner.fault = None;
                    if inner.value == value {
                        None
                    } else {
                        let old = std::mem::replace(&mut inner.value, value);
                        inner.version += 1;
                        Some((old, inner.value.clone(), inner.subscribers.snapshot()))
                    }
                };
                if let Some((old, new, snapshot)) = change {
                    notify_all(&snapshot, &old, &new);
                }
            }
            Err(fault) => {
                warn!(target: "statebar.binding", error = %fault, "binding transform fault; keeping last value");
                let handlers = {
                    let mut inner = self.inner.borrow_mut();
                    inner.evaluations += 1;
                    inner.fault = Some(fault.clone());
                    inner.fault_handlers.clone()
                };
                for handler in handlers {
                    handler(&fault);
                }
            }
        }
    }

    /// Current derived value.
    #[must_use]
    pub fn current(&self) -> T {
        self.with(T::clone)
    }

    /// Borrow the current derived value.
    ///
    /// # Panics
    ///
    /// Panics if the closure writes to a source of this binding outside a
    /// notification cycle (re-entrant borrow). Read with
    /// [`current`](Self::current) first in that case.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if self.is_stale() {
            self.refresh();
        }
        f(&self.inner.borrow().value)
    }

    /// Subscribe to changes of the derived value.
    pub fn subscribe(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        self.inner.borrow_mut().subscribers.add(callback)
    }

    /// Derive a further binding from this one.
    pub fn map<U>(&self, f: impl Fn(&T) -> U + 'static) -> Binding<U>
    where
        U: Clone + PartialEq + 'static,
    {
        bind(self, f)
    }

    /// Register a handler for transform faults.
    pub fn on_fault(&self, handler: impl Fn(&TransformFault) + 'static) {
        self.inner.borrow_mut().fault_handlers.push(Rc::new(handler));
    }

    /// The fault from the most recent evaluation, if it failed.
    #[must_use]
    pub fn last_fault(&self) -> Option<TransformFault> {
        self.inner.borrow().fault.clone()
    }

    /// Number of transform evaluations so far, including the initial one.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.inner.borrow().evaluations
    }

    /// Increments by 1 each time the derived value changes.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Whether a source changed and the recomputation has not run yet.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty
    }

    /// Stop following the sources. The current value is frozen.
    pub fn detach(&self) {
        let sources = {
            let mut inner = self.inner.borrow_mut();
            inner.versions = Rc::new(|| -> Option<Vec<u64>> { None });
            std::mem::take(&mut inner.sources)
        };
        drop(sources);
    }

    /// Whether the binding still follows its sources.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        !self.inner.borrow().sources.is_empty()
    }

    /// Weak handle that does not keep the binding alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakBinding<T> {
        WeakBinding {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Source for Binding<T> {
    type Value = T;
    type Weak = WeakBinding<T>;

    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.with(f)
    }

    fn version(&self) -> u64 {
        if self.is_stale() {
            self.refresh();
        }
        Binding::version(self)
    }

    fn subscribe(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        Binding::subscribe(self, callback)
    }

    fn downgrade(&self) -> WeakBinding<T> {
        Binding::downgrade(self)
    }
}

/// Non-owning handle to a [`Binding`].
pub struct WeakBinding<T> {
    inner: Weak<RefCell<BindingInner<T>>>,
}

impl<T> Clone for WeakBinding<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> WeakSource for WeakBinding<T> {
    type Strong = Binding<T>;

    fn upgrade(&self) -> Option<Binding<T>> {
        self.inner.upgrade().map(|inner| Binding { inner })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
