#![forbid(unsafe_code)]

//! Recurring producers that feed cells.
//!
//! A poller owns one worker thread. The worker sleeps until the next tick,
//! runs the producer, and sends the outcome to a runtime inbox; the sink
//! (typically a cell write) runs on the UI thread. Because the producer runs
//! inline on its worker, two invocations of the same poller can never
//! overlap. Boundaries that pass while an invocation is in flight are
//! counted as skipped.
//!
//! # Cancellation
//!
//! [`PollerHandle::cancel`] (or dropping the handle, or
//! [`Runtime::shutdown`]) stops future ticks. A result produced after
//! cancellation is dropped twice over: the worker discards it, and the
//! UI-side sink refuses anything that slips through.

use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use statebar_reactive::{Observable, WeakSource, panic_message};
use tracing::{debug, debug_span, trace, warn};
use web_time::{Duration, Instant};

use crate::cx::{Cx, CxController};
use crate::error::{Fault, Result, RuntimeError};
use crate::runtime::Runtime;
use crate::schedule::TickSchedule;

type ErrorHook = Box<dyn Fn(&Fault)>;

/// What a worker hands to the UI thread after one tick.
enum Delivery<T> {
    Value(T),
    Fault(Fault),
}

/// Counters of one poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Producer invocations started.
    pub ticks: u64,
    /// Boundaries that passed while an invocation was in flight.
    pub skipped: u64,
    /// Invocations that returned an error or panicked.
    pub faults: u64,
    /// Values handed to the sink.
    pub applied: u64,
    /// Results discarded because the poller was cancelled.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    skipped: AtomicU64,
    faults: AtomicU64,
    applied: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicBool,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PollerStats {
        PollerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Builder for a poller.
///
/// ```no_run
/// use statebar_reactive::Observable;
/// use statebar_runtime::{Poll, Runtime};
/// use std::time::Duration;
///
/// let rt = Runtime::new();
/// let load = Observable::new("0.00".to_string());
/// let poller = Poll::every(Duration::from_secs(10))
///     .name("cpu")
///     .spawn_into(&rt, |_cx| Ok::<_, String>("0.42".to_string()), &load)
///     .expect("spawn poller");
/// rt.run_for(Duration::from_secs(1));
/// poller.cancel();
/// ```
pub struct Poll {
    interval: Duration,
    immediate: bool,
    name: String,
    on_error: Option<ErrorHook>,
}

impl Poll {
    /// Tick every `interval`, starting immediately.
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            immediate: true,
            name: "poller".to_string(),
            on_error: None,
        }
    }

    /// Whether the first tick fires at spawn time (default) or one interval
    /// later.
    #[must_use]
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hook invoked on the UI thread for each failed or panicked tick.
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&Fault) + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Start the poller, writing each produced value into `cell`.
    ///
    /// The poller holds the cell weakly; once the cell is gone, values are
    /// discarded.
    pub fn spawn_into<T, E, P>(
        self,
        rt: &Runtime,
        producer: P,
        cell: &Observable<T>,
    ) -> Result<PollerHandle>
    where
        T: Clone + PartialEq + Send + 'static,
        E: Display,
        P: FnMut(&Cx) -> std::result::Result<T, E> + Send + 'static,
    {
        let weak = cell.downgrade();
        self.spawn(rt, producer, move |value| {
            if let Some(cell) = weak.upgrade() {
                cell.set(value);
            }
        })
    }

    /// Start the poller, passing each produced value to `sink` on the UI
    /// thread.
    pub fn spawn<T, E, P, S>(self, rt: &Runtime, producer: P, sink: S) -> Result<PollerHandle>
    where
        T: Send + 'static,
        E: Display,
        P: FnMut(&Cx) -> std::result::Result<T, E> + Send + 'static,
        S: FnMut(T) + 'static,
    {
        if self.interval.is_zero() {
            return Err(RuntimeError::InvalidInterval);
        }
        let Poll {
            interval,
            immediate,
            name,
            on_error,
        } = self;

        let (cx, ctrl) = rt.cx().child(name.clone());
        let counters = Arc::new(Counters::default());

        let inlet = {
            let cx = cx.clone();
            let counters = Arc::clone(&counters);
            let name = name.clone();
            let mut sink = sink;
            rt.inlet(move |delivery: Delivery<T>| {
                if cx.is_cancelled() {
                    Counters::bump(&counters.dropped, 1);
                    trace!(poller = %name, "dropping delivery after cancellation");
                    return;
                }
                match delivery {
                    Delivery::Value(value) => {
                        Counters::bump(&counters.applied, 1);
                        sink(value);
                    }
                    Delivery::Fault(fault) => {
                        warn!(poller = %name, error = %fault, "poll tick failed");
                        if let Some(hook) = &on_error {
                            hook(&fault);
                        }
                    }
                }
            })
        };

        let worker = Worker {
            cx: cx.clone(),
            name: name.clone(),
            counters: Arc::clone(&counters),
            schedule: TickSchedule::new(Instant::now(), interval, immediate),
        };
        let mut producer = producer;
        let thread = std::thread::Builder::new()
            .name(format!("statebar-poll-{name}"))
            .spawn(move || {
                worker.run(&mut producer, |delivery| inlet.send(delivery));
            })
            .map_err(|source| RuntimeError::Spawn {
                name: name.clone(),
                source,
            })?;

        debug!(poller = %name, poller_id = cx.id(), interval_ms = interval.as_millis() as u64, "poller started");
        Ok(PollerHandle {
            name,
            cx,
            ctrl,
            counters,
            thread: Some(thread),
        })
    }
}

impl std::fmt::Debug for Poll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poll")
            .field("interval", &self.interval)
            .field("immediate", &self.immediate)
            .field("name", &self.name)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

struct Worker {
    cx: Cx,
    name: String,
    counters: Arc<Counters>,
    schedule: TickSchedule,
}

impl Worker {
    fn run<T, E, P>(mut self, producer: &mut P, mut send: impl FnMut(Delivery<T>) -> bool)
    where
        E: Display,
        P: FnMut(&Cx) -> std::result::Result<T, E>,
    {
        let poller_id = self.cx.id();
        while self.cx.sleep_until(self.schedule.next_tick()) {
            self.counters.in_flight.store(true, Ordering::Release);
            let tick = self.counters.ticks.fetch_add(1, Ordering::Relaxed) + 1;
            let _span = debug_span!("statebar.poll", poller = %self.name, poller_id, tick).entered();
            let started = Instant::now();

            let outcome = catch_unwind(AssertUnwindSafe(|| producer(&self.cx)));
            self.counters.in_flight.store(false, Ordering::Release);

            if self.cx.is_cancelled() {
                Counters::bump(&self.counters.dropped, 1);
                trace!("result produced after cancellation dropped");
                break;
            }

            let delivery = match outcome {
                Ok(Ok(value)) => Delivery::Value(value),
                Ok(Err(err)) => {
                    Counters::bump(&self.counters.faults, 1);
                    Delivery::Fault(Fault::Producer {
                        poller: self.name.clone(),
                        message: err.to_string(),
                    })
                }
                Err(payload) => {
                    Counters::bump(&self.counters.faults, 1);
                    Delivery::Fault(Fault::ProducerPanicked {
                        poller: self.name.clone(),
                        message: panic_message(payload.as_ref()),
                    })
                }
            };
            let duration_us = started.elapsed().as_micros() as u64;
            trace!(duration_us, "tick finished");

            if !send(delivery) {
                debug!("runtime gone; stopping poller");
                break;
            }

            let skipped = self.schedule.complete(Instant::now());
            if skipped > 0 {
                Counters::bump(&self.counters.skipped, skipped);
                debug!(skipped, duration_us, "producer overran its interval; ticks skipped");
            }
        }
        debug!(poller = %self.name, poller_id, "poller stopped");
    }
}

/// Handle to a running poller. Dropping it cancels the poller.
pub struct PollerHandle {
    name: String,
    cx: Cx,
    ctrl: CxController,
    counters: Arc<Counters>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop future ticks. An in-flight invocation may finish, but its result
    /// is not applied.
    pub fn cancel(&self) {
        self.ctrl.cancel();
    }

    /// Cancel and wait for the worker thread to exit.
    ///
    /// Blocks for as long as an in-flight producer keeps running.
    pub fn cancel_and_join(mut self) {
        self.ctrl.cancel();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(poller = %self.name, "poller worker panicked outside the producer");
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cx.is_cancelled()
    }

    /// Whether the producer is running right now.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> PollerStats {
        self.counters.snapshot()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier shared with the poller's log records.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.cx.id()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.ctrl.cancel();
    }
}

impl std::fmt::Debug for PollerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerHandle")
            .field("name", &self.name)
            .field("id", &self.id())
            .field("cancelled", &self.is_cancelled())
            .field("stats", &self.stats())
            .finish()
    }
}
