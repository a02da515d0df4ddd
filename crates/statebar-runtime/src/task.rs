#![forbid(unsafe_code)]

//! One-shot operations launched from event handlers.
//!
//! [`Runtime::launch`] runs a [`Task`] on a worker thread and returns at
//! once. The outcome comes back through a runtime inbox, where the task's
//! `on_success` or `on_error` callback runs on the UI thread. Errors and
//! panics are caught at the task boundary; they reach `on_error` and a log
//! record, never the process.
//!
//! Logically exclusive actions (start/stop toggles) go through
//! [`Runtime::launch_exclusive`] with a shared [`InFlight`] guard, which
//! refuses a second launch until the first has settled.

use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use statebar_reactive::panic_message;
use tracing::{debug, error, info_span, trace, warn};
use web_time::Instant;

use crate::cx::{Cx, CxController};
use crate::error::Fault;
use crate::runtime::Runtime;

type Operation<T> = Box<dyn FnOnce(&Cx) -> Result<T, String> + Send>;

/// Completion state of a launched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

/// A one-shot operation plus the callbacks that settle it.
pub struct Task<T> {
    name: String,
    op: Operation<T>,
    on_success: Option<Box<dyn FnOnce(T)>>,
    on_error: Option<Box<dyn FnOnce(&Fault)>>,
}

impl<T: Send + 'static> Task<T> {
    /// Wrap `op`. It runs on a worker thread with the task's [`Cx`].
    pub fn new<E: Display>(op: impl FnOnce(&Cx) -> Result<T, E> + Send + 'static) -> Self {
        Self {
            name: "task".to_string(),
            op: Box::new(move |cx| op(cx).map_err(|err| err.to_string())),
            on_success: None,
            on_error: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Runs on the UI thread with the operation's value.
    #[must_use]
    pub fn on_success(mut self, callback: impl FnOnce(T) + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Recovery callback. Runs on the UI thread before the handle reports
    /// [`TaskState::Failed`].
    #[must_use]
    pub fn on_error(mut self, callback: impl FnOnce(&Fault) + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to a launched task. Dropping it does not cancel the task.
pub struct TaskHandle {
    name: String,
    id: u64,
    ctrl: CxController,
    state: Rc<Cell<TaskState>>,
}

impl TaskHandle {
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Whether the task has settled (any state but `Pending`).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.get() != TaskState::Pending
    }

    /// Cancel a pending task. Its context reports cancellation, and its
    /// result, whenever it arrives, is discarded without running callbacks.
    pub fn cancel(&self) {
        if self.state.get() == TaskState::Pending {
            self.ctrl.cancel();
            self.state.set(TaskState::Cancelled);
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Per-action mutual-exclusion flag for [`Runtime::launch_exclusive`].
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Rc<Cell<bool>>,
}

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Claim the flag, or `None` if already claimed.
    #[must_use]
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        if self.busy.replace(true) {
            None
        } else {
            Some(InFlightGuard {
                busy: Rc::clone(&self.busy),
            })
        }
    }
}

/// Releases its [`InFlight`] on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Rc<Cell<bool>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

enum Report<T> {
    Done(T),
    Failed(Fault),
}

/// UI-side settlement state shared by the inbox sink and its close hook.
struct Settle<T> {
    name: String,
    state: Rc<Cell<TaskState>>,
    on_success: Option<Box<dyn FnOnce(T)>>,
    on_error: Option<Box<dyn FnOnce(&Fault)>>,
    guard: Option<InFlightGuard>,
}

impl<T> Settle<T> {
    fn finish(&mut self, report: Report<T>) {
        if self.state.get() != TaskState::Pending {
            trace!(task = %self.name, "dropping result of cancelled task");
            self.guard.take();
            return;
        }
        match report {
            Report::Done(value) => {
                if let Some(callback) = self.on_success.take() {
                    callback(value);
                }
                self.state.set(TaskState::Succeeded);
            }
            Report::Failed(fault) => {
                warn!(task = %self.name, error = %fault, "task failed");
                if let Some(callback) = self.on_error.take() {
                    callback(&fault);
                }
                self.state.set(TaskState::Failed);
            }
        }
        self.guard.take();
    }
}

impl Runtime {
    /// Launch `task` without blocking. Faults are contained and reported to
    /// the task's `on_error` callback on this thread.
    pub fn launch<T: Send + 'static>(&self, task: Task<T>) -> TaskHandle {
        self.launch_guarded(task, None)
    }

    /// Launch `task` unless another task holding `guard` is still pending.
    ///
    /// The guard is released after the task's callbacks have run.
    pub fn launch_exclusive<T: Send + 'static>(
        &self,
        guard: &InFlight,
        task: Task<T>,
    ) -> Option<TaskHandle> {
        let Some(claim) = guard.try_acquire() else {
            debug!(task = %task.name, "launch refused; action already in flight");
            return None;
        };
        Some(self.launch_guarded(task, Some(claim)))
    }

    fn launch_guarded<T: Send + 'static>(
        &self,
        task: Task<T>,
        guard: Option<InFlightGuard>,
    ) -> TaskHandle {
        let Task {
            name,
            op,
            on_success,
            on_error,
        } = task;
        let (cx, ctrl) = self.cx().child(name.clone());
        let task_id = cx.id();
        let state = Rc::new(Cell::new(TaskState::Pending));

        let settle = Rc::new(RefCell::new(Settle {
            name: name.clone(),
            state: Rc::clone(&state),
            on_success,
            on_error,
            guard,
        }));
        let on_report = Rc::clone(&settle);
        let lost_name = name.clone();
        let inlet = self.inlet_with_close(
            move |report: Report<T>| on_report.borrow_mut().finish(report),
            move || {
                let mut settle = settle.borrow_mut();
                if settle.state.get() == TaskState::Pending {
                    error!(task = %lost_name, "task worker vanished without a result");
                    settle.finish(Report::Failed(Fault::TaskLost { task: lost_name }));
                } else {
                    settle.guard.take();
                }
            },
        );

        let worker_name = name.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("statebar-task-{name}"))
            .spawn(move || {
                let _span = info_span!("statebar.task", task = %worker_name, task_id).entered();
                let started = Instant::now();
                let outcome = catch_unwind(AssertUnwindSafe(|| op(&cx)));
                let duration_us = started.elapsed().as_micros() as u64;
                let report = match outcome {
                    Ok(Ok(value)) => {
                        debug!(duration_us, "task succeeded");
                        Report::Done(value)
                    }
                    Ok(Err(message)) => Report::Failed(Fault::Task {
                        task: worker_name,
                        message,
                    }),
                    Err(payload) => Report::Failed(Fault::TaskPanicked {
                        task: worker_name,
                        message: panic_message(payload.as_ref()),
                    }),
                };
                inlet.send(report);
            });
        // On spawn failure the closure, and with it the inlet, is dropped;
        // the close hook settles the task as lost on the next run.
        if let Err(err) = spawned {
            error!(task = %name, error = %err, "failed to spawn task worker");
        }

        TaskHandle {
            name,
            id: task_id,
            ctrl,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statebar_reactive::Observable;
    use web_time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn launch_returns_before_operation_finishes() {
        let rt = Runtime::new();
        let started = Instant::now();
        let handle = rt.launch(Task::new(|cx: &Cx| {
            cx.sleep(Duration::from_millis(100));
            Ok::<_, String>(())
        }));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(handle.state(), TaskState::Pending);
        assert!(rt.run_until(|| handle.is_finished(), WAIT));
        assert_eq!(handle.state(), TaskState::Succeeded);
    }

    #[test]
    fn success_callback_receives_value() {
        let rt = Runtime::new();
        let cell = Observable::new(String::new());
        let c = cell.clone();
        let handle = rt.launch(
            Task::new(|_: &Cx| Ok::<_, String>("done".to_string()))
                .name("echo")
                .on_success(move |v| c.set(v)),
        );
        assert!(rt.run_until(|| handle.is_finished(), WAIT));
        assert_eq!(cell.get(), "done");
    }

    #[test]
    fn failure_runs_recovery_before_failed_state() {
        let rt = Runtime::new();
        let flag = Observable::new(true);
        let f = flag.clone();
        let handle = rt.launch(
            Task::new(|_: &Cx| Err::<(), _>("exit status 1"))
                .name("start")
                .on_error(move |fault| {
                    assert!(matches!(fault, Fault::Task { .. }));
                    f.set(false);
                }),
        );
        assert!(rt.run_until(|| handle.is_finished(), WAIT));
        assert_eq!(handle.state(), TaskState::Failed);
        assert!(!flag.get());
    }

    #[test]
    fn panic_is_contained() {
        let rt = Runtime::new();
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        let handle = rt.launch(
            Task::new(|_: &Cx| -> Result<(), String> { panic!("operation exploded") })
                .on_error(move |fault| *s.borrow_mut() = Some(fault.clone())),
        );
        assert!(rt.run_until(|| handle.is_finished(), WAIT));
        assert_eq!(
            *seen.borrow(),
            Some(Fault::TaskPanicked {
                task: "task".into(),
                message: "operation exploded".into(),
            })
        );

        let next = rt.launch(Task::new(|_: &Cx| Ok::<_, String>(1)));
        assert!(rt.run_until(|| next.is_finished(), WAIT));
        assert_eq!(next.state(), TaskState::Succeeded);
    }

    #[test]
    fn cancelled_task_skips_callbacks() {
        let rt = Runtime::new();
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        let handle = rt.launch(
            Task::new(|cx: &Cx| {
                cx.sleep(Duration::from_secs(30));
                Ok::<_, String>(())
            })
            .on_success(move |()| r.set(true)),
        );
        handle.cancel();
        assert_eq!(handle.state(), TaskState::Cancelled);
        assert!(rt.run_until_idle(WAIT));
        assert!(!ran.get());
        assert_eq!(handle.state(), TaskState::Cancelled);
    }

    #[test]
    fn exclusive_launch_refuses_while_in_flight() {
        let rt = Runtime::new();
        let guard = InFlight::new();
        let first = rt
            .launch_exclusive(
                &guard,
                Task::new(|cx: &Cx| {
                    cx.sleep(Duration::from_millis(50));
                    Ok::<_, String>(())
                }),
            )
            .expect("first launch");
        assert!(guard.is_busy());
        assert!(
            rt.launch_exclusive(&guard, Task::new(|_: &Cx| Ok::<_, String>(())))
                .is_none()
        );

        assert!(rt.run_until(|| first.is_finished(), WAIT));
        assert!(!guard.is_busy());
        assert!(
            rt.launch_exclusive(&guard, Task::new(|_: &Cx| Ok::<_, String>(())))
                .is_some()
        );
    }

    #[test]
    fn guard_released_after_failure() {
        let rt = Runtime::new();
        let guard = InFlight::new();
        let handle = rt
            .launch_exclusive(&guard, Task::new(|_: &Cx| Err::<(), _>("nope")))
            .expect("launch");
        assert!(rt.run_until(|| handle.is_finished(), WAIT));
        assert!(!guard.is_busy());
    }

    #[test]
    fn in_flight_guard_is_raii() {
        let flag = InFlight::new();
        let claim = flag.try_acquire().expect("free");
        assert!(flag.try_acquire().is_none());
        drop(claim);
        assert!(flag.try_acquire().is_some());
    }
}
