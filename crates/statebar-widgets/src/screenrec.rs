#![forbid(unsafe_code)]

//! Screen-recording toggle.
//!
//! [`Recorder`] owns the recording state. Starting is synchronous on the UI
//! thread (the filename and flag are set before the record command is
//! launched); stopping is a task guarded by an [`InFlight`] flag so repeated
//! clicks cannot interleave two stops.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use statebar_reactive::{Binding, Observable, bind};
use statebar_runtime::{InFlight, SharedRunner, Task, TaskHandle, shell_quote};
use tracing::{debug, info};

use crate::context::BarContext;
use crate::segment::Segment;

pub const ICON_RECORDING: &str = "record-desktop-indicator-recording";
pub const ICON_IDLE: &str = "record-desktop-indicator";

/// `<dir>/screenrec-<UTC %Y%m%d%H%M%S>.mp4`
#[must_use]
pub fn recording_filename(dir: &str, at: &DateTime<Utc>) -> String {
    format!(
        "{}/screenrec-{}.mp4",
        dir.trim_end_matches('/'),
        at.format("%Y%m%d%H%M%S")
    )
}

/// Quote a path for `sh -c`, leaving a leading `~/` outside the quotes so
/// the shell still expands it.
#[must_use]
pub fn quote_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => format!("~/{}", shell_quote(rest)),
        None => shell_quote(path),
    }
}

/// What a click did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Started,
    Stopping,
    /// A stop is still in flight.
    Ignored,
}

pub struct Recorder {
    ctx: BarContext,
    is_recording: Observable<bool>,
    filename: Observable<String>,
    /// Bumped on each start; a failing record task only clears the flag if
    /// no newer recording has begun.
    generation: Rc<Cell<u64>>,
    stopping: InFlight,
    icon: Binding<String>,
}

impl Recorder {
    #[must_use]
    pub fn new(ctx: &BarContext) -> Self {
        let is_recording = Observable::new(false);
        let icon = bind(&is_recording, |on: &bool| {
            if *on { ICON_RECORDING } else { ICON_IDLE }.to_string()
        });
        Self {
            ctx: ctx.clone(),
            is_recording,
            filename: Observable::new(String::new()),
            generation: Rc::new(Cell::new(0)),
            stopping: InFlight::new(),
            icon,
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.is_recording.get()
    }

    #[must_use]
    pub fn filename(&self) -> String {
        self.filename.get()
    }

    #[must_use]
    pub fn icon(&self) -> &Binding<String> {
        &self.icon
    }

    /// Click action.
    pub fn toggle(&self) -> Toggle {
        self.toggle_at(Utc::now())
    }

    /// [`Recorder::toggle`] with an explicit start time.
    pub fn toggle_at(&self, now: DateTime<Utc>) -> Toggle {
        if self.stopping.is_busy() {
            debug!("recorder busy stopping; click ignored");
            return Toggle::Ignored;
        }
        if self.is_recording.get() {
            match self.stop() {
                Some(_) => Toggle::Stopping,
                None => Toggle::Ignored,
            }
        } else {
            self.start(now);
            Toggle::Started
        }
    }

    /// Set the filename, raise the flag, then launch the record command.
    /// The flag drops again if the command fails.
    pub fn start(&self, now: DateTime<Utc>) -> TaskHandle {
        let commands = &self.ctx.config().commands;
        let file = recording_filename(&commands.recordings_dir, &now);
        let command = commands.screenrec_start.replace("{file}", &quote_path(&file));
        info!(%file, "starting screen recording");

        self.filename.set(file);
        self.is_recording.set(true);
        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let runner: SharedRunner = Arc::clone(self.ctx.runner());
        let flag = self.is_recording.clone();
        let current = Rc::clone(&self.generation);
        self.ctx.runtime().launch(
            Task::new(move |cx| runner.run(cx, &command))
                .name("screenrec-record")
                .on_error(move |_| {
                    if current.get() == generation {
                        flag.set(false);
                    }
                }),
        )
    }

    /// Kill the recorder, clear the flag, then notify with the filename.
    /// `None` while a previous stop is still running.
    pub fn stop(&self) -> Option<TaskHandle> {
        let commands = &self.ctx.config().commands;
        let stop = commands.screenrec_stop.clone();
        let notify = format!(
            "{} {} {}",
            commands.notify,
            shell_quote("Screen Recorder .."),
            shell_quote(&format!("Filename: {}", self.filename.get()))
        );

        let runner: SharedRunner = Arc::clone(self.ctx.runner());
        let notify_runner: SharedRunner = Arc::clone(self.ctx.runner());
        let flag = self.is_recording.clone();
        let runtime_ctx = self.ctx.clone();
        self.ctx.runtime().launch_exclusive(
            &self.stopping,
            Task::new(move |cx| runner.run(cx, &stop))
                .name("screenrec-stop")
                .on_success(move |_| {
                    flag.set(false);
                    let _notified = runtime_ctx.runtime().launch(
                        Task::new(move |cx| notify_runner.run(cx, &notify))
                            .name("screenrec-notify"),
                    );
                }),
        )
    }

    #[must_use]
    pub fn segment(&self) -> Segment {
        Segment::new("screenrec").icon(self.icon.clone())
    }
}
