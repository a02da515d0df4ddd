#![forbid(unsafe_code)]

//! The whole bar: left, center and right sections.

use serde::Serialize;
use statebar_reactive::Subscription;
use statebar_runtime::Result;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::context::BarContext;
use crate::launchers::Launcher;
use crate::resources::SystemResources;
use crate::screenrec::Recorder;
use crate::segment::{Segment, SegmentSnapshot};
use crate::status::{Battery, Bluetooth, Volume, Wifi};
use crate::workspaces::Workspaces;

/// Pointer input a segment can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Click,
    ScrollUp,
    ScrollDown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarSnapshot {
    pub left: Vec<SegmentSnapshot>,
    pub center: Vec<SegmentSnapshot>,
    pub right: Vec<SegmentSnapshot>,
}

impl BarSnapshot {
    pub fn segments(&self) -> impl Iterator<Item = &SegmentSnapshot> {
        self.left.iter().chain(&self.center).chain(&self.right)
    }
}

pub struct Bar {
    ctx: BarContext,
    pub resources: SystemResources,
    pub apps: Launcher,
    pub recorder: Recorder,
    pub workspaces: Workspaces,
    pub clock: Clock,
    pub bluetooth: Bluetooth,
    pub volume: Volume,
    pub wifi: Wifi,
    pub battery: Battery,
    pub power: Launcher,
    left: Vec<Segment>,
    center: Vec<Segment>,
    right: Vec<Segment>,
}

impl Bar {
    /// Build every widget and start its pollers.
    pub fn new(ctx: &BarContext) -> Result<Self> {
        let resources = SystemResources::new(ctx)?;
        let apps = Launcher::applications(ctx);
        let recorder = Recorder::new(ctx);
        let workspaces = Workspaces::new(ctx)?;
        let clock = Clock::new(ctx)?;
        let bluetooth = Bluetooth::new(ctx)?;
        let volume = Volume::new(ctx)?;
        let wifi = Wifi::new(ctx)?;
        let battery = Battery::new(ctx)?;
        let power = Launcher::power_menu(ctx);

        let mut left = resources.segments();
        left.push(apps.segment());
        left.push(recorder.segment());
        left.push(workspaces.segment());
        let center = vec![clock.segment()];
        let right = vec![
            bluetooth.segment(),
            volume.segment(),
            wifi.segment(),
            battery.segment(),
            power.segment(),
        ];
        info!(
            segments = left.len() + center.len() + right.len(),
            output = ctx.config().output.as_deref().unwrap_or("*"),
            "bar built"
        );

        Ok(Self {
            ctx: ctx.clone(),
            resources,
            apps,
            recorder,
            workspaces,
            clock,
            bluetooth,
            volume,
            wifi,
            battery,
            power,
            left,
            center,
            right,
        })
    }

    #[must_use]
    pub fn context(&self) -> &BarContext {
        &self.ctx
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.left.iter().chain(&self.center).chain(&self.right)
    }

    #[must_use]
    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments().find(|s| s.name == name)
    }

    #[must_use]
    pub fn snapshot(&self) -> BarSnapshot {
        let snap = |segments: &[Segment]| segments.iter().map(Segment::snapshot).collect();
        BarSnapshot {
            left: snap(&self.left),
            center: snap(&self.center),
            right: snap(&self.right),
        }
    }

    /// Invoke `callback` with the segment name whenever that segment changes.
    pub fn on_change(&self, callback: impl Fn(&'static str) + 'static) -> Vec<Subscription> {
        let callback = std::rc::Rc::new(callback);
        self.segments()
            .flat_map(|segment| {
                let cb = std::rc::Rc::clone(&callback);
                let name = segment.name;
                segment.on_change(move || cb(name))
            })
            .collect()
    }

    /// Route pointer input to a segment. Workspaces are addressed as
    /// `workspace:<idx>`. Returns `false` if nothing handles the input.
    pub fn dispatch(&self, target: &str, input: Input) -> bool {
        debug!(target, ?input, "dispatch");
        if let Some(idx) = target.strip_prefix("workspace:") {
            let Ok(idx) = idx.parse::<u32>() else {
                return false;
            };
            let _task = match input {
                Input::Click => self.workspaces.focus(idx),
                Input::ScrollUp => self.workspaces.cycle(idx, true),
                Input::ScrollDown => self.workspaces.cycle(idx, false),
            };
            return true;
        }
        match (target, input) {
            ("cpu" | "memory" | "temperature" | "disk", Input::Click) => {
                self.resources.open_monitor();
            }
            ("apps", Input::Click) => self.apps.activate(),
            ("screenrec", Input::Click) => {
                self.recorder.toggle();
            }
            ("clock", Input::Click) => self.clock.toggle_utc(),
            ("bluetooth", Input::Click) => self.bluetooth.open_menu(),
            ("volume", Input::Click) => self.volume.toggle_mute(),
            ("volume", Input::ScrollUp) => self.volume.scroll_up(),
            ("volume", Input::ScrollDown) => self.volume.scroll_down(),
            ("power", Input::Click) => self.power.activate(),
            _ => return false,
        }
        true
    }

    /// Cancel every poller and pending task.
    pub fn shutdown(&self) {
        self.ctx.runtime().shutdown();
    }
}

impl std::fmt::Debug for Bar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bar")
            .field("left", &self.left)
            .field("center", &self.center)
            .field("right", &self.right)
            .finish_non_exhaustive()
    }
}
