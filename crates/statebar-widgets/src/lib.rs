#![forbid(unsafe_code)]

//! Status-bar view models.
//!
//! Every widget is built from a [`BarContext`] and exposes [`Segment`]s:
//! bindings for icon, label, tooltip and visibility that a presentation
//! layer reads and subscribes to. External readings (`top`, `/proc`,
//! `niri msg`, `wpctl`, ...) are producers on pollers feeding cells; click
//! and scroll actions launch tasks through the context's command runner.
//!
//! Parsers and formatters are plain functions so they can be tested
//! without a runtime.

pub mod bar;
pub mod clock;
pub mod config;
pub mod context;
pub mod launchers;
pub mod resources;
pub mod screenrec;
pub mod segment;
pub mod status;
pub mod workspaces;

pub use bar::{Bar, BarSnapshot, Input};
pub use clock::Clock;
pub use config::{BarConfig, Commands, ConfigError, Intervals, Paths};
pub use context::BarContext;
pub use launchers::Launcher;
pub use resources::{DiskUsage, MemoryInfo, ReadingError, SystemResources};
pub use screenrec::{Recorder, Toggle};
pub use segment::{Segment, SegmentSnapshot};
pub use status::{Battery, BatteryReading, Bluetooth, BluetoothState, Volume, VolumeReading, Wifi};
pub use workspaces::{CompositorState, Window, Workspace, WorkspaceView, Workspaces};
