#![forbid(unsafe_code)]

//! Bar configuration.
//!
//! Every field has a default matching a stock niri + PipeWire desktop, so an
//! empty JSON object (or no file at all) is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::Duration;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BarConfig {
    /// Monitor connector (for example `eDP-1`) whose workspaces are shown.
    /// `None` shows workspaces of every output.
    pub output: Option<String>,
    pub intervals: Intervals,
    pub commands: Commands,
    pub paths: Paths,
}

/// Poll periods in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intervals {
    pub clock_ms: u64,
    pub cpu_ms: u64,
    pub memory_ms: u64,
    pub temperature_ms: u64,
    pub disk_ms: u64,
    pub workspaces_ms: u64,
    pub battery_ms: u64,
    pub volume_ms: u64,
    pub bluetooth_ms: u64,
    pub wifi_ms: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            clock_ms: 50,
            cpu_ms: 10_000,
            memory_ms: 1_000,
            temperature_ms: 10_000,
            disk_ms: 15_000,
            workspaces_ms: 250,
            battery_ms: 30_000,
            volume_ms: 1_000,
            bluetooth_ms: 5_000,
            wifi_ms: 5_000,
        }
    }
}

impl Intervals {
    fn named(&self) -> [(&'static str, u64); 10] {
        [
            ("clock_ms", self.clock_ms),
            ("cpu_ms", self.cpu_ms),
            ("memory_ms", self.memory_ms),
            ("temperature_ms", self.temperature_ms),
            ("disk_ms", self.disk_ms),
            ("workspaces_ms", self.workspaces_ms),
            ("battery_ms", self.battery_ms),
            ("volume_ms", self.volume_ms),
            ("bluetooth_ms", self.bluetooth_ms),
            ("wifi_ms", self.wifi_ms),
        ]
    }
}

/// Converts a millisecond setting into a poll period.
#[must_use]
pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// External command lines, run through `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    pub cpu: String,
    pub disk: String,
    pub system_monitor: String,
    pub launcher: String,
    pub power_menu: String,
    pub bluetooth_menu: String,
    pub bluetooth_show: String,
    pub bluetooth_devices: String,
    pub wifi: String,
    pub volume_get: String,
    pub volume_mute: String,
    pub volume_scroll_up: String,
    pub volume_scroll_down: String,
    /// Recording command; `{file}` is replaced with the quoted target path.
    pub screenrec_start: String,
    pub screenrec_stop: String,
    pub notify: String,
    pub niri: String,
    /// Directory recordings are written to.
    pub recordings_dir: String,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            cpu: "top -b -n1".to_string(),
            disk: "df -h".to_string(),
            system_monitor: "kitty -e btop".to_string(),
            launcher: "~/.config/rofi/launchers/type-3/launcher.sh".to_string(),
            power_menu: "~/.config/rofi/powermenu/type-5/powermenu.sh".to_string(),
            bluetooth_menu: "./scripts/bluetooth.sh".to_string(),
            bluetooth_show: "bluetoothctl show".to_string(),
            bluetooth_devices: "bluetoothctl devices Connected".to_string(),
            wifi: "nmcli -t -f active,ssid dev wifi".to_string(),
            volume_get: "wpctl get-volume @DEFAULT_AUDIO_SINK@".to_string(),
            volume_mute: "wpctl set-mute @DEFAULT_AUDIO_SINK@ toggle".to_string(),
            volume_scroll_up: "wpctl set-volume @DEFAULT_AUDIO_SINK@ 5%-".to_string(),
            volume_scroll_down: "wpctl set-volume @DEFAULT_AUDIO_SINK@ 5%+".to_string(),
            screenrec_start: "wl-screenrec -g \"$(slurp)\" -f {file}".to_string(),
            screenrec_stop: "pkill wl-screenrec".to_string(),
            notify: "notify-send".to_string(),
            niri: "niri".to_string(),
            recordings_dir: "~/Videos".to_string(),
        }
    }
}

/// Kernel interfaces read directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub meminfo: PathBuf,
    pub thermal_zone: PathBuf,
    /// Power-supply directory holding `capacity` and `status`.
    pub battery: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            meminfo: PathBuf::from("/proc/meminfo"),
            thermal_zone: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            battery: PathBuf::from("/sys/class/power_supply/BAT0"),
        }
    }
}

impl BarConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((name, _)) = self.intervals.named().into_iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid {
                message: format!("intervals.{name} must be greater than zero"),
            });
        }
        if !self.commands.screenrec_start.contains("{file}") {
            return Err(ConfigError::Invalid {
                message: "commands.screenrec_start must contain `{file}`".to_string(),
            });
        }
        Ok(())
    }

    /// Executables the configured commands depend on, for availability
    /// checks.
    #[must_use]
    pub fn required_programs(&self) -> Vec<String> {
        let c = &self.commands;
        let mut programs: Vec<String> = [
            &c.cpu,
            &c.disk,
            &c.system_monitor,
            &c.bluetooth_show,
            &c.wifi,
            &c.volume_get,
            &c.screenrec_start,
            &c.screenrec_stop,
            &c.notify,
            &c.niri,
        ]
        .into_iter()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|program| !program.starts_with('~') && !program.starts_with('.'))
        .map(str::to_string)
        .collect();
        programs.sort();
        programs.dedup();
        programs
    }
}
