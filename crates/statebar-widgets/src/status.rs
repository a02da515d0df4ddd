#![forbid(unsafe_code)]

//! Right-hand status segments: battery, volume, bluetooth and Wi-Fi.

use std::path::Path;
use std::sync::Arc;

use statebar_reactive::{Observable, bind};
use statebar_runtime::{CommandRunner, Poll, PollerHandle, Result, SharedRunner, ShellError};
use tracing::debug;

use crate::config::millis;
use crate::context::BarContext;
use crate::resources::{ReadingError, launch_command};
use crate::segment::Segment;

// ── Battery ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub percent: f64,
    pub charging: bool,
}

impl BatteryReading {
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}%", self.percent.floor() as i64)
    }

    /// `battery-level-<nearest 10>[-charging]-symbolic`
    #[must_use]
    pub fn icon(&self) -> String {
        let level = ((self.percent / 10.0).round_ties_even() as i64 * 10).clamp(0, 100);
        let charging = if self.charging { "-charging" } else { "" };
        format!("battery-level-{level}{charging}-symbolic")
    }
}

/// Parse the `capacity` and `status` files of a power-supply directory.
#[must_use]
pub fn parse_battery(capacity: &str, status: &str) -> Option<BatteryReading> {
    let percent: f64 = capacity.trim().parse().ok()?;
    Some(BatteryReading {
        percent,
        charging: status.trim() == "Charging",
    })
}

/// `Ok(None)` when the machine has no battery at `dir`.
pub fn read_battery(dir: &Path) -> std::result::Result<Option<BatteryReading>, ReadingError> {
    let capacity_path = dir.join("capacity");
    if !capacity_path.exists() {
        return Ok(None);
    }
    let read = |path: &Path| {
        std::fs::read_to_string(path).map_err(|source| ReadingError::Io {
            path: path.display().to_string(),
            source,
        })
    };
    let capacity = read(&capacity_path)?;
    let status = read(&dir.join("status")).unwrap_or_default();
    parse_battery(&capacity, &status)
        .map(Some)
        .ok_or_else(|| ReadingError::Malformed {
            path: capacity_path.display().to_string(),
        })
}

pub struct Battery {
    pub reading: Observable<Option<BatteryReading>>,
    segment: Segment,
    _poller: PollerHandle,
}

impl Battery {
    pub fn new(ctx: &BarContext) -> Result<Self> {
        let reading = Observable::new(None);
        let segment = Segment::new("battery")
            .class("battery")
            .icon(bind(&reading, |r: &Option<BatteryReading>| {
                r.map(|r| r.icon()).unwrap_or_default()
            }))
            .label(bind(&reading, |r: &Option<BatteryReading>| {
                r.map(|r| r.label()).unwrap_or_default()
            }))
            .visible(bind(&reading, Option::is_some));

        let dir = ctx.config().paths.battery.clone();
        let poller = Poll::every(millis(ctx.config().intervals.battery_ms))
            .name("battery")
            .spawn_into(ctx.runtime(), move |_| read_battery(&dir), &reading)?;
        Ok(Self {
            reading,
            segment,
            _poller: poller,
        })
    }

    #[must_use]
    pub fn segment(&self) -> Segment {
        self.segment.clone()
    }
}

// ── Volume ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeReading {
    pub percent: u32,
    pub muted: bool,
}

impl VolumeReading {
    #[must_use]
    pub fn icon(&self) -> &'static str {
        match self.percent {
            _ if self.muted => "audio-volume-muted-symbolic",
            0 => "audio-volume-muted-symbolic",
            1..=33 => "audio-volume-low-symbolic",
            34..=66 => "audio-volume-medium-symbolic",
            _ => "audio-volume-high-symbolic",
        }
    }
}

/// `Volume: 0.45 [MUTED]` from `wpctl get-volume`.
#[must_use]
pub fn parse_wpctl_volume(output: &str) -> Option<VolumeReading> {
    let rest = output.trim().strip_prefix("Volume:")?;
    let mut words = rest.split_whitespace();
    let fraction: f64 = words.next()?.parse().ok()?;
    if !fraction.is_finite() || fraction < 0.0 {
        return None;
    }
    Some(VolumeReading {
        percent: (fraction * 100.0).round() as u32,
        muted: words.any(|w| w == "[MUTED]"),
    })
}

pub struct Volume {
    ctx: BarContext,
    pub reading: Observable<VolumeReading>,
    segment: Segment,
    _poller: PollerHandle,
}

impl Volume {
    pub fn new(ctx: &BarContext) -> Result<Self> {
        let reading = Observable::new(VolumeReading::default());
        let segment = Segment::new("volume")
            .class("volume")
            .icon(bind(&reading, |r: &VolumeReading| r.icon().to_string()))
            .label(bind(&reading, |r: &VolumeReading| format!("{}%", r.percent)));

        let runner: SharedRunner = Arc::clone(ctx.runner());
        let command = ctx.config().commands.volume_get.clone();
        let poller = Poll::every(millis(ctx.config().intervals.volume_ms))
            .name("volume")
            .spawn_into(
                ctx.runtime(),
                move |cx| {
                    let out = runner.run(cx, &command)?;
                    parse_wpctl_volume(&out).ok_or_else(|| ReadingError::NoMatch {
                        command: command.clone(),
                    })
                },
                &reading,
            )?;
        Ok(Self {
            ctx: ctx.clone(),
            reading,
            segment,
            _poller: poller,
        })
    }

    /// Click action.
    pub fn toggle_mute(&self) {
        let command = self.ctx.config().commands.volume_mute.clone();
        launch_command(&self.ctx, "volume-mute", command);
    }

    /// Scroll-up action.
    pub fn scroll_up(&self) {
        let command = self.ctx.config().commands.volume_scroll_up.clone();
        launch_command(&self.ctx, "volume-scroll", command);
    }

    /// Scroll-down action.
    pub fn scroll_down(&self) {
        let command = self.ctx.config().commands.volume_scroll_down.clone();
        launch_command(&self.ctx, "volume-scroll", command);
    }

    #[must_use]
    pub fn segment(&self) -> Segment {
        self.segment.clone()
    }
}

// ── Bluetooth ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BluetoothState {
    pub powered: bool,
    /// Aliases of connected devices.
    pub devices: Vec<String>,
}

impl BluetoothState {
    #[must_use]
    pub fn icon(&self) -> &'static str {
        if self.powered {
            "bluetooth-active-symbolic"
        } else {
            "bluetooth-disabled-symbolic"
        }
    }
}

/// `Powered: yes` in `bluetoothctl show`.
#[must_use]
pub fn parse_powered(show_output: &str) -> bool {
    show_output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Powered:"))
        .any(|value| value.trim() == "yes")
}

/// Aliases from `Device <MAC> <alias>` lines.
#[must_use]
pub fn parse_connected_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (_mac, alias) = rest.split_once(' ')?;
            let alias = alias.trim();
            (!alias.is_empty()).then(|| alias.to_string())
        })
        .collect()
}

fn read_bluetooth(
    runner: &dyn CommandRunner,
    cx: &statebar_runtime::Cx,
    show: &str,
    devices: &str,
) -> std::result::Result<BluetoothState, ShellError> {
    let powered = parse_powered(&runner.run(cx, show)?);
    let devices = if powered {
        parse_connected_devices(&runner.run(cx, devices)?)
    } else {
        Vec::new()
    };
    Ok(BluetoothState { powered, devices })
}

pub struct Bluetooth {
    ctx: BarContext,
    pub state: Observable<BluetoothState>,
    segment: Segment,
    _poller: PollerHandle,
}

impl Bluetooth {
    pub fn new(ctx: &BarContext) -> Result<Self> {
        let state = Observable::new(BluetoothState::default());
        let segment = Segment::new("bluetooth")
            .class("bluetooth")
            .icon(bind(&state, |s: &BluetoothState| s.icon().to_string()))
            .label(bind(&state, |s: &BluetoothState| s.devices.join(", ")));

        let runner: SharedRunner = Arc::clone(ctx.runner());
        let show = ctx.config().commands.bluetooth_show.clone();
        let devices = ctx.config().commands.bluetooth_devices.clone();
        let poller = Poll::every(millis(ctx.config().intervals.bluetooth_ms))
            .name("bluetooth")
            .spawn_into(
                ctx.runtime(),
                move |cx| read_bluetooth(runner.as_ref(), cx, &show, &devices),
                &state,
            )?;
        Ok(Self {
            ctx: ctx.clone(),
            state,
            segment,
            _poller: poller,
        })
    }

    /// Click action: open the bluetooth menu script.
    pub fn open_menu(&self) {
        let command = self.ctx.config().commands.bluetooth_menu.clone();
        debug!(%command, "opening bluetooth menu");
        launch_command(&self.ctx, "bluetooth-menu", command);
    }

    #[must_use]
    pub fn segment(&self) -> Segment {
        self.segment.clone()
    }
}

// ── Wi-Fi ───────────────────────────────────────────────────────────────────

/// SSID of the active row of `nmcli -t -f active,ssid dev wifi`.
///
/// Terse mode escapes `:` and `\` in values with a backslash.
#[must_use]
pub fn parse_active_ssid(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let ssid = line.strip_prefix("yes:")?;
        let mut out = String::with_capacity(ssid.len());
        let mut chars = ssid.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        (!out.is_empty()).then_some(out)
    })
}

pub struct Wifi {
    pub ssid: Observable<Option<String>>,
    segment: Segment,
    _poller: PollerHandle,
}

impl Wifi {
    pub fn new(ctx: &BarContext) -> Result<Self> {
        let ssid = Observable::new(None);
        let segment = Segment::new("wifi")
            .class("wifi")
            .icon(bind(&ssid, |s: &Option<String>| {
                if s.is_some() {
                    "network-wireless-symbolic"
                } else {
                    "network-wireless-offline-symbolic"
                }
                .to_string()
            }))
            .label(bind(&ssid, |s: &Option<String>| s.clone().unwrap_or_default()))
            .visible(bind(&ssid, Option::is_some));

        let runner: SharedRunner = Arc::clone(ctx.runner());
        let command = ctx.config().commands.wifi.clone();
        let poller = Poll::every(millis(ctx.config().intervals.wifi_ms))
            .name("wifi")
            .spawn_into(
                ctx.runtime(),
                move |cx| runner.run(cx, &command).map(|out| parse_active_ssid(&out)),
                &ssid,
            )?;
        Ok(Self {
            ssid,
            segment,
            _poller: poller,
        })
    }

    #[must_use]
    pub fn segment(&self) -> Segment {
        self.segment.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_label_floors_and_icon_rounds() {
        let r = parse_battery("57\n", "Discharging\n").expect("battery");
        assert_eq!(r.label(), "57%");
        assert_eq!(r.icon(), "battery-level-60-symbolic");
        let r = parse_battery("100", "Charging").expect("battery");
        assert_eq!(r.icon(), "battery-level-100-charging-symbolic");
        let r = parse_battery("4", "Discharging").expect("battery");
        assert_eq!(r.icon(), "battery-level-0-symbolic");
        assert!(parse_battery("full", "").is_none());
    }

    #[test]
    fn missing_battery_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_battery(dir.path()).expect("read"), None);
    }

    #[test]
    fn battery_files_are_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("capacity"), "81\n").expect("write");
        std::fs::write(dir.path().join("status"), "Charging\n").expect("write");
        let reading = read_battery(dir.path()).expect("read").expect("present");
        assert_eq!(reading.label(), "81%");
        assert!(reading.charging);
    }

    #[test]
    fn wpctl_volume_parses() {
        assert_eq!(
            parse_wpctl_volume("Volume: 0.45\n"),
            Some(VolumeReading {
                percent: 45,
                muted: false
            })
        );
        let muted = parse_wpctl_volume("Volume: 0.30 [MUTED]").expect("muted");
        assert!(muted.muted);
        assert_eq!(muted.icon(), "audio-volume-muted-symbolic");
        assert_eq!(parse_wpctl_volume("Volume: 1.00").expect("max").icon(), "audio-volume-high-symbolic");
        assert_eq!(parse_wpctl_volume("nonsense"), None);
    }

    #[test]
    fn bluetooth_parsers() {
        let show = "Controller 00:11:22:33:44:55 (public)\n\tName: host\n\tPowered: yes\n";
        assert!(parse_powered(show));
        assert!(!parse_powered("\tPowered: no\n"));
        let devices = "Device AA:BB:CC:DD:EE:FF WH-1000XM4\nDevice 11:22:33:44:55:66 MX Master 3\n";
        assert_eq!(
            parse_connected_devices(devices),
            vec!["WH-1000XM4".to_string(), "MX Master 3".to_string()]
        );
        assert!(parse_connected_devices("").is_empty());
    }

    #[test]
    fn active_ssid_is_unescaped() {
        let out = "no:Neighbour\nyes:Cafe\\:Guest\nno:Other\n";
        assert_eq!(parse_active_ssid(out).as_deref(), Some("Cafe:Guest"));
        assert_eq!(parse_active_ssid("no:Neighbour\n"), None);
    }
}
