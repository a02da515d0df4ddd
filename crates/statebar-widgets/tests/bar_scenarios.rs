//! Whole-bar scenarios against a scripted command runner.

use std::path::Path;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use statebar_runtime::{CommandOutput, CommandRunner, Cx, Runtime, ShellError, TaskState};
use statebar_widgets::{Bar, BarConfig, BarContext, Input, Recorder, Toggle};
use web_time::Duration;

const WAIT: Duration = Duration::from_secs(5);

const TOP: &str = "top - 10:42:01 up 3 days,  2:11,  2 users,  load average: 0.52, 0.58, 0.59\n";
const DF: &str = "Filesystem      Size  Used Avail Use% Mounted on\n/dev/nvme0n1p2  467G  201G  243G  46% /\n";
const WORKSPACES: &str = r#"[{"id": 1, "idx": 1, "output": "eDP-1", "is_active": true, "is_focused": true},
                             {"id": 2, "idx": 2, "output": "eDP-1", "is_active": false, "is_focused": false}]"#;
const WINDOWS: &str = r#"[{"id": 10, "app_id": "kitty", "workspace_id": 2}]"#;

/// Answers commands by substring match and records every call.
#[derive(Default)]
struct ScriptedRunner {
    rules: Vec<(&'static str, Result<&'static str, &'static str>)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn answer(mut self, pattern: &'static str, stdout: &'static str) -> Self {
        self.rules.push((pattern, Ok(stdout)));
        self
    }

    fn fail(mut self, pattern: &'static str, stderr: &'static str) -> Self {
        self.rules.push((pattern, Err(stderr)));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    fn called(&self, pattern: &str) -> bool {
        self.calls().iter().any(|c| c.contains(pattern))
    }
}

impl CommandRunner for ScriptedRunner {
    fn output(&self, _cx: &Cx, command: &str) -> Result<CommandOutput, ShellError> {
        self.calls.lock().expect("calls").push(command.to_string());
        let rule = self.rules.iter().find(|(pattern, _)| command.contains(pattern));
        Ok(match rule {
            Some((_, Ok(stdout))) => CommandOutput {
                status: Some(0),
                stdout: (*stdout).to_string(),
                stderr: String::new(),
            },
            Some((_, Err(stderr))) => CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: (*stderr).to_string(),
            },
            None => CommandOutput {
                status: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            },
        })
    }
}

fn standard_runner() -> ScriptedRunner {
    ScriptedRunner::default()
        .answer("top -b -n1", TOP)
        .answer("df -h", DF)
        .answer("msg -j workspaces", WORKSPACES)
        .answer("msg -j windows", WINDOWS)
        .answer("get-volume", "Volume: 0.45\n")
        .answer("bluetoothctl show", "\tPowered: yes\n")
        .answer("devices Connected", "Device AA:BB:CC:DD:EE:FF Headphones\n")
        .answer("nmcli", "no:Other\nyes:HomeNet\n")
}

fn config_in(dir: &Path) -> BarConfig {
    std::fs::write(
        dir.join("meminfo"),
        "MemTotal:       16318480 kB\nMemAvailable:    9101840 kB\n",
    )
    .expect("meminfo");
    std::fs::write(dir.join("temp"), "45500\n").expect("temp");
    let battery = dir.join("BAT0");
    std::fs::create_dir(&battery).expect("battery dir");
    std::fs::write(battery.join("capacity"), "57\n").expect("capacity");
    std::fs::write(battery.join("status"), "Discharging\n").expect("status");

    let mut config = BarConfig::default();
    config.output = Some("eDP-1".to_string());
    config.paths.meminfo = dir.join("meminfo");
    config.paths.thermal_zone = dir.join("temp");
    config.paths.battery = battery;
    config.commands.recordings_dir = "/tmp/recordings".to_string();
    config
}

fn context(runner: &Arc<ScriptedRunner>, config: BarConfig) -> BarContext {
    let shared: Arc<dyn CommandRunner> = Arc::clone(runner) as Arc<dyn CommandRunner>;
    BarContext::new(Rc::new(Runtime::new()), shared, config)
}

fn label(bar: &Bar, name: &str) -> Option<String> {
    bar.segment(name).and_then(|s| s.snapshot().label)
}

#[test]
fn first_ticks_fill_every_segment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = Arc::new(standard_runner());
    let ctx = context(&runner, config_in(dir.path()));
    let bar = Bar::new(&ctx).expect("bar");

    assert_eq!(label(&bar, "cpu").as_deref(), Some("0.00"));
    assert_eq!(label(&bar, "disk").as_deref(), Some("0"));

    let ready = ctx.runtime().run_until(
        || {
            label(&bar, "cpu").as_deref() == Some("0.52")
                && label(&bar, "disk").as_deref() == Some("243Gi")
                && label(&bar, "memory").as_deref() == Some("6.9Gi")
                && label(&bar, "temperature").as_deref() == Some("46°C")
                && label(&bar, "workspaces").as_deref() == Some("1*:archlinux-logo 2:kitty-custom")
                && label(&bar, "volume").as_deref() == Some("45%")
                && label(&bar, "bluetooth").as_deref() == Some("Headphones")
                && label(&bar, "wifi").as_deref() == Some("HomeNet")
                && label(&bar, "battery").as_deref() == Some("57%")
        },
        WAIT,
    );
    assert!(ready, "snapshot: {:?}", bar.snapshot());

    let memory = bar.segment("memory").expect("memory").snapshot();
    assert_eq!(memory.tooltip.as_deref(), Some("Available: 8.7Gi / 15.6Gi"));
    let disk = bar.segment("disk").expect("disk").snapshot();
    assert_eq!(disk.tooltip.as_deref(), Some("201Gi used out of 467Gi on /"));
    let battery = bar.segment("battery").expect("battery").snapshot();
    assert_eq!(battery.icon.as_deref(), Some("battery-level-60-symbolic"));
    assert!(battery.visible);

    bar.shutdown();
}

#[test]
fn failing_reader_leaves_others_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = Arc::new(
        ScriptedRunner::default()
            .fail("top -b -n1", "top: not found")
            .answer("df -h", DF),
    );
    let ctx = context(&runner, config_in(dir.path()));
    let bar = Bar::new(&ctx).expect("bar");

    assert!(ctx.runtime().run_until(
        || label(&bar, "disk").as_deref() == Some("243Gi"),
        WAIT
    ));
    assert_eq!(label(&bar, "cpu").as_deref(), Some("0.00"));
    assert!(bar.resources.pollers()[0].stats().faults >= 1);
}

#[test]
fn clicks_reach_commands() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = Arc::new(standard_runner());
    let ctx = context(&runner, config_in(dir.path()));
    let bar = Bar::new(&ctx).expect("bar");

    assert!(bar.dispatch("volume", Input::Click));
    assert!(bar.dispatch("volume", Input::ScrollUp));
    assert!(bar.dispatch("workspace:2", Input::ScrollDown));
    assert!(bar.dispatch("cpu", Input::Click));
    assert!(!bar.dispatch("battery", Input::Click));
    assert!(!bar.dispatch("workspace:x", Input::Click));

    let done = ctx.runtime().run_until(
        || {
            runner.called("set-mute @DEFAULT_AUDIO_SINK@ toggle")
                && runner.called("set-volume @DEFAULT_AUDIO_SINK@ 5%-")
                && runner.called("focus-column-left")
                && runner.called("kitty -e btop")
        },
        WAIT,
    );
    assert!(done, "calls: {:?}", runner.calls());

    let calls = runner.calls();
    let focus = calls
        .iter()
        .position(|c| c == "niri msg action focus-workspace 2")
        .expect("focus");
    let column = calls
        .iter()
        .position(|c| c == "niri msg action focus-column-left")
        .expect("column");
    assert!(focus < column);
}

#[test]
fn clock_click_switches_to_utc() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = Arc::new(standard_runner());
    let ctx = context(&runner, config_in(dir.path()));
    let bar = Bar::new(&ctx).expect("bar");

    assert!(!bar.clock.shows_utc());
    assert!(bar.dispatch("clock", Input::Click));
    assert!(bar.clock.shows_utc());
    let expected = statebar_widgets::clock::format_clock(&bar.clock.now(), true);
    assert_eq!(bar.clock.label().current(), expected);
}

#[test]
fn recorder_start_then_stop_notifies() {
    let runner = Arc::new(ScriptedRunner::default());
    let ctx = context(&runner, BarConfig {
        commands: statebar_widgets::Commands {
            recordings_dir: "/tmp/recordings".to_string(),
            ..Default::default()
        },
        ..Default::default()
    });
    let recorder = Recorder::new(&ctx);
    let at = Utc
        .with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid date");

    assert_eq!(recorder.toggle_at(at), Toggle::Started);
    assert!(recorder.is_recording());
    assert_eq!(recorder.filename(), "/tmp/recordings/screenrec-20250601120000.mp4");
    assert_eq!(
        recorder.icon().current(),
        statebar_widgets::screenrec::ICON_RECORDING
    );

    assert!(ctx.runtime().run_until(|| runner.called("wl-screenrec -g"), WAIT));
    assert!(runner.called("-f /tmp/recordings/screenrec-20250601120000.mp4"));

    assert_eq!(recorder.toggle_at(at), Toggle::Stopping);
    assert_eq!(recorder.toggle_at(at), Toggle::Ignored);
    assert!(ctx.runtime().run_until(
        || !recorder.is_recording() && runner.called("notify-send"),
        WAIT
    ));

    let calls = runner.calls();
    let kill = calls.iter().position(|c| c == "pkill wl-screenrec").expect("pkill");
    let notify = calls
        .iter()
        .position(|c| c.starts_with("notify-send"))
        .expect("notify");
    assert!(kill < notify);
    assert_eq!(
        calls[notify],
        "notify-send 'Screen Recorder ..' 'Filename: /tmp/recordings/screenrec-20250601120000.mp4'"
    );
    assert_eq!(
        recorder.icon().current(),
        statebar_widgets::screenrec::ICON_IDLE
    );
}

#[test]
fn failed_recording_resets_flag() {
    let runner = Arc::new(ScriptedRunner::default().fail("wl-screenrec", "slurp: cancelled"));
    let ctx = context(&runner, BarConfig::default());
    let recorder = Recorder::new(&ctx);
    let at = Utc
        .with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid date");

    let handle = recorder.start(at);
    assert!(recorder.is_recording());
    assert!(ctx.runtime().run_until(|| handle.is_finished(), WAIT));
    assert_eq!(handle.state(), TaskState::Failed);
    assert!(!recorder.is_recording());
}
