#![forbid(unsafe_code)]

//! CPU load, memory, temperature and root-disk segments.
//!
//! Each reading is one poller feeding one cell. Readings that belong
//! together (memory totals, disk sizes) are a single record so a label and
//! its tooltip can never disagree.

use std::path::Path;
use std::sync::Arc;

use statebar_reactive::{Binding, Observable, bind};
use statebar_runtime::{Poll, PollerHandle, Result, SharedRunner, Task};
use thiserror::Error;
use tracing::debug;

use crate::config::millis;
use crate::context::BarContext;
use crate::segment::Segment;

/// A kernel file could not be read or understood.
#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected contents in {path}")]
    Malformed { path: String },

    #[error(transparent)]
    Shell(#[from] statebar_runtime::ShellError),

    #[error("no matching line in `{command}` output")]
    NoMatch { command: String },
}

fn read_file(path: &Path) -> std::result::Result<String, ReadingError> {
    std::fs::read_to_string(path).map_err(|source| ReadingError::Io {
        path: path.display().to_string(),
        source,
    })
}

// ── CPU ─────────────────────────────────────────────────────────────────────

/// First load average on the first line of `top -b -n1`.
///
/// Matches `average: <digits><any char><digits>`, so locales that print a
/// decimal comma are accepted as-is.
#[must_use]
pub fn parse_load_average(top_output: &str) -> Option<String> {
    let line = top_output.lines().next()?;
    line.match_indices("average: ").find_map(|(at, marker)| {
        let rest = &line[at + marker.len()..];
        let int_len = rest.chars().take_while(char::is_ascii_digit).count();
        if int_len == 0 {
            return None;
        }
        let mut tail = rest[int_len..].chars();
        let sep = tail.next()?;
        let frac_len = tail.clone().take_while(char::is_ascii_digit).count();
        if frac_len == 0 {
            return None;
        }
        let end = int_len + sep.len_utf8() + frac_len;
        Some(rest[..end].to_string())
    })
}

// ── Memory ──────────────────────────────────────────────────────────────────

/// Memory totals in kB, as reported by `/proc/meminfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemoryInfo {
    #[must_use]
    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.available_kb)
    }
}

#[must_use]
pub fn parse_meminfo(content: &str) -> Option<MemoryInfo> {
    let field = |name: &str| -> Option<u64> {
        content.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse().ok()
        })
    };
    Some(MemoryInfo {
        total_kb: field("MemTotal")?,
        available_kb: field("MemAvailable")?,
    })
}

/// kB to GiB with one decimal, suffixed `Gi`.
#[must_use]
pub fn to_gib(kb: u64) -> String {
    format!("{:.1}Gi", kb as f64 / 1024.0 / 1024.0)
}

// ── Temperature ─────────────────────────────────────────────────────────────

/// Thermal-zone reading (millidegrees Celsius) to degrees.
#[must_use]
pub fn parse_millidegrees(content: &str) -> Option<f64> {
    let milli: f64 = content.trim().parse().ok()?;
    Some(milli / 1000.0)
}

#[must_use]
pub fn format_temperature(celsius: f64) -> String {
    format!("{}°C", celsius.round_ties_even() as i64)
}

// ── Disk ────────────────────────────────────────────────────────────────────

/// Sizes of the root filesystem, as printed by `df -h`, each suffixed `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: String,
    pub used: String,
    pub available: String,
}

impl Default for DiskUsage {
    fn default() -> Self {
        Self {
            total: "0".to_string(),
            used: "0".to_string(),
            available: "0".to_string(),
        }
    }
}

/// The first `df -h` row whose line ends in `/`.
#[must_use]
pub fn parse_df_root(df_output: &str) -> Option<DiskUsage> {
    df_output
        .lines()
        .filter(|line| line.ends_with('/'))
        .find_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            Some(DiskUsage {
                total: format!("{}i", parts[1]),
                used: format!("{}i", parts[2]),
                available: format!("{}i", parts[3]),
            })
        })
}

// ── Widget ──────────────────────────────────────────────────────────────────

/// Resource meters sharing one click action.
pub struct SystemResources {
    ctx: BarContext,
    pub cpu_load: Observable<String>,
    pub memory: Observable<MemoryInfo>,
    pub temperature: Observable<f64>,
    pub disk: Observable<DiskUsage>,
    cpu_label: Binding<String>,
    memory_label: Binding<String>,
    memory_tooltip: Binding<String>,
    temperature_label: Binding<String>,
    disk_label: Binding<String>,
    disk_tooltip: Binding<String>,
    pollers: Vec<PollerHandle>,
}

impl SystemResources {
    pub fn new(ctx: &BarContext) -> Result<Self> {
        let config = ctx.config();
        let intervals = &config.intervals;

        let cpu_load = Observable::new("0.00".to_string());
        let memory = Observable::new(MemoryInfo::default());
        let temperature = Observable::new(0.0_f64);
        let disk = Observable::new(DiskUsage::default());

        let cpu_label = bind(&cpu_load, String::clone);
        let memory_label = bind(&memory, |m: &MemoryInfo| to_gib(m.used_kb()));
        let memory_tooltip = bind(&memory, |m: &MemoryInfo| {
            format!("Available: {} / {}", to_gib(m.available_kb), to_gib(m.total_kb))
        });
        let temperature_label = bind(&temperature, |c: &f64| format_temperature(*c));
        let disk_label = bind(&disk, |d: &DiskUsage| d.available.clone());
        let disk_tooltip = bind(&disk, |d: &DiskUsage| {
            format!("{} used out of {} on /", d.used, d.total)
        });

        let mut pollers = Vec::with_capacity(4);

        let runner = Arc::clone(ctx.runner());
        let command = config.commands.cpu.clone();
        pollers.push(
            Poll::every(millis(intervals.cpu_ms)).name("cpu").spawn_into(
                ctx.runtime(),
                move |cx| {
                    let out = runner.run(cx, &command)?;
                    parse_load_average(&out).ok_or_else(|| ReadingError::NoMatch {
                        command: command.clone(),
                    })
                },
                &cpu_load,
            )?,
        );

        let meminfo = config.paths.meminfo.clone();
        pollers.push(
            Poll::every(millis(intervals.memory_ms)).name("memory").spawn_into(
                ctx.runtime(),
                move |_| {
                    let content = read_file(&meminfo)?;
                    parse_meminfo(&content).ok_or_else(|| ReadingError::Malformed {
                        path: meminfo.display().to_string(),
                    })
                },
                &memory,
            )?,
        );

        let zone = config.paths.thermal_zone.clone();
        pollers.push(
            Poll::every(millis(intervals.temperature_ms))
                .name("temperature")
                .spawn_into(
                    ctx.runtime(),
                    move |_| {
                        let content = read_file(&zone)?;
                        parse_millidegrees(&content).ok_or_else(|| ReadingError::Malformed {
                            path: zone.display().to_string(),
                        })
                    },
                    &temperature,
                )?,
        );

        let runner = Arc::clone(ctx.runner());
        let command = config.commands.disk.clone();
        pollers.push(
            Poll::every(millis(intervals.disk_ms)).name("disk").spawn_into(
                ctx.runtime(),
                move |cx| {
                    let out = runner.run(cx, &command)?;
                    parse_df_root(&out).ok_or_else(|| ReadingError::NoMatch {
                        command: command.clone(),
                    })
                },
                &disk,
            )?,
        );

        Ok(Self {
            ctx: ctx.clone(),
            cpu_load,
            memory,
            temperature,
            disk,
            cpu_label,
            memory_label,
            memory_tooltip,
            temperature_label,
            disk_label,
            disk_tooltip,
            pollers,
        })
    }

    /// Click action: open the configured system monitor.
    pub fn open_monitor(&self) {
        let command = self.ctx.config().commands.system_monitor.clone();
        debug!(%command, "opening system monitor");
        launch_command(&self.ctx, "system-monitor", command);
    }

    #[must_use]
    pub fn pollers(&self) -> &[PollerHandle] {
        &self.pollers
    }

    #[must_use]
    pub fn segments(&self) -> Vec<Segment> {
        vec![
            Segment::new("cpu")
                .class("system-cpu")
                .icon(Binding::constant("󰌢".to_string()))
                .label(self.cpu_label.clone()),
            Segment::new("memory")
                .class("system-memory")
                .icon(Binding::constant("󰍛".to_string()))
                .label(self.memory_label.clone())
                .tooltip(self.memory_tooltip.clone()),
            Segment::new("temperature")
                .class("system-temperature")
                .icon(Binding::constant("".to_string()))
                .label(self.temperature_label.clone()),
            Segment::new("disk")
                .class("system-disk")
                .icon(Binding::constant("".to_string()))
                .label(self.disk_label.clone())
                .tooltip(self.disk_tooltip.clone()),
        ]
    }
}

/// Fire-and-forget command launch. Failures are logged by the runtime.
pub(crate) fn launch_command(ctx: &BarContext, name: &str, command: String) {
    let runner: SharedRunner = Arc::clone(ctx.runner());
    let _handle = ctx
        .runtime()
        .launch(Task::new(move |cx| runner.run(cx, &command)).name(name));
}
