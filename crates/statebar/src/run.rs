//! Subcommand bodies.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use statebar_widgets::{Bar, BarConfig, BarContext, SegmentSnapshot};
use tracing::{info, warn};
use web_time::{Duration, Instant};

use crate::cli::{ConfigArgs, RunArgs};
use crate::error::{CliError, Result};
use crate::util::command_exists;

/// Longest stretch the runner drains the runtime before printing changes.
const PRINT_SLICE: Duration = Duration::from_millis(100);

/// Configuration file (or defaults) with command-line overrides applied.
pub fn load_config(args: &ConfigArgs) -> Result<BarConfig> {
    let mut config = BarConfig::load(args.config.as_deref())?;
    if let Some(output) = &args.output {
        config.output = Some(output.clone());
    }
    config.validate()?;
    Ok(config)
}

pub fn render_segment(snapshot: &SegmentSnapshot, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string(snapshot)?)
    } else {
        Ok(snapshot.to_line())
    }
}

pub fn run_config(args: &ConfigArgs) -> Result<()> {
    let config = load_config(args)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?;
    Ok(())
}

/// Programs from [`BarConfig::required_programs`] not found on `PATH`.
#[must_use]
pub fn missing_programs(config: &BarConfig) -> Vec<String> {
    config
        .required_programs()
        .into_iter()
        .filter(|program| !command_exists(program))
        .collect()
}

pub fn run_check(args: &ConfigArgs) -> Result<()> {
    let config = load_config(args)?;
    let missing = missing_programs(&config);
    let mut out = io::stdout().lock();
    for program in config.required_programs() {
        let status = if missing.contains(&program) { "missing" } else { "ok" };
        writeln!(out, "{status:<8}{program}")?;
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CliError::MissingCommands { commands: missing })
    }
}

pub fn run_bar(args: &RunArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    for program in missing_programs(&config) {
        warn!(%program, "configured command not found; its segment will stay at defaults");
    }

    let ctx = BarContext::with_shell(config);
    let bar = Bar::new(&ctx)?;
    let mut out = io::stdout().lock();
    for snapshot in bar.snapshot().segments() {
        writeln!(out, "{}", render_segment(snapshot, args.json)?)?;
    }
    out.flush()?;

    let changed: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&changed);
    let _subscriptions = bar.on_change(move |name| {
        let mut pending = sink.borrow_mut();
        if !pending.contains(&name) {
            pending.push(name);
        }
    });

    let deadline = args.run_for.map(|d| Instant::now() + d);
    info!(run_for = ?args.run_for, "bar running");
    loop {
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                (deadline - now).min(PRINT_SLICE)
            }
            None => PRINT_SLICE,
        };
        ctx.runtime().run_for(slice);

        let names = std::mem::take(&mut *changed.borrow_mut());
        for name in names {
            if let Some(segment) = bar.segment(name) {
                writeln!(out, "{}", render_segment(&segment.snapshot(), args.json)?)?;
            }
        }
        out.flush()?;
    }

    bar.shutdown();
    info!("bar stopped");
    Ok(())
}
