use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use web_time::Duration;

use crate::error::Result;
use crate::logging::{self, LogFormat};
use crate::run::{run_bar, run_check, run_config};
use crate::util::duration_arg;

#[derive(Debug, Parser)]
#[command(
    name = "statebar",
    about = "Reactive status bar for niri, runnable headless",
    version
)]
pub struct Cli {
    /// Emit log records as JSON lines on stderr.
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the bar and print segments as they change.
    Run(RunArgs),

    /// Print the effective configuration as JSON.
    Config(ConfigArgs),

    /// Report which configured commands are missing from PATH.
    Check(ConfigArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Monitor connector whose workspaces are shown (overrides the file).
    #[arg(long)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Stop after this long (`500ms`, `10s`, or seconds). Runs until killed
    /// when omitted.
    #[arg(long = "for", value_parser = duration_arg)]
    pub run_for: Option<Duration>,

    /// Print one JSON object per change instead of text lines.
    #[arg(long)]
    pub json: bool,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    logging::init(format)?;
    match cli.command {
        Commands::Run(args) => run_bar(&args),
        Commands::Config(args) => run_config(&args),
        Commands::Check(args) => run_check(&args),
    }
}
