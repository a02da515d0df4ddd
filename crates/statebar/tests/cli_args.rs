//! Command-line parsing.

use clap::Parser;
use statebar::cli::{Cli, Commands};
use web_time::Duration;

#[test]
fn run_accepts_all_flags() {
    let cli = Cli::try_parse_from([
        "statebar", "run", "--config", "/tmp/bar.json", "--output", "eDP-1", "--for", "1500ms",
        "--json", "--log-json",
    ])
    .expect("parse");
    assert!(cli.log_json);
    let Commands::Run(args) = cli.command else {
        panic!("expected run");
    };
    assert_eq!(args.config.config.as_deref(), Some(std::path::Path::new("/tmp/bar.json")));
    assert_eq!(args.config.output.as_deref(), Some("eDP-1"));
    assert_eq!(args.run_for, Some(Duration::from_millis(1500)));
    assert!(args.json);
}

#[test]
fn run_defaults_to_forever() {
    let cli = Cli::try_parse_from(["statebar", "run"]).expect("parse");
    let Commands::Run(args) = cli.command else {
        panic!("expected run");
    };
    assert_eq!(args.run_for, None);
    assert!(!args.json);
    assert!(args.config.config.is_none());
}

#[test]
fn bad_duration_is_rejected() {
    let err = Cli::try_parse_from(["statebar", "run", "--for", "soon"]).expect_err("invalid");
    assert!(err.to_string().contains("invalid duration value: soon"));
}

#[test]
fn config_and_check_share_arguments() {
    let cli = Cli::try_parse_from(["statebar", "check", "--output", "DP-2"]).expect("parse");
    assert!(matches!(cli.command, Commands::Check(ref a) if a.output.as_deref() == Some("DP-2")));
    let cli = Cli::try_parse_from(["statebar", "config"]).expect("parse");
    assert!(matches!(cli.command, Commands::Config(_)));
}
