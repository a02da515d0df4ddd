use web_time::Duration;

use crate::error::{CliError, Result};

pub fn command_exists(command: &str) -> bool {
    which::which(command).is_ok()
}

/// `500ms`, `10s` or bare seconds.
pub fn parse_duration_value(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    if let Some(ms) = trimmed.strip_suffix("ms") {
        let value = ms
            .trim()
            .parse::<u64>()
            .map_err(|_| CliError::invalid(format!("invalid millisecond duration: {raw}")))?;
        return Ok(Duration::from_millis(value));
    }

    if let Some(sec) = trimmed.strip_suffix('s') {
        let value = sec
            .trim()
            .parse::<u64>()
            .map_err(|_| CliError::invalid(format!("invalid second duration: {raw}")))?;
        return Ok(Duration::from_secs(value));
    }

    let value = trimmed
        .parse::<u64>()
        .map_err(|_| CliError::invalid(format!("invalid duration value: {raw}")))?;
    Ok(Duration::from_secs(value))
}

/// clap value parser for duration flags.
pub fn duration_arg(raw: &str) -> std::result::Result<Duration, String> {
    parse_duration_value(raw).map_err(|err| err.to_string())
}
