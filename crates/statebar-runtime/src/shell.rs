#![forbid(unsafe_code)]

//! External command execution for producers and tasks.
//!
//! Widgets never spawn processes directly; they receive a
//! [`CommandRunner`] handle, so tests can substitute a scripted runner.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, trace};
use wait_timeout::ChildExt;
use web_time::{Duration, Instant};

use crate::cx::Cx;

/// Interval between cancellation checks while a child runs.
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", exit_label(*.exit_code))]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },

    #[error("i/o error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))
}

/// Runs shell command lines.
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion and capture its output, whatever the exit
    /// status.
    fn output(&self, cx: &Cx, command: &str) -> Result<CommandOutput, ShellError>;

    /// Run `command` and return its stdout, or [`ShellError::Failed`] on a
    /// non-zero exit.
    fn run(&self, cx: &Cx, command: &str) -> Result<String, ShellError> {
        let output = self.output(cx, command)?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ShellError::Failed {
                command: command.to_string(),
                exit_code: output.status,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Shared runner handle passed to widgets.
pub type SharedRunner = Arc<dyn CommandRunner>;

/// Runs commands through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Use another POSIX shell binary (for example `bash`).
    #[must_use]
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    #[must_use]
    pub fn shared() -> SharedRunner {
        Arc::new(Self::new())
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for ShellRunner {
    fn output(&self, cx: &Cx, command: &str) -> Result<CommandOutput, ShellError> {
        let started = Instant::now();
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ShellError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout = drain_pipe(child.stdout.take());
        let stderr = drain_pipe(child.stderr.take());
        let io_err = |source| ShellError::Io {
            command: command.to_string(),
            source,
        };

        let status = match wait_cancellable(&mut child, cx).map_err(io_err)? {
            Some(status) => status,
            None => {
                debug!(command, "killing cancelled command");
                child.kill().map_err(io_err)?;
                let _ = child.wait();
                return Err(ShellError::Cancelled {
                    command: command.to_string(),
                });
            }
        };

        let output = CommandOutput {
            status: status.code(),
            stdout: join_pipe(stdout),
            stderr: join_pipe(stderr),
        };
        trace!(
            command,
            status = ?output.status,
            duration_us = started.elapsed().as_micros() as u64,
            "command finished"
        );
        Ok(output)
    }
}

/// Wait for `child`, returning `None` if `cx` is cancelled first.
fn wait_cancellable(child: &mut Child, cx: &Cx) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if cx.is_cancelled() {
            return Ok(None);
        }
        if let Some(status) = child.wait_timeout(WAIT_SLICE)? {
            return Ok(Some(status));
        }
    }
}

fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    let mut pipe = pipe?;
    Some(std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }))
}

fn join_pipe(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Quote `value` for inclusion in a `sh -c` command line.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@%+=,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_leaves_plain_words_alone() {
        assert_eq!(shell_quote("wl-screenrec"), "wl-screenrec");
        assert_eq!(shell_quote("/home/u/Videos/a.mp4"), "/home/u/Videos/a.mp4");
    }

    #[test]
    fn quoting_wraps_spaces_and_quotes() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn failed_display_names_exit() {
        let err = ShellError::Failed {
            command: "false".into(),
            exit_code: Some(1),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "`false` exited with status 1: ");
        let err = ShellError::Failed {
            command: "sleep 9".into(),
            exit_code: None,
            stderr: "killed".into(),
        };
        assert_eq!(err.to_string(), "`sleep 9` exited with a signal: killed");
    }

    #[cfg(unix)]
    #[test]
    fn shell_runner_captures_stdout() {
        let (cx, _ctrl) = Cx::root("test");
        let out = ShellRunner::new()
            .run(&cx, "printf 'average: 0.42'")
            .expect("printf");
        assert_eq!(out, "average: 0.42");
    }

    #[cfg(unix)]
    #[test]
    fn shell_runner_reports_nonzero_exit() {
        let (cx, _ctrl) = Cx::root("test");
        let err = ShellRunner::new()
            .run(&cx, "echo oops >&2; exit 3")
            .expect_err("non-zero exit");
        match err {
            ShellError::Failed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn shell_runner_honours_cancellation() {
        let (cx, ctrl) = Cx::root("test");
        let started = Instant::now();
        let worker = std::thread::spawn(move || ShellRunner::new().output(&cx, "sleep 30"));
        std::thread::sleep(Duration::from_millis(50));
        ctrl.cancel();
        let result = worker.join().expect("runner thread");
        assert!(matches!(result, Err(ShellError::Cancelled { .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
