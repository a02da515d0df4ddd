#![forbid(unsafe_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors returned while setting up pollers and tasks.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("poll interval must be non-zero")]
    InvalidInterval,

    #[error("failed to spawn worker `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A contained failure reported to `on_error` hooks.
///
/// Faults never propagate to the caller of a cell read or write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("poller `{poller}` producer failed: {message}")]
    Producer { poller: String, message: String },

    #[error("poller `{poller}` producer panicked: {message}")]
    ProducerPanicked { poller: String, message: String },

    #[error("task `{task}` failed: {message}")]
    Task { task: String, message: String },

    #[error("task `{task}` panicked: {message}")]
    TaskPanicked { task: String, message: String },

    #[error("task `{task}` ended without reporting a result")]
    TaskLost { task: String },
}

impl Fault {
    /// Name of the poller or task that faulted.
    #[must_use]
    pub fn origin(&self) -> &str {
        match self {
            Self::Producer { poller, .. } | Self::ProducerPanicked { poller, .. } => poller,
            Self::Task { task, .. } | Self::TaskPanicked { task, .. } | Self::TaskLost { task } => {
                task
            }
        }
    }

    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(
            self,
            Self::ProducerPanicked { .. } | Self::TaskPanicked { .. }
        )
    }
}
