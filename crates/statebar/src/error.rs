use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] statebar_widgets::ConfigError),

    #[error("runtime error: {0}")]
    Runtime(#[from] statebar_runtime::RuntimeError),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("missing commands: {}", .commands.join(", "))]
    MissingCommands { commands: Vec<String> },

    #[error("failed to install logging: {message}")]
    Logging { message: String },
}

impl CliError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } | Self::Config(_) => 2,
            Self::MissingCommands { .. } => 3,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
