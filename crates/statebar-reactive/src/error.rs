#![forbid(unsafe_code)]

use std::any::Any;

use thiserror::Error;

/// A binding transform could not produce a value.
///
/// The binding keeps its last good value when this happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformFault {
    #[error("transform failed: {message}")]
    Failed { message: String },

    #[error("transform panicked: {message}")]
    Panicked { message: String },
}

impl TransformFault {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Failed { message } | Self::Panicked { message } => message,
        }
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::Panicked {
            message: panic_message(payload),
        }
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
