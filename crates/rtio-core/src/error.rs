use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Status codes used for real-time signaling.
///
/// The first three describe stream states, the rest are results of an operation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Running,
    Stopped,
    Paused,
    NoError,
    FatalError,
    /// Buffer underrun or overrun reported by the backend.
    Xrun,
    SystemError,
    UserError,
}

impl StreamStatus {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            StreamStatus::FatalError
                | StreamStatus::Xrun
                | StreamStatus::SystemError
                | StreamStatus::UserError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamStatus::Running => "running",
            StreamStatus::Stopped => "stopped",
            StreamStatus::Paused => "paused",
            StreamStatus::NoError => "no error",
            StreamStatus::FatalError => "fatal error",
            StreamStatus::Xrun => "xrun",
            StreamStatus::SystemError => "system error",
            StreamStatus::UserError => "user error",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status paired with an optional message.
///
/// Static messages don't allocate, so callbacks can report errors from the real-time thread.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct StreamError {
    status: StreamStatus,
    message: Cow<'static, str>,
}

impl StreamError {
    pub fn new(status: StreamStatus, message: impl Into<Cow<'static, str>>) -> StreamError {
        StreamError {
            status,
            message: message.into(),
        }
    }

    pub const fn from_status(status: StreamStatus) -> StreamError {
        StreamError {
            status,
            message: Cow::Borrowed(""),
        }
    }

    #[cold]
    pub fn system(message: impl Into<Cow<'static, str>>) -> StreamError {
        StreamError::new(StreamStatus::SystemError, message)
    }

    #[cold]
    pub fn user(message: impl Into<Cow<'static, str>>) -> StreamError {
        StreamError::new(StreamStatus::UserError, message)
    }

    #[cold]
    pub fn fatal(message: impl Into<Cow<'static, str>>) -> StreamError {
        StreamError::new(StreamStatus::FatalError, message)
    }

    #[cold]
    pub fn xrun(message: impl Into<Cow<'static, str>>) -> StreamError {
        StreamError::new(StreamStatus::Xrun, message)
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "stream error: {}", self.status)
        } else {
            write!(f, "stream error: {}: {}", self.status, self.message)
        }
    }
}

impl std::error::Error for StreamError {}

impl From<StreamStatus> for StreamError {
    fn from(status: StreamStatus) -> StreamError {
        StreamError::from_status(status)
    }
}

/// Result of backend operations and audio callbacks. `Ok` stands for "no error".
pub type StreamResult<T = ()> = Result<T, StreamError>;

/// Returned when stream parameters violate their invariants.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ParamsError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("frame count must be positive when a direction is enabled")]
    ZeroFrameCount,
}
