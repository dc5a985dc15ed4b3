use std::fmt;

use crate::error::{StreamError, StreamResult, StreamStatus};

/// Lifecycle of a backend stream.
///
/// ```text
/// closed -> opened -> running <-> paused
///             |          |          |
///             v          v          v
///             +------> stopped -> running
/// ```
///
/// Repeating a transition into the current state does nothing. Any open state may be
/// closed, and closing an already closed stream does nothing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum Lifecycle {
    #[default]
    Closed,
    Opened,
    Running,
    Paused,
    Stopped,
}

impl Lifecycle {
    pub fn is_open(self) -> bool {
        self != Lifecycle::Closed
    }

    pub fn is_running(self) -> bool {
        self == Lifecycle::Running
    }

    /// Playback state as reported to users.
    pub fn status(self) -> StreamStatus {
        match self {
            Lifecycle::Running => StreamStatus::Running,
            Lifecycle::Paused => StreamStatus::Paused,
            Lifecycle::Closed | Lifecycle::Opened | Lifecycle::Stopped => StreamStatus::Stopped,
        }
    }

    pub fn open(&mut self) -> StreamResult {
        self.transition(Lifecycle::Opened, |s| s == Lifecycle::Closed)
    }

    /// Starts an opened or stopped stream, or resumes a paused one.
    pub fn start(&mut self) -> StreamResult {
        self.transition(Lifecycle::Running, |s| {
            matches!(s, Lifecycle::Opened | Lifecycle::Paused | Lifecycle::Stopped)
        })
    }

    pub fn pause(&mut self) -> StreamResult {
        self.transition(Lifecycle::Paused, |s| s == Lifecycle::Running)
    }

    /// Stops any open stream.
    pub fn stop(&mut self) -> StreamResult {
        self.transition(Lifecycle::Stopped, Lifecycle::is_open)
    }

    /// Returns the previous state.
    pub fn close(&mut self) -> Lifecycle {
        std::mem::take(self)
    }

    fn transition(
        &mut self,
        to: Lifecycle,
        allowed: impl FnOnce(Lifecycle) -> bool,
    ) -> StreamResult {
        if *self == to && to != Lifecycle::Opened {
            return Ok(());
        }

        if !allowed(*self) {
            return Err(invalid_transition(*self, to));
        }

        tracing::debug!(from = %self, %to, "stream transition");
        *self = to;
        Ok(())
    }
}

#[cold]
fn invalid_transition(from: Lifecycle, to: Lifecycle) -> StreamError {
    StreamError::system(format!("cannot go from {from} to {to}"))
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Closed => "closed",
            Lifecycle::Opened => "opened",
            Lifecycle::Running => "running",
            Lifecycle::Paused => "paused",
            Lifecycle::Stopped => "stopped",
        })
    }
}
