mod dummy;
mod offline;

use std::fmt;
use std::str::FromStr;

pub use rtio_core::{Backend, Dispatch, Flow};

pub use self::dummy::DummyBackend;
pub use self::offline::{OfflineBackend, OfflineHandle};
use crate::error::{Error, Result};
use crate::Sample;

/// Environment variable consulted by [`BackendKind::from_env`].
pub const BACKEND_ENV: &str = "RTIO_BACKEND";

/// Backends known to this crate.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BackendKind {
    /// Native PipeWire backend. Requires the `pipewire` feature.
    PipeWire,
    Offline,
    Dummy,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::PipeWire,
        BackendKind::Offline,
        BackendKind::Dummy,
    ];

    /// Platform backend if compiled in, offline otherwise.
    pub const fn platform_default() -> BackendKind {
        if cfg!(feature = "pipewire") {
            BackendKind::PipeWire
        } else {
            BackendKind::Offline
        }
    }

    /// Reads [`BACKEND_ENV`], falling back to [`BackendKind::platform_default`] when unset.
    pub fn from_env() -> Result<BackendKind> {
        match std::env::var(BACKEND_ENV) {
            Ok(name) if !name.trim().is_empty() => name.parse(),
            _ => Ok(BackendKind::platform_default()),
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            BackendKind::PipeWire => cfg!(feature = "pipewire"),
            BackendKind::Offline | BackendKind::Dummy => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::PipeWire => "pipewire",
            BackendKind::Offline => "offline",
            BackendKind::Dummy => "dummy",
        }
    }

    pub fn create<S: Sample>(self) -> Result<Box<dyn Backend<S>>> {
        let backend: Box<dyn Backend<S>> = match self {
            BackendKind::PipeWire => create_pipewire()?,
            BackendKind::Offline => Box::new(OfflineBackend::new()),
            BackendKind::Dummy => Box::new(DummyBackend::new()),
        };

        tracing::info!(backend = backend.name(), "created {}", backend.info());
        Ok(backend)
    }
}

#[cfg(feature = "pipewire")]
fn create_pipewire<S: Sample>() -> Result<Box<dyn Backend<S>>> {
    let backend = rtio_pipewire::PipeWireBackend::new()
        .map_err(|e| Error::Stream(rtio_core::StreamError::system(e.to_string())))?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "pipewire"))]
fn create_pipewire<S: Sample>() -> Result<Box<dyn Backend<S>>> {
    Err(Error::BackendUnavailable("pipewire"))
}

impl Default for BackendKind {
    fn default() -> BackendKind {
        BackendKind::platform_default()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownBackend(s.to_owned()))
    }
}

/// Creates the platform default backend.
pub fn default_backend<S: Sample>() -> Result<Box<dyn Backend<S>>> {
    BackendKind::platform_default().create()
}
