use rtio_core::{ExchangeError, ParamsError, StreamError};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The backend refused the stream or an operation on it.
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error("timed out waiting for the audio thread to release the callback")]
    LockTimeout,

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("backend not available: {0}")]
    BackendUnavailable(&'static str),
}

impl<T> From<ExchangeError<T>> for Error {
    fn from(_: ExchangeError<T>) -> Error {
        Error::LockTimeout
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
