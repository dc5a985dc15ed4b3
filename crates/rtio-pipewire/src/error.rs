use std::io;

use rtio_core::{SampleFormat, StreamError};

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to spawn thread")]
    ThreadSpawn(#[source] io::Error),

    #[error("thread crashed")]
    ThreadCrashed,

    #[error("no stream open")]
    NoStream,

    #[error("too many channels")]
    TooManyChannels,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(SampleFormat),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Pipewire(#[from] pipewire::Error),

    #[error("serialization error")]
    Serialization(#[from] pipewire::spa::pod::serialize::GenError),
}

impl From<Error> for StreamError {
    fn from(error: Error) -> StreamError {
        match error {
            Error::Stream(error) => error,
            error => StreamError::system(error.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
