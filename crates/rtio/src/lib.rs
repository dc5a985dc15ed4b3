//! Typed audio streams whose callback can be swapped while they run.
//!
//! ```no_run
//! use rtio::{AudioStream, StreamParams};
//!
//! let params = StreamParams::<f32>::new(44100.0, 512, 0, 2)?;
//! let stream = AudioStream::new(params, Box::new(|buffers, _, _| {
//!     buffers.output.fill(0.0);
//!     Ok(())
//! }))?;
//!
//! stream.start()?;
//! # Ok::<(), rtio::Error>(())
//! ```

pub mod backend;
pub mod context;
mod error;
pub mod process;
pub mod stream;

pub use rtio_core::{
    default_error_callback, silence, write_silence, BufferGroup, BufferView, BufferViewMut,
    Callback, DeviceIndex, DeviceInfo, ErrorCallback, Lifecycle, ParamsError, RealTime, Sample,
    SampleFormat, StreamError, StreamParams, StreamResult, StreamStatus, I24,
};

pub use self::backend::{default_backend, BackendKind};
pub use self::context::StreamContext;
pub use self::error::{Error, Result};
pub use self::process::AudioProcess;
pub use self::stream::{
    pause_stream, start_stream, stop_stream, AudioStream, StreamBuilder, DEFAULT_EXCHANGE_TIMEOUT,
};
