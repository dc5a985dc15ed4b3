use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rtio_core::{
    default_error_callback, silence, Callback, ErrorCallback, ExchangeError, Sample, StreamError,
    StreamParams, StreamStatus,
};

use crate::context::StreamContext;
use crate::error::{Error, Result};
use crate::process::{into_callbacks, AudioProcess};

/// How long [`AudioStream::exchange_callback`] waits for the audio thread.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_millis(1000);

/// An open stream on a backend, with a callback that can be replaced while it runs.
///
/// Dropping the stream closes it.
pub struct AudioStream<S: Sample> {
    params: StreamParams<S>,
    context: Arc<StreamContext<S>>,
    open: bool,
}

impl<S: Sample> AudioStream<S> {
    /// Opens a stream on a fresh context using the platform default backend.
    ///
    /// Errors are reported through [`default_error_callback`].
    pub fn new(params: StreamParams<S>, callback: Callback<S>) -> Result<AudioStream<S>> {
        AudioStream::with_error_callback(params, callback, default_error_callback())
    }

    pub fn with_error_callback(
        params: StreamParams<S>,
        callback: Callback<S>,
        error_callback: ErrorCallback,
    ) -> Result<AudioStream<S>> {
        let context = Arc::new(StreamContext::new()?);
        AudioStream::with_context(params, context, callback, error_callback)
    }

    pub fn with_context(
        params: StreamParams<S>,
        context: Arc<StreamContext<S>>,
        callback: Callback<S>,
        error_callback: ErrorCallback,
    ) -> Result<AudioStream<S>> {
        AudioStream::init(params, context, callback, error_callback)
    }

    /// Opens a stream driven by `process`. The caller may keep a clone to inspect it.
    pub fn from_process<P: AudioProcess<S>>(
        params: StreamParams<S>,
        context: Arc<StreamContext<S>>,
        process: Arc<Mutex<P>>,
    ) -> Result<AudioStream<S>> {
        let (callback, error_callback) = into_callbacks(process);
        AudioStream::init(params, context, callback, error_callback)
    }

    pub fn builder(params: StreamParams<S>) -> StreamBuilder<S> {
        StreamBuilder::new(params)
    }

    fn init(
        params: StreamParams<S>,
        context: Arc<StreamContext<S>>,
        callback: Callback<S>,
        error_callback: ErrorCallback,
    ) -> Result<AudioStream<S>> {
        {
            let mut backend = context.backend()?;
            let previous = backend.set_callback(callback);
            let previous_error = backend.set_error_callback(error_callback);

            let res = backend
                .is_configuration_supported(&params)
                .and_then(|()| backend.open_stream(&params));

            if let Err(e) = res {
                // Another stream on this context may still be using its callbacks.
                if let Some(previous) = previous {
                    backend.set_callback(previous);
                }
                if let Some(previous_error) = previous_error {
                    backend.set_error_callback(previous_error);
                }
                return Err(e.into());
            }
        }

        tracing::debug!(backend = context.backend_name(), "opened stream");

        Ok(AudioStream {
            params,
            context,
            open: true,
        })
    }

    pub fn start(&self) -> Result<()> {
        Ok(self.context.backend()?.start()?)
    }

    pub fn pause(&self) -> Result<()> {
        Ok(self.context.backend()?.pause()?)
    }

    pub fn stop(&self) -> Result<()> {
        Ok(self.context.backend()?.stop()?)
    }

    pub fn playback_state(&self) -> Result<StreamStatus> {
        Ok(self.context.backend()?.playback_state()?)
    }

    /// Installs `callback` and returns the previous one, waiting at most
    /// [`DEFAULT_EXCHANGE_TIMEOUT`] for the current period to finish.
    ///
    /// The audio thread sees either the old or the new callback for a whole period. On timeout
    /// nothing changes and the error holds `callback`.
    pub fn exchange_callback(
        &self,
        callback: Callback<S>,
    ) -> Result<Option<Callback<S>>, ExchangeError<Callback<S>>> {
        self.exchange_callback_timeout(callback, DEFAULT_EXCHANGE_TIMEOUT)
    }

    pub fn exchange_callback_timeout(
        &self,
        callback: Callback<S>,
        timeout: Duration,
    ) -> Result<Option<Callback<S>>, ExchangeError<Callback<S>>> {
        self.context
            .dispatch()
            .exchange_callback(callback, Some(Instant::now() + timeout))
    }

    pub fn exchange_error_callback(
        &self,
        callback: ErrorCallback,
    ) -> Result<Option<ErrorCallback>, ExchangeError<ErrorCallback>> {
        self.exchange_error_callback_timeout(callback, DEFAULT_EXCHANGE_TIMEOUT)
    }

    pub fn exchange_error_callback_timeout(
        &self,
        callback: ErrorCallback,
        timeout: Duration,
    ) -> Result<Option<ErrorCallback>, ExchangeError<ErrorCallback>> {
        self.context
            .dispatch()
            .exchange_error_callback(callback, Some(Instant::now() + timeout))
    }

    pub fn params(&self) -> &StreamParams<S> {
        &self.params
    }

    /// Reopens the stream with `params`. The stream must not be running or paused.
    ///
    /// If the backend rejects `params` the stream keeps its old parameters. If reopening
    /// fails afterwards the stream is left closed.
    pub fn set_params(&mut self, params: StreamParams<S>) -> Result<()> {
        let mut backend = self.context.backend()?;

        if self.open && backend.playback_state()? != StreamStatus::Stopped {
            return Err(Error::Stream(StreamError::system(
                "stream must be stopped to change parameters",
            )));
        }

        backend.is_configuration_supported(&params)?;

        if self.open {
            backend.close_stream()?;
            self.open = false;
        }

        backend.open_stream(&params)?;
        self.open = true;
        self.params = params;

        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn context(&self) -> &Arc<StreamContext<S>> {
        &self.context
    }
}

impl<S: Sample> Drop for AudioStream<S> {
    fn drop(&mut self) {
        let res = self
            .context
            .backend()
            .and_then(|mut backend| Ok(backend.close_stream()?));

        match res {
            Ok(()) => tracing::debug!(backend = self.context.backend_name(), "closed stream"),
            Err(e) => tracing::warn!("failed to close stream: {e}"),
        }
    }
}

impl<S: Sample> fmt::Debug for AudioStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("params", &self.params)
            .field("context", &self.context)
            .field("open", &self.open)
            .finish()
    }
}

/// Assembles an [`AudioStream`] from optional pieces.
///
/// Missing pieces default to a fresh context, [`silence`] and [`default_error_callback`].
pub struct StreamBuilder<S: Sample> {
    params: StreamParams<S>,
    context: Option<Arc<StreamContext<S>>>,
    callback: Option<Callback<S>>,
    error_callback: Option<ErrorCallback>,
}

impl<S: Sample> StreamBuilder<S> {
    pub fn new(params: StreamParams<S>) -> StreamBuilder<S> {
        StreamBuilder {
            params,
            context: None,
            callback: None,
            error_callback: None,
        }
    }

    pub fn context(mut self, context: Arc<StreamContext<S>>) -> StreamBuilder<S> {
        self.context = Some(context);
        self
    }

    pub fn callback(mut self, callback: Callback<S>) -> StreamBuilder<S> {
        self.callback = Some(callback);
        self
    }

    pub fn error_callback(mut self, error_callback: ErrorCallback) -> StreamBuilder<S> {
        self.error_callback = Some(error_callback);
        self
    }

    pub fn process<P: AudioProcess<S>>(mut self, process: Arc<Mutex<P>>) -> StreamBuilder<S> {
        let (callback, error_callback) = into_callbacks(process);
        self.callback = Some(callback);
        self.error_callback = Some(error_callback);
        self
    }

    pub fn build(self) -> Result<AudioStream<S>> {
        let context = match self.context {
            Some(context) => context,
            None => Arc::new(StreamContext::new()?),
        };

        AudioStream::init(
            self.params,
            context,
            self.callback.unwrap_or_else(silence),
            self.error_callback.unwrap_or_else(default_error_callback),
        )
    }
}

pub fn start_stream<S: Sample>(stream: &AudioStream<S>) -> Result<()> {
    stream.start()
}

pub fn pause_stream<S: Sample>(stream: &AudioStream<S>) -> Result<()> {
    stream.pause()
}

pub fn stop_stream<S: Sample>(stream: &AudioStream<S>) -> Result<()> {
    stream.stop()
}
