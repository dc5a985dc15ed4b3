use std::any::Any;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::{BufferGroup, BufferView, BufferViewMut};
use crate::callback::{Callback, ErrorCallback};
use crate::device::{DeviceIndex, DeviceInfo};
use crate::error::{StreamError, StreamResult, StreamStatus};
use crate::params::StreamParams;
use crate::sample::Sample;
use crate::sync::slot::{CallbackSlot, ExchangeError};
use crate::time::RealTime;

/// Capabilities of a native audio backend.
///
/// A backend hosts at most one stream. Every fallible operation reports a [`StreamError`]
/// instead of panicking.
pub trait Backend<S: Sample>: Send + 'static {
    fn name(&self) -> &str;

    /// Human-readable description, e.g. library version.
    fn info(&self) -> String;

    fn start(&mut self) -> StreamResult;

    fn pause(&mut self) -> StreamResult;

    fn stop(&mut self) -> StreamResult;

    fn playback_state(&self) -> StreamResult<StreamStatus>;

    fn open_stream(&mut self, params: &StreamParams<S>) -> StreamResult;

    /// Closes the stream, stopping it first if needed. Does nothing if no stream is open.
    fn close_stream(&mut self) -> StreamResult;

    fn device_count(&self) -> usize;

    fn device_info(&self, index: DeviceIndex) -> StreamResult<DeviceInfo>;

    /// Returns `Ok` if a stream with `params` can be opened, or the reason why not.
    fn is_configuration_supported(&self, params: &StreamParams<S>) -> StreamResult;

    fn default_input_device(&self) -> Option<DeviceIndex>;

    fn default_output_device(&self) -> Option<DeviceIndex>;

    /// Trampoline the real-time thread calls into.
    fn dispatch(&self) -> &Arc<Dispatch<S>>;

    fn set_callback(&self, callback: Callback<S>) -> Option<Callback<S>> {
        unbounded(self.dispatch().exchange_callback(callback, None))
    }

    fn set_error_callback(&self, callback: ErrorCallback) -> Option<ErrorCallback> {
        unbounded(self.dispatch().exchange_error_callback(callback, None))
    }

    fn id(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.name().hash(&mut hasher);
        hasher.finish()
    }
}

fn unbounded<T>(res: Result<Option<T>, ExchangeError<T>>) -> Option<T> {
    match res {
        Ok(previous) => previous,
        Err(ExchangeError::Timeout(_)) => unreachable!("exchange without deadline timed out"),
    }
}

/// What the backend should do after a period.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Flow {
    Continue,
    Abort,
}

impl Flow {
    pub fn is_abort(self) -> bool {
        self == Flow::Abort
    }
}

/// Callbacks of one stream, shared between the control side and the real-time thread.
pub struct Dispatch<S: Sample> {
    callback: CallbackSlot<Callback<S>>,
    error_callback: CallbackSlot<ErrorCallback>,
}

impl<S: Sample> Dispatch<S> {
    pub fn new() -> Dispatch<S> {
        Dispatch {
            callback: CallbackSlot::new(None),
            error_callback: CallbackSlot::new(None),
        }
    }

    pub fn exchange_callback(
        &self,
        callback: Callback<S>,
        deadline: Option<Instant>,
    ) -> Result<Option<Callback<S>>, ExchangeError<Callback<S>>> {
        self.callback.exchange(callback, deadline)
    }

    pub fn exchange_error_callback(
        &self,
        callback: ErrorCallback,
        deadline: Option<Instant>,
    ) -> Result<Option<ErrorCallback>, ExchangeError<ErrorCallback>> {
        self.error_callback.exchange(callback, deadline)
    }

    /// Runs one period. Called by the backend from its real-time thread.
    ///
    /// The frame count is taken from the buffers, which may be shorter than requested by
    /// `params`. Output is silent whenever the callback is missing, busy or failing.
    pub fn process(
        &self,
        input: &[S],
        output: &mut [S],
        time: RealTime,
        params: &StreamParams<S>,
    ) -> Flow {
        let in_width = params.input_frame_width();
        let out_width = params.output_frame_width();

        let frame_count = match (in_width, out_width) {
            (0, 0) => 0,
            (0, w) => output.len() / w,
            (w, 0) => input.len() / w,
            (i, o) => (input.len() / i).min(output.len() / o),
        };

        let Some(mut guard) = self.callback.enter() else {
            output.fill(S::EQUILIBRIUM);
            return Flow::Continue;
        };

        let Some(callback) = guard.get() else {
            output.fill(S::EQUILIBRIUM);
            return Flow::Continue;
        };

        let input_view = if in_width > 0 {
            BufferView::new(input, frame_count, in_width)
        } else {
            BufferView::empty()
        };

        let output_view = if out_width > 0 {
            BufferViewMut::new(&mut *output, frame_count, out_width)
        } else {
            BufferViewMut::empty()
        };

        let mut group = BufferGroup::new(input_view, output_view);
        let result = panic::catch_unwind(AssertUnwindSafe(|| callback(&mut group, time, params)));
        drop(guard);

        let error = match result {
            Ok(Ok(())) => return Flow::Continue,
            Ok(Err(error)) if !error.status().is_failure() => return Flow::Continue,
            Ok(Err(error)) => error,
            Err(payload) => panic_error(payload),
        };

        output.fill(S::EQUILIBRIUM);
        self.report(&error);

        Flow::Abort
    }

    /// Hands `error` to the error callback, or logs it if there's none.
    pub fn report(&self, error: &StreamError) {
        let Some(mut guard) = self.error_callback.enter() else {
            tracing::error!(status = %error.status(), "error callback busy: {error}");
            return;
        };

        let Some(callback) = guard.get() else {
            tracing::error!(status = %error.status(), "{error}");
            return;
        };

        if panic::catch_unwind(AssertUnwindSafe(|| callback(error))).is_err() {
            tracing::error!("error callback panicked while handling: {error}");
        }
    }
}

impl<S: Sample> Default for Dispatch<S> {
    fn default() -> Dispatch<S> {
        Dispatch::new()
    }
}

#[cold]
fn panic_error(payload: Box<dyn Any + Send>) -> StreamError {
    let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
        format!("callback panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("callback panicked: {msg}")
    } else {
        return StreamError::system("callback panicked");
    };

    StreamError::system(message)
}
