use crate::buffer::BufferGroup;
use crate::error::{StreamError, StreamResult};
use crate::params::StreamParams;
use crate::sample::Sample;
use crate::time::RealTime;

/// Audio callback, invoked from the real-time thread once per period.
///
/// Must not block. Returning an error (or panicking) aborts the stream and reports the error
/// through the [`ErrorCallback`].
pub type Callback<S> =
    Box<dyn FnMut(&mut BufferGroup<'_, S>, RealTime, &StreamParams<S>) -> StreamResult + Send>;

/// Receives errors reported by the callback or by the backend.
pub type ErrorCallback = Box<dyn FnMut(&StreamError) + Send>;

/// Callback writing silence to every output sample.
pub fn write_silence<S: Sample>(
    buffers: &mut BufferGroup<'_, S>,
    _time: RealTime,
    _params: &StreamParams<S>,
) -> StreamResult {
    buffers.output.fill(S::EQUILIBRIUM);
    Ok(())
}

/// Boxed [`write_silence`].
pub fn silence<S: Sample>() -> Callback<S> {
    Box::new(write_silence::<S>)
}

/// Error callback used when none is given.
///
/// Logs the error and re-raises it as a panic on a separate thread, so failures are never
/// silent unless a quieter handler is installed.
pub fn default_error_callback() -> ErrorCallback {
    Box::new(raise_stream_error)
}

pub fn raise_stream_error(error: &StreamError) {
    tracing::error!(status = %error.status(), "{error}");

    let error = error.clone();
    let spawned = std::thread::Builder::new()
        .name("rtio-stream-error".into())
        .spawn(move || panic!("{error}"));

    if let Err(e) = spawned {
        tracing::error!("failed to raise stream error: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferView, BufferViewMut};

    #[test]
    fn silence_fills_equilibrium() {
        let params = StreamParams::<u8>::new(8000.0, 4, 0, 2).unwrap();
        let mut out = [7u8; 8];
        let mut group = BufferGroup::new(BufferView::empty(), BufferViewMut::new(&mut out, 4, 2));

        let mut cb = silence::<u8>();
        assert_eq!(cb(&mut group, RealTime::ZERO, &params), Ok(()));
        assert_eq!(out, [128; 8]);
    }
}
