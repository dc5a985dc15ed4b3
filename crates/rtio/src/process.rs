use std::sync::{Arc, Mutex, TryLockError};

use rtio_core::callback::raise_stream_error;
use rtio_core::{
    BufferGroup, Callback, ErrorCallback, RealTime, Sample, StreamError, StreamParams,
    StreamResult,
};

/// Object-based alternative to closures: implement the hooks you need.
pub trait AudioProcess<S: Sample>: Send + 'static {
    /// Called once per period from the audio thread. Does nothing by default, which leaves
    /// the output as the backend handed it over.
    fn on_process(
        &mut self,
        buffers: &mut BufferGroup<'_, S>,
        time: RealTime,
        params: &StreamParams<S>,
    ) -> StreamResult {
        let _ = (buffers, time, params);
        Ok(())
    }

    /// Called when the stream reports an error. Raises it by default.
    fn on_error(&mut self, error: &StreamError) {
        raise_stream_error(error);
    }
}

/// Wraps a shared process into stream callbacks.
///
/// The audio thread only ever tries the lock. While someone else holds it, the period is
/// silent and errors go to the default handler.
pub fn into_callbacks<S: Sample, P: AudioProcess<S>>(
    process: Arc<Mutex<P>>,
) -> (Callback<S>, ErrorCallback) {
    let on_process = process.clone();
    let callback: Callback<S> = Box::new(move |buffers, time, params| match on_process.try_lock() {
        Ok(mut process) => process.on_process(buffers, time, params),
        Err(TryLockError::WouldBlock) => {
            buffers.output.fill(S::EQUILIBRIUM);
            Ok(())
        }
        Err(TryLockError::Poisoned(_)) => Err(StreamError::fatal("audio process poisoned")),
    });

    let error_callback: ErrorCallback = Box::new(move |error| match process.try_lock() {
        Ok(mut process) => process.on_error(error),
        Err(_) => raise_stream_error(error),
    });

    (callback, error_callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtio_core::{BufferView, BufferViewMut, StreamStatus};

    #[derive(Default)]
    struct Counter {
        periods: usize,
        errors: Vec<StreamStatus>,
    }

    impl AudioProcess<f32> for Counter {
        fn on_process(
            &mut self,
            buffers: &mut BufferGroup<'_, f32>,
            _: RealTime,
            _: &StreamParams<f32>,
        ) -> StreamResult {
            self.periods += 1;
            buffers.output.fill(self.periods as f32);
            Ok(())
        }

        fn on_error(&mut self, error: &StreamError) {
            self.errors.push(error.status());
        }
    }

    struct Passive;

    impl AudioProcess<i16> for Passive {}

    #[test]
    fn forwards_to_process() {
        let process = Arc::new(Mutex::new(Counter::default()));
        let (mut callback, mut error_callback) = into_callbacks(process.clone());
        let params = StreamParams::new(44100.0, 2, 0, 1).unwrap();

        let mut out = [0.0; 2];
        let mut group = BufferGroup::new(BufferView::empty(), BufferViewMut::new(&mut out, 2, 1));
        callback(&mut group, RealTime::ZERO, &params).unwrap();
        callback(&mut group, RealTime::ZERO, &params).unwrap();
        error_callback(&StreamError::xrun("late"));

        assert_eq!(out, [2.0, 2.0]);
        let process = process.lock().unwrap();
        assert_eq!(process.periods, 2);
        assert_eq!(process.errors, [StreamStatus::Xrun]);
    }

    #[test]
    fn contended_period_is_silent() {
        let process = Arc::new(Mutex::new(Counter::default()));
        let (mut callback, _) = into_callbacks(process.clone());
        let params = StreamParams::new(44100.0, 2, 0, 1).unwrap();

        let guard = process.lock().unwrap();
        let mut out = [5.0; 2];
        let mut group = BufferGroup::new(BufferView::empty(), BufferViewMut::new(&mut out, 2, 1));
        assert_eq!(callback(&mut group, RealTime::ZERO, &params), Ok(()));
        drop(guard);

        assert_eq!(out, [0.0; 2]);
        assert_eq!(process.lock().unwrap().periods, 0);
    }

    #[test]
    fn defaults_do_nothing() {
        let (mut callback, _) = into_callbacks::<i16, _>(Arc::new(Mutex::new(Passive)));
        let params = StreamParams::new(8000.0, 1, 0, 1).unwrap();

        let mut out = [3i16];
        let mut group = BufferGroup::new(BufferView::empty(), BufferViewMut::new(&mut out, 1, 1));
        assert_eq!(callback(&mut group, RealTime::ZERO, &params), Ok(()));
        assert_eq!(out, [3]);
    }
}
