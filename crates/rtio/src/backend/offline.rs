use std::sync::{Arc, Mutex, MutexGuard};

use rtio_core::{
    AudioBuffer, Backend, DeviceIndex, DeviceInfo, Dispatch, Flow, Lifecycle, RealTime, Sample,
    StreamError, StreamParams, StreamResult, StreamStatus,
};

const MIN_SAMPLE_RATE: f64 = 8000.0;
const MAX_SAMPLE_RATE: f64 = 192000.0;

/// In-process backend driven by whoever calls [`OfflineHandle::process_period`].
///
/// Periods run on the calling thread, which stands in for the real-time thread of a native
/// backend. Time is derived from a frame clock, so rendering is deterministic.
pub struct OfflineBackend<S: Sample> {
    shared: Arc<Shared<S>>,
    devices: Vec<DeviceInfo>,
}

struct Shared<S: Sample> {
    dispatch: Arc<Dispatch<S>>,
    engine: Mutex<Engine<S>>,
}

struct Engine<S: Sample> {
    state: Lifecycle,
    params: Option<StreamParams<S>>,
    input: AudioBuffer<S>,
    output: AudioBuffer<S>,
    frame: u64,
}

impl<S: Sample> OfflineBackend<S> {
    /// Creates a backend with one stereo output and one stereo input device.
    pub fn new() -> OfflineBackend<S> {
        let latency = RealTime::from_secs_f64(0.01);
        OfflineBackend::with_devices(vec![
            DeviceInfo::new("Offline Output", 0)
                .with_channels(0, 2)
                .with_sample_rate(44100.0)
                .with_output_latency(latency, latency),
            DeviceInfo::new("Offline Input", 1)
                .with_channels(2, 0)
                .with_sample_rate(44100.0)
                .with_input_latency(latency, latency),
        ])
    }

    /// Creates a backend exposing `devices`. The first device with outputs (inputs) is the
    /// default output (input).
    pub fn with_devices(devices: Vec<DeviceInfo>) -> OfflineBackend<S> {
        let devices = devices
            .into_iter()
            .enumerate()
            .map(|(i, device)| DeviceInfo {
                index: i as DeviceIndex,
                ..device
            })
            .collect();

        OfflineBackend {
            shared: Arc::new(Shared {
                dispatch: Arc::new(Dispatch::new()),
                engine: Mutex::new(Engine {
                    state: Lifecycle::Closed,
                    params: None,
                    input: AudioBuffer::new(0, 0),
                    output: AudioBuffer::new(0, 0),
                    frame: 0,
                }),
            }),
            devices,
        }
    }

    /// Handle for driving periods after the backend has been moved into a stream.
    pub fn handle(&self) -> OfflineHandle<S> {
        OfflineHandle {
            shared: self.shared.clone(),
        }
    }

    fn engine(&self) -> StreamResult<MutexGuard<'_, Engine<S>>> {
        self.shared.engine()
    }

    fn resolve(&self, device: Option<DeviceIndex>, input: bool) -> StreamResult<&DeviceInfo> {
        let index = match device {
            Some(index) => index,
            None if input => self
                .default_input_device()
                .ok_or_else(|| StreamError::system("no default input device"))?,
            None => self
                .default_output_device()
                .ok_or_else(|| StreamError::system("no default output device"))?,
        };

        self.devices
            .get(index as usize)
            .ok_or_else(|| StreamError::system(format!("invalid device index {index}")))
    }
}

impl<S: Sample> Default for OfflineBackend<S> {
    fn default() -> OfflineBackend<S> {
        OfflineBackend::new()
    }
}

impl<S: Sample> Backend<S> for OfflineBackend<S> {
    fn name(&self) -> &str {
        "offline"
    }

    fn info(&self) -> String {
        format!("offline backend, {} virtual devices", self.devices.len())
    }

    fn start(&mut self) -> StreamResult {
        self.engine()?.state.start()
    }

    fn pause(&mut self) -> StreamResult {
        self.engine()?.state.pause()
    }

    fn stop(&mut self) -> StreamResult {
        self.engine()?.state.stop()
    }

    fn playback_state(&self) -> StreamResult<StreamStatus> {
        Ok(self.engine()?.state.status())
    }

    fn open_stream(&mut self, params: &StreamParams<S>) -> StreamResult {
        self.is_configuration_supported(params)?;

        let mut engine = self.engine()?;
        engine.state.open()?;
        engine.params = Some(*params);
        engine.input = AudioBuffer::new(params.frame_count(), params.input_frame_width());
        engine.output = AudioBuffer::new(params.frame_count(), params.output_frame_width());
        engine.frame = 0;

        tracing::debug!(
            sample_rate = params.sample_rate(),
            frame_count = params.frame_count(),
            "opened offline stream"
        );

        Ok(())
    }

    fn close_stream(&mut self) -> StreamResult {
        let mut engine = self.engine()?;
        if engine.state.close() != Lifecycle::Closed {
            engine.params = None;
            tracing::debug!(frames = engine.frame, "closed offline stream");
        }

        Ok(())
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_info(&self, index: DeviceIndex) -> StreamResult<DeviceInfo> {
        self.devices
            .get(index as usize)
            .cloned()
            .ok_or_else(|| StreamError::system(format!("invalid device index {index}")))
    }

    fn is_configuration_supported(&self, params: &StreamParams<S>) -> StreamResult {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&params.sample_rate()) {
            return Err(StreamError::system(format!(
                "unsupported sample rate {}",
                params.sample_rate()
            )));
        }

        if !params.has_input() && !params.has_output() {
            return Err(StreamError::system("stream has neither input nor output"));
        }

        if params.has_input() {
            let device = self.resolve(params.input_device(), true)?;
            if params.input_frame_width() > device.max_input_channels {
                return Err(StreamError::system(format!(
                    "{} has {} input channels, {} requested",
                    device.name,
                    device.max_input_channels,
                    params.input_frame_width()
                )));
            }
        }

        if params.has_output() {
            let device = self.resolve(params.output_device(), false)?;
            if params.output_frame_width() > device.max_output_channels {
                return Err(StreamError::system(format!(
                    "{} has {} output channels, {} requested",
                    device.name,
                    device.max_output_channels,
                    params.output_frame_width()
                )));
            }
        }

        Ok(())
    }

    fn default_input_device(&self) -> Option<DeviceIndex> {
        self.devices.iter().find(|d| d.is_input()).map(|d| d.index)
    }

    fn default_output_device(&self) -> Option<DeviceIndex> {
        self.devices.iter().find(|d| d.is_output()).map(|d| d.index)
    }

    fn dispatch(&self) -> &Arc<Dispatch<S>> {
        &self.shared.dispatch
    }
}

impl<S: Sample> Shared<S> {
    fn engine(&self) -> StreamResult<MutexGuard<'_, Engine<S>>> {
        self.engine
            .lock()
            .map_err(|_| StreamError::fatal("offline engine poisoned"))
    }
}

/// Drives an [`OfflineBackend`] from any thread.
pub struct OfflineHandle<S: Sample> {
    shared: Arc<Shared<S>>,
}

impl<S: Sample> Clone for OfflineHandle<S> {
    fn clone(&self) -> OfflineHandle<S> {
        OfflineHandle {
            shared: self.shared.clone(),
        }
    }
}

impl<S: Sample> OfflineHandle<S> {
    /// Runs one period.
    ///
    /// While the stream isn't running the output is silent, the callback isn't invoked and
    /// the clock holds. An aborting callback stops the stream.
    pub fn process_period(&self) -> StreamResult<Flow> {
        let mut engine = self.shared.engine()?;
        let Engine {
            state,
            params,
            input,
            output,
            frame,
        } = &mut *engine;

        let Some(params) = params else {
            return Err(StreamError::system("no stream open"));
        };

        if !state.is_running() {
            output.clear();
            return Ok(Flow::Continue);
        }

        let time = RealTime::from_frames(*frame, params.sample_rate());
        let flow = self.shared.dispatch.process(input, output, time, params);
        *frame += params.frame_count() as u64;

        if flow.is_abort() {
            state.stop()?;
            tracing::debug!("offline stream aborted by callback");
        }

        Ok(flow)
    }

    /// Runs up to `periods` periods and returns the concatenated output. Stops early on abort.
    pub fn render(&self, periods: usize) -> StreamResult<Vec<S>> {
        let mut rendered = Vec::new();
        for _ in 0..periods {
            let flow = self.process_period()?;
            rendered.extend_from_slice(&self.shared.engine()?.output);
            if flow.is_abort() {
                break;
            }
        }

        Ok(rendered)
    }

    /// Sets the input of the next periods. Shorter data is padded with silence.
    pub fn feed_input(&self, samples: &[S]) -> StreamResult {
        self.shared.engine()?.input.copy_from(samples);
        Ok(())
    }

    /// Output of the last period.
    pub fn output(&self) -> StreamResult<Vec<S>> {
        Ok(self.shared.engine()?.output.to_vec())
    }

    /// Frames processed since the stream was opened.
    pub fn frame_position(&self) -> StreamResult<u64> {
        Ok(self.shared.engine()?.frame)
    }

    pub fn lifecycle(&self) -> StreamResult<Lifecycle> {
        Ok(self.shared.engine()?.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (OfflineBackend<f32>, OfflineHandle<f32>) {
        let backend = OfflineBackend::new();
        let handle = backend.handle();
        (backend, handle)
    }

    #[test]
    fn devices() {
        let (backend, _) = backend();
        assert_eq!(backend.device_count(), 2);
        assert_eq!(backend.default_output_device(), Some(0));
        assert_eq!(backend.default_input_device(), Some(1));
        assert_eq!(backend.device_info(1).unwrap().name, "Offline Input");
        assert!(backend.device_info(2).is_err());
    }

    #[test]
    fn rejects_unsupported() {
        let (backend, _) = backend();
        let too_wide = StreamParams::<f32>::new(44100.0, 64, 0, 8).unwrap();
        assert!(backend.is_configuration_supported(&too_wide).is_err());

        let bad_rate = StreamParams::<f32>::new(1000.0, 64, 0, 2).unwrap();
        assert!(backend.is_configuration_supported(&bad_rate).is_err());

        let bad_device = StreamParams::<f32>::new(44100.0, 64, 0, 2)
            .unwrap()
            .with_devices(None, Some(7));
        assert!(backend.is_configuration_supported(&bad_device).is_err());

        let ok = StreamParams::<f32>::new(44100.0, 64, 2, 2).unwrap();
        assert_eq!(backend.is_configuration_supported(&ok), Ok(()));
    }

    #[test]
    fn clock_and_pause() {
        let (mut backend, handle) = backend();
        let params = StreamParams::<f32>::new(48000.0, 480, 0, 2).unwrap();

        let times = Arc::new(Mutex::new(Vec::new()));
        let sink = times.clone();
        backend.set_callback(Box::new(move |buffers, time, _| {
            sink.lock().unwrap().push(time);
            buffers.output.fill(1.0);
            Ok(())
        }));

        assert!(handle.process_period().is_err());
        backend.open_stream(&params).unwrap();
        backend.start().unwrap();
        handle.process_period().unwrap();
        handle.process_period().unwrap();

        backend.pause().unwrap();
        assert_eq!(backend.playback_state(), Ok(StreamStatus::Paused));
        handle.process_period().unwrap();
        assert!(handle.output().unwrap().iter().all(|&s| s == 0.0));
        assert_eq!(handle.frame_position(), Ok(960));

        backend.start().unwrap();
        handle.process_period().unwrap();
        assert!(handle.output().unwrap().iter().all(|&s| s == 1.0));

        let times = times.lock().unwrap();
        assert_eq!(
            *times,
            [
                RealTime::ZERO,
                RealTime::from_nanos(10_000_000),
                RealTime::from_nanos(20_000_000)
            ]
        );
    }

    #[test]
    fn abort_stops() {
        let (mut backend, handle) = backend();
        let params = StreamParams::<f32>::new(44100.0, 64, 0, 2).unwrap();
        backend.set_error_callback(Box::new(|_| {}));
        backend.set_callback(Box::new(|_, _, _| Err(StreamError::user("stop"))));
        backend.open_stream(&params).unwrap();
        backend.start().unwrap();

        let rendered = handle.render(4).unwrap();
        assert_eq!(rendered.len(), 128);
        assert_eq!(backend.playback_state(), Ok(StreamStatus::Stopped));
        assert_eq!(handle.lifecycle(), Ok(Lifecycle::Stopped));
    }

    #[test]
    fn input_reaches_callback() {
        let mut backend = OfflineBackend::<i16>::new();
        let handle = backend.handle();
        let params = StreamParams::<i16>::new(44100.0, 4, 1, 0).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        backend.set_callback(Box::new(move |buffers, _, _| {
            sink.lock().unwrap().extend_from_slice(buffers.input.as_slice());
            Ok(())
        }));

        backend.open_stream(&params).unwrap();
        backend.start().unwrap();
        handle.feed_input(&[1, 2, 3]).unwrap();
        handle.process_period().unwrap();

        assert_eq!(*seen.lock().unwrap(), [1, 2, 3, 0]);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut backend, handle) = backend();
        assert_eq!(backend.close_stream(), Ok(()));

        let params = StreamParams::<f32>::default().with_devices(Some(1), Some(0));
        backend.open_stream(&params).unwrap();
        assert!(backend.open_stream(&params).is_err());
        backend.start().unwrap();
        assert_eq!(backend.close_stream(), Ok(()));
        assert_eq!(backend.close_stream(), Ok(()));
        assert_eq!(handle.lifecycle(), Ok(Lifecycle::Closed));
    }
}
