use std::sync::Arc;

use rtio_core::{
    Backend, DeviceIndex, DeviceInfo, Dispatch, Sample, StreamError, StreamParams, StreamResult,
    StreamStatus,
};

const MESSAGE: &str = "attempted use of dummy backend";

/// Backend that refuses everything. Useful as a placeholder when no audio system is present.
pub struct DummyBackend<S: Sample> {
    dispatch: Arc<Dispatch<S>>,
}

impl<S: Sample> DummyBackend<S> {
    pub fn new() -> DummyBackend<S> {
        DummyBackend {
            dispatch: Arc::new(Dispatch::new()),
        }
    }
}

impl<S: Sample> Default for DummyBackend<S> {
    fn default() -> DummyBackend<S> {
        DummyBackend::new()
    }
}

#[cold]
fn refuse<T>() -> StreamResult<T> {
    Err(StreamError::system(MESSAGE))
}

impl<S: Sample> Backend<S> for DummyBackend<S> {
    fn name(&self) -> &str {
        "dummy"
    }

    fn info(&self) -> String {
        "dummy backend, no audio output".into()
    }

    fn start(&mut self) -> StreamResult {
        refuse()
    }

    fn pause(&mut self) -> StreamResult {
        refuse()
    }

    fn stop(&mut self) -> StreamResult {
        refuse()
    }

    fn playback_state(&self) -> StreamResult<StreamStatus> {
        refuse()
    }

    fn open_stream(&mut self, _params: &StreamParams<S>) -> StreamResult {
        refuse()
    }

    fn close_stream(&mut self) -> StreamResult {
        refuse()
    }

    fn device_count(&self) -> usize {
        0
    }

    fn device_info(&self, _index: DeviceIndex) -> StreamResult<DeviceInfo> {
        refuse()
    }

    fn is_configuration_supported(&self, _params: &StreamParams<S>) -> StreamResult {
        refuse()
    }

    fn default_input_device(&self) -> Option<DeviceIndex> {
        None
    }

    fn default_output_device(&self) -> Option<DeviceIndex> {
        None
    }

    fn dispatch(&self) -> &Arc<Dispatch<S>> {
        &self.dispatch
    }
}
