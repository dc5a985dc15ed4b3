use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use rtio_core::{Backend, DeviceIndex, DeviceInfo, Dispatch, Sample, StreamError, StreamParams};

use crate::backend::BackendKind;
use crate::error::Result;

/// Owns one backend and answers device queries against it.
///
/// Shared between streams through an `Arc`. The backend hosts a single stream at a time.
pub struct StreamContext<S: Sample> {
    backend: Mutex<Box<dyn Backend<S>>>,
    dispatch: Arc<Dispatch<S>>,
    name: String,
}

impl<S: Sample> StreamContext<S> {
    /// Creates a context on the platform default backend.
    pub fn new() -> Result<StreamContext<S>> {
        StreamContext::from_kind(BackendKind::platform_default())
    }

    pub fn from_kind(kind: BackendKind) -> Result<StreamContext<S>> {
        Ok(StreamContext::with_backend(kind.create()?))
    }

    pub fn with_backend(backend: Box<dyn Backend<S>>) -> StreamContext<S> {
        StreamContext {
            dispatch: backend.dispatch().clone(),
            name: backend.name().to_owned(),
            backend: Mutex::new(backend),
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.name
    }

    pub fn backend_info(&self) -> Result<String> {
        Ok(self.backend()?.info())
    }

    pub fn device_count(&self) -> Result<usize> {
        Ok(self.backend()?.device_count())
    }

    pub fn device_info(&self, index: DeviceIndex) -> Result<DeviceInfo> {
        Ok(self.backend()?.device_info(index)?)
    }

    /// Queries every device. Not cached, so each call asks the backend again.
    pub fn device_info_list(&self) -> Result<Vec<DeviceInfo>> {
        let backend = self.backend()?;
        (0..backend.device_count())
            .map(|i| Ok(backend.device_info(i as DeviceIndex)?))
            .collect()
    }

    pub fn is_configuration_supported(&self, params: &StreamParams<S>) -> Result<()> {
        Ok(self.backend()?.is_configuration_supported(params)?)
    }

    pub fn default_input_device(&self) -> Result<Option<DeviceIndex>> {
        Ok(self.backend()?.default_input_device())
    }

    pub fn default_output_device(&self) -> Result<Option<DeviceIndex>> {
        Ok(self.backend()?.default_output_device())
    }

    pub fn dispatch(&self) -> &Arc<Dispatch<S>> {
        &self.dispatch
    }

    pub(crate) fn backend(&self) -> Result<MutexGuard<'_, Box<dyn Backend<S>>>> {
        self.backend
            .lock()
            .map_err(|_| StreamError::fatal("backend poisoned by a panic").into())
    }
}

impl<S: Sample> fmt::Debug for StreamContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamContext")
            .field("backend", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OfflineBackend;
    use crate::Error;

    #[test]
    fn forwards_queries() {
        let ctx = StreamContext::<f32>::with_backend(Box::new(OfflineBackend::new()));
        assert_eq!(ctx.backend_name(), "offline");
        assert_eq!(ctx.device_count(), Ok(2));
        assert_eq!(ctx.default_output_device(), Ok(Some(0)));

        let list = ctx.device_info_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], ctx.device_info(1).unwrap());

        let wide = StreamParams::new(44100.0, 128, 0, 6).unwrap();
        assert!(matches!(
            ctx.is_configuration_supported(&wide),
            Err(Error::Stream(_))
        ));
    }

    #[test]
    fn dummy_has_no_devices() {
        let ctx = StreamContext::<i32>::from_kind(BackendKind::Dummy).unwrap();
        assert_eq!(ctx.device_info_list(), Ok(Vec::new()));
        assert!(ctx.device_info(0).is_err());
    }
}
