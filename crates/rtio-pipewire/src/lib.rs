//! PipeWire backend for rtio.
//!
//! All PipeWire objects live on a dedicated `pipewire-driver` thread. The backend talks to it
//! through a channel and waits for each reply.

mod error;
mod internal;

use std::sync::{Arc, Mutex};

use rtio_core::{
    Backend, DeviceIndex, DeviceInfo, Dispatch, Sample, StreamError, StreamParams, StreamResult,
    StreamStatus,
};

pub use crate::error::{Error, Result};
use crate::internal::{audio_format, Handle, Node, Nodes, PwThread, Transition};

pub struct PipeWireBackend<S: Sample> {
    handle: Handle<S>,
    dispatch: Arc<Dispatch<S>>,
    nodes: Nodes,
}

impl<S: Sample> PipeWireBackend<S> {
    /// Connects to the PipeWire daemon and waits for the initial device list.
    pub fn new() -> Result<PipeWireBackend<S>> {
        let (handle, receiver) = Handle::new();
        let nodes: Nodes = Arc::new(Mutex::new(Vec::new()));

        let (err_sender, err_receiver) = oneshot::channel();
        let (ready_sender, ready_receiver) = oneshot::channel();

        let thread_handle = handle.clone();
        let thread_nodes = nodes.clone();
        std::thread::Builder::new()
            .name("pipewire-driver".into())
            .spawn(move || match PwThread::new(thread_handle, thread_nodes) {
                Ok(thread) => {
                    let _ = err_sender.send(None);
                    thread.run(receiver, ready_sender);
                }
                Err(e) => {
                    let _ = err_sender.send(Some(e));
                }
            })
            .map_err(Error::ThreadSpawn)?;

        match err_receiver.recv() {
            Ok(Some(err)) => return Err(err),
            Ok(None) => {}
            Err(_) => return Err(Error::ThreadCrashed),
        }

        if ready_receiver.recv().is_err() {
            return Err(Error::ThreadCrashed);
        }

        let backend = PipeWireBackend {
            handle,
            dispatch: Arc::new(Dispatch::new()),
            nodes,
        };

        tracing::debug!("pipewire backend ready with {} devices", backend.device_count());

        Ok(backend)
    }

    fn nodes(&self) -> StreamResult<std::sync::MutexGuard<'_, Vec<Node>>> {
        self.nodes
            .lock()
            .map_err(|_| StreamError::fatal("device list poisoned"))
    }

    fn target(&self, index: Option<DeviceIndex>) -> StreamResult<Option<u32>> {
        let Some(index) = index else {
            return Ok(None);
        };

        let nodes = self.nodes()?;
        match nodes.get(index as usize) {
            Some(node) => Ok(Some(node.id)),
            None => Err(StreamError::system(format!("no device with index {index}"))),
        }
    }
}

impl<S: Sample> Drop for PipeWireBackend<S> {
    fn drop(&mut self) {
        let _ = self.handle.terminate();
    }
}

impl<S: Sample> Backend<S> for PipeWireBackend<S> {
    fn name(&self) -> &str {
        "pipewire"
    }

    fn info(&self) -> String {
        format!("PipeWire native audio, {} devices", self.device_count())
    }

    fn start(&mut self) -> StreamResult {
        Ok(self.handle.transition(Transition::Start)?)
    }

    fn pause(&mut self) -> StreamResult {
        Ok(self.handle.transition(Transition::Pause)?)
    }

    fn stop(&mut self) -> StreamResult {
        Ok(self.handle.transition(Transition::Stop)?)
    }

    fn playback_state(&self) -> StreamResult<StreamStatus> {
        Ok(self.handle.playback_state()?)
    }

    fn open_stream(&mut self, params: &StreamParams<S>) -> StreamResult {
        self.is_configuration_supported(params)?;

        let device = if params.has_output() {
            params.output_device()
        } else {
            params.input_device()
        };
        let target = self.target(device)?;

        self.handle
            .open_stream(*params, target, self.dispatch.clone())?;

        tracing::debug!(?target, "opened pipewire stream");
        Ok(())
    }

    fn close_stream(&mut self) -> StreamResult {
        Ok(self.handle.close_stream()?)
    }

    fn device_count(&self) -> usize {
        self.nodes().map(|nodes| nodes.len()).unwrap_or(0)
    }

    fn device_info(&self, index: DeviceIndex) -> StreamResult<DeviceInfo> {
        self.nodes()?
            .get(index as usize)
            .map(|node| node.info.clone())
            .ok_or_else(|| StreamError::system(format!("no device with index {index}")))
    }

    fn is_configuration_supported(&self, params: &StreamParams<S>) -> StreamResult {
        if audio_format(S::FORMAT).is_none() || cfg!(target_endian = "big") {
            return Err(Error::UnsupportedFormat(S::FORMAT).into());
        }

        if params.is_duplex() {
            return Err(StreamError::system("pipewire streams are either input or output"));
        }

        if !params.has_input() && !params.has_output() {
            return Err(StreamError::system("stream has neither inputs nor outputs"));
        }

        let rate = params.sample_rate();
        if rate.fract() != 0.0 || rate > u32::MAX as f64 {
            return Err(StreamError::system(format!("unsupported sample rate {rate}")));
        }

        let (device, width) = if params.has_output() {
            (params.output_device(), params.output_frame_width())
        } else {
            (params.input_device(), params.input_frame_width())
        };

        if width > pipewire::spa::param::audio::MAX_CHANNELS {
            return Err(Error::TooManyChannels.into());
        }

        if let Some(index) = device {
            let info = self.device_info(index)?;
            let max = if params.has_output() {
                info.max_output_channels
            } else {
                info.max_input_channels
            };

            if width > max {
                return Err(StreamError::system(format!(
                    "{} supports at most {max} channels, requested {width}",
                    info.name
                )));
            }
        }

        Ok(())
    }

    fn default_input_device(&self) -> Option<DeviceIndex> {
        let nodes = self.nodes().ok()?;
        nodes.iter().find(|n| n.info.is_input()).map(|n| n.info.index)
    }

    fn default_output_device(&self) -> Option<DeviceIndex> {
        let nodes = self.nodes().ok()?;
        nodes.iter().find(|n| n.info.is_output()).map(|n| n.info.index)
    }

    fn dispatch(&self) -> &Arc<Dispatch<S>> {
        &self.dispatch
    }
}
