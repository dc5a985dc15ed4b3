use std::cell::{Cell, RefCell};
use std::mem::{size_of, size_of_val};
use std::rc::Rc;
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pipewire::channel::{Receiver, Sender};
use pipewire::context::Context;
use pipewire::core::{Core, Listener as CoreListener, PW_ID_CORE};
use pipewire::keys::*;
use pipewire::main_loop::MainLoop;
use pipewire::properties::properties;
use pipewire::registry::{GlobalObject, Registry};
use pipewire::spa::param::audio::{AudioFormat, AudioInfoRaw, MAX_CHANNELS};
use pipewire::spa::pod::serialize::PodSerializer;
use pipewire::spa::pod::{Object, Pod, Value};
use pipewire::spa::sys::*;
use pipewire::spa::utils::dict::DictRef;
use pipewire::spa::utils::result::AsyncSeq;
use pipewire::spa::utils::Direction;
use pipewire::stream::{Stream, StreamFlags, StreamListener, StreamState};
use pipewire::types::ObjectType;
use rtio_core::{
    DeviceInfo, Dispatch, Lifecycle, RealTime, Sample, SampleFormat, StreamError, StreamParams,
    StreamStatus,
};

use crate::{Error, Result};

pub enum Message<S: Sample> {
    OpenStream {
        sender: oneshot::Sender<Result<()>>,
        params: StreamParams<S>,
        target: Option<u32>,
        dispatch: Arc<Dispatch<S>>,
    },
    Transition {
        sender: oneshot::Sender<Result<()>>,
        transition: Transition,
    },
    PlaybackState {
        sender: oneshot::Sender<Result<StreamStatus>>,
    },
    CloseStream {
        sender: oneshot::Sender<Result<()>>,
    },
    /// Sent from the process callback when the user callback fails.
    Abort,
    Terminate,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Transition {
    Start,
    Pause,
    Stop,
}

pub struct Handle<S: Sample> {
    sender: Sender<Message<S>>,
}

impl<S: Sample> Clone for Handle<S> {
    fn clone(&self) -> Handle<S> {
        Handle {
            sender: self.sender.clone(),
        }
    }
}

impl<S: Sample> Handle<S> {
    pub fn new() -> (Handle<S>, Receiver<Message<S>>) {
        let (sender, receiver) = pipewire::channel::channel();
        (Handle { sender }, receiver)
    }

    fn send(&self, message: Message<S>) -> Result<()> {
        self.sender.send(message).map_err(|_| Error::ThreadCrashed)
    }

    fn send_recv<T>(&self, recv: oneshot::Receiver<Result<T>>, message: Message<S>) -> Result<T> {
        let _ = self.sender.send(message);
        recv.recv().map_err(|_| Error::ThreadCrashed)?
    }

    pub fn terminate(&self) -> Result<()> {
        self.send(Message::Terminate)
    }

    pub fn open_stream(
        &self,
        params: StreamParams<S>,
        target: Option<u32>,
        dispatch: Arc<Dispatch<S>>,
    ) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(
            receiver,
            Message::OpenStream {
                sender,
                params,
                target,
                dispatch,
            },
        )
    }

    pub fn transition(&self, transition: Transition) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::Transition { sender, transition })
    }

    pub fn playback_state(&self) -> Result<StreamStatus> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::PlaybackState { sender })
    }

    pub fn close_stream(&self) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::CloseStream { sender })
    }
}

/// Audio node seen in the registry.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: u32,
    pub info: DeviceInfo,
}

pub type Nodes = Arc<Mutex<Vec<Node>>>;

pub struct PwThread<S: Sample> {
    main_loop: MainLoop,
    core: Core,
    registry: Registry,
    handle: Handle<S>,

    nodes: Nodes,
    state: Cell<Lifecycle>,
    stream: RefCell<Option<PwStream>>,
    pending_sync: RefCell<Option<(AsyncSeq, oneshot::Sender<()>)>>,
}

struct PwStream {
    stream: Stream,
    aborted: Arc<AtomicBool>,
    _listener: StreamListener<()>,
}

impl<S: Sample> PwThread<S> {
    pub fn new(handle: Handle<S>, nodes: Nodes) -> Result<PwThread<S>> {
        let main_loop = MainLoop::new(None)?;
        let context = Context::new(&main_loop)?;
        let core = context.connect(None)?;
        let registry = core.get_registry()?;

        Ok(PwThread {
            main_loop,
            core,
            registry,
            handle,
            nodes,
            state: Cell::new(Lifecycle::Closed),
            stream: RefCell::new(None),
            pending_sync: RefCell::new(None),
        })
    }

    /// Runs the main loop. `ready` fires once the initial registry contents have arrived.
    pub fn run(self, receiver: Receiver<Message<S>>, ready: oneshot::Sender<()>) {
        let self_rc = Rc::new(self);

        let clone = self_rc.clone();
        let clone1 = self_rc.clone();
        let _listener = self_rc
            .registry
            .add_listener_local()
            .global(move |obj| clone.on_object_added(obj))
            .global_remove(move |obj_id| clone1.on_object_removed(obj_id))
            .register();

        let clone = self_rc.clone();
        let _core_listener: CoreListener = self_rc
            .core
            .add_listener_local()
            .done(move |id, seq| clone.on_done(id, seq))
            .register();

        match self_rc.core.sync(0) {
            Ok(seq) => *self_rc.pending_sync.borrow_mut() = Some((seq, ready)),
            Err(e) => {
                tracing::warn!("registry sync failed: {e}");
                let _ = ready.send(());
            }
        }

        let main_loop = self_rc.main_loop.clone();
        let _receiver = receiver.attach(main_loop.loop_(), move |msg| self_rc.handle_message(msg));

        main_loop.run();
    }

    fn on_done(&self, id: u32, seq: AsyncSeq) {
        if id != PW_ID_CORE {
            return;
        }

        let mut pending = self.pending_sync.borrow_mut();
        if pending.as_ref().is_some_and(|(expected, _)| *expected == seq) {
            if let Some((_, ready)) = pending.take() {
                let _ = ready.send(());
            }
        }
    }

    fn on_object_added(&self, obj: &GlobalObject<&DictRef>) {
        if obj.type_ != ObjectType::Node {
            return;
        }

        let Some(props) = &obj.props else { return };
        let Some(class) = props.get(*MEDIA_CLASS) else {
            return;
        };

        let channels = props
            .get(*AUDIO_CHANNELS)
            .and_then(|v| v.parse().ok())
            .unwrap_or(MAX_CHANNELS);

        let (inputs, outputs) = match class {
            "Audio/Sink" => (0, channels),
            "Audio/Source" => (channels, 0),
            _ => return,
        };

        let name = props
            .get(*NODE_DESCRIPTION)
            .or_else(|| props.get(*NODE_NAME))
            .unwrap_or("unknown");

        let sample_rate = props
            .get(*AUDIO_RATE)
            .and_then(|v| v.parse().ok())
            .unwrap_or(48000.0);

        let latency = props
            .get(*NODE_LATENCY)
            .and_then(parse_latency)
            .unwrap_or(RealTime::ZERO);

        let Ok(mut nodes) = self.nodes.lock() else {
            return;
        };

        let info = DeviceInfo::new(name, nodes.len() as u32)
            .with_channels(inputs, outputs)
            .with_sample_rate(sample_rate)
            .with_input_latency(latency, latency)
            .with_output_latency(latency, latency);

        tracing::debug!(id = obj.id, class, "found {}", info.name);
        nodes.push(Node { id: obj.id, info });
    }

    fn on_object_removed(&self, obj_id: u32) {
        let Ok(mut nodes) = self.nodes.lock() else {
            return;
        };

        nodes.retain(|node| node.id != obj_id);
        for (i, node) in nodes.iter_mut().enumerate() {
            node.info.index = i as u32;
        }
    }

    fn handle_message(&self, message: Message<S>) {
        match message {
            Message::OpenStream {
                sender,
                params,
                target,
                dispatch,
            } => {
                let _ = sender.send(self.open_stream(params, target, dispatch));
            }
            Message::Transition { sender, transition } => {
                let _ = sender.send(self.transition(transition));
            }
            Message::PlaybackState { sender } => {
                let _ = sender.send(Ok(self.state.get().status()));
            }
            Message::CloseStream { sender } => {
                let _ = sender.send(self.close_stream());
            }
            Message::Abort => self.abort(),
            Message::Terminate => self.terminate(),
        }
    }

    fn open_stream(
        &self,
        params: StreamParams<S>,
        target: Option<u32>,
        dispatch: Arc<Dispatch<S>>,
    ) -> Result<()> {
        let mut state = self.state.get();
        state.open()?;

        let (direction, category, width) = if params.has_output() {
            (Direction::Output, "Playback", params.output_frame_width())
        } else {
            (Direction::Input, "Capture", params.input_frame_width())
        };

        let is_output = params.has_output();
        let sample_rate = params.sample_rate() as u32;
        let frame_count = params.frame_count();

        let props = properties! {
            *MEDIA_TYPE => "Audio",
            *MEDIA_ROLE => "Production",
            *MEDIA_CATEGORY => category,
            *AUDIO_CHANNELS => width.to_string().as_bytes(),
            *NODE_LATENCY => format!("{frame_count}/{sample_rate}").as_bytes(),
        };

        let stream = Stream::new(&self.core, "rtio", props)?;
        let aborted = Arc::new(AtomicBool::new(false));

        let listener = {
            let process_dispatch = dispatch.clone();
            let aborted = aborted.clone();
            let handle = self.handle.clone();
            let mut frames = 0u64;

            stream
                .add_local_listener::<()>()
                .state_changed(move |_, _, old, new| {
                    tracing::debug!("stream state: {old:?} -> {new:?}");
                    if let StreamState::Error(message) = new {
                        dispatch.report(&StreamError::system(message));
                    }
                })
                .process(move |stream, _| {
                    let Some(mut buffer) = stream.dequeue_buffer() else {
                        return;
                    };

                    let Some(data) = buffer.datas_mut().first_mut() else {
                        return;
                    };

                    let time = RealTime::from_frames(frames, params.sample_rate());
                    let is_aborted = aborted.load(Ordering::Relaxed);

                    let (flow, frames_done) = if is_output {
                        let Some(samples) = data.data().and_then(transmute_buffer::<S>) else {
                            return;
                        };

                        let len = samples.len().min(frame_count * width);
                        let samples = &mut samples[..len - len % width];

                        let flow = if is_aborted {
                            samples.fill(S::EQUILIBRIUM);
                            rtio_core::Flow::Continue
                        } else {
                            process_dispatch.process(&[], samples, time, &params)
                        };

                        let frames_done = samples.len() / width;
                        let chunk_size = size_of_val(samples) as u32;
                        let chunk = data.chunk_mut();
                        *chunk.offset_mut() = 0;
                        *chunk.size_mut() = chunk_size;
                        *chunk.stride_mut() = (width * size_of::<S>()) as i32;

                        (flow, frames_done)
                    } else {
                        let size = data.chunk().size() as usize;
                        let Some(bytes) = data.data() else {
                            return;
                        };

                        let size = size.min(bytes.len());
                        let Some(samples) = transmute_buffer::<S>(&mut bytes[..size]) else {
                            return;
                        };

                        let len = samples.len();
                        let samples = &samples[..len - len % width];

                        let flow = if is_aborted {
                            rtio_core::Flow::Continue
                        } else {
                            process_dispatch.process(samples, &mut [], time, &params)
                        };

                        (flow, samples.len() / width)
                    };

                    frames += frames_done as u64;

                    if flow.is_abort() && !is_aborted {
                        aborted.store(true, Ordering::Relaxed);
                        let _ = handle.send(Message::Abort);
                    }
                })
                .register()?
        };

        let format = audio_format(S::FORMAT).ok_or(Error::UnsupportedFormat(S::FORMAT))?;
        let audio_info = serialize_audio_info(format, sample_rate, width)?;
        let Some(pod) = Pod::from_bytes(&audio_info) else {
            return Err(StreamError::system("malformed format pod").into());
        };

        stream.connect(
            direction,
            target,
            StreamFlags::AUTOCONNECT
                | StreamFlags::MAP_BUFFERS
                | StreamFlags::RT_PROCESS
                | StreamFlags::INACTIVE,
            &mut [pod],
        )?;

        *self.stream.borrow_mut() = Some(PwStream {
            stream,
            aborted,
            _listener: listener,
        });
        self.state.set(state);

        Ok(())
    }

    fn transition(&self, transition: Transition) -> Result<()> {
        let stream = self.stream.borrow();
        let stream = stream.as_ref().ok_or(Error::NoStream)?;

        let mut state = self.state.get();
        match transition {
            Transition::Start => {
                state.start()?;
                stream.aborted.store(false, Ordering::Relaxed);
                stream.stream.set_active(true)?;
            }
            Transition::Pause => {
                state.pause()?;
                stream.stream.set_active(false)?;
            }
            Transition::Stop => {
                state.stop()?;
                stream.stream.set_active(false)?;
            }
        }

        self.state.set(state);
        Ok(())
    }

    fn abort(&self) {
        if self.state.get().is_running() {
            if let Err(e) = self.transition(Transition::Stop) {
                tracing::warn!("failed to stop aborted stream: {e}");
            }
        }
    }

    fn close_stream(&self) -> Result<()> {
        let mut state = self.state.get();
        if state.close() == Lifecycle::Closed {
            return Ok(());
        }

        self.state.set(state);
        if let Some(stream) = self.stream.borrow_mut().take() {
            if let Err(e) = stream.stream.set_active(false) {
                tracing::warn!("failed to deactivate closing stream: {e}");
            }
        }

        Ok(())
    }

    fn terminate(&self) {
        self.stream.borrow_mut().take();
        self.main_loop.quit();
    }
}

fn parse_latency(value: &str) -> Option<RealTime> {
    let (frames, rate) = value.split_once('/')?;
    let frames = frames.trim().parse().ok()?;
    let rate: f64 = rate.trim().parse().ok()?;
    (rate > 0.0).then(|| RealTime::from_frames(frames, rate))
}

pub fn audio_format(format: SampleFormat) -> Option<AudioFormat> {
    Some(match format {
        SampleFormat::F32 => AudioFormat::F32LE,
        SampleFormat::F64 => AudioFormat::F64LE,
        SampleFormat::U8 => AudioFormat::U8,
        SampleFormat::I8 => AudioFormat::S8,
        SampleFormat::I16 => AudioFormat::S16LE,
        SampleFormat::I24 => AudioFormat::S24LE,
        SampleFormat::I32 => AudioFormat::S32LE,
        SampleFormat::I64 => return None,
    })
}

fn serialize_audio_info(format: AudioFormat, sample_rate: u32, channels: usize) -> Result<Vec<u8>> {
    if channels > MAX_CHANNELS {
        return Err(Error::TooManyChannels);
    }

    let mut audio_info = AudioInfoRaw::new();
    audio_info.set_format(format);
    audio_info.set_rate(sample_rate);
    audio_info.set_channels(channels as u32);

    let mut position = [0; MAX_CHANNELS];
    match channels {
        1 => position[0] = SPA_AUDIO_CHANNEL_MONO,
        2 => {
            position[0] = SPA_AUDIO_CHANNEL_FL;
            position[1] = SPA_AUDIO_CHANNEL_FR;
        }
        _ => {
            for (i, pos) in position.iter_mut().take(channels).enumerate() {
                *pos = SPA_AUDIO_CHANNEL_START_Aux + i as u32;
            }
        }
    }

    audio_info.set_position(position);

    let values = PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &Value::Object(Object {
            type_: SPA_TYPE_OBJECT_Format,
            id: SPA_PARAM_EnumFormat,
            properties: audio_info.into(),
        }),
    )?;

    Ok(values.0.into_inner())
}

/// Reinterprets a mapped buffer as samples, dropping a trailing partial sample.
fn transmute_buffer<S: Sample>(data: &mut [u8]) -> Option<&mut [S]> {
    let len = data.len() / size_of::<S>();
    let ptr = data.as_mut_ptr() as *mut S;
    if !ptr.is_aligned() {
        return None;
    }

    // Every bit pattern is a valid sample.
    Some(unsafe { slice::from_raw_parts_mut(ptr, len) })
}
