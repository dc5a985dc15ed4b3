use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rtio::backend::{OfflineBackend, OfflineHandle};
use rtio::{
    silence, AudioProcess, AudioStream, BufferGroup, Callback, Error, Lifecycle, RealTime,
    StreamContext, StreamError, StreamParams, StreamResult, StreamStatus,
};

const SAMPLE_RATE: f32 = 44100.0;
const FREQUENCY: f32 = 440.0;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn offline<S: rtio::Sample>() -> (Arc<StreamContext<S>>, OfflineHandle<S>) {
    init_tracing();
    let backend = OfflineBackend::new();
    let handle = backend.handle();
    (Arc::new(StreamContext::with_backend(Box::new(backend))), handle)
}

fn stereo_params() -> StreamParams<f32> {
    StreamParams::new(SAMPLE_RATE as f64, 512, 0, 2).unwrap()
}

fn quiet() -> rtio::ErrorCallback {
    Box::new(|_| {})
}

/// Phase sequence a 440 Hz generator produces, starting at `phase`.
fn expected_sine(phase: &mut f32, frames: usize) -> Vec<f32> {
    let step = TAU * FREQUENCY / SAMPLE_RATE;
    let mut out = Vec::with_capacity(frames * 2);
    for _ in 0..frames {
        out.extend([phase.sin(); 2]);
        *phase += step;
        if *phase >= TAU {
            *phase -= TAU;
        }
    }
    out
}

fn sine() -> Callback<f32> {
    let step = TAU * FREQUENCY / SAMPLE_RATE;
    let mut phase = 0.0f32;
    Box::new(move |buffers, _, _| {
        for frame in buffers.output.frames_mut() {
            frame.fill(phase.sin());
            phase += step;
            if phase >= TAU {
                phase -= TAU;
            }
        }
        Ok(())
    })
}

#[test]
fn sine_period() {
    let (ctx, handle) = offline();
    let stream = AudioStream::with_context(stereo_params(), ctx, sine(), quiet()).unwrap();
    stream.start().unwrap();

    let mut phase = 0.0;
    handle.process_period().unwrap();
    assert_eq!(handle.output().unwrap(), expected_sine(&mut phase, 512));

    handle.process_period().unwrap();
    assert_eq!(handle.output().unwrap(), expected_sine(&mut phase, 512));
    assert!(phase < TAU);
}

#[test]
fn swap_to_silence_and_back() {
    let (ctx, handle) = offline();
    let stream = AudioStream::with_context(stereo_params(), ctx, sine(), quiet()).unwrap();
    stream.start().unwrap();

    let mut phase = 0.0;
    handle.process_period().unwrap();
    assert_eq!(handle.output().unwrap(), expected_sine(&mut phase, 512));

    let generator = stream.exchange_callback(silence()).unwrap().unwrap();
    handle.process_period().unwrap();
    assert!(handle.output().unwrap().iter().all(|&s| s == 0.0));

    stream.exchange_callback(generator).unwrap();
    handle.process_period().unwrap();
    assert_eq!(handle.output().unwrap(), expected_sine(&mut phase, 512));
}

#[test]
fn exchange_is_atomic() {
    let (ctx, handle) = offline::<i32>();
    let params = StreamParams::new(48000.0, 64, 0, 2).unwrap();

    fn constant(id: i32) -> Callback<i32> {
        Box::new(move |buffers, _, _| {
            for frame in buffers.output.frames_mut() {
                frame[0] = id;
                thread::yield_now();
                frame[1] = -id;
            }
            Ok(())
        })
    }

    let stream = AudioStream::with_context(params, ctx, constant(0), quiet()).unwrap();
    stream.start().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = done.clone();
        thread::spawn(move || {
            let mut last = 0;
            while !done.load(Ordering::Acquire) {
                handle.process_period().unwrap();
                let output = handle.output().unwrap();
                let id = output[0];
                for frame in output.chunks_exact(2) {
                    assert_eq!(frame, [id, -id], "mixed callbacks within one period");
                }
                assert!(id >= last);
                last = id;
            }
            last
        })
    };

    for id in 1..=200 {
        let previous = stream.exchange_callback(constant(id));
        assert!(matches!(previous, Ok(Some(_))));
    }

    done.store(true, Ordering::Release);
    let last = reader.join().unwrap();
    assert!(last <= 200);
}

#[test]
fn exchange_timeout_keeps_callback() {
    let (ctx, handle) = offline::<f32>();
    let params = StreamParams::new(44100.0, 16, 0, 1).unwrap();

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let callback: Callback<f32> = Box::new(move |buffers, _, _| {
        let _ = entered_tx.send(());
        let _ = release_rx.recv();
        buffers.output.fill(0.25);
        Ok(())
    });

    let stream = AudioStream::with_context(params, ctx, callback, quiet()).unwrap();
    stream.start().unwrap();

    let driver = {
        let handle = handle.clone();
        thread::spawn(move || handle.process_period().unwrap())
    };
    entered_rx.recv().unwrap();

    let Err(rejected) = stream.exchange_callback_timeout(silence(), Duration::from_millis(50))
    else {
        panic!("exchange succeeded while the callback was running");
    };
    assert_eq!(Error::from(rejected), Error::LockTimeout);

    release_tx.send(()).unwrap();
    driver.join().unwrap();
    assert_eq!(handle.output().unwrap(), [0.25; 16]);

    let driver = {
        let handle = handle.clone();
        thread::spawn(move || handle.process_period().unwrap())
    };
    entered_rx.recv().unwrap();
    release_tx.send(()).unwrap();
    driver.join().unwrap();
    assert_eq!(handle.output().unwrap(), [0.25; 16]);
}

#[test]
fn unsupported_config_opens_nothing() {
    let (ctx, handle) = offline::<f32>();
    let params = StreamParams::new(44100.0, 512, 0, 32).unwrap();

    let res = AudioStream::with_context(params, ctx.clone(), sine(), quiet());
    assert!(matches!(res, Err(Error::Stream(_))));
    assert!(handle.process_period().is_err());
    assert_eq!(handle.lifecycle(), Ok(Lifecycle::Closed));

    let ok = AudioStream::with_context(stereo_params(), ctx, sine(), quiet()).unwrap();
    assert_eq!(ok.playback_state(), Ok(StreamStatus::Stopped));
    drop(ok);
    assert_eq!(handle.lifecycle(), Ok(Lifecycle::Closed));
}

#[test]
fn callback_error_reaches_error_callback() {
    let (ctx, handle) = offline::<f32>();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();

    let stream = AudioStream::builder(stereo_params())
        .context(ctx)
        .callback(Box::new(|_, _, _| Err(StreamError::user("refused"))))
        .error_callback(Box::new(move |e| sink.lock().unwrap().push(e.clone())))
        .build()
        .unwrap();
    stream.start().unwrap();

    handle.process_period().unwrap();
    assert_eq!(stream.playback_state(), Ok(StreamStatus::Stopped));
    assert_eq!(*errors.lock().unwrap(), [StreamError::user("refused")]);
}

struct Sine {
    phase: f32,
    errors: usize,
}

impl AudioProcess<f32> for Sine {
    fn on_process(
        &mut self,
        buffers: &mut BufferGroup<'_, f32>,
        _time: RealTime,
        _params: &StreamParams<f32>,
    ) -> StreamResult {
        let step = TAU * FREQUENCY / SAMPLE_RATE;
        for frame in buffers.output.frames_mut() {
            frame.fill(self.phase.sin());
            self.phase = (self.phase + step) % TAU;
        }
        Ok(())
    }

    fn on_error(&mut self, _error: &StreamError) {
        self.errors += 1;
    }
}

#[test]
fn audio_process_drives_stream() {
    let (ctx, handle) = offline::<f32>();
    let process = Arc::new(Mutex::new(Sine {
        phase: 0.0,
        errors: 0,
    }));

    let stream = AudioStream::from_process(stereo_params(), ctx, process.clone()).unwrap();
    stream.start().unwrap();
    handle.process_period().unwrap();

    let output = handle.output().unwrap();
    assert_eq!(output[0], 0.0);
    assert!(output.iter().any(|&s| s > 0.5));
    assert!(process.lock().unwrap().phase > 0.0);

    stream.context().dispatch().report(&StreamError::xrun("late"));
    assert_eq!(process.lock().unwrap().errors, 1);
}
