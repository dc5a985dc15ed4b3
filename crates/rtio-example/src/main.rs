use std::sync::Arc;
use std::time::Duration;

use rtio::{silence, AudioStream, BackendKind, Callback, StreamContext, StreamParams};
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: f64 = 48000.0;
const BUFFER_SIZE: usize = 128;

fn saw(freq: f32) -> Callback<f32> {
    let mut time = 0.0f32;
    Box::new(move |buffers, _, params| {
        for frame in buffers.output.frames_mut() {
            let x = time / params.sample_rate() as f32 * freq;
            frame.fill((x - (0.5 + x).floor()) * 0.5);
            time += 1.0;
        }
        Ok(())
    })
}

fn main() -> rtio::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let kind = BackendKind::from_env()?;
    let context = Arc::new(StreamContext::<f32>::from_kind(kind)?);
    println!("{}", context.backend_info()?);

    for device in context.device_info_list()? {
        println!("{device}");
    }

    let params = StreamParams::new(SAMPLE_RATE, BUFFER_SIZE, 0, 2)?;
    let stream = AudioStream::builder(params)
        .context(context)
        .callback(saw(110.0))
        .build()?;

    stream.start()?;
    std::thread::sleep(Duration::from_secs(2));

    let generator = stream.exchange_callback(silence())?;
    std::thread::sleep(Duration::from_secs(1));

    if let Some(generator) = generator {
        stream.exchange_callback(generator)?;
    }
    std::thread::sleep(Duration::from_secs(2));

    stream.stop()?;
    Ok(())
}
