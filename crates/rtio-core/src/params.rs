use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::device::DeviceIndex;
use crate::error::ParamsError;
use crate::sample::Sample;
use crate::time::RealTime;

/// Settings of one audio stream.
///
/// A frame width of zero disables that direction. A device of `None` selects the system default.
/// Derived quantities are computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStreamParams", into = "RawStreamParams", bound = "")]
pub struct StreamParams<S: Sample> {
    sample_rate: f64,
    frame_count: usize,
    input_frame_width: usize,
    output_frame_width: usize,
    input_device: Option<DeviceIndex>,
    output_device: Option<DeviceIndex>,
    marker: PhantomData<S>,
}

impl<S: Sample> StreamParams<S> {
    pub fn new(
        sample_rate: f64,
        frame_count: usize,
        input_frame_width: usize,
        output_frame_width: usize,
    ) -> Result<StreamParams<S>, ParamsError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(ParamsError::InvalidSampleRate(sample_rate));
        }

        if frame_count == 0 && (input_frame_width > 0 || output_frame_width > 0) {
            return Err(ParamsError::ZeroFrameCount);
        }

        Ok(StreamParams {
            sample_rate,
            frame_count,
            input_frame_width,
            output_frame_width,
            input_device: None,
            output_device: None,
            marker: PhantomData,
        })
    }

    /// Uses the same channel count for input and output.
    pub fn symmetric(
        sample_rate: f64,
        frame_count: usize,
        frame_width: usize,
    ) -> Result<StreamParams<S>, ParamsError> {
        StreamParams::new(sample_rate, frame_count, frame_width, frame_width)
    }

    pub fn with_devices(
        self,
        input_device: Option<DeviceIndex>,
        output_device: Option<DeviceIndex>,
    ) -> StreamParams<S> {
        StreamParams {
            input_device,
            output_device,
            ..self
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of frames in one callback period.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn input_frame_width(&self) -> usize {
        self.input_frame_width
    }

    pub fn output_frame_width(&self) -> usize {
        self.output_frame_width
    }

    pub fn input_device(&self) -> Option<DeviceIndex> {
        self.input_device
    }

    pub fn output_device(&self) -> Option<DeviceIndex> {
        self.output_device
    }

    pub fn has_input(&self) -> bool {
        self.input_frame_width > 0
    }

    pub fn has_output(&self) -> bool {
        self.output_frame_width > 0
    }

    pub fn is_duplex(&self) -> bool {
        self.has_input() && self.has_output()
    }

    pub fn input_sample_count(&self) -> usize {
        self.input_frame_width * self.frame_count
    }

    pub fn output_sample_count(&self) -> usize {
        self.output_frame_width * self.frame_count
    }

    pub fn input_byte_rate(&self) -> f64 {
        self.sample_rate * self.input_sample_count() as f64 * size_of::<S>() as f64
    }

    pub fn input_bit_rate(&self) -> f64 {
        self.input_byte_rate() * 8.0
    }

    pub fn output_byte_rate(&self) -> f64 {
        self.sample_rate * self.output_sample_count() as f64 * size_of::<S>() as f64
    }

    pub fn output_bit_rate(&self) -> f64 {
        self.output_byte_rate() * 8.0
    }

    /// Duration of one callback period.
    pub fn period(&self) -> RealTime {
        RealTime::from_secs_f64(self.frame_count as f64 / self.sample_rate)
    }
}

impl<S: Sample> Default for StreamParams<S> {
    fn default() -> StreamParams<S> {
        StreamParams {
            sample_rate: 44100.0,
            frame_count: 512,
            input_frame_width: 2,
            output_frame_width: 2,
            input_device: None,
            output_device: None,
            marker: PhantomData,
        }
    }
}

impl<S: Sample> fmt::Display for StreamParams<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn device(f: &mut fmt::Formatter<'_>, id: Option<DeviceIndex>) -> fmt::Result {
            match id {
                Some(id) => writeln!(f, "{id}"),
                None => writeln!(f, "default"),
            }
        }

        writeln!(f, "Sample Format: {}", S::FORMAT)?;
        writeln!(f, "Input Frame Width: {}", self.input_frame_width)?;
        writeln!(f, "Output Frame Width: {}", self.output_frame_width)?;
        writeln!(f, "Frame Count: {}", self.frame_count)?;
        writeln!(f, "Sample Rate: {}", self.sample_rate)?;
        write!(f, "Input Device ID: ")?;
        device(f, self.input_device)?;
        write!(f, "Output Device ID: ")?;
        device(f, self.output_device)
    }
}

/// Serialized form of [`StreamParams`], validated when converted back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawStreamParams {
    pub sample_rate: f64,
    pub frame_count: usize,
    #[serde(default)]
    pub input_frame_width: usize,
    #[serde(default)]
    pub output_frame_width: usize,
    #[serde(default)]
    pub input_device: Option<DeviceIndex>,
    #[serde(default)]
    pub output_device: Option<DeviceIndex>,
}

impl<S: Sample> TryFrom<RawStreamParams> for StreamParams<S> {
    type Error = ParamsError;

    fn try_from(raw: RawStreamParams) -> Result<StreamParams<S>, ParamsError> {
        let params = StreamParams::new(
            raw.sample_rate,
            raw.frame_count,
            raw.input_frame_width,
            raw.output_frame_width,
        )?;
        Ok(params.with_devices(raw.input_device, raw.output_device))
    }
}

impl<S: Sample> From<StreamParams<S>> for RawStreamParams {
    fn from(params: StreamParams<S>) -> RawStreamParams {
        RawStreamParams {
            sample_rate: params.sample_rate,
            frame_count: params.frame_count,
            input_frame_width: params.input_frame_width,
            output_frame_width: params.output_frame_width,
            input_device: params.input_device,
            output_device: params.output_device,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::I24;

    #[test]
    fn derived_counts() {
        let params = StreamParams::<f32>::new(44100.0, 512, 1, 2).unwrap();
        assert_eq!(params.input_sample_count(), 512);
        assert_eq!(params.output_sample_count(), 1024);
        assert_eq!(params.input_byte_rate(), 44100.0 * 512.0 * 4.0);
        assert_eq!(params.output_byte_rate(), 44100.0 * 1024.0 * 4.0);
        assert_eq!(params.output_bit_rate(), params.output_byte_rate() * 8.0);
        assert!(params.is_duplex());
    }

    #[test]
    fn byte_rate_follows_sample_size() {
        let params = StreamParams::<I24>::new(48000.0, 256, 0, 2).unwrap();
        assert_eq!(params.output_byte_rate(), 48000.0 * 512.0 * 3.0);
        assert_eq!(params.input_byte_rate(), 0.0);
        assert!(!params.has_input());
    }

    #[test]
    fn derived_counts_hold_for_many_configs() {
        for rate in [8000.0, 22050.0, 44100.0, 96000.0] {
            for frames in [1, 64, 512, 4096] {
                for in_w in 0..4 {
                    for out_w in 0..4 {
                        let p = StreamParams::<i16>::new(rate, frames, in_w, out_w).unwrap();
                        assert_eq!(p.input_sample_count(), in_w * frames);
                        assert_eq!(p.output_sample_count(), out_w * frames);
                        assert_eq!(p.input_byte_rate(), rate * (in_w * frames) as f64 * 2.0);
                    }
                }
            }
        }
    }

    #[test]
    fn rejects_invalid() {
        assert_eq!(
            StreamParams::<f32>::new(0.0, 512, 0, 2),
            Err(ParamsError::InvalidSampleRate(0.0))
        );
        assert!(StreamParams::<f32>::new(f64::NAN, 512, 0, 2).is_err());
        assert_eq!(
            StreamParams::<f32>::new(44100.0, 0, 0, 2),
            Err(ParamsError::ZeroFrameCount)
        );
        assert!(StreamParams::<f32>::new(44100.0, 0, 0, 0).is_ok());
    }

    #[test]
    fn serde_validates() {
        let json =
            r#"{"sample_rate":48000.0,"frame_count":128,"output_frame_width":2,"output_device":3}"#;
        let params: StreamParams<f32> = serde_json::from_str(json).unwrap();
        assert_eq!(params.sample_rate(), 48000.0);
        assert_eq!(params.output_device(), Some(3));
        assert_eq!(params.input_device(), None);
        assert_eq!(params.input_frame_width(), 0);

        let bad = r#"{"sample_rate":-1.0,"frame_count":128}"#;
        assert!(serde_json::from_str::<StreamParams<f32>>(bad).is_err());

        let back: StreamParams<f32> =
            serde_json::from_str(&serde_json::to_string(&params).unwrap()).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn display() {
        let text = StreamParams::<f32>::default().to_string();
        assert!(text.contains("Sample Rate: 44100"));
        assert!(text.contains("Output Device ID: default"));
    }
}
