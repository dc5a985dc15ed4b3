use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::RealTime;

/// Backend-specific device number.
pub type DeviceIndex = u32;

/// Snapshot of one device, as reported by the backend at query time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub index: DeviceIndex,
    pub max_input_channels: usize,
    pub max_output_channels: usize,
    pub default_sample_rate: f64,
    pub default_low_input_latency: RealTime,
    pub default_high_input_latency: RealTime,
    pub default_low_output_latency: RealTime,
    pub default_high_output_latency: RealTime,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, index: DeviceIndex) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            index,
            ..DeviceInfo::default()
        }
    }

    pub fn with_channels(
        self,
        max_input_channels: usize,
        max_output_channels: usize,
    ) -> DeviceInfo {
        DeviceInfo {
            max_input_channels,
            max_output_channels,
            ..self
        }
    }

    pub fn with_sample_rate(self, default_sample_rate: f64) -> DeviceInfo {
        DeviceInfo {
            default_sample_rate,
            ..self
        }
    }

    pub fn with_input_latency(self, low: RealTime, high: RealTime) -> DeviceInfo {
        DeviceInfo {
            default_low_input_latency: low,
            default_high_input_latency: high,
            ..self
        }
    }

    pub fn with_output_latency(self, low: RealTime, high: RealTime) -> DeviceInfo {
        DeviceInfo {
            default_low_output_latency: low,
            default_high_output_latency: high,
            ..self
        }
    }

    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }

    pub fn is_output(&self) -> bool {
        self.max_output_channels > 0
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device: {}, id: {}", self.name, self.index)?;
        writeln!(f, "\tMax Input Count: {}", self.max_input_channels)?;
        writeln!(f, "\tMax Output Count: {}", self.max_output_channels)?;
        writeln!(f, "\tDefault Sample Rate: {}", self.default_sample_rate)?;
        writeln!(
            f,
            "\tDefault Input Latency Range:  <{}, {}>",
            self.default_low_input_latency, self.default_high_input_latency
        )?;
        write!(
            f,
            "\tDefault Output Latency Range: <{}, {}>",
            self.default_low_output_latency, self.default_high_output_latency
        )
    }
}
