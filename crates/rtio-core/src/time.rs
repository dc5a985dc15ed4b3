use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const NANOS_IN_SEC: i64 = 1_000_000_000;

/// Signed nanosecond time value, used both for stream timestamps and latencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RealTime {
    nanos: i64,
}

impl RealTime {
    pub const ZERO: RealTime = RealTime::from_nanos(0);
    pub const MIN: RealTime = RealTime::from_nanos(i64::MIN);
    pub const MAX: RealTime = RealTime::from_nanos(i64::MAX);

    pub const fn from_nanos(nanos: i64) -> RealTime {
        RealTime { nanos }
    }

    pub fn from_secs(secs: i64) -> RealTime {
        RealTime::from_nanos(secs * NANOS_IN_SEC)
    }

    pub fn from_secs_f64(secs: f64) -> RealTime {
        RealTime::from_nanos((secs * (NANOS_IN_SEC as f64)) as i64)
    }

    /// Position of frame number `frames` in a stream running at `sample_rate`.
    pub fn from_frames(frames: u64, sample_rate: f64) -> RealTime {
        if sample_rate.fract() == 0.0 && sample_rate >= 1.0 {
            // integer rates are exact, no float drift over long streams
            let rate = sample_rate as u64;
            let secs = (frames / rate) as i64;
            let rest = (frames % rate) as i64;
            RealTime::from_nanos(secs * NANOS_IN_SEC + rest * NANOS_IN_SEC / rate as i64)
        } else {
            RealTime::from_secs_f64(frames as f64 / sample_rate)
        }
    }

    pub fn as_nanos(self) -> i64 {
        self.nanos
    }

    pub fn as_secs(self) -> i64 {
        self.nanos / NANOS_IN_SEC
    }

    pub fn as_secs_f64(self) -> f64 {
        (self.nanos as f64) / (NANOS_IN_SEC as f64)
    }

    /// Converts to a [`Duration`], clamping negative values to zero.
    pub fn to_duration(self) -> Duration {
        Duration::from_nanos(self.nanos.max(0) as u64)
    }

    pub fn approx_eq(self, other: RealTime, eps: RealTime) -> bool {
        let diff = if self.nanos > other.nanos {
            self.nanos - other.nanos
        } else {
            other.nanos - self.nanos
        };

        diff <= eps.nanos.abs()
    }
}

impl From<Duration> for RealTime {
    fn from(duration: Duration) -> RealTime {
        RealTime::from_nanos(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for RealTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs_f64())
    }
}

impl Add<RealTime> for RealTime {
    type Output = RealTime;

    fn add(self, rhs: RealTime) -> RealTime {
        RealTime {
            nanos: self.nanos + rhs.nanos,
        }
    }
}

impl Sub<RealTime> for RealTime {
    type Output = RealTime;

    fn sub(self, rhs: RealTime) -> RealTime {
        RealTime {
            nanos: self.nanos - rhs.nanos,
        }
    }
}
