use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{MetronomeError, Result};

/// Tempo in beats per minute, always within [`Tempo::MIN_BPM`, `Tempo::MAX_BPM`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(into = "f64")]
pub struct Tempo(f64);

impl Tempo {
    pub const MIN_BPM: f64 = 30.0;
    pub const MAX_BPM: f64 = 300.0;

    /// Builds a tempo, silently clamping finite values into the supported
    /// range. Only NaN and infinities are rejected.
    pub fn new(bpm: f64) -> Result<Self> {
        if !bpm.is_finite() {
            return Err(MetronomeError::invalid(format!(
                "tempo must be a finite number of beats per minute, got {bpm}"
            )));
        }
        Ok(Self(bpm.clamp(Self::MIN_BPM, Self::MAX_BPM)))
    }

    pub fn bpm(self) -> f64 {
        self.0
    }

    pub fn seconds_per_beat(self) -> f64 {
        60.0 / self.0
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(120.0)
    }
}

impl From<Tempo> for f64 {
    fn from(value: Tempo) -> Self {
        value.0
    }
}

impl TryFrom<f64> for Tempo {
    type Error = MetronomeError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Tempo {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bpm = f64::deserialize(deserializer)?;
        Self::new(bpm).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bpm", self.0)
    }
}

/// Beats per measure. Only the meters the keyboard offers are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TimeSignature(u32);

impl TimeSignature {
    pub const SUPPORTED: [u32; 4] = [2, 3, 4, 6];

    pub fn new(beats: u32) -> Result<Self> {
        if Self::SUPPORTED.contains(&beats) {
            Ok(Self(beats))
        } else {
            Err(MetronomeError::invalid(format!(
                "unsupported time signature {beats}, expected one of {:?}",
                Self::SUPPORTED
            )))
        }
    }

    pub fn beats(self) -> u32 {
        self.0
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self(4)
    }
}

impl TryFrom<u32> for TimeSignature {
    type Error = MetronomeError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TimeSignature> for u32 {
    fn from(value: TimeSignature) -> Self {
        value.0
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/4", self.0)
    }
}

/// A single beat produced by the scheduler.
///
/// Beats are transient: they are generated, dispatched and then dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    /// 1-based position within the measure.
    pub number: u32,
    pub is_downbeat: bool,
    /// Clock time at which the beat should sound.
    pub target_time: f64,
    /// Clock time at which the beat was announced.
    pub scheduled_at: f64,
}

impl Beat {
    pub fn new(index: u32, target_time: f64, scheduled_at: f64) -> Self {
        Self {
            number: index + 1,
            is_downbeat: index == 0,
            target_time,
            scheduled_at,
        }
    }

    /// Seconds between announcement and the audible tick.
    pub fn lead_time(&self) -> f64 {
        self.target_time - self.scheduled_at
    }
}
