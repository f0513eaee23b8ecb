use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{AccuracyBands, MetronomeError, Result, Tempo, TimeSignature};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub metronome: MetronomeConfig,
    pub visual: VisualConfig,
    pub accuracy: AccuracyBands,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.metronome.validate()?;
        self.visual.validate()
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub bpm: Tempo,
    pub time_signature: TimeSignature,
    /// How far ahead of the clock beats are generated, in seconds.
    pub schedule_ahead: f64,
    /// Interval between scheduling passes, in seconds.
    pub pass_interval: f64,
    /// Upper bound on armed ticks.
    pub max_pending: usize,
    pub delay_first_beat: bool,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            bpm: Tempo::default(),
            time_signature: TimeSignature::default(),
            schedule_ahead: 0.1,
            pass_interval: 0.025,
            max_pending: 20,
            delay_first_beat: true,
        }
    }
}

impl MetronomeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.pass_interval > 0.0) {
            return Err(MetronomeError::invalid("pass_interval must be positive"));
        }
        if !(self.schedule_ahead >= self.pass_interval) {
            return Err(MetronomeError::invalid(
                "schedule_ahead must cover at least one pass_interval",
            ));
        }
        if self.max_pending == 0 {
            return Err(MetronomeError::invalid("max_pending must be at least 1"));
        }
        Ok(())
    }
}

/// Drawing surface and marker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub enabled: bool,
    /// Width of the beat track in pixels.
    pub track_width: f64,
    /// Distance of the hit line from the left edge, in pixels.
    pub hit_line_offset: f64,
    pub frame_rate: f64,
    /// Hit marker drift in pixels per frame.
    pub hit_marker_speed: f64,
    /// Hit marker opacity lost per frame.
    pub hit_marker_fade: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            track_width: 800.0,
            hit_line_offset: 100.0,
            frame_rate: 60.0,
            hit_marker_speed: 2.0,
            hit_marker_fade: 0.02,
        }
    }
}

impl VisualConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate > 0.0) {
            return Err(MetronomeError::invalid("frame_rate must be positive"));
        }
        if !(self.hit_line_offset >= 0.0 && self.hit_line_offset < self.track_width) {
            return Err(MetronomeError::invalid(
                "hit_line_offset must lie inside the track",
            ));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> f64 {
        1.0 / self.frame_rate
    }
}
