//! Scoring of user hits against the beat grid.
//!
//! The score is triangular: 1.0 on a beat boundary, 0.0 exactly halfway
//! between two beats, linear in between.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scores `hit_time` against a grid of beats of `beat_duration` seconds
/// anchored at `anchor`.
pub fn score(hit_time: f64, anchor: f64, beat_duration: f64) -> f64 {
    if beat_duration <= 0.0 || !hit_time.is_finite() {
        return 0.0;
    }

    let position = (hit_time - anchor) / beat_duration;
    // Round half up, including for hits before the anchor.
    let nearest = (position + 0.5).floor();
    let distance = (position - nearest).abs();
    (1.0 - 2.0 * distance).clamp(0.0, 1.0)
}

/// Presentation band for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitRating {
    Perfect,
    Good,
    Ok,
    Poor,
}

impl HitRating {
    pub fn label(self) -> &'static str {
        match self {
            Self::Perfect => "perfect",
            Self::Good => "good",
            Self::Ok => "ok",
            Self::Poor => "poor",
        }
    }
}

impl fmt::Display for HitRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lower bounds (exclusive) of each rating band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyBands {
    pub perfect: f64,
    pub good: f64,
    pub ok: f64,
}

impl Default for AccuracyBands {
    fn default() -> Self {
        Self {
            perfect: 0.9,
            good: 0.7,
            ok: 0.5,
        }
    }
}

impl AccuracyBands {
    pub fn classify(&self, score: f64) -> HitRating {
        if score > self.perfect {
            HitRating::Perfect
        } else if score > self.good {
            HitRating::Good
        } else if score > self.ok {
            HitRating::Ok
        } else {
            HitRating::Poor
        }
    }
}

/// A scored hit, ready to be handed to the visualisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitReport {
    pub hit_time: f64,
    pub score: f64,
    pub rating: HitRating,
}
