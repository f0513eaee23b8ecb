//! Click synthesis for audible ticks.

use std::f32::consts::PI;

use crate::{dispatch::BeatListener, Beat};

const CLICK_DURATION_SECONDS: f32 = 0.03;
const ACCENT_FREQUENCY: f32 = 1_000.0;
const REGULAR_FREQUENCY: f32 = 800.0;
const ACCENT_GAIN: f32 = 0.8;
const REGULAR_GAIN: f32 = 0.5;

/// Pre-rendered percussive clicks, one for downbeats and one for the rest.
#[derive(Debug, Clone)]
pub struct ClickSynth {
    sample_rate: u32,
    accent: Vec<f32>,
    regular: Vec<f32>,
}

impl ClickSynth {
    pub fn new() -> Self {
        Self::with_sample_rate(48_000)
    }

    pub fn with_sample_rate(sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        Self {
            sample_rate,
            accent: render_click(sample_rate, ACCENT_FREQUENCY, ACCENT_GAIN),
            regular: render_click(sample_rate, REGULAR_FREQUENCY, REGULAR_GAIN),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Downbeats get the louder, higher-pitched click.
    pub fn click(&self, is_downbeat: bool) -> &[f32] {
        if is_downbeat {
            &self.accent
        } else {
            &self.regular
        }
    }
}

impl Default for ClickSynth {
    fn default() -> Self {
        Self::new()
    }
}

fn render_click(sample_rate: u32, frequency: f32, gain: f32) -> Vec<f32> {
    let len = (CLICK_DURATION_SECONDS * sample_rate as f32).round() as usize;
    let step = 2.0 * PI * frequency / sample_rate as f32;
    (0..len)
        .map(|index| {
            let t = index as f32 / len as f32;
            let envelope = (-t * 10.0).exp();
            (index as f32 * step).sin() * envelope * gain
        })
        .collect()
}

/// Tick consumer that mixes clicks into an offline mono buffer at the sample
/// matching each beat's target time.
#[derive(Debug, Clone)]
pub struct ClickTrack {
    synth: ClickSynth,
    buffer: Vec<f32>,
    origin: f64,
    clicks: usize,
}

impl ClickTrack {
    /// `origin` is the clock time that maps to sample 0.
    pub fn new(synth: ClickSynth, origin: f64) -> Self {
        Self {
            synth,
            buffer: Vec::new(),
            origin,
            clicks: 0,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.buffer
    }

    pub fn clicks(&self) -> usize {
        self.clicks
    }

    pub fn duration_seconds(&self) -> f64 {
        self.buffer.len() as f64 / self.synth.sample_rate() as f64
    }

    pub fn peak(&self) -> f32 {
        self.buffer
            .iter()
            .fold(0.0_f32, |peak, sample| peak.max(sample.abs()))
    }

    fn mix(&mut self, beat: &Beat) {
        let offset = beat.target_time - self.origin;
        if offset < 0.0 {
            return;
        }

        let start = (offset * self.synth.sample_rate() as f64).round() as usize;
        let click = self.synth.click(beat.is_downbeat);
        let end = start + click.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0.0);
        }
        for (out, sample) in self.buffer[start..end].iter_mut().zip(click) {
            *out += sample;
        }
        self.clicks += 1;
    }
}

impl BeatListener for ClickTrack {
    fn on_tick(&mut self, beat: &Beat) {
        self.mix(beat);
    }
}
