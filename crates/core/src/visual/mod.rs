//! Beat and hit markers kept in step with the scheduler's timeline.
//!
//! Beat marker positions are never integrated frame by frame. Every frame
//! recomputes them from the marker's target time, its creation time and the
//! current clock time, so a marker sits on the hit line exactly when
//! `now == target_time`, whatever the frame timing was.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    accuracy::HitReport, config::VisualConfig, dispatch::BeatListener, Beat, HitRating, Tempo,
};

/// Restartable per-frame task. Cancelling is synchronous and idempotent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameLoop {
    active: bool,
    frames: u64,
}

impl FrameLoop {
    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Frames rendered since the visualiser was created.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn step(&mut self) -> Option<u64> {
        if !self.active {
            return None;
        }
        self.frames += 1;
        Some(self.frames)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatMarker {
    pub beat_number: u32,
    pub is_downbeat: bool,
    pub target_time: f64,
    pub creation_time: f64,
    /// Anchor marker that stays on the hit line instead of travelling.
    pub pinned: bool,
    /// Horizontal position as of the last rendered frame.
    pub position: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitMarker {
    pub position: f64,
    pub score: f64,
    pub rating: HitRating,
    pub opacity: f64,
}

/// Marker state after one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub frame: u64,
    pub time: f64,
    pub hit_line: f64,
    pub beat_markers: Vec<BeatMarker>,
    pub hit_markers: Vec<HitMarker>,
}

#[derive(Debug, Clone)]
pub struct Visualizer {
    config: VisualConfig,
    tempo: Tempo,
    /// Beat marker speed in pixels per frame.
    speed: f64,
    beat_markers: Vec<BeatMarker>,
    hit_markers: Vec<HitMarker>,
    pin_next: bool,
    frame_loop: FrameLoop,
}

impl Visualizer {
    pub fn new(config: VisualConfig, tempo: Tempo) -> Self {
        let mut frame_loop = FrameLoop::default();
        if config.enabled {
            frame_loop.start();
        }

        let mut visualizer = Self {
            config,
            tempo,
            speed: 0.0,
            beat_markers: Vec::new(),
            hit_markers: Vec::new(),
            pin_next: true,
            frame_loop,
        };
        visualizer.recalibrate();
        visualizer
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &VisualConfig {
        &self.config
    }

    /// Beat marker speed in pixels per frame: one beat to travel from the right
    /// edge of the track to the hit line.
    pub fn marker_speed(&self) -> f64 {
        self.speed
    }

    pub fn hit_line(&self) -> f64 {
        self.config.hit_line_offset
    }

    pub fn beat_markers(&self) -> &[BeatMarker] {
        &self.beat_markers
    }

    pub fn hit_markers(&self) -> &[HitMarker] {
        &self.hit_markers
    }

    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frame_loop
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
        self.recalibrate();
    }

    /// Adapts to a resized drawing surface. The hit line keeps its offset as
    /// long as it still fits on the track.
    pub fn resize(&mut self, track_width: f64) {
        self.config.track_width = track_width.max(1.0);
        if self.config.hit_line_offset >= self.config.track_width {
            self.config.hit_line_offset = 0.0;
        }
        self.recalibrate();
    }

    /// Clears every marker. Enabling re-arms the pinned anchor for the next
    /// beat marker and restarts the frame loop; disabling cancels it.
    pub fn reset_visualization(&mut self, enabled: bool) {
        self.beat_markers.clear();
        self.hit_markers.clear();
        self.config.enabled = enabled;

        if enabled {
            self.pin_next = true;
            self.recalibrate();
            self.frame_loop.start();
        } else {
            self.frame_loop.cancel();
        }
        debug!(enabled, "visualisation reset");
    }

    pub fn spawn_beat_marker(&mut self, beat: &Beat) {
        if !self.config.enabled {
            return;
        }

        let pinned = std::mem::take(&mut self.pin_next);
        let mut marker = BeatMarker {
            beat_number: beat.number,
            is_downbeat: beat.is_downbeat,
            target_time: beat.target_time,
            creation_time: beat.scheduled_at,
            pinned,
            position: 0.0,
        };
        marker.position = self.beat_marker_position(&marker, beat.scheduled_at);
        self.beat_markers.push(marker);
    }

    pub fn spawn_hit_marker(&mut self, report: &HitReport) {
        if !self.config.enabled {
            return;
        }

        self.hit_markers.push(HitMarker {
            position: self.config.hit_line_offset,
            score: report.score,
            rating: report.rating,
            opacity: 1.0,
        });
    }

    /// Advances every marker to `now`. Returns `None` while the frame loop is
    /// cancelled.
    pub fn render_frame(&mut self, now: f64) -> Option<FrameSnapshot> {
        let frame = self.frame_loop.step()?;

        // Markers are consumed at the hit line.
        self.beat_markers.retain(|marker| now <= marker.target_time);
        for index in 0..self.beat_markers.len() {
            let position = self.beat_marker_position(&self.beat_markers[index], now);
            self.beat_markers[index].position = position;
        }

        let speed = self.config.hit_marker_speed;
        let fade = self.config.hit_marker_fade;
        for marker in &mut self.hit_markers {
            marker.position -= speed;
            marker.opacity = (marker.opacity - fade).max(0.0);
        }
        self.hit_markers
            .retain(|marker| marker.position >= 0.0 && marker.opacity > 0.0);

        Some(FrameSnapshot {
            frame,
            time: now,
            hit_line: self.config.hit_line_offset,
            beat_markers: self.beat_markers.clone(),
            hit_markers: self.hit_markers.clone(),
        })
    }

    fn recalibrate(&mut self) {
        let distance = self.config.track_width - self.config.hit_line_offset;
        self.speed = distance / (self.tempo.seconds_per_beat() * self.config.frame_rate);
    }

    /// Linear from the right edge at `creation_time` to the hit line at
    /// `target_time`. Depends only on the marker's own times, so tempo changes
    /// and frame timing never move a marker already on screen.
    fn beat_marker_position(&self, marker: &BeatMarker, now: f64) -> f64 {
        let hit_line = self.config.hit_line_offset;
        let lead = marker.target_time - marker.creation_time;
        if marker.pinned || lead <= 0.0 {
            return hit_line;
        }

        let remaining = ((marker.target_time - now) / lead).clamp(0.0, 1.0);
        hit_line + (self.config.track_width - hit_line) * remaining
    }
}

impl BeatListener for Visualizer {
    fn on_beat_scheduled(&mut self, beat: &Beat) {
        self.spawn_beat_marker(beat);
    }

    fn on_start(&mut self, _now: f64) {
        if self.config.enabled {
            self.reset_visualization(true);
        }
    }

    fn on_stop(&mut self) {
        self.beat_markers.clear();
        self.hit_markers.clear();
    }

    fn on_tempo_change(&mut self, tempo: Tempo) {
        self.set_tempo(tempo);
    }
}
