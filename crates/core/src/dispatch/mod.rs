//! Per-beat notification delivery.
//!
//! Every generated [`Beat`] produces two notifications: `on_beat_scheduled`
//! straight away, for visual lead-in, and `on_tick` once the clock reaches the
//! beat's target time. Ticks whose target time has already passed when they
//! are armed are dropped rather than played late.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Beat, Tempo};

/// Capabilities a host supplies to receive metronome events.
///
/// Every method defaults to a no-op, so hosts only implement what they need.
pub trait BeatListener {
    /// Fired when a beat is generated, ahead of its target time.
    fn on_beat_scheduled(&mut self, _beat: &Beat) {}

    /// Fired no earlier than the beat's target time.
    fn on_tick(&mut self, _beat: &Beat) {}

    fn on_start(&mut self, _now: f64) {}

    fn on_stop(&mut self) {}

    fn on_tempo_change(&mut self, _tempo: Tempo) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl BeatListener for NoopListener {}

impl<L: BeatListener + ?Sized> BeatListener for &mut L {
    fn on_beat_scheduled(&mut self, beat: &Beat) {
        (**self).on_beat_scheduled(beat);
    }

    fn on_tick(&mut self, beat: &Beat) {
        (**self).on_tick(beat);
    }

    fn on_start(&mut self, now: f64) {
        (**self).on_start(now);
    }

    fn on_stop(&mut self) {
        (**self).on_stop();
    }

    fn on_tempo_change(&mut self, tempo: Tempo) {
        (**self).on_tempo_change(tempo);
    }
}

impl<A: BeatListener, B: BeatListener> BeatListener for (A, B) {
    fn on_beat_scheduled(&mut self, beat: &Beat) {
        self.0.on_beat_scheduled(beat);
        self.1.on_beat_scheduled(beat);
    }

    fn on_tick(&mut self, beat: &Beat) {
        self.0.on_tick(beat);
        self.1.on_tick(beat);
    }

    fn on_start(&mut self, now: f64) {
        self.0.on_start(now);
        self.1.on_start(now);
    }

    fn on_stop(&mut self) {
        self.0.on_stop();
        self.1.on_stop();
    }

    fn on_tempo_change(&mut self, tempo: Tempo) {
        self.0.on_tempo_change(tempo);
        self.1.on_tempo_change(tempo);
    }
}

/// Running totals kept by the dispatcher.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub scheduled: u64,
    pub fired: u64,
    /// Ticks dropped because their target time had already passed.
    pub missed: u64,
    pub canceled: u64,
}

/// Owns the set of armed ticks for one scheduler, ordered by target time.
///
/// The set is bounded. Callers check [`TickDispatcher::is_full`] before
/// generating more beats; a full window never makes room by dropping an armed
/// tick.
#[derive(Debug)]
pub struct TickDispatcher {
    pending: VecDeque<Beat>,
    capacity: usize,
    stats: DispatchStats,
}

impl TickDispatcher {
    pub const DEFAULT_CAPACITY: usize = 20;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            stats: DispatchStats::default(),
        }
    }

    /// Announces `beat` and arms its tick.
    pub fn dispatch<L: BeatListener>(&mut self, beat: Beat, now: f64, listener: &mut L) -> bool {
        listener.on_beat_scheduled(&beat);
        self.arm(beat, now)
    }

    /// Arms the tick for `beat` without announcing it. Returns whether it was
    /// armed.
    ///
    /// Late ticks, whose target time is at or before `now`, are dropped and
    /// counted as missed. A full window refuses the new tick and leaves the
    /// armed ones alone.
    pub fn arm(&mut self, beat: Beat, now: f64) -> bool {
        if self.is_full() {
            warn!(
                beat = beat.number,
                target = beat.target_time,
                capacity = self.capacity,
                "pending tick window full, refusing tick"
            );
            return false;
        }
        self.stats.scheduled += 1;

        let delay = beat.target_time - now;
        if delay <= 0.0 {
            self.stats.missed += 1;
            debug!(
                beat = beat.number,
                target = beat.target_time,
                now,
                "dropping late tick"
            );
            return false;
        }

        self.pending.push_back(beat);
        true
    }

    /// Fires every armed tick whose target time is at or before `now`, in
    /// target-time order. Returns how many fired.
    pub fn fire_due<L: BeatListener>(&mut self, now: f64, listener: &mut L) -> usize {
        let mut fired = 0;
        while self
            .pending
            .front()
            .is_some_and(|beat| beat.target_time <= now)
        {
            if let Some(beat) = self.pending.pop_front() {
                listener.on_tick(&beat);
                fired += 1;
            }
        }
        self.stats.fired += fired as u64;
        fired
    }

    /// Target time of the earliest armed tick.
    pub fn next_deadline(&self) -> Option<f64> {
        self.pending.front().map(|beat| beat.target_time)
    }

    /// Cancels every armed tick. Returns how many were pending.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.stats.canceled += count as u64;
        count
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}

impl Default for TickDispatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
