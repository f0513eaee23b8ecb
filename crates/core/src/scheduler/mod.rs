//! Lookahead beat scheduler.
//!
//! A scheduling pass runs on a short fixed interval and generates every beat
//! whose target time falls inside the schedule-ahead window. Beats carry an
//! exact clock timestamp, so the coarse pass interval never shows up in when
//! ticks fire, only in how early they are announced.

use tracing::{debug, info, warn};

use crate::{
    accuracy::{self, AccuracyBands, HitReport},
    config::MetronomeConfig,
    dispatch::{BeatListener, DispatchStats, NoopListener, TickDispatcher},
    Beat, ClockSource, Result, Tempo, TimeSignature,
};

/// Bookkeeping that only exists while the metronome runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transport {
    /// Target time of the next beat not yet generated.
    pub next_tick_time: f64,
    /// 0-based position of that beat within the measure.
    pub current_beat_index: u32,
    /// Anchor of the beat grid used for hit scoring.
    pub measure_start_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackState {
    Stopped,
    Running(Transport),
}

impl PlaybackState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}

/// The metronome engine: beat scheduler, tick dispatcher and hit evaluator
/// bound to one clock source and one listener.
#[derive(Debug)]
pub struct Metronome<C, L = NoopListener> {
    clock: C,
    listener: L,
    tempo: Tempo,
    time_signature: TimeSignature,
    schedule_ahead: f64,
    pass_interval: f64,
    bands: AccuracyBands,
    dispatcher: TickDispatcher,
    state: PlaybackState,
    // Set between a delayed start and the pass that generates the anchor beat,
    // which was already announced by `start`.
    anchor_announced: bool,
    // Grid in force before the last tempo change, as (anchor, seconds per
    // beat). Ticks generated on it may still be pending or just fired.
    previous_grid: Option<(f64, f64)>,
}

impl<C: ClockSource> Metronome<C> {
    pub fn new(clock: C) -> Self {
        Self::with_listener(clock, NoopListener)
    }
}

impl<C: ClockSource, L: BeatListener> Metronome<C, L> {
    pub fn with_listener(clock: C, listener: L) -> Self {
        Self::from_config(clock, listener, &MetronomeConfig::default())
    }

    pub fn from_config(clock: C, listener: L, config: &MetronomeConfig) -> Self {
        Self {
            clock,
            listener,
            tempo: config.bpm,
            time_signature: config.time_signature,
            schedule_ahead: config.schedule_ahead,
            pass_interval: config.pass_interval,
            bands: AccuracyBands::default(),
            dispatcher: TickDispatcher::new(config.max_pending),
            state: PlaybackState::Stopped,
            anchor_announced: false,
            previous_grid: None,
        }
    }

    /// Starts playback. A no-op when already running.
    ///
    /// With `delay_first_beat` the first downbeat is placed one beat in the
    /// future and announced immediately, so a visual anchor can appear before
    /// anything sounds.
    pub fn start(&mut self, delay_first_beat: bool) -> Result<()> {
        if self.state.is_running() {
            return Ok(());
        }

        let now = self.clock.current_time()?;
        let next_tick_time = if delay_first_beat {
            now + self.tempo.seconds_per_beat()
        } else {
            now
        };

        self.state = PlaybackState::Running(Transport {
            next_tick_time,
            current_beat_index: 0,
            measure_start_time: now,
        });
        self.previous_grid = None;
        self.listener.on_start(now);

        if delay_first_beat {
            self.listener
                .on_beat_scheduled(&Beat::new(0, next_tick_time, now));
            self.anchor_announced = true;
        }

        info!(
            bpm = self.tempo.bpm(),
            beats = self.time_signature.beats(),
            delay_first_beat,
            now,
            "metronome started"
        );
        Ok(())
    }

    /// Stops playback and cancels every armed tick. A no-op when stopped.
    pub fn stop(&mut self) {
        if !self.state.is_running() {
            return;
        }

        let canceled = self.dispatcher.cancel_all();
        self.state = PlaybackState::Stopped;
        self.anchor_announced = false;
        self.listener.on_stop();
        info!(canceled, "metronome stopped");
    }

    /// Sets the tempo, clamped to the supported range. Beats already generated
    /// keep their target times; the new interval applies from the next beat on.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<Tempo> {
        let tempo = Tempo::new(bpm)?;
        let previous_spb = self.tempo.seconds_per_beat();
        self.tempo = tempo;

        if let PlaybackState::Running(transport) = &mut self.state {
            // The grid continues from the next ungenerated beat at the new
            // spacing. Beats already generated stay on the old grid, unless
            // none were generated since the last change.
            if transport.next_tick_time > transport.measure_start_time {
                self.previous_grid = Some((transport.measure_start_time, previous_spb));
            }
            transport.measure_start_time = transport.next_tick_time;
        }

        self.listener.on_tempo_change(tempo);
        debug!(bpm = tempo.bpm(), "tempo changed");
        Ok(tempo)
    }

    /// Sets beats per measure; the next generated beat becomes a downbeat.
    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
        if let PlaybackState::Running(transport) = &mut self.state {
            transport.current_beat_index = 0;
        }
        debug!(beats = time_signature.beats(), "time signature changed");
    }

    /// One scheduling pass: generates every beat due within the lookahead
    /// window. Returns the number of beats generated.
    pub fn schedule_pass(&mut self) -> Result<usize> {
        if !self.state.is_running() {
            return Ok(0);
        }

        let now = match self.clock.current_time() {
            Ok(now) => now,
            Err(err) => {
                warn!(%err, "clock unavailable during scheduling pass");
                return Err(err);
            }
        };

        let PlaybackState::Running(transport) = &mut self.state else {
            return Ok(0);
        };

        let horizon = now + self.schedule_ahead;
        let mut generated = 0;
        while transport.next_tick_time < horizon {
            // A full window holds generation back; the next pass resumes from
            // the same beat.
            if self.dispatcher.is_full() {
                debug!(
                    pending = self.dispatcher.pending_len(),
                    next = transport.next_tick_time,
                    "pending tick window full, deferring beats"
                );
                break;
            }

            let beat = Beat::new(transport.current_beat_index, transport.next_tick_time, now);
            if self.anchor_announced {
                self.anchor_announced = false;
                self.dispatcher.arm(beat, now);
            } else {
                self.dispatcher.dispatch(beat, now, &mut self.listener);
            }

            transport.next_tick_time += self.tempo.seconds_per_beat();
            transport.current_beat_index =
                (transport.current_beat_index + 1) % self.time_signature.beats();
            generated += 1;
        }

        if generated > 0 {
            debug!(generated, now, next = transport.next_tick_time, "scheduled beats");
        }
        Ok(generated)
    }

    /// Fires every armed tick whose target time has been reached.
    pub fn fire_due(&mut self) -> Result<usize> {
        if self.dispatcher.pending_len() == 0 {
            return Ok(0);
        }
        let now = self.clock.current_time()?;
        Ok(self.dispatcher.fire_due(now, &mut self.listener))
    }

    /// Target time of the earliest armed tick.
    pub fn next_deadline(&self) -> Option<f64> {
        self.dispatcher.next_deadline()
    }

    /// Scores `hit_time` (on this metronome's clock) against the nearest
    /// beat. Always 0 while stopped.
    ///
    /// Hits before the grid's anchor also count against the grid in force
    /// before the last tempo change, since those beats were generated on it.
    pub fn hit_accuracy(&self, hit_time: f64) -> f64 {
        let PlaybackState::Running(transport) = &self.state else {
            return 0.0;
        };

        let current = accuracy::score(
            hit_time,
            transport.measure_start_time,
            self.tempo.seconds_per_beat(),
        );
        match self.previous_grid {
            Some((anchor, spb)) if hit_time < transport.measure_start_time => {
                current.max(accuracy::score(hit_time, anchor, spb))
            }
            _ => current,
        }
    }

    /// Scores and rates a hit.
    pub fn report_hit(&self, hit_time: f64) -> HitReport {
        let score = self.hit_accuracy(hit_time);
        HitReport {
            hit_time,
            score,
            rating: self.bands.classify(score),
        }
    }

    pub fn set_accuracy_bands(&mut self, bands: AccuracyBands) {
        self.bands = bands;
    }

    pub fn accuracy_bands(&self) -> AccuracyBands {
        self.bands
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn pass_interval(&self) -> f64 {
        self.pass_interval
    }

    pub fn schedule_ahead(&self) -> f64 {
        self.schedule_ahead
    }

    pub fn pending_ticks(&self) -> usize {
        self.dispatcher.pending_len()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::Recorder, ManualClock, MetronomeError};

    const EPS: f64 = 1e-9;

    fn metronome(clock: &ManualClock) -> Metronome<ManualClock, Recorder<ManualClock>> {
        Metronome::with_listener(clock.clone(), Recorder::new(clock.clone()))
    }

    #[test]
    fn delayed_start_announces_the_anchor_beat() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);
        metronome.start(true).unwrap();

        let scheduled: Vec<_> = metronome.listener().scheduled().collect();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].number, 1);
        assert!(scheduled[0].is_downbeat);
        assert!((scheduled[0].target_time - 0.5).abs() < EPS);

        let PlaybackState::Running(transport) = metronome.state() else {
            panic!("metronome should be running");
        };
        assert!((transport.next_tick_time - 0.5).abs() < EPS);
        assert_eq!(metronome.schedule_pass().unwrap(), 0);
    }

    #[test]
    fn anchor_beat_is_armed_without_a_second_announcement() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);
        metronome.start(true).unwrap();

        clock.set(0.45);
        assert_eq!(metronome.schedule_pass().unwrap(), 1);
        assert_eq!(metronome.listener().scheduled().count(), 1);
        assert_eq!(metronome.pending_ticks(), 1);

        clock.set(0.5);
        assert_eq!(metronome.fire_due().unwrap(), 1);
        let ticks: Vec<_> = metronome.listener().ticks().collect();
        assert_eq!(ticks[0].1.number, 1);
    }

    #[test]
    fn undelayed_start_drops_the_immediate_tick() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);
        metronome.start(false).unwrap();

        assert_eq!(metronome.schedule_pass().unwrap(), 1);
        assert_eq!(metronome.listener().scheduled().count(), 1);
        assert_eq!(metronome.pending_ticks(), 0);
        assert_eq!(metronome.dispatch_stats().missed, 1);
    }

    #[test]
    fn start_fails_without_a_clock_and_changes_nothing() {
        let clock = ManualClock::new();
        clock.close();
        let mut metronome = metronome(&clock);

        let err = metronome.start(true).unwrap_err();
        assert!(matches!(err, MetronomeError::EngineNotReady(_)));
        assert!(!metronome.is_running());
        assert!(metronome.listener().events().is_empty());
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);

        metronome.stop();
        metronome.start(true).unwrap();
        clock.set(0.2);
        metronome.start(true).unwrap();
        let PlaybackState::Running(transport) = metronome.state() else {
            panic!("metronome should be running");
        };
        assert_eq!(transport.measure_start_time, 0.0);

        metronome.stop();
        metronome.stop();
        assert_eq!(metronome.state(), PlaybackState::Stopped);
    }

    #[test]
    fn time_signature_change_restarts_the_measure() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);
        metronome.start(true).unwrap();

        // Generate beats 1 and 2.
        clock.set(0.95);
        metronome.schedule_pass().unwrap();
        metronome.set_time_signature(TimeSignature::new(3).unwrap());

        clock.set(1.45);
        metronome.schedule_pass().unwrap();
        let last = metronome.listener().scheduled().last().unwrap();
        assert_eq!(last.number, 1);
        assert!(last.is_downbeat);
        assert!((last.target_time - 1.5).abs() < EPS);
    }

    #[test]
    fn tempo_change_applies_to_the_next_interval_only() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);
        metronome.start(true).unwrap();

        clock.set(0.45);
        metronome.schedule_pass().unwrap();
        metronome.set_tempo(60.0).unwrap();

        // The beat at 1.0 was computed at the old tempo.
        clock.set(0.95);
        metronome.schedule_pass().unwrap();
        clock.set(1.95);
        metronome.schedule_pass().unwrap();

        let targets: Vec<f64> = metronome
            .listener()
            .scheduled()
            .map(|beat| beat.target_time)
            .collect();
        assert_eq!(targets.len(), 3);
        assert!((targets[1] - 1.0).abs() < EPS);
        assert!((targets[2] - 2.0).abs() < EPS);
    }

    #[test]
    fn tempo_is_clamped() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);
        assert_eq!(metronome.set_tempo(5.0).unwrap().bpm(), 30.0);
        assert_eq!(metronome.set_tempo(400.0).unwrap().bpm(), 300.0);
        assert!(metronome.set_tempo(f64::INFINITY).is_err());
        assert_eq!(metronome.tempo().bpm(), 300.0);
    }

    #[test]
    fn late_pass_catches_up_without_late_ticks() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);
        metronome.start(true).unwrap();

        clock.set(2.0);
        // Beats at 0.5, 1.0, 1.5 and 2.0 are all due at or before now.
        assert_eq!(metronome.schedule_pass().unwrap(), 4);
        assert_eq!(metronome.pending_ticks(), 0);
        assert_eq!(metronome.dispatch_stats().missed, 4);
    }

    #[test]
    fn accuracy_follows_the_grid() {
        let clock = ManualClock::starting_at(10.0);
        let mut metronome = metronome(&clock);
        assert_eq!(metronome.hit_accuracy(10.0), 0.0);

        metronome.start(true).unwrap();
        assert!((metronome.hit_accuracy(10.0) - 1.0).abs() < EPS);
        assert!(metronome.hit_accuracy(10.25).abs() < EPS);

        let report = metronome.report_hit(10.55);
        assert!((report.score - 0.8).abs() < EPS);
        assert_eq!(report.rating, crate::HitRating::Good);
    }

    #[test]
    fn tempo_change_reanchors_the_grid() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);
        metronome.start(true).unwrap();

        clock.set(0.45);
        metronome.schedule_pass().unwrap();
        metronome.set_tempo(90.0).unwrap();

        // Next beat at 1.0, then every 2/3 s.
        assert!((metronome.hit_accuracy(1.0) - 1.0).abs() < EPS);
        assert!((metronome.hit_accuracy(1.0 + 2.0 / 3.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn ticks_generated_before_a_tempo_change_still_score() {
        let clock = ManualClock::new();
        let mut metronome = metronome(&clock);
        metronome.start(true).unwrap();

        // Beats at 0.5 and 1.0 are generated at 120 bpm.
        clock.set(0.96);
        metronome.schedule_pass().unwrap();
        metronome.set_tempo(60.0).unwrap();
        metronome.set_tempo(60.0).unwrap();

        assert!((metronome.hit_accuracy(1.0) - 1.0).abs() < EPS);
        assert!((metronome.hit_accuracy(0.5) - 1.0).abs() < EPS);
        assert!((metronome.hit_accuracy(1.5) - 1.0).abs() < EPS);
        assert!((metronome.hit_accuracy(2.5) - 1.0).abs() < EPS);
        // Past the new anchor only the new grid counts.
        assert!(metronome.hit_accuracy(2.0).abs() < EPS);

        metronome.stop();
        metronome.start(true).unwrap();
        // The fresh grid is anchored at 0.96; the old one no longer counts.
        assert!(metronome.hit_accuracy(0.5) < 0.1);
    }

    #[test]
    fn full_window_defers_beats_instead_of_silencing_them() {
        let clock = ManualClock::new();
        let config = MetronomeConfig {
            bpm: Tempo::new(300.0).unwrap(),
            schedule_ahead: 5.0,
            ..MetronomeConfig::default()
        };
        config.validate().unwrap();
        let mut metronome =
            Metronome::from_config(clock.clone(), Recorder::new(clock.clone()), &config);
        metronome.start(true).unwrap();

        // 5 s ahead at 0.2 s per beat would be 25 ticks; only 20 fit.
        assert_eq!(metronome.schedule_pass().unwrap(), 20);
        assert_eq!(metronome.pending_ticks(), 20);
        assert_eq!(metronome.schedule_pass().unwrap(), 0);

        clock.set(0.2);
        assert_eq!(metronome.fire_due().unwrap(), 1);
        assert_eq!(metronome.schedule_pass().unwrap(), 1);

        let PlaybackState::Running(transport) = metronome.state() else {
            panic!("metronome should be running");
        };
        assert!((transport.next_tick_time - 4.4).abs() < 1e-6);

        let stats = metronome.dispatch_stats();
        assert_eq!(stats.canceled, 0);
        assert_eq!(stats.missed, 0);
        assert_eq!(stats.fired, 1);
    }
}
