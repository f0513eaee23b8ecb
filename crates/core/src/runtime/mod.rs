//! Single-threaded cooperative driver.
//!
//! The loop interleaves three kinds of callbacks on one execution context:
//! the periodic scheduling pass, the per-beat tick dispatch and the per-frame
//! render step. Each callback runs to completion; between them the loop idles
//! in [`ClockSource::wait_until`] until the earliest pending deadline.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{config::AppConfig, dispatch::BeatListener, ClockSource, Metronome, Result};

/// Counters for one [`EventLoop::run_until`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub passes: u64,
    pub ticks: u64,
    pub frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventLoop {
    pass_interval: f64,
    frame_interval: Option<f64>,
}

impl EventLoop {
    const MIN_INTERVAL: f64 = 1e-4;

    /// `frame_interval` of `None` disables the per-frame callback.
    pub fn new(pass_interval: f64, frame_interval: Option<f64>) -> Self {
        Self {
            pass_interval: pass_interval.max(Self::MIN_INTERVAL),
            frame_interval: frame_interval.map(|interval| interval.max(Self::MIN_INTERVAL)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let frame_interval = config
            .visual
            .enabled
            .then(|| config.visual.frame_interval());
        Self::new(config.metronome.pass_interval, frame_interval)
    }

    pub fn pass_interval(&self) -> f64 {
        self.pass_interval
    }

    pub fn frame_interval(&self) -> Option<f64> {
        self.frame_interval
    }

    /// Drives `metronome` until its clock reaches `end`.
    ///
    /// `on_frame` runs once per frame interval with the current clock time. If
    /// the clock becomes unavailable the metronome is stopped and the error is
    /// returned.
    pub fn run_until<C, L, F>(
        &self,
        metronome: &mut Metronome<C, L>,
        end: f64,
        mut on_frame: F,
    ) -> Result<RunSummary>
    where
        C: ClockSource,
        L: BeatListener,
        F: FnMut(&mut Metronome<C, L>, f64),
    {
        let mut summary = RunSummary::default();
        let mut now = current_time(metronome)?;
        let mut next_pass = now;
        let mut next_frame = now;

        loop {
            if now >= next_pass {
                if let Err(err) = metronome.schedule_pass() {
                    metronome.stop();
                    return Err(err);
                }
                summary.passes += 1;
                while next_pass <= now {
                    next_pass += self.pass_interval;
                }
            }

            match metronome.fire_due() {
                Ok(fired) => summary.ticks += fired as u64,
                Err(err) => {
                    metronome.stop();
                    return Err(err);
                }
            }

            if let Some(interval) = self.frame_interval {
                if now >= next_frame {
                    on_frame(metronome, now);
                    summary.frames += 1;
                    while next_frame <= now {
                        next_frame += interval;
                    }
                }
            }

            if now >= end {
                break;
            }

            let mut deadline = next_pass.min(end);
            if let Some(tick) = metronome.next_deadline() {
                deadline = deadline.min(tick);
            }
            if self.frame_interval.is_some() {
                deadline = deadline.min(next_frame);
            }

            if let Err(err) = metronome.clock().wait_until(deadline) {
                metronome.stop();
                return Err(err);
            }
            now = current_time(metronome)?;
        }

        debug!(?summary, end, "event loop finished");
        Ok(summary)
    }
}

fn current_time<C, L>(metronome: &mut Metronome<C, L>) -> Result<f64>
where
    C: ClockSource,
    L: BeatListener,
{
    let result = metronome.clock().current_time();
    if let Err(err) = &result {
        warn!(%err, "event loop lost its clock");
        metronome.stop();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::Recorder, ManualClock, MetronomeError};

    #[test]
    fn ticks_fire_exactly_on_target_with_a_manual_clock() {
        let clock = ManualClock::new();
        let mut metronome = Metronome::with_listener(clock.clone(), Recorder::new(clock.clone()));
        metronome.start(true).unwrap();

        let event_loop = EventLoop::new(0.025, None);
        let summary = event_loop.run_until(&mut metronome, 2.1, |_, _| {}).unwrap();

        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.frames, 0);
        for (at, beat) in metronome.listener().ticks() {
            assert_eq!(at, Some(beat.target_time));
        }
    }

    #[test]
    fn frames_are_rendered_at_the_frame_rate() {
        let clock = ManualClock::new();
        let mut metronome = Metronome::new(clock.clone());
        let event_loop = EventLoop::new(0.025, Some(0.1));

        let mut seen = Vec::new();
        let summary = event_loop
            .run_until(&mut metronome, 0.45, |_, now| seen.push(now))
            .unwrap();
        assert_eq!(summary.frames, 5);
        assert_eq!(seen.len(), 5);
        assert!(seen.windows(2).all(|pair| pair[1] > pair[0]));
    }

    #[test]
    fn losing_the_clock_stops_the_metronome() {
        let clock = ManualClock::new();
        let mut metronome = Metronome::new(clock.clone());
        metronome.start(true).unwrap();
        clock.close();

        let err = EventLoop::new(0.025, None)
            .run_until(&mut metronome, 1.0, |_, _| {})
            .unwrap_err();
        assert!(matches!(err, MetronomeError::EngineNotReady(_)));
        assert!(!metronome.is_running());
    }
}
