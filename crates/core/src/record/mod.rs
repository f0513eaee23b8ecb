use serde::{Deserialize, Serialize};

use crate::{dispatch::BeatListener, Beat, ClockSource, Result, Tempo};

/// What a [`Recorder`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Stopped,
    TempoChanged { bpm: f64 },
    Scheduled { beat: Beat },
    Tick { beat: Beat },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Clock time at which the event was observed, when the clock could be read.
    pub at: Option<f64>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Listener that keeps a timestamped log of every metronome event.
#[derive(Debug)]
pub struct Recorder<C> {
    clock: C,
    events: Vec<RecordedEvent>,
    is_recording: bool,
}

impl<C: ClockSource> Recorder<C> {
    /// Creates a recorder that is already recording.
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            events: Vec::new(),
            is_recording: true,
        }
    }

    pub fn start(&mut self) {
        self.is_recording = true;
    }

    pub fn stop(&mut self) {
        self.is_recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Beats in the order they were announced.
    pub fn scheduled(&self) -> impl Iterator<Item = Beat> + '_ {
        self.events.iter().filter_map(|event| match event.kind {
            EventKind::Scheduled { beat } => Some(beat),
            _ => None,
        })
    }

    /// Fired ticks with the clock time they fired at.
    pub fn ticks(&self) -> impl Iterator<Item = (Option<f64>, Beat)> + '_ {
        self.events.iter().filter_map(|event| match event.kind {
            EventKind::Tick { beat } => Some((event.at, beat)),
            _ => None,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.events)?)
    }

    fn push(&mut self, kind: EventKind) {
        if !self.is_recording {
            return;
        }
        let at = self.clock.current_time().ok();
        self.events.push(RecordedEvent { at, kind });
    }
}

impl<C: ClockSource> BeatListener for Recorder<C> {
    fn on_beat_scheduled(&mut self, beat: &Beat) {
        self.push(EventKind::Scheduled { beat: *beat });
    }

    fn on_tick(&mut self, beat: &Beat) {
        self.push(EventKind::Tick { beat: *beat });
    }

    fn on_start(&mut self, _now: f64) {
        self.push(EventKind::Started);
    }

    fn on_stop(&mut self) {
        self.push(EventKind::Stopped);
    }

    fn on_tempo_change(&mut self, tempo: Tempo) {
        self.push(EventKind::TempoChanged { bpm: tempo.bpm() });
    }
}
