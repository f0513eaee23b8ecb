//! Metronome timing and rhythm-accuracy engine for the Virtual Keys MIDI
//! keyboard.
//!
//! The crate keeps beat events phase-locked to a clock source with a
//! lookahead scheduler, delivers an early "scheduled" and an on-time "tick"
//! notification per beat, scores user hits against the beat grid and keeps
//! animated beat markers in step with the audible ticks. Everything runs on a
//! single execution context; see [`runtime::EventLoop`].

pub mod accuracy;
pub mod audio;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod record;
pub mod runtime;
pub mod scheduler;
pub mod timeline;
pub mod visual;

pub use accuracy::{AccuracyBands, HitRating, HitReport};
pub use audio::{ClickSynth, ClickTrack};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use config::{AppConfig, MetronomeConfig, VisualConfig};
pub use dispatch::{BeatListener, DispatchStats, NoopListener, TickDispatcher};
pub use error::{MetronomeError, Result};
pub use record::{EventKind, RecordedEvent, Recorder};
pub use runtime::{EventLoop, RunSummary};
pub use scheduler::{Metronome, PlaybackState, Transport};
pub use timeline::{Beat, Tempo, TimeSignature};
pub use visual::{BeatMarker, FrameLoop, FrameSnapshot, HitMarker, Visualizer};
