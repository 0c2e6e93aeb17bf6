// Playback strategies - per-track advancement logic
//
// Every track owns exactly one strategy. The set of variants is closed, so the
// track stores a `Strategy` enum; code that needs variant-specific behaviour
// (committing a take, persistence) matches on it instead of probing types.

use super::clock::ClockFrame;
use super::generative::GenerativeSequencer;
use super::recording::StampedEvent;
use super::replay::ReplaySequencer;
use super::track::TrackError;
use crate::instrument::Instrument;

/// Capability shared by all strategies
pub trait PlaybackStrategy {
    /// Advance one quantum, sending any due events to `instrument`
    fn tick(
        &mut self,
        frame: &ClockFrame<'_>,
        instrument: &mut dyn Instrument,
    ) -> Result<(), TrackError>;

    /// Transport started or resumed at `beat`
    fn start(&mut self, beat: f64);

    /// Transport stopped; silence anything still sounding
    fn stop(&mut self, instrument: &mut dyn Instrument) -> Result<(), TrackError>;
}

/// Strategies whose timeline can be exported for persistence
pub trait ExportsTimeline {
    fn timeline(&self) -> &[StampedEvent];

    /// Key of the stored copy of this timeline, if it has one
    fn source_key(&self) -> Option<&str>;

    fn set_source_key(&mut self, key: Option<String>);
}

/// Persisted discriminator of a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Replay,
    Generative,
}

impl StrategyKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            StrategyKind::Replay => "ReplaySequencer",
            StrategyKind::Generative => "GenerativeSequencer",
        }
    }
}

pub enum Strategy {
    Replay(ReplaySequencer),
    Generative(GenerativeSequencer),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Replay(_) => StrategyKind::Replay,
            Strategy::Generative(_) => StrategyKind::Generative,
        }
    }

    pub fn as_replay(&self) -> Option<&ReplaySequencer> {
        match self {
            Strategy::Replay(seq) => Some(seq),
            Strategy::Generative(_) => None,
        }
    }

    pub fn as_replay_mut(&mut self) -> Option<&mut ReplaySequencer> {
        match self {
            Strategy::Replay(seq) => Some(seq),
            Strategy::Generative(_) => None,
        }
    }

    pub fn as_generative(&self) -> Option<&GenerativeSequencer> {
        match self {
            Strategy::Generative(seq) => Some(seq),
            Strategy::Replay(_) => None,
        }
    }

    /// Timeline export, only available on replay strategies
    pub fn as_timeline_mut(&mut self) -> Option<&mut dyn ExportsTimeline> {
        match self {
            Strategy::Replay(seq) => Some(seq),
            Strategy::Generative(_) => None,
        }
    }
}

impl PlaybackStrategy for Strategy {
    fn tick(
        &mut self,
        frame: &ClockFrame<'_>,
        instrument: &mut dyn Instrument,
    ) -> Result<(), TrackError> {
        match self {
            Strategy::Replay(seq) => seq.tick(frame, instrument),
            Strategy::Generative(seq) => seq.tick(frame, instrument),
        }
    }

    fn start(&mut self, beat: f64) {
        match self {
            Strategy::Replay(seq) => seq.start(beat),
            Strategy::Generative(seq) => seq.start(beat),
        }
    }

    fn stop(&mut self, instrument: &mut dyn Instrument) -> Result<(), TrackError> {
        match self {
            Strategy::Replay(seq) => seq.stop(instrument),
            Strategy::Generative(seq) => seq.stop(instrument),
        }
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Replay(seq) => f.debug_tuple("Replay").field(seq).finish(),
            Strategy::Generative(seq) => f.debug_tuple("Generative").field(seq).finish(),
        }
    }
}
