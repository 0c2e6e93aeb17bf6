// Sequencer module
// Clock, playback strategies, tracks and the ensemble resolver

pub mod clock;
pub mod ensemble;
pub mod generative;
pub mod metronome;
pub mod recording;
pub mod replay;
pub mod strategy;
pub mod timeline;
pub mod track;

pub use clock::{Clock, ClockClient, ClockError, ClockFrame, ClockState};
pub use ensemble::Ensemble;
pub use generative::{
    FeedForwardNet, GenerativeModel, GenerativeSequencer, ModelConfig, ModelError, ModelShape,
    PitchMapper,
};
pub use metronome::{ClickType, Metronome};
pub use recording::{RecordBuffer, StampedEvent};
pub use replay::ReplaySequencer;
pub use strategy::{ExportsTimeline, PlaybackStrategy, Strategy, StrategyKind};
pub use timeline::Tempo;
pub use track::{Track, TrackError, TrackId};
