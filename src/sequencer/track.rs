// Track - one playback strategy bound to one instrument
// Carries the mute / solo / record-monitor flags the ensemble arbitrates.

use super::clock::{ClockClient, ClockFrame};
use super::generative::ModelError;
use super::strategy::{PlaybackStrategy, Strategy, StrategyKind};
use crate::instrument::{Instrument, InstrumentError};
use crate::project::store::RecordId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global track ID generator (atomic for thread-safety)
static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Runtime identity of a track, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    /// Generate a unique track ID
    pub fn generate() -> Self {
        TrackId(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

/// Errors raised while a track plays
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Instrument error: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

pub struct Track {
    id: TrackId,
    name: String,
    soloed: bool,
    muted: bool,
    /// Forced inaudible because another track is soloed
    tmp_muted: bool,
    /// Live-monitor input and receive committed takes
    recording: bool,
    record_id: Option<RecordId>,
    strategy: Strategy,
    instrument: Box<dyn Instrument>,
}

impl Track {
    pub fn new(strategy: Strategy, instrument: Box<dyn Instrument>) -> Self {
        Self {
            id: TrackId::generate(),
            name: instrument.name().to_string(),
            soloed: false,
            muted: false,
            tmp_muted: false,
            recording: false,
            record_id: None,
            strategy,
            instrument,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_soloed(&self) -> bool {
        self.soloed
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_tmp_muted(&self) -> bool {
        self.tmp_muted
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Whether the track should currently be heard
    pub fn audible(&self) -> bool {
        !self.tmp_muted && (self.soloed || !self.muted)
    }

    /// Enable or disable input monitoring for this track
    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    /// Flip the local mute flag and push the resulting audible state
    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        let audible = self.audible();
        self.instrument.mute(!audible);
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub(crate) fn strategy_mut(&mut self) -> &mut Strategy {
        &mut self.strategy
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn instrument(&self) -> &dyn Instrument {
        self.instrument.as_ref()
    }

    /// Audition a raw input event on this track's instrument
    pub fn forward_input(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.instrument.play_event(data, 0.0)
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        self.record_id.as_ref()
    }

    pub(crate) fn set_record_id(&mut self, id: Option<RecordId>) {
        self.record_id = id;
    }

    /// Content changed; the stored copy is stale
    pub fn mark_changed(&mut self) {
        self.record_id = None;
    }

    // Ensemble-only mutators; the resolver keeps these consistent.

    pub(crate) fn set_soloed(&mut self, soloed: bool) {
        self.soloed = soloed;
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub(crate) fn apply_audibility(&mut self, tmp_muted: bool, instrument_muted: bool) {
        self.tmp_muted = tmp_muted;
        self.instrument.mute(instrument_muted);
    }
}

impl ClockClient for Track {
    fn tick(&mut self, frame: &ClockFrame<'_>) -> Result<(), TrackError> {
        self.strategy.tick(frame, self.instrument.as_mut())
    }

    fn start(&mut self, beat: f64) {
        self.strategy.start(beat);
    }

    fn stop(&mut self) -> Result<(), TrackError> {
        self.strategy.stop(self.instrument.as_mut())
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("soloed", &self.soloed)
            .field("muted", &self.muted)
            .field("tmp_muted", &self.tmp_muted)
            .field("recording", &self.recording)
            .field("record_id", &self.record_id)
            .field("strategy", &self.strategy)
            .finish()
    }
}
