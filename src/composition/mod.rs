// Composition - top-level orchestration
//
// Owns the clock, every track, the ensemble and the recording buffer. The
// schedulable collection keeps the order entities are saved and restored in;
// the clock occupies a slot of its own.

use crate::config::ComposerConfig;
use crate::instrument::{Instrument, InstrumentFactory};
use crate::messaging::channels::InputConsumer;
use crate::project::store::RecordId;
use crate::sequencer::clock::{Clock, ClockClient, ClockError, ClockFrame};
use crate::sequencer::ensemble::Ensemble;
use crate::sequencer::generative::{GenerativeSequencer, ModelConfig};
use crate::sequencer::metronome::Metronome;
use crate::sequencer::recording::{RecordBuffer, StampedEvent};
use crate::sequencer::replay::ReplaySequencer;
use crate::sequencer::strategy::Strategy;
use crate::sequencer::timeline::Tempo;
use crate::sequencer::track::{Track, TrackId};
use ringbuf::traits::Consumer;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, error, info, warn};

/// Entry of the ordered schedulable collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedulable {
    Clock,
    Track(TrackId),
}

/// Where a new track goes in the schedulable collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Append,
    /// Overwrite the entry at this index. Falls back to appending when the
    /// index is past the end or holds the clock.
    At(usize),
}

pub struct Composition {
    config: ComposerConfig,
    clock: Clock,
    tracks: HashMap<TrackId, Track>,
    ensemble: Ensemble,
    things: Vec<Schedulable>,
    /// Created on first use so it does not claim an instrument otherwise
    metronome: Option<Metronome>,
    /// Global capture flag
    recording: bool,
    record_buffer: RecordBuffer,
    play_head: f64,
    title: String,
    record_id: Option<RecordId>,
    pending_removals: VecDeque<TrackId>,
    instruments: Box<dyn InstrumentFactory>,
    tracks_created: u64,
    tick_failures: u64,
}

impl Composition {
    pub fn new(config: ComposerConfig, instruments: Box<dyn InstrumentFactory>) -> Self {
        let clock = Clock::new(
            config.ticks_per_beat,
            Tempo::new(config.bpm),
            config.control_ramps.clone(),
        );
        info!(
            title = %config.title,
            ticks_per_beat = clock.ticks_per_beat(),
            bpm = clock.tempo().bpm(),
            "composition created"
        );

        Self {
            title: config.title.clone(),
            config,
            clock,
            tracks: HashMap::new(),
            ensemble: Ensemble::new(),
            things: vec![Schedulable::Clock],
            metronome: None,
            recording: false,
            record_buffer: RecordBuffer::new(),
            play_head: 0.0,
            record_id: None,
            pending_removals: VecDeque::new(),
            instruments,
            tracks_created: 0,
            tick_failures: 0,
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Advance one quantum. Track failures are logged and counted; the
    /// scheduling loop always survives.
    pub fn tick(&mut self) {
        self.apply_pending_removals();

        let previous_beat = self.clock.beat_now();
        if let Err(err) = self.clock.tick(&mut self.tracks) {
            self.report_failures("tick", err);
        }
        self.play_head = self.clock.beat_now();

        if self.clock.is_running()
            && let Some(metronome) = self.metronome.as_mut()
        {
            let frame = ClockFrame {
                previous_beat,
                beat: self.play_head,
                controls: self.clock.controls(),
            };
            if let Err(err) = metronome.tick(&frame) {
                self.tick_failures += 1;
                error!(error = %err, beat = self.play_head, "metronome failed");
            }
        }
    }

    pub fn start(&mut self) {
        self.clock.start(&mut self.tracks);
        self.play_head = self.clock.beat_now();
        info!(beat = self.play_head, "transport started");
    }

    pub fn pause(&mut self) {
        self.clock.pause();
        debug!(beat = self.play_head, "transport paused");
    }

    /// Stop the clock and commit any captured take to every monitoring
    /// replay track.
    pub fn stop(&mut self) {
        if let Err(err) = self.clock.stop(&mut self.tracks) {
            self.report_failures("stop", err);
        }
        if let Some(metronome) = self.metronome.as_mut()
            && let Err(err) = metronome.stop()
        {
            warn!(error = %err, "failed to silence metronome");
        }
        self.play_head = self.clock.beat_now();

        if self.record_buffer.is_empty() {
            debug!("transport stopped, nothing captured");
            return;
        }

        let take = self.record_buffer.take();
        let mut committed = 0;
        for thing in &self.things {
            let Schedulable::Track(id) = thing else {
                continue;
            };
            let Some(track) = self.tracks.get_mut(id) else {
                continue;
            };
            if !track.is_recording() {
                continue;
            }

            let installed = match track.strategy_mut().as_replay_mut() {
                Some(replay) => {
                    replay.set_buffer(take.clone(), None);
                    true
                }
                None => false,
            };
            if installed {
                track.mark_changed();
                committed += 1;
            }
        }

        if committed > 0 {
            self.change();
        }
        info!(events = take.len(), tracks = committed, "take committed");
    }

    /// Arm or disarm global capture
    pub fn record(&mut self, recording: bool) {
        self.recording = recording;
        debug!(recording, "capture toggled");
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Beat position as of the last tick or transport change
    pub fn play_head(&self) -> f64 {
        self.play_head
    }

    pub fn beat_now(&self) -> f64 {
        self.clock.beat_now()
    }

    /// Number of track failures logged since creation
    pub fn tick_failures(&self) -> u64 {
        self.tick_failures
    }

    fn report_failures(&mut self, stage: &str, err: ClockError) {
        let ClockError::ClientFailures(failures) = err;
        for (track, err) in failures {
            self.tick_failures += 1;
            error!(stage, track = %track, error = %err, beat = self.clock.beat_now(), "track failed");
        }
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Capture an input event (when armed and running) and audition it on
    /// every monitoring track.
    pub fn handle_input(&mut self, data: &[u8]) {
        if self.recording && self.clock.is_running() {
            self.record_buffer.push(self.clock.beat_now(), data);
        }

        for thing in &self.things {
            let Schedulable::Track(id) = thing else {
                continue;
            };
            if let Some(track) = self.tracks.get_mut(id)
                && track.is_recording()
                && let Err(err) = track.forward_input(data)
            {
                warn!(track = %id, error = %err, "input forward failed");
            }
        }
    }

    /// Handle everything queued by the input thread. Returns the number of
    /// events handled.
    pub fn drain_input(&mut self, input: &mut InputConsumer) -> usize {
        let mut handled = 0;
        while let Some(event) = input.try_pop() {
            self.handle_input(&event);
            handled += 1;
        }
        handled
    }

    // ========================================================================
    // Track management
    // ========================================================================

    pub fn add_replay_track(&mut self, instrument: Option<&str>, slot: Slot) -> TrackId {
        let instrument = self.create_instrument(instrument);
        let track = Track::new(Strategy::Replay(ReplaySequencer::new()), instrument);
        self.install_track(track, slot)
    }

    /// Absent model dimensions come from the configured defaults and the
    /// clock's control signal count; an absent seed is derived
    /// deterministically from the base seed.
    pub fn add_generative_track(
        &mut self,
        instrument: Option<&str>,
        config: Option<ModelConfig>,
        slot: Slot,
    ) -> TrackId {
        let config = config.unwrap_or_default();
        let defaults = &self.config.model;
        let shape = config.resolve(
            defaults.n_out,
            &defaults.n_hidden,
            self.clock.control_signal_count(),
            || derive_seed(self.config.base_seed, self.tracks_created),
        );
        debug!(?shape, "generative model resolved");

        let sequencer = GenerativeSequencer::from_shape(&shape, self.config.mapper.clone());
        let instrument = self.create_instrument(instrument);
        let track = Track::new(Strategy::Generative(sequencer), instrument);
        self.install_track(track, slot)
    }

    fn create_instrument(&mut self, name: Option<&str>) -> Box<dyn Instrument> {
        let name = name.unwrap_or(&self.config.default_instrument).to_string();
        self.instruments.create(&name)
    }

    fn install_track(&mut self, mut track: Track, slot: Slot) -> TrackId {
        let id = track.id();
        if self.clock.is_running() {
            track.start(self.clock.beat_now());
        }
        info!(track = %id, name = track.name(), kind = ?track.kind(), ?slot, "track added");

        self.clock.add_client(id);
        self.ensemble.add(id);
        self.tracks.insert(id, track);
        let replaced = self.place(id, slot);
        self.tracks_created += 1;

        // Replacing the only soloed track ends the solo for everyone else
        let replaced_solo = replaced.is_some_and(|t| t.is_soloed());
        if replaced_solo || self.ensemble.soloed_count(&self.tracks) > 0 {
            self.ensemble.resolve(&mut self.tracks);
        }
        self.change();
        id
    }

    /// Put `id` in the schedulable collection. Returns the track it
    /// replaced, if any.
    fn place(&mut self, id: TrackId, slot: Slot) -> Option<Track> {
        let entry = Schedulable::Track(id);
        match slot {
            Slot::At(index) if index < self.things.len() => match self.things[index] {
                Schedulable::Track(previous) => {
                    let replaced = self.detach(previous);
                    self.things[index] = entry;
                    debug!(index, replaced = %previous, "slot overwritten");
                    replaced
                }
                Schedulable::Clock => {
                    warn!(index, "slot holds the clock, appending instead");
                    self.things.push(entry);
                    None
                }
            },
            _ => {
                self.things.push(entry);
                None
            }
        }
    }

    /// Drop every reference to a track except its schedulable slot
    fn detach(&mut self, id: TrackId) -> Option<Track> {
        self.clock.remove_client(id);
        self.ensemble.remove(id);
        self.pending_removals.retain(|&queued| queued != id);

        let mut track = self.tracks.remove(&id)?;
        if let Err(err) = track.stop() {
            warn!(track = %id, error = %err, "failed to silence removed track");
        }
        Some(track)
    }

    /// Remove a track completely. Returns false if it was not present.
    pub fn remove_track(&mut self, id: TrackId) -> bool {
        let position = self.things.iter().position(|&t| t == Schedulable::Track(id));
        let Some(track) = self.detach(id) else {
            return false;
        };
        if let Some(index) = position {
            self.things.remove(index);
        }
        info!(track = %id, name = track.name(), "track removed");

        if track.is_soloed() {
            self.ensemble.resolve(&mut self.tracks);
        }
        self.change();
        if self.ensemble.is_empty() {
            self.clock.set_record_id(None);
            debug!("ensemble empty, composition reset to unsaved");
        }
        true
    }

    /// Queue a removal for the start of the next tick. Safe to call while a
    /// fan-out is in progress.
    pub fn request_removal(&mut self, id: TrackId) {
        if !self.pending_removals.contains(&id) {
            self.pending_removals.push_back(id);
        }
    }

    pub fn pending_removals(&self) -> usize {
        self.pending_removals.len()
    }

    /// Apply queued removals now. Returns the number of tracks removed.
    pub fn apply_pending_removals(&mut self) -> usize {
        let mut removed = 0;
        while let Some(id) = self.pending_removals.pop_front() {
            if self.remove_track(id) {
                removed += 1;
            }
        }
        removed
    }

    /// Replace a replay track's timeline. Returns false for unknown or
    /// generative tracks.
    pub fn set_timeline(&mut self, id: TrackId, events: Vec<StampedEvent>) -> bool {
        let Some(track) = self.tracks.get_mut(&id) else {
            return false;
        };
        let Some(replay) = track.strategy_mut().as_replay_mut() else {
            return false;
        };
        replay.set_buffer(events, None);
        track.mark_changed();
        self.change();
        true
    }

    // ========================================================================
    // Metronome
    // ========================================================================

    /// Turn the click on or off. The metronome instrument is created the
    /// first time it is enabled.
    pub fn set_metronome(&mut self, enabled: bool) {
        if let Some(metronome) = self.metronome.as_mut() {
            metronome.set_enabled(enabled);
        } else if enabled {
            let name = self.config.metronome_instrument.clone();
            let instrument = self.instruments.create(&name);
            self.metronome = Some(Metronome::new(instrument, self.config.beats_per_bar));
        }
        debug!(enabled, "metronome toggled");
    }

    pub fn metronome(&self) -> Option<&Metronome> {
        self.metronome.as_ref()
    }

    // ========================================================================
    // Solo / mute / monitor
    // ========================================================================

    pub fn solo(&mut self, id: TrackId) -> bool {
        self.ensemble.solo(id, &mut self.tracks)
    }

    pub fn toggle_mute(&mut self, id: TrackId) -> bool {
        self.ensemble.toggle_mute(id, &mut self.tracks)
    }

    pub fn set_track_recording(&mut self, id: TrackId, recording: bool) -> bool {
        match self.tracks.get_mut(&id) {
            Some(track) => {
                track.set_recording(recording);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    /// Tracks in schedulable order
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.things.iter().filter_map(|thing| match thing {
            Schedulable::Track(id) => self.tracks.get(id),
            Schedulable::Clock => None,
        })
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn things(&self) -> &[Schedulable] {
        &self.things
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub(crate) fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        let tempo = Tempo::new(bpm);
        if tempo != self.clock.tempo() {
            self.clock.set_tempo(tempo);
            self.change();
        }
    }

    pub fn record_buffer(&self) -> &RecordBuffer {
        &self.record_buffer
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.change();
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        self.record_id.as_ref()
    }

    pub(crate) fn set_record_id(&mut self, id: Option<RecordId>) {
        self.record_id = id;
    }

    /// Whether the stored copy matches the current state
    pub fn is_saved(&self) -> bool {
        self.record_id.is_some()
    }

    /// Something changed; the stored copy is stale
    pub fn change(&mut self) {
        if self.record_id.take().is_some() {
            debug!(title = %self.title, "composition modified");
        }
    }
}

impl std::fmt::Debug for Composition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composition")
            .field("title", &self.title)
            .field("things", &self.things)
            .field("recording", &self.recording)
            .field("play_head", &self.play_head)
            .field("record_id", &self.record_id)
            .finish()
    }
}

/// splitmix64 over the base seed and a creation counter
fn derive_seed(base: u64, serial: u64) -> u64 {
    let mut z = base ^ serial.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
