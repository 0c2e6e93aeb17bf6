// Project manager for saving and loading compositions
//
// Every schedulable entity is filed under `players` with a `type`
// discriminator; a song record maps those ids to their positions. Saving is
// idempotent: anything that still holds an identity is unchanged since it was
// last stored and is not written again.

use crate::composition::{Composition, Schedulable, Slot};
use crate::project::store::{RecordId, Store, StoreError};
use crate::project::types::*;
use crate::sequencer::clock::Clock;
use crate::sequencer::generative::ModelConfig;
use crate::sequencer::recording::StampedEvent;
use crate::sequencer::strategy::{ExportsTimeline, StrategyKind};
use crate::sequencer::timeline::Tempo;
use crate::sequencer::track::Track;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Project error types
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing record {id} in {collection}")]
    MissingRecord { collection: String, id: RecordId },

    #[error("Unknown entity type: {0:?}")]
    UnknownType(String),

    #[error("Invalid project structure: {0}")]
    InvalidStructure(String),
}

/// Outcome of a load. Entries that failed are skipped, not fatal.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<(RecordId, ProjectError)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Project manager - handles saving/loading compositions against a store
pub struct ProjectManager<'a> {
    store: &'a mut dyn Store,
}

impl<'a> ProjectManager<'a> {
    pub fn new(store: &'a mut dyn Store) -> Self {
        Self { store }
    }

    // ========================================================================
    // Save
    // ========================================================================

    /// Save the composition and return the song id
    pub fn save(&mut self, composition: &mut Composition) -> Result<RecordId, ProjectError> {
        if let Some(id) = composition.record_id() {
            debug!(song = %id, "composition unchanged, not saved");
            return Ok(id.clone());
        }

        let mut song = SongRecord::new();
        let things = composition.things().to_vec();
        for (position, thing) in things.into_iter().enumerate() {
            let id = match thing {
                Schedulable::Clock => self.save_clock(composition.clock_mut())?,
                Schedulable::Track(track_id) => match composition.track_mut(track_id) {
                    Some(track) => self.save_track(track)?,
                    None => {
                        return Err(ProjectError::InvalidStructure(format!(
                            "{track_id} is scheduled but not owned"
                        )));
                    }
                },
            };
            song.insert(id, position);
        }

        let song_id = self.store.insert(SONGS, serde_json::to_value(&song)?)?;
        let info = SongInfo {
            title: composition.title().to_string(),
            modified: chrono::Utc::now().to_rfc3339(),
        };
        self.store
            .insert_with_id(SONG_INFO, &song_id, serde_json::to_value(&info)?)?;

        composition.set_record_id(Some(song_id.clone()));
        info!(song = %song_id, title = %info.title, entities = song.len(), "composition saved");
        Ok(song_id)
    }

    pub fn save_track(&mut self, track: &mut Track) -> Result<RecordId, ProjectError> {
        if let Some(id) = track.record_id() {
            return Ok(id.clone());
        }

        let inst = Some(track.name().to_string());
        let kind = track.kind().type_name().to_string();
        let record = match track.kind() {
            StrategyKind::Replay => {
                let midi = match track.strategy_mut().as_timeline_mut() {
                    Some(timeline) => self.save_timeline(timeline)?,
                    None => None,
                };
                serde_json::to_value(ReplayRecord {
                    kind,
                    inst,
                    midi,
                })?
            }
            StrategyKind::Generative => {
                let config = track
                    .strategy()
                    .as_generative()
                    .map(|generative| generative.config().clone())
                    .unwrap_or_default();
                let net = self.store.insert(NET, serde_json::to_value(&config)?)?;
                let ai = self
                    .store
                    .insert(AI, serde_json::to_value(AiRecord { net })?)?;
                serde_json::to_value(GenerativeRecord {
                    kind,
                    inst,
                    ai,
                })?
            }
        };

        let id = self.store.insert(PLAYERS, record)?;
        debug!(track = %track.id(), record = %id, "track saved");
        track.set_record_id(Some(id.clone()));
        Ok(id)
    }

    /// Store a timeline unless it already came from the store. Empty
    /// timelines are not stored.
    fn save_timeline(
        &mut self,
        timeline: &mut dyn ExportsTimeline,
    ) -> Result<Option<RecordId>, ProjectError> {
        if let Some(key) = timeline.source_key() {
            return Ok(Some(RecordId::from(key)));
        }
        if timeline.timeline().is_empty() {
            return Ok(None);
        }

        let id = self
            .store
            .insert(MIDI, serde_json::to_value(timeline.timeline())?)?;
        timeline.set_source_key(Some(id.to_string()));
        Ok(Some(id))
    }

    pub fn save_clock(&mut self, clock: &mut Clock) -> Result<RecordId, ProjectError> {
        if let Some(id) = clock.record_id() {
            return Ok(id.clone());
        }

        let record = ClockRecord {
            kind: TYPE_CLOCK.to_string(),
            ticks_per_beat: clock.ticks_per_beat(),
            bpm: clock.tempo().bpm(),
        };
        let id = self.store.insert(PLAYERS, serde_json::to_value(record)?)?;
        clock.set_record_id(Some(id.clone()));
        Ok(id)
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Restore a saved song into `composition`. Each entry is placed at its
    /// saved position, overwriting a track already there.
    pub fn load(
        &mut self,
        composition: &mut Composition,
        song_id: &RecordId,
    ) -> Result<LoadReport, ProjectError> {
        let song: SongRecord = self.fetch_as(SONGS, song_id)?;
        let mut entries: Vec<(usize, RecordId)> =
            song.into_iter().map(|(id, position)| (position, id)).collect();
        entries.sort();

        let mut report = LoadReport::default();
        for (position, id) in entries {
            match self.load_entry(composition, position, &id) {
                Ok(()) => report.loaded += 1,
                Err(err) => {
                    warn!(record = %id, position, error = %err, "entry skipped");
                    report.skipped.push((id, err));
                }
            }
        }

        if let Some(value) = self.store.fetch(SONG_INFO, song_id)? {
            let info: SongInfo = serde_json::from_value(value)?;
            composition.set_title(info.title);
        }
        composition.set_record_id(Some(song_id.clone()));

        info!(
            song = %song_id,
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "composition loaded"
        );
        Ok(report)
    }

    fn load_entry(
        &mut self,
        composition: &mut Composition,
        position: usize,
        id: &RecordId,
    ) -> Result<(), ProjectError> {
        let value: Value = self.fetch_as(PLAYERS, id)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match kind.as_str() {
            TYPE_REPLAY => {
                let record: ReplayRecord = serde_json::from_value(value)?;
                let timeline = match record.midi {
                    Some(key) => {
                        let events: Vec<StampedEvent> = self.fetch_as(MIDI, &key)?;
                        Some((events, key))
                    }
                    None => None,
                };

                let track_id =
                    composition.add_replay_track(record.inst.as_deref(), Slot::At(position));
                if let Some(track) = composition.track_mut(track_id) {
                    if let Some((events, key)) = timeline
                        && let Some(replay) = track.strategy_mut().as_replay_mut()
                    {
                        replay.set_buffer(events, Some(key.to_string()));
                    }
                    track.set_record_id(Some(id.clone()));
                }
            }
            TYPE_GENERATIVE => {
                let record: GenerativeRecord = serde_json::from_value(value)?;
                let ai: AiRecord = self.fetch_as(AI, &record.ai)?;
                let config: ModelConfig = self.fetch_as(NET, &ai.net)?;

                let track_id = composition.add_generative_track(
                    record.inst.as_deref(),
                    Some(config),
                    Slot::At(position),
                );
                if let Some(track) = composition.track_mut(track_id) {
                    track.set_record_id(Some(id.clone()));
                }
            }
            TYPE_CLOCK => {
                let record: ClockRecord = serde_json::from_value(value)?;
                let clock = composition.clock_mut();
                if !clock.set_ticks_per_beat(record.ticks_per_beat) {
                    warn!(
                        ticks_per_beat = record.ticks_per_beat,
                        "clock running, resolution not restored"
                    );
                }
                clock.set_tempo(Tempo::new(record.bpm));
                clock.set_record_id(Some(id.clone()));
            }
            other => return Err(ProjectError::UnknownType(other.to_string())),
        }
        Ok(())
    }

    fn fetch_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<T, ProjectError> {
        let value = self
            .store
            .fetch(collection, id)?
            .ok_or_else(|| ProjectError::MissingRecord {
                collection: collection.to_string(),
                id: id.clone(),
            })?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComposerConfig;
    use crate::instrument::CapturingFactory;
    use crate::project::store::MemoryStore;
    use serde_json::json;

    fn composition() -> Composition {
        Composition::new(ComposerConfig::default(), Box::new(CapturingFactory::new()))
    }

    #[test]
    fn test_save_is_idempotent() {
        let mut store = MemoryStore::new();
        let mut song = composition();
        song.add_replay_track(Some("piano"), Slot::Append);

        let mut manager = ProjectManager::new(&mut store);
        let first = manager.save(&mut song).unwrap();
        let second = manager.save(&mut song).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(SONGS), 1);
        assert_eq!(store.len(PLAYERS), 2);
    }

    #[test]
    fn test_resave_after_change_reuses_unchanged_entities() {
        let mut store = MemoryStore::new();
        let mut song = composition();
        song.add_replay_track(Some("piano"), Slot::Append);

        let mut manager = ProjectManager::new(&mut store);
        let first = manager.save(&mut song).unwrap();
        song.set_title("Second draft");
        let second = manager.save(&mut song).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.len(SONGS), 2);
        assert_eq!(store.len(PLAYERS), 2);
    }

    #[test]
    fn test_clock_record_shape() {
        let mut store = MemoryStore::new();
        let mut clock = Clock::new(24, Tempo::new(90.0), vec![1.0]);
        let id = ProjectManager::new(&mut store).save_clock(&mut clock).unwrap();

        assert_eq!(
            store.fetch(PLAYERS, &id).unwrap(),
            Some(json!({"type": "Clock", "ticksPerBeat": 24, "bpm": 90.0}))
        );
        assert_eq!(clock.record_id(), Some(&id));
    }

    #[test]
    fn test_generative_config_round_trip() {
        let mut store = MemoryStore::new();
        let mut song = composition();
        let config = ModelConfig {
            n_out: Some(8),
            n_hidden: Some(vec![6]),
            n_in: None,
            seed: Some(99),
        };
        song.add_generative_track(Some("bells"), Some(config), Slot::Append);
        let song_id = ProjectManager::new(&mut store).save(&mut song).unwrap();

        let mut restored = composition();
        let report = ProjectManager::new(&mut store)
            .load(&mut restored, &song_id)
            .unwrap();
        assert!(report.is_complete());

        let track = restored.tracks().next().unwrap();
        assert_eq!(track.name(), "bells");
        let config = track.strategy().as_generative().unwrap().config();
        assert_eq!(config.n_out, Some(8));
        assert_eq!(config.n_hidden, Some(vec![6]));
        assert_eq!(config.seed, Some(99));
    }

    #[test]
    fn test_missing_song_is_an_error() {
        let mut store = MemoryStore::new();
        let mut song = composition();
        let err = ProjectManager::new(&mut store)
            .load(&mut song, &RecordId::from("nope"))
            .unwrap_err();
        assert!(matches!(err, ProjectError::MissingRecord { .. }));
    }

    #[test]
    fn test_missing_timeline_skips_entry() {
        let mut store = MemoryStore::new();
        let player = store
            .insert(
                PLAYERS,
                json!({"type": "ReplaySequencer", "inst": "piano", "midi": "gone"}),
            )
            .unwrap();
        let mut entries = serde_json::Map::new();
        entries.insert(player.to_string(), json!(1));
        let song_id = store.insert(SONGS, Value::Object(entries)).unwrap();

        let mut song = composition();
        let report = ProjectManager::new(&mut store)
            .load(&mut song, &song_id)
            .unwrap();

        assert_eq!(report.loaded, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(song.track_count(), 0);
    }
}
