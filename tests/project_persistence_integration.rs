// Save / load round trips against the in-memory and file-backed store

use composer_core::instrument::CapturingFactory;
use composer_core::project::types::{PLAYERS, SONG_INFO, SONGS};
use composer_core::sequencer::StrategyKind;
use composer_core::{
    ComposerConfig, Composition, MemoryStore, ModelConfig, ProjectError, ProjectManager, RecordId,
    Schedulable, Slot, StampedEvent, Store,
};
use serde_json::{Value, json};

fn composition() -> Composition {
    Composition::new(ComposerConfig::default(), Box::new(CapturingFactory::new()))
}

fn riff() -> Vec<StampedEvent> {
    vec![
        StampedEvent::new(0.0, vec![0x90, 48, 100]),
        StampedEvent::new(0.75, vec![0x80, 48, 0]),
        StampedEvent::new(1.0, vec![0x90, 51, 90]),
    ]
}

/// Clock, a replay track with a riff, a generative track
fn demo_song() -> Composition {
    let mut song = composition();
    song.set_title("Night Drive");
    song.set_tempo(96.0);

    let bass = song.add_replay_track(Some("bass"), Slot::Append);
    assert!(song.set_timeline(bass, riff()));

    let config = ModelConfig {
        seed: Some(1234),
        ..Default::default()
    };
    song.add_generative_track(Some("bells"), Some(config), Slot::Append);
    song
}

fn song_record(store: &MemoryStore, id: &RecordId) -> serde_json::Map<String, Value> {
    match store.fetch(SONGS, id).unwrap() {
        Some(Value::Object(map)) => map,
        other => panic!("unexpected song record {other:?}"),
    }
}

#[test]
fn test_round_trip_restores_everything() {
    let mut store = MemoryStore::new();
    let mut song = demo_song();
    let song_id = ProjectManager::new(&mut store).save(&mut song).unwrap();
    assert!(song.is_saved());

    let mut restored = composition();
    let report = ProjectManager::new(&mut store)
        .load(&mut restored, &song_id)
        .unwrap();

    assert_eq!(report.loaded, 3);
    assert!(report.is_complete());
    assert_eq!(restored.title(), "Night Drive");
    assert_eq!(restored.clock().tempo().bpm(), 96.0);
    assert_eq!(restored.record_id(), Some(&song_id));
    assert!(restored.is_saved());

    let tracks: Vec<_> = restored.tracks().collect();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].name(), "bass");
    assert_eq!(tracks[0].kind(), StrategyKind::Replay);
    assert_eq!(tracks[0].strategy().as_replay().unwrap().events(), riff().as_slice());
    assert_eq!(tracks[1].name(), "bells");
    assert_eq!(
        tracks[1].strategy().as_generative().unwrap().config().seed,
        Some(1234)
    );
}

#[test]
fn test_song_record_positions() {
    let mut store = MemoryStore::new();
    let mut song = demo_song();
    let song_id = ProjectManager::new(&mut store).save(&mut song).unwrap();

    let mut positions: Vec<u64> = song_record(&store, &song_id)
        .values()
        .filter_map(Value::as_u64)
        .collect();
    positions.sort();
    assert_eq!(positions, vec![0, 1, 2]);

    let info = store.fetch(SONG_INFO, &song_id).unwrap().unwrap();
    assert_eq!(info["title"], "Night Drive");
    let modified = info["modified"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(modified).is_ok());
}

#[test]
fn test_saving_a_loaded_song_writes_nothing() {
    let mut store = MemoryStore::new();
    let mut song = demo_song();
    let song_id = ProjectManager::new(&mut store).save(&mut song).unwrap();

    let mut restored = composition();
    ProjectManager::new(&mut store)
        .load(&mut restored, &song_id)
        .unwrap();
    let players = store.len(PLAYERS);

    let again = ProjectManager::new(&mut store).save(&mut restored).unwrap();
    assert_eq!(again, song_id);
    assert_eq!(store.len(PLAYERS), players);
    assert_eq!(store.len(SONGS), 1);
}

#[test]
fn test_loaded_timeline_is_not_stored_twice() {
    let mut store = MemoryStore::new();
    let mut song = demo_song();
    let song_id = ProjectManager::new(&mut store).save(&mut song).unwrap();

    let mut restored = composition();
    ProjectManager::new(&mut store)
        .load(&mut restored, &song_id)
        .unwrap();
    let first = restored.tracks().next().unwrap().id();
    restored.track_mut(first).unwrap().mark_changed();
    restored.change();

    ProjectManager::new(&mut store).save(&mut restored).unwrap();
    assert_eq!(store.len("midi"), 1);
    assert_eq!(store.len(SONGS), 2);
}

#[test]
fn test_unknown_type_is_skipped() {
    let mut store = MemoryStore::new();
    let mut song = demo_song();
    let song_id = ProjectManager::new(&mut store).save(&mut song).unwrap();

    let stranger = store
        .insert(PLAYERS, json!({"type": "DrumMachine", "pads": 16}))
        .unwrap();
    let mut record = song_record(&store, &song_id);
    record.insert(stranger.to_string(), json!(3));
    store
        .insert_with_id(SONGS, &song_id, Value::Object(record))
        .unwrap();

    let mut restored = composition();
    let report = ProjectManager::new(&mut store)
        .load(&mut restored, &song_id)
        .unwrap();

    assert_eq!(report.loaded, 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, stranger);
    assert!(matches!(
        &report.skipped[0].1,
        ProjectError::UnknownType(kind) if kind == "DrumMachine"
    ));
    assert_eq!(restored.track_count(), 2);
}

#[test]
fn test_load_overwrites_occupied_slots() {
    let mut store = MemoryStore::new();
    let mut song = demo_song();
    let song_id = ProjectManager::new(&mut store).save(&mut song).unwrap();

    let mut target = composition();
    let occupant = target.add_replay_track(Some("kazoo"), Slot::Append);
    ProjectManager::new(&mut store)
        .load(&mut target, &song_id)
        .unwrap();

    assert!(target.track(occupant).is_none());
    assert!(!target.clock().has_client(occupant));
    assert_eq!(target.things().len(), 3);
    assert_eq!(target.things()[0], Schedulable::Clock);
    let names: Vec<_> = target.tracks().map(|t| t.name().to_string()).collect();
    assert_eq!(names, vec!["bass", "bells"]);
}

#[test]
fn test_file_backed_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("songs.json");

    let mut store = MemoryStore::new();
    let mut song = demo_song();
    let song_id = ProjectManager::new(&mut store).save(&mut song).unwrap();
    store.save_to_path(&path).unwrap();

    let mut reopened = MemoryStore::load_from_path(&path).unwrap();
    let mut restored = composition();
    let report = ProjectManager::new(&mut reopened)
        .load(&mut restored, &song_id)
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(restored.title(), "Night Drive");
    assert_eq!(restored.track_count(), 2);
}

#[test]
fn test_removing_last_track_marks_unsaved() {
    let mut store = MemoryStore::new();
    let mut song = composition();
    let id = song.add_replay_track(None, Slot::Append);
    ProjectManager::new(&mut store).save(&mut song).unwrap();
    assert!(song.is_saved());

    song.remove_track(id);
    assert!(!song.is_saved());
    assert!(song.clock().record_id().is_none());
    assert!(song.ensemble().is_empty());
}
