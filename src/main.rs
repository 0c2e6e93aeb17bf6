use composer_core::sequencer::StrategyKind;
use composer_core::{
    ComposerConfig, Composition, LoggingFactory, MemoryStore, MidiEvent, ProjectManager, Slot,
    StampedEvent, create_input_channel, push_input,
};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_BEATS: u32 = 8;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("composer_core=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => match ComposerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path, error = %e, "failed to load configuration");
                return;
            }
        },
        None => ComposerConfig::default(),
    };
    let beats = args
        .get(2)
        .and_then(|arg| arg.parse::<u32>().ok())
        .unwrap_or(DEFAULT_BEATS);

    let (mut input_tx, mut input_rx) = create_input_channel(config.input_queue_capacity);
    let mut composition = Composition::new(config, Box::new(LoggingFactory));

    // A replay track seeded with an arpeggio, a generative track alongside it,
    // and a monitoring track that will receive the live take on stop
    let arpeggio = composition.add_replay_track(Some("piano"), Slot::Append);
    composition.set_timeline(arpeggio, arpeggio_events(beats));
    composition.add_generative_track(None, None, Slot::Append);
    let monitor = composition.add_replay_track(Some("vibes"), Slot::Append);
    composition.set_track_recording(monitor, true);

    // Stand-in for a device callback on its own thread
    let interval = composition.clock().tick_interval();
    let input_thread = std::thread::spawn(move || {
        for note in [64u8, 67, 71] {
            std::thread::sleep(interval * 8);
            let on = MidiEvent::NoteOn {
                channel: 0,
                note,
                velocity: 90,
            };
            push_input(&mut input_tx, &on.to_bytes());
            std::thread::sleep(interval * 4);
            push_input(&mut input_tx, &MidiEvent::note_off(0, note));
        }
    });

    composition.set_metronome(true);
    composition.record(true);
    composition.start();
    info!(beats, interval_ms = interval.as_secs_f64() * 1000.0, "playing");

    let mut next = Instant::now();
    while composition.play_head() < f64::from(beats) {
        composition.drain_input(&mut input_rx);
        composition.tick();

        next += composition.clock().tick_interval();
        let now = Instant::now();
        if next > now {
            std::thread::sleep(next - now);
        } else {
            next = now;
        }
    }

    if input_thread.join().is_err() {
        error!("input thread panicked");
    }
    composition.drain_input(&mut input_rx);
    composition.stop();

    let mut store = MemoryStore::new();
    match ProjectManager::new(&mut store).save(&mut composition) {
        Ok(song) => info!(song = %song, "saved"),
        Err(e) => error!(error = %e, "save failed"),
    }

    for track in composition.tracks() {
        let events = match track.kind() {
            StrategyKind::Replay => track
                .strategy()
                .as_replay()
                .map_or(0, |replay| replay.events().len()),
            StrategyKind::Generative => 0,
        };
        info!(track = %track.id(), name = track.name(), kind = ?track.kind(), events, "summary");
    }
    info!(failures = composition.tick_failures(), "done");
}

/// Up-and-down arpeggio, one note per half beat
fn arpeggio_events(beats: u32) -> Vec<StampedEvent> {
    const NOTES: [u8; 6] = [60, 64, 67, 72, 67, 64];
    (0..beats * 2)
        .flat_map(|step| {
            let note = NOTES[step as usize % NOTES.len()];
            let beat = f64::from(step) * 0.5;
            let on = MidiEvent::NoteOn {
                channel: 0,
                note,
                velocity: 100,
            };
            [
                StampedEvent::new(beat, on.to_bytes()),
                StampedEvent::new(beat + 0.4, MidiEvent::note_off(0, note)),
            ]
        })
        .collect()
}
