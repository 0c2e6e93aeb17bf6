// Replay sequencer - plays back a recorded timeline of raw events

use super::clock::ClockFrame;
use super::recording::StampedEvent;
use super::strategy::{ExportsTimeline, PlaybackStrategy};
use super::track::TrackError;
use crate::instrument::Instrument;
use crate::midi::SoundingNotes;

/// Replays `(beat, event)` pairs as the clock passes them
#[derive(Debug, Default, Clone)]
pub struct ReplaySequencer {
    /// Timeline, sorted by beat
    events: Vec<StampedEvent>,

    /// Index of the next event to play
    cursor: usize,

    /// Store key of the persisted timeline, None when not yet persisted
    source_key: Option<String>,

    /// Notes started by this sequencer and not yet released
    sounding: SoundingNotes,
}

impl ReplaySequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole timeline
    ///
    /// Used both when loading persisted data and when committing a take.
    /// Events are re-sorted by beat (stable, so simultaneous events keep
    /// their order) and playback restarts from the top.
    pub fn set_buffer(&mut self, mut events: Vec<StampedEvent>, source_key: Option<String>) {
        events.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        self.events = events;
        self.cursor = 0;
        self.source_key = source_key;
    }

    pub fn events(&self) -> &[StampedEvent] {
        &self.events
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Move the cursor to the first event at or after `beat`
    fn seek(&mut self, beat: f64) {
        self.cursor = self.events.partition_point(|e| e.beat < beat);
    }
}

impl PlaybackStrategy for ReplaySequencer {
    fn tick(
        &mut self,
        frame: &ClockFrame<'_>,
        instrument: &mut dyn Instrument,
    ) -> Result<(), TrackError> {
        // Everything stamped before the new beat has been reached. The cursor
        // moves before playing so a rejected event is not retried forever.
        while let Some(event) = self.events.get(self.cursor) {
            if event.beat >= frame.beat {
                break;
            }
            self.cursor += 1;
            instrument.play_event(&event.data, 0.0)?;
            self.sounding.observe(&event.data);
        }
        Ok(())
    }

    fn start(&mut self, beat: f64) {
        self.seek(beat);
    }

    fn stop(&mut self, instrument: &mut dyn Instrument) -> Result<(), TrackError> {
        self.cursor = 0;
        for note_off in self.sounding.drain_note_offs() {
            instrument.play_event(&note_off, 0.0)?;
        }
        Ok(())
    }
}

impl ExportsTimeline for ReplaySequencer {
    fn timeline(&self) -> &[StampedEvent] {
        &self.events
    }

    fn source_key(&self) -> Option<&str> {
        self.source_key.as_deref()
    }

    fn set_source_key(&mut self, key: Option<String>) {
        self.source_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::CapturingInstrument;

    fn frame(previous_beat: f64, beat: f64) -> ClockFrame<'static> {
        ClockFrame {
            previous_beat,
            beat,
            controls: &[],
        }
    }

    fn melody() -> Vec<StampedEvent> {
        vec![
            StampedEvent::new(1.0, vec![0x90, 62, 90]),
            StampedEvent::new(0.0, vec![0x90, 60, 100]),
            StampedEvent::new(0.5, vec![0x80, 60, 0]),
        ]
    }

    #[test]
    fn test_set_buffer_sorts_and_rewinds() {
        let mut seq = ReplaySequencer::new();
        seq.set_buffer(melody(), Some("midi-1".to_string()));

        let beats: Vec<f64> = seq.events().iter().map(|e| e.beat).collect();
        assert_eq!(beats, vec![0.0, 0.5, 1.0]);
        assert_eq!(seq.source_key(), Some("midi-1"));
        assert_eq!(seq.cursor(), 0);
    }

    #[test]
    fn test_tick_emits_events_once_reached() {
        let mut seq = ReplaySequencer::new();
        seq.set_buffer(melody(), None);
        let (mut inst, probe) = CapturingInstrument::new("piano");

        seq.tick(&frame(0.0, 0.25), &mut inst).unwrap();
        assert_eq!(probe.events(), vec![vec![0x90, 60, 100]]);

        seq.tick(&frame(0.25, 0.5), &mut inst).unwrap();
        assert_eq!(probe.events().len(), 1);

        seq.tick(&frame(0.5, 0.75), &mut inst).unwrap();
        assert_eq!(probe.events().len(), 2);

        seq.tick(&frame(0.75, 2.0), &mut inst).unwrap();
        assert_eq!(probe.events().len(), 3);
        assert_eq!(seq.cursor(), 3);
    }

    #[test]
    fn test_start_seeks_to_beat() {
        let mut seq = ReplaySequencer::new();
        seq.set_buffer(melody(), None);
        seq.start(0.5);
        assert_eq!(seq.cursor(), 1);
    }

    #[test]
    fn test_stop_releases_hanging_notes() {
        let mut seq = ReplaySequencer::new();
        seq.set_buffer(melody(), None);
        let (mut inst, probe) = CapturingInstrument::new("piano");

        seq.tick(&frame(0.0, 2.0), &mut inst).unwrap();
        probe.clear();

        seq.stop(&mut inst).unwrap();
        assert_eq!(probe.events(), vec![vec![0x80, 62, 0]]);
        assert_eq!(seq.cursor(), 0);
    }

    #[test]
    fn test_failing_instrument_does_not_stall_cursor() {
        let mut seq = ReplaySequencer::new();
        seq.set_buffer(melody(), None);
        let (mut inst, probe) = CapturingInstrument::new("piano");
        probe.set_failing(true);

        assert!(seq.tick(&frame(0.0, 0.25), &mut inst).is_err());
        assert_eq!(seq.cursor(), 1);

        probe.set_failing(false);
        seq.tick(&frame(0.25, 0.75), &mut inst).unwrap();
        assert_eq!(probe.events(), vec![vec![0x80, 60, 0]]);
    }
}
