// Metronome - click track driven by the clock
// Sends a short MIDI note to its own instrument on every beat; the first beat
// of each bar is accented.

use super::clock::{ClockClient, ClockFrame};
use super::track::TrackError;
use crate::instrument::Instrument;
use crate::midi::event::MidiEvent;

/// General MIDI percussion channel
const CLICK_CHANNEL: u8 = 9;
/// High wood block
const ACCENT_NOTE: u8 = 76;
/// Low wood block
const REGULAR_NOTE: u8 = 77;
const ACCENT_VELOCITY: u8 = 110;
const REGULAR_VELOCITY: u8 = 80;

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// Click on first beat of bar (accent/downbeat)
    Accent,
    /// Click on other beats
    Regular,
}

impl ClickType {
    fn note_on(&self) -> [u8; 3] {
        let (note, velocity) = match self {
            ClickType::Accent => (ACCENT_NOTE, ACCENT_VELOCITY),
            ClickType::Regular => (REGULAR_NOTE, REGULAR_VELOCITY),
        };
        MidiEvent::NoteOn {
            channel: CLICK_CHANNEL,
            note,
            velocity,
        }
        .to_bytes()
    }
}

/// First whole beat in `[previous_beat, beat)`, with its click type
pub fn click_in(previous_beat: f64, beat: f64, beats_per_bar: u32) -> Option<(u64, ClickType)> {
    let next = previous_beat.max(0.0).ceil();
    if next >= beat {
        return None;
    }
    let number = next as u64;
    let click = if number % u64::from(beats_per_bar.max(1)) == 0 {
        ClickType::Accent
    } else {
        ClickType::Regular
    };
    Some((number, click))
}

pub struct Metronome {
    instrument: Box<dyn Instrument>,
    enabled: bool,
    beats_per_bar: u32,
    /// Click note still sounding, released on the next tick
    sounding: Option<u8>,
}

impl Metronome {
    pub fn new(instrument: Box<dyn Instrument>, beats_per_bar: u32) -> Self {
        Self {
            instrument,
            enabled: true,
            beats_per_bar: beats_per_bar.max(1),
            sounding: None,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn instrument(&self) -> &dyn Instrument {
        self.instrument.as_ref()
    }

    fn release(&mut self) -> Result<(), TrackError> {
        if let Some(note) = self.sounding.take() {
            self.instrument
                .play_event(&MidiEvent::note_off(CLICK_CHANNEL, note), 0.0)?;
        }
        Ok(())
    }
}

impl ClockClient for Metronome {
    fn tick(&mut self, frame: &ClockFrame<'_>) -> Result<(), TrackError> {
        self.release()?;
        if !self.enabled {
            return Ok(());
        }

        if let Some((_, click)) = click_in(frame.previous_beat, frame.beat, self.beats_per_bar) {
            let message = click.note_on();
            self.sounding = Some(message[1]);
            self.instrument.play_event(&message, 0.0)?;
        }
        Ok(())
    }

    fn start(&mut self, _beat: f64) {}

    fn stop(&mut self) -> Result<(), TrackError> {
        self.release()
    }
}

impl std::fmt::Debug for Metronome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metronome")
            .field("instrument", &self.instrument.name())
            .field("enabled", &self.enabled)
            .field("beats_per_bar", &self.beats_per_bar)
            .finish()
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

    #[test]
    fn test_click_windows() {
        assert_eq!(click_in(0.0, 0.25, 4), Some((0, ClickType::Accent)));
        assert_eq!(click_in(0.75, 1.0, 4), None);
        assert_eq!(click_in(1.0, 1.25, 4), Some((1, ClickType::Regular)));
        assert_eq!(click_in(3.9, 4.1, 4), Some((4, ClickType::Accent)));
        assert_eq!(click_in(2.0, 2.0, 4), None);
    }

    #[test]
    fn test_click_then_release() {
        let (inst, probe) = CapturingInstrument::new("click");
        let mut metronome = Metronome::new(Box::new(inst), 4);

        metronome.tick(&frame(0.0, 0.5)).unwrap();
        metronome.tick(&frame(0.5, 1.0)).unwrap();
        metronome.tick(&frame(1.0, 1.5)).unwrap();

        assert_eq!(
            probe.events(),
            vec![
                vec![0x99, ACCENT_NOTE, ACCENT_VELOCITY],
                vec![0x89, ACCENT_NOTE, 0],
                vec![0x99, REGULAR_NOTE, REGULAR_VELOCITY],
            ]
        );

        metronome.stop().unwrap();
        assert_eq!(probe.events().last(), Some(&vec![0x89, REGULAR_NOTE, 0]));
    }

    #[test]
    fn test_disabled_metronome_is_silent() {
        let (inst, probe) = CapturingInstrument::new("click");
        let mut metronome = Metronome::new(Box::new(inst), 3);
        metronome.set_enabled(false);

        metronome.tick(&frame(0.0, 0.5)).unwrap();
        assert!(probe.events().is_empty());
    }
}
