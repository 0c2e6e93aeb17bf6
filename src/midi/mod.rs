// MIDI helpers for raw performance events

pub mod event;

pub use event::{MidiEvent, SoundingNotes};
