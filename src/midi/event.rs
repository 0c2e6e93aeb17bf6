// MIDI message parsing for raw performance events
// Raw events travel through the sequencer as opaque bytes; this module only
// interprets them where note bookkeeping is needed (hanging notes on stop).

/// Channel voice messages the sequencer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: i16 },
}

impl MidiEvent {
    /// Parse a raw MIDI message. Returns None for anything that is not a
    /// complete channel voice message we understand.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if data.len() < 2 {
            return None;
        }

        let channel = status & 0x0F;
        match status & 0xF0 {
            0x90 if data[1] == 0 => Some(MidiEvent::NoteOff {
                channel,
                note: data[0],
            }),
            0x90 => Some(MidiEvent::NoteOn {
                channel,
                note: data[0],
                velocity: data[1],
            }),
            0x80 => Some(MidiEvent::NoteOff {
                channel,
                note: data[0],
            }),
            0xB0 => Some(MidiEvent::ControlChange {
                channel,
                controller: data[0],
                value: data[1],
            }),
            0xE0 => {
                let lsb = (data[0] & 0x7F) as i16;
                let msb = (data[1] & 0x7F) as i16;
                Some(MidiEvent::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Encode back to a three byte MIDI message
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOff { channel, note } => [0x80 | (channel & 0x0F), note & 0x7F, 0],
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MidiEvent::PitchBend { channel, value } => {
                let value = value.clamp(0, 0x3FFF) as u16;
                [
                    0xE0 | (channel & 0x0F),
                    (value & 0x7F) as u8,
                    ((value >> 7) & 0x7F) as u8,
                ]
            }
        }
    }

    /// Build a note-off message for a sounding note
    pub fn note_off(channel: u8, note: u8) -> [u8; 3] {
        MidiEvent::NoteOff { channel, note }.to_bytes()
    }
}

/// Keeps track of notes that received a note-on without a matching note-off,
/// so a stopping strategy can silence them.
#[derive(Debug, Default, Clone)]
pub struct SoundingNotes {
    notes: Vec<(u8, u8)>,
}

impl SoundingNotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update bookkeeping from a raw event that was just played
    pub fn observe(&mut self, bytes: &[u8]) {
        match MidiEvent::from_bytes(bytes) {
            Some(MidiEvent::NoteOn { channel, note, .. }) => {
                if !self.notes.contains(&(channel, note)) {
                    self.notes.push((channel, note));
                }
            }
            Some(MidiEvent::NoteOff { channel, note }) => {
                self.notes.retain(|&n| n != (channel, note));
            }
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Note-off messages for every sounding note, clearing the set
    pub fn drain_note_offs(&mut self) -> Vec<[u8; 3]> {
        self.notes
            .drain(..)
            .map(|(channel, note)| MidiEvent::note_off(channel, note))
            .collect()
    }
}
