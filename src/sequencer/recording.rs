// Recording buffer - raw input stamped against the clock
// Captured during a take and handed to replay tracks when the take stops.

use serde::{Deserialize, Serialize};

/// A raw performance event and the beat it happened on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedEvent {
    pub beat: f64,
    pub data: Vec<u8>,
}

impl StampedEvent {
    pub fn new(beat: f64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            beat,
            data: data.into(),
        }
    }
}

/// Append-only take buffer
#[derive(Debug, Default, Clone)]
pub struct RecordBuffer {
    events: Vec<StampedEvent>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event stamped with the beat it arrived on
    pub fn push(&mut self, beat: f64, data: &[u8]) {
        self.events.push(StampedEvent::new(beat, data));
    }

    pub fn events(&self) -> &[StampedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hand over the take, leaving the buffer empty
    pub fn take(&mut self) -> Vec<StampedEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_arrival_order() {
        let mut buffer = RecordBuffer::new();
        buffer.push(0.0, &[0x90, 60, 100]);
        buffer.push(0.25, &[0x80, 60, 0]);

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.events()[1], StampedEvent::new(0.25, vec![0x80, 60, 0]));
    }

    #[test]
    fn test_take_empties_buffer() {
        let mut buffer = RecordBuffer::new();
        buffer.push(1.0, &[0x90, 62, 80]);

        let take = buffer.take();
        assert_eq!(take.len(), 1);
        assert!(buffer.is_empty());
        assert!(buffer.take().is_empty());
    }
}
