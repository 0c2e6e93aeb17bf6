// Composer core - Library exports for the driver, tests and benchmarks

pub mod composition;
pub mod config;
pub mod instrument;
pub mod messaging;
pub mod midi;
pub mod project;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use composition::{Composition, Schedulable, Slot};
pub use config::{ComposerConfig, ConfigError};
pub use instrument::{Instrument, InstrumentError, InstrumentFactory, LoggingFactory};
pub use messaging::channels::{create_input_channel, push_input};
pub use midi::event::MidiEvent;
pub use project::{LoadReport, MemoryStore, ProjectError, ProjectManager, RecordId, Store};
pub use sequencer::{
    Clock, ClockState, GenerativeSequencer, ModelConfig, ReplaySequencer, StampedEvent, Tempo,
    Track, TrackId,
};
