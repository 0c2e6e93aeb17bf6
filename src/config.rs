// Composer configuration
// Loaded from RON; every field has a default so partial files are fine.

use crate::sequencer::generative::PitchMapper;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),
}

/// Defaults for generative model dimensions left out of a track's config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDefaults {
    pub n_out: usize,
    pub n_hidden: Vec<usize>,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            n_out: 20,
            n_hidden: vec![20],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Composition title for new compositions
    pub title: String,
    /// Scheduling quanta per beat
    pub ticks_per_beat: u32,
    pub bpm: f64,
    /// Periods (in beats) of the clock's continuous control ramps
    pub control_ramps: Vec<f64>,
    /// Instrument used when a track is created without one
    pub default_instrument: String,
    /// Instrument the metronome clicks on
    pub metronome_instrument: String,
    /// Accent period of the metronome
    pub beats_per_bar: u32,
    pub model: ModelDefaults,
    pub mapper: PitchMapper,
    /// Mixed into every derived generator seed
    pub base_seed: u64,
    /// Capacity of the input ring buffer
    pub input_queue_capacity: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            title: "A Song".to_string(),
            ticks_per_beat: 12,
            bpm: 120.0,
            control_ramps: vec![1.0, 2.0, 4.0, 8.0, 16.0],
            default_instrument: "marimba".to_string(),
            metronome_instrument: "metronome".to_string(),
            beats_per_bar: 4,
            model: ModelDefaults::default(),
            mapper: PitchMapper::default(),
            base_seed: 0x5EED,
            input_queue_capacity: 512,
        }
    }
}

impl ComposerConfig {
    /// Parse a RON document
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        ron::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}
