// Generative sequencer - model-driven playback
//
// Each tick the clock's control signals are fed to a model; every model
// output drives one pitch of a scale. An output rising above the on
// threshold starts its note, falling below the off threshold releases it.

use super::clock::ClockFrame;
use super::strategy::PlaybackStrategy;
use super::track::TrackError;
use crate::instrument::Instrument;
use crate::midi::MidiEvent;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Output level that starts a note
pub const NOTE_ON_THRESHOLD: f64 = 0.6;
/// Output level that releases a note
pub const NOTE_OFF_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Model expected {expected} inputs, got {got}")]
    InputWidth { expected: usize, got: usize },

    #[error("Model produced {got} outputs, mapper expects {expected}")]
    OutputWidth { expected: usize, got: usize },

    #[error("Model failure: {0}")]
    Failed(String),
}

/// Model configuration as persisted. Absent fields are filled in when the
/// track is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_out: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_hidden: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_in: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Fully resolved model dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct ModelShape {
    pub n_in: usize,
    pub n_hidden: Vec<usize>,
    pub n_out: usize,
    pub seed: u64,
}

impl ModelConfig {
    /// Fill absent fields. `seed` is only called when no seed is configured.
    pub fn resolve(
        &self,
        n_out: usize,
        n_hidden: &[usize],
        n_in: usize,
        seed: impl FnOnce() -> u64,
    ) -> ModelShape {
        ModelShape {
            n_in: self.n_in.unwrap_or(n_in),
            n_hidden: self.n_hidden.clone().unwrap_or_else(|| n_hidden.to_vec()),
            n_out: self.n_out.unwrap_or(n_out),
            seed: self.seed.unwrap_or_else(seed),
        }
    }
}

impl From<&ModelShape> for ModelConfig {
    fn from(shape: &ModelShape) -> Self {
        Self {
            n_out: Some(shape.n_out),
            n_hidden: Some(shape.n_hidden.clone()),
            n_in: Some(shape.n_in),
            seed: Some(shape.seed),
        }
    }
}

/// The generative model collaborator. Training is someone else's business;
/// the sequencer only asks for the next output vector.
pub trait GenerativeModel {
    fn input_width(&self) -> usize;
    fn output_width(&self) -> usize;
    fn next_output(&mut self, inputs: &[f64]) -> Result<Vec<f64>, ModelError>;
}

#[derive(Debug, Clone)]
struct Layer {
    inputs: usize,
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl Layer {
    fn random(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let scale = 1.0 / (inputs.max(1) as f64).sqrt();
        let weights = (0..inputs * outputs)
            .map(|_| rng.gen_range(-1.0..1.0) * scale * 3.0)
            .collect();
        let biases = (0..outputs).map(|_| rng.gen_range(-0.5..0.5)).collect();
        Self {
            inputs,
            weights,
            biases,
        }
    }

    fn forward(&self, input: &[f64], activation: fn(f64) -> f64) -> Vec<f64> {
        self.biases
            .iter()
            .enumerate()
            .map(|(row, bias)| {
                let weights = &self.weights[row * self.inputs..(row + 1) * self.inputs];
                let sum: f64 = weights.iter().zip(input).map(|(w, x)| w * x).sum();
                activation(sum + bias)
            })
            .collect()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Seeded feed-forward network: tanh hidden layers, sigmoid outputs.
/// The same shape and seed always produce the same weights.
#[derive(Debug, Clone)]
pub struct FeedForwardNet {
    hidden: Vec<Layer>,
    output: Layer,
    n_in: usize,
}

impl FeedForwardNet {
    pub fn new(shape: &ModelShape) -> Self {
        let mut rng = StdRng::seed_from_u64(shape.seed);
        let mut width = shape.n_in;
        let mut hidden = Vec::with_capacity(shape.n_hidden.len());
        for &n in &shape.n_hidden {
            hidden.push(Layer::random(width, n, &mut rng));
            width = n;
        }
        let output = Layer::random(width, shape.n_out, &mut rng);
        Self {
            hidden,
            output,
            n_in: shape.n_in,
        }
    }
}

impl GenerativeModel for FeedForwardNet {
    fn input_width(&self) -> usize {
        self.n_in
    }

    fn output_width(&self) -> usize {
        self.output.biases.len()
    }

    fn next_output(&mut self, inputs: &[f64]) -> Result<Vec<f64>, ModelError> {
        if inputs.len() != self.n_in {
            return Err(ModelError::InputWidth {
                expected: self.n_in,
                got: inputs.len(),
            });
        }
        let mut activations = inputs.to_vec();
        for layer in &self.hidden {
            activations = layer.forward(&activations, f64::tanh);
        }
        Ok(self.output.forward(&activations, sigmoid))
    }
}

/// Maps model output indices onto the pitches of a repeating scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchMapper {
    pub base_note: u8,
    pub scale: Vec<u8>,
}

impl PitchMapper {
    pub fn new(base_note: u8, scale: Vec<u8>) -> Self {
        Self { base_note, scale }
    }

    /// MIDI pitch for output `index`, None past the top of the MIDI range
    pub fn pitch(&self, index: usize) -> Option<u8> {
        let pitch = if self.scale.is_empty() {
            self.base_note as usize + index
        } else {
            let octave = index / self.scale.len();
            let degree = self.scale[index % self.scale.len()] as usize;
            self.base_note as usize + 12 * octave + degree
        };
        u8::try_from(pitch).ok().filter(|p| *p <= 127)
    }
}

impl Default for PitchMapper {
    fn default() -> Self {
        Self::new(40, vec![0, 3, 5, 7, 10])
    }
}

/// Plays whatever the bound model asks for
pub struct GenerativeSequencer {
    model: Box<dyn GenerativeModel>,
    mapper: PitchMapper,
    config: ModelConfig,
    channel: u8,
    /// Pitch currently sounding for each model output
    active: Vec<Option<u8>>,
}

impl GenerativeSequencer {
    pub fn new(model: Box<dyn GenerativeModel>, mapper: PitchMapper, config: ModelConfig) -> Self {
        let active = vec![None; model.output_width()];
        Self {
            model,
            mapper,
            config,
            channel: 0,
            active,
        }
    }

    /// Build the default network for `shape`
    pub fn from_shape(shape: &ModelShape, mapper: PitchMapper) -> Self {
        Self::new(
            Box::new(FeedForwardNet::new(shape)),
            mapper,
            ModelConfig::from(shape),
        )
    }

    /// Resolved configuration, as it should be persisted
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn mapper(&self) -> &PitchMapper {
        &self.mapper
    }

    pub fn sounding_count(&self) -> usize {
        self.active.iter().filter(|a| a.is_some()).count()
    }

    fn release_all(&mut self, instrument: &mut dyn Instrument) -> Result<(), TrackError> {
        let channel = self.channel;
        let released: Vec<u8> = self.active.iter_mut().filter_map(Option::take).collect();
        for pitch in released {
            instrument.play_event(&MidiEvent::note_off(channel, pitch), 0.0)?;
        }
        Ok(())
    }
}

impl PlaybackStrategy for GenerativeSequencer {
    fn tick(
        &mut self,
        frame: &ClockFrame<'_>,
        instrument: &mut dyn Instrument,
    ) -> Result<(), TrackError> {
        let mut inputs = frame.controls.to_vec();
        inputs.resize(self.model.input_width(), 0.0);

        let outputs = self.model.next_output(&inputs)?;
        if outputs.len() != self.active.len() {
            return Err(ModelError::OutputWidth {
                expected: self.active.len(),
                got: outputs.len(),
            }
            .into());
        }

        let mut messages = Vec::new();
        for (index, (&level, slot)) in outputs.iter().zip(self.active.iter_mut()).enumerate() {
            match *slot {
                None if level > NOTE_ON_THRESHOLD => {
                    if let Some(pitch) = self.mapper.pitch(index) {
                        let velocity = (32.0 + level * 95.0).clamp(1.0, 127.0) as u8;
                        *slot = Some(pitch);
                        messages.push(
                            MidiEvent::NoteOn {
                                channel: self.channel,
                                note: pitch,
                                velocity,
                            }
                            .to_bytes(),
                        );
                    }
                }
                Some(pitch) if level < NOTE_OFF_THRESHOLD => {
                    *slot = None;
                    messages.push(MidiEvent::note_off(self.channel, pitch));
                }
                _ => {}
            }
        }

        for message in messages {
            instrument.play_event(&message, 0.0)?;
        }
        Ok(())
    }

    fn start(&mut self, _beat: f64) {}

    fn stop(&mut self, instrument: &mut dyn Instrument) -> Result<(), TrackError> {
        self.release_all(instrument)
    }
}

impl std::fmt::Debug for GenerativeSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeSequencer")
            .field("config", &self.config)
            .field("mapper", &self.mapper)
            .field("sounding", &self.sounding_count())
            .finish()
    }
}
