// Instrument collaborator - where tracks send their events
//
// Rendering is not done here. A track only needs an instrument that can be
// muted and can receive raw MIDI bytes; the host decides what that means.

use std::cell::RefCell;
use std::rc::Rc;

/// Errors reported by an instrument when it cannot take an event
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstrumentError {
    #[error("Instrument '{name}' rejected event: {reason}")]
    Rejected { name: String, reason: String },

    #[error("Instrument '{0}' is unavailable")]
    Unavailable(String),
}

/// Audio-producing end point of a track
pub trait Instrument {
    /// Instrument name, as persisted with the track
    fn name(&self) -> &str;

    /// Reflect the audible state decided by the track / ensemble
    fn mute(&mut self, muted: bool);

    /// Play a raw MIDI event `latency` seconds from now
    fn play_event(&mut self, event: &[u8], latency: f64) -> Result<(), InstrumentError>;
}

/// Builds instruments by name when the composition creates a track
pub trait InstrumentFactory {
    fn create(&mut self, name: &str) -> Box<dyn Instrument>;
}

/// Instrument that only reports what it receives through `tracing`
#[derive(Debug)]
pub struct LoggingInstrument {
    name: String,
    muted: bool,
}

impl LoggingInstrument {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            muted: false,
        }
    }
}

impl Instrument for LoggingInstrument {
    fn name(&self) -> &str {
        &self.name
    }

    fn mute(&mut self, muted: bool) {
        self.muted = muted;
        tracing::debug!(instrument = %self.name, muted, "instrument mute");
    }

    fn play_event(&mut self, event: &[u8], latency: f64) -> Result<(), InstrumentError> {
        if !self.muted {
            tracing::debug!(instrument = %self.name, ?event, latency, "instrument event");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFactory;

impl InstrumentFactory for LoggingFactory {
    fn create(&mut self, name: &str) -> Box<dyn Instrument> {
        Box::new(LoggingInstrument::new(name))
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    muted: bool,
    mute_calls: Vec<bool>,
    events: Vec<Vec<u8>>,
    failing: bool,
}

/// Shared view on a [`CapturingInstrument`], kept by whoever created it
#[derive(Debug, Clone, Default)]
pub struct InstrumentProbe {
    state: Rc<RefCell<ProbeState>>,
}

impl InstrumentProbe {
    /// Last state passed to `mute`, false if never called
    pub fn is_muted(&self) -> bool {
        self.state.borrow().muted
    }

    pub fn mute_calls(&self) -> Vec<bool> {
        self.state.borrow().mute_calls.clone()
    }

    pub fn events(&self) -> Vec<Vec<u8>> {
        self.state.borrow().events.clone()
    }

    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.mute_calls.clear();
        state.events.clear();
    }

    /// Make `play_event` fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }
}

/// Instrument that records every call, for tests and offline inspection
#[derive(Debug)]
pub struct CapturingInstrument {
    name: String,
    probe: InstrumentProbe,
}

impl CapturingInstrument {
    pub fn new(name: &str) -> (Self, InstrumentProbe) {
        let probe = InstrumentProbe::default();
        (
            Self {
                name: name.to_string(),
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl Instrument for CapturingInstrument {
    fn name(&self) -> &str {
        &self.name
    }

    fn mute(&mut self, muted: bool) {
        let mut state = self.probe.state.borrow_mut();
        state.muted = muted;
        state.mute_calls.push(muted);
    }

    fn play_event(&mut self, event: &[u8], _latency: f64) -> Result<(), InstrumentError> {
        let mut state = self.probe.state.borrow_mut();
        if state.failing {
            return Err(InstrumentError::Rejected {
                name: self.name.clone(),
                reason: "probe set to fail".to_string(),
            });
        }
        state.events.push(event.to_vec());
        Ok(())
    }
}

/// Factory handing out [`CapturingInstrument`]s; clones share the probe list
#[derive(Debug, Clone, Default)]
pub struct CapturingFactory {
    probes: Rc<RefCell<Vec<(String, InstrumentProbe)>>>,
}

impl CapturingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe of the n-th instrument created
    pub fn probe(&self, index: usize) -> Option<InstrumentProbe> {
        self.probes.borrow().get(index).map(|(_, p)| p.clone())
    }

    /// Names of created instruments, in creation order
    pub fn names(&self) -> Vec<String> {
        self.probes.borrow().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.probes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.borrow().is_empty()
    }
}

impl InstrumentFactory for CapturingFactory {
    fn create(&mut self, name: &str) -> Box<dyn Instrument> {
        let (instrument, probe) = CapturingInstrument::new(name);
        self.probes.borrow_mut().push((name.to_string(), probe));
        Box::new(instrument)
    }
}
