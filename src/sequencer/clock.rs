// Clock - beat generator and tick fan-out
// Advances the beat on every external tick and notifies registered clients
// in registration order.

use super::timeline::{Tempo, ramp_phase, ticks_to_beats};
use super::track::{TrackError, TrackId};
use crate::project::store::RecordId;
use std::collections::HashMap;

/// Default scheduling resolution
pub const DEFAULT_TICKS_PER_BEAT: u32 = 12;

/// Clock running mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl ClockState {
    pub fn is_running(&self) -> bool {
        matches!(self, ClockState::Running)
    }
}

/// What a client sees on each tick
#[derive(Debug, Clone, Copy)]
pub struct ClockFrame<'a> {
    /// Beat position before this tick
    pub previous_beat: f64,
    /// Beat position after this tick
    pub beat: f64,
    /// Continuous control signals, one per configured ramp, in [0, 1)
    pub controls: &'a [f64],
}

/// Anything the clock can drive
pub trait ClockClient {
    fn tick(&mut self, frame: &ClockFrame<'_>) -> Result<(), TrackError>;

    /// Transport started (or resumed) at `beat`
    fn start(&mut self, beat: f64);

    /// Transport stopped
    fn stop(&mut self) -> Result<(), TrackError>;
}

/// Lookup from registered ids to the clients that own them
pub trait ClientSet {
    type Client: ClockClient;

    fn client_mut(&mut self, id: TrackId) -> Option<&mut Self::Client>;
}

impl<C: ClockClient> ClientSet for HashMap<TrackId, C> {
    type Client = C;

    fn client_mut(&mut self, id: TrackId) -> Option<&mut C> {
        self.get_mut(&id)
    }
}

/// Errors surfaced by a fan-out. The clock itself never fails; it reports
/// the clients that did.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("{} clock client(s) failed, first: {}: {}", .0.len(), .0[0].0, .0[0].1)]
    ClientFailures(Vec<(TrackId, TrackError)>),
}

/// Shared beat clock
#[derive(Debug)]
pub struct Clock {
    ticks_per_beat: u32,
    tempo: Tempo,
    tick_count: u64,
    state: ClockState,
    clients: Vec<TrackId>,
    ramp_periods: Vec<f64>,
    controls: Vec<f64>,
    record_id: Option<RecordId>,
}

impl Clock {
    pub fn new(ticks_per_beat: u32, tempo: Tempo, ramp_periods: Vec<f64>) -> Self {
        let controls = vec![0.0; ramp_periods.len()];
        Self {
            ticks_per_beat: ticks_per_beat.max(1),
            tempo,
            tick_count: 0,
            state: ClockState::Stopped,
            clients: Vec::new(),
            ramp_periods,
            controls,
            record_id: None,
        }
    }

    /// Advance one quantum and notify every client. No-op unless running.
    ///
    /// Every registered client is notified even when an earlier one fails;
    /// failures are collected into the returned error.
    pub fn tick<S: ClientSet + ?Sized>(&mut self, clients: &mut S) -> Result<(), ClockError> {
        if !self.state.is_running() {
            return Ok(());
        }

        let previous_beat = self.beat_now();
        self.tick_count += 1;
        self.update_controls();

        let frame = ClockFrame {
            previous_beat,
            beat: self.beat_now(),
            controls: &self.controls,
        };

        let mut failures = Vec::new();
        for &id in &self.clients {
            match clients.client_mut(id) {
                Some(client) => {
                    if let Err(e) = client.tick(&frame) {
                        failures.push((id, e));
                    }
                }
                None => tracing::warn!(client = %id, "registered clock client is missing"),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClockError::ClientFailures(failures))
        }
    }

    /// Start from the top when stopped, resume in place when paused
    pub fn start<S: ClientSet + ?Sized>(&mut self, clients: &mut S) {
        match self.state {
            ClockState::Running => return,
            ClockState::Stopped => {
                self.tick_count = 0;
                self.update_controls();
            }
            ClockState::Paused => {}
        }

        let beat = self.beat_now();
        for &id in &self.clients {
            if let Some(client) = clients.client_mut(id) {
                client.start(beat);
            }
        }
        self.state = ClockState::Running;
        tracing::debug!(beat, "clock started");
    }

    /// Stop and rewind. Clients are told to stop even if some fail.
    pub fn stop<S: ClientSet + ?Sized>(&mut self, clients: &mut S) -> Result<(), ClockError> {
        let mut failures = Vec::new();
        if self.state != ClockState::Stopped {
            for &id in &self.clients {
                if let Some(client) = clients.client_mut(id)
                    && let Err(e) = client.stop()
                {
                    failures.push((id, e));
                }
            }
        }

        self.state = ClockState::Stopped;
        self.tick_count = 0;
        self.update_controls();
        tracing::debug!("clock stopped");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClockError::ClientFailures(failures))
        }
    }

    /// Hold the current position
    pub fn pause(&mut self) {
        if self.state.is_running() {
            self.state = ClockState::Paused;
        }
    }

    /// Current beat position, valid in any state
    pub fn beat_now(&self) -> f64 {
        ticks_to_beats(self.tick_count, self.ticks_per_beat)
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Register a client. Returns false if it was already registered.
    pub fn add_client(&mut self, id: TrackId) -> bool {
        if self.clients.contains(&id) {
            return false;
        }
        self.clients.push(id);
        true
    }

    /// Deregister a client. Returns false if it was not registered.
    pub fn remove_client(&mut self, id: TrackId) -> bool {
        let before = self.clients.len();
        self.clients.retain(|&c| c != id);
        self.clients.len() != before
    }

    pub fn has_client(&self, id: TrackId) -> bool {
        self.clients.contains(&id)
    }

    pub fn clients(&self) -> &[TrackId] {
        &self.clients
    }

    pub fn ticks_per_beat(&self) -> u32 {
        self.ticks_per_beat
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        if tempo != self.tempo {
            self.tempo = tempo;
            self.record_id = None;
        }
    }

    /// Change the resolution. Only allowed while stopped so beat positions
    /// already handed out stay valid.
    pub fn set_ticks_per_beat(&mut self, ticks_per_beat: u32) -> bool {
        if self.state != ClockState::Stopped {
            return false;
        }
        let ticks_per_beat = ticks_per_beat.max(1);
        if ticks_per_beat != self.ticks_per_beat {
            self.ticks_per_beat = ticks_per_beat;
            self.record_id = None;
        }
        true
    }

    /// Wall-clock length of one quantum, for the external driver
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.tempo.tick_duration_seconds(self.ticks_per_beat))
    }

    /// Number of continuous control signals exposed to clients
    pub fn control_signal_count(&self) -> usize {
        self.ramp_periods.len()
    }

    pub fn controls(&self) -> &[f64] {
        &self.controls
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        self.record_id.as_ref()
    }

    pub(crate) fn set_record_id(&mut self, id: Option<RecordId>) {
        self.record_id = id;
    }

    fn update_controls(&mut self) {
        let beat = self.beat_now();
        for (value, &period) in self.controls.iter_mut().zip(&self.ramp_periods) {
            *value = ramp_phase(beat, period);
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(
            DEFAULT_TICKS_PER_BEAT,
            Tempo::default(),
            vec![1.0, 2.0, 4.0, 8.0, 16.0],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentError;

    #[derive(Default)]
    struct Probe {
        ticks: Vec<f64>,
        starts: Vec<f64>,
        stops: usize,
        fail: bool,
    }

    impl ClockClient for Probe {
        fn tick(&mut self, frame: &ClockFrame<'_>) -> Result<(), TrackError> {
            self.ticks.push(frame.beat);
            if self.fail {
                return Err(TrackError::Instrument(InstrumentError::Unavailable(
                    "probe".to_string(),
                )));
            }
            Ok(())
        }

        fn start(&mut self, beat: f64) {
            self.starts.push(beat);
        }

        fn stop(&mut self) -> Result<(), TrackError> {
            self.stops += 1;
            Ok(())
        }
    }

    fn clients(n: usize) -> (Vec<TrackId>, HashMap<TrackId, Probe>) {
        let ids: Vec<TrackId> = (0..n).map(|_| TrackId::generate()).collect();
        let map = ids.iter().map(|&id| (id, Probe::default())).collect();
        (ids, map)
    }

    #[test]
    fn test_tick_is_noop_when_not_running() {
        let mut clock = Clock::default();
        let (ids, mut map) = clients(1);
        clock.add_client(ids[0]);

        clock.tick(&mut map).unwrap();
        assert_eq!(clock.beat_now(), 0.0);
        assert!(map[&ids[0]].ticks.is_empty());
    }

    #[test]
    fn test_tick_advances_and_notifies() {
        let mut clock = Clock::default();
        let (ids, mut map) = clients(2);
        for &id in &ids {
            clock.add_client(id);
        }

        clock.start(&mut map);
        for _ in 0..12 {
            clock.tick(&mut map).unwrap();
        }

        assert_eq!(clock.beat_now(), 1.0);
        assert_eq!(map[&ids[0]].ticks.len(), 12);
        assert_eq!(map[&ids[1]].starts, vec![0.0]);
    }

    #[test]
    fn test_registry_is_idempotent() {
        let mut clock = Clock::default();
        let id = TrackId::generate();
        assert!(clock.add_client(id));
        assert!(!clock.add_client(id));
        assert_eq!(clock.clients().len(), 1);

        assert!(clock.remove_client(id));
        assert!(!clock.remove_client(id));
        assert!(clock.clients().is_empty());
    }

    #[test]
    fn test_failing_client_does_not_block_others() {
        let mut clock = Clock::default();
        let (ids, mut map) = clients(2);
        for &id in &ids {
            clock.add_client(id);
        }
        map.get_mut(&ids[0]).unwrap().fail = true;

        clock.start(&mut map);
        let err = clock.tick(&mut map).unwrap_err();
        let ClockError::ClientFailures(failures) = err;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, ids[0]);
        assert_eq!(map[&ids[1]].ticks.len(), 1);
        assert_eq!(clock.beat_now(), 1.0 / 12.0);
    }

    #[test]
    fn test_pause_resume_keeps_position() {
        let mut clock = Clock::default();
        let (ids, mut map) = clients(1);
        clock.add_client(ids[0]);

        clock.start(&mut map);
        for _ in 0..6 {
            clock.tick(&mut map).unwrap();
        }
        clock.pause();
        clock.tick(&mut map).unwrap();
        assert_eq!(clock.beat_now(), 0.5);

        clock.start(&mut map);
        assert_eq!(map[&ids[0]].starts, vec![0.0, 0.5]);

        clock.stop(&mut map).unwrap();
        assert_eq!(clock.beat_now(), 0.0);
        assert_eq!(map[&ids[0]].stops, 1);
        assert_eq!(clock.state(), ClockState::Stopped);
    }

    #[test]
    fn test_controls_follow_beat() {
        let mut clock = Clock::new(4, Tempo::default(), vec![1.0, 2.0]);
        let mut map: HashMap<TrackId, Probe> = HashMap::new();
        assert_eq!(clock.control_signal_count(), 2);

        clock.start(&mut map);
        for _ in 0..6 {
            clock.tick(&mut map).unwrap();
        }
        // beat 1.5
        assert_eq!(clock.controls(), &[0.5, 0.75]);
    }

    #[test]
    fn test_ticks_per_beat_locked_while_running() {
        let mut clock = Clock::default();
        let mut map: HashMap<TrackId, Probe> = HashMap::new();
        clock.start(&mut map);
        assert!(!clock.set_ticks_per_beat(24));
        clock.stop(&mut map).unwrap();
        assert!(clock.set_ticks_per_beat(24));
        assert_eq!(clock.ticks_per_beat(), 24);
    }
}
