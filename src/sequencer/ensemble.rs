// Ensemble - solo/mute arbitration across all tracks
//
// The ensemble does not own tracks; it indexes them by id and is handed the
// owning map whenever it needs to resolve state. Whenever at least one track
// is soloed, solo state decides who is heard; otherwise each track's own mute
// flag does.

use super::track::{Track, TrackId};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct Ensemble {
    members: Vec<TrackId>,
}

impl Ensemble {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Returns false if already present.
    pub fn add(&mut self, id: TrackId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        self.members.push(id);
        true
    }

    /// Remove a member. Returns false if absent.
    pub fn remove(&mut self, id: TrackId) -> bool {
        let before = self.members.len();
        self.members.retain(|&m| m != id);
        self.members.len() != before
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.members.contains(&id)
    }

    pub fn members(&self) -> &[TrackId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn soloed_count(&self, tracks: &HashMap<TrackId, Track>) -> usize {
        self.members
            .iter()
            .filter_map(|id| tracks.get(id))
            .filter(|t| t.is_soloed())
            .count()
    }

    /// Toggle solo on `target` and re-resolve the whole ensemble.
    /// Returns false if `target` is not a member.
    pub fn solo(&self, target: TrackId, tracks: &mut HashMap<TrackId, Track>) -> bool {
        if !self.contains(target) {
            return false;
        }
        let Some(track) = tracks.get_mut(&target) else {
            return false;
        };

        let soloed = !track.is_soloed();
        track.set_soloed(soloed);
        if soloed {
            track.set_muted(false);
        }
        tracing::debug!(track = %target, soloed, "solo toggled");

        self.resolve(tracks);
        true
    }

    /// Toggle the local mute flag of `target`. Returns false if not a member.
    pub fn toggle_mute(&self, target: TrackId, tracks: &mut HashMap<TrackId, Track>) -> bool {
        if !self.contains(target) {
            return false;
        }
        match tracks.get_mut(&target) {
            Some(track) => {
                track.toggle_mute();
                true
            }
            None => false,
        }
    }

    /// Recompute every member's audible state from the solo count
    pub fn resolve(&self, tracks: &mut HashMap<TrackId, Track>) {
        let soloed = self.soloed_count(tracks);

        for id in &self.members {
            let Some(track) = tracks.get_mut(id) else {
                continue;
            };
            if soloed == 0 {
                let muted = track.is_muted();
                track.apply_audibility(false, muted);
            } else if track.is_soloed() {
                track.apply_audibility(false, false);
            } else {
                track.apply_audibility(true, true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{CapturingInstrument, InstrumentProbe};
    use crate::sequencer::replay::ReplaySequencer;
    use crate::sequencer::strategy::Strategy;

    fn ensemble_of(n: usize) -> (Ensemble, HashMap<TrackId, Track>, Vec<TrackId>, Vec<InstrumentProbe>) {
        let mut ensemble = Ensemble::new();
        let mut tracks = HashMap::new();
        let mut ids = Vec::new();
        let mut probes = Vec::new();
        for i in 0..n {
            let (inst, probe) = CapturingInstrument::new(&format!("inst-{i}"));
            let track = Track::new(Strategy::Replay(ReplaySequencer::new()), Box::new(inst));
            ids.push(track.id());
            ensemble.add(track.id());
            tracks.insert(track.id(), track);
            probes.push(probe);
        }
        (ensemble, tracks, ids, probes)
    }

    #[test]
    fn test_membership_idempotent() {
        let (mut ensemble, _, ids, _) = ensemble_of(1);
        assert!(!ensemble.add(ids[0]));
        assert!(ensemble.remove(ids[0]));
        assert!(!ensemble.remove(ids[0]));
        assert!(ensemble.is_empty());
    }

    #[test]
    fn test_solo_silences_everyone_else() {
        let (ensemble, mut tracks, ids, probes) = ensemble_of(3);
        assert!(ensemble.solo(ids[1], &mut tracks));

        assert!(tracks[&ids[1]].audible());
        assert!(!probes[1].is_muted());
        for i in [0, 2] {
            assert!(tracks[&ids[i]].is_tmp_muted());
            assert!(probes[i].is_muted());
        }
    }

    #[test]
    fn test_solo_clears_own_mute() {
        let (ensemble, mut tracks, ids, probes) = ensemble_of(2);
        ensemble.toggle_mute(ids[0], &mut tracks);
        assert!(probes[0].is_muted());

        ensemble.solo(ids[0], &mut tracks);
        assert!(!tracks[&ids[0]].is_muted());
        assert!(!probes[0].is_muted());
    }

    #[test]
    fn test_last_unsolo_restores_mute_flags() {
        let (ensemble, mut tracks, ids, probes) = ensemble_of(3);
        ensemble.toggle_mute(ids[2], &mut tracks);
        ensemble.solo(ids[0], &mut tracks);
        ensemble.solo(ids[0], &mut tracks);

        assert_eq!(ensemble.soloed_count(&tracks), 0);
        assert!(!probes[0].is_muted());
        assert!(!probes[1].is_muted());
        assert!(probes[2].is_muted());
        assert!(ids.iter().all(|id| !tracks[id].is_tmp_muted()));
    }

    #[test]
    fn test_two_soloed_tracks_both_heard() {
        let (ensemble, mut tracks, ids, probes) = ensemble_of(3);
        ensemble.solo(ids[0], &mut tracks);
        ensemble.solo(ids[2], &mut tracks);

        assert!(!probes[0].is_muted());
        assert!(probes[1].is_muted());
        assert!(!probes[2].is_muted());
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let (ensemble, mut tracks, _, _) = ensemble_of(1);
        assert!(!ensemble.solo(TrackId::generate(), &mut tracks));
        assert!(!ensemble.toggle_mute(TrackId::generate(), &mut tracks));
    }
}
