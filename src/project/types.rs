// Persisted record shapes

use super::store::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Collection holding one record per schedulable entity
pub const PLAYERS: &str = "players";
/// Replay timelines, keyed from a replay track record
pub const MIDI: &str = "midi";
/// Generative track model references
pub const AI: &str = "ai";
/// Generative model configurations
pub const NET: &str = "net";
/// Song records: entity record id -> position
pub const SONGS: &str = "songs";
/// Song title and timestamps, filed under the song id
pub const SONG_INFO: &str = "songinfo";

/// Type discriminators carried in entity records
pub const TYPE_REPLAY: &str = "ReplaySequencer";
pub const TYPE_GENERATIVE: &str = "GenerativeSequencer";
pub const TYPE_CLOCK: &str = "Clock";

/// Position of every saved entity in the schedulable collection
pub type SongRecord = BTreeMap<RecordId, usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub inst: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi: Option<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerativeRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub inst: Option<String>,
    pub ai: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub ticks_per_beat: u32,
    pub bpm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRecord {
    pub net: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongInfo {
    pub title: String,
    /// RFC 3339 timestamp of the save
    pub modified: String,
}
