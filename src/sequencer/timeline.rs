// Timeline - tempo and beat quantization
// Converts between the clock's integer tick count, beats and real time

use std::fmt;

/// Lowest and highest tempo the clock accepts
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo, clamped to [MIN_BPM, MAX_BPM]
    pub fn new(bpm: f64) -> Self {
        let bpm = if bpm.is_finite() {
            bpm.clamp(MIN_BPM, MAX_BPM)
        } else {
            120.0
        };
        Self { bpm }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one scheduling quantum in seconds
    pub fn tick_duration_seconds(&self, ticks_per_beat: u32) -> f64 {
        self.beat_duration_seconds() / ticks_per_beat.max(1) as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Beat position of a tick count. Integer ticks keep recorded timestamps
/// exact (18 ticks at 12 per beat is exactly 1.5).
pub fn ticks_to_beats(ticks: u64, ticks_per_beat: u32) -> f64 {
    ticks as f64 / ticks_per_beat.max(1) as f64
}

/// Phase in [0, 1) of `beat` within a repeating period of `period_beats`
pub fn ramp_phase(beat: f64, period_beats: f64) -> f64 {
    if period_beats <= 0.0 {
        return 0.0;
    }
    beat.rem_euclid(period_beats) / period_beats
}
