use std::cmp::Ordering;

/// A note with both endpoints resolved to absolute seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub track_id: usize,
    pub pitch: u8,
    pub velocity: u8,
    pub onset_seconds: f64,
    pub duration_seconds: f64,
}

impl NoteEvent {
    // Onset first, then track, then pitch.
    pub fn cmp_document_order(&self, other: &Self) -> Ordering {
        self.onset_seconds
            .partial_cmp(&other.onset_seconds)
            .unwrap_or(Ordering::Equal)
            .then(self.track_id.cmp(&other.track_id))
            .then(self.pitch.cmp(&other.pitch))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: usize,
    /// General MIDI program number, 0..=127.
    pub program: u8,
    pub muted: bool,
}

/// From `tick` onward, quarter notes last `us_per_beat` microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoChange {
    pub tick: u64,
    pub us_per_beat: u32,
}

pub const DEFAULT_US_PER_BEAT: u32 = 500_000;

#[derive(Debug, Clone)]
pub struct TempoMap {
    changes: Vec<TempoChange>,
    ticks_per_beat: u32,
}

impl TempoMap {
    pub fn new(mut changes: Vec<TempoChange>, ticks_per_beat: u32) -> Self {
        changes.sort_by_key(|c| c.tick);
        if changes.first().is_none_or(|c| c.tick > 0) {
            changes.insert(
                0,
                TempoChange {
                    tick: 0,
                    us_per_beat: DEFAULT_US_PER_BEAT,
                },
            );
        }
        Self {
            changes,
            ticks_per_beat,
        }
    }

    pub fn tick_to_seconds(&self, tick: u64) -> f64 {
        let mut seconds = 0.0;
        let mut region_start = 0u64;
        let mut region_uspb = DEFAULT_US_PER_BEAT;
        for change in &self.changes {
            if change.tick >= tick {
                break;
            }
            let delta = change.tick - region_start;
            seconds += self.ticks_as_seconds(delta, region_uspb);
            region_start = change.tick;
            region_uspb = change.us_per_beat;
        }
        seconds + self.ticks_as_seconds(tick - region_start, region_uspb)
    }

    fn ticks_as_seconds(&self, ticks: u64, us_per_beat: u32) -> f64 {
        ticks as f64 * (us_per_beat as f64 / 1_000_000.0) / self.ticks_per_beat as f64
    }
}

#[derive(Debug, Clone)]
pub struct Score {
    pub tracks: Vec<Track>,
    pub events: Vec<NoteEvent>,
    pub warnings: Vec<ExtractWarning>,
}

impl Score {
    pub fn end_seconds(&self) -> f64 {
        self.events
            .iter()
            .map(|e| e.onset_seconds + e.duration_seconds)
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractWarning {
    /// A note-on with no matching note-off, closed at the final
    /// timestamp of the file.
    DanglingNote {
        track_id: usize,
        pitch: u8,
        onset_seconds: f64,
    },
}

impl std::fmt::Display for ExtractWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractWarning::DanglingNote {
                track_id,
                pitch,
                onset_seconds,
            } => write!(
                f,
                "dangling note on track {} pitch {} at {:.3}s closed at end of file",
                track_id, pitch, onset_seconds
            ),
        }
    }
}
