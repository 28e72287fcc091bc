use std::collections::BTreeSet;

use tracing::info;

use crate::error::{Error, Result};
use crate::events::Track;

/// Which tracks drive the animation and how the audio side is voiced.
#[derive(Debug, Clone, Default)]
pub struct TrackPolicy {
    /// Track ids whose note onsets spawn platforms. Empty is valid:
    /// the ball free-falls and nothing is spawned.
    pub animate_tracks: BTreeSet<usize>,
    /// Mute every track outside `animate_tracks` during synthesis.
    /// Animation triggering ignores mute state.
    pub isolate: bool,
    /// One General MIDI program applied to every track uniformly.
    pub new_instrument: Option<u8>,
}

impl TrackPolicy {
    pub fn animates(&self, track_id: usize) -> bool {
        self.animate_tracks.contains(&track_id)
    }
}

/// Applies the policy, returning the effective track set used for
/// audio synthesis. Runs before any simulation or synthesis work.
pub fn apply_policy(tracks: &[Track], policy: &TrackPolicy) -> Result<Vec<Track>> {
    for &id in &policy.animate_tracks {
        if id >= tracks.len() {
            return Err(Error::UnknownTrack(id, tracks.len()));
        }
    }

    let effective: Vec<Track> = tracks
        .iter()
        .map(|track| Track {
            id: track.id,
            program: policy.new_instrument.unwrap_or(track.program),
            muted: track.muted || (policy.isolate && !policy.animates(track.id)),
        })
        .collect();

    let muted = effective.iter().filter(|t| t.muted).count();
    if muted > 0 {
        info!(muted, total = effective.len(), "isolated audio to animated tracks");
    }

    Ok(effective)
}
