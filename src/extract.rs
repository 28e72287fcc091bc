use std::collections::HashMap;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{ExtractWarning, NoteEvent, Score, TempoChange, TempoMap, Track};

/// Parses a standard MIDI file into a time-resolved [`Score`].
pub fn extract(bytes: &[u8]) -> Result<Score> {
    let smf = Smf::parse(bytes).map_err(|e| Error::MalformedMidi(e.to_string()))?;
    extract_smf(&smf)
}

pub fn extract_smf(smf: &Smf) -> Result<Score> {
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int() as u32,
        Timing::Timecode(..) => {
            return Err(Error::MalformedMidi("SMPTE timing is not supported".into()));
        }
    };

    let tempo_map = build_tempo_map(smf, ticks_per_beat);

    let mut tracks = Vec::with_capacity(smf.tracks.len());
    let mut events = Vec::new();
    let mut warnings = Vec::new();
    // Largest resolved timestamp anywhere in the file; dangling notes
    // close here.
    let mut last_seconds = 0.0f64;

    let mut per_track: Vec<Vec<NoteEvent>> = Vec::with_capacity(smf.tracks.len());
    let mut dangling: Vec<(usize, u8, u8, f64)> = Vec::new();

    for (track_id, track) in smf.tracks.iter().enumerate() {
        let mut program: Option<u8> = None;
        // pitch -> (onset_seconds, velocity) for notes awaiting their off.
        let mut open: HashMap<u8, (f64, u8)> = HashMap::new();
        let mut notes = Vec::new();
        let mut tick = 0u64;

        for event in track.iter() {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { message, .. } = event.kind else {
                continue;
            };
            let now = tempo_map.tick_to_seconds(tick);
            last_seconds = last_seconds.max(now);
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    let pitch = key.as_int();
                    // A second on for an already-sounding pitch ends the
                    // first note at the retrigger point.
                    if let Some((onset, velocity)) = open.insert(pitch, (now, vel.as_int())) {
                        notes.push(close_note(track_id, pitch, velocity, onset, now));
                    }
                }
                // Running-status files encode note-off as on with velocity 0.
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let pitch = key.as_int();
                    if let Some((onset, velocity)) = open.remove(&pitch) {
                        notes.push(close_note(track_id, pitch, velocity, onset, now));
                    }
                }
                MidiMessage::ProgramChange { program: p } => {
                    if program.is_none() {
                        program = Some(p.as_int());
                    }
                }
                _ => {}
            }
        }

        for (pitch, (onset, velocity)) in open {
            dangling.push((track_id, pitch, velocity, onset));
        }

        tracks.push(Track {
            id: track_id,
            program: program.unwrap_or(0),
            muted: false,
        });
        per_track.push(notes);
    }

    dangling.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    for (track_id, pitch, velocity, onset) in dangling {
        let warning = ExtractWarning::DanglingNote {
            track_id,
            pitch,
            onset_seconds: onset,
        };
        warn!("{warning}");
        warnings.push(warning);
        per_track[track_id].push(close_note(track_id, pitch, velocity, onset, last_seconds));
    }

    for notes in per_track {
        events.extend(notes);
    }
    events.sort_by(|a, b| a.cmp_document_order(b));

    debug!(
        tracks = tracks.len(),
        events = events.len(),
        end_seconds = last_seconds,
        "extracted score"
    );

    Ok(Score {
        tracks,
        events,
        warnings,
    })
}

// Tempo meta events apply from their tick onward regardless of which
// track chunk carries them, so all chunks are scanned up front.
fn build_tempo_map(smf: &Smf, ticks_per_beat: u32) -> TempoMap {
    let mut changes = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track.iter() {
            tick += event.delta.as_int() as u64;
            if let TrackEventKind::Meta(MetaMessage::Tempo(uspb)) = event.kind {
                changes.push(TempoChange {
                    tick,
                    us_per_beat: uspb.as_int(),
                });
            }
        }
    }
    TempoMap::new(changes, ticks_per_beat)
}

fn close_note(track_id: usize, pitch: u8, velocity: u8, onset: f64, end: f64) -> NoteEvent {
    NoteEvent {
        track_id,
        pitch,
        velocity,
        onset_seconds: onset,
        duration_seconds: (end - onset).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u15, u24, u28};
    use midly::{Format, Header, TrackEvent};

    fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        }
    }

    fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                },
            },
        }
    }

    fn tempo(delta: u32, us_per_beat: u32) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_beat))),
        }
    }

    fn smf(tracks: Vec<Vec<TrackEvent<'static>>>) -> Smf<'static> {
        Smf {
            header: Header::new(Format::Parallel, Timing::Metrical(u15::new(480))),
            tracks,
        }
    }

    #[test]
    fn pairs_note_on_and_off() {
        // 480 ticks at the default 120 BPM is half a second.
        let score = extract_smf(&smf(vec![vec![
            note_on(0, 60, 100),
            note_off(480, 60),
        ]]))
        .unwrap();

        assert_eq!(score.events.len(), 1);
        let e = &score.events[0];
        assert_eq!((e.track_id, e.pitch, e.velocity), (0, 60, 100));
        assert_eq!(e.onset_seconds, 0.0);
        assert_eq!(e.duration_seconds, 0.5);
        assert!(score.warnings.is_empty());
    }

    #[test]
    fn velocity_zero_on_acts_as_off() {
        let score = extract_smf(&smf(vec![vec![
            note_on(0, 64, 90),
            note_on(240, 64, 0),
        ]]))
        .unwrap();
        assert_eq!(score.events.len(), 1);
        assert_eq!(score.events[0].duration_seconds, 0.25);
    }

    #[test]
    fn dangling_note_closes_at_end_of_file() {
        let score = extract_smf(&smf(vec![vec![
            note_on(0, 60, 100),
            note_off(480, 60),
            note_on(0, 72, 80), // never released
        ]]))
        .unwrap();

        assert_eq!(score.events.len(), 2);
        assert_eq!(score.warnings.len(), 1);
        let dangling = score
            .events
            .iter()
            .find(|e| e.pitch == 72)
            .expect("dangling note kept");
        assert_eq!(dangling.onset_seconds, 0.5);
        // Closed at the last timestamp of the file, zero-length here.
        assert_eq!(dangling.duration_seconds, 0.0);
    }

    #[test]
    fn retrigger_closes_previous_note() {
        let score = extract_smf(&smf(vec![vec![
            note_on(0, 60, 100),
            note_on(240, 60, 110),
            note_off(240, 60),
        ]]))
        .unwrap();

        assert_eq!(score.events.len(), 2);
        assert_eq!(score.events[0].duration_seconds, 0.25);
        assert_eq!(score.events[1].onset_seconds, 0.25);
        assert_eq!(score.events[1].velocity, 110);
    }

    #[test]
    fn tempo_change_from_any_track_applies_globally() {
        // Track 0 carries the tempo; track 1 the notes. After one beat
        // the tempo halves to 60 BPM.
        let score = extract_smf(&smf(vec![
            vec![tempo(480, 1_000_000)],
            vec![note_on(480, 60, 100), note_off(480, 60)],
        ]))
        .unwrap();

        let e = &score.events[0];
        assert_eq!(e.onset_seconds, 0.5);
        assert_eq!(e.duration_seconds, 1.0);
    }

    #[test]
    fn events_sorted_by_onset_then_track_then_pitch() {
        let score = extract_smf(&smf(vec![
            vec![note_on(0, 64, 100), note_off(480, 64)],
            vec![note_on(0, 60, 100), note_off(480, 60)],
        ]))
        .unwrap();

        let order: Vec<_> = score.events.iter().map(|e| (e.track_id, e.pitch)).collect();
        assert_eq!(order, vec![(0, 64), (1, 60)]);
    }

    #[test]
    fn program_change_sets_track_program() {
        let score = extract_smf(&smf(vec![vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::ProgramChange { program: u7::new(40) },
                },
            },
            note_on(0, 60, 100),
            note_off(480, 60),
        ]]))
        .unwrap();
        assert_eq!(score.tracks[0].program, 40);
    }

    #[test]
    fn extraction_is_idempotent() {
        let source = smf(vec![
            vec![tempo(0, 600_000), note_on(0, 60, 100), note_off(480, 60)],
            vec![note_on(240, 67, 90), note_off(480, 67)],
        ]);
        let a = extract_smf(&source).unwrap();
        let b = extract_smf(&source).unwrap();
        assert_eq!(a.events, b.events);
        assert_eq!(a.tracks, b.tracks);
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let err = extract(b"not a midi file").unwrap_err();
        assert!(matches!(err, Error::MalformedMidi(_)));
    }
}
