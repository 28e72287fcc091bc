use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::events::{NoteEvent, Track};

pub const SAMPLE_RATE: u32 = 44100;

const MASTER_VOLUME: f32 = 0.5;
const CLIP: f32 = 1.0;
const RENDER_CHUNK: usize = 4096;

/// General MIDI reserves channel 9 for percussion kits, so melodic
/// tracks cycle through the other fifteen.
const MELODIC_CHANNELS: [u8; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledMessage {
    pub sample: u64,
    pub channel: u8,
    pub kind: MessageKind,
}

/// A resolved synthesis plan: program per channel, note messages at
/// exact sample positions, and the exact output length.
#[derive(Debug, Clone)]
pub struct AudioPlan {
    pub programs: Vec<(u8, u8)>,
    pub messages: Vec<ScheduledMessage>,
    pub total_samples: u64,
}

pub fn plan(
    events: &[NoteEvent],
    effective_tracks: &[Track],
    lead_in_seconds: f64,
    total_samples: u64,
) -> AudioPlan {
    let mut channel_of = vec![None; effective_tracks.len()];
    let mut programs = Vec::new();
    for track in effective_tracks.iter().filter(|t| !t.muted) {
        let channel = MELODIC_CHANNELS[programs.len() % MELODIC_CHANNELS.len()];
        channel_of[track.id] = Some(channel);
        programs.push((channel, track.program));
    }

    let mut messages = Vec::with_capacity(events.len() * 2);
    for event in events {
        let Some(&Some(channel)) = channel_of.get(event.track_id) else {
            continue;
        };
        let on = ((event.onset_seconds + lead_in_seconds) * SAMPLE_RATE as f64).round() as u64;
        if on >= total_samples {
            continue;
        }
        let off = ((event.onset_seconds + event.duration_seconds + lead_in_seconds)
            * SAMPLE_RATE as f64)
            .round() as u64;
        // A zero-length note still needs its off strictly after its on.
        let off = off.max(on + 1).min(total_samples);
        messages.push(ScheduledMessage {
            sample: on,
            channel,
            kind: MessageKind::NoteOn {
                key: event.pitch,
                velocity: event.velocity,
            },
        });
        messages.push(ScheduledMessage {
            sample: off,
            channel,
            kind: MessageKind::NoteOff { key: event.pitch },
        });
    }
    messages.sort_by_key(|m| m.sample);

    AudioPlan {
        programs,
        messages,
        total_samples,
    }
}

/// Renders a plan through the soundfont into interleaved stereo f32.
pub fn synthesize(plan: &AudioPlan, soundfont_path: &Path) -> Result<Vec<(f32, f32)>> {
    let mut file = File::open(soundfont_path).map_err(|e| {
        Error::Synthesis(format!(
            "cannot open soundfont {}: {e}",
            soundfont_path.display()
        ))
    })?;
    let soundfont =
        Arc::new(SoundFont::new(&mut file).map_err(|e| Error::Synthesis(e.to_string()))?);
    let settings = SynthesizerSettings::new(SAMPLE_RATE as i32);
    let mut synthesizer =
        Synthesizer::new(&soundfont, &settings).map_err(|e| Error::Synthesis(e.to_string()))?;

    for &(channel, program) in &plan.programs {
        synthesizer.process_midi_message(channel as i32, 0xC0, program as i32, 0);
    }
    info!(
        notes = plan.messages.len() / 2,
        seconds = plan.total_samples as f64 / SAMPLE_RATE as f64,
        "synthesizing audio"
    );

    let mut samples = Vec::with_capacity(plan.total_samples as usize);
    let mut left = vec![0.0f32; RENDER_CHUNK];
    let mut right = vec![0.0f32; RENDER_CHUNK];
    let mut cursor = 0u64;

    let mut render_to = |synthesizer: &mut Synthesizer,
                         samples: &mut Vec<(f32, f32)>,
                         from: u64,
                         to: u64| {
        let mut remaining = (to - from) as usize;
        while remaining > 0 {
            let n = remaining.min(RENDER_CHUNK);
            synthesizer.render(&mut left[..n], &mut right[..n]);
            for i in 0..n {
                samples.push((
                    (left[i] * MASTER_VOLUME).clamp(-CLIP, CLIP),
                    (right[i] * MASTER_VOLUME).clamp(-CLIP, CLIP),
                ));
            }
            remaining -= n;
        }
    };

    for message in &plan.messages {
        let at = message.sample.min(plan.total_samples);
        if at > cursor {
            render_to(&mut synthesizer, &mut samples, cursor, at);
            cursor = at;
        }
        match message.kind {
            MessageKind::NoteOn { key, velocity } => {
                synthesizer.note_on(message.channel as i32, key as i32, velocity as i32)
            }
            MessageKind::NoteOff { key } => {
                synthesizer.note_off(message.channel as i32, key as i32)
            }
        }
    }
    if plan.total_samples > cursor {
        render_to(&mut synthesizer, &mut samples, cursor, plan.total_samples);
    }

    debug!(samples = samples.len(), "synthesis complete");
    Ok(samples)
}

/// Writes the synthesized track as 16-bit stereo WAV for the muxer.
pub fn write_wav(samples: &[(f32, f32)], path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| Error::Synthesis(e.to_string()))?;
    for &(l, r) in samples {
        writer
            .write_sample((l * i16::MAX as f32) as i16)
            .and_then(|_| writer.write_sample((r * i16::MAX as f32) as i16))
            .map_err(|e| Error::Synthesis(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::Synthesis(e.to_string()))?;
    Ok(())
}
