use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::thread;

use crossbeam::channel;
use tracing::info;

use crate::audio::{self, SAMPLE_RATE};
use crate::error::{Error, Result};
use crate::events::NoteEvent;
use crate::extract;
use crate::render::{Frame, FrameRenderer, RenderOptions};
use crate::scene::SceneConfig;
use crate::select::{TrackPolicy, apply_policy};
use crate::sim::{self, FrameSnapshot, Phase, SimParams};
use crate::video::{self, VideoAssembler};

/// Seconds simulated past the last note when no explicit cap is given.
const SETTLE_TAIL_SECONDS: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub midi_path: PathBuf,
    pub output_path: PathBuf,
    pub soundfont_path: PathBuf,
    pub policy: TrackPolicy,
    pub config: SceneConfig,
    pub render: RenderOptions,
    pub frame_rate: u32,
    pub lead_in_frames: u32,
    pub max_frames: Option<u64>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub frames: u64,
    pub duration_seconds: f64,
    pub platforms: usize,
    pub output: PathBuf,
}

/// The whole conversion. Extraction and selection run first, surfacing
/// fatal input problems before a single frame is simulated; audio
/// synthesis then overlaps the render/encode of the video stream and
/// the two meet again at the final mux.
pub fn run(options: &RunOptions) -> Result<RunSummary> {
    let bytes = fs::read(&options.midi_path)?;
    let score = extract::extract(&bytes)?;
    info!(
        tracks = score.tracks.len(),
        events = score.events.len(),
        warnings = score.warnings.len(),
        seconds = score.end_seconds(),
        "extracted {}",
        options.midi_path.display()
    );

    let effective_tracks = apply_policy(&score.tracks, &options.policy)?;

    let frame_budget = options
        .max_frames
        .unwrap_or_else(|| {
            default_frame_budget(
                &score.events,
                &options.policy,
                options.frame_rate,
                options.lead_in_frames,
            )
        })
        .max(1);

    let params = SimParams {
        events: &score.events,
        policy: &options.policy,
        config: &options.config,
        frame_rate: options.frame_rate,
        lead_in_frames: options.lead_in_frames,
        max_frames: Some(frame_budget),
    };

    // State advancement is strictly sequential: every frame depends on
    // the one before it.
    let mut state = sim::initial(&params);
    let mut snapshots = vec![state.snapshot()];
    while state.phase == Phase::Running {
        state = sim::step(state, &params);
        snapshots.push(state.snapshot());
    }
    let timeline = state;
    info!(
        frames = snapshots.len(),
        platforms = timeline.platforms.len(),
        bounces = timeline.carve_path.len(),
        "simulation complete"
    );

    let total_samples = audio_samples_for(snapshots.len() as u64, options.frame_rate);
    let audio_worker = {
        let events = score.events.clone();
        let lead_in_seconds = params.lead_in_seconds();
        let soundfont = options.soundfont_path.clone();
        thread::spawn(move || -> Result<Vec<(f32, f32)>> {
            let plan = audio::plan(&events, &effective_tracks, lead_in_seconds, total_samples);
            audio::synthesize(&plan, &soundfont)
        })
    };

    let video_tmp = cache_path("scene.mp4");
    let mut assembler = VideoAssembler::spawn(
        &video_tmp,
        options.config.width,
        options.config.height,
        options.frame_rate,
    )?;
    let renderer = FrameRenderer::new(
        &options.config,
        options.render,
        &timeline.platforms,
        &timeline.carve_path,
    );
    stream_frames(&renderer, &snapshots, &mut assembler, options.frame_rate)?;
    let frames_written = assembler.finish()?;

    let samples = audio_worker
        .join()
        .map_err(|_| Error::Synthesis("audio worker panicked".into()))??;
    let audio_tmp = cache_path("music.wav");
    audio::write_wav(&samples, &audio_tmp)?;

    video::mux(&video_tmp, &audio_tmp, &options.output_path)?;
    let _ = fs::remove_file(&video_tmp);
    let _ = fs::remove_file(&audio_tmp);

    Ok(RunSummary {
        frames: frames_written,
        duration_seconds: frames_written as f64 / options.frame_rate as f64,
        platforms: timeline.platforms.len(),
        output: options.output_path.clone(),
    })
}

// Renders finalized snapshots on a small worker pool and hands them to
// the assembler strictly in index order. Rendering is read-only over
// the finished timeline; the parallelism cannot change the output.
fn stream_frames(
    renderer: &FrameRenderer,
    snapshots: &[FrameSnapshot],
    assembler: &mut VideoAssembler,
    frame_rate: u32,
) -> Result<()> {
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, 8);
    let total = snapshots.len();

    thread::scope(|scope| {
        let (job_tx, job_rx) = channel::bounded::<FrameSnapshot>(workers * 2);
        let (done_tx, done_rx) = channel::bounded::<Frame>(workers * 2);

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                for snapshot in job_rx.iter() {
                    if done_tx.send(renderer.render(&snapshot)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(done_tx);

        scope.spawn(move || {
            for snapshot in snapshots {
                if job_tx.send(*snapshot).is_err() {
                    break;
                }
            }
        });

        let mut pending: BTreeMap<u64, Frame> = BTreeMap::new();
        let mut next = 0u64;
        for frame in done_rx.iter() {
            pending.insert(frame.index, frame);
            while let Some(ready) = pending.remove(&next) {
                assembler.push_frame(&ready)?;
                next += 1;
                if next % (frame_rate as u64 * 5) == 0 {
                    info!(
                        "rendered {next}/{total} frames ({:.0}%)",
                        next as f64 / total as f64 * 100.0
                    );
                }
            }
        }
        Ok(())
    })
}

// Without --max-frames the run covers every animated onset plus a
// settle tail. Falls back to the full event set when nothing is
// animated, so a free-fall render still matches the music's length.
fn default_frame_budget(
    events: &[NoteEvent],
    policy: &TrackPolicy,
    frame_rate: u32,
    lead_in_frames: u32,
) -> u64 {
    let last_animated = events
        .iter()
        .filter(|e| policy.animates(e.track_id))
        .map(|e| e.onset_seconds)
        .fold(None, |acc: Option<f64>, o| Some(acc.map_or(o, |a| a.max(o))));
    let last_onset = last_animated
        .or_else(|| events.last().map(|e| e.onset_seconds))
        .unwrap_or(0.0);

    let lead = lead_in_frames as f64 / frame_rate as f64;
    let last_frame = ((last_onset + lead) * frame_rate as f64).floor() as u64;
    last_frame + 1 + (SETTLE_TAIL_SECONDS * frame_rate as f64) as u64
}

// Sample count for a whole number of frames, rounded up so audio never
// runs out before the last frame.
fn audio_samples_for(frames: u64, frame_rate: u32) -> u64 {
    (frames * SAMPLE_RATE as u64).div_ceil(frame_rate as u64)
}

fn cache_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rebound-{}-{name}", std::process::id()))
}
