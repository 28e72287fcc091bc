use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rebound::render::RenderOptions;
use rebound::scene::SceneConfig;
use rebound::select::TrackPolicy;
use rebound::{RunOptions, RunSummary, run};

#[derive(Parser)]
#[command(name = "rebound")]
#[command(about = "Turn a MIDI file into a bouncing-ball music video", long_about = None)]
struct Cli {
    /// Path to a MIDI file
    midi: PathBuf,

    /// Where to write the finished video
    #[arg(short, long, default_value = "final.mp4")]
    out: PathBuf,

    /// SoundFont file used for audio synthesis
    #[arg(short, long, default_value = "assets/soundfont.sf2")]
    soundfont: PathBuf,

    /// Max number of frames to generate
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_frames: Option<u64>,

    /// General MIDI program number for the desired instrument,
    /// applied to every track
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=127))]
    new_instrument: Option<u8>,

    /// Comma-delimited track numbers whose notes drive the ball
    #[arg(long, value_delimiter = ',')]
    animate_tracks: Vec<usize>,

    /// Mute all non-animated tracks
    #[arg(long)]
    isolate: bool,

    /// Draw the trail of bounce contact points
    #[arg(long)]
    show_carve: bool,

    /// Draw placement markers around every spawned platform
    #[arg(long)]
    show_platform: bool,

    /// Video frame rate
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
    fps: u32,

    /// Delay animation triggers this many frames into the video
    #[arg(long, default_value_t = 0)]
    lead_in_frames: u32,

    /// RON file overriding the physics and visual constants
    #[arg(long)]
    scene: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match convert(Cli::parse()) {
        Ok(summary) => {
            info!(
                "wrote {} ({} frames, {:.1}s, {} platforms)",
                summary.output.display(),
                summary.frames,
                summary.duration_seconds,
                summary.platforms
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn convert(cli: Cli) -> rebound::Result<RunSummary> {
    let config = match &cli.scene {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };

    run(&RunOptions {
        midi_path: cli.midi,
        output_path: cli.out,
        soundfont_path: cli.soundfont,
        policy: TrackPolicy {
            animate_tracks: BTreeSet::from_iter(cli.animate_tracks),
            isolate: cli.isolate,
            new_instrument: cli.new_instrument,
        },
        config,
        render: RenderOptions {
            show_carve: cli.show_carve,
            show_platform: cli.show_platform,
        },
        frame_rate: cli.fps,
        lead_in_frames: cli.lead_in_frames,
        max_frames: cli.max_frames,
    })
}
