use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::render::Frame;

/// Encodes rendered frames through an ffmpeg child process: raw rgb24
/// frames go down stdin and ffmpeg owns the container writing. Audio
/// is married to the result afterwards in [`mux`].
pub struct VideoAssembler {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    expected_index: u64,
}

pub fn encode_args(video_out: &Path, width: u32, height: u32, frame_rate: u32) -> Vec<String> {
    [
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-video_size",
        &format!("{width}x{height}"),
        "-framerate",
        &frame_rate.to_string(),
        "-i",
        "-",
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        &video_out.display().to_string(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn mux_args(video_in: &Path, audio_in: &Path, output: &Path) -> Vec<String> {
    [
        "-y",
        "-i",
        &video_in.display().to_string(),
        "-i",
        &audio_in.display().to_string(),
        "-map",
        "0:v:0",
        "-map",
        "1:a:0",
        "-c:v",
        "copy",
        "-c:a",
        "aac",
        "-shortest",
        &output.display().to_string(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn run_ffmpeg(args: &[String], stdin: Stdio) -> Result<Child> {
    debug!(?args, "starting ffmpeg");
    Command::new("ffmpeg")
        .args(args)
        .stdin(stdin)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Encode(format!("cannot start ffmpeg (is it installed?): {e}")))
}

impl VideoAssembler {
    pub fn spawn(video_out: &Path, width: u32, height: u32, frame_rate: u32) -> Result<Self> {
        let args = encode_args(video_out, width, height, frame_rate);
        let mut child = run_ffmpeg(&args, Stdio::piped())?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Encode("ffmpeg stdin unavailable".into()))?;
        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            expected_index: 0,
        })
    }

    /// Frames must arrive in index order with no gaps.
    pub fn push_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.index != self.expected_index {
            return Err(Error::Encode(format!(
                "frame {} arrived out of order (expected {})",
                frame.index, self.expected_index
            )));
        }
        self.stdin
            .write_all(frame.image.as_raw())
            .map_err(|e| Error::Encode(format!("writing frame {}: {e}", frame.index)))?;
        self.expected_index += 1;
        Ok(())
    }

    /// Closes the stream and waits for ffmpeg to finish the container.
    pub fn finish(mut self) -> Result<u64> {
        self.stdin
            .flush()
            .map_err(|e| Error::Encode(format!("flushing frames: {e}")))?;
        drop(self.stdin);
        let status = self
            .child
            .wait()
            .map_err(|e| Error::Encode(format!("waiting for ffmpeg: {e}")))?;
        if !status.success() {
            return Err(Error::Encode(format!("ffmpeg exited with {status}")));
        }
        info!(frames = self.expected_index, "video stream encoded");
        Ok(self.expected_index)
    }
}

/// Copies the encoded video stream and lays the synthesized WAV next
/// to it as AAC.
pub fn mux(video_in: &Path, audio_in: &Path, output: &Path) -> Result<()> {
    let args = mux_args(video_in, audio_in, output);
    let status = run_ffmpeg(&args, Stdio::null())?
        .wait()
        .map_err(|e| Error::Encode(format!("waiting for ffmpeg: {e}")))?;
    if !status.success() {
        return Err(Error::Encode(format!("ffmpeg mux exited with {status}")));
    }
    info!(output = %output.display(), "final video written");
    Ok(())
}
