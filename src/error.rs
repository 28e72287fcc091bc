use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed MIDI input: {0}")]
    MalformedMidi(String),

    #[error("unknown track id {0} in --animate-tracks (the file has {1} tracks)")]
    UnknownTrack(usize, usize),

    #[error("audio synthesis failed: {0}")]
    Synthesis(String),

    #[error("video encoding failed: {0}")]
    Encode(String),

    #[error("bad scene config {path}: {message}")]
    SceneConfig { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
