use std::io;

/// Errors raised while probing, splitting or packaging a video.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid executable path: {0}")]
    InvalidExecutable(String),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("ffmpeg exited unsuccessfully: {stderr}")]
    FfmpegFailed { stderr: String },

    #[error("ffprobe error: {0}")]
    Probe(String),

    #[error("segment length must be positive, got {0}")]
    InvalidSegment(u64),

    #[error("no video parts were created")]
    NoParts,

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, SplitError>;
