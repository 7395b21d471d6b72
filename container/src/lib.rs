//! Cuts a video into fixed-length stream-copied segments with ffmpeg and
//! packages them as a zip archive.

pub mod archive;
pub mod error;
pub mod ffmpeg;
pub mod pipeline;
pub mod progress;
pub mod workspace;

pub use archive::{archive_name, zip_parts};
pub use error::{Result, SplitError};
pub use ffmpeg::Ffmpeg;
pub use pipeline::{SplitOutcome, split_video};
pub use progress::{ProgressDecoder, ProgressEvent, parse_percent};
pub use workspace::Workspace;
