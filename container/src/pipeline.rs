use std::path::{Path, PathBuf};

use crate::archive::{archive_name, zip_parts};
use crate::error::{Result, SplitError};
use crate::ffmpeg::Ffmpeg;
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub parts: Vec<PathBuf>,
    pub archive: PathBuf,
}

/// Splits `input` into the workspace output folder and zips the parts.
///
/// `original_filename` names the archive. The input file is left in place.
pub async fn split_video<F>(
    ffmpeg: &Ffmpeg,
    workspace: &Workspace,
    input: &Path,
    original_filename: &str,
    segment_secs: u64,
    on_percent: F,
) -> Result<SplitOutcome>
where
    F: FnMut(u8) + Send,
{
    tracing::info!(input = %input.display(), segment_secs, "Splitting video");
    ffmpeg
        .split_segments(input, workspace.output(), segment_secs, on_percent)
        .await?;

    let parts = workspace.parts().await?;
    if parts.is_empty() {
        return Err(SplitError::NoParts);
    }

    let archive = workspace.output().join(archive_name(original_filename));
    let zip_target = archive.clone();
    let zip_inputs = parts.clone();
    tokio::task::spawn_blocking(move || zip_parts(&zip_inputs, &zip_target))
        .await
        .map_err(std::io::Error::other)??;

    tracing::info!(parts = parts.len(), archive = %archive.display(), "Split complete");
    Ok(SplitOutcome { parts, archive })
}
