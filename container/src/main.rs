use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use video_splitter::workspace::force_remove;
use video_splitter::{Ffmpeg, Workspace, split_video};

/// Split a local video into fixed-length parts and zip them.
#[derive(Debug, Parser)]
#[command(name = "video-splitter", version)]
struct Args {
    /// Video to split.
    input: PathBuf,

    /// Length of each part in seconds.
    #[arg(long, default_value_t = 60)]
    segment_secs: u64,

    /// Folder receiving the parts and the archive.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: String,

    #[arg(long, env = "FFPROBE_PATH", default_value = "ffprobe")]
    ffprobe: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let ffmpeg = Ffmpeg::new(args.ffmpeg, args.ffprobe)?;

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("cannot create {}", args.output_dir.display()))?;
    let workspace = Workspace::with_folders(std::env::temp_dir(), &args.output_dir);
    // Stale parts from an earlier run would end up in the archive.
    for stale in workspace.parts().await? {
        force_remove(&stale).await;
    }

    let original_name = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("input path has no file name")?;

    tracing::info!(input = %args.input.display(), "Starting split job");
    let outcome = split_video(
        &ffmpeg,
        &workspace,
        &args.input,
        &original_name,
        args.segment_secs,
        |percent| tracing::info!("Processing: {percent}%"),
    )
    .await
    .context("split failed")?;

    for part in &outcome.parts {
        tracing::info!(part = %part.display(), "Wrote part");
    }
    tracing::info!(archive = %outcome.archive.display(), "Split job completed successfully");
    Ok(())
}
