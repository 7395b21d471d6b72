use std::sync::Arc;

use tokio::sync::Mutex;
use video_splitter::{Ffmpeg, Workspace};

pub struct AppState {
    pub workspace: Workspace,
    pub ffmpeg: Ffmpeg,
    pub max_upload_bytes: u64,
    /// Held for the whole of a split or clear; both rewrite the shared folders.
    pub jobs: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(workspace: Workspace, ffmpeg: Ffmpeg, max_upload_bytes: u64) -> Self {
        Self {
            workspace,
            ffmpeg,
            max_upload_bytes,
            jobs: Arc::new(Mutex::new(())),
        }
    }
}
