//! The two server-held folders: raw uploads and split output.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tokio::fs;

const REMOVE_ATTEMPTS: u32 = 3;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Workspace {
    uploads: PathBuf,
    output: PathBuf,
}

impl Workspace {
    /// Lays the folders out as `<base>/uploads` and `<base>/output`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            uploads: base.join("uploads"),
            output: base.join("output"),
        }
    }

    pub fn with_folders(uploads: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            uploads: uploads.into(),
            output: output.into(),
        }
    }

    pub fn uploads(&self) -> &Path {
        &self.uploads
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub async fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.uploads).await?;
        fs::create_dir_all(&self.output).await?;
        Ok(())
    }

    /// Empties both folders. Returns false if anything could not be removed.
    pub async fn clean(&self) -> bool {
        let uploads_ok = clean_folder(&self.uploads).await;
        let output_ok = clean_folder(&self.output).await;
        uploads_ok && output_ok
    }

    /// Sorted names of the regular files currently in the output folder.
    pub async fn list_outputs(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.output).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Sorted paths of the segment files ffmpeg produced.
    pub async fn parts(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .list_outputs()
            .await?
            .into_iter()
            .filter(|name| is_part_name(name))
            .map(|name| self.output.join(name))
            .collect())
    }

    /// Resolves a requested download name inside the output folder.
    ///
    /// Anything that is not a single plain path component yields `None`.
    pub fn output_file(&self, name: &str) -> Option<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == name => Some(self.output.join(part)),
            _ => None,
        }
    }
}

fn is_part_name(name: &str) -> bool {
    name.starts_with("part_") && name.ends_with(".mp4")
}

/// Removes a file or directory tree, retrying transient failures.
pub async fn force_remove(path: &Path) -> bool {
    let mut attempt = 1;
    loop {
        match remove_entry(path).await {
            Ok(()) => return true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) if attempt < REMOVE_ATTEMPTS => {
                tracing::debug!(path = %path.display(), attempt, error = %e, "Retrying removal");
                attempt += 1;
                tokio::time::sleep(REMOVE_RETRY_DELAY).await;
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    attempts = REMOVE_ATTEMPTS,
                    error = %e,
                    "Failed to remove path"
                );
                return false;
            }
        }
    }
}

async fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

async fn clean_folder(folder: &Path) -> bool {
    let mut entries = match fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
        Err(e) => {
            tracing::error!(folder = %folder.display(), error = %e, "Cannot list folder");
            return false;
        }
    };

    let mut success = true;
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if !force_remove(&entry.path()).await {
                    success = false;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(folder = %folder.display(), error = %e, "Cannot list folder");
                success = false;
                break;
            }
        }
    }
    success
}
