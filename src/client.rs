//! HTTP client for the splitter server.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Response, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use video_splitter::{ProgressDecoder, ProgressEvent};

use crate::staging::StagedVideo;

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("server answered {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("{0}")]
    SplitFailed(String),

    #[error("server reported that clearing failed")]
    ClearRejected,

    #[error("invalid output file name {0:?}")]
    InvalidName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitProgress {
    Uploading { sent: u64, total: u64 },
    Processing(u8),
}

#[derive(Debug, Deserialize)]
struct FileListing {
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClearResponse {
    success: bool,
}

#[derive(Debug, Clone)]
pub struct SplitClient {
    http: reqwest::Client,
    base_url: String,
}

impl SplitClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("split-console/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn list_files(&self) -> Result<Vec<String>, ClientError> {
        let resp = self
            .http
            .get(self.url("/"))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let listing: FileListing = check_status(resp).await?.json().await?;
        Ok(listing.files)
    }

    /// Uploads `video` and follows the split until the server is done.
    ///
    /// `on_progress` sees upload progress first, then the server's processing
    /// percentages. A server that answers with a rendered page instead of a
    /// progress stream is treated as a completed split.
    pub async fn split<F>(
        &self,
        video: &StagedVideo,
        segment_secs: u32,
        on_progress: F,
    ) -> Result<(), ClientError>
    where
        F: Fn(SplitProgress) + Send + Sync + 'static,
    {
        let on_progress = Arc::new(on_progress);
        let file = tokio::fs::File::open(&video.path)
            .await
            .map_err(|source| ClientError::Io {
                path: video.path.clone(),
                source,
            })?;

        let total = video.size;
        let mut sent: u64 = 0;
        let upload_progress = Arc::clone(&on_progress);
        let chunks = ReaderStream::with_capacity(file, UPLOAD_CHUNK_BYTES).inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                sent += bytes.len() as u64;
                upload_progress(SplitProgress::Uploading { sent, total });
            }
        });

        let part = Part::stream_with_length(Body::wrap_stream(chunks), total)
            .file_name(video.name.clone())
            .mime_str(video.mime)?;
        let form = Form::new()
            .part("video", part)
            .text("duration", segment_secs.to_string());

        tracing::info!(file = %video.name, segment_secs, "Submitting split");
        let resp = self
            .http
            .post(self.url("/split"))
            .header(ACCEPT, "text/plain")
            .multipart(form)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        if is_html(&resp) {
            tracing::debug!("Server rendered a page instead of streaming progress");
            return Ok(());
        }

        let mut decoder = ProgressDecoder::new();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            for event in decoder.feed(&chunk?) {
                report(event, on_progress.as_ref())?;
            }
        }
        if let Some(event) = decoder.finish() {
            report(event, on_progress.as_ref())?;
        }
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(self.url("/clear"))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let body = check_status(resp).await?.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        // Anything other than an explicit refusal counts as cleared.
        match serde_json::from_slice::<ClearResponse>(&body) {
            Ok(ClearResponse { success: false }) => Err(ClientError::ClearRejected),
            _ => Ok(()),
        }
    }

    /// Saves output file `name` into `dir`, returning the written path.
    pub async fn download(&self, name: &str, dir: &Path) -> Result<PathBuf, ClientError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(ClientError::InvalidName(name.to_string()));
        }

        let url = self.url(&format!("/output/{}", utf8_percent_encode(name, PATH_SEGMENT)));
        let resp = check_status(self.http.get(url).send().await?).await?;

        let target = dir.join(name);
        let io_err = |source| ClientError::Io {
            path: target.clone(),
            source,
        };
        let mut file = tokio::fs::File::create(&target).await.map_err(io_err)?;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;
        Ok(target)
    }
}

fn report(event: ProgressEvent, on_progress: &dyn Fn(SplitProgress)) -> Result<(), ClientError> {
    match event {
        ProgressEvent::Percent(percent) => {
            on_progress(SplitProgress::Processing(percent));
            Ok(())
        }
        ProgressEvent::Failed(message) => Err(ClientError::SplitFailed(message)),
    }
}

fn is_html(resp: &Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("text/html"))
}

async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default().trim().to_string();
    tracing::warn!(%status, %message, "Server rejected request");
    Err(ClientError::Status { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::stage;
    use mockito::Matcher;
    use std::sync::Mutex;

    fn staged_clip(dir: &Path, bytes: usize) -> StagedVideo {
        let path = dir.join("clip.mp4");
        std::fs::write(&path, vec![7u8; bytes]).unwrap();
        stage(&path).unwrap()
    }

    fn recorder() -> (
        Arc<Mutex<Vec<SplitProgress>>>,
        impl Fn(SplitProgress) + Send + Sync + 'static,
    ) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |p: SplitProgress| sink.lock().unwrap().push(p))
    }

    #[tokio::test]
    async fn lists_files_from_json_index() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("accept", "application/json")
            .with_header("content-type", "application/json")
            .with_body(r#"{"files":["clip_parts.zip","part_000.mp4"]}"#)
            .create_async()
            .await;

        let client = SplitClient::new(server.url()).unwrap();
        let files = client.list_files().await.unwrap();
        assert_eq!(files, vec!["clip_parts.zip", "part_000.mp4"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn split_reports_upload_then_processing() {
        let dir = tempfile::tempdir().unwrap();
        let video = staged_clip(dir.path(), 150_000);

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/split")
            .match_header("accept", "text/plain")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data".to_string()),
            )
            .match_body(Matcher::Regex("name=\"duration\"".to_string()))
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body("10\n55\n100\n")
            .create_async()
            .await;

        let client = SplitClient::new(format!("{}/", server.url())).unwrap();
        let (events, on_progress) = recorder();
        client.split(&video, 30, on_progress).await.unwrap();
        mock.assert_async().await;

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events.iter().rev().take(3).collect::<Vec<_>>(),
            vec![
                &SplitProgress::Processing(100),
                &SplitProgress::Processing(55),
                &SplitProgress::Processing(10),
            ]
        );
        let last_upload = events
            .iter()
            .rev()
            .find(|p| matches!(p, SplitProgress::Uploading { .. }))
            .copied();
        assert_eq!(
            last_upload,
            Some(SplitProgress::Uploading {
                sent: 150_000,
                total: 150_000
            })
        );
    }

    #[tokio::test]
    async fn split_surfaces_streamed_failure() {
        let dir = tempfile::tempdir().unwrap();
        let video = staged_clip(dir.path(), 16);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/split")
            .with_header("content-type", "text/plain")
            .with_body("20\nerror: Error processing video\n")
            .create_async()
            .await;

        let client = SplitClient::new(server.url()).unwrap();
        let err = client.split(&video, 10, |_| {}).await.unwrap_err();
        assert!(matches!(err, ClientError::SplitFailed(ref m) if m == "Error processing video"));
    }

    #[tokio::test]
    async fn split_rejection_carries_server_message() {
        let dir = tempfile::tempdir().unwrap();
        let video = staged_clip(dir.path(), 16);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/split")
            .with_status(400)
            .with_body("Invalid duration value")
            .create_async()
            .await;

        let client = SplitClient::new(server.url()).unwrap();
        match client.split(&video, 10, |_| {}).await {
            Err(ClientError::Status { status, message }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "Invalid duration value");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn split_accepts_rendered_page() {
        let dir = tempfile::tempdir().unwrap();
        let video = staged_clip(dir.path(), 16);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/split")
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<!DOCTYPE html>\n<p>42</p>\n")
            .create_async()
            .await;

        let client = SplitClient::new(server.url()).unwrap();
        let (events, on_progress) = recorder();
        client.split(&video, 10, on_progress).await.unwrap();
        assert!(
            !events
                .lock()
                .unwrap()
                .iter()
                .any(|p| matches!(p, SplitProgress::Processing(_)))
        );
    }

    #[tokio::test]
    async fn clear_understands_empty_and_json_bodies() {
        let mut server = mockito::Server::new_async().await;
        let client = SplitClient::new(server.url()).unwrap();

        let empty = server
            .mock("POST", "/clear")
            .with_status(200)
            .create_async()
            .await;
        client.clear().await.unwrap();
        empty.remove_async().await;

        let refused = server
            .mock("POST", "/clear")
            .with_body(r#"{"success": false}"#)
            .create_async()
            .await;
        assert!(matches!(
            client.clear().await,
            Err(ClientError::ClearRejected)
        ));
        refused.remove_async().await;

        let ok = server
            .mock("POST", "/clear")
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;
        client.clear().await.unwrap();
        ok.remove_async().await;

        server
            .mock("POST", "/clear")
            .with_status(500)
            .with_body("Some files could not be cleared")
            .create_async()
            .await;
        assert!(matches!(
            client.clear().await,
            Err(ClientError::Status { .. })
        ));
    }

    #[tokio::test]
    async fn download_writes_file_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/output/my%20clip_parts.zip")
            .with_body("zipbytes")
            .create_async()
            .await;

        let client = SplitClient::new(server.url()).unwrap();
        let saved = client
            .download("my clip_parts.zip", dir.path())
            .await
            .unwrap();
        assert_eq!(saved, dir.path().join("my clip_parts.zip"));
        assert_eq!(std::fs::read(saved).unwrap(), b"zipbytes");

        assert!(matches!(
            client.download("../evil", dir.path()).await,
            Err(ClientError::InvalidName(_))
        ));
    }
}
