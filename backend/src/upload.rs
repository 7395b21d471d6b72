use std::path::{Path, PathBuf};

use actix_multipart::{Field, Multipart};
use actix_web::{HttpRequest, HttpResponse, post, web};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use video_splitter::workspace::force_remove;
use video_splitter::{Ffmpeg, ProgressEvent, SplitOutcome, Workspace, split_video};

use crate::error::ApiError;
use crate::negotiate::accepts;
use crate::page::render_index;
use crate::state::AppState;

const TEXT_FIELD_LIMIT: usize = 64;

struct SavedUpload {
    path: PathBuf,
    original_name: String,
}

struct SplitForm {
    video: SavedUpload,
    segment_secs: u64,
}

/// Accepts a `video` file plus a `duration` in seconds and splits it.
///
/// Clients sending `Accept: text/plain` get a streamed progress body; everyone
/// else gets the refreshed index page once the split is done.
#[post("/split")]
pub async fn split_upload(
    req: HttpRequest,
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let guard = state.jobs.clone().lock_owned().await;

    if !state.workspace.clean().await {
        tracing::warn!("Working folders were not fully cleaned before split");
    }
    state.workspace.ensure().await?;

    let form = read_split_form(payload, &state).await?;
    tracing::info!(
        file = %form.video.original_name,
        segment_secs = form.segment_secs,
        "Accepted upload"
    );

    if accepts(&req, "text/plain") {
        let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
        let ffmpeg = state.ffmpeg.clone();
        let workspace = state.workspace.clone();

        actix_web::rt::spawn(async move {
            let progress_tx = tx.clone();
            let result = run_split(&ffmpeg, &workspace, &form, move |percent| {
                // A disconnected client does not stop the split.
                let _ = progress_tx.send(Bytes::from(ProgressEvent::Percent(percent).to_line()));
            })
            .await;
            // Released before the stream ends so a follow-up clear does not wait on it.
            drop(guard);
            if let Err(err) = result {
                let _ = tx.send(Bytes::from(ProgressEvent::Failed(err.to_string()).to_line()));
            }
        });

        let body = UnboundedReceiverStream::new(rx).map(Ok::<_, actix_web::Error>);
        return Ok(HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .insert_header(("X-Accel-Buffering", "no"))
            .streaming(body));
    }

    run_split(&state.ffmpeg, &state.workspace, &form, |_| {}).await?;
    let files = state.workspace.list_outputs().await?;
    drop(guard);

    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render_index(&files)))
}

async fn run_split<F>(
    ffmpeg: &Ffmpeg,
    workspace: &Workspace,
    form: &SplitForm,
    on_percent: F,
) -> Result<SplitOutcome, ApiError>
where
    F: FnMut(u8) + Send,
{
    let result = split_video(
        ffmpeg,
        workspace,
        &form.video.path,
        &form.video.original_name,
        form.segment_secs,
        on_percent,
    )
    .await;
    // The upload goes away whether or not ffmpeg managed to split it.
    force_remove(&form.video.path).await;
    Ok(result?)
}

async fn read_split_form(mut payload: Multipart, state: &AppState) -> Result<SplitForm, ApiError> {
    let mut video_field_seen = false;
    let mut video: Option<SavedUpload> = None;
    let mut duration: Option<String> = None;

    let read = async {
        while let Some(item) = payload.next().await {
            let mut field = item.map_err(malformed)?;
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("video") if !video_field_seen => {
                    video_field_seen = true;
                    let filename = field
                        .content_disposition()
                        .and_then(|cd| cd.get_filename())
                        .unwrap_or_default()
                        .to_string();
                    if filename.is_empty() {
                        drain(&mut field).await?;
                    } else {
                        video = Some(save_upload(&mut field, &filename, state).await?);
                    }
                }
                Some("duration") => duration = Some(read_text(&mut field).await?),
                _ => drain(&mut field).await?,
            }
        }
        Ok::<(), ApiError>(())
    }
    .await;

    let validated = read.and_then(|()| {
        if !video_field_seen {
            return Err(ApiError::BadRequest("No video file uploaded"));
        }
        if video.is_none() {
            return Err(ApiError::BadRequest("No video file selected"));
        }
        parse_duration(duration.as_deref())
    });

    match (validated, video) {
        (Ok(segment_secs), Some(video)) => Ok(SplitForm {
            video,
            segment_secs,
        }),
        (Err(err), saved) => {
            if let Some(saved) = saved {
                force_remove(&saved.path).await;
            }
            Err(err)
        }
        (Ok(_), None) => Err(ApiError::BadRequest("No video file selected")),
    }
}

fn parse_duration(raw: Option<&str>) -> Result<u64, ApiError> {
    let value: i128 = raw
        .and_then(|s| s.trim().parse().ok())
        .ok_or(ApiError::BadRequest("Invalid duration value"))?;
    if value <= 0 {
        return Err(ApiError::BadRequest("Duration must be positive"));
    }
    u64::try_from(value).map_err(|_| ApiError::BadRequest("Invalid duration value"))
}

async fn save_upload(
    field: &mut Field,
    filename: &str,
    state: &AppState,
) -> Result<SavedUpload, ApiError> {
    let path = state.workspace.uploads().join(stored_upload_name(filename));
    if let Err(err) = write_field(field, &path, state.max_upload_bytes).await {
        force_remove(&path).await;
        return Err(err);
    }
    Ok(SavedUpload {
        path,
        original_name: filename.to_string(),
    })
}

async fn write_field(field: &mut Field, path: &Path, limit: u64) -> Result<u64, ApiError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        written += chunk.len() as u64;
        if written > limit {
            tracing::warn!(limit, "Upload exceeds size limit");
            return Err(ApiError::PayloadTooLarge);
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(written)
}

async fn read_text(field: &mut Field) -> Result<String, ApiError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        if buf.len() + chunk.len() > TEXT_FIELD_LIMIT {
            return Err(ApiError::BadRequest("Invalid duration value"));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn drain(field: &mut Field) -> Result<(), ApiError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(malformed)?;
    }
    Ok(())
}

fn malformed(err: actix_multipart::MultipartError) -> ApiError {
    tracing::warn!(error = %err, "Malformed multipart body");
    ApiError::BadRequest("Malformed upload")
}

/// Unique on-disk name for an upload: `<uuid>_<base name with spaces as underscores>`.
fn stored_upload_name(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .replace(' ', "_");
    let base = if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base
    };
    format!("{}_{}", uuid::Uuid::new_v4().simple(), base)
}
