use actix_web::http::header::{self, ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::error::ApiError;
use crate::negotiate::accepts;
use crate::page::render_index;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct FileListing {
    files: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ClearResult {
    success: bool,
}

#[get("/")]
pub async fn index(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let files = state.workspace.list_outputs().await?;
    if accepts(&req, "application/json") {
        return Ok(HttpResponse::Ok().json(FileListing { files }));
    }
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render_index(&files)))
}

#[post("/clear")]
pub async fn clear_all(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let _guard = state.jobs.lock().await;
    let success = state.workspace.clean().await;
    if !success {
        tracing::error!("Failed to clean working folders");
    } else {
        tracing::info!("Cleared uploads and output");
    }

    match (success, accepts(&req, "application/json")) {
        (true, true) => HttpResponse::Ok().json(ClearResult { success }),
        (true, false) => HttpResponse::SeeOther()
            .insert_header((header::LOCATION, "/"))
            .finish(),
        (false, true) => HttpResponse::InternalServerError().json(ClearResult { success }),
        (false, false) => HttpResponse::InternalServerError()
            .content_type("text/plain; charset=utf-8")
            .body("Some files could not be cleared"),
    }
}

#[get("/output/{filename}")]
pub async fn download_file(
    filename: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let filename = filename.into_inner();
    let path = state
        .workspace
        .output_file(&filename)
        .ok_or(ApiError::NotFound)?;

    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ApiError::NotFound),
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() {
        return Err(ApiError::BadRequest("Not a file"));
    }

    let file = tokio::fs::File::open(&path).await?;
    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&filename))
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .no_chunking(meta.len())
        .streaming(ReaderStream::new(file)))
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "zip" => "application/zip",
        Some(ext) if ext == "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
