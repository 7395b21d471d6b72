//! Intake of the single video staged for upload.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use percent_encoding::percent_decode_str;

/// Largest file the server accepts.
pub const MAX_UPLOAD_BYTES: u64 = 200 * 1024 * 1024;

const VIDEO_TYPES: &[(&str, &str)] = &[
    ("3gp", "video/3gpp"),
    ("avi", "video/x-msvideo"),
    ("flv", "video/x-flv"),
    ("m4v", "video/x-m4v"),
    ("mkv", "video/x-matroska"),
    ("mov", "video/quicktime"),
    ("mp4", "video/mp4"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("ogv", "video/ogg"),
    ("ts", "video/mp2t"),
    ("webm", "video/webm"),
    ("wmv", "video/x-ms-wmv"),
];

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("{0} is not a file")]
    NotAFile(PathBuf),

    #[error("{0} is not a video file")]
    NotVideo(String),

    #[error("{name} is {size} bytes; the limit is {limit} bytes")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedVideo {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime: &'static str,
    /// Filled in once probing finishes.
    pub duration: Option<Duration>,
}

/// Validates `path` and captures the metadata shown in the preview.
pub fn stage(path: impl AsRef<Path>) -> Result<StagedVideo, IntakeError> {
    let path = path.as_ref();
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(IntakeError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(IntakeError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if !meta.is_file() {
        return Err(IntakeError::NotAFile(path.to_path_buf()));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = video_mime_for(path).ok_or_else(|| IntakeError::NotVideo(name.clone()))?;

    let size = meta.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(IntakeError::TooLarge {
            name,
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }

    Ok(StagedVideo {
        path: path.to_path_buf(),
        name,
        size,
        mime,
        duration: None,
    })
}

/// MIME type implied by the extension, if it is a known video type.
pub fn video_mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    VIDEO_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// Cleans up a path as terminals paste it when a file is dropped on them.
pub fn normalize_dropped_path(raw: &str) -> PathBuf {
    let mut text = raw.trim();
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = &text[1..text.len() - 1];
            break;
        }
    }
    if text.starts_with("file://") {
        token_path(text)
    } else {
        PathBuf::from(unescape_shell(text))
    }
}

/// Picks the file to stage from pasted or typed input.
///
/// Dropping several files pastes them as one whitespace-separated string;
/// only the first is used. Input naming an existing file as a whole wins, so
/// a typed path with bare spaces still works.
pub fn first_dropped_path(raw: &str) -> PathBuf {
    let whole = normalize_dropped_path(raw);
    if whole.is_file() {
        return whole;
    }
    split_dropped_paths(raw).into_iter().next().unwrap_or(whole)
}

/// Splits a multi-file drop into its paths, honouring quotes and the same
/// backslash escapes as a single dropped path.
pub fn split_dropped_paths(raw: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut token = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => token.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c == '\\' => {
                token.push(chars.next_if(|n| is_escapable(*n)).unwrap_or(c));
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    paths.push(token_path(&token));
                    token.clear();
                    in_token = false;
                }
            }
            None => {
                token.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        paths.push(token_path(&token));
    }
    paths
}

fn token_path(token: &str) -> PathBuf {
    match token.strip_prefix("file://") {
        Some(uri) => PathBuf::from(percent_decode_str(uri).decode_utf8_lossy().into_owned()),
        None => PathBuf::from(token),
    }
}

fn is_escapable(c: char) -> bool {
    matches!(c, ' ' | '(' | ')' | '\'' | '&')
}

fn unescape_shell(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next_if(|n| is_escapable(*n)) {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}
