//! File-upload staging.
//!
//! `multipart/form-data` requests are parsed here. File parts are streamed to
//! the staging directory and listed in a [`StagedUploads`] extension; plain
//! text parts are kept as [`UploadFields`]. Downstream handlers see an empty
//! body and work from the extensions.
//!
//! Staged files live only as long as the request. Once the response is
//! produced every file still in the staging directory is removed, so a handler
//! that keeps an upload must move it elsewhere first.

use std::collections::HashMap;
use std::convert::Infallible;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::io::AsyncWriteExt;
use tower::{service_fn, Layer, ServiceExt};
use uuid::Uuid;

use crate::http::error::{ApiError, ApiResult};
use crate::http::middleware::body::media_type;
use crate::observability::metrics;

/// Where uploads are staged, and how large they may get.
#[derive(Debug, Clone)]
pub struct UploadStaging {
    dir: PathBuf,
    limit: usize,
}

impl UploadStaging {
    /// Create the staging directory, including missing parents.
    pub async fn prepare(dir: impl Into<PathBuf>, limit: usize) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::debug!(dir = %dir.display(), limit, "Upload staging ready");
        Ok(Self { dir, limit })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// One file written to the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Form field the file was sent under.
    pub field: String,
    /// Client-supplied file name, if any.
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    /// Location on disk.
    pub path: PathBuf,
    pub size: u64,
}

/// Files staged for the current request.
#[derive(Debug, Clone, Default)]
pub struct StagedUploads(pub Vec<StagedFile>);

/// Non-file form fields of the current multipart request.
#[derive(Debug, Clone, Default)]
pub struct UploadFields(pub HashMap<String, String>);

/// Stage 4: stage multipart uploads to disk.
pub async fn stage_uploads(
    State(staging): State<Arc<UploadStaging>>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    if media_type(request.headers()).as_deref() != Some("multipart/form-data") {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();

    // Multipart consumes a whole request; hand it one carrying only what it reads.
    let mut multipart_request = Request::new(body);
    if let Some(content_type) = parts.headers.get(header::CONTENT_TYPE) {
        multipart_request
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.clone());
    }
    let extractor = DefaultBodyLimit::max(staging.limit).layer(service_fn(|req: Request| async move {
        Ok::<_, Infallible>(Multipart::from_request(req, &()).await)
    }));
    let multipart = match extractor.oneshot(multipart_request).await {
        Ok(extracted) => extracted.map_err(|e| ApiError::MalformedUpload(e.body_text()))?,
        Err(never) => match never {},
    };

    let (files, fields) = match drain_multipart(multipart, &staging).await {
        Ok(staged) => staged,
        Err((written, err)) => {
            discard(&written).await;
            metrics::record_rejection("upload_staging");
            return Err(err);
        }
    };

    tracing::debug!(files = files.len(), fields = fields.len(), "Upload staged");

    let staged = files.clone();
    let mut request = Request::from_parts(parts, Body::empty());
    request.headers_mut().remove(header::CONTENT_LENGTH);
    request.extensions_mut().insert(StagedUploads(files));
    request.extensions_mut().insert(UploadFields(fields));
    let response = next.run(request).await;

    sweep(&staged).await;
    Ok(response)
}

type Drained = (Vec<StagedFile>, HashMap<String, String>);

async fn drain_multipart(
    mut multipart: Multipart,
    staging: &UploadStaging,
) -> Result<Drained, (Vec<StagedFile>, ApiError)> {
    let mut files = Vec::new();
    let mut fields = HashMap::new();
    let mut total = 0usize;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err((files, multipart_error(e))),
        };

        let name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            match field.text().await {
                Ok(text) => {
                    total += text.len();
                    if total > staging.limit {
                        return Err((files, ApiError::PayloadTooLarge));
                    }
                    fields.insert(name, text);
                    continue;
                }
                Err(e) => return Err((files, multipart_error(e))),
            }
        };

        let content_type = field.content_type().map(str::to_string);
        let path = staging.dir.join(Uuid::new_v4().to_string());
        let mut file = match tokio::fs::File::create(&path).await {
            Ok(file) => file,
            Err(e) => return Err((files, ApiError::internal(format!("staging {}: {e}", path.display())))),
        };

        let staged = StagedFile {
            field: name,
            file_name: Some(file_name),
            content_type,
            path: path.clone(),
            size: 0,
        };
        files.push(staged);

        let mut size = 0u64;
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    total += chunk.len();
                    if total > staging.limit {
                        return Err((files, ApiError::PayloadTooLarge));
                    }
                    size += chunk.len() as u64;
                    if let Err(e) = file.write_all(&chunk).await {
                        return Err((files, ApiError::internal(format!("staging {}: {e}", path.display()))));
                    }
                }
                Ok(None) => break,
                Err(e) => return Err((files, multipart_error(e))),
            }
        }
        if let Err(e) = file.flush().await {
            return Err((files, ApiError::internal(format!("staging {}: {e}", path.display()))));
        }
        if let Some(last) = files.last_mut() {
            last.size = size;
        }
    }

    Ok((files, fields))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::MalformedUpload(err.body_text())
    }
}

async fn discard(files: &[StagedFile]) {
    for file in files {
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::warn!(path = %file.path.display(), error = %e, "Failed to discard staged upload");
        }
    }
}

/// Remove files the handler left behind. Moved files are skipped.
async fn sweep(files: &[StagedFile]) {
    let mut removed = 0usize;
    for file in files {
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %file.path.display(), error = %e, "Failed to remove staged upload");
            }
        }
    }
    if removed > 0 {
        tracing::debug!(removed, "Staged uploads cleaned up");
    }
}
