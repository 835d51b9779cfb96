//! File-browser HTTP operations backed by the volume helper pod (§4.6, §6):
//! list-files, read-file, preview-file, copy-file, upload-file.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Result;
use crate::helper_pod::{self, Entry, FileContent};

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/".to_string()
}

pub async fn list_files(
    State(ctx): State<Context>,
    Query(q): Query<PathQuery>,
) -> Result<Json<Vec<Entry>>> {
    let entries = helper_pod::list(&ctx.client, &ctx.namespace, &ctx.config, &q.path).await?;
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
#[serde(tag = "encoding", rename_all = "lowercase")]
pub enum FileContentResponse {
    Text { content: String },
    Base64 { content: String },
}

impl From<FileContent> for FileContentResponse {
    fn from(content: FileContent) -> Self {
        match content {
            FileContent::Text(text) => FileContentResponse::Text { content: text },
            FileContent::Base64(b64) => FileContentResponse::Base64 { content: b64 },
        }
    }
}

pub async fn read_file(
    State(ctx): State<Context>,
    Query(q): Query<PathQuery>,
) -> Result<Json<FileContentResponse>> {
    let content = helper_pod::read(&ctx.client, &ctx.namespace, &ctx.config, &q.path).await?;
    Ok(Json(content.into()))
}

pub async fn preview_file(
    State(ctx): State<Context>,
    Query(q): Query<PathQuery>,
) -> Result<Json<FileContentResponse>> {
    let content = helper_pod::preview(&ctx.client, &ctx.namespace, &ctx.config, &q.path).await?;
    Ok(Json(content.into()))
}

#[derive(Debug, Deserialize)]
pub struct CopyRequest {
    pub source: String,
    pub destination: String,
}

pub async fn copy_file(
    State(ctx): State<Context>,
    Json(req): Json<CopyRequest>,
) -> Result<()> {
    helper_pod::copy(&ctx.client, &ctx.namespace, &ctx.config, &req.source, &req.destination).await
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub dir: String,
    pub filename: String,
    /// Base64-encoded file content (§4.6 "Uploads use the same envelope for bytes").
    pub content_base64: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub path: String,
}

pub async fn upload_file(
    State(ctx): State<Context>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    let bytes = BASE64
        .decode(req.content_base64.trim())
        .map_err(|e| crate::error::Error::Validation(format!("content_base64 is not valid base64: {e}")))?;

    let path = helper_pod::upload(&ctx.client, &ctx.namespace, &ctx.config, &req.dir, &req.filename, &bytes).await?;
    Ok(Json(UploadResponse { path }))
}
