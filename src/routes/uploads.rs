//! Listing image upload and download
//!
//! Uploaded files get a fresh UUID name inside the configured directory. The
//! returned URLs are what listings carry in `imageUrls`.

use anyhow::Context;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Request, State, multipart::MultipartRejection},
    response::Response,
};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use uuid::Uuid;

use crate::auth::models::AuthenticatedIdentity;
use crate::config::UploadConfig;
use crate::error::{ApiError, ApiResult};
use crate::routes::extract::PathParam;
use crate::server::AppState;

pub const MAX_FILES_PER_REQUEST: usize = 10;

/// Accepted content types and the extension stored files get
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Whole-request body cap for the upload route
pub fn request_limit(config: &UploadConfig) -> usize {
    config
        .max_file_bytes
        .saturating_mul(MAX_FILES_PER_REQUEST)
        .saturating_add(64 * 1024)
}

fn image_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

/// Only names this module could have produced are served
fn is_stored_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// `multipart/form-data` with one or more file parts (any field name).
/// Returns the public URL of every stored image, in upload order. Nothing
/// is written unless every part is an accepted image within the size cap.
pub async fn upload_images(
    identity: AuthenticatedIdentity,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Vec<String>>> {
    let mut multipart = multipart?;
    let limit = state.uploads.max_file_bytes;

    let mut pending: Vec<(String, Vec<u8>)> = Vec::new();
    while let Some(mut field) = multipart.next_field().await? {
        if field.file_name().is_none() {
            continue;
        }
        if pending.len() == MAX_FILES_PER_REQUEST {
            return Err(ApiError::Validation(format!(
                "At most {MAX_FILES_PER_REQUEST} images per upload"
            )));
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let Some(extension) = image_extension(&content_type) else {
            return Err(ApiError::Validation(format!(
                "Unsupported image type: {}",
                if content_type.is_empty() { "unknown" } else { content_type.as_str() }
            )));
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            if bytes.len() + chunk.len() > limit {
                return Err(ApiError::PayloadTooLarge(format!(
                    "Each image must be at most {limit} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            continue;
        }
        pending.push((format!("{}.{extension}", Uuid::new_v4()), bytes));
    }

    if pending.is_empty() {
        return Err(ApiError::Validation("No image files uploaded".to_string()));
    }

    let dir = &state.uploads.dir;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create upload directory {}", dir.display()))
        .map_err(ApiError::Internal)?;

    let mut urls = Vec::with_capacity(pending.len());
    for (name, bytes) in pending {
        tokio::fs::write(dir.join(&name), bytes)
            .await
            .with_context(|| format!("Failed to store image {name}"))
            .map_err(ApiError::Internal)?;
        urls.push(format!("{}{}", state.uploads.url_prefix, name));
    }
    tracing::info!("User {} uploaded {} image(s)", identity.user_id, urls.len());

    Ok(Json(urls))
}

pub async fn serve_image(
    State(state): State<AppState>,
    PathParam(filename): PathParam<String>,
    request: Request,
) -> ApiResult<Response> {
    if !is_stored_name(&filename) {
        return Err(ApiError::NotFound("Image"));
    }
    let path = state.uploads.dir.join(&filename);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(ApiError::NotFound("Image")),
    }

    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.map(Body::new))
}
