// src/handlers/uploads.rs

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use crate::{error::AppError, images::ImageManager};

/// Serves a stored image at GET /uploads/{dir}/{filename}.
///
/// Filenames are random and never reused, so a URL either always returns
/// the same bytes or 404s. That makes long-lived immutable caching safe.
pub async fn serve_upload(
    State(images): State<ImageManager>,
    Path((dir, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let (data, content_type) = images.open(&dir, &filename).await?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        data,
    ))
}
