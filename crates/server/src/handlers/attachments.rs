//! Public attachment serving.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use certfolio_core::media::content_type_for_key;
use futures::StreamExt;

/// GET /static/{*path} - Stream an attachment by its `image_path`.
pub async fn serve_attachment(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Response> {
    let (meta, stream) = state.attachments.open(&path).await?;
    let body_stream = stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));
    let size = meta.size.to_string();

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type_for_key(&path)),
            (CONTENT_LENGTH, size.as_str()),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}
