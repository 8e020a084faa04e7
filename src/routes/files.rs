use crate::server::SharedState;
use crate::storage::MediaType;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Serve a stored original or annotated image back to the result page.
pub async fn serve_image(
    State(state): State<SharedState>,
    Path(file_name): Path<String>,
) -> Response {
    let Some(path) = state.store.resolve(&file_name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(media_type) = MediaType::from_file_name(&file_name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, media_type.content_type())],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
