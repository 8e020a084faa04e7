use crate::{
    annotate::{CanvasError, ImageCanvas},
    bounding_box::DetectedRegion,
    detection::DetectionError,
    html,
    server::SharedState,
    storage::{MediaType, StorageError},
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no image file was provided in the `image` field")]
    MissingImageField,
    #[error("invalid file type `{0}`. Only JPEG and PNG are allowed")]
    UnsupportedMediaType(String),
    #[error("file too large (max {max_bytes} bytes)")]
    TooLarge { max_bytes: usize },
    #[error("could not read the uploaded image: {0}")]
    InvalidImage(CanvasError),
    #[error("failed to read the multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("object detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to render the annotated image: {0}")]
    Annotate(CanvasError),
}

impl UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            UploadError::MissingImageField
            | UploadError::UnsupportedMediaType(_)
            | UploadError::InvalidImage(_)
            | UploadError::Multipart(_) => StatusCode::BAD_REQUEST,
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Detection(DetectionError::Throttled(_)) => StatusCode::SERVICE_UNAVAILABLE,
            UploadError::Detection(_) => StatusCode::BAD_GATEWAY,
            UploadError::Storage(_) | UploadError::Annotate(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            // Local failures: log the details, keep the body generic.
            UploadError::Storage(_) | UploadError::Annotate(_) => {
                tracing::error!("upload failed: {:?}", self);
                (status, "Something went wrong processing the upload".to_string()).into_response()
            }
            UploadError::Detection(_) => {
                tracing::error!("upload failed: {:?}", self);
                (status, self.to_string()).into_response()
            }
            _ => (status, self.to_string()).into_response(),
        }
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub original: String,
    pub annotated: String,
    pub regions: Vec<DetectedRegion>,
}

#[instrument(skip(state, headers, multipart))]
pub async fn upload_image(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, UploadError> {
    state.metrics.record_upload();

    let field = loop {
        match multipart.next_field().await? {
            Some(field) if field.name() == Some("image") => break field,
            Some(_) => continue,
            None => {
                state.metrics.record_rejected("missing_field");
                return Err(UploadError::MissingImageField);
            }
        }
    };

    let file_name = field.file_name().unwrap_or_default().to_string();
    if file_name.is_empty() {
        state.metrics.record_rejected("missing_field");
        return Err(UploadError::MissingImageField);
    }

    // Media type is checked before the body is read, and well before the
    // detection provider is involved.
    let content_type = field.content_type().map(str::to_string);
    let media_type = match declared_media_type(content_type.as_deref(), &file_name) {
        Some(media_type) if state.upload_config.is_allowed(media_type) => media_type,
        _ => {
            state.metrics.record_rejected("media_type");
            return Err(UploadError::UnsupportedMediaType(
                content_type.unwrap_or(file_name),
            ));
        }
    };

    let data = field.bytes().await?;
    if data.len() > state.upload_config.max_upload_size {
        state.metrics.record_rejected("too_large");
        return Err(UploadError::TooLarge {
            max_bytes: state.upload_config.max_upload_size,
        });
    }

    let canvas = ImageCanvas::from_bytes(&data).map_err(UploadError::InvalidImage)?;
    let (width, height) = canvas.dimensions();
    tracing::debug!("Decoded {}x{} upload ({} bytes)", width, height, data.len());

    let original = state.store.store(&file_name, "", media_type, &data).await?;
    tracing::debug!("Stored original at {:?}", original.path);

    let started = Instant::now();
    let regions = state.detector.detect(&data, media_type).await?;
    state.metrics.record_detection_duration(
        started.elapsed().as_millis() as u64,
        state.detector.backend_name(),
    );
    tracing::debug!("Detection returned {} regions", regions.len());

    let threshold = state.upload_config.confidence_threshold;
    let annotated_bytes = canvas
        .annotate(&regions, threshold)
        .encode(media_type)
        .map_err(UploadError::Annotate)?;
    let annotated = state
        .store
        .store(&file_name, "labeled_", media_type, &annotated_bytes)
        .await?;

    let response = UploadResponse {
        original: format!("/uploads/{}", original.file_name),
        annotated: format!("/uploads/{}", annotated.file_name),
        regions,
    };

    if wants_json(&headers) {
        Ok(Json(response).into_response())
    } else {
        Ok(Html(html::result_page(
            &response.original,
            &response.annotated,
            &response.regions,
            threshold,
        ))
        .into_response())
    }
}

/// The part's declared content type wins; the file extension is the
/// fallback for clients that send none.
fn declared_media_type(content_type: Option<&str>, file_name: &str) -> Option<MediaType> {
    content_type
        .and_then(MediaType::from_content_type)
        .or_else(|| MediaType::from_file_name(file_name))
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn declared_content_type_wins_over_extension() {
        assert_eq!(
            declared_media_type(Some("image/png"), "photo.jpg"),
            Some(MediaType::Png)
        );
    }

    #[test]
    fn extension_is_the_fallback() {
        assert_eq!(
            declared_media_type(None, "photo.jpeg"),
            Some(MediaType::Jpeg)
        );
        assert_eq!(
            declared_media_type(Some("application/octet-stream"), "photo.png"),
            Some(MediaType::Png)
        );
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert_eq!(declared_media_type(Some("image/gif"), "anim.gif"), None);
        assert_eq!(declared_media_type(None, "notes.txt"), None);
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            UploadError::MissingImageField.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::UnsupportedMediaType("image/gif".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::TooLarge { max_bytes: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            UploadError::Detection(DetectionError::Auth("denied".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            UploadError::Detection(DetectionError::Throttled("slow down".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn json_is_opt_in_via_accept_header() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert!(!wants_json(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        assert!(wants_json(&headers));
    }
}
