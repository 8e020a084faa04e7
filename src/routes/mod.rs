mod files;
mod health;
mod metrics;
mod upload;

use crate::html;
use crate::server::SharedState;
use axum::{
    response::Html,
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload::upload_image))
        .route("/uploads/{file_name}", get(files::serve_image))
        .route("/health_check", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}

async fn index() -> Html<&'static str> {
    Html(html::INDEX_PAGE)
}
