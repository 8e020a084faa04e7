mod annotate;
mod bounding_box;
mod detection;
mod html;
mod routes;
mod server;
mod storage;
mod telemetry;

pub mod app;
pub mod config;

pub use app::start_app;
pub use storage::MediaType;
