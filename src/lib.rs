pub mod api;
pub mod config;
pub mod error;
pub mod generator;
pub mod images;
pub mod init;
pub mod model;
pub mod registry;
pub mod scenario;
pub mod server;
pub mod store;
pub mod video;

pub use config::Config;
pub use generator::{JobHandle, JobOutcome, Orchestrator, Services};
pub use registry::ConnectionRegistry;

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!(tag, "{}", message),
        _ => tracing::info!(tag, "{}", message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
