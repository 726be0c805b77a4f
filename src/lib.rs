//! Library exports for the binary and integration tests.
/// HTTP surface: Rocket wiring, handlers and payloads.
pub mod api;
/// Shared service state.
pub mod app;
/// Application directory helpers.
pub mod app_dirs;
/// Best-effort audit log for uploads and retraining sessions.
pub mod audit;
/// Audio decoding and preparation.
pub mod audio;
/// Two-class dataset layout and archive organization.
pub mod dataset;
/// Logging setup.
pub mod logging;
/// Classifier, trainer and checkpoint store.
pub mod model;
/// Synchronous prediction path.
pub mod predict;
/// Log-mel spectrogram rendering.
pub mod spectrogram;
/// Training status, admission control and the retraining orchestrator.
pub mod training;
