//! JSON bodies for the HTTP surface.

use serde::Serialize;

use crate::training::TrainingStatus;

/// Root banner returned by `GET /`.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub endpoints: EndpointMap,
    pub status: &'static str,
}

/// Endpoint map embedded in the root banner.
#[derive(Debug, Serialize)]
pub struct EndpointMap {
    pub health: &'static str,
    pub predict: &'static str,
    pub retrain: &'static str,
    pub model_status: &'static str,
}

impl ServiceInfo {
    pub fn current() -> Self {
        Self {
            name: "Sentinel API",
            description: "Audio Distress Detection API using Deep Learning",
            version: env!("CARGO_PKG_VERSION"),
            endpoints: EndpointMap {
                health: "/health",
                predict: "/predict",
                retrain: "/retrain",
                model_status: "/model/status",
            },
            status: "running",
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

/// Body of `GET /model/status`.
#[derive(Debug, Serialize)]
pub struct ModelStatusBody {
    pub model_loaded: bool,
    pub is_training: bool,
    pub training_status: TrainingStatus,
    pub model_accuracy: Option<f32>,
}

/// Body of a successful `POST /predict`.
#[derive(Debug, Serialize)]
pub struct PredictionBody {
    pub prediction: &'static str,
    pub confidence: f32,
}

/// Body of an accepted `POST /retrain`.
#[derive(Debug, Serialize)]
pub struct RetrainAccepted {
    pub status: &'static str,
    pub message: String,
    pub training_started: bool,
    pub upload_id: Option<i64>,
    pub session_id: Option<i64>,
}

/// Error body shared by every failure status.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
