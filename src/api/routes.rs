//! Route handlers for the HTTP surface.

use std::path::Path;
use std::sync::Arc;

use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use tempfile::TempDir;

use crate::app::AppContext;
use crate::model::TrainOptions;
use crate::predict;
use crate::training::orchestrator::{self, RetrainJob};

use super::ApiError;
use super::payloads::{Health, ModelStatusBody, PredictionBody, RetrainAccepted, ServiceInfo};

/// Multipart upload carrying a single `file` field.
#[derive(rocket::FromForm)]
pub(crate) struct AudioUpload<'r> {
    pub(crate) file: TempFile<'r>,
}

#[get("/")]
pub(crate) fn index() -> Json<ServiceInfo> {
    Json(ServiceInfo::current())
}

#[get("/health")]
pub(crate) fn health() -> Json<Health> {
    Json(Health { status: "healthy" })
}

#[get("/model/status")]
pub(crate) fn model_status(ctx: &State<Arc<AppContext>>) -> Json<ModelStatusBody> {
    if !ctx.model.is_loaded() {
        if let Err(err) = ctx.model.get_or_load() {
            tracing::debug!("Model not available for status query: {err}");
        }
    }
    let model_accuracy = ctx
        .model
        .metadata()
        .and_then(|metadata| metadata.validation_accuracy());
    Json(ModelStatusBody {
        model_loaded: ctx.model.is_loaded(),
        is_training: ctx.training.is_training(),
        training_status: ctx.training.snapshot(),
        model_accuracy,
    })
}

#[post("/predict", data = "<upload>")]
pub(crate) async fn predict_clip(
    upload: Form<AudioUpload<'_>>,
    ctx: &State<Arc<AppContext>>,
) -> Result<Json<PredictionBody>, ApiError> {
    let model = ctx
        .model
        .get_or_load()
        .map_err(|err| ApiError::ServiceUnavailable(format!("Model not available: {err}")))?;

    let mut upload = upload.into_inner();
    let file_name = stored_file_name(&upload.file, "clip.wav");
    tracing::info!("Processing prediction for {file_name}");

    let scratch = TempDir::new()
        .map_err(|err| ApiError::Internal(format!("Failed to create scratch dir: {err}")))?;
    let audio_path = scratch.path().join(&file_name);
    upload
        .file
        .copy_to(&audio_path)
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to store upload: {err}")))?;

    let outcome = rocket::tokio::task::spawn_blocking(move || {
        let result = predict::classify_clip_file(&model, &audio_path);
        // Scratch dir (audio plus any intermediates) is removed here whether
        // or not classification succeeded.
        drop(scratch);
        result
    })
    .await;

    match outcome {
        Ok(Ok(prediction)) => {
            tracing::info!(
                "Result: {} ({}%)",
                prediction.label.as_str(),
                prediction.confidence_percent
            );
            Ok(Json(PredictionBody {
                prediction: prediction.label.as_str(),
                confidence: prediction.confidence_percent,
            }))
        }
        Ok(Err(err)) => Err(ApiError::Internal(err)),
        Err(err) => Err(ApiError::Internal(format!("Prediction task failed: {err}"))),
    }
}

#[post("/retrain", data = "<upload>")]
pub(crate) async fn retrain(
    upload: Form<AudioUpload<'_>>,
    ctx: &State<Arc<AppContext>>,
) -> Result<Json<RetrainAccepted>, ApiError> {
    let Some(guard) = ctx.training.try_begin() else {
        return Err(ApiError::Conflict(
            "Model is already training. Please wait.".to_string(),
        ));
    };

    if let Err(err) = ctx.model.get_or_load() {
        // Guard drops on return, releasing the admission gate.
        return Err(ApiError::ServiceUnavailable(format!(
            "Model not available. Cannot retrain: {err}"
        )));
    }

    let mut upload = upload.into_inner();
    let file_name = stored_file_name(&upload.file, "upload.zip");
    let zip_path = ctx.uploads_dir.join(&file_name);
    upload
        .file
        .copy_to(&zip_path)
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to save file: {err}")))?;
    let file_size = std::fs::metadata(&zip_path)
        .map(|meta| meta.len())
        .unwrap_or(0);

    let upload_id = ctx.audit.record_upload(&file_name, &zip_path, file_size);
    let session_id = ctx
        .audit
        .create_session(upload_id, TrainOptions::default().epochs as u32);
    let message = match (upload_id, session_id) {
        (Some(upload_id), Some(session_id)) => format!(
            "File saved to audit database (Upload ID: {upload_id}, Session ID: {session_id}). \
             Training pipeline started in background."
        ),
        _ => "File saved to filesystem (audit logging unavailable). \
              Training pipeline started in background."
            .to_string(),
    };

    let job = RetrainJob {
        zip_path,
        upload_id,
        session_id,
    };
    let background_ctx = ctx.inner().clone();
    rocket::tokio::task::spawn_blocking(move || {
        orchestrator::run_retrain(background_ctx, job, guard)
    });

    Ok(Json(RetrainAccepted {
        status: "Retraining Initiated",
        message,
        training_started: true,
        upload_id,
        session_id,
    }))
}

/// Client-supplied filename reduced to its final component, with a fallback.
fn stored_file_name(file: &TempFile<'_>, fallback: &str) -> String {
    let raw = file
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str())
        .unwrap_or(fallback);
    Path::new(raw)
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .unwrap_or_else(|| fallback.to_string())
}
