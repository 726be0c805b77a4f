//! The retraining pipeline: organize, merge, train, persist, report.
//!
//! One job runs at a time under the admission gate. Every failure is caught
//! at this boundary and recorded into the audit rows and the in-memory
//! status; nothing propagates to the caller, and already-merged dataset
//! files are deliberately left in place.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::app::AppContext;
use crate::audit::{SessionOutcome, SessionStatus, UploadStatus};
use crate::dataset::{
    self, DANGER_DIR_NAME, DatasetError, SAFE_DIR_NAME, count_audio_files,
};
use crate::model::{ModelError, ModelMetadata, TrainError, TrainOptions, train::train_classifier};

use super::{TrainingGuard, TrainingStatus};

/// Description of one accepted retraining job.
pub struct RetrainJob {
    /// Stored upload archive to organize and merge.
    pub zip_path: PathBuf,
    pub upload_id: Option<i64>,
    pub session_id: Option<i64>,
}

#[derive(Debug, Error)]
enum PipelineError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("No labeled audio files found in upload")]
    EmptyUpload,
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Failed to clear extraction scratch {path}: {source}")]
    ClearScratch {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Run one retraining job to completion, holding the admission guard.
///
/// Intended to run on a blocking worker detached from the request handler.
pub fn run_retrain(ctx: Arc<AppContext>, job: RetrainJob, guard: TrainingGuard) {
    tracing::info!("Retraining started for {}", job.zip_path.display());
    if let Err(err) = run_pipeline(&ctx, &job) {
        let message = err.to_string();
        tracing::error!("Retraining failed: {message}");
        ctx.audit.fail_session(job.session_id, &message);
        ctx.audit
            .update_upload_status(job.upload_id, UploadStatus::Failed, Some(&message));
        ctx.training
            .set(TrainingStatus::error(format!("Training failed: {message}")));
    }
    drop(guard);
}

fn run_pipeline(ctx: &AppContext, job: &RetrainJob) -> Result<(), PipelineError> {
    ctx.training.set(TrainingStatus::preprocessing(
        "Extracting and organizing data...",
        10,
    ));
    ctx.audit
        .update_session_status(job.session_id, SessionStatus::Preprocessing);

    let extract_dir = ctx.uploads_dir.join("extracted");
    if extract_dir.exists() {
        std::fs::remove_dir_all(&extract_dir).map_err(|source| PipelineError::ClearScratch {
            path: extract_dir.clone(),
            source,
        })?;
    }
    let split = dataset::extract_and_organize(&job.zip_path, &extract_dir)?;
    ctx.audit
        .update_upload_status(job.upload_id, UploadStatus::Processing, None);
    ctx.audit
        .update_upload_counts(job.upload_id, split.safe_count, split.danger_count);
    if split.total() == 0 {
        return Err(PipelineError::EmptyUpload);
    }

    dataset::merge_into_dataset(&split, &ctx.data_dir)?;
    // Session rows report the upload's counts plus the post-merge dataset
    // listing, which counts the just-merged files a second time. The
    // checkpoint metadata carries the single canonical count instead.
    let session_samples = split.total()
        + count_audio_files(&ctx.data_dir.join(SAFE_DIR_NAME))
        + count_audio_files(&ctx.data_dir.join(DANGER_DIR_NAME));
    ctx.training.set(TrainingStatus::preprocessing(
        "Preprocessing audio files...",
        30,
    ));

    let options = TrainOptions::default();
    ctx.training
        .set(TrainingStatus::training(options.epochs as u32));
    ctx.audit
        .update_session_status(job.session_id, SessionStatus::Training);

    let existing = match ctx.model.get_or_load() {
        Ok(model) => Some(model),
        Err(err) => {
            tracing::warn!("No existing model to fine-tune ({err}); training from scratch");
            None
        }
    };
    let report = train_classifier(&ctx.data_dir, existing.as_deref(), &options)?;

    let Some(last) = report.history.last().copied() else {
        return Err(PipelineError::Train(TrainError::EmptyDataset));
    };
    let metadata = ModelMetadata {
        epochs_trained: options.epochs as u32,
        total_samples: report.total_samples as u64,
        last_accuracy: Some(last.accuracy),
        last_val_accuracy: Some(last.val_accuracy),
        last_loss: Some(last.loss),
        last_val_loss: Some(last.val_loss),
        final_val_accuracy: None,
    };
    ctx.model.save(&report.model, &metadata)?;
    ctx.model.replace(Arc::new(report.model));

    ctx.audit.complete_session(
        job.session_id,
        &SessionOutcome {
            final_accuracy: last.accuracy,
            final_val_accuracy: last.val_accuracy,
            final_loss: last.loss,
            final_val_loss: last.val_loss,
            total_samples: session_samples as u64,
        },
    );
    ctx.audit
        .update_upload_status(job.upload_id, UploadStatus::Completed, None);
    ctx.training.set(TrainingStatus::completed(
        last.val_accuracy,
        options.epochs as u32,
    ));
    tracing::info!(
        "Retraining completed over {} samples; validation accuracy {:.2}%",
        report.total_samples,
        last.val_accuracy * 100.0
    );
    Ok(())
}
