//! End-to-end retraining pipeline scenarios driven through the orchestrator.

mod support;

use std::sync::Arc;

use sentinel::app::AppContext;
use sentinel::audit::AuditStore;
use sentinel::dataset::{DANGER_DIR_NAME, SAFE_DIR_NAME, count_audio_files};
use sentinel::model::{DangerClassifier, ModelMetadata};
use sentinel::training::TrainingPhase;
use sentinel::training::orchestrator::{RetrainJob, run_retrain};

use tempfile::tempdir;

fn context_with_audit(root: &std::path::Path) -> Arc<AppContext> {
    let audit = AuditStore::open(&root.join("audit.db")).expect("open audit db");
    Arc::new(AppContext::with_root(root, audit).expect("build context"))
}

fn seed_checkpoint(ctx: &AppContext) {
    let model = DangerClassifier::random_init(4, 42);
    ctx.model
        .save(&model, &ModelMetadata::default())
        .expect("seed checkpoint");
}

fn run_job(ctx: &Arc<AppContext>, zip_path: std::path::PathBuf) -> RetrainAudit {
    let upload_id = ctx.audit.record_upload(
        zip_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.zip"),
        &zip_path,
        std::fs::metadata(&zip_path).map(|meta| meta.len()).unwrap_or(0),
    );
    let session_id = ctx.audit.create_session(upload_id, 3);
    let guard = ctx.training.try_begin().expect("gate should admit");
    run_retrain(
        ctx.clone(),
        RetrainJob {
            zip_path,
            upload_id,
            session_id,
        },
        guard,
    );
    RetrainAudit {
        upload_id,
        session_id,
    }
}

struct RetrainAudit {
    upload_id: Option<i64>,
    session_id: Option<i64>,
}

#[test]
fn labeled_upload_trains_and_records_everything() {
    let dir = tempdir().unwrap();
    let ctx = context_with_audit(dir.path());
    seed_checkpoint(&ctx);

    let zip_path = dir.path().join("upload.zip");
    support::write_labeled_upload(&zip_path, 2, 3);
    let ids = run_job(&ctx, zip_path);

    let upload = ctx.audit.upload(ids.upload_id.unwrap()).unwrap();
    assert_eq!(upload.safe_count, 2);
    assert_eq!(upload.danger_count, 3);
    assert_eq!(upload.total_count, 5);
    assert_eq!(upload.status, "completed");
    assert!(upload.error_message.is_none());

    let session = ctx.audit.session(ids.session_id.unwrap()).unwrap();
    assert_eq!(session.status, "completed");
    assert!(session.final_accuracy.is_some());
    assert!(session.final_val_accuracy.is_some());
    assert!(session.final_loss.is_some());
    assert!(session.final_val_loss.is_some());
    // Upload counts plus the post-merge dataset listing: the merged files
    // are counted twice in the session row.
    assert_eq!(session.total_samples, Some(10));
    assert!(session.end_timestamp.is_some());

    assert_eq!(count_audio_files(&ctx.data_dir.join(SAFE_DIR_NAME)), 2);
    assert_eq!(count_audio_files(&ctx.data_dir.join(DANGER_DIR_NAME)), 3);

    let status = ctx.training.snapshot();
    assert_eq!(status.state, TrainingPhase::Completed);
    assert_eq!(status.progress, 100);
    assert!(!ctx.training.is_training());

    assert!(ctx.model.checkpoint_path().is_file());
    let metadata = ctx.model.metadata().unwrap();
    assert_eq!(metadata.epochs_trained, 3);
    assert_eq!(metadata.total_samples, 5);
    assert!(metadata.validation_accuracy().is_some());
    assert!(ctx.model.is_loaded());
}

#[test]
fn repeated_upload_grows_the_dataset_with_disambiguated_names() {
    let dir = tempdir().unwrap();
    let ctx = context_with_audit(dir.path());
    seed_checkpoint(&ctx);

    let zip_path = dir.path().join("upload.zip");
    support::write_labeled_upload(&zip_path, 1, 1);
    run_job(&ctx, zip_path.clone());
    run_job(&ctx, zip_path);

    assert_eq!(count_audio_files(&ctx.data_dir.join(SAFE_DIR_NAME)), 2);
    assert_eq!(count_audio_files(&ctx.data_dir.join(DANGER_DIR_NAME)), 2);
    assert!(
        ctx.data_dir
            .join(SAFE_DIR_NAME)
            .join("calm_0.wav")
            .is_file()
    );
}

#[test]
fn corrupt_archive_fails_the_run_and_releases_the_gate() {
    let dir = tempdir().unwrap();
    let ctx = context_with_audit(dir.path());
    seed_checkpoint(&ctx);

    let zip_path = dir.path().join("broken.zip");
    std::fs::write(&zip_path, b"definitely not a zip archive").unwrap();
    let ids = run_job(&ctx, zip_path);

    let upload = ctx.audit.upload(ids.upload_id.unwrap()).unwrap();
    assert_eq!(upload.status, "failed");
    assert!(upload.error_message.is_some());

    let session = ctx.audit.session(ids.session_id.unwrap()).unwrap();
    assert_eq!(session.status, "failed");
    assert!(session.error_message.is_some());
    assert!(session.final_accuracy.is_none());

    let status = ctx.training.snapshot();
    assert_eq!(status.state, TrainingPhase::Error);
    assert_eq!(status.progress, 0);
    assert!(status.message.starts_with("Training failed:"));
    assert!(!ctx.training.is_training());

    assert!(ctx.training.try_begin().is_some());
}

#[test]
fn upload_without_audio_files_is_rejected() {
    let dir = tempdir().unwrap();
    let ctx = context_with_audit(dir.path());
    seed_checkpoint(&ctx);

    let zip_path = dir.path().join("empty.zip");
    support::write_zip(&zip_path, &[("notes/readme.txt", b"no clips here")]);
    let ids = run_job(&ctx, zip_path);

    let session = ctx.audit.session(ids.session_id.unwrap()).unwrap();
    assert_eq!(session.status, "failed");
    assert!(
        session
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("No labeled audio files")
    );
    assert_eq!(ctx.training.snapshot().state, TrainingPhase::Error);
}

#[test]
fn pipeline_degrades_gracefully_without_audit_backend() {
    let dir = tempdir().unwrap();
    let ctx = Arc::new(AppContext::with_root(dir.path(), AuditStore::disabled()).unwrap());
    seed_checkpoint(&ctx);

    let zip_path = dir.path().join("upload.zip");
    support::write_labeled_upload(&zip_path, 1, 2);
    let guard = ctx.training.try_begin().unwrap();
    run_retrain(
        ctx.clone(),
        RetrainJob {
            zip_path,
            upload_id: None,
            session_id: None,
        },
        guard,
    );

    assert_eq!(ctx.training.snapshot().state, TrainingPhase::Completed);
    assert_eq!(count_audio_files(&ctx.data_dir.join(DANGER_DIR_NAME)), 2);
}

#[test]
fn missing_checkpoint_still_trains_from_scratch() {
    let dir = tempdir().unwrap();
    let ctx = context_with_audit(dir.path());

    let zip_path = dir.path().join("upload.zip");
    support::write_labeled_upload(&zip_path, 2, 2);
    run_job(&ctx, zip_path);

    assert_eq!(ctx.training.snapshot().state, TrainingPhase::Completed);
    assert!(ctx.model.checkpoint_path().is_file());
    assert!(ctx.model.is_loaded());
}
