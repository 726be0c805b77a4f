//! Checkpoint persistence and the shared in-process model handle.
//!
//! The store owns the lazily-loaded handle shared between the prediction path
//! and the training orchestrator. Only the orchestrator replaces it, as a
//! single `Arc` swap, so concurrent readers always observe a complete model.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::DangerClassifier;

/// Checkpoint filename inside the models directory.
pub const MODEL_FILE_NAME: &str = "sentinel_model.json";
/// Sidecar metadata filename inside the models directory.
pub const METADATA_FILE_NAME: &str = "sentinel_model_metadata.json";

/// Errors from checkpoint loading and saving.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No checkpoint file exists yet.
    #[error("Model checkpoint not found at {path}")]
    NotFound { path: PathBuf },
    /// Checkpoint file could not be read.
    #[error("Failed to read model checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Checkpoint file could not be parsed.
    #[error("Failed to parse model checkpoint {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Checkpoint parsed but failed shape validation.
    #[error("Invalid model checkpoint: {0}")]
    Invalid(String),
    /// Checkpoint or metadata could not be written.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Sidecar metadata recorded next to the checkpoint after each training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub epochs_trained: u32,
    #[serde(default)]
    pub total_samples: u64,
    #[serde(default)]
    pub last_accuracy: Option<f32>,
    #[serde(default)]
    pub last_val_accuracy: Option<f32>,
    #[serde(default)]
    pub last_loss: Option<f32>,
    #[serde(default)]
    pub last_val_loss: Option<f32>,
    /// Legacy key kept for checkpoints written by older deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_val_accuracy: Option<f32>,
}

impl ModelMetadata {
    /// Validation accuracy to report, preferring the most recent key.
    pub fn validation_accuracy(&self) -> Option<f32> {
        self.last_val_accuracy.or(self.final_val_accuracy)
    }
}

/// Owner of the checkpoint files and the shared model handle.
pub struct ModelStore {
    checkpoint_path: PathBuf,
    metadata_path: PathBuf,
    handle: RwLock<Option<Arc<DangerClassifier>>>,
}

impl ModelStore {
    /// Create a store rooted at the given models directory.
    pub fn new(models_dir: &Path) -> Self {
        Self {
            checkpoint_path: models_dir.join(MODEL_FILE_NAME),
            metadata_path: models_dir.join(METADATA_FILE_NAME),
            handle: RwLock::new(None),
        }
    }

    /// Path of the checkpoint file.
    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// True when a model handle is resident in memory.
    pub fn is_loaded(&self) -> bool {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Return the resident handle without touching disk.
    pub fn loaded(&self) -> Option<Arc<DangerClassifier>> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return the shared handle, loading the checkpoint on first use.
    ///
    /// Load failures are not cached; the next caller retries from disk.
    pub fn get_or_load(&self) -> Result<Arc<DangerClassifier>, ModelError> {
        if let Some(model) = self.loaded() {
            return Ok(model);
        }
        let loaded = Arc::new(self.load_from_disk()?);
        let mut guard = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent loader may have won; keep whichever landed first.
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }
        *guard = Some(loaded.clone());
        tracing::info!("Model loaded from {}", self.checkpoint_path.display());
        Ok(loaded)
    }

    /// Swap the shared handle to a newly trained model.
    pub fn replace(&self, model: Arc<DangerClassifier>) {
        let mut guard = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(model);
    }

    /// Persist a checkpoint and its metadata sidecar.
    pub fn save(
        &self,
        model: &DangerClassifier,
        metadata: &ModelMetadata,
    ) -> Result<(), ModelError> {
        write_json(&self.checkpoint_path, model)?;
        write_json(&self.metadata_path, metadata)?;
        Ok(())
    }

    /// Best-effort read of the metadata sidecar.
    pub fn metadata(&self) -> Option<ModelMetadata> {
        let bytes = std::fs::read(&self.metadata_path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                tracing::warn!(
                    "Unreadable model metadata at {}: {err}",
                    self.metadata_path.display()
                );
                None
            }
        }
    }

    fn load_from_disk(&self) -> Result<DangerClassifier, ModelError> {
        let path = &self.checkpoint_path;
        if !path.is_file() {
            return Err(ModelError::NotFound { path: path.clone() });
        }
        let bytes = std::fs::read(path).map_err(|source| ModelError::Read {
            path: path.clone(),
            source,
        })?;
        let model: DangerClassifier =
            serde_json::from_slice(&bytes).map_err(|source| ModelError::Parse {
                path: path.clone(),
                source,
            })?;
        model.validate().map_err(ModelError::Invalid)?;
        Ok(model)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ModelError> {
    let bytes = serde_json::to_vec(value).map_err(|source| ModelError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::other(source),
    })?;
    std::fs::write(path, bytes).map_err(|source| ModelError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn get_or_load_fails_without_checkpoint_and_retries() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        assert!(matches!(
            store.get_or_load(),
            Err(ModelError::NotFound { .. })
        ));
        assert!(!store.is_loaded());

        let model = DangerClassifier::random_init(2, 1);
        store.save(&model, &ModelMetadata::default()).unwrap();
        let loaded = store.get_or_load().unwrap();
        assert_eq!(loaded.hidden_size, 2);
        assert!(store.is_loaded());
    }

    #[test]
    fn checkpoint_round_trips() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let model = DangerClassifier::random_init(3, 9);
        store.save(&model, &ModelMetadata::default()).unwrap();

        let reopened = ModelStore::new(dir.path());
        let loaded = reopened.get_or_load().unwrap();
        assert_eq!(loaded.weights1, model.weights1);
        assert_eq!(loaded.bias2, model.bias2);
    }

    #[test]
    fn corrupt_checkpoint_surfaces_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MODEL_FILE_NAME), b"not json").unwrap();
        let store = ModelStore::new(dir.path());
        assert!(matches!(store.get_or_load(), Err(ModelError::Parse { .. })));
    }

    #[test]
    fn replace_swaps_the_shared_handle() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let first = Arc::new(DangerClassifier::random_init(2, 1));
        store.replace(first.clone());
        let second = Arc::new(DangerClassifier::random_init(4, 2));
        store.replace(second.clone());
        let current = store.loaded().unwrap();
        assert_eq!(current.hidden_size, 4);
    }

    #[test]
    fn metadata_prefers_last_val_accuracy() {
        let metadata = ModelMetadata {
            last_val_accuracy: Some(0.9),
            final_val_accuracy: Some(0.5),
            ..ModelMetadata::default()
        };
        assert_eq!(metadata.validation_accuracy(), Some(0.9));

        let legacy = ModelMetadata {
            final_val_accuracy: Some(0.5),
            ..ModelMetadata::default()
        };
        assert_eq!(legacy.validation_accuracy(), Some(0.5));
    }

    #[test]
    fn metadata_round_trips_through_store() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let model = DangerClassifier::random_init(2, 1);
        let metadata = ModelMetadata {
            epochs_trained: 3,
            total_samples: 5,
            last_accuracy: Some(0.8),
            last_val_accuracy: Some(0.75),
            last_loss: Some(0.4),
            last_val_loss: Some(0.5),
            final_val_accuracy: None,
        };
        store.save(&model, &metadata).unwrap();
        let read_back = store.metadata().unwrap();
        assert_eq!(read_back.epochs_trained, 3);
        assert_eq!(read_back.validation_accuracy(), Some(0.75));
    }
}
