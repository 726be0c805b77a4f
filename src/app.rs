//! Shared service state wired into the HTTP layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_dirs::{self, AppDirError};
use crate::audit::AuditStore;
use crate::model::ModelStore;
use crate::training::TrainingState;

/// Everything the handlers and the orchestrator share.
pub struct AppContext {
    /// Canonical dataset root holding `safe/` and `danger/`.
    pub data_dir: PathBuf,
    /// Where uploaded archives are stored and extracted.
    pub uploads_dir: PathBuf,
    /// Owner of the checkpoint files and the shared model handle.
    pub model: ModelStore,
    /// Training status and the single-job admission gate.
    pub training: Arc<TrainingState>,
    /// Best-effort audit log.
    pub audit: AuditStore,
}

impl AppContext {
    /// Build the context from the platform application directories and the
    /// audit backend selected by the environment.
    pub fn initialize() -> Result<Self, AppDirError> {
        let data_dir = app_dirs::data_dir()?;
        let uploads_dir = app_dirs::uploads_dir()?;
        let models_dir = app_dirs::models_dir()?;
        Ok(Self::assemble(
            data_dir,
            uploads_dir,
            &models_dir,
            AuditStore::from_env(),
        ))
    }

    /// Build a context rooted at an explicit directory. Used by tests and
    /// portable deployments that bypass the platform directories.
    pub fn with_root(root: &Path, audit: AuditStore) -> Result<Self, std::io::Error> {
        let data_dir = root.join("data");
        let uploads_dir = data_dir.join("uploads");
        let models_dir = root.join("models");
        for dir in [&data_dir, &uploads_dir, &models_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self::assemble(data_dir, uploads_dir, &models_dir, audit))
    }

    fn assemble(
        data_dir: PathBuf,
        uploads_dir: PathBuf,
        models_dir: &Path,
        audit: AuditStore,
    ) -> Self {
        Self {
            data_dir,
            uploads_dir,
            model: ModelStore::new(models_dir),
            training: Arc::new(TrainingState::new()),
            audit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn with_root_creates_the_directory_layout() {
        let dir = tempdir().unwrap();
        let ctx = AppContext::with_root(dir.path(), AuditStore::disabled()).unwrap();
        assert!(ctx.data_dir.is_dir());
        assert!(ctx.uploads_dir.is_dir());
        assert!(!ctx.model.is_loaded());
        assert!(!ctx.training.is_training());
    }
}
