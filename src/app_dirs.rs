//! Application directory helpers anchored to a single `.sentinel` folder.
//!
//! The helpers centralize where the dataset, uploads, model checkpoints and
//! log files live across platforms, defaulting to the OS config directory
//! (e.g., `%APPDATA%` on Windows) and allowing a `SENTINEL_DATA_HOME`
//! override for tests or portable setups.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the application directory that lives under the OS config root.
pub const APP_DIR_NAME: &str = ".sentinel";

static DATA_BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Errors that can occur while resolving or preparing application directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// No suitable base config directory could be resolved.
    #[error("No suitable base config directory available for application files")]
    NoBaseDir,
    /// Failed to create the application directory.
    #[error("Failed to create application directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the root `.sentinel` directory, creating it if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = data_base_dir().ok_or(AppDirError::NoBaseDir)?;
    let path = base.join(APP_DIR_NAME);
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Return the logs directory inside the `.sentinel` root, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    subdir("logs")
}

/// Return the canonical dataset root (`data/`), creating it if needed.
pub fn data_dir() -> Result<PathBuf, AppDirError> {
    subdir("data")
}

/// Return the uploads directory (`data/uploads/`), creating it if needed.
pub fn uploads_dir() -> Result<PathBuf, AppDirError> {
    let path = data_dir()?.join("uploads");
    ensure_dir(path)
}

/// Return the model checkpoint directory, creating it if needed.
pub fn models_dir() -> Result<PathBuf, AppDirError> {
    subdir("models")
}

fn subdir(name: &str) -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join(name))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn data_base_dir() -> Option<PathBuf> {
    if let Some(path) = DATA_BASE_OVERRIDE
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
    {
        return Some(path);
    }
    if let Ok(path) = std::env::var("SENTINEL_DATA_HOME") {
        return Some(PathBuf::from(path));
    }
    BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
fn set_data_base_override(path: PathBuf) {
    let mut guard = DATA_BASE_OVERRIDE
        .lock()
        .expect("data base override mutex poisoned");
    *guard = Some(path);
}

#[cfg(test)]
fn clear_data_base_override() {
    let mut guard = DATA_BASE_OVERRIDE
        .lock()
        .expect("data base override mutex poisoned");
    *guard = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct OverrideGuard;

    impl OverrideGuard {
        fn set(path: PathBuf) -> Self {
            set_data_base_override(path);
            Self
        }
    }

    impl Drop for OverrideGuard {
        fn drop(&mut self) {
            clear_data_base_override();
        }
    }

    #[test]
    fn uses_override_for_root_dir() {
        let base = tempdir().unwrap();
        let _guard = OverrideGuard::set(base.path().to_path_buf());
        let root = app_root_dir().unwrap();
        assert_eq!(root, base.path().join(APP_DIR_NAME));
        assert!(root.is_dir());
    }

    #[test]
    fn uploads_dir_nests_under_data() {
        let base = tempdir().unwrap();
        let _guard = OverrideGuard::set(base.path().to_path_buf());
        let uploads = uploads_dir().unwrap();
        assert_eq!(uploads, base.path().join(APP_DIR_NAME).join("data/uploads"));
        assert!(uploads.is_dir());
    }
}
