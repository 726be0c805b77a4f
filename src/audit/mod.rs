//! Best-effort audit log for uploads and retraining sessions.
//!
//! The store is an optional collaborator: when the `SENTINEL_AUDIT_DB`
//! variable is unset or the database cannot be opened, every operation
//! becomes a logged no-op and the functional pipeline proceeds unaffected.
//! Write failures are likewise logged and swallowed, never propagated.

mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Environment variable selecting the audit database path.
pub const AUDIT_DB_ENV: &str = "SENTINEL_AUDIT_DB";

/// Lifecycle of a stored upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }
}

/// Lifecycle of a retraining session, mirroring the in-memory phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Preprocessing,
    Training,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Preprocessing => "preprocessing",
            SessionStatus::Training => "training",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

/// Errors returned when opening the audit database.
#[derive(Debug, Error)]
pub enum AuditError {
    /// SQLite query failed.
    #[error("Audit database query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    /// Parent directory for the database file could not be created.
    #[error("Could not prepare audit database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Final metrics persisted when a session completes.
#[derive(Debug, Clone, Copy)]
pub struct SessionOutcome {
    pub final_accuracy: f32,
    pub final_val_accuracy: f32,
    pub final_loss: f32,
    pub final_val_loss: f32,
    pub total_samples: u64,
}

/// One row of `training_data_uploads`.
#[derive(Debug, Clone)]
pub struct UploadRow {
    pub id: i64,
    pub filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub status: String,
    pub safe_count: u32,
    pub danger_count: u32,
    pub total_count: u32,
    pub error_message: Option<String>,
}

/// One row of `retraining_sessions`.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: i64,
    pub upload_id: Option<i64>,
    pub status: String,
    pub epochs: u32,
    pub end_timestamp: Option<i64>,
    pub final_accuracy: Option<f32>,
    pub final_val_accuracy: Option<f32>,
    pub final_loss: Option<f32>,
    pub final_val_loss: Option<f32>,
    pub total_samples: Option<u64>,
    pub error_message: Option<String>,
}

/// SQLite-backed audit log with graceful degradation.
pub struct AuditStore {
    inner: Option<Mutex<Connection>>,
}

impl AuditStore {
    /// Open the store selected by [`AUDIT_DB_ENV`], degrading to a no-op
    /// when the variable is unset or the database cannot be opened.
    pub fn from_env() -> Self {
        let Ok(path) = std::env::var(AUDIT_DB_ENV) else {
            tracing::info!("{AUDIT_DB_ENV} not set; audit logging disabled");
            return Self::disabled();
        };
        match Self::open(Path::new(&path)) {
            Ok(store) => {
                tracing::info!("Audit database at {path}");
                store
            }
            Err(err) => {
                tracing::warn!("Audit database unavailable ({err}); continuing without it");
                Self::disabled()
            }
        }
    }

    /// Open (or create) the audit database at an explicit path.
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| AuditError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let connection = Connection::open(path)?;
        connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;
        schema::apply_schema(&connection)?;
        Ok(Self {
            inner: Some(Mutex::new(connection)),
        })
    }

    /// A store that ignores every operation.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// True when a backing database is connected.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Insert an upload row; returns its id when auditing is available.
    pub fn record_upload(&self, filename: &str, stored_path: &Path, size: u64) -> Option<i64> {
        self.with_conn("record_upload", |conn| {
            conn.prepare_cached(
                "INSERT INTO training_data_uploads
                    (filename, file_path, file_size, upload_timestamp, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                filename,
                stored_path.display().to_string(),
                size as i64,
                epoch_seconds(),
                UploadStatus::Pending.as_str(),
            ])?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Update the per-class counts on an upload row.
    pub fn update_upload_counts(&self, upload_id: Option<i64>, safe: usize, danger: usize) {
        let Some(id) = upload_id else { return };
        self.with_conn("update_upload_counts", |conn| {
            conn.prepare_cached(
                "UPDATE training_data_uploads
                    SET safe_count = ?2, danger_count = ?3, total_count = ?4
                  WHERE id = ?1",
            )?
            .execute(params![
                id,
                safe as i64,
                danger as i64,
                (safe + danger) as i64
            ])?;
            Ok(())
        });
    }

    /// Advance an upload row's status, optionally recording error text.
    pub fn update_upload_status(
        &self,
        upload_id: Option<i64>,
        status: UploadStatus,
        error_message: Option<&str>,
    ) {
        let Some(id) = upload_id else { return };
        self.with_conn("update_upload_status", |conn| {
            conn.prepare_cached(
                "UPDATE training_data_uploads
                    SET status = ?2, error_message = ?3
                  WHERE id = ?1",
            )?
            .execute(params![id, status.as_str(), error_message])?;
            Ok(())
        });
    }

    /// Insert a retraining session row linked to an upload.
    pub fn create_session(&self, upload_id: Option<i64>, epochs: u32) -> Option<i64> {
        self.with_conn("create_session", |conn| {
            conn.prepare_cached(
                "INSERT INTO retraining_sessions (upload_id, start_timestamp, status, epochs)
                 VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                upload_id,
                epoch_seconds(),
                SessionStatus::Pending.as_str(),
                epochs as i64,
            ])?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Advance a session row's status.
    pub fn update_session_status(&self, session_id: Option<i64>, status: SessionStatus) {
        let Some(id) = session_id else { return };
        self.with_conn("update_session_status", |conn| {
            conn.prepare_cached("UPDATE retraining_sessions SET status = ?2 WHERE id = ?1")?
                .execute(params![id, status.as_str()])?;
            Ok(())
        });
    }

    /// Close out a session with its final metrics.
    pub fn complete_session(&self, session_id: Option<i64>, outcome: &SessionOutcome) {
        let Some(id) = session_id else { return };
        self.with_conn("complete_session", |conn| {
            conn.prepare_cached(
                "UPDATE retraining_sessions
                    SET status = ?2, end_timestamp = ?3, final_accuracy = ?4,
                        final_val_accuracy = ?5, final_loss = ?6, final_val_loss = ?7,
                        total_samples = ?8
                  WHERE id = ?1",
            )?
            .execute(params![
                id,
                SessionStatus::Completed.as_str(),
                epoch_seconds(),
                outcome.final_accuracy as f64,
                outcome.final_val_accuracy as f64,
                outcome.final_loss as f64,
                outcome.final_val_loss as f64,
                outcome.total_samples as i64,
            ])?;
            Ok(())
        });
    }

    /// Close out a session as failed with the captured error text.
    pub fn fail_session(&self, session_id: Option<i64>, error: &str) {
        let Some(id) = session_id else { return };
        self.with_conn("fail_session", |conn| {
            conn.prepare_cached(
                "UPDATE retraining_sessions
                    SET status = ?2, end_timestamp = ?3, error_message = ?4
                  WHERE id = ?1",
            )?
            .execute(params![id, SessionStatus::Failed.as_str(), epoch_seconds(), error])?;
            Ok(())
        });
    }

    /// Read back an upload row.
    pub fn upload(&self, id: i64) -> Option<UploadRow> {
        self.with_conn("upload", |conn| {
            conn.query_row(
                "SELECT id, filename, file_path, file_size, status,
                        safe_count, danger_count, total_count, error_message
                   FROM training_data_uploads WHERE id = ?1",
                params![id],
                |row| {
                    Ok(UploadRow {
                        id: row.get(0)?,
                        filename: row.get(1)?,
                        file_path: row.get(2)?,
                        file_size: row.get::<_, i64>(3)? as u64,
                        status: row.get(4)?,
                        safe_count: row.get::<_, i64>(5)? as u32,
                        danger_count: row.get::<_, i64>(6)? as u32,
                        total_count: row.get::<_, i64>(7)? as u32,
                        error_message: row.get(8)?,
                    })
                },
            )
            .optional()
        })
        .flatten()
    }

    /// Read back a session row.
    pub fn session(&self, id: i64) -> Option<SessionRow> {
        self.with_conn("session", |conn| {
            conn.query_row(
                "SELECT id, upload_id, status, epochs, end_timestamp, final_accuracy,
                        final_val_accuracy, final_loss, final_val_loss, total_samples,
                        error_message
                   FROM retraining_sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        upload_id: row.get(1)?,
                        status: row.get(2)?,
                        epochs: row.get::<_, i64>(3)? as u32,
                        end_timestamp: row.get(4)?,
                        final_accuracy: row.get::<_, Option<f64>>(5)?.map(|v| v as f32),
                        final_val_accuracy: row.get::<_, Option<f64>>(6)?.map(|v| v as f32),
                        final_loss: row.get::<_, Option<f64>>(7)?.map(|v| v as f32),
                        final_val_loss: row.get::<_, Option<f64>>(8)?.map(|v| v as f32),
                        total_samples: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
                        error_message: row.get(10)?,
                    })
                },
            )
            .optional()
        })
        .flatten()
    }

    fn with_conn<T>(
        &self,
        op_name: &str,
        op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Option<T> {
        let inner = self.inner.as_ref()?;
        let conn = inner.lock().unwrap_or_else(PoisonError::into_inner);
        match op(&conn) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("Audit store {op_name} failed: {err}");
                None
            }
        }
    }
}

fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
