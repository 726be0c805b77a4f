use rusqlite::Connection;

use super::AuditError;

pub(super) fn apply_schema(connection: &Connection) -> Result<(), AuditError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS training_data_uploads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            upload_timestamp INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            safe_count INTEGER NOT NULL DEFAULT 0,
            danger_count INTEGER NOT NULL DEFAULT 0,
            total_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT
         );
         CREATE INDEX IF NOT EXISTS idx_uploads_status
            ON training_data_uploads (status);
         CREATE TABLE IF NOT EXISTS retraining_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            upload_id INTEGER,
            start_timestamp INTEGER NOT NULL,
            end_timestamp INTEGER,
            status TEXT NOT NULL DEFAULT 'pending',
            epochs INTEGER NOT NULL DEFAULT 3,
            final_accuracy REAL,
            final_val_accuracy REAL,
            final_loss REAL,
            final_val_loss REAL,
            total_samples INTEGER,
            error_message TEXT
         );
         CREATE INDEX IF NOT EXISTS idx_sessions_upload
            ON retraining_sessions (upload_id);",
    )?;
    Ok(())
}
