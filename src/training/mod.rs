//! In-memory training status and admission control.
//!
//! A single `TrainingState` is shared between the HTTP handlers and the
//! background orchestrator. The status record is overwritten wholesale at
//! each phase transition and snapshot-cloned by readers; the admission gate
//! is a compare-and-swap whose guard releases on drop, so the lock cannot be
//! leaked by a failing pipeline.

pub mod orchestrator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Phase of the current (or last) training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingPhase {
    Idle,
    Preprocessing,
    Training,
    Completed,
    Error,
}

/// Snapshot of training progress reported by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStatus {
    /// Wire name kept as `status` for compatibility with existing clients.
    #[serde(rename = "status")]
    pub state: TrainingPhase,
    pub message: String,
    pub progress: u8,
    pub epoch: u32,
    pub total_epochs: u32,
}

impl TrainingStatus {
    /// Status at process start and between runs.
    pub fn idle() -> Self {
        Self {
            state: TrainingPhase::Idle,
            message: String::new(),
            progress: 0,
            epoch: 0,
            total_epochs: 0,
        }
    }

    /// A preprocessing phase tick with its progress value.
    pub fn preprocessing(message: &str, progress: u8) -> Self {
        Self {
            state: TrainingPhase::Preprocessing,
            message: message.to_string(),
            progress,
            epoch: 0,
            total_epochs: 0,
        }
    }

    /// The training phase.
    pub fn training(total_epochs: u32) -> Self {
        Self {
            state: TrainingPhase::Training,
            message: "Training model...".to_string(),
            progress: 50,
            epoch: 0,
            total_epochs,
        }
    }

    /// Terminal success with a validation-accuracy summary.
    pub fn completed(val_accuracy: f32, total_epochs: u32) -> Self {
        Self {
            state: TrainingPhase::Completed,
            message: format!(
                "Training completed! Final accuracy: {:.2}%",
                val_accuracy * 100.0
            ),
            progress: 100,
            epoch: total_epochs,
            total_epochs,
        }
    }

    /// Terminal failure carrying the captured error text.
    pub fn error(message: String) -> Self {
        Self {
            state: TrainingPhase::Error,
            message,
            progress: 0,
            epoch: 0,
            total_epochs: 0,
        }
    }
}

/// Shared training status plus the single-job admission gate.
pub struct TrainingState {
    status: Mutex<TrainingStatus>,
    active: AtomicBool,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingState {
    /// A fresh state: idle and admitting.
    pub fn new() -> Self {
        Self {
            status: Mutex::new(TrainingStatus::idle()),
            active: AtomicBool::new(false),
        }
    }

    /// Clone the current status record.
    pub fn snapshot(&self) -> TrainingStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Overwrite the status record wholesale.
    pub fn set(&self, status: TrainingStatus) {
        let mut guard = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = status;
    }

    /// True while a training job holds the admission gate.
    pub fn is_training(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Try to admit a new training job.
    ///
    /// Returns `None` when a job is already active; the returned guard
    /// releases the gate when dropped, on success and failure paths alike.
    pub fn try_begin(self: &Arc<Self>) -> Option<TrainingGuard> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(TrainingGuard {
            state: Arc::clone(self),
        })
    }
}

/// Holds the admission gate for the lifetime of one training job.
pub struct TrainingGuard {
    state: Arc<TrainingState>,
}

impl Drop for TrainingGuard {
    fn drop(&mut self) {
        self.state.active.store(false, Ordering::Release);
    }
}
