//! SGD training for the Safe/Danger classifier.
//!
//! Loads the canonical two-class dataset from disk, renders every clip to a
//! log-mel grid and fits the classifier with seeded mini-batch gradient
//! descent. Fine-tuning starts from an existing model's weights and keeps its
//! feature normalization; fresh training derives normalization from the data.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{SeedableRng, seq::SliceRandom};
use thiserror::Error;

use crate::audio::load_for_analysis;
use crate::dataset::{DANGER_DIR_NAME, SAFE_DIR_NAME, is_audio_file};
use crate::spectrogram::{FEATURE_LEN, SpectrogramRenderer};

use super::{DangerClassifier, sigmoid};

/// Errors surfaced by the training pipeline.
#[derive(Debug, Error)]
pub enum TrainError {
    /// The dataset contains no decodable audio files.
    #[error("Training dataset is empty")]
    EmptyDataset,
    /// A dataset directory could not be read.
    #[error("Failed to read dataset directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The spectrogram renderer could not be constructed.
    #[error("Spectrogram setup failed: {0}")]
    Spectrogram(String),
}

/// Knobs for one training run.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f32,
    pub learning_rate: f32,
    /// Hidden layer width when training from scratch.
    pub hidden_size: usize,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 3,
            batch_size: 32,
            validation_split: 0.2,
            learning_rate: 0.01,
            hidden_size: 16,
            seed: 42,
        }
    }
}

/// Train and validation metrics for one epoch.
#[derive(Debug, Clone, Copy)]
pub struct EpochMetrics {
    pub accuracy: f32,
    pub loss: f32,
    pub val_accuracy: f32,
    pub val_loss: f32,
}

/// Per-epoch metrics for a completed run.
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    /// Metrics of the final epoch, if any epoch ran.
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

/// Result of a training run.
#[derive(Debug)]
pub struct TrainReport {
    pub model: DangerClassifier,
    pub history: TrainingHistory,
    /// Number of clips that contributed to the run.
    pub total_samples: usize,
}

/// Train the classifier against the canonical dataset rooted at `data_root`.
///
/// `existing` enables incremental fine-tuning; pass `None` for a cold start.
pub fn train_classifier(
    data_root: &Path,
    existing: Option<&DangerClassifier>,
    options: &TrainOptions,
) -> Result<TrainReport, TrainError> {
    let (features, labels) = load_labeled_grids(data_root)?;
    if features.is_empty() {
        return Err(TrainError::EmptyDataset);
    }
    let total_samples = features.len();

    let mut model = match existing {
        Some(model) if model.input_len() == FEATURE_LEN => model.clone(),
        Some(model) => {
            tracing::warn!(
                "Existing model input {} does not match grid {FEATURE_LEN}; training from scratch",
                model.input_len()
            );
            fresh_model(&features, options)
        }
        None => fresh_model(&features, options),
    };

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut indices: Vec<usize> = (0..total_samples).collect();
    indices.shuffle(&mut rng);

    let split = options.validation_split.clamp(0.0, 0.9);
    let train_len = ((total_samples as f32) * (1.0 - split)).round().max(1.0) as usize;
    let train_len = train_len.min(total_samples);
    let (train_idx, val_idx) = indices.split_at(train_len);

    let normalized: Vec<Vec<f32>> = features
        .iter()
        .map(|row| normalize_row(&model, row))
        .collect();

    let input = FEATURE_LEN;
    let hidden = model.hidden_size;
    let batch_size = options.batch_size.max(1);
    let mut batch_order = train_idx.to_vec();
    let mut hidden_pre = vec![0.0_f32; hidden];
    let mut hidden_act = vec![0.0_f32; hidden];
    let mut history = TrainingHistory::default();

    for _epoch in 0..options.epochs.max(1) {
        batch_order.shuffle(&mut rng);
        for batch in batch_order.chunks(batch_size) {
            let mut d_w1 = vec![0.0_f32; model.weights1.len()];
            let mut d_b1 = vec![0.0_f32; hidden];
            let mut d_w2 = vec![0.0_f32; hidden];
            let mut d_b2 = 0.0_f32;

            for &idx in batch {
                let x = &normalized[idx];
                let y = labels[idx];

                for h in 0..hidden {
                    let mut sum = model.bias1[h];
                    let base = h * input;
                    for i in 0..input {
                        sum += model.weights1[base + i] * x[i];
                    }
                    hidden_pre[h] = sum;
                    hidden_act[h] = sum.max(0.0);
                }
                let mut logit = model.bias2;
                for h in 0..hidden {
                    logit += model.weights2[h] * hidden_act[h];
                }
                let p = sigmoid(logit);

                let dz = p - y;
                d_b2 += dz;
                for h in 0..hidden {
                    d_w2[h] += dz * hidden_act[h];
                    if hidden_pre[h] > 0.0 {
                        let dh = dz * model.weights2[h];
                        d_b1[h] += dh;
                        let base = h * input;
                        for i in 0..input {
                            d_w1[base + i] += dh * x[i];
                        }
                    }
                }
            }

            let scale = options.learning_rate / batch.len().max(1) as f32;
            for i in 0..model.weights1.len() {
                model.weights1[i] -= scale * d_w1[i];
            }
            for h in 0..hidden {
                model.bias1[h] -= scale * d_b1[h];
                model.weights2[h] -= scale * d_w2[h];
            }
            model.bias2 -= scale * d_b2;
        }

        let (accuracy, loss) = evaluate(&model, &normalized, &labels, train_idx);
        let (val_accuracy, val_loss) = if val_idx.is_empty() {
            (accuracy, loss)
        } else {
            evaluate(&model, &normalized, &labels, val_idx)
        };
        history.epochs.push(EpochMetrics {
            accuracy,
            loss,
            val_accuracy,
            val_loss,
        });
    }

    Ok(TrainReport {
        model,
        history,
        total_samples,
    })
}

fn fresh_model(features: &[Vec<f32>], options: &TrainOptions) -> DangerClassifier {
    let mut model = DangerClassifier::random_init(options.hidden_size, options.seed);
    let (mean, std) = feature_mean_std(features, FEATURE_LEN);
    model.feature_mean = mean;
    model.feature_std = std;
    model
}

fn normalize_row(model: &DangerClassifier, row: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0_f32; row.len()];
    for i in 0..row.len() {
        let std = model.feature_std[i].max(1e-6);
        out[i] = (row[i] - model.feature_mean[i]) / std;
    }
    out
}

fn evaluate(
    model: &DangerClassifier,
    normalized: &[Vec<f32>],
    labels: &[f32],
    indices: &[usize],
) -> (f32, f32) {
    if indices.is_empty() {
        return (0.0, 0.0);
    }
    let input = FEATURE_LEN;
    let hidden = model.hidden_size;
    let mut correct = 0usize;
    let mut loss_sum = 0.0_f64;
    for &idx in indices {
        let x = &normalized[idx];
        let y = labels[idx];
        let mut logit = model.bias2;
        for h in 0..hidden {
            let mut sum = model.bias1[h];
            let base = h * input;
            for i in 0..input {
                sum += model.weights1[base + i] * x[i];
            }
            logit += model.weights2[h] * sum.max(0.0);
        }
        let p = sigmoid(logit);
        let predicted_danger = p > 0.5;
        if predicted_danger == (y > 0.5) {
            correct += 1;
        }
        loss_sum += bce_loss(p, y) as f64;
    }
    let n = indices.len() as f32;
    (correct as f32 / n, (loss_sum as f32) / n)
}

fn bce_loss(p: f32, y: f32) -> f32 {
    const EPS: f32 = 1e-7;
    let p = p.clamp(EPS, 1.0 - EPS);
    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
}

fn feature_mean_std(rows: &[Vec<f32>], d: usize) -> (Vec<f32>, Vec<f32>) {
    let mut mean = vec![0.0_f32; d];
    for row in rows {
        for i in 0..d {
            mean[i] += row[i];
        }
    }
    let n = rows.len().max(1) as f32;
    for v in &mut mean {
        *v /= n;
    }

    let mut var = vec![0.0_f32; d];
    for row in rows {
        for i in 0..d {
            let diff = row[i] - mean[i];
            var[i] += diff * diff;
        }
    }
    for v in &mut var {
        *v = (*v / n).sqrt();
    }
    (mean, var)
}

/// Render every audio file under `safe/` and `danger/` into a labeled grid.
fn load_labeled_grids(data_root: &Path) -> Result<(Vec<Vec<f32>>, Vec<f32>), TrainError> {
    let mut renderer = SpectrogramRenderer::new().map_err(TrainError::Spectrogram)?;
    let mut features = Vec::new();
    let mut labels = Vec::new();
    for (dir_name, label) in [(SAFE_DIR_NAME, 0.0_f32), (DANGER_DIR_NAME, 1.0_f32)] {
        let dir = data_root.join(dir_name);
        if !dir.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(&dir).map_err(|source| TrainError::ReadDir {
            path: dir.clone(),
            source,
        })?;
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if !path.is_file() || !is_audio_file(&path) {
                continue;
            }
            let clip = match load_for_analysis(&path) {
                Ok(clip) => clip,
                Err(err) => {
                    tracing::warn!("Skipping undecodable clip {}: {err}", path.display());
                    continue;
                }
            };
            match renderer.render(&clip) {
                Ok(image) => {
                    features.push(image.as_slice().to_vec());
                    labels.push(label);
                }
                Err(err) => {
                    tracing::warn!("Skipping unrenderable clip {}: {err}", path.display());
                }
            }
        }
    }
    Ok((features, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ANALYSIS_SAMPLE_RATE;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::tempdir;

    fn write_tone(path: &Path, freq_hz: f32, seconds: f32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: ANALYSIS_SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        let len = (seconds * ANALYSIS_SAMPLE_RATE as f32) as usize;
        for i in 0..len {
            let t = i as f32 / ANALYSIS_SAMPLE_RATE as f32;
            writer
                .write_sample::<f32>((2.0 * std::f32::consts::PI * freq_hz * t).sin() * 0.8)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    fn build_dataset(root: &Path, safe: usize, danger: usize) {
        let safe_dir = root.join(SAFE_DIR_NAME);
        let danger_dir = root.join(DANGER_DIR_NAME);
        std::fs::create_dir_all(&safe_dir).unwrap();
        std::fs::create_dir_all(&danger_dir).unwrap();
        for i in 0..safe {
            write_tone(&safe_dir.join(format!("calm_{i}.wav")), 220.0, 0.5);
        }
        for i in 0..danger {
            write_tone(&danger_dir.join(format!("alarm_{i}.wav")), 3_000.0, 0.5);
        }
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let dir = tempdir().unwrap();
        let err = train_classifier(dir.path(), None, &TrainOptions::default()).unwrap_err();
        assert!(matches!(err, TrainError::EmptyDataset));
    }

    #[test]
    fn training_separates_distinct_tones() {
        let dir = tempdir().unwrap();
        build_dataset(dir.path(), 6, 6);
        let options = TrainOptions {
            epochs: 80,
            batch_size: 4,
            learning_rate: 0.1,
            validation_split: 0.0,
            ..TrainOptions::default()
        };
        let report = train_classifier(dir.path(), None, &options).unwrap();
        assert_eq!(report.total_samples, 12);
        assert_eq!(report.history.epochs.len(), 80);
        let last = report.history.last().unwrap();
        assert!(
            last.accuracy > 0.9,
            "expected separable tones, accuracy {}",
            last.accuracy
        );
    }

    #[test]
    fn fine_tuning_keeps_existing_normalization() {
        let dir = tempdir().unwrap();
        build_dataset(dir.path(), 3, 3);
        let options = TrainOptions {
            epochs: 2,
            ..TrainOptions::default()
        };
        let first = train_classifier(dir.path(), None, &options).unwrap();
        let second = train_classifier(dir.path(), Some(&first.model), &options).unwrap();
        assert_eq!(second.model.feature_mean, first.model.feature_mean);
        assert_eq!(second.model.hidden_size, first.model.hidden_size);
    }

    #[test]
    fn history_reports_one_entry_per_epoch() {
        let dir = tempdir().unwrap();
        build_dataset(dir.path(), 2, 2);
        let options = TrainOptions {
            epochs: 3,
            ..TrainOptions::default()
        };
        let report = train_classifier(dir.path(), None, &options).unwrap();
        assert_eq!(report.history.epochs.len(), 3);
        let last = report.history.last().unwrap();
        assert!(last.loss.is_finite());
        assert!(last.val_loss.is_finite());
    }
}
