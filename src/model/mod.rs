//! The Safe/Danger classifier and its training and persistence layers.

pub mod store;
pub mod train;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::spectrogram::{FEATURE_LEN, MEL_BANDS, SPEC_FRAMES, SpectrogramImage};

pub use store::{METADATA_FILE_NAME, MODEL_FILE_NAME, ModelError, ModelMetadata, ModelStore};
pub use train::{EpochMetrics, TrainError, TrainOptions, TrainReport, TrainingHistory};

/// Current checkpoint format version.
pub const MODEL_VERSION: i64 = 1;

/// Single-hidden-layer classifier over a flattened log-mel grid.
///
/// The output head is a sigmoid producing a danger score in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DangerClassifier {
    pub model_version: i64,
    pub mel_bands: usize,
    pub frames: usize,
    pub hidden_size: usize,
    /// Hidden weights, row-major `hidden_size x input_len`.
    pub weights1: Vec<f32>,
    pub bias1: Vec<f32>,
    /// Output weights, one per hidden unit.
    pub weights2: Vec<f32>,
    pub bias2: f32,
    pub feature_mean: Vec<f32>,
    pub feature_std: Vec<f32>,
}

impl DangerClassifier {
    /// Flattened input length the classifier expects.
    pub fn input_len(&self) -> usize {
        self.mel_bands * self.frames
    }

    /// Check internal shape consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.model_version != MODEL_VERSION {
            return Err(format!(
                "Unsupported model_version {} (expected {MODEL_VERSION})",
                self.model_version
            ));
        }
        let input = self.input_len();
        let hidden = self.hidden_size;
        if input == 0 || hidden == 0 {
            return Err("Model has empty input or hidden layer".to_string());
        }
        if self.weights1.len() != input * hidden {
            return Err("weights1 length mismatch".to_string());
        }
        if self.bias1.len() != hidden {
            return Err("bias1 length mismatch".to_string());
        }
        if self.weights2.len() != hidden {
            return Err("weights2 length mismatch".to_string());
        }
        if self.feature_mean.len() != input {
            return Err("feature_mean length mismatch".to_string());
        }
        if self.feature_std.len() != input {
            return Err("feature_std length mismatch".to_string());
        }
        Ok(())
    }

    /// Score a rendered grid; higher means more likely danger.
    pub fn predict_score(&self, image: &SpectrogramImage) -> Result<f32, String> {
        let features = image.as_slice();
        if features.len() != self.input_len() {
            return Err(format!(
                "Input length {} does not match model input {}",
                features.len(),
                self.input_len()
            ));
        }
        let logit = self.forward_logit(features);
        Ok(sigmoid(logit))
    }

    fn forward_logit(&self, features: &[f32]) -> f32 {
        let input = self.input_len();
        let mut sum_out = self.bias2;
        for h in 0..self.hidden_size {
            let mut sum = self.bias1[h];
            let base = h * input;
            for i in 0..input {
                let std = self.feature_std[i].max(1e-6);
                let normalized = (features[i] - self.feature_mean[i]) / std;
                sum += self.weights1[base + i] * normalized;
            }
            sum_out += self.weights2[h] * sum.max(0.0);
        }
        sum_out
    }

    /// Build a randomly initialized classifier for the fixed grid shape.
    pub fn random_init(hidden_size: usize, seed: u64) -> Self {
        let hidden = hidden_size.max(1);
        let input = FEATURE_LEN;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut weights1 = vec![0.0_f32; hidden * input];
        for w in &mut weights1 {
            *w = (rng.random::<f32>() - 0.5) * 0.1;
        }
        let mut weights2 = vec![0.0_f32; hidden];
        for w in &mut weights2 {
            *w = (rng.random::<f32>() - 0.5) * 0.1;
        }
        Self {
            model_version: MODEL_VERSION,
            mel_bands: MEL_BANDS,
            frames: SPEC_FRAMES,
            hidden_size: hidden,
            weights1,
            bias1: vec![0.0; hidden],
            weights2,
            bias2: 0.0,
            feature_mean: vec![0.0; input],
            feature_std: vec![1.0; input],
        }
    }
}

pub(crate) fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_init_validates() {
        let model = DangerClassifier::random_init(4, 7);
        model.validate().unwrap();
        assert_eq!(model.input_len(), FEATURE_LEN);
    }

    #[test]
    fn validate_rejects_shape_mismatch() {
        let mut model = DangerClassifier::random_init(4, 7);
        model.weights2.pop();
        assert!(model.validate().is_err());
    }

    #[test]
    fn score_is_a_probability() {
        let model = DangerClassifier::random_init(4, 7);
        let image = SpectrogramImage::from_values(vec![0.5; FEATURE_LEN]);
        let score = model.predict_score(&image).unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn score_rejects_wrong_input_length() {
        let model = DangerClassifier::random_init(4, 7);
        let image = SpectrogramImage::from_values(vec![0.5; 3]);
        assert!(model.predict_score(&image).is_err());
    }

    #[test]
    fn sigmoid_is_monotonic_around_zero() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(4.0) > 0.9);
        assert!(sigmoid(-4.0) < 0.1);
    }
}
