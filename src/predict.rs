//! Synchronous prediction over one audio file.

use std::path::Path;

use crate::audio;
use crate::dataset::ClipLabel;
use crate::model::DangerClassifier;
use crate::spectrogram::SpectrogramRenderer;

/// Outcome of classifying one clip.
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub label: ClipLabel,
    /// Confidence as a percentage, rounded to two decimals.
    pub confidence_percent: f32,
    /// The model's raw danger score in `[0, 1]`.
    pub raw_score: f32,
}

/// Decode, render and score a clip on disk.
pub fn classify_clip_file(model: &DangerClassifier, path: &Path) -> Result<Prediction, String> {
    let clip = audio::load_for_analysis(path)?;
    let mut renderer = SpectrogramRenderer::new()?;
    let image = renderer.render(&clip)?;
    let score = model.predict_score(&image)?;
    Ok(decide(score))
}

/// Apply the decision rule to a raw score.
///
/// Scores strictly above 0.5 are Danger with confidence equal to the score;
/// everything else (0.5 included) is Safe with confidence `1 - score`.
pub fn decide(score: f32) -> Prediction {
    let (label, confidence) = if score > 0.5 {
        (ClipLabel::Danger, score)
    } else {
        (ClipLabel::Safe, 1.0 - score)
    };
    Prediction {
        label,
        confidence_percent: round_percent(confidence),
        raw_score: score,
    }
}

fn round_percent(confidence: f32) -> f32 {
    (confidence * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_half_maps_to_safe_at_fifty_percent() {
        let prediction = decide(0.5);
        assert_eq!(prediction.label, ClipLabel::Safe);
        assert_eq!(prediction.confidence_percent, 50.0);
    }

    #[test]
    fn high_score_maps_to_danger_with_score_confidence() {
        let prediction = decide(0.83);
        assert_eq!(prediction.label, ClipLabel::Danger);
        assert_eq!(prediction.confidence_percent, 83.0);
    }

    #[test]
    fn low_score_maps_to_safe_with_complement_confidence() {
        let prediction = decide(0.2);
        assert_eq!(prediction.label, ClipLabel::Safe);
        assert_eq!(prediction.confidence_percent, 80.0);
    }

    #[test]
    fn confidence_is_rounded_to_two_decimals() {
        let prediction = decide(0.83456);
        assert_eq!(prediction.confidence_percent, 83.46);
    }

    #[test]
    fn classify_rejects_unreadable_files() {
        use tempfile::tempdir;
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, b"not audio").unwrap();
        let model = DangerClassifier::random_init(2, 1);
        assert!(classify_clip_file(&model, &path).is_err());
    }
}
