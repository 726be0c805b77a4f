//! Audio loading and preparation for classification.
//!
//! Clips are decoded from disk, downmixed to mono, resampled to the fixed
//! analysis rate and peak-normalized before spectrogram rendering.

mod decode;

use std::path::Path;

pub use decode::{DecodedAudio, decode_audio};

/// Sample rate every clip is resampled to before analysis.
pub const ANALYSIS_SAMPLE_RATE: u32 = 16_000;
/// Hard cap on decoded audio length; anything longer is truncated.
pub const MAX_DECODE_SECONDS: f32 = 30.0;

/// Mono, rate-converted audio ready for spectrogram rendering.
#[derive(Debug, Clone)]
pub struct AnalysisClip {
    /// Mono samples at [`ANALYSIS_SAMPLE_RATE`].
    pub mono: Vec<f32>,
    /// Duration of the prepared samples in seconds.
    pub duration_seconds: f32,
}

/// Decode a clip from disk and prepare it for analysis.
pub fn load_for_analysis(path: &Path) -> Result<AnalysisClip, String> {
    let decoded = decode_audio(path, Some(MAX_DECODE_SECONDS))?;
    let mono = downmix_to_mono(&decoded.samples, decoded.channels);
    let mut resampled = resample_linear(&mono, decoded.sample_rate, ANALYSIS_SAMPLE_RATE);
    normalize_peak_in_place(&mut resampled);
    let duration_seconds = resampled.len() as f32 / ANALYSIS_SAMPLE_RATE as f32;
    Ok(AnalysisClip {
        mono: resampled,
        duration_seconds,
    })
}

pub(crate) fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.iter().copied().map(sanitize_sample).collect();
    }
    let frames = samples.len() / channels;
    let mut out = Vec::with_capacity(frames);
    for frame in 0..frames {
        let start = frame * channels;
        let slice = &samples[start..(start + channels).min(samples.len())];
        let mut sum = 0.0_f32;
        for &sample in slice {
            sum += sanitize_sample(sample);
        }
        out.push(sum / channels as f32);
    }
    out
}

pub(crate) fn resample_linear(samples: &[f32], input_rate: u32, output_rate: u32) -> Vec<f32> {
    let input_rate = input_rate.max(1);
    let output_rate = output_rate.max(1);
    if samples.is_empty() || input_rate == output_rate {
        return samples.to_vec();
    }
    let duration_seconds = samples.len() as f64 / input_rate as f64;
    let out_len = (duration_seconds * output_rate as f64).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let t = i as f64 / output_rate as f64;
        out.push(lerp_sample(samples, t * input_rate as f64));
    }
    out
}

fn lerp_sample(samples: &[f32], pos: f64) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let idx0 = pos.floor().max(0.0) as usize;
    let frac = (pos - idx0 as f64).clamp(0.0, 1.0) as f32;
    let idx1 = idx0.saturating_add(1).min(samples.len().saturating_sub(1));
    let a = samples.get(idx0).copied().unwrap_or(0.0);
    let b = samples.get(idx1).copied().unwrap_or(a);
    a + (b - a) * frac
}

pub(crate) fn normalize_peak_in_place(samples: &mut [f32]) {
    let peak = samples
        .iter()
        .copied()
        .map(f32::abs)
        .fold(0.0_f32, f32::max);
    if peak <= f32::EPSILON {
        return;
    }
    let gain = 1.0 / peak;
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

fn sanitize_sample(sample: f32) -> f32 {
    if !sample.is_finite() {
        return 0.0;
    }
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped != 0.0 && clamped.abs() < f32::MIN_POSITIVE {
        0.0
    } else {
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::tempdir;

    #[test]
    fn downmix_averages_channels() {
        let stereo = vec![1.0_f32, -1.0, 0.5, 0.25];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.0).abs() < 1e-6);
        assert!((mono[1] - 0.375).abs() < 1e-6);
    }

    #[test]
    fn resample_linear_preserves_endpoints_for_ramp() {
        let input = vec![0.0_f32, 1.0];
        let out = resample_linear(&input, 1, 2);
        assert_eq!(out.len(), 4);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[out.len() - 1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_scales_peak_to_unity() {
        let mut samples = vec![0.25_f32, -0.5, 0.1];
        normalize_peak_in_place(&mut samples);
        let peak = samples.iter().copied().map(f32::abs).fold(0.0, f32::max);
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_silence_untouched() {
        let mut samples = vec![0.0_f32; 8];
        normalize_peak_in_place(&mut samples);
        assert!(samples.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn load_for_analysis_converts_wav_to_target_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fixture.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..(44_100 / 10) {
            writer.write_sample::<f32>(0.25).unwrap();
            writer.write_sample::<f32>(0.25).unwrap();
        }
        writer.finalize().unwrap();

        let clip = load_for_analysis(&path).unwrap();
        assert!((clip.duration_seconds - 0.1).abs() < 0.02);
        let peak = clip.mono.iter().copied().map(f32::abs).fold(0.0, f32::max);
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn load_for_analysis_rejects_non_audio() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not_audio.wav");
        std::fs::write(&path, b"plainly not a wav file").unwrap();
        assert!(load_for_analysis(&path).is_err());
    }
}
