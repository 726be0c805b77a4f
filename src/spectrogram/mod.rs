//! Log-mel spectrogram rendering.
//!
//! Every clip is rendered to a fixed bands-by-frames log-mel grid that serves
//! as the classifier's input. Clips shorter than the window are padded with
//! log-mel silence; longer clips are truncated to the window.

mod fft;
mod mel;

use fft::{Complex32, FftPlan, fft_inplace, hann_window};
use mel::MelBank;

use crate::audio::{ANALYSIS_SAMPLE_RATE, AnalysisClip};

/// Number of mel bands per frame.
pub const MEL_BANDS: usize = 64;
/// Number of STFT frames in one rendered grid.
pub const SPEC_FRAMES: usize = 96;
/// STFT window length in samples.
pub const STFT_N_FFT: usize = 1024;
/// STFT hop length in samples.
pub const STFT_HOP: usize = 512;
/// Lower edge of the mel bank in Hz.
pub const MEL_FMIN_HZ: f32 = 50.0;
/// Upper edge of the mel bank in Hz.
pub const MEL_FMAX_HZ: f32 = 8_000.0;
/// Flattened grid length.
pub const FEATURE_LEN: usize = MEL_BANDS * SPEC_FRAMES;

/// A fixed-size log-mel grid, frame-major (`frame * MEL_BANDS + band`).
#[derive(Debug, Clone)]
pub struct SpectrogramImage {
    values: Vec<f32>,
}

impl SpectrogramImage {
    /// Borrow the flattened grid values.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Number of values in the grid; always [`FEATURE_LEN`].
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the grid holds no values (never for rendered images).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Renders prepared clips into fixed-size log-mel grids, reusing buffers.
pub struct SpectrogramRenderer {
    window: Vec<f32>,
    plan: FftPlan,
    mel_bank: MelBank,
    fft_buf: Vec<Complex32>,
    power_buf: Vec<f32>,
    mel_buf: Vec<f32>,
}

impl SpectrogramRenderer {
    /// Create a renderer for the fixed analysis configuration.
    pub fn new() -> Result<Self, String> {
        let plan = FftPlan::new(STFT_N_FFT)?;
        let mel_bank = MelBank::new(
            ANALYSIS_SAMPLE_RATE,
            STFT_N_FFT,
            MEL_BANDS,
            MEL_FMIN_HZ,
            MEL_FMAX_HZ,
        );
        Ok(Self {
            window: hann_window(STFT_N_FFT),
            plan,
            mel_bank,
            fft_buf: vec![Complex32::default(); STFT_N_FFT],
            power_buf: vec![0.0_f32; STFT_N_FFT / 2 + 1],
            mel_buf: vec![0.0_f32; MEL_BANDS],
        })
    }

    /// Render a prepared clip into a fixed-size log-mel grid.
    pub fn render(&mut self, clip: &AnalysisClip) -> Result<SpectrogramImage, String> {
        self.render_samples(&clip.mono)
    }

    pub(crate) fn render_samples(&mut self, samples: &[f32]) -> Result<SpectrogramImage, String> {
        let mut values = vec![0.0_f32; FEATURE_LEN];
        let mut start = 0usize;
        let mut frame_idx = 0usize;
        while start < samples.len() && frame_idx < SPEC_FRAMES {
            let offset = frame_idx * MEL_BANDS;
            self.log_mel_frame_into(samples, start, &mut values[offset..offset + MEL_BANDS])?;
            start = start.saturating_add(STFT_HOP);
            frame_idx += 1;
        }
        while frame_idx < SPEC_FRAMES {
            let offset = frame_idx * MEL_BANDS;
            self.log_mel_silence_into(&mut values[offset..offset + MEL_BANDS]);
            frame_idx += 1;
        }
        Ok(SpectrogramImage { values })
    }

    fn log_mel_frame_into(
        &mut self,
        samples: &[f32],
        start: usize,
        out_frame: &mut [f32],
    ) -> Result<(), String> {
        for (i, cell) in self.fft_buf.iter_mut().enumerate() {
            let src = samples.get(start + i).copied().unwrap_or(0.0);
            let win = self.window.get(i).copied().unwrap_or(1.0);
            *cell = Complex32::new(src * win, 0.0);
        }
        fft_inplace(&mut self.fft_buf, &self.plan)?;
        for bin in 0..self.power_buf.len() {
            let c = self.fft_buf[bin];
            self.power_buf[bin] = (c.re * c.re + c.im * c.im).max(0.0);
        }
        self.mel_bank
            .mel_from_power_into(&self.power_buf, &mut self.mel_buf);
        write_log_mel(&self.mel_buf, out_frame);
        Ok(())
    }

    fn log_mel_silence_into(&mut self, out_frame: &mut [f32]) {
        self.power_buf.fill(0.0);
        self.mel_bank
            .mel_from_power_into(&self.power_buf, &mut self.mel_buf);
        write_log_mel(&self.mel_buf, out_frame);
    }
}

fn write_log_mel(input: &[f32], out: &mut [f32]) {
    for (src, dst) in input.iter().zip(out.iter_mut()) {
        *dst = log_mel(*src);
    }
}

/// Convert mel power to a bounded log scale.
///
/// Values are decibels clamped to [-100, 100] and scaled into [-1, 1] so the
/// classifier always sees inputs of unit magnitude.
fn log_mel(value: f32) -> f32 {
    const EPS: f32 = 1e-10;
    const DB_RANGE: f32 = 100.0;
    let v = value.max(EPS);
    let db = 10.0 * v.log10();
    if db.is_finite() {
        db.clamp(-DB_RANGE, DB_RANGE) / DB_RANGE
    } else {
        0.0
    }
}
