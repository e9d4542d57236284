//! Time-frequency feature extraction.
//!
//! A window's waveform becomes a log-mel spectrogram (preemphasis, Hann STFT,
//! mel filterbank, log compression, normalization). Enrichment stages (MFCC,
//! deltas) are pure `FeatureFrame -> FeatureFrame` transforms that compose on
//! top. The whole pipeline is deterministic: identical samples and
//! configuration always produce a bit-identical frame, and the configuration
//! travels with trained model parameters so training and inference can never
//! disagree on it.

use crate::audio::SAMPLE_RATE;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// 2D feature representation of one window: (time_steps, bands).
pub type FeatureFrame = Array2<f32>;

/// Feature normalization applied after log compression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Normalization {
    /// Raw log-mel values
    None,
    /// Scale each time step to [0, 1] across bands
    PerFrameMinMax,
    /// Center and scale each band by dataset-wide statistics
    Global { mean: Vec<f32>, std: Vec<f32> },
}

/// Normalization mode selectable from the command line.
///
/// `Global` statistics are computed during training, so the CLI picks a mode
/// and the concrete [`Normalization`] is resolved once the dataset has been
/// scanned.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormalizationMode {
    None,
    MinMax,
    Global,
}

impl Normalization {
    /// Apply the normalization in place.
    pub fn apply(&self, frame: &mut FeatureFrame) {
        match self {
            Normalization::None => {}
            Normalization::PerFrameMinMax => {
                for mut row in frame.rows_mut() {
                    let min = row.iter().copied().fold(f32::INFINITY, f32::min);
                    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    let range = (max - min).max(1e-10);
                    for v in row.iter_mut() {
                        *v = (*v - min) / range;
                    }
                }
            }
            Normalization::Global { mean, std } => {
                for (band, mut column) in frame.columns_mut().into_iter().enumerate() {
                    let m = mean.get(band).copied().unwrap_or(0.0);
                    let s = std.get(band).copied().unwrap_or(1.0).max(1e-6);
                    for v in column.iter_mut() {
                        *v = (*v - m) / s;
                    }
                }
            }
        }
    }
}

/// Log-mel spectrogram configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MelConfig {
    pub n_fft: usize,
    pub n_mels: usize,
    pub hop_length: usize,
    pub win_length: usize,
    pub preemphasis: f32,
    pub normalization: Normalization,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            n_fft: 1024,
            n_mels: 64,
            hop_length: 320,
            win_length: 800,
            preemphasis: 0.97,
            normalization: Normalization::None,
        }
    }
}

impl MelConfig {
    /// Extract a log-mel feature frame from mono 32kHz samples.
    ///
    /// Returns a (time_steps, n_mels) frame with `self.normalization`
    /// already applied.
    pub fn extract(&self, samples: &[f32]) -> FeatureFrame {
        let emphasized = apply_preemphasis(samples, self.preemphasis);

        let spectrogram = stft(&emphasized, self.n_fft, self.hop_length, self.win_length);

        let filterbank = mel_filterbank(self.n_fft, self.n_mels, SAMPLE_RATE as usize);
        let mel = filterbank.dot(&spectrogram);
        let mel = mel.mapv(|x| x.max(1e-10).ln());

        let mut frame = mel.reversed_axes().as_standard_layout().to_owned();
        self.normalization.apply(&mut frame);
        frame
    }
}

/// A pure feature-enrichment transform.
///
/// Stages consume a frame and produce an enriched one with no hidden state,
/// so any chain of stages is itself deterministic.
pub trait FeatureStage {
    fn apply(&self, frame: FeatureFrame) -> FeatureFrame;
}

/// Replace mel bands with the leading DCT-II coefficients (MFCC).
#[derive(Clone, Copy, Debug)]
pub struct Mfcc {
    pub n_coeffs: usize,
}

impl FeatureStage for Mfcc {
    fn apply(&self, frame: FeatureFrame) -> FeatureFrame {
        let (steps, bands) = frame.dim();
        let n_coeffs = self.n_coeffs.min(bands);
        let mut out = Array2::zeros((steps, n_coeffs));

        let scale0 = (1.0 / bands as f32).sqrt();
        let scale = (2.0 / bands as f32).sqrt();

        for (t, row) in frame.rows().into_iter().enumerate() {
            for k in 0..n_coeffs {
                let sum: f32 = row
                    .iter()
                    .enumerate()
                    .map(|(n, &x)| x * (PI / bands as f32 * (n as f32 + 0.5) * k as f32).cos())
                    .sum();
                out[[t, k]] = sum * if k == 0 { scale0 } else { scale };
            }
        }

        out
    }
}

/// Append first-order time differences of every band.
///
/// Output has twice the input bands: the originals followed by their deltas.
/// Chaining the stage twice appends delta-deltas as well.
#[derive(Clone, Copy, Debug)]
pub struct Delta {
    pub width: usize,
}

impl FeatureStage for Delta {
    fn apply(&self, frame: FeatureFrame) -> FeatureFrame {
        let (steps, bands) = frame.dim();
        let width = self.width.max(1);
        let mut out = Array2::zeros((steps, bands * 2));

        for t in 0..steps {
            let prev = t.saturating_sub(width);
            let next = (t + width).min(steps.saturating_sub(1));
            for b in 0..bands {
                out[[t, b]] = frame[[t, b]];
                out[[t, bands + b]] =
                    (frame[[next, b]] - frame[[prev, b]]) / (2.0 * width as f32);
            }
        }

        out
    }
}

/// Full feature pipeline: log-mel extraction plus optional enrichment.
///
/// Persisted alongside trained parameters so inference reproduces training
/// features exactly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeaturePipeline {
    pub mel: MelConfig,
    /// Replace bands with this many MFCC coefficients
    pub mfcc: Option<usize>,
    /// Append first-order deltas
    pub deltas: bool,
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self {
            mel: MelConfig::default(),
            mfcc: None,
            deltas: false,
        }
    }
}

impl FeaturePipeline {
    /// Extract the enriched feature frame for one window.
    pub fn extract(&self, samples: &[f32]) -> FeatureFrame {
        self.enrich(self.mel.extract(samples))
    }

    /// Apply the enrichment stages to an already-extracted mel frame.
    pub fn enrich(&self, mut frame: FeatureFrame) -> FeatureFrame {
        if let Some(n_coeffs) = self.mfcc {
            frame = Mfcc { n_coeffs }.apply(frame);
        }
        if self.deltas {
            frame = Delta { width: 1 }.apply(frame);
        }
        frame
    }

    /// Number of bands the pipeline produces per time step.
    pub fn output_bands(&self) -> usize {
        let bands = self.mfcc.unwrap_or(self.mel.n_mels).min(self.mel.n_mels);
        if self.deltas {
            bands * 2
        } else {
            bands
        }
    }
}

/// Per-band mean and standard deviation over a set of raw frames.
///
/// Used to resolve [`Normalization::Global`] from a training scan.
pub fn global_stats(frames: &[FeatureFrame], n_bands: usize) -> (Vec<f32>, Vec<f32>) {
    let mut count = 0u64;
    let mut sum = vec![0.0f64; n_bands];
    let mut sum_sq = vec![0.0f64; n_bands];

    for frame in frames {
        for row in frame.rows() {
            for (band, &v) in row.iter().enumerate().take(n_bands) {
                sum[band] += v as f64;
                sum_sq[band] += (v as f64) * (v as f64);
            }
        }
        count += frame.nrows() as u64;
    }

    let count = count.max(1) as f64;
    let mean: Vec<f32> = sum.iter().map(|&s| (s / count) as f32).collect();
    let std: Vec<f32> = sum_sq
        .iter()
        .zip(&mean)
        .map(|(&sq, &m)| {
            let var = (sq / count) - (m as f64) * (m as f64);
            (var.max(1e-12) as f64).sqrt() as f32
        })
        .collect();

    (mean, std)
}

/// Preemphasis filter: `y[i] = x[i] - coef * x[i-1]`.
fn apply_preemphasis(samples: &[f32], coef: f32) -> Vec<f32> {
    let mut result = Vec::with_capacity(samples.len());
    if let Some(&first) = samples.first() {
        result.push(first);
    }
    for i in 1..samples.len() {
        result.push(samples[i] - coef * samples[i - 1]);
    }
    result
}

/// Hann window of the given length.
fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (window_length as f32 - 1.0)).cos())
        .collect()
}

/// Short-Time Fourier Transform power spectrogram, (freq_bins, frames).
fn stft(samples: &[f32], n_fft: usize, hop_length: usize, win_length: usize) -> Array2<f32> {
    use rustfft::{num_complex::Complex, FftPlanner};

    // Guarantee at least one full analysis frame
    let mut padded;
    let samples = if samples.len() < win_length {
        padded = samples.to_vec();
        padded.resize(win_length, 0.0);
        &padded[..]
    } else {
        samples
    };

    let window = hann_window(win_length);
    let num_frames = (samples.len() - win_length) / hop_length + 1;
    let freq_bins = n_fft / 2 + 1;
    let mut spectrogram = Array2::<f32>::zeros((freq_bins, num_frames));

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_length;

        let mut frame: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n_fft];
        for i in 0..win_length.min(samples.len() - start) {
            frame[i] = Complex::new(samples[start + i] * window[i], 0.0);
        }

        fft.process(&mut frame);

        for k in 0..freq_bins {
            let magnitude = frame[k].norm();
            spectrogram[[k, frame_idx]] = magnitude * magnitude;
        }
    }

    spectrogram
}

/// Convert frequency in Hz to mel scale.
fn hz_to_mel(freq: f32) -> f32 {
    2595.0 * (1.0 + freq / 700.0).log10()
}

/// Convert mel scale to frequency in Hz.
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank, (n_mels, freq_bins).
fn mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: usize) -> Array2<f32> {
    let freq_bins = n_fft / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((n_mels, freq_bins));

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);

    let mel_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let freq_bin_width = sample_rate as f32 / n_fft as f32;

    for mel_idx in 0..n_mels {
        let left = mel_points[mel_idx];
        let center = mel_points[mel_idx + 1];
        let right = mel_points[mel_idx + 2];

        for freq_idx in 0..freq_bins {
            let freq = freq_idx as f32 * freq_bin_width;

            if freq >= left && freq <= center {
                filterbank[[mel_idx, freq_idx]] = (freq - left) / (center - left);
            } else if freq > center && freq <= right {
                filterbank[[mel_idx, freq_idx]] = (right - freq) / (right - center);
            }
        }
    }

    filterbank
}

/// Mel band whose filter center is nearest to `freq` Hz.
#[cfg(test)]
fn band_for_frequency(freq: f32, n_mels: usize, sample_rate: usize) -> usize {
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);
    let mel = hz_to_mel(freq);
    (((mel / max_mel) * (n_mels + 1) as f32).round() as usize)
        .saturating_sub(1)
        .min(n_mels - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Axis;

    fn sine(freq: f32, secs: f32) -> Vec<f32> {
        let n = (SAMPLE_RATE as f32 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    #[test]
    fn extraction_is_bit_identical() {
        let samples = sine(800.0, 1.0);
        let config = MelConfig::default();

        let a = config.extract(&samples);
        let b = config.extract(&samples);

        assert_eq!(a, b);
    }

    #[test]
    fn produces_expected_shape() {
        let config = MelConfig::default();
        let samples = sine(500.0, 5.0);

        let frame = config.extract(&samples);

        let expected_steps =
            (samples.len() - config.win_length) / config.hop_length + 1;
        assert_eq!(frame.dim(), (expected_steps, config.n_mels));
    }

    #[test]
    fn concentrates_energy_at_tone_band() {
        let config = MelConfig::default();

        let low = config.extract(&sine(300.0, 1.0));
        let high = config.extract(&sine(6000.0, 1.0));

        let peak_band = |frame: &FeatureFrame| {
            frame
                .mean_axis(Axis(0))
                .unwrap()
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap()
        };

        let low_band = peak_band(&low);
        let high_band = peak_band(&high);
        assert!(low_band < high_band);

        let expected_low = band_for_frequency(300.0, config.n_mels, SAMPLE_RATE as usize);
        assert!(
            (low_band as i64 - expected_low as i64).abs() <= 2,
            "band {low_band} far from expected {expected_low}"
        );
    }

    #[test]
    fn min_max_normalization_bounds_frames() {
        let config = MelConfig {
            normalization: Normalization::PerFrameMinMax,
            ..MelConfig::default()
        };

        let frame = config.extract(&sine(1500.0, 1.0));

        for row in frame.rows() {
            for &v in row {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn global_normalization_centers_bands() {
        let base = MelConfig::default();
        let raw: Vec<FeatureFrame> = [500.0, 1200.0, 4000.0]
            .iter()
            .map(|&f| base.extract(&sine(f, 1.0)))
            .collect();

        let (mean, std) = global_stats(&raw, base.n_mels);
        let normalized = MelConfig {
            normalization: Normalization::Global { mean, std },
            ..base
        };

        let frames: Vec<FeatureFrame> = [500.0, 1200.0, 4000.0]
            .iter()
            .map(|&f| normalized.extract(&sine(f, 1.0)))
            .collect();

        let (mean_after, _) = global_stats(&frames, normalized.n_mels);
        for m in mean_after {
            assert!(m.abs() < 0.05, "band mean {m} not centered");
        }
    }

    #[test]
    fn mfcc_truncates_bands() {
        let frame = MelConfig::default().extract(&sine(900.0, 1.0));
        let steps = frame.nrows();

        let out = Mfcc { n_coeffs: 13 }.apply(frame);

        assert_eq!(out.dim(), (steps, 13));
    }

    #[test]
    fn delta_appends_differences() {
        let frame =
            Array2::from_shape_fn((6, 2), |(t, b)| (t * 2 + b) as f32);

        let out = Delta { width: 1 }.apply(frame);

        assert_eq!(out.dim(), (6, 4));
        // Interior slope of a linear ramp with step 2 is 2
        assert!((out[[2, 2]] - 2.0).abs() < 1e-6);
        // Boundary uses clamped neighbors, halving the span
        assert!((out[[0, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pipeline_reports_output_bands() {
        let plain = FeaturePipeline::default();
        assert_eq!(plain.output_bands(), 64);

        let enriched = FeaturePipeline {
            mfcc: Some(13),
            deltas: true,
            ..FeaturePipeline::default()
        };
        assert_eq!(enriched.output_bands(), 26);

        let frame = enriched.extract(&sine(700.0, 1.0));
        assert_eq!(frame.ncols(), 26);
    }

    #[test]
    fn handles_window_shorter_than_analysis_frame() {
        let config = MelConfig::default();
        let frame = config.extract(&[0.5; 100]);
        assert_eq!(frame.dim(), (1, config.n_mels));
    }
}
