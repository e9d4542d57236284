//! Fixed-length analysis windows over recordings.
//!
//! Soundscapes are partitioned into non-overlapping windows covering the
//! whole file, with the final partial window zero-padded so no sample is
//! dropped. Training clips yield a single deterministic window: the loudest
//! sub-span of long clips, a looped copy of short ones.

use crate::audio::SAMPLE_RATE;

/// Default analysis window length in seconds.
const DEFAULT_WINDOW_SECS: u32 = 5;

/// Analysis window configuration.
#[derive(clap::Args, Clone, Copy, Debug)]
pub struct WindowConfig {
    /// Analysis window length in seconds
    #[arg(long, default_value_t = DEFAULT_WINDOW_SECS)]
    pub window_secs: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl WindowConfig {
    /// Window length in samples.
    pub fn window_samples(&self) -> usize {
        self.window_secs as usize * SAMPLE_RATE as usize
    }

    /// Number of windows covering `len` samples (final window padded).
    pub fn window_count(&self, len: usize) -> usize {
        len.div_ceil(self.window_samples())
    }
}

/// One fixed-length window of a recording.
///
/// `samples` is always exactly one window long; `end_secs` is the end-time
/// label of the window within the source recording.
#[derive(Clone, Debug)]
pub struct Window {
    pub samples: Vec<f32>,
    pub end_secs: u32,
}

/// Partition a soundscape into consecutive fixed-length windows.
///
/// Windows are non-overlapping and cover every input sample; the final
/// window is zero-padded to full length when the duration is not an exact
/// multiple of the window length. End-time labels advance in whole window
/// lengths (5, 10, ... for the default config).
pub fn soundscape_windows(samples: &[f32], config: &WindowConfig) -> Vec<Window> {
    let window_len = config.window_samples();
    if samples.is_empty() || window_len == 0 {
        return Vec::new();
    }

    (0..config.window_count(samples.len()))
        .map(|i| {
            let start = i * window_len;
            let end = (start + window_len).min(samples.len());

            let mut window = samples[start..end].to_vec();
            window.resize(window_len, 0.0);

            Window {
                samples: window,
                end_secs: (i as u32 + 1) * config.window_secs,
            }
        })
        .collect()
}

/// Extract one deterministic training window from a clip.
///
/// Clips longer than the window yield the sub-span with maximum short-term
/// energy, scanned at a one-second stride with the earliest span winning
/// ties. Clips shorter than the window are looped to full length so band
/// statistics stay representative. Repeated passes over the same clip always
/// see the identical window.
pub fn training_window(samples: &[f32], config: &WindowConfig) -> Vec<f32> {
    let window_len = config.window_samples();
    if samples.is_empty() || window_len == 0 {
        return vec![0.0; window_len];
    }

    if samples.len() == window_len {
        return samples.to_vec();
    }

    if samples.len() < window_len {
        return samples.iter().copied().cycle().take(window_len).collect();
    }

    let start = max_energy_start(samples, window_len);
    samples[start..start + window_len].to_vec()
}

/// Start index of the window with maximum energy, earliest wins ties.
fn max_energy_start(samples: &[f32], window_len: usize) -> usize {
    let stride = SAMPLE_RATE as usize;
    let last_start = samples.len() - window_len;

    // Prefix sums of squared samples make each candidate span O(1).
    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0f64);
    for &s in samples {
        prefix.push(prefix[prefix.len() - 1] + (s as f64) * (s as f64));
    }
    let energy = |start: usize| prefix[start + window_len] - prefix[start];

    let mut best_start = 0;
    let mut best_energy = energy(0);

    let candidates = (stride..=last_start).step_by(stride).chain(
        // Cover the tail when the last stride lands short of it
        (last_start % stride != 0).then_some(last_start),
    );
    for start in candidates {
        let e = energy(start);
        if e > best_energy {
            best_energy = e;
            best_start = start;
        }
    }

    best_start
}
