//! Inference over soundscape files.
//!
//! Each file is windowed, featurized, and tagged independently, so the batch
//! fans out across a worker pool with no shared mutable state: every worker
//! owns its decode buffer and scratch space, and the trained parameters are
//! shared read-only behind an `Arc`. A file that cannot be decoded, or that
//! blows its wall-clock budget, degrades to default-probability rows instead
//! of stalling or shrinking the batch.

use crate::audio;
use crate::model::LinearTagger;
use crate::window::{soundscape_windows, WindowConfig};
use ndarray_stats::QuantileExt;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Probability emitted for windows of files that could not be scored.
pub const DEFAULT_PROBABILITY: f32 = 0.001;

/// Nominal soundscape duration, used when a file cannot be decoded.
pub const NOMINAL_SOUNDSCAPE_SECS: u32 = 60;

/// Inference configuration.
#[derive(clap::Args, Clone, Debug)]
pub struct InferenceConfig {
    #[command(flatten)]
    pub window: WindowConfig,

    /// Wall-clock budget per file in seconds; a slower file is abandoned
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            timeout_secs: 30,
        }
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One submission row: a window's per-species probabilities.
#[derive(Clone, Debug)]
pub struct PredictionRow {
    pub row_id: String,
    pub probabilities: Vec<f32>,
}

/// Soundscape identifier derived from a file name.
pub fn soundscape_id(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Submission row identifier for a window ending at `end_secs`.
pub fn row_id(soundscape: &str, end_secs: u32) -> String {
    format!("{soundscape}_{end_secs}")
}

/// Default-probability rows for a nominal-length soundscape.
///
/// Used when a file cannot be decoded or scored at all: the expected row set
/// must still be covered, a missing row is worse than a low-confidence one.
pub fn default_rows(soundscape: &str, n_classes: usize, config: &WindowConfig) -> Vec<PredictionRow> {
    let count = NOMINAL_SOUNDSCAPE_SECS.div_ceil(config.window_secs.max(1));
    (1..=count)
        .map(|i| PredictionRow {
            row_id: row_id(soundscape, i * config.window_secs),
            probabilities: vec![DEFAULT_PROBABILITY; n_classes],
        })
        .collect()
}

/// Score one soundscape file, yielding a row per window in end-time order.
///
/// Decode failures degrade to [`default_rows`]; they are logged, never
/// propagated, so one corrupt file cannot abort a batch.
pub fn predict_file(
    model: &LinearTagger,
    path: &Path,
    config: &InferenceConfig,
) -> Vec<PredictionRow> {
    let soundscape = soundscape_id(path);
    let n_classes = model.species().len();

    let samples = match audio::decode_file(path) {
        Ok(samples) => samples,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "decode failed, emitting default rows");
            return default_rows(&soundscape, n_classes, &config.window);
        }
    };

    soundscape_windows(&samples, &config.window)
        .into_iter()
        .map(|window| {
            let probabilities = match model.predict_samples(&window.samples) {
                Ok(probs) => {
                    if let Ok(best) = probs.argmax() {
                        debug!(
                            soundscape = %soundscape,
                            end_secs = window.end_secs,
                            species = %model.species()[best],
                            probability = probs[best],
                            "scored window"
                        );
                    }
                    probs.to_vec()
                }
                Err(e) => {
                    warn!(
                        soundscape = %soundscape,
                        end_secs = window.end_secs,
                        error = %e,
                        "prediction failed, emitting default row"
                    );
                    vec![DEFAULT_PROBABILITY; n_classes]
                }
            };

            PredictionRow {
                row_id: row_id(&soundscape, window.end_secs),
                probabilities,
            }
        })
        .collect()
}

/// Score every audio file in a directory in parallel.
///
/// Files are processed in sorted order so output is stable. Each file runs
/// under the configured wall-clock budget; a file that exceeds it is
/// abandoned and covered by default rows.
pub fn predict_directory(
    model: &Arc<LinearTagger>,
    dir: &Path,
    config: &InferenceConfig,
) -> Vec<PredictionRow> {
    let files = list_audio_files(dir);
    let n_classes = model.species().len();

    debug!(dir = %dir.display(), files = files.len(), "scoring soundscapes");

    files
        .par_iter()
        .flat_map(|path| {
            let job_model = Arc::clone(model);
            let job_config = config.clone();
            let job_path = path.clone();

            match run_with_deadline(config.timeout(), move || {
                predict_file(&job_model, &job_path, &job_config)
            }) {
                Some(rows) => rows,
                None => {
                    warn!(
                        path = %path.display(),
                        timeout_secs = config.timeout_secs,
                        "exceeded time budget, emitting default rows"
                    );
                    default_rows(&soundscape_id(path), n_classes, &config.window)
                }
            }
        })
        .collect()
}

/// Audio files under a directory, sorted by path.
pub fn list_audio_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| audio::is_audio_file(path))
        .collect();
    files.sort();
    files
}

/// Run a job on its own thread, abandoning it past the deadline.
///
/// The worker is detached on timeout; its eventual result is dropped with the
/// channel. Bounded time per unit matters more than the stray thread.
fn run_with_deadline<T, F>(deadline: Duration, job: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    let spawned = std::thread::Builder::new()
        .name("chorus-file-worker".into())
        .spawn(move || {
            let _ = tx.send(job());
        });
    if spawned.is_err() {
        return None;
    }

    rx.recv_timeout(deadline).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_soundscape_id_from_path() {
        let id = soundscape_id(Path::new("/data/test_soundscapes/soundscape_12345.ogg"));
        assert_eq!(id, "soundscape_12345");
    }

    #[test]
    fn formats_row_ids() {
        assert_eq!(row_id("soundscape_12345", 5), "soundscape_12345_5");
        assert_eq!(row_id("soundscape_12345", 60), "soundscape_12345_60");
    }

    #[test]
    fn default_rows_cover_nominal_duration() {
        let rows = default_rows("soundscape_7", 3, &WindowConfig::default());

        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].row_id, "soundscape_7_5");
        assert_eq!(rows[11].row_id, "soundscape_7_60");
        for row in &rows {
            assert_eq!(row.probabilities, vec![DEFAULT_PROBABILITY; 3]);
        }
    }

    #[test]
    fn deadline_returns_fast_results() {
        let result = run_with_deadline(Duration::from_secs(5), || 41 + 1);
        assert_eq!(result, Some(42));
    }

    #[test]
    fn deadline_abandons_slow_jobs() {
        let result = run_with_deadline(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_secs(2));
            0
        });
        assert_eq!(result, None);
    }

    #[test]
    fn lists_audio_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.ogg"), b"x").unwrap();
        std::fs::write(dir.path().join("a.ogg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = list_audio_files(dir.path());

        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.ogg", "b.ogg"]);
    }
}
