//! Training-example preparation.
//!
//! Recordings are independent, so decode, windowing, and feature extraction
//! fan out across the worker pool; each worker owns its buffers. Clips that
//! fail to decode are skipped and logged. Schema problems abort the run, a
//! bad label set would poison every downstream example.
//!
//! Normalization statistics are resolved here: when global normalization is
//! requested, band statistics are computed over the raw training frames and
//! baked into the returned [`FeaturePipeline`], so inference reproduces the
//! exact training-time features.

use crate::audio;
use crate::error::Result;
use crate::features::{
    global_stats, FeatureFrame, FeaturePipeline, MelConfig, Normalization, NormalizationMode,
};
use crate::metadata::{label_states, LabelState, TrainRecord};
use crate::model::{pool_features, TrainingExample};
use crate::taxonomy::Taxonomy;
use crate::window::{training_window, WindowConfig};
use rayon::prelude::*;
use std::path::Path;
use tracing::{info, warn};

/// Feature-extraction choices for a training run.
#[derive(clap::Args, Clone, Debug)]
pub struct FeatureOpts {
    /// Replace mel bands with this many MFCC coefficients
    #[arg(long)]
    pub mfcc: Option<usize>,

    /// Append first-order deltas to the feature frame
    #[arg(long)]
    pub deltas: bool,

    /// Feature normalization mode
    #[arg(long, value_enum, default_value_t = NormalizationMode::Global)]
    pub normalization: NormalizationMode,
}

impl Default for FeatureOpts {
    fn default() -> Self {
        Self {
            mfcc: None,
            deltas: false,
            normalization: NormalizationMode::Global,
        }
    }
}

/// Prepare pooled training examples from labeled clips.
///
/// Returns the examples together with the fully resolved feature pipeline
/// (normalization statistics included) that must be persisted with the
/// trained parameters.
pub fn prepare_examples(
    audio_dir: &Path,
    records: &[TrainRecord],
    taxonomy: &Taxonomy,
    window: &WindowConfig,
    opts: &FeatureOpts,
) -> Result<(Vec<TrainingExample>, FeaturePipeline)> {
    let raw_mel = MelConfig {
        normalization: Normalization::None,
        ..MelConfig::default()
    };

    // Decode, window, and extract raw frames in parallel; a clip that fails
    // to decode is excluded from training, not fatal.
    let raw: Result<Vec<Option<(FeatureFrame, Vec<LabelState>)>>> = records
        .par_iter()
        .map(|record| {
            let path = audio_dir.join(&record.filename);
            let samples = match audio::decode_file(&path) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping undecodable clip");
                    return Ok(None);
                }
            };

            let window_samples = training_window(&samples, window);
            let frame = raw_mel.extract(&window_samples);
            let states = label_states(record, taxonomy)?;

            Ok(Some((frame, states)))
        })
        .collect();

    let prepared: Vec<(FeatureFrame, Vec<LabelState>)> =
        raw?.into_iter().flatten().collect();

    let skipped = records.len() - prepared.len();
    if skipped > 0 {
        warn!(skipped, usable = prepared.len(), "some clips were excluded");
    }

    let normalization = match opts.normalization {
        NormalizationMode::None => Normalization::None,
        NormalizationMode::MinMax => Normalization::PerFrameMinMax,
        NormalizationMode::Global => {
            let frames: Vec<FeatureFrame> =
                prepared.iter().map(|(frame, _)| frame.clone()).collect();
            let (mean, std) = global_stats(&frames, raw_mel.n_mels);
            Normalization::Global { mean, std }
        }
    };

    let pipeline = FeaturePipeline {
        mel: MelConfig {
            normalization: normalization.clone(),
            ..raw_mel
        },
        mfcc: opts.mfcc,
        deltas: opts.deltas,
    };

    let examples: Vec<TrainingExample> = prepared
        .into_iter()
        .map(|(mut frame, states)| {
            normalization.apply(&mut frame);
            let enriched = pipeline.enrich(frame);
            TrainingExample {
                features: pool_features(&enriched),
                states,
            }
        })
        .collect();

    info!(
        examples = examples.len(),
        inputs = examples.first().map(|e| e.features.len()).unwrap_or(0),
        "prepared training examples"
    );

    Ok((examples, pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SAMPLE_RATE;
    use crate::metadata::Collection;
    use crate::taxonomy::test_taxonomy;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::f32::consts::PI;

    fn write_tone(path: &Path, freq: f32, secs: f32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..((secs * SAMPLE_RATE as f32) as usize) {
            let s = (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin();
            writer.write_sample((s * 20000.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn record(primary: &str, filename: &str) -> TrainRecord {
        TrainRecord {
            primary_label: primary.into(),
            secondary_labels: vec![],
            latitude: None,
            longitude: None,
            author: "A".into(),
            filename: filename.into(),
            rating: 4.0,
            collection: Collection::XenoCanto,
        }
    }

    #[test]
    fn prepares_examples_and_resolves_normalization() {
        let taxonomy = test_taxonomy(&["a", "b"]);
        let dir = tempfile::tempdir().unwrap();
        write_tone(&dir.path().join("XC1.wav"), 500.0, 2.0);
        write_tone(&dir.path().join("XC2.wav"), 4000.0, 2.0);

        let records = vec![record("a", "XC1.wav"), record("b", "XC2.wav")];

        let (examples, pipeline) = prepare_examples(
            dir.path(),
            &records,
            &taxonomy,
            &WindowConfig::default(),
            &FeatureOpts::default(),
        )
        .unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].features.len(), 2 * pipeline.mel.n_mels);
        assert!(matches!(
            pipeline.mel.normalization,
            Normalization::Global { .. }
        ));
    }

    #[test]
    fn skips_undecodable_clips() {
        let taxonomy = test_taxonomy(&["a", "b"]);
        let dir = tempfile::tempdir().unwrap();
        write_tone(&dir.path().join("XC1.wav"), 500.0, 1.0);
        std::fs::write(dir.path().join("XC2.ogg"), b"garbage").unwrap();

        let records = vec![record("a", "XC1.wav"), record("b", "XC2.ogg")];

        let (examples, _) = prepare_examples(
            dir.path(),
            &records,
            &taxonomy,
            &WindowConfig::default(),
            &FeatureOpts::default(),
        )
        .unwrap();

        assert_eq!(examples.len(), 1);
    }

    #[test]
    fn identical_runs_prepare_identical_examples() {
        let taxonomy = test_taxonomy(&["a"]);
        let dir = tempfile::tempdir().unwrap();
        write_tone(&dir.path().join("XC1.wav"), 900.0, 7.0);

        let records = vec![record("a", "XC1.wav")];
        let window = WindowConfig::default();
        let opts = FeatureOpts::default();

        let (first, _) =
            prepare_examples(dir.path(), &records, &taxonomy, &window, &opts).unwrap();
        let (second, _) =
            prepare_examples(dir.path(), &records, &taxonomy, &window, &opts).unwrap();

        assert_eq!(first[0].features, second[0].features);
    }
}
