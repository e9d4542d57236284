//! Multi-label species tagger.
//!
//! The tagger maps a feature frame to independent per-species presence
//! probabilities. The concrete model is a one-vs-rest linear classifier over
//! pooled per-band statistics: no particular network architecture is assumed
//! by the pipeline, and anything implementing [`TagModel`] can stand in.
//!
//! Training consumes weak multi-label supervision. Primary labels are
//! confirmed positives, secondary labels are positives with weaker
//! provenance, and everything else is an *unverified* negative trained at a
//! discounted weight. Rare species get inverse-frequency loss boosts so
//! single-digit-example classes are not drowned out.

use crate::error::{ModelError, Result};
use crate::features::{FeatureFrame, FeaturePipeline};
use crate::metadata::LabelState;
use crate::taxonomy::Taxonomy;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A trained model that tags one feature frame.
///
/// Inference is stateless given fixed parameters: identical frames always
/// yield identical probability vectors.
pub trait TagModel {
    /// Per-species presence probabilities, in taxonomy column order.
    fn predict(&self, frame: &FeatureFrame) -> Result<Array1<f32>>;

    /// Number of target species.
    fn num_classes(&self) -> usize;
}

/// Training hyperparameters.
#[derive(clap::Args, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Number of passes over the training set
    #[arg(long, default_value_t = 30)]
    pub epochs: usize,

    /// Mini-batch size
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 0.05)]
    pub learning_rate: f32,

    /// Label smoothing applied to supervision targets
    #[arg(long, default_value_t = 0.05)]
    pub label_smoothing: f32,

    /// Loss weight of secondary-label positives relative to primaries
    #[arg(long, default_value_t = 0.8)]
    pub secondary_weight: f32,

    /// Loss weight of unverified negatives (secondary labels are incomplete,
    /// so absence is never a confirmed negative)
    #[arg(long, default_value_t = 0.3)]
    pub negative_weight: f32,

    /// Cap on the inverse-frequency boost for rare species
    #[arg(long, default_value_t = 10.0)]
    pub class_weight_cap: f32,

    /// Seed for shuffling and weight initialization
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 30,
            batch_size: 32,
            learning_rate: 0.05,
            label_smoothing: 0.05,
            secondary_weight: 0.8,
            negative_weight: 0.3,
            class_weight_cap: 10.0,
            seed: 42,
        }
    }
}

/// One prepared training example: pooled features plus supervision states.
#[derive(Clone, Debug)]
pub struct TrainingExample {
    pub features: Array1<f32>,
    /// Per-species states in taxonomy column order
    pub states: Vec<LabelState>,
}

/// Pool a feature frame into a fixed-length vector.
///
/// Mean and standard deviation of every band over time, interleaved, so any
/// frame length maps to `2 * bands` inputs.
pub fn pool_features(frame: &FeatureFrame) -> Array1<f32> {
    let steps = frame.nrows().max(1) as f32;
    let mut pooled = Vec::with_capacity(frame.ncols() * 2);

    for column in frame.columns() {
        let mean = column.sum() / steps;
        let var = column.iter().map(|&v| (v - mean).powi(2)).sum::<f32>() / steps;
        pooled.push(mean);
        pooled.push(var.sqrt());
    }

    Array1::from_vec(pooled)
}

/// One-vs-rest linear tagger over pooled feature statistics.
pub struct LinearTagger {
    species: Vec<String>,
    pipeline: FeaturePipeline,
    /// (n_classes, n_inputs)
    weights: Array2<f32>,
    bias: Array1<f32>,
}

/// Serialized parameter snapshot.
#[derive(Serialize, Deserialize)]
struct SavedModel {
    species: Vec<String>,
    pipeline: FeaturePipeline,
    n_inputs: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl LinearTagger {
    /// Train on prepared examples.
    ///
    /// Deterministic for a fixed seed: repeated runs over the same examples
    /// produce identical parameters.
    pub fn train(
        examples: &[TrainingExample],
        taxonomy: &Taxonomy,
        pipeline: FeaturePipeline,
        config: &TrainConfig,
    ) -> Result<Self> {
        let first = examples.first().ok_or(ModelError::NoExamples)?;
        let n_inputs = first.features.len();
        let n_classes = taxonomy.len();

        for example in examples {
            if example.features.len() != n_inputs {
                return Err(ModelError::InconsistentExamples {
                    expected: n_inputs,
                    got: example.features.len(),
                }
                .into());
            }
        }

        let class_weights = class_weights(examples, n_classes, config.class_weight_cap);

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut weights =
            Array2::from_shape_fn((n_classes, n_inputs), |_| rng.gen_range(-0.01..0.01));
        let mut bias = Array1::<f32>::zeros(n_classes);

        let target_positive = 1.0 - config.label_smoothing;
        let target_negative = config.label_smoothing;

        let mut indices: Vec<usize> = (0..examples.len()).collect();

        for epoch in 0..config.epochs {
            indices.shuffle(&mut rng);
            let lr = config.learning_rate / (1.0 + 0.1 * epoch as f32);

            let mut epoch_loss = 0.0f32;

            for batch in indices.chunks(config.batch_size) {
                let mut grad_w = Array2::<f32>::zeros((n_classes, n_inputs));
                let mut grad_b = Array1::<f32>::zeros(n_classes);

                for &i in batch {
                    let example = &examples[i];
                    let x = &example.features;

                    let probs = (weights.dot(x) + &bias).mapv(sigmoid);

                    let mut residual = Array1::<f32>::zeros(n_classes);
                    for (c, state) in example.states.iter().enumerate() {
                        let (target, weight) = match state {
                            LabelState::Primary => (target_positive, class_weights[c]),
                            LabelState::Secondary => {
                                (target_positive, config.secondary_weight * class_weights[c])
                            }
                            LabelState::Unverified => (target_negative, config.negative_weight),
                        };
                        let p = probs[c].clamp(1e-7, 1.0 - 1e-7);
                        residual[c] = weight * (p - target);
                        epoch_loss -=
                            weight * (target * p.ln() + (1.0 - target) * (1.0 - p).ln());
                    }

                    grad_w += &residual
                        .view()
                        .insert_axis(Axis(1))
                        .dot(&x.view().insert_axis(Axis(0)));
                    grad_b += &residual;
                }

                let scale = lr / batch.len() as f32;
                weights.scaled_add(-scale, &grad_w);
                bias.scaled_add(-scale, &grad_b);
            }

            tracing::debug!(
                epoch,
                loss = epoch_loss / examples.len() as f32,
                "training epoch complete"
            );
        }

        tracing::info!(
            classes = n_classes,
            inputs = n_inputs,
            examples = examples.len(),
            "training complete"
        );

        Ok(Self {
            species: taxonomy.codes().map(str::to_string).collect(),
            pipeline,
            weights,
            bias,
        })
    }

    /// Extract features for a window and tag it in one step.
    pub fn predict_samples(&self, samples: &[f32]) -> Result<Array1<f32>> {
        let frame = self.pipeline.extract(samples);
        self.predict(&frame)
    }

    /// Species codes in column order.
    pub fn species(&self) -> &[String] {
        &self.species
    }

    /// The feature pipeline this model was trained with.
    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    /// Persist parameters as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let saved = SavedModel {
            species: self.species.clone(),
            pipeline: self.pipeline.clone(),
            n_inputs: self.weights.ncols(),
            weights: self.weights.iter().copied().collect(),
            bias: self.bias.to_vec(),
        };

        let file = File::create(path.as_ref()).map_err(ModelError::from)?;
        serde_json::to_writer(BufWriter::new(file), &saved).map_err(ModelError::from)?;

        tracing::info!(path = %path.as_ref().display(), "saved model parameters");
        Ok(())
    }

    /// Load parameters saved by [`LinearTagger::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(ModelError::from)?;
        let saved: SavedModel =
            serde_json::from_reader(BufReader::new(file)).map_err(ModelError::from)?;

        let n_classes = saved.species.len();
        let weights = Array2::from_shape_vec((n_classes, saved.n_inputs), saved.weights)
            .map_err(ModelError::from)?;

        Ok(Self {
            species: saved.species,
            pipeline: saved.pipeline,
            weights,
            bias: Array1::from_vec(saved.bias),
        })
    }
}

impl TagModel for LinearTagger {
    fn predict(&self, frame: &FeatureFrame) -> Result<Array1<f32>> {
        let x = pool_features(frame);
        if x.len() != self.weights.ncols() {
            return Err(ModelError::FeatureLength {
                expected: self.weights.ncols(),
                got: x.len(),
            }
            .into());
        }

        let logits = self.weights.dot(&x) + &self.bias;
        Ok(logits.mapv(sigmoid))
    }

    fn num_classes(&self) -> usize {
        self.species.len()
    }
}

/// Indices and values of the `k` most probable species, descending.
pub fn top_k(probabilities: &Array1<f32>, k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}

/// Inverse-frequency boost per class, capped, never below 1.
///
/// Some species have single-digit example counts; without the boost their
/// gradient contribution vanishes next to thousand-example classes.
fn class_weights(examples: &[TrainingExample], n_classes: usize, cap: f32) -> Vec<f32> {
    let mut counts = vec![0usize; n_classes];
    for example in examples {
        for (c, state) in example.states.iter().enumerate() {
            if state.is_positive() {
                counts[c] += 1;
            }
        }
    }

    let total: usize = counts.iter().sum();
    let mean = total as f32 / n_classes as f32;

    counts
        .iter()
        .map(|&c| (mean / c.max(1) as f32).clamp(1.0, cap))
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
