//! Train subcommand - fit a tagging model from labeled clips.

use chorus_core::metadata::load_train_csv;
use chorus_core::model::{LinearTagger, TrainConfig};
use chorus_core::taxonomy::Taxonomy;
use chorus_core::training::{prepare_examples, FeatureOpts};
use chorus_core::window::WindowConfig;
use eyre::{Result, WrapErr};
use std::path::PathBuf;
use std::time::Instant;

/// CLI arguments for training.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Competition data directory (train.csv, taxonomy.csv, train_audio/)
    pub data_dir: PathBuf,

    /// Output path for trained model parameters
    #[arg(short, long, default_value = "model.json")]
    pub model: PathBuf,

    #[command(flatten)]
    pub window: WindowConfig,

    #[command(flatten)]
    pub features: FeatureOpts,

    #[command(flatten)]
    pub train_config: TrainConfig,
}

/// Resolved configuration for training.
#[derive(Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub model: PathBuf,
    pub window: WindowConfig,
    pub features: FeatureOpts,
    pub train_config: TrainConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            data_dir: args.data_dir,
            model: args.model,
            window: args.window,
            features: args.features,
            train_config: args.train_config,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let taxonomy = Taxonomy::from_csv(config.data_dir.join("taxonomy.csv"))
        .wrap_err("failed to load taxonomy")?;

    let records = load_train_csv(config.data_dir.join("train.csv"), &taxonomy)
        .wrap_err("failed to load training metadata")?;

    tracing::info!(
        species = taxonomy.len(),
        records = records.len(),
        "starting training run"
    );

    let s = Instant::now();

    let (examples, pipeline) = prepare_examples(
        &config.data_dir.join("train_audio"),
        &records,
        &taxonomy,
        &config.window,
        &config.features,
    )
    .wrap_err("failed to prepare training examples")?;

    tracing::info!(
        duration = %format_secs(s.elapsed().as_secs_f32()),
        "training examples prepared"
    );

    let s = Instant::now();

    let model = LinearTagger::train(&examples, &taxonomy, pipeline, &config.train_config)
        .wrap_err("training failed")?;

    tracing::info!(
        duration = %format_secs(s.elapsed().as_secs_f32()),
        "model fitted"
    );

    model
        .save(&config.model)
        .wrap_err_with(|| format!("failed to save model: {:?}", config.model.display()))?;

    Ok(())
}

/// Format seconds as a string with two decimal places.
fn format_secs(secs: f32) -> String {
    format!("{:.2}s", secs)
}
