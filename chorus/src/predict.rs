//! Predict subcommand - score test soundscapes into a submission table.

use chorus_core::infer::{list_audio_files, predict_directory, InferenceConfig};
use chorus_core::model::LinearTagger;
use chorus_core::submission::{
    expected_from_files, expected_from_sample, verify_species_columns, SubmissionTable,
};
use chorus_core::taxonomy::Taxonomy;
use eyre::{Result, WrapErr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// CLI arguments for prediction.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Competition data directory (test_soundscapes/, sample_submission.csv)
    pub data_dir: PathBuf,

    /// Path to trained model parameters
    #[arg(short, long, default_value = "model.json")]
    pub model: PathBuf,

    /// Output submission path
    #[arg(short, long, default_value = "submission.csv")]
    pub output: PathBuf,

    #[command(flatten)]
    pub inference: InferenceConfig,
}

/// Resolved configuration for prediction.
#[derive(Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub model: PathBuf,
    pub output: PathBuf,
    pub inference: InferenceConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            data_dir: args.data_dir,
            model: args.model,
            output: args.output,
            inference: args.inference,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let model = LinearTagger::load(&config.model)
        .wrap_err_with(|| format!("failed to load model: {:?}", config.model.display()))?;
    let model = Arc::new(model);

    // When the taxonomy is available, confirm the model's column order
    // still matches it before scoring anything.
    let taxonomy_path = config.data_dir.join("taxonomy.csv");
    if taxonomy_path.is_file() {
        let taxonomy =
            Taxonomy::from_csv(&taxonomy_path).wrap_err("failed to load taxonomy")?;
        verify_species_columns(&taxonomy, model.species())
            .wrap_err("model species columns do not match the taxonomy")?;
    }

    let soundscape_dir = config.data_dir.join("test_soundscapes");
    let files = list_audio_files(&soundscape_dir);

    tracing::info!(
        dir = %soundscape_dir.display(),
        files = files.len(),
        species = model.species().len(),
        "scoring soundscapes"
    );

    let s = Instant::now();
    let rows = predict_directory(&model, &soundscape_dir, &config.inference);
    tracing::info!(
        duration = %format_secs(s.elapsed().as_secs_f32()),
        rows = rows.len(),
        "inference completed"
    );

    // The sample submission, when present, is the authoritative row set and
    // column order; otherwise both derive from the file list and the model.
    let sample_path = config.data_dir.join("sample_submission.csv");
    let expected = if sample_path.is_file() {
        let (row_ids, species) =
            expected_from_sample(&sample_path).wrap_err("failed to read sample submission")?;
        if species != model.species() {
            eyre::bail!(
                "model species columns do not match sample submission ({} vs {})",
                model.species().len(),
                species.len()
            );
        }
        row_ids
    } else {
        expected_from_files(&files, &config.inference.window)
    };

    let mut table = SubmissionTable::new(model.species().to_vec(), rows);
    table
        .reconcile(&expected)
        .wrap_err("row set reconciliation failed")?;
    table.validate().wrap_err("submission validation failed")?;
    table
        .write_csv(&config.output)
        .wrap_err_with(|| format!("failed to write submission: {:?}", config.output.display()))?;

    Ok(())
}

/// Format seconds as a string with two decimal places.
fn format_secs(secs: f32) -> String {
    format!("{:.2}s", secs)
}
