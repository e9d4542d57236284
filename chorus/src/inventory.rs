//! Inventory subcommand - summarize the training audio collection.

use chorus_core::inventory::{rarest_species, scan, summarize, write_csv};
use chorus_core::taxonomy::Taxonomy;
use eyre::{Result, WrapErr};
use std::path::PathBuf;

/// CLI arguments for the inventory scan.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Competition data directory (taxonomy.csv, train_audio/)
    pub data_dir: PathBuf,

    /// Optional path for the per-file inventory table
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// How many of the rarest species to list
    #[arg(long, default_value_t = 10)]
    pub rarest: usize,
}

/// Resolved configuration for the inventory scan.
#[derive(Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub output: Option<PathBuf>,
    pub rarest: usize,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            data_dir: args.data_dir,
            output: args.output,
            rarest: args.rarest,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let taxonomy = Taxonomy::from_csv(config.data_dir.join("taxonomy.csv"))
        .wrap_err("failed to load taxonomy")?;

    let entries = scan(&config.data_dir.join("train_audio"), &taxonomy)
        .wrap_err("inventory scan failed")?;
    let summary = summarize(&entries);

    print!("{summary}");

    if config.rarest > 0 {
        println!("rarest species:");
        for (species, count) in rarest_species(&summary, config.rarest) {
            println!("  {species}: {count}");
        }
    }

    if let Some(output) = &config.output {
        write_csv(&entries, output)
            .wrap_err_with(|| format!("failed to write inventory: {:?}", output.display()))?;
    }

    Ok(())
}
