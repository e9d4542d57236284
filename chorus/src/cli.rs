//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use eyre::Result;

#[derive(Debug, Parser)]
#[command(name = "chorus")]
#[command(about = "Soundscape species tagging: train, predict, inventory")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Train a tagging model from labeled clips
    Train(crate::train::Args),

    /// Score test soundscapes into a submission table
    Predict(crate::predict::Args),

    /// Summarize the training audio collection
    Inventory(crate::inventory::Args),
}

/// Execute CLI command - separated for testing.
pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Train(args) => crate::train::execute(args.try_into()?),
        Commands::Predict(args) => crate::predict::execute(args.try_into()?),
        Commands::Inventory(args) => crate::inventory::execute(args.try_into()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_train_command() {
        let cli = Cli::parse_from(["chorus", "train", "data", "-m", "out.json"]);

        match &cli.command {
            Commands::Train(args) if args.data_dir.to_str() == Some("data") => {
                assert_eq!(args.model.to_str(), Some("out.json"));
                assert_eq!(args.train_config.epochs, 30);
                assert_eq!(args.train_config.seed, 42);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_train_hyperparameters() {
        let cli = Cli::parse_from([
            "chorus", "train", "data", "--epochs", "5", "--seed", "7", "--deltas",
        ]);

        match &cli.command {
            Commands::Train(args) => {
                assert_eq!(args.train_config.epochs, 5);
                assert_eq!(args.train_config.seed, 7);
                assert!(args.features.deltas);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_predict_command() {
        let cli = Cli::parse_from([
            "chorus",
            "predict",
            "data",
            "-m",
            "model.json",
            "-o",
            "submission.csv",
        ]);

        match &cli.command {
            Commands::Predict(args) if args.data_dir.to_str() == Some("data") => {
                assert_eq!(args.model.to_str(), Some("model.json"));
                assert_eq!(args.output.to_str(), Some("submission.csv"));
                assert_eq!(args.inference.timeout_secs, 30);
                assert_eq!(args.inference.window.window_secs, 5);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_predict_window_override() {
        let cli = Cli::parse_from([
            "chorus",
            "predict",
            "data",
            "--window-secs",
            "10",
            "--timeout-secs",
            "120",
        ]);

        match &cli.command {
            Commands::Predict(args) => {
                assert_eq!(args.inference.window.window_secs, 10);
                assert_eq!(args.inference.timeout_secs, 120);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_inventory_command() {
        let cli = Cli::parse_from(["chorus", "inventory", "data", "--rarest", "5"]);

        match &cli.command {
            Commands::Inventory(args) if args.data_dir.to_str() == Some("data") => {
                assert_eq!(args.rarest, 5);
                assert!(args.output.is_none());
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }
}
