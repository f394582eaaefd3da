use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pwc-batch",
    version,
    about = "Label-compliant application schedules and PWC batch files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured output directory
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Re-run interactive setup
    Init,
    /// Solve schedules and write the batch file (default)
    Generate {
        /// Label/site/landscape file, overriding the configured one
        #[arg(long)]
        labels: Option<PathBuf>,
        /// Wettest month table, overriding the configured one
        #[arg(long)]
        climate: Option<PathBuf>,
    },
    /// Check an existing batch file against the label set
    Check {
        /// Batch CSV to check
        batch_csv: PathBuf,
        /// Label/site/landscape file, overriding the configured one
        #[arg(long)]
        labels: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_generate() {
        let cli = Cli::parse_from(["pwc-batch", "-vv"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn check_takes_batch_path() {
        let cli = Cli::parse_from(["pwc-batch", "check", "out/atz_new_batch_file.csv", "-o", "qc"]);
        match cli.command {
            Some(Commands::Check { batch_csv, labels }) => {
                assert_eq!(batch_csv, PathBuf::from("out/atz_new_batch_file.csv"));
                assert!(labels.is_none());
            }
            _ => panic!("expected check"),
        }
        assert_eq!(cli.output_dir, Some(PathBuf::from("qc")));
    }

    #[test]
    fn generate_overrides() {
        let cli = Cli::parse_from(["pwc-batch", "generate", "--climate", "wet.csv"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Generate { climate: Some(_), labels: None })
        ));
    }
}
