mod app;
mod batchfile;
mod cli;
mod config;
mod datasources;
mod error;
mod logic;
mod models;

use anyhow::Context;
use app::App;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Some(Commands::Init) => {
            let (_, path) = Config::setup_interactive().context("interactive setup failed")?;
            println!("Config written to {}", path.display());
        }
        Some(Commands::Check { batch_csv, labels }) => {
            let app = open_app(&cli.config, cli.output_dir.as_ref())?;
            let report = app
                .check(&batch_csv, labels.as_deref())
                .with_context(|| format!("checking {}", batch_csv.display()))?;
            println!(
                "Checked {} runs, {} invalid. Report: {}",
                report.checked,
                report.invalid,
                report.report_path.display()
            );
        }
        Some(Commands::Generate { labels, climate }) => {
            let app = open_app(&cli.config, cli.output_dir.as_ref())?;
            generate(&app, labels.as_deref(), climate.as_deref())?;
        }
        None => {
            let app = open_app(&cli.config, cli.output_dir.as_ref())?;
            generate(&app, None, None)?;
        }
    }

    Ok(())
}

fn open_app(
    config_path: &Option<std::path::PathBuf>,
    output_override: Option<&std::path::PathBuf>,
) -> anyhow::Result<App> {
    let config = if Config::exists(config_path.as_ref()) {
        Config::load(config_path.clone()).context("loading configuration")?
    } else {
        eprintln!("No config found. Starting setup.");
        let (config, path) = Config::setup_interactive().context("interactive setup failed")?;
        eprintln!("Config written to {}", path.display());
        config
    };

    let output_dir = config
        .resolve_output_dir(output_override)
        .context("preparing output directory")?;
    Ok(App::new(config, output_dir))
}

fn generate(
    app: &App,
    labels: Option<&std::path::Path>,
    climate: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let report = app
        .generate(labels, climate)
        .context("batch generation failed")?;

    for id in &report.run_ids {
        tracing::debug!(run = %id, "written");
    }
    match &report.batch_path {
        Some(path) => println!("Wrote {} runs to {}", report.runs_written, path.display()),
        None => println!("No runs written"),
    }
    if !report.failures.is_empty() {
        eprintln!("{} runs skipped:", report.failures.len());
        for failure in &report.failures {
            eprintln!("  {}", failure);
        }
    }
    Ok(())
}
