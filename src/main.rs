//! Kolosal Anomaly - Main Entry Point
//!
//! Trains and compares an Isolation Forest and a One-Class SVM on labeled
//! transaction data.

use clap::Parser;
use kolosal_anomaly::cli::{cmd_generate, cmd_info, cmd_predict, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_anomaly=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { config, data, save, prefix }) => {
            cmd_run(config.as_deref(), data.as_deref(), save.as_deref(), &prefix)?;
        }
        Some(Commands::Predict { models, prefix, data, model, label, output }) => {
            cmd_predict(&models, &prefix, &data, model.as_deref(), &label, output.as_deref())?;
        }
        Some(Commands::Info { data, label }) => {
            cmd_info(&data, &label)?;
        }
        Some(Commands::Generate { output, samples, features, anomaly_ratio, seed }) => {
            cmd_generate(&output, samples, features, anomaly_ratio, seed)?;
        }
        None => {
            // Default: full run with the default configuration
            cmd_run(None, None, None, "anomaly")?;
        }
    }

    Ok(())
}
