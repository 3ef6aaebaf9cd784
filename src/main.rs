//! Bucle CLI
//!
//! # Usage
//!
//! ```bash
//! # Validate a training configuration
//! bucle validate train.yaml
//!
//! # Summarize a checkpoint
//! bucle inspect model.safetensors
//! bucle inspect model.json --format json
//! ```

use bucle::cli::{Cli, Command, InspectArgs, OutputFormat, ValidateArgs};
use bucle::io::{load_checkpoint, SavedState};
use bucle::train::TrainArgs;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Inspect(args) => run_inspect(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_validate(args: ValidateArgs) -> bucle::Result<()> {
    tracing::info!(config = %args.config.display(), "validating configuration");
    let train_args = TrainArgs::from_file(&args.config)?;
    tracing::info!("configuration is valid");

    if args.detailed {
        let yaml = serde_yaml::to_string(&train_args)
            .map_err(|e| bucle::Error::Serialization(e.to_string()))?;
        println!("{yaml}");
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> bucle::Result<()> {
    let saved = load_checkpoint(&args.checkpoint)?;

    let tensors: Vec<(String, usize)> = saved
        .weights()
        .iter()
        .map(|(name, values)| (name.clone(), values.len()))
        .collect();
    let total: usize = tensors.iter().map(|(_, n)| n).sum();

    match args.format {
        OutputFormat::Json => {
            let checkpoint = saved.as_checkpoint();
            let summary = serde_json::json!({
                "kind": if saved.is_weights_only() { "weights_only" } else { "full" },
                "epoch": checkpoint.map(|c| c.epoch),
                "fp16": checkpoint.map(|c| c.fp16),
                "optimizer": checkpoint.is_some_and(|c| c.optimizer.is_some()),
                "scheduler": checkpoint.is_some_and(|c| c.scheduler.is_some()),
                "parameters": total,
                "tensors": tensors.iter().map(|(name, n)| serde_json::json!({ "name": name, "len": n })).collect::<Vec<_>>(),
            });
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| bucle::Error::Serialization(e.to_string()))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            println!("Checkpoint: {}", args.checkpoint.display());
            match &saved {
                SavedState::Full(checkpoint) => {
                    println!("  Kind: full");
                    println!("  Epoch: {}", checkpoint.epoch);
                    println!("  fp16: {}", checkpoint.fp16);
                    println!("  Optimizer state: {}", yes_no(checkpoint.optimizer.is_some()));
                    println!("  Scheduler state: {}", yes_no(checkpoint.scheduler.is_some()));
                }
                SavedState::WeightsOnly(_) => println!("  Kind: weights only"),
            }
            println!("  Parameters: {total}");
            for (name, n) in &tensors {
                println!("    {name}: {n}");
            }
        }
    }
    Ok(())
}

fn yes_no(present: bool) -> &'static str {
    if present {
        "yes"
    } else {
        "no"
    }
}
