//! Command-line interface
//!
//! ```bash
//! bucle validate train.yaml
//! bucle inspect checkpoint.safetensors --format json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Bucle: training-loop harness
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "bucle")]
#[command(version)]
#[command(about = "Validate training configurations and inspect checkpoints")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter for the flags; `RUST_LOG` takes precedence
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Parse and validate a training configuration (YAML or JSON)
    Validate(ValidateArgs),

    /// Summarize a checkpoint file
    Inspect(InspectArgs),
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Print the resolved configuration
    #[arg(short, long)]
    pub detailed: bool,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InspectArgs {
    #[arg(value_name = "CHECKPOINT")]
    pub checkpoint: PathBuf,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
