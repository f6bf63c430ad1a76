use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keyrotator_config::{ContextOverride, LoggingConfig, StackConfig, StdEnvSource};
use keyrotator_infra::{check, synth, wizard};
use std::path::{Path, PathBuf};
use tracing::debug;

/// CloudFormation synthesis for the scheduled IAM access key rotator
#[derive(Parser)]
#[command(name = "keyrotator-infra")]
#[command(version)]
#[command(about = "Synthesize the access key rotator stack", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Context value (e.g. -c iamUser=GithubIAMUser); may be repeated
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE", global = true)]
    context: Vec<ContextOverride>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the template, asset manifest and staged assets (default)
    Synth(synth::SynthArgs),
    /// Build the stack in memory and print a summary
    Check,
    /// Create keyrotator.toml interactively
    Init(wizard::InitArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Some(Commands::Init(args)) => {
            let mut logging = LoggingConfig::default();
            if let Some(level) = log_level {
                logging.level = level.to_string();
            }
            keyrotator_infra::init_tracing(&logging);
            wizard::run(args)
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref(), &cli.context, log_level)?;
            check::run(&config)
        }
        Some(Commands::Synth(args)) => {
            let config = load_config(cli.config.as_deref(), &cli.context, log_level)?;
            synth::run(&config, args)
        }
        None => {
            let config = load_config(cli.config.as_deref(), &cli.context, log_level)?;
            synth::run(
                &config,
                synth::SynthArgs {
                    output: PathBuf::from(synth::DEFAULT_OUTPUT),
                    stdout: false,
                },
            )
        }
    }
}

/// Resolve configuration layers, start logging, then validate so warnings
/// reach the subscriber.
fn load_config(
    path: Option<&Path>,
    context: &[ContextOverride],
    log_level: Option<&str>,
) -> Result<StackConfig> {
    let mut config = StackConfig::load_layers(path, &StdEnvSource, context).with_context(|| {
        match path {
            Some(path) => format!("Failed to load config from {}", path.display()),
            None => "Failed to load configuration".to_string(),
        }
    })?;

    // CLI flag wins over file and environment
    if let Some(level) = log_level {
        config.logging.level = level.to_string();
    }

    keyrotator_infra::init_tracing(&config.logging);
    config.validate().context("Invalid configuration")?;
    debug!(stack = %config.stack_name, "Resolved configuration");
    Ok(config)
}
