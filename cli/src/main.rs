#![deny(missing_docs)]

//! # Refnorm CLI
//!
//! Command line front-end for the `$ref` normalizer.
//!
//! Supported Commands:
//! - `normalize`: Merge a multi-file Swagger / OpenAPI description into one document.
//! - `check`: Report references that would remain unresolved.

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::error::CliResult;

mod check;
mod error;
mod loader;
mod normalize;

#[derive(Parser, Debug)]
#[clap(author, version, about = "OpenAPI $ref normalizer")]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Normalize a description into a single self-contained document.
    Normalize(normalize::NormalizeArgs),
    /// List references that do not resolve after normalization.
    Check(check::CheckArgs),
}

fn log_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_tracing(verbose: u8) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(log_filter(verbose));

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Normalize(args) => normalize::execute(args)?,
        Commands::Check(args) => check::execute(args)?,
    }

    Ok(())
}
