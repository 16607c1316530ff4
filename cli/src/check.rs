//! # Check Command
//!
//! Normalizes in memory and lists every `$ref` that still does not resolve
//! inside the result.

use refnorm_core::find_unresolved;
use tracing::warn;

use crate::error::{CliError, CliResult};
use crate::normalize::SourceArgs;

/// Arguments for the check command.
#[derive(clap::Args, Debug, Clone)]
pub struct CheckArgs {
    /// Input and options.
    #[clap(flatten)]
    pub source: SourceArgs,
}

/// Executes the check command. Fails when any reference is left unresolved.
pub fn execute(args: &CheckArgs) -> CliResult<()> {
    let document = args.source.normalize()?;
    let unresolved = find_unresolved(&document);
    for (location, target) in &unresolved {
        warn!(location = %location, target = %target, "Unresolved reference");
        println!("{}\t{}", location, target);
    }
    if unresolved.is_empty() {
        println!("All references resolve");
        Ok(())
    } else {
        Err(CliError::Unresolved(unresolved.len()))
    }
}
