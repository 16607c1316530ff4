#![deny(missing_docs)]

//! # CLI Errors
//!
//! Error types for the CLI crate.

use derive_more::{Display, From};
use refnorm_core::NormalizeError;

/// Main error enum for CLI operations.
#[derive(Debug, Display, From)]
pub enum CliError {
    /// IO Error wrapper.
    #[display("IO Error: {}", _0)]
    Io(std::io::Error),

    /// Normalization failure.
    #[display("{}", _0)]
    Normalize(NormalizeError),

    /// `check` found references that do not resolve inside the result.
    #[from(ignore)]
    #[display("{} unresolved reference(s)", _0)]
    Unresolved(usize),

    /// General failure message.
    #[display("Operation failed: {}", _0)]
    General(String),
}

impl std::error::Error for CliError {}

/// Result type alias.
pub type CliResult<T> = Result<T, CliError>;
