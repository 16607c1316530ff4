//! # Error Handling
//!
//! Provides the `NormalizeError` enum for failures that abort normalization.
//!
//! Problems with an individual `$ref` (bad URL, unreachable file, missing
//! pointer target) are *not* represented here: they are recorded on the
//! [`Reference`](crate::reference::Reference) itself and surface in the output.

use derive_more::{Display, From};

/// Fatal normalization errors.
///
/// Note: String errors default to `General`.
#[derive(Debug, Display, From)]
pub enum NormalizeError {
    /// Wrapper for standard IO errors.
    #[display("IO Error: {_0}")]
    Io(std::io::Error),

    /// Two contents were registered for the same reference.
    #[from(ignore)]
    #[display("Content already loaded for reference: {_0}")]
    DuplicateContent(String),

    /// A merge was requested for a reference that was never localized.
    #[from(ignore)]
    #[display("Cannot merge into unlocalized reference: {_0}")]
    MergeBeforeLocalize(String),

    /// A transit re-declared an existing label path with a different target.
    #[from(ignore)]
    #[display("Conflicting transit: {_0}")]
    TransitConflict(String),

    /// An edge label that could not be compiled.
    #[from(ignore)]
    #[display("Invalid edge label '{_0}': {_1}")]
    InvalidLabel(String, String),

    /// A state id that the builder never issued.
    #[from(ignore)]
    #[display("Unknown state {_0}")]
    UnknownState(usize),

    /// The tracker was asked to back up more moves than it has made.
    #[display("Can't back up past initial state")]
    BackupUnderflow,

    /// The top-level document could not be loaded.
    #[from(ignore)]
    #[display("Invalid root document {_0}: {_1}")]
    InvalidRoot(String, String),

    /// Options or configuration file problems.
    #[from(ignore)]
    #[display("Configuration Error: {_0}")]
    Config(String),

    /// Generic errors.
    #[display("General Error: {_0}")]
    General(String),
}

/// Manual implementation of the standard Error trait.
impl std::error::Error for NormalizeError {}

/// Helper type alias for Result using NormalizeError.
pub type NormalizeResult<T> = Result<T, NormalizeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_conversion() {
        let io_err = Error::new(ErrorKind::Other, "test");
        let err: NormalizeError = io_err.into();
        assert!(matches!(err, NormalizeError::Io(_)));
    }

    #[test]
    fn test_string_conversion() {
        let msg = String::from("something wrong");
        let err: NormalizeError = msg.into();
        match err {
            NormalizeError::General(s) => assert_eq!(s, "something wrong"),
            _ => panic!("String should convert to NormalizeError::General"),
        }
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            NormalizeError::BackupUnderflow.to_string(),
            "Can't back up past initial state"
        );
        let err = NormalizeError::InvalidLabel("re: (".into(), "unclosed group".into());
        assert_eq!(err.to_string(), "Invalid edge label 're: (': unclosed group");
    }
}
