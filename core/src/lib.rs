#![deny(missing_docs)]

//! # Refnorm Core
//!
//! Normalizes multi-file Swagger 2.0 / OpenAPI 3 descriptions into a single
//! document whose `$ref`s all point inside it.
//!
//! ```no_run
//! use refnorm_core::{Options, ReferenceProcessor};
//! use url::Url;
//!
//! let root = Url::parse("file:///specs/api.yaml").unwrap();
//! let normalized = ReferenceProcessor::new(Options::default()).process(&root).unwrap();
//! println!("{}", serde_json::to_string_pretty(&normalized).unwrap());
//! ```

/// Shared error types.
pub mod error;

/// Generic tree and state-machine utilities.
pub mod util;

/// Dialect tables (Swagger 2.0, OpenAPI 3).
pub mod dialect;

/// Resolved `$ref` values.
pub mod reference;

/// Normalization options.
pub mod options;

/// Document retrieval and parsing.
pub mod loader;

/// Loaded reference targets.
pub mod content;

/// Hoisting of content into canonical containers.
pub mod localizer;

/// Scan phases.
pub mod scanner;

/// Normalization entry point.
pub mod processor;

pub use dialect::{Component, Dialect};
pub use error::{NormalizeError, NormalizeResult};
pub use loader::{FileLoader, Loader, MemoryLoader};
pub use options::{DialectChoice, Options};
pub use processor::ReferenceProcessor;
pub use reference::{Reference, ReferenceError};
pub use util::tree::find_unresolved;
