//! # Options
//!
//! Normalization policy, loadable from a YAML or JSON configuration file:
//!
//! ```yaml
//! dialect: v2          # auto | v2 | v3
//! inline: [SCHEMA]     # component names, or ALL
//! additional_files:
//!   - common/paths.yaml
//! rewrite_simple_refs: true
//! ```
//!
//! By default every conforming reference is localized.

use crate::dialect::{Component, Dialect};
use crate::error::{NormalizeError, NormalizeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which dialect tables to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectChoice {
    /// Detect from the root document.
    #[default]
    Auto,
    /// Swagger 2.0.
    V2,
    /// OpenAPI 3.x.
    V3,
}

impl DialectChoice {
    /// The forced dialect, if any.
    pub fn forced(self) -> Option<Dialect> {
        match self {
            DialectChoice::Auto => None,
            DialectChoice::V2 => Some(Dialect::Swagger2),
            DialectChoice::V3 => Some(Dialect::OpenApi3),
        }
    }
}

/// Marker in [`Options::inline`] that inlines every component kind.
pub const INLINE_ALL: &str = "ALL";

/// Normalization options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Dialect selection.
    pub dialect: DialectChoice,
    /// Component kinds whose references are inlined instead of localized.
    pub inline: Vec<String>,
    /// Extra top-level documents whose definitions join the result.
    /// Resolved against the root document's location.
    pub additional_files: Vec<String>,
    /// Treat `#Name` as `#<container>/Name`.
    pub rewrite_simple_refs: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dialect: DialectChoice::Auto,
            inline: Vec::new(),
            additional_files: Vec::new(),
            rewrite_simple_refs: true,
        }
    }
}

impl Options {
    /// Loads options from a YAML or JSON file.
    pub fn from_file(path: &Path) -> NormalizeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content).map_err(|e| {
            NormalizeError::Config(format!("{}: {}", path.display(), e))
        })
    }

    /// Parses options from YAML (or JSON) text.
    pub fn from_yaml_str(content: &str) -> NormalizeResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| NormalizeError::Config(e.to_string()))
    }

    /// Whether references to `component` are inlined.
    pub fn inlines(&self, component: Component) -> bool {
        self.inline.iter().any(|name| {
            name.eq_ignore_ascii_case(INLINE_ALL) || name.eq_ignore_ascii_case(component.name())
        })
    }

    /// Inline names that match no component of `dialect`.
    pub fn unknown_inline_names(&self, dialect: Dialect) -> Vec<&str> {
        self.inline
            .iter()
            .map(String::as_str)
            .filter(|name| !name.eq_ignore_ascii_case(INLINE_ALL) && dialect.component(name).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert!(opts.rewrite_simple_refs);
        assert_eq!(opts.dialect, DialectChoice::Auto);
        let schema = Dialect::Swagger2.component("SCHEMA").unwrap();
        assert!(!opts.inlines(schema));
    }

    #[test]
    fn test_from_yaml_partial() {
        let opts = Options::from_yaml_str("dialect: v3\ninline: [schema]\n").unwrap();
        assert_eq!(opts.dialect, DialectChoice::V3);
        assert!(opts.rewrite_simple_refs);
        let schema = Dialect::OpenApi3.component("SCHEMA").unwrap();
        let header = Dialect::OpenApi3.component("HEADER").unwrap();
        assert!(opts.inlines(schema));
        assert!(!opts.inlines(header));
    }

    #[test]
    fn test_inline_all() {
        let opts = Options {
            inline: vec!["all".into()],
            ..Options::default()
        };
        assert!(Dialect::Swagger2.components().all(|c| opts.inlines(c)));
        assert!(opts.unknown_inline_names(Dialect::Swagger2).is_empty());
    }

    #[test]
    fn test_unknown_inline_names() {
        let opts = Options {
            inline: vec!["SCHEMA".into(), "REQUEST_BODY".into()],
            ..Options::default()
        };
        assert_eq!(opts.unknown_inline_names(Dialect::Swagger2), vec!["REQUEST_BODY"]);
        assert!(opts.unknown_inline_names(Dialect::OpenApi3).is_empty());
    }

    #[test]
    fn test_from_file_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rewrite_simple_refs": false, "additional_files": ["a.yaml"]}}"#).unwrap();
        let opts = Options::from_file(file.path()).unwrap();
        assert!(!opts.rewrite_simple_refs);
        assert_eq!(opts.additional_files, vec!["a.yaml".to_string()]);
    }

    #[test]
    fn test_bad_config() {
        let err = Options::from_yaml_str("dialect: v9").unwrap_err();
        assert!(matches!(err, NormalizeError::Config(_)));
    }
}
