//! # Document Loading
//!
//! Retrieval of document text by URL and parsing into JSON trees.
//!
//! - [`FileLoader`] reads `file:` URLs from disk.
//! - [`MemoryLoader`] serves documents registered in memory.
//!
//! Other transports (HTTP) implement [`Loader`] outside the core.

use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// Retrieves document text.
pub trait Loader {
    /// Returns the text at `url`, or a description of the failure.
    fn load(&self, url: &Url) -> Result<String, String>;
}

impl<L: Loader + ?Sized> Loader for Box<L> {
    fn load(&self, url: &Url) -> Result<String, String> {
        (**self).load(url)
    }
}

/// Reads `file:` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl Loader for FileLoader {
    fn load(&self, url: &Url) -> Result<String, String> {
        if url.scheme() != "file" {
            return Err(format!("Unsupported URL scheme '{}' for {}", url.scheme(), url));
        }
        let path = url
            .to_file_path()
            .map_err(|_| format!("Not a local file path: {}", url))?;
        debug!(path = %path.display(), "Reading document");
        std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path.display(), e))
    }
}

/// Serves documents from memory, keyed by URL (fragment ignored).
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    docs: HashMap<String, String>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `text` under `url`.
    pub fn insert(&mut self, url: &Url, text: impl Into<String>) {
        self.docs.insert(key(url), text.into());
    }

    /// Builder form of [`MemoryLoader::insert`].
    pub fn with(mut self, url: &Url, text: impl Into<String>) -> Self {
        self.insert(url, text);
        self
    }
}

impl Loader for MemoryLoader {
    fn load(&self, url: &Url) -> Result<String, String> {
        self.docs
            .get(&key(url))
            .cloned()
            .ok_or_else(|| format!("No document registered for {}", url))
    }
}

fn key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Parses document text: JSON when the trimmed text starts with `{`,
/// YAML otherwise.
pub fn parse_document(text: &str) -> Result<Value, String> {
    let value = if text.trim_start().starts_with('{') {
        serde_json::from_str(text).map_err(|e| format!("invalid JSON: {}", e))?
    } else {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| format!("invalid YAML: {}", e))?;
        yaml_to_json(yaml)?
    };
    if value.is_null() {
        return Err("document is empty".to_string());
    }
    Ok(value)
}

/// Converts a YAML tree to JSON.
///
/// Scalar mapping keys become strings (`200:` turns into `"200"`); tags are
/// dropped.
pub fn yaml_to_json(yaml: serde_yaml::Value) -> Result<Value, String> {
    use serde_yaml::Value as Yaml;
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("Unsupported number: {}", n))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (k, v) in mapping {
                map.insert(mapping_key(k)?, yaml_to_json(v)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn mapping_key(key: serde_yaml::Value) -> Result<String, String> {
    use serde_yaml::Value as Yaml;
    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        Yaml::Tagged(tagged) => mapping_key(tagged.value),
        other => Err(format!("Unsupported mapping key: {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_json_and_yaml() {
        assert_eq!(parse_document(r#"  {"a": [1, 2]}"#).unwrap(), json!({"a": [1, 2]}));
        let yaml = "responses:\n  200:\n    description: ok\n  true: x\nratio: 0.5\n";
        assert_eq!(
            parse_document(yaml).unwrap(),
            json!({"responses": {"200": {"description": "ok"}, "true": "x"}, "ratio": 0.5})
        );
    }

    #[test]
    fn test_parse_failures() {
        assert!(parse_document("{ not json").unwrap_err().starts_with("invalid JSON: "));
        assert!(parse_document("a: [unclosed").unwrap_err().starts_with("invalid YAML: "));
        assert!(parse_document("").is_err());
    }

    #[test]
    fn test_yaml_preserves_order() {
        let value = parse_document("z: 1\na: 2\nm: 3\n").unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_memory_loader() {
        let url = Url::parse("mem://specs/a.yaml").unwrap();
        let loader = MemoryLoader::new().with(&url, "a: 1");
        let with_fragment = Url::parse("mem://specs/a.yaml#/a").unwrap();
        assert_eq!(loader.load(&with_fragment).unwrap(), "a: 1");
        assert!(loader.load(&Url::parse("mem://specs/b.yaml").unwrap()).is_err());
    }

    #[test]
    fn test_file_loader() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "swagger: '2.0'").unwrap();
        let url = Url::from_file_path(file.path()).unwrap();
        assert_eq!(FileLoader.load(&url).unwrap(), "swagger: '2.0'");
        let http = Url::parse("http://example.com/a.yaml").unwrap();
        assert!(FileLoader.load(&http).unwrap_err().contains("Unsupported URL scheme"));
    }
}
