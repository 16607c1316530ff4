//! Document source used by the CLI: local files always, HTTP(S) when built
//! with the `client` feature.

use refnorm_core::{FileLoader, Loader};
use tracing::debug;
use url::Url;

/// Routes loads by URL scheme.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliLoader;

impl Loader for CliLoader {
    fn load(&self, url: &Url) -> Result<String, String> {
        match url.scheme() {
            "http" | "https" => fetch(url),
            _ => FileLoader.load(url),
        }
    }
}

#[cfg(feature = "client")]
fn fetch(url: &Url) -> Result<String, String> {
    debug!(url = %url, "GET");
    let mut response = ureq::get(url.as_str())
        .call()
        .map_err(|e| format!("{}: {}", url, e))?;
    response
        .body_mut()
        .read_to_string()
        .map_err(|e| format!("{}: {}", url, e))
}

#[cfg(not(feature = "client"))]
fn fetch(url: &Url) -> Result<String, String> {
    debug!(url = %url, "HTTP support not compiled in");
    Err(format!("HTTP support is disabled (build with the `client` feature): {}", url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_reads_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.yaml");
        fs::write(&path, "a: 1").unwrap();
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(CliLoader.load(&url).unwrap(), "a: 1");
        assert!(CliLoader.load(&Url::parse("ftp://example.com/a.yaml").unwrap()).is_err());
    }
}
