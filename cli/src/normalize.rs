#![deny(missing_docs)]

//! # Normalize Command
//!
//! Reads a root document, normalizes it and writes the single-file result.

use std::fs;
use std::path::PathBuf;

use clap::ValueEnum;
use refnorm_core::{DialectChoice, Options, ReferenceProcessor};
use serde_json::Value;
use tracing::info;
use url::Url;

use crate::error::{CliError, CliResult};
use crate::loader::CliLoader;

/// Dialect selection on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectArg {
    /// Detect from the root document.
    Auto,
    /// Swagger 2.0.
    V2,
    /// OpenAPI 3.x.
    V3,
}

impl From<DialectArg> for DialectChoice {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Auto => DialectChoice::Auto,
            DialectArg::V2 => DialectChoice::V2,
            DialectArg::V3 => DialectChoice::V3,
        }
    }
}

/// Output encoding.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

/// Input document and normalization options shared by every command.
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Root document: a file path or an http(s)/file URL.
    pub input: String,

    /// Options file (YAML or JSON). Flags below override its values.
    #[clap(long, env = "REFNORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Dialect of the root document.
    #[clap(long, value_enum)]
    pub dialect: Option<DialectArg>,

    /// Component kind to inline instead of localize (repeatable).
    #[clap(long = "inline", value_name = "COMPONENT")]
    pub inline: Vec<String>,

    /// Inline every component kind.
    #[clap(long)]
    pub inline_all: bool,

    /// Extra top-level document whose definitions join the result (repeatable).
    #[clap(long = "additional", value_name = "FILE")]
    pub additional: Vec<String>,

    /// Do not expand `#Name` into `#/<container>/Name`.
    #[clap(long)]
    pub no_simple_refs: bool,
}

impl SourceArgs {
    /// Options from the config file with command-line overrides applied.
    pub fn options(&self) -> CliResult<Options> {
        let mut options = match &self.config {
            Some(path) => Options::from_file(path)?,
            None => Options::default(),
        };
        if let Some(dialect) = self.dialect {
            options.dialect = dialect.into();
        }
        options.inline.extend(self.inline.iter().cloned());
        if self.inline_all {
            options.inline.push(refnorm_core::options::INLINE_ALL.to_string());
        }
        options.additional_files.extend(self.additional.iter().cloned());
        if self.no_simple_refs {
            options.rewrite_simple_refs = false;
        }
        Ok(options)
    }

    /// The input as a URL; bare paths are made absolute first.
    pub fn root_url(&self) -> CliResult<Url> {
        if let Ok(url) = Url::parse(&self.input) {
            // a single letter is a Windows drive, not a scheme
            if url.scheme().len() > 1 {
                return Ok(url);
            }
        }
        let path = fs::canonicalize(&self.input)
            .map_err(|e| CliError::General(format!("Cannot open {}: {}", self.input, e)))?;
        Url::from_file_path(&path)
            .map_err(|_| CliError::General(format!("Not a usable file path: {}", path.display())))
    }

    /// Runs the normalizer.
    pub fn normalize(&self) -> CliResult<Value> {
        let root = self.root_url()?;
        let options = self.options()?;
        let processor = ReferenceProcessor::with_loader(options, Box::new(CliLoader));
        Ok(processor.process(&root)?)
    }
}

/// Arguments for the normalize command.
#[derive(clap::Args, Debug, Clone)]
pub struct NormalizeArgs {
    /// Input and options.
    #[clap(flatten)]
    pub source: SourceArgs,

    /// Output encoding.
    #[clap(long, value_enum, default_value = "json")]
    pub format: Format,

    /// Output file; standard output when omitted.
    #[clap(short, long)]
    pub output: Option<PathBuf>,
}

/// Serializes a normalized document.
pub fn render(document: &Value, format: Format) -> CliResult<String> {
    match format {
        Format::Json => serde_json::to_string_pretty(document)
            .map(|mut text| {
                text.push('\n');
                text
            })
            .map_err(|e| CliError::General(format!("Failed to serialize JSON: {}", e))),
        Format::Yaml => serde_yaml::to_string(document)
            .map_err(|e| CliError::General(format!("Failed to serialize YAML: {}", e))),
    }
}

/// Executes the normalize command.
///
/// # Arguments
///
/// * `args` - Command arguments.
pub fn execute(args: &NormalizeArgs) -> CliResult<()> {
    let document = args.source.normalize()?;
    let text = render(&document, args.format)?;
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, text)?;
            info!(output = %path.display(), "Wrote normalized document");
        }
        None => print!("{}", text),
    }
    Ok(())
}
