//! # Reference Processor
//!
//! Entry point of normalization. Runs LOAD, COMPONENTS and POLICY over the
//! root document and any additional top-level documents (each phase over all
//! of them before the next phase starts), then assembles the localized
//! entries into the root and strips the scan adornments.

use crate::content::{ContentId, ContentManager};
use crate::dialect::{Dialect, DialectMachine};
use crate::error::{NormalizeError, NormalizeResult};
use crate::loader::{parse_document, FileLoader, Loader};
use crate::options::Options;
use crate::reference::Reference;
use crate::scanner::ScanOp;
use crate::util::machine::StateId;
use crate::util::pointer::PathSegment;
use crate::util::tree::{insert_at, strip_adornments};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

/// Normalizes a multi-file API description into one document.
pub struct ReferenceProcessor {
    options: Options,
    loader: Box<dyn Loader>,
}

impl ReferenceProcessor {
    /// Creates a processor reading local files.
    pub fn new(options: Options) -> Self {
        Self::with_loader(options, Box::new(FileLoader))
    }

    /// Creates a processor with a custom document source.
    pub fn with_loader(options: Options, loader: Box<dyn Loader>) -> Self {
        Self { options, loader }
    }

    /// Loads and normalizes the document at `root`.
    ///
    /// # Errors
    ///
    /// [`NormalizeError::InvalidRoot`] when the root cannot be retrieved or
    /// parsed. Broken references elsewhere do not fail the run; they are
    /// left in the output as written.
    pub fn process(self, root: &Url) -> NormalizeResult<Value> {
        let text = self
            .loader
            .load(root)
            .map_err(|e| NormalizeError::InvalidRoot(root.to_string(), e))?;
        let tree =
            parse_document(&text).map_err(|e| NormalizeError::InvalidRoot(root.to_string(), e))?;
        self.process_document(root, tree)
    }

    /// Normalizes an already-parsed root document located at `root`.
    pub fn process_document(self, root: &Url, tree: Value) -> NormalizeResult<Value> {
        let dialect = match self.options.dialect.forced() {
            Some(dialect) => dialect,
            None => Dialect::detect(&tree).ok_or_else(|| {
                NormalizeError::InvalidRoot(
                    root.to_string(),
                    "neither a Swagger 2.0 nor an OpenAPI 3 document; set the dialect explicitly"
                        .to_string(),
                )
            })?,
        };
        info!(root = %root, dialect = %dialect, "Normalizing");
        for name in self.options.unknown_inline_names(dialect) {
            warn!(name = %name, dialect = %dialect, "Unknown component in inline list");
        }

        let machine: &'static DialectMachine = dialect.machine()?;
        let model = Some(machine.model());
        let additional = self.options.additional_files.clone();
        let mut manager = ContentManager::new(machine, self.options, self.loader);

        let mut tops = vec![manager.add_document(Reference::for_document(root), tree, model)?];
        for location in &additional {
            tops.push(load_additional(&mut manager, root, location, model)?);
        }

        for op in [ScanOp::Load, ScanOp::Components] {
            debug!(?op, documents = tops.len(), "Scanning");
            for id in &tops {
                manager.scan(*id, op)?;
            }
        }
        debug!(op = ?ScanOp::Policy, documents = tops.len(), "Scanning");
        let mut results = Vec::with_capacity(tops.len());
        for id in &tops {
            results.push(manager.scan(*id, ScanOp::Policy)?);
        }

        let mut output = results
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| NormalizeError::General("Root document vanished".to_string()))?;
        assemble(&manager, &mut output)?;
        strip_adornments(&mut output);
        Ok(output)
    }
}

fn load_additional(
    manager: &mut ContentManager,
    root: &Url,
    location: &str,
    start: Option<StateId>,
) -> NormalizeResult<ContentId> {
    let reference = Reference::resolve(location, Some(root), None).document_ref();
    let id = manager.load(&reference, start)?;
    match manager.content(id).invalid_reason() {
        Some(reason) => Err(NormalizeError::InvalidRoot(
            reference.to_string(),
            reason.to_string(),
        )),
        None => Ok(id),
    }
}

/// Writes every localized entry into its container in `output`.
///
/// Existing members of a container that were never localized (vendor
/// extensions, say) are kept.
fn assemble(manager: &ContentManager, output: &mut Value) -> NormalizeResult<()> {
    let localizer = manager.localizer();
    let mut containers: Vec<(Vec<PathSegment>, Map<String, Value>)> = Vec::new();
    for component in localizer.components() {
        for entry in localizer.localized_content(component) {
            let path: Vec<PathSegment> = entry
                .container
                .tokens()
                .iter()
                .map(|token| PathSegment::Key(token.clone()))
                .collect();
            let slot = match containers.iter().position(|(p, _)| *p == path) {
                Some(index) => index,
                None => {
                    let existing = entry
                        .container
                        .resolve(output)
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    containers.push((path, existing));
                    containers.len() - 1
                }
            };
            containers[slot].1.insert(entry.name.clone(), entry.node.clone());
        }
    }
    for (path, members) in containers {
        insert_at(output, &path, Value::Object(members))?;
    }
    Ok(())
}
