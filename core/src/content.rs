//! # Content Manager
//!
//! Loads, caches and stores the JSON trees that references point at.
//!
//! Every [`Reference`] maps to exactly one [`Content`]. Whole documents own
//! their tree; subtree contents are views into a cached document, so a
//! change stored through one is seen by every other content of that
//! document. Failures are cached too: an unreachable reference yields an
//! invalid content carrying the reason.

use crate::dialect::DialectMachine;
use crate::error::{NormalizeError, NormalizeResult};
use crate::loader::{parse_document, Loader};
use crate::localizer::Localizer;
use crate::options::Options;
use crate::reference::{Reference, ReferenceError};
use crate::scanner::{ReferenceScanner, ScanOp};
use crate::util::cycle::CycleDetector;
use crate::util::machine::StateId;
use crate::util::walker::JsonStateWalker;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Handle to a cached [`Content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentId(usize);

/// Where a content's tree lives.
#[derive(Debug, Clone, PartialEq)]
enum Body {
    Document(Value),
    Subtree(ContentId),
    Invalid,
}

/// A loaded (or failed) reference target.
#[derive(Debug, Clone)]
pub struct Content {
    reference: Reference,
    body: Body,
    start: Option<StateId>,
}

impl Content {
    /// The reference this content was loaded for.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Whether the target was retrieved.
    pub fn is_valid(&self) -> bool {
        !matches!(self.body, Body::Invalid)
    }

    /// Why the target could not be retrieved.
    pub fn invalid_reason(&self) -> Option<&ReferenceError> {
        self.reference.error()
    }

    /// State the content was first reached at; `None` is off-road.
    pub fn start_state(&self) -> Option<StateId> {
        self.start
    }
}

/// Cache of contents plus the shared state of one normalization run.
pub struct ContentManager {
    dialect: &'static DialectMachine,
    options: Options,
    loader: Box<dyn Loader>,
    contents: Vec<Content>,
    cache: HashMap<Reference, ContentId>,
    pub(crate) localizer: Localizer,
    pub(crate) resolving: CycleDetector<Reference>,
    pub(crate) finalized: HashSet<Reference>,
}

impl ContentManager {
    /// Creates an empty manager.
    ///
    /// # Arguments
    ///
    /// * `dialect` - Tables used to classify reference sites.
    /// * `options` - Normalization policy.
    /// * `loader` - Document retrieval.
    pub fn new(dialect: &'static DialectMachine, options: Options, loader: Box<dyn Loader>) -> Self {
        Self {
            dialect,
            options,
            loader,
            contents: Vec::new(),
            cache: HashMap::new(),
            localizer: Localizer::new(),
            resolving: CycleDetector::default(),
            finalized: HashSet::new(),
        }
    }

    /// The dialect tables in use.
    pub fn dialect(&self) -> &'static DialectMachine {
        self.dialect
    }

    /// The normalization policy.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Registry of hoisted content.
    pub fn localizer(&self) -> &Localizer {
        &self.localizer
    }

    /// Content for a handle.
    pub fn content(&self, id: ContentId) -> &Content {
        &self.contents[id.0]
    }

    /// Cached content for `reference`, if loaded.
    pub fn get(&self, reference: &Reference) -> Option<ContentId> {
        self.cache.get(reference).copied()
    }

    /// Registers an already-parsed document.
    pub fn add_document(
        &mut self,
        reference: Reference,
        tree: Value,
        start: Option<StateId>,
    ) -> NormalizeResult<ContentId> {
        self.create(reference.document_ref(), Body::Document(tree), start)
    }

    /// Content for `reference`, loading its document on first use.
    ///
    /// Never fails for unreachable targets; those produce an invalid
    /// content. Errors are internal inconsistencies only.
    ///
    /// # Arguments
    ///
    /// * `reference` - What to load.
    /// * `start` - State of the site the reference was found at.
    pub fn load(&mut self, reference: &Reference, start: Option<StateId>) -> NormalizeResult<ContentId> {
        if let Some(id) = self.get(reference) {
            return Ok(id);
        }
        if !reference.is_valid() {
            return self.create(reference.clone(), Body::Invalid, start);
        }

        let doc_ref = reference.document_ref();
        let doc_id = match self.get(&doc_ref) {
            Some(id) => id,
            None => self.fetch(doc_ref, start)?,
        };
        if reference.is_document() {
            return Ok(doc_id);
        }

        let document = self.content(doc_id);
        if let Some(error) = document.invalid_reason() {
            let mut failed = reference.clone();
            failed.mark_invalid(error.clone());
            return self.create(failed, Body::Invalid, start);
        }
        let found = self
            .tree(doc_id)
            .is_some_and(|tree| reference.pointer().resolve(tree).is_some());
        if found {
            self.create(reference.clone(), Body::Subtree(doc_id), start)
        } else {
            debug!(reference = %reference, "Pointer addresses nothing");
            let mut failed = reference.clone();
            failed.mark_invalid(ReferenceError::MissingTarget);
            self.create(failed, Body::Invalid, start)
        }
    }

    fn fetch(&mut self, mut doc_ref: Reference, start: Option<StateId>) -> NormalizeResult<ContentId> {
        let Some(url) = doc_ref.url().cloned() else {
            doc_ref.mark_invalid(ReferenceError::MalformedUrl(doc_ref.url_string().to_string()));
            return self.create(doc_ref, Body::Invalid, start);
        };
        debug!(url = %url, "Loading document");
        let parsed = self
            .loader
            .load(&url)
            .map_err(ReferenceError::Fetch)
            .and_then(|text| {
                parse_document(&text)
                    .map_err(|e| ReferenceError::Parse(e.lines().next().unwrap_or_default().to_string()))
            });
        match parsed {
            Ok(tree) => self.create(doc_ref, Body::Document(tree), start),
            Err(error) => {
                warn!(url = %url, error = %error, "Unable to load document");
                doc_ref.mark_invalid(error);
                self.create(doc_ref, Body::Invalid, start)
            }
        }
    }

    fn create(&mut self, reference: Reference, body: Body, start: Option<StateId>) -> NormalizeResult<ContentId> {
        if self.cache.contains_key(&reference) {
            return Err(NormalizeError::DuplicateContent(reference.to_string()));
        }
        let id = ContentId(self.contents.len());
        self.cache.insert(reference.clone(), id);
        self.contents.push(Content {
            reference,
            body,
            start,
        });
        Ok(id)
    }

    /// The content's tree; `None` for invalid content.
    pub fn tree(&self, id: ContentId) -> Option<&Value> {
        let content = self.content(id);
        match &content.body {
            Body::Document(tree) => Some(tree),
            Body::Subtree(doc) => content.reference.pointer().resolve(self.tree(*doc)?),
            Body::Invalid => None,
        }
    }

    /// Stores `tree` as the content's tree.
    ///
    /// For a subtree the value is written into the owning document.
    pub fn store(&mut self, id: ContentId, tree: Value) -> NormalizeResult<()> {
        let ContentId(index) = id;
        match self.contents[index].body {
            Body::Document(_) => {
                self.contents[index].body = Body::Document(tree);
                Ok(())
            }
            Body::Subtree(ContentId(doc)) => {
                let pointer = self.contents[index].reference.pointer().clone();
                let slot = match &mut self.contents[doc].body {
                    Body::Document(root) => pointer.resolve_mut(root),
                    _ => None,
                };
                match slot {
                    Some(slot) => {
                        *slot = tree;
                        Ok(())
                    }
                    None => Err(NormalizeError::General(format!(
                        "Subtree {} vanished from its document",
                        self.contents[index].reference
                    ))),
                }
            }
            Body::Invalid => Err(NormalizeError::General(format!(
                "Cannot store into invalid content {}",
                self.contents[index].reference
            ))),
        }
    }

    /// Scans a copy of the content's tree from its recorded start state.
    ///
    /// See [`ContentManager::scan_from`].
    pub fn scan(&mut self, id: ContentId, op: ScanOp) -> NormalizeResult<Option<Value>> {
        let start = self.content(id).start;
        self.scan_from(id, op, start)
    }

    /// Scans a copy of the content's tree starting at `start`.
    ///
    /// Returns the scanned tree, or `None` for invalid content. LOAD results
    /// are also stored back, so later loads of the same target see them.
    pub fn scan_from(
        &mut self,
        id: ContentId,
        op: ScanOp,
        start: Option<StateId>,
    ) -> NormalizeResult<Option<Value>> {
        let Some(mut tree) = self.tree(id).cloned() else {
            return Ok(None);
        };
        let base = self.content(id).reference.clone();
        let dialect: &'static DialectMachine = self.dialect;
        let walker = JsonStateWalker::new(dialect.machine(), start).visit_anonymous(false);
        walker.walk(&mut tree, &mut ReferenceScanner::new(self, op, base))?;
        if op == ScanOp::Load {
            self.store(id, tree.clone())?;
        }
        Ok(Some(tree))
    }

    /// LOAD followed by POLICY; the normalized form of the content.
    pub fn rescan(&mut self, id: ContentId, start: Option<StateId>) -> NormalizeResult<Option<Value>> {
        self.scan_from(id, ScanOp::Load, start)?;
        self.scan_from(id, ScanOp::Policy, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::loader::MemoryLoader;
    use crate::util::pointer::JsonPointer;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use url::Url;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn manager(loader: MemoryLoader) -> ContentManager {
        let dialect = Dialect::Swagger2.machine().unwrap();
        ContentManager::new(dialect, Options::default(), Box::new(loader))
    }

    #[test]
    fn test_subtree_shares_document() {
        let base = url("mem://specs/main.yaml");
        let loader = MemoryLoader::new().with(&base, "definitions:\n  Pet:\n    type: object\n");
        let mut mgr = manager(loader);

        let pet = Reference::resolve("#/definitions/Pet", Some(&base), None);
        let id = mgr.load(&pet, None).unwrap();
        assert!(mgr.content(id).is_valid());
        assert_eq!(mgr.tree(id), Some(&json!({"type": "object"})));
        assert_eq!(mgr.load(&pet, None).unwrap(), id);

        mgr.store(id, json!({"type": "string"})).unwrap();
        let doc = mgr.get(&Reference::for_document(&base)).unwrap();
        assert_eq!(
            mgr.tree(doc),
            Some(&json!({"definitions": {"Pet": {"type": "string"}}}))
        );
    }

    #[test]
    fn test_failures_are_cached() {
        let base = url("mem://specs/main.yaml");
        let loader = MemoryLoader::new()
            .with(&base, "a: 1")
            .with(&url("mem://specs/broken.yaml"), "a: [unclosed")
            .with(&url("mem://specs/broken.json"), "{\"a\": [1,");
        let mut mgr = manager(loader);

        let missing = Reference::resolve("#/nope", Some(&base), None);
        let id = mgr.load(&missing, None).unwrap();
        assert_eq!(mgr.content(id).invalid_reason(), Some(&ReferenceError::MissingTarget));
        assert_eq!(mgr.tree(id), None);

        let gone = Reference::resolve("absent.yaml#/a", Some(&base), None);
        let id = mgr.load(&gone, None).unwrap();
        assert!(matches!(
            mgr.content(id).invalid_reason(),
            Some(ReferenceError::Fetch(_))
        ));
        let doc = mgr.get(&gone.document_ref()).unwrap();
        assert!(!mgr.content(doc).is_valid());

        let broken = Reference::resolve("broken.yaml", Some(&base), None);
        let id = mgr.load(&broken, None).unwrap();
        assert!(matches!(
            mgr.content(id).invalid_reason(),
            Some(ReferenceError::Parse(_))
        ));

        let broken = Reference::resolve("broken.json", Some(&base), None);
        let id = mgr.load(&broken, None).unwrap();
        let reason = mgr.content(id).invalid_reason().unwrap().to_string();
        assert!(
            reason.starts_with("Document could not be parsed: invalid JSON: "),
            "{}",
            reason
        );
    }

    #[test]
    fn test_duplicate_content() {
        let base = url("mem://specs/main.yaml");
        let mut mgr = manager(MemoryLoader::new());
        let doc = Reference::for_document(&base);
        mgr.add_document(doc.clone(), json!({}), None).unwrap();
        let err = mgr.add_document(doc, json!({}), None).unwrap_err();
        assert!(matches!(err, NormalizeError::DuplicateContent(_)));
    }

    #[test]
    fn test_load_scan_inlines_nonconforming_refs() {
        let base = url("mem://specs/main.yaml");
        let loader = MemoryLoader::new()
            .with(&base, "info:\n  $ref: info.yaml\n")
            .with(&url("mem://specs/info.yaml"), "title: Pets\nversion: '1'\n");
        let mut mgr = manager(loader);
        let model = mgr.dialect().model();
        let root = mgr.load(&Reference::for_document(&base), Some(model)).unwrap();
        let scanned = mgr.scan(root, ScanOp::Load).unwrap().unwrap();
        assert_eq!(scanned, json!({"info": {"title": "Pets", "version": "1"}}));
        assert_eq!(mgr.tree(root), Some(&scanned));
        assert_eq!(
            JsonPointer::parse("/info/title").unwrap().resolve(&scanned),
            Some(&json!("Pets"))
        );
    }
}
