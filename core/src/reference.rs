#![deny(missing_docs)]

//! # References
//!
//! A [`Reference`] is a `$ref` string resolved against the URL of the
//! document it appears in. Its identity is the absolute document URL plus
//! the normalized fragment, so `/specs/a.yaml#/definitions/X` and
//! `./a.yaml#/definitions/X` seen from `/specs/main.yaml` are the same
//! reference.
//!
//! Problems with a reference never abort normalization. They are recorded as
//! a [`ReferenceError`] (the first one wins) and the reference is then
//! classified as [`Treatment::Error`].

use crate::dialect::Component;
use crate::options::Options;
use crate::util::pointer::JsonPointer;
use crate::util::tree::{ref_string, ADORNMENT_KEY, REF_KEY};
use derive_more::Display;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use url::Url;

/// Why a reference could not be resolved.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// The URL part could not be parsed or resolved.
    #[display("Malformed URL: {_0}")]
    MalformedUrl(String),

    /// The fragment is not a JSON Pointer.
    #[display("Invalid JSON Pointer: {_0}")]
    BadPointer(String),

    /// The document could not be retrieved.
    #[display("Failed to retrieve document: {_0}")]
    Fetch(String),

    /// The document is neither JSON nor YAML.
    #[display("Document could not be parsed: {_0}")]
    Parse(String),

    /// The pointer addresses nothing.
    #[display("No JSON value at specified pointer location in retrieved document")]
    MissingTarget,

    /// The reference (transitively) inlines itself.
    #[display("Reference cycle detected: {_0}")]
    Cycle(String),
}

impl std::error::Error for ReferenceError {}

impl ReferenceError {
    /// Variant name, stored in adornments.
    pub fn kind(&self) -> &'static str {
        match self {
            ReferenceError::MalformedUrl(_) => "MalformedUrl",
            ReferenceError::BadPointer(_) => "BadPointer",
            ReferenceError::Fetch(_) => "Fetch",
            ReferenceError::Parse(_) => "Parse",
            ReferenceError::MissingTarget => "MissingTarget",
            ReferenceError::Cycle(_) => "Cycle",
        }
    }

    /// Variant payload.
    pub fn detail(&self) -> &str {
        match self {
            ReferenceError::MalformedUrl(d)
            | ReferenceError::BadPointer(d)
            | ReferenceError::Fetch(d)
            | ReferenceError::Parse(d)
            | ReferenceError::Cycle(d) => d,
            ReferenceError::MissingTarget => "",
        }
    }

    /// Inverse of [`ReferenceError::kind`] / [`ReferenceError::detail`].
    pub fn from_parts(kind: &str, detail: &str) -> Option<Self> {
        let detail = detail.to_string();
        match kind {
            "MalformedUrl" => Some(ReferenceError::MalformedUrl(detail)),
            "BadPointer" => Some(ReferenceError::BadPointer(detail)),
            "Fetch" => Some(ReferenceError::Fetch(detail)),
            "Parse" => Some(ReferenceError::Parse(detail)),
            "MissingTarget" => Some(ReferenceError::MissingTarget),
            "Cycle" => Some(ReferenceError::Cycle(detail)),
            _ => None,
        }
    }
}

/// How the scanner handles a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    /// Leave the `$ref` text in place.
    Error,
    /// Splice the target in during the LOAD phase.
    InlineNonconforming,
    /// Merge the target's fields with the referencing object.
    Merge,
    /// Splice the target in during the POLICY phase.
    InlineConforming,
    /// Hoist the target into its container and point at it.
    Localize,
    /// Keep the reference as written.
    Retain,
}

fn simple_ref_regex() -> &'static Regex {
    static SIMPLE_REF: OnceLock<Regex> = OnceLock::new();
    SIMPLE_REF.get_or_init(|| {
        Regex::new(r"^[_A-Za-z]([-A-Za-z0-9_]*[_A-Za-z0-9])?$").expect("Invalid regex")
    })
}

/// A resolved `$ref`.
#[derive(Debug, Clone)]
pub struct Reference {
    ref_string: String,
    url: Option<Url>,
    url_string: String,
    fragment: Option<String>,
    pointer: JsonPointer,
    component: Option<Component>,
    error: Option<ReferenceError>,
}

impl Reference {
    /// Resolves `ref_string` against `base`.
    ///
    /// # Arguments
    ///
    /// * `ref_string` - The `$ref` text.
    /// * `base` - URL of the containing document.
    /// * `component` - Component of the site the reference occupies.
    pub fn resolve(ref_string: &str, base: Option<&Url>, component: Option<Component>) -> Self {
        let (url_part, fragment) = match ref_string.split_once('#') {
            Some((url_part, frag)) => (url_part, Some(frag).filter(|f| !f.is_empty())),
            None => (ref_string, None),
        };

        let mut reference = Reference {
            ref_string: ref_string.to_string(),
            url: None,
            url_string: url_part.to_string(),
            fragment: fragment.map(str::to_string),
            pointer: JsonPointer::root(),
            component,
            error: None,
        };

        match resolve_url(url_part, base) {
            Ok(url) => {
                reference.url_string = url.as_str().to_string();
                reference.url = Some(url);
            }
            Err(e) => reference.mark_invalid(ReferenceError::MalformedUrl(e)),
        }

        if let Some(frag) = fragment {
            match JsonPointer::from_fragment(frag) {
                Ok(pointer) => {
                    reference.fragment = Some(pointer.to_string());
                    reference.pointer = pointer;
                }
                Err(e) => reference.mark_invalid(ReferenceError::BadPointer(e)),
            }
        }
        reference
    }

    /// The whole document at `url`.
    pub fn for_document(url: &Url) -> Self {
        Self::resolve(url.as_str(), None, None)
    }

    /// The value at `pointer` inside the document at `url`.
    pub fn at_pointer(url: &Url, pointer: &JsonPointer) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        let fragment = if pointer.is_root() {
            None
        } else {
            Some(pointer.to_string())
        };
        Reference {
            ref_string: format!("#{}", pointer),
            url_string: url.as_str().to_string(),
            url: Some(url),
            fragment,
            pointer: pointer.clone(),
            component: None,
            error: None,
        }
    }

    /// Reads a reference back from an adorned `$ref` node.
    ///
    /// Returns `None` for nodes without a `$ref` string or an `_info` object.
    pub fn from_node(node: &Value) -> Option<Self> {
        let text = ref_string(node)?;
        let info = node.get(ADORNMENT_KEY)?.as_object()?;
        let url_string = info.get("url")?.as_str()?.to_string();
        let fragment = info
            .get("fragment")
            .and_then(Value::as_str)
            .map(str::to_string);
        let pointer = fragment
            .as_deref()
            .and_then(|f| JsonPointer::parse(f).ok())
            .unwrap_or_default();
        let error = match info.get("valid").and_then(Value::as_bool) {
            Some(true) => None,
            _ => {
                let cause = info.get("invalidCause");
                let kind = cause.and_then(|c| c.get("kind")).and_then(Value::as_str);
                let detail = cause
                    .and_then(|c| c.get("detail"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some(
                    kind.and_then(|k| ReferenceError::from_parts(k, detail))
                        .unwrap_or_else(|| ReferenceError::MalformedUrl(detail.to_string())),
                )
            }
        };
        Some(Reference {
            ref_string: text.to_string(),
            url: Url::parse(&url_string).ok(),
            url_string,
            fragment,
            pointer,
            component: info.get("component").and_then(Component::from_json),
            error,
        })
    }

    /// `{"$ref": ...}`, optionally with the `_info` adornment.
    pub fn to_node(&self, adorned: bool) -> Value {
        let mut map = Map::new();
        map.insert(REF_KEY.to_string(), Value::String(self.ref_string.clone()));
        if adorned {
            map.insert(ADORNMENT_KEY.to_string(), self.adornment());
        }
        Value::Object(map)
    }

    fn adornment(&self) -> Value {
        let mut info = Map::new();
        info.insert("valid".into(), Value::Bool(self.is_valid()));
        info.insert("url".into(), Value::String(self.url_string.clone()));
        if let Some(fragment) = &self.fragment {
            info.insert("fragment".into(), Value::String(fragment.clone()));
        }
        if let Some(component) = self.component {
            info.insert("component".into(), component.to_json());
        }
        if let Some(error) = &self.error {
            info.insert("invalidReason".into(), Value::String(error.to_string()));
            info.insert(
                "invalidCause".into(),
                json!({"kind": error.kind(), "detail": error.detail()}),
            );
        }
        Value::Object(info)
    }

    /// The original `$ref` text.
    pub fn ref_string(&self) -> &str {
        &self.ref_string
    }

    /// Absolute document URL, when it could be resolved.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Absolute document URL as text (raw text when malformed).
    pub fn url_string(&self) -> &str {
        &self.url_string
    }

    /// Normalized fragment; `None` when absent or empty.
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Pointer into the document.
    pub fn pointer(&self) -> &JsonPointer {
        &self.pointer
    }

    /// Component of the referencing site.
    pub fn component(&self) -> Option<Component> {
        self.component
    }

    /// Same reference seen from a site of `component`.
    pub fn with_component(mut self, component: Option<Component>) -> Self {
        self.component = component;
        self
    }

    /// Recorded failure, if any.
    pub fn error(&self) -> Option<&ReferenceError> {
        self.error.as_ref()
    }

    /// Whether no failure has been recorded.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Whether this addresses a whole document.
    pub fn is_document(&self) -> bool {
        self.fragment.is_none()
    }

    /// The containing document's reference.
    pub fn document_ref(&self) -> Reference {
        Reference {
            ref_string: self.url_string.clone(),
            url: self.url.clone(),
            url_string: self.url_string.clone(),
            fragment: None,
            pointer: JsonPointer::root(),
            component: None,
            error: match &self.error {
                Some(ReferenceError::MalformedUrl(e)) => Some(ReferenceError::MalformedUrl(e.clone())),
                _ => None,
            },
        }
    }

    /// Records a failure unless one is already recorded.
    pub fn mark_invalid(&mut self, error: ReferenceError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Expands a bare-identifier fragment (`#Pet`) into `#<container>/Pet`.
    ///
    /// Returns whether the fragment was rewritten. A pointer-syntax failure
    /// is cleared by a successful rewrite.
    pub fn rewrite_simple_ref(&mut self) -> bool {
        let Some(container) = self.component.and_then(Component::container_path) else {
            return false;
        };
        let Some(fragment) = self.fragment.as_deref() else {
            return false;
        };
        if !simple_ref_regex().is_match(fragment) {
            return false;
        }
        let rewritten = format!("{}/{}", container, fragment);
        let Ok(pointer) = JsonPointer::parse(&rewritten) else {
            return false;
        };
        self.fragment = Some(rewritten);
        self.pointer = pointer;
        if matches!(self.error, Some(ReferenceError::BadPointer(_))) {
            self.error = None;
        }
        true
    }

    /// Classifies this reference under `options`.
    pub fn treatment(&self, options: &Options) -> Treatment {
        if !self.is_valid() {
            return Treatment::Error;
        }
        match self.component {
            Some(c) if c.is_conforming_site() => {
                if c.has_merge_semantics() {
                    Treatment::Merge
                } else if options.inlines(c) {
                    Treatment::InlineConforming
                } else if c.container_path().is_some() {
                    Treatment::Localize
                } else {
                    Treatment::Retain
                }
            }
            _ => Treatment::InlineNonconforming,
        }
    }
}

fn resolve_url(url_part: &str, base: Option<&Url>) -> Result<Url, String> {
    let mut url = match base {
        Some(base) if url_part.is_empty() => base.clone(),
        Some(base) => base.join(url_part).map_err(|e| format!("{} ({})", url_part, e))?,
        None if url_part.is_empty() => {
            return Err("same-document reference without a base document".to_string())
        }
        None => Url::parse(url_part).map_err(|e| format!("{} ({})", url_part, e))?,
    };
    url.set_fragment(None);
    Ok(url)
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.url_string == other.url_string && self.fragment == other.fragment
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url_string.hash(state);
        self.fragment.hash(state);
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "{}#{}", self.url_string, fragment),
            None => f.write_str(&self.url_string),
        }
    }
}
