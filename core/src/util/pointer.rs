//! # JSON Pointers
//!
//! RFC 6901 pointers and the path segments the state tracker records.
//!
//! Fragments taken from `$ref` strings are percent-decoded before the pointer
//! syntax is parsed, so `#/paths/~1pets%7Bid%7D` addresses the `/pets{id}` key.

use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::fmt;

/// One step of a structural path: a property name or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object property name.
    Key(String),
    /// Array index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(idx) => write!(f, "{}", idx),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(idx: usize) -> Self {
        PathSegment::Index(idx)
    }
}

/// A parsed JSON Pointer: the unescaped reference tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPointer {
    tokens: Vec<String>,
}

impl JsonPointer {
    /// The empty pointer, addressing the whole document.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses pointer syntax (`""` or `/a/b~1c`).
    ///
    /// Returns a description of the problem when the text is not a pointer.
    pub fn parse(text: &str) -> Result<Self, String> {
        if text.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = text.strip_prefix('/') else {
            return Err(format!("JSON Pointer '{}' must start with '/'", text));
        };
        let tokens = rest
            .split('/')
            .map(|raw| unescape_token(raw).ok_or_else(|| bad_escape(text)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens })
    }

    /// Parses a URL fragment, percent-decoding it first.
    pub fn from_fragment(fragment: &str) -> Result<Self, String> {
        let decoded = percent_decode_str(fragment).decode_utf8_lossy();
        Self::parse(&decoded)
    }

    /// Builds the pointer equivalent of a structural path.
    pub fn from_path(path: &[PathSegment]) -> Self {
        Self {
            tokens: path.iter().map(|seg| seg.to_string()).collect(),
        }
    }

    /// Builds a pointer from already-unescaped tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Unescaped reference tokens.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether this pointer addresses the whole document.
    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Last token, if any.
    pub fn last(&self) -> Option<&str> {
        self.tokens.last().map(String::as_str)
    }

    /// Appends a token.
    pub fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    /// Returns `self` followed by `other`.
    pub fn join(&self, other: &JsonPointer) -> JsonPointer {
        let mut tokens = self.tokens.clone();
        tokens.extend(other.tokens.iter().cloned());
        JsonPointer { tokens }
    }

    /// Whether `self` is `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &JsonPointer) -> bool {
        self.tokens.starts_with(&prefix.tokens)
    }

    /// Looks up the addressed value.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.tokens
            .iter()
            .try_fold(root, |node, token| match node {
                Value::Object(map) => map.get(token),
                Value::Array(items) => array_index(token).and_then(|idx| items.get(idx)),
                _ => None,
            })
    }

    /// Looks up the addressed value mutably.
    pub fn resolve_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        self.tokens
            .iter()
            .try_fold(root, |node, token| match node {
                Value::Object(map) => map.get_mut(token),
                Value::Array(items) => array_index(token).and_then(|idx| items.get_mut(idx)),
                _ => None,
            })
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", escape_segment(token))?;
        }
        Ok(())
    }
}

/// Escapes `~` and `/` for use inside a pointer.
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Decodes a JSON Pointer segment (handles `~1`, `~0` and percent escapes).
pub fn decode_pointer_segment(segment: &str) -> String {
    let decoded = segment.replace("~1", "/").replace("~0", "~");
    percent_decode_str(&decoded).decode_utf8_lossy().into_owned()
}

fn unescape_token(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn bad_escape(text: &str) -> String {
    format!("JSON Pointer '{}' contains an invalid '~' escape", text)
}

fn array_index(token: &str) -> Option<usize> {
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}
