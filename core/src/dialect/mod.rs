#![deny(missing_docs)]

//! # Dialects
//!
//! Per-dialect knowledge about *where* references may appear and *what* they
//! refer to. Each dialect contributes:
//!
//! - a table of [`ComponentAttrs`], one record per state of its machine;
//! - a transition table describing how document properties move between
//!   those states.
//!
//! A [`Component`] is a copyable handle into one of those tables. Behaviour
//! is looked up from the record, never dispatched per variant.

use crate::error::{NormalizeError, NormalizeResult};
use crate::util::machine::{StateId, StateMachine, StateMachineBuilder};
use crate::util::pointer::JsonPointer;
use serde_json::{json, Value};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

mod v2;
mod v3;

/// Name pattern shared by the definition containers: no `x-` extensions.
const DEF_NAME: &str = "re: [a-wyzA-Z0-9._-][a-zA-Z0-9._-]*|x|x[a-zA-Z0-9._][a-zA-Z0-9._-]*";

/// HTTP methods that lead from a path item to an operation.
const METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch"];

/// Supported description formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Swagger 2.0.
    Swagger2,
    /// OpenAPI 3.x.
    OpenApi3,
}

impl Dialect {
    /// Short identifier used in adornments and options (`v2` / `v3`).
    pub fn id(self) -> &'static str {
        match self {
            Dialect::Swagger2 => "v2",
            Dialect::OpenApi3 => "v3",
        }
    }

    /// Inverse of [`Dialect::id`].
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "v2" => Some(Dialect::Swagger2),
            "v3" => Some(Dialect::OpenApi3),
            _ => None,
        }
    }

    /// Guesses the dialect from a root document's `swagger` / `openapi` field.
    pub fn detect(root: &Value) -> Option<Self> {
        if root.get("swagger").is_some() {
            return Some(Dialect::Swagger2);
        }
        match root.get("openapi").and_then(Value::as_str) {
            Some(version) if version.starts_with('3') => Some(Dialect::OpenApi3),
            _ => None,
        }
    }

    fn table(self) -> &'static [ComponentAttrs] {
        match self {
            Dialect::Swagger2 => v2::COMPONENTS,
            Dialect::OpenApi3 => v3::COMPONENTS,
        }
    }

    /// All components of this dialect, in table order.
    pub fn components(self) -> impl Iterator<Item = Component> {
        (0..self.table().len()).map(move |index| Component {
            dialect: self,
            index,
        })
    }

    /// Looks up a component by (case-insensitive) name.
    pub fn component(self, name: &str) -> Option<Component> {
        self.components()
            .find(|component| component.name().eq_ignore_ascii_case(name))
    }

    /// The dialect's shared state machine, built on first use.
    pub fn machine(self) -> NormalizeResult<&'static DialectMachine> {
        static V2: OnceLock<Result<DialectMachine, String>> = OnceLock::new();
        static V3: OnceLock<Result<DialectMachine, String>> = OnceLock::new();
        let cell = match self {
            Dialect::Swagger2 => &V2,
            Dialect::OpenApi3 => &V3,
        };
        cell.get_or_init(|| DialectMachine::build(self).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| NormalizeError::General(format!("{} state machine: {}", self, e)))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How a component derives its preferred localized name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingRule {
    /// Not localizable.
    None,
    /// The last pointer token, unescaped (path items: `/pets/{id}`).
    PathKey,
    /// The entry name under one of these containers, else `<file>_<COMPONENT>`.
    Container(&'static [&'static str]),
}

/// Static capability record for one dialect state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentAttrs {
    /// State name, e.g. `SCHEMA`.
    pub name: &'static str,
    /// References are allowed here.
    pub conforming: bool,
    /// References here merge with sibling fields.
    pub merge: bool,
    /// Name of the component authoritatively defined at this state.
    pub defines: Option<&'static str>,
    /// Where localized entries of this component are collected.
    pub container: Option<&'static str>,
    /// Preferred-name derivation.
    pub naming: NamingRule,
}

impl ComponentAttrs {
    const fn plain(name: &'static str) -> Self {
        Self {
            name,
            conforming: false,
            merge: false,
            defines: None,
            container: None,
            naming: NamingRule::None,
        }
    }

    const fn site(
        name: &'static str,
        container: &'static str,
        naming: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            conforming: true,
            merge: false,
            defines: None,
            container: Some(container),
            naming: NamingRule::Container(naming),
        }
    }

    const fn definition(name: &'static str, defines: &'static str) -> Self {
        Self {
            defines: Some(defines),
            ..Self::plain(name)
        }
    }
}

/// Handle to a dialect state's [`ComponentAttrs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Component {
    dialect: Dialect,
    index: usize,
}

impl Component {
    /// Owning dialect.
    pub fn dialect(self) -> Dialect {
        self.dialect
    }

    /// Static attributes.
    pub fn attrs(self) -> &'static ComponentAttrs {
        &self.dialect.table()[self.index]
    }

    /// State name.
    pub fn name(self) -> &'static str {
        self.attrs().name
    }

    /// Whether `$ref` is permitted at this state.
    pub fn is_conforming_site(self) -> bool {
        self.attrs().conforming
    }

    /// Whether a `$ref` here merges with its sibling fields.
    pub fn has_merge_semantics(self) -> bool {
        self.attrs().merge
    }

    /// Whether this state is a canonical definition site.
    pub fn is_defining_site(self) -> bool {
        self.attrs().defines.is_some()
    }

    /// The component defined at this state.
    pub fn defined_component(self) -> Option<Component> {
        self.attrs()
            .defines
            .and_then(|name| self.dialect.component(name))
    }

    /// Canonical container of localized entries.
    pub fn container_path(self) -> Option<&'static str> {
        self.attrs().container
    }

    /// Container as a parsed pointer.
    pub fn container_pointer(self) -> Option<JsonPointer> {
        self.container_path()
            .and_then(|path| JsonPointer::parse(path).ok())
    }

    /// Name a localized entry would like to have.
    ///
    /// # Arguments
    ///
    /// * `pointer` - Location of the content within its document.
    /// * `url` - The document's URL.
    pub fn preferred_name(self, pointer: &JsonPointer, url: Option<&Url>) -> String {
        match self.attrs().naming {
            NamingRule::PathKey => pointer.last().unwrap_or_default().to_string(),
            NamingRule::Container(prefixes) => prefixes
                .iter()
                .filter_map(|prefix| JsonPointer::parse(prefix).ok())
                .find(|prefix| {
                    pointer.starts_with(prefix) && pointer.tokens().len() == prefix.tokens().len() + 1
                })
                .and_then(|_| pointer.last())
                .map(fix_name)
                .unwrap_or_else(|| match url.and_then(file_stem) {
                    Some(stem) => format!("{}_{}", fix_name(&stem), self.name()),
                    None => self.name().to_string(),
                }),
            NamingRule::None => self.name().to_string(),
        }
    }

    /// Adornment form: `{"dialect": "v2", "name": "SCHEMA"}`.
    pub fn to_json(self) -> Value {
        json!({"dialect": self.dialect.id(), "name": self.name()})
    }

    /// Inverse of [`Component::to_json`].
    pub fn from_json(value: &Value) -> Option<Self> {
        let dialect = Dialect::from_id(value.get("dialect")?.as_str()?)?;
        dialect.component(value.get("name")?.as_str()?)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Replaces characters outside `[A-Za-z0-9._-]` with `_`.
pub fn fix_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Last path segment of a URL up to its first `.`.
fn file_stem(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let stem = last.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// A dialect's frozen state machine with its per-component states.
#[derive(Debug)]
pub struct DialectMachine {
    dialect: Dialect,
    machine: StateMachine<Component>,
    states: Vec<StateId>,
}

impl DialectMachine {
    fn build(dialect: Dialect) -> NormalizeResult<Self> {
        let mut builder = StateMachineBuilder::new();
        let states: Vec<StateId> = dialect
            .components()
            .map(|component| builder.state(component))
            .collect();
        match dialect {
            Dialect::Swagger2 => v2::install(&mut builder, &states)?,
            Dialect::OpenApi3 => v3::install(&mut builder, &states)?,
        }
        Ok(Self {
            dialect,
            machine: builder.build(),
            states,
        })
    }

    /// The dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The automaton.
    pub fn machine(&self) -> &StateMachine<Component> {
        &self.machine
    }

    /// State for a whole description document.
    pub fn model(&self) -> StateId {
        self.states[0]
    }

    /// State tagged with `component`.
    pub fn state_of(&self, component: Component) -> Option<StateId> {
        if component.dialect != self.dialect {
            return None;
        }
        self.states.get(component.index).copied()
    }
}

/// `transit` for every HTTP method.
fn method_transits(
    builder: &mut StateMachineBuilder<Component>,
    path: StateId,
    operation: StateId,
) -> NormalizeResult<()> {
    for method in METHODS {
        builder.transit(path, &[*method], operation)?;
    }
    Ok(())
}
