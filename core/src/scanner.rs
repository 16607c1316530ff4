//! # Reference Scanner
//!
//! The [`Visitor`] that drives normalization. One scanner walks one content
//! in one of three phases:
//!
//! - **LOAD**: every reference is resolved and adorned with its absolute
//!   identity. References at non-conforming sites are replaced by their
//!   targets.
//! - **COMPONENTS**: content at defining sites (`/definitions/*`, `/paths/*`,
//!   `/components/*/*`) is registered with the localizer.
//! - **POLICY**: conforming references are localized, inlined or merged
//!   according to the options; the rest keep their `$ref` text.

use crate::content::{ContentId, ContentManager};
use crate::dialect::Component;
use crate::error::{NormalizeError, NormalizeResult};
use crate::reference::{Reference, ReferenceError, Treatment};
use crate::util::machine::StateId;
use crate::util::tree::{merge_fields, ref_string, without_ref, ADORNMENT_KEY};
use crate::util::walker::{Disposition, Visit, Visitor};
use serde_json::Value;
use tracing::{debug, trace, warn};

/// Scan phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    /// Resolve, adorn and inline non-conforming references.
    Load,
    /// Register defining sites with the localizer.
    Components,
    /// Apply localize / inline / merge policy.
    Policy,
}

/// Deferred work run after a node's subtree was scanned.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Store the finished node as the localized entry for this origin.
    Refresh(Reference),
    /// Fold a merge target's fields into the finished node.
    MergeReferenced {
        /// Normalized merge target.
        referenced: Value,
        /// Origin of the node, used to find its localized entry.
        origin: Option<Reference>,
        /// `$ref` node left behind when the entry absorbs the merge.
        unadorned: Value,
    },
}

type Outcome = NormalizeResult<Disposition<Completion>>;

/// `node` with the reference's `_info`; sibling fields are kept.
fn adorned(node: &Value, reference: &Reference) -> Value {
    let mut out = node.clone();
    merge_fields(&mut out, &reference.to_node(true));
    out
}

/// `node` without `_info`.
fn unadorned(node: &Value) -> Value {
    let mut out = node.clone();
    if let Some(map) = out.as_object_mut() {
        map.shift_remove(ADORNMENT_KEY);
    }
    out
}

/// Walks one content on behalf of a [`ContentManager`].
pub struct ReferenceScanner<'a> {
    manager: &'a mut ContentManager,
    op: ScanOp,
    base: Reference,
}

impl<'a> ReferenceScanner<'a> {
    /// Creates a scanner for the content identified by `base`.
    pub fn new(manager: &'a mut ContentManager, op: ScanOp, base: Reference) -> Self {
        Self { manager, op, base }
    }

    fn origin(&self, visit: &Visit<'_, '_, Component>) -> Option<Reference> {
        let url = self.base.url()?;
        Some(Reference::at_pointer(url, &self.base.pointer().join(&visit.pointer())))
    }

    /// The reference held by `node`, seen from the current site.
    ///
    /// Adorned nodes keep the identity recorded during LOAD.
    fn reference(&self, node: &Value, visit: &Visit<'_, '_, Component>) -> Option<Reference> {
        let text = ref_string(node)?;
        let component = visit.site().tag().copied();
        if let Some(adorned) = Reference::from_node(node) {
            return Some(adorned.with_component(component));
        }
        let mut reference = Reference::resolve(text, self.base.url(), component);
        if self.manager.options().rewrite_simple_refs {
            reference.rewrite_simple_ref();
        }
        Some(reference)
    }

    /// Runs `f` with `reference` marked as being resolved.
    ///
    /// Fails without running `f` when `reference` is already being resolved;
    /// the outer resolution stays marked.
    fn resolving<R>(
        &mut self,
        reference: &Reference,
        f: impl FnOnce(&mut Self) -> NormalizeResult<R>,
    ) -> NormalizeResult<R> {
        let fresh = self
            .manager
            .resolving
            .visit(reference)
            .map_err(|e| NormalizeError::General(e.to_string()))?;
        if !fresh {
            return Err(NormalizeError::General(format!(
                "Reference is already being resolved: {}",
                reference
            )));
        }
        let result = f(self);
        self.manager.resolving.unvisit(reference);
        result
    }

    fn is_resolving(&self, reference: &Reference) -> bool {
        self.manager.resolving.is_active(reference)
    }

    /// Loads `reference`, recording a load failure on it.
    ///
    /// Returns the content's tree when the target was found.
    fn load(
        &mut self,
        reference: &mut Reference,
        state: Option<StateId>,
    ) -> NormalizeResult<Option<ContentId>> {
        let id = self.manager.load(reference, state)?;
        let content = self.manager.content(id);
        match content.invalid_reason() {
            Some(error) => {
                reference.mark_invalid(error.clone());
                Ok(None)
            }
            None if content.is_valid() => Ok(Some(id)),
            None => Ok(None),
        }
    }

    fn cycle(reference: &mut Reference) {
        warn!(reference = %reference, "Reference cycle");
        reference.mark_invalid(ReferenceError::Cycle(reference.to_string()));
    }

    fn scan_load(&mut self, node: &Value, visit: &Visit<'_, '_, Component>) -> Outcome {
        let Some(mut reference) = self.reference(node, visit) else {
            return Ok(Disposition::descend());
        };
        let treatment = reference.treatment(self.manager.options());
        trace!(reference = %reference, ?treatment, "LOAD");
        match treatment {
            // the inline part of a merge node is scanned like any other content
            Treatment::Merge => return Ok(Disposition::descend().replace_with(adorned(node, &reference))),
            Treatment::InlineNonconforming => {}
            _ => return Ok(Disposition::done_with(adorned(node, &reference))),
        }
        if self.is_resolving(&reference) {
            Self::cycle(&mut reference);
            return Ok(Disposition::done_with(adorned(node, &reference)));
        }

        let state = visit.state();
        let Some(id) = self.load(&mut reference, state)? else {
            return Ok(Disposition::done_with(adorned(node, &reference)));
        };
        let scanned = self.resolving(&reference, |s| s.manager.scan_from(id, ScanOp::Load, state))?;
        Ok(match scanned {
            Some(tree) => Disposition::revisit(tree),
            None => Disposition::done_with(adorned(node, &reference)),
        })
    }

    fn scan_components(&mut self, node: &Value, visit: &Visit<'_, '_, Component>) -> Outcome {
        let Some(defined) = visit
            .site()
            .tag()
            .and_then(|site| site.defined_component())
        else {
            return Ok(Disposition::descend());
        };
        let (Some(url), Some(origin)) = (self.base.url().cloned(), self.origin(visit)) else {
            return Ok(Disposition::descend());
        };
        let content = if defined.has_merge_semantics() {
            without_ref(node)
        } else {
            node.clone()
        };
        self.manager
            .localizer
            .localize(content, defined, origin.pointer(), &url)?;
        Ok(Disposition::done())
    }

    fn scan_policy(&mut self, node: &Value, visit: &Visit<'_, '_, Component>) -> Outcome {
        let defining = visit
            .site()
            .tag()
            .is_some_and(|site| site.is_defining_site());
        let refresh = if defining { self.origin(visit) } else { None };

        let Some(reference) = self.reference(node, visit) else {
            let outcome = Disposition::descend();
            return Ok(match refresh {
                Some(origin) => outcome.with_completion(Completion::Refresh(origin)),
                None => outcome,
            });
        };

        let treatment = reference.treatment(self.manager.options());
        trace!(reference = %reference, ?treatment, "POLICY");
        let state = visit.state();
        let outcome = match treatment {
            Treatment::Merge => return self.merge(node, reference, visit),
            Treatment::Error => {
                debug!(
                    reference = %reference,
                    reason = %reference.error().map(ToString::to_string).unwrap_or_default(),
                    "Leaving unresolved reference"
                );
                Disposition::done_with(unadorned(node))
            }
            Treatment::Retain => Disposition::done_with(unadorned(node)),
            Treatment::Localize => self.localize(node, reference, state)?,
            Treatment::InlineConforming | Treatment::InlineNonconforming => {
                self.inline(node, reference, treatment, state)?
            }
        };
        Ok(match refresh {
            Some(origin) => outcome.with_completion(Completion::Refresh(origin)),
            None => outcome,
        })
    }

    fn localize(&mut self, node: &Value, mut reference: Reference, state: Option<StateId>) -> Outcome {
        let Some(component) = reference.component() else {
            return Ok(Disposition::done_with(unadorned(node)));
        };
        if self.is_resolving(&reference) || self.manager.finalized.contains(&reference) {
            if let Some(entry) = self.manager.localizer.get(&reference) {
                return Ok(Disposition::done_with(entry.ref_node()));
            }
        }

        let Some(id) = self.load(&mut reference, state)? else {
            warn!(reference = %reference, "Unable to localize");
            return Ok(Disposition::done_with(unadorned(node)));
        };
        let (Some(raw), Some(url)) = (self.manager.tree(id).cloned(), reference.url().cloned()) else {
            return Ok(Disposition::done_with(unadorned(node)));
        };
        let localized = self
            .manager
            .localizer
            .localize(raw, component, reference.pointer(), &url)?
            .ref_node();
        if self.is_resolving(&reference) {
            // whoever is resolving it refreshes the entry when done
            return Ok(Disposition::done_with(localized));
        }

        let processed = self.resolving(&reference, |s| s.manager.rescan(id, state))?;
        if let Some(tree) = processed {
            self.manager.localizer.refresh(&reference, tree);
        }
        self.manager.finalized.insert(reference);
        Ok(Disposition::done_with(localized))
    }

    fn inline(
        &mut self,
        node: &Value,
        mut reference: Reference,
        treatment: Treatment,
        state: Option<StateId>,
    ) -> Outcome {
        if self.is_resolving(&reference) {
            let has_container = reference
                .component()
                .and_then(Component::container_path)
                .is_some();
            if treatment == Treatment::InlineConforming && has_container {
                debug!(reference = %reference, "Localizing to break inline cycle");
                return self.localize(node, reference, state);
            }
            Self::cycle(&mut reference);
            return Ok(Disposition::done_with(unadorned(node)));
        }

        let Some(id) = self.load(&mut reference, state)? else {
            warn!(reference = %reference, "Unable to inline");
            return Ok(Disposition::done_with(unadorned(node)));
        };
        let processed = self.resolving(&reference, |s| s.manager.rescan(id, state))?;
        let Some(tree) = processed else {
            return Ok(Disposition::done_with(unadorned(node)));
        };
        self.manager.localizer.refresh(&reference, tree.clone());
        Ok(Disposition::done_with(tree))
    }

    fn merge(&mut self, node: &Value, mut reference: Reference, visit: &Visit<'_, '_, Component>) -> Outcome {
        let state = visit.state();
        let referenced = if self.is_resolving(&reference) {
            Self::cycle(&mut reference);
            reference.to_node(false)
        } else {
            match self.load(&mut reference, state)? {
                Some(id) => self
                    .resolving(&reference, |s| s.manager.rescan(id, state))?
                    .unwrap_or_else(|| reference.to_node(false)),
                None => reference.to_node(false),
            }
        };
        Ok(
            Disposition::revisit(without_ref(node)).with_completion(Completion::MergeReferenced {
                referenced,
                origin: self.origin(visit),
                unadorned: reference.to_node(false),
            }),
        )
    }
}

impl Visitor<Component> for ReferenceScanner<'_> {
    type Completion = Completion;

    fn visit(&mut self, node: &Value, visit: &Visit<'_, '_, Component>) -> Outcome {
        match self.op {
            ScanOp::Load => self.scan_load(node, visit),
            ScanOp::Components => self.scan_components(node, visit),
            ScanOp::Policy => self.scan_policy(node, visit),
        }
    }

    fn complete(
        &mut self,
        completion: Completion,
        node: &mut Value,
        _visit: &Visit<'_, '_, Component>,
    ) -> NormalizeResult<()> {
        match completion {
            Completion::Refresh(origin) => {
                self.manager.localizer.refresh(&origin, node.clone());
            }
            Completion::MergeReferenced {
                referenced,
                origin,
                unadorned,
            } => match origin {
                Some(origin) if self.manager.localizer.contains(&origin) => {
                    if let Some(url) = origin.url() {
                        self.manager
                            .localizer
                            .merge_localize(&referenced, origin.pointer(), url)?;
                    }
                    *node = unadorned;
                }
                _ => merge_fields(node, &referenced),
            },
        }
        Ok(())
    }
}
