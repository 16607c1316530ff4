#![deny(missing_docs)]

//! # State Machine
//!
//! A labelled-edge automaton that is walked in lockstep with a document tree.
//!
//! States live in an arena addressed by [`StateId`]. A state may carry a tag
//! (the dialect component for that position) or be an anonymous hop created
//! for a multi-edge transit. Edge labels come in four kinds:
//!
//! - plain text: matches exactly that property name
//! - `re: <pattern>`: matches property names the whole pattern accepts
//! - `*`: matches any property name
//! - `#`: matches any array index
//!
//! Exact labels win; the remaining edges are tried in declaration order.
//!
//! Machines are assembled with a [`StateMachineBuilder`] and frozen by
//! [`StateMachineBuilder::build`]. A frozen machine is immutable and can be
//! shared between threads; all traversal state lives in a [`Tracker`].

use crate::error::{NormalizeError, NormalizeResult};
use crate::util::pointer::{JsonPointer, PathSegment};
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Arena index of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A compiled edge label.
#[derive(Debug, Clone)]
pub enum Label {
    /// Matches one property name.
    Exact(String),
    /// Matches any property name the (anchored) pattern accepts.
    Pattern(Regex),
    /// `*`: any property name.
    AnyString,
    /// `#`: any array index.
    AnyIndex,
}

impl Label {
    /// Compiles label text.
    pub fn parse(text: &str) -> NormalizeResult<Self> {
        match text {
            "*" => Ok(Label::AnyString),
            "#" => Ok(Label::AnyIndex),
            _ => match text.strip_prefix("re:") {
                Some(pattern) => {
                    let anchored = format!("^(?:{})$", pattern.trim_start());
                    Regex::new(&anchored)
                        .map(Label::Pattern)
                        .map_err(|e| NormalizeError::InvalidLabel(text.to_string(), e.to_string()))
                }
                None => Ok(Label::Exact(text.to_string())),
            },
        }
    }

    fn matches_key(&self, key: &str) -> bool {
        match self {
            Label::Exact(label) => label == key,
            Label::Pattern(re) => re.is_match(key),
            Label::AnyString => true,
            Label::AnyIndex => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Edge {
    text: String,
    label: Label,
    target: StateId,
}

#[derive(Debug)]
struct StateRecord<T> {
    tag: Option<T>,
    exact: IndexMap<String, StateId>,
    others: Vec<Edge>,
}

impl<T> StateRecord<T> {
    fn new(tag: Option<T>) -> Self {
        Self {
            tag,
            exact: IndexMap::new(),
            others: Vec::new(),
        }
    }

    fn edge_target(&self, text: &str) -> Option<StateId> {
        self.exact.get(text).copied().or_else(|| {
            self.others
                .iter()
                .find(|edge| edge.text == text)
                .map(|edge| edge.target)
        })
    }

    /// Installs or overwrites the edge with the given label text.
    fn set_edge(&mut self, text: &str, label: Label, target: StateId) {
        if let Label::Exact(key) = label {
            self.exact.insert(key, target);
        } else if let Some(edge) = self.others.iter_mut().find(|edge| edge.text == text) {
            edge.target = target;
        } else {
            self.others.push(Edge {
                text: text.to_string(),
                label,
                target,
            });
        }
    }

    fn all_edges(&self) -> Vec<(String, Label, StateId)> {
        self.exact
            .iter()
            .map(|(key, target)| (key.clone(), Label::Exact(key.clone()), *target))
            .chain(
                self.others
                    .iter()
                    .map(|edge| (edge.text.clone(), edge.label.clone(), edge.target)),
            )
            .collect()
    }
}

/// Mutable assembly stage of a [`StateMachine`].
#[derive(Debug)]
pub struct StateMachineBuilder<T> {
    states: Vec<StateRecord<T>>,
}

impl<T> Default for StateMachineBuilder<T> {
    fn default() -> Self {
        Self { states: Vec::new() }
    }
}

impl<T> StateMachineBuilder<T> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tagged state.
    pub fn state(&mut self, tag: T) -> StateId {
        self.push(Some(tag))
    }

    fn push(&mut self, tag: Option<T>) -> StateId {
        self.states.push(StateRecord::new(tag));
        StateId(self.states.len() - 1)
    }

    fn record(&self, id: StateId) -> NormalizeResult<&StateRecord<T>> {
        self.states.get(id.0).ok_or(NormalizeError::UnknownState(id.0))
    }

    fn record_mut(&mut self, id: StateId) -> NormalizeResult<&mut StateRecord<T>> {
        self.states
            .get_mut(id.0)
            .ok_or(NormalizeError::UnknownState(id.0))
    }

    /// Declares a path from `from` to `to` along `labels`.
    ///
    /// Existing edges are reused. Missing intermediate hops become anonymous
    /// states. Re-declaring a complete path that ends elsewhere fails with
    /// [`NormalizeError::TransitConflict`].
    ///
    /// # Arguments
    ///
    /// * `from` - Start state.
    /// * `labels` - One or more edge labels.
    /// * `to` - End state.
    pub fn transit(&mut self, from: StateId, labels: &[&str], to: StateId) -> NormalizeResult<()> {
        let Some((last, hops)) = labels.split_last() else {
            return Err(NormalizeError::General(
                "A transit needs at least one edge label".into(),
            ));
        };
        self.record(to)?;
        let mut current = from;
        for text in hops {
            let existing = self.record(current)?.edge_target(text);
            current = match existing {
                Some(next) => next,
                None => {
                    let label = Label::parse(text)?;
                    let hop = self.push(None);
                    self.record_mut(current)?.set_edge(text, label, hop);
                    hop
                }
            };
        }
        let existing = self.record(current)?.edge_target(last);
        match existing {
            Some(existing) if existing != to => Err(NormalizeError::TransitConflict(format!(
                "[{}] already leads to state {}, not {}",
                labels.join(", "),
                existing.0,
                to.0
            ))),
            Some(_) => Ok(()),
            None => {
                let label = Label::parse(last)?;
                self.record_mut(current)?.set_edge(last, label, to);
                Ok(())
            }
        }
    }

    /// Copies the outgoing edges of `from` onto `to`, overwriting edges that
    /// share a label.
    pub fn copy_out_edges(&mut self, from: StateId, to: StateId) -> NormalizeResult<()> {
        self.record(to)?;
        let edges = self.record(from)?.all_edges();
        for (text, label, target) in edges {
            self.record_mut(to)?.set_edge(&text, label, target);
        }
        Ok(())
    }

    /// Freezes the machine.
    pub fn build(self) -> StateMachine<T> {
        StateMachine {
            states: self.states,
        }
    }
}

/// A frozen, shareable state machine.
#[derive(Debug)]
pub struct StateMachine<T> {
    states: Vec<StateRecord<T>>,
}

impl<T> StateMachine<T> {
    /// Tag of a state; `None` for anonymous hops.
    pub fn tag(&self, id: StateId) -> Option<&T> {
        self.states.get(id.0).and_then(|state| state.tag.as_ref())
    }

    /// Number of states, anonymous hops included.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the machine has no states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Finds the first state carrying a tag that satisfies `pred`.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<StateId> {
        self.states
            .iter()
            .position(|state| state.tag.as_ref().is_some_and(&pred))
            .map(StateId)
    }

    /// Follows a property-name move from `from`.
    pub fn step_key(&self, from: StateId, key: &str) -> Option<StateId> {
        let state = self.states.get(from.0)?;
        state.exact.get(key).copied().or_else(|| {
            state
                .others
                .iter()
                .find(|edge| edge.label.matches_key(key))
                .map(|edge| edge.target)
        })
    }

    /// Follows an array-index move from `from`.
    pub fn step_index(&self, from: StateId) -> Option<StateId> {
        let state = self.states.get(from.0)?;
        state
            .others
            .iter()
            .find(|edge| matches!(edge.label, Label::AnyIndex))
            .map(|edge| edge.target)
    }

    /// Creates a tracker positioned at `start`.
    pub fn tracker(&self, start: StateId) -> Tracker<'_, T> {
        Tracker::new(self, Some(start))
    }

    /// Creates a tracker at `start`, or off-road when `start` is `None`.
    pub fn tracker_from(&self, start: Option<StateId>) -> Tracker<'_, T> {
        Tracker::new(self, start)
    }
}

/// What kind of position a tracker is at.
pub enum Site<'m, T> {
    /// A tagged state.
    Named(&'m T),
    /// An untagged hop inside a multi-edge transit.
    Anonymous,
    /// A move failed to match; the tracker left the machine.
    OffRoad,
}

impl<T> Clone for Site<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Site<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for Site<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Named(tag) => f.debug_tuple("Named").field(tag).finish(),
            Site::Anonymous => f.write_str("Anonymous"),
            Site::OffRoad => f.write_str("OffRoad"),
        }
    }
}

impl<'m, T> Site<'m, T> {
    /// The tag, for named sites.
    pub fn tag(&self) -> Option<&'m T> {
        match self {
            Site::Named(tag) => Some(tag),
            _ => None,
        }
    }
}

/// Cursor over a [`StateMachine`].
///
/// Records the path of move values and enough history to undo moves.
/// Once a move fails to match, the tracker is off-road and every further
/// move keeps it there until backed up.
pub struct Tracker<'m, T> {
    machine: &'m StateMachine<T>,
    current: Option<StateId>,
    path: Vec<PathSegment>,
    crumbs: Vec<Option<StateId>>,
    memo: HashMap<StateId, HashMap<String, Option<StateId>>>,
}

impl<'m, T> Tracker<'m, T> {
    fn new(machine: &'m StateMachine<T>, start: Option<StateId>) -> Self {
        Self {
            machine,
            current: start,
            path: Vec::new(),
            crumbs: Vec::new(),
            memo: HashMap::new(),
        }
    }

    /// The machine being tracked.
    pub fn machine(&self) -> &'m StateMachine<T> {
        self.machine
    }

    /// Current state, `None` when off-road.
    pub fn current(&self) -> Option<StateId> {
        self.current
    }

    /// Whether an earlier move failed to match.
    pub fn is_off_road(&self) -> bool {
        self.current.is_none()
    }

    /// Move values from the start state.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// JSON Pointer equivalent of [`Tracker::path`].
    pub fn pointer(&self) -> JsonPointer {
        JsonPointer::from_path(&self.path)
    }

    /// Classification of the current position.
    pub fn site(&self) -> Site<'m, T> {
        match self.current {
            None => Site::OffRoad,
            Some(id) => match self.machine.tag(id) {
                Some(tag) => Site::Named(tag),
                None => Site::Anonymous,
            },
        }
    }

    /// State a property-name move would reach, without moving.
    pub fn peek_key(&self, key: &str) -> Option<StateId> {
        self.current
            .and_then(|id| self.machine.step_key(id, key))
    }

    /// State an array-index move would reach, without moving.
    pub fn peek_index(&self) -> Option<StateId> {
        self.current.and_then(|id| self.machine.step_index(id))
    }

    /// Moves along a property name.
    pub fn move_key(&mut self, key: &str) -> Option<StateId> {
        let next = match self.current {
            None => None,
            Some(id) => {
                let machine = self.machine;
                let cache = self.memo.entry(id).or_default();
                match cache.get(key) {
                    Some(hit) => *hit,
                    None => {
                        let computed = machine.step_key(id, key);
                        cache.insert(key.to_string(), computed);
                        computed
                    }
                }
            }
        };
        self.advance(next, PathSegment::Key(key.to_string()))
    }

    /// Moves along an array index.
    pub fn move_index(&mut self, idx: usize) -> Option<StateId> {
        let next = self.peek_index();
        self.advance(next, PathSegment::Index(idx))
    }

    /// Moves along one path segment.
    pub fn move_to(&mut self, segment: &PathSegment) -> Option<StateId> {
        match segment {
            PathSegment::Key(key) => self.move_key(key),
            PathSegment::Index(idx) => self.move_index(*idx),
        }
    }

    fn advance(&mut self, next: Option<StateId>, segment: PathSegment) -> Option<StateId> {
        self.crumbs.push(self.current);
        self.path.push(segment);
        self.current = next;
        next
    }

    /// Undoes the last `n` moves.
    pub fn backup(&mut self, n: usize) -> NormalizeResult<Option<StateId>> {
        if n > self.crumbs.len() {
            return Err(NormalizeError::BackupUnderflow);
        }
        for _ in 0..n {
            self.current = self.crumbs.pop().flatten();
            self.path.pop();
        }
        Ok(self.current)
    }

    /// Returns to `start` with an empty history.
    pub fn reset(&mut self, start: StateId) {
        self.current = Some(start);
        self.path.clear();
        self.crumbs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum S {
        A,
        B,
        C,
        D,
    }

    fn machine() -> (StateMachine<S>, [StateId; 4]) {
        let mut b = StateMachineBuilder::new();
        let a = b.state(S::A);
        let bb = b.state(S::B);
        let c = b.state(S::C);
        let d = b.state(S::D);
        b.transit(a, &["x"], bb).unwrap();
        b.transit(a, &["y", "z"], c).unwrap();
        b.transit(a, &["y", "*"], d).unwrap();
        b.transit(bb, &["list", "#"], c).unwrap();
        b.transit(bb, &["re: /.*"], d).unwrap();
        b.transit(bb, &["*"], a).unwrap();
        (b.build(), [a, bb, c, d])
    }

    #[test]
    fn test_named_and_anonymous_moves() {
        let (m, [a, b, c, d]) = machine();
        let mut t = m.tracker(a);
        assert_eq!(t.move_key("x"), Some(b));
        t.reset(a);
        t.move_key("y");
        assert!(matches!(t.site(), Site::Anonymous));
        assert_eq!(t.move_key("z"), Some(c));
        t.backup(1).unwrap();
        assert_eq!(t.move_key("other"), Some(d));
        assert_eq!(t.path().len(), 2);
    }

    #[test]
    fn test_exact_label_wins_over_pattern_and_wildcard() {
        let (m, [a, b, _, d]) = machine();
        let mut t = m.tracker(a);
        t.move_key("x");
        assert_eq!(t.peek_key("/pets"), Some(d));
        assert_eq!(t.peek_key("pets"), Some(a));
        assert!(t.peek_key("list").is_some());
        assert_ne!(t.peek_key("list"), Some(a));
        assert_eq!(t.current(), Some(b));
    }

    #[test]
    fn test_index_moves_only_follow_hash_edges() {
        let (m, [_, b, c, _]) = machine();
        let mut t = m.tracker(b);
        t.move_key("list");
        assert_eq!(t.move_index(4), Some(c));
        let mut t2 = m.tracker(b);
        // `*` does not match indexes
        assert_eq!(t2.move_index(0), None);
    }

    #[test]
    fn test_off_road_is_permanent_until_backup() {
        let (m, [a, _, _, _]) = machine();
        let mut t = m.tracker(a);
        assert_eq!(t.move_key("nope"), None);
        assert!(t.is_off_road());
        assert_eq!(t.move_key("x"), None);
        assert!(matches!(t.site(), Site::OffRoad));
        assert_eq!(t.pointer().to_string(), "/nope/x");
        assert_eq!(t.backup(2).unwrap(), Some(a));
    }

    #[test]
    fn test_backup_underflow() {
        let (m, [a, _, _, _]) = machine();
        let mut t = m.tracker(a);
        t.move_key("x");
        let err = t.backup(2).unwrap_err();
        assert!(matches!(err, NormalizeError::BackupUnderflow));
    }

    #[test]
    fn test_transit_conflict() {
        let mut b = StateMachineBuilder::new();
        let a = b.state(S::A);
        let x = b.state(S::B);
        let y = b.state(S::C);
        b.transit(a, &["p", "q"], x).unwrap();
        b.transit(a, &["p", "q"], x).unwrap();
        let err = b.transit(a, &["p", "q"], y).unwrap_err();
        assert!(matches!(err, NormalizeError::TransitConflict(_)));
    }

    #[test]
    fn test_invalid_pattern_label() {
        let mut b = StateMachineBuilder::new();
        let a = b.state(S::A);
        let err = b.transit(a, &["re: ("], a).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidLabel(_, _)));
    }

    #[test]
    fn test_foreign_state_ids_are_rejected() {
        let mut other = StateMachineBuilder::new();
        for tag in [S::A, S::B, S::C] {
            other.state(tag);
        }
        let foreign = other.state(S::D);

        let mut b = StateMachineBuilder::new();
        let a = b.state(S::A);
        let err = b.transit(a, &["k"], foreign).unwrap_err();
        assert!(matches!(err, NormalizeError::UnknownState(3)));
        let err = b.transit(foreign, &["k", "j"], a).unwrap_err();
        assert!(matches!(err, NormalizeError::UnknownState(3)));
        assert!(matches!(
            b.copy_out_edges(foreign, a),
            Err(NormalizeError::UnknownState(3))
        ));
        assert!(matches!(
            b.copy_out_edges(a, foreign),
            Err(NormalizeError::UnknownState(3))
        ));
        assert_eq!(b.build().len(), 1);
    }

    #[test]
    fn test_copy_out_edges_overwrites() {
        let mut b = StateMachineBuilder::new();
        let a = b.state(S::A);
        let x = b.state(S::B);
        let y = b.state(S::C);
        let z = b.state(S::D);
        b.transit(a, &["k"], x).unwrap();
        b.transit(a, &["*"], y).unwrap();
        b.transit(z, &["k"], y).unwrap();
        b.copy_out_edges(a, z).unwrap();
        let m = b.build();
        assert_eq!(m.step_key(z, "k"), Some(x));
        assert_eq!(m.step_key(z, "anything"), Some(y));
    }

    #[test]
    fn test_path_tracks_moves() {
        let (m, [_, b, _, _]) = machine();
        let mut t = m.tracker(b);
        t.move_key("list");
        t.move_index(2);
        assert_eq!(
            t.path(),
            &[PathSegment::Key("list".into()), PathSegment::Index(2)]
        );
        t.backup(1).unwrap();
        assert_eq!(t.path(), &[PathSegment::Key("list".into())]);
    }
}
