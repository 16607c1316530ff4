#![deny(missing_docs)]

//! # JSON State Walker
//!
//! Depth-first traversal of a `serde_json::Value` that keeps a [`Tracker`]
//! in step with the current node, so a visitor always knows which schema
//! position (state) the node occupies.
//!
//! A visitor answers each node with a [`Disposition`]:
//!
//! - `Descend`: walk the (possibly replaced) node's children.
//! - `Revisit`: visit the replacement again at the same position.
//! - `Done`: leave the node's subtree alone.
//!
//! Completion values attached to a disposition come back to the visitor
//! through [`Visitor::complete`] once the node's subtree has been processed,
//! innermost first.

use crate::error::NormalizeResult;
use crate::util::machine::{Site, StateId, StateMachine, Tracker};
use crate::util::pointer::{JsonPointer, PathSegment};
use serde_json::Value;

/// What to do after a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Walk the node's children.
    Descend,
    /// Visit the replacement node at the same position.
    Revisit,
    /// Skip the node's children.
    Done,
}

/// A visitor's answer for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Disposition<C> {
    /// Follow-up action.
    pub action: Action,
    /// Node to store in place of the visited one.
    pub replacement: Option<Value>,
    /// Value handed back to [`Visitor::complete`] after the subtree is done.
    pub completion: Option<C>,
}

impl<C> Disposition<C> {
    fn of(action: Action) -> Self {
        Self {
            action,
            replacement: None,
            completion: None,
        }
    }

    /// Walk the children unchanged.
    pub fn descend() -> Self {
        Self::of(Action::Descend)
    }

    /// Stop here.
    pub fn done() -> Self {
        Self::of(Action::Done)
    }

    /// Replace the node and stop.
    pub fn done_with(node: Value) -> Self {
        Self::done().replace_with(node)
    }

    /// Replace the node and visit the replacement.
    pub fn revisit(node: Value) -> Self {
        Self::of(Action::Revisit).replace_with(node)
    }

    /// Sets the replacement node.
    pub fn replace_with(mut self, node: Value) -> Self {
        self.replacement = Some(node);
        self
    }

    /// Attaches a completion.
    pub fn with_completion(mut self, completion: C) -> Self {
        self.completion = Some(completion);
        self
    }
}

/// Read-only view of the walker's position handed to visitors.
pub struct Visit<'a, 'm, T> {
    tracker: &'a Tracker<'m, T>,
}

impl<'a, 'm, T> Visit<'a, 'm, T> {
    /// Current state, `None` when off-road.
    pub fn state(&self) -> Option<StateId> {
        self.tracker.current()
    }

    /// Classification of the current position.
    pub fn site(&self) -> Site<'m, T> {
        self.tracker.site()
    }

    /// Structural path from the walk root.
    pub fn path(&self) -> &'a [PathSegment] {
        self.tracker.path()
    }

    /// JSON Pointer from the walk root.
    pub fn pointer(&self) -> JsonPointer {
        self.tracker.pointer()
    }
}

/// Callbacks driven by [`JsonStateWalker::walk`].
pub trait Visitor<T> {
    /// Value carried from a visit to its completion.
    type Completion;

    /// Visits one node.
    fn visit(
        &mut self,
        node: &Value,
        visit: &Visit<'_, '_, T>,
    ) -> NormalizeResult<Disposition<Self::Completion>>;

    /// Called once per completion after the node's subtree was processed.
    fn complete(
        &mut self,
        _completion: Self::Completion,
        _node: &mut Value,
        _visit: &Visit<'_, '_, T>,
    ) -> NormalizeResult<()> {
        Ok(())
    }
}

/// Adapts a closure into a [`Visitor`] without completions.
pub struct FnVisitor<F>(pub F);

impl<T, F> Visitor<T> for FnVisitor<F>
where
    F: FnMut(&Value, &Visit<'_, '_, T>) -> NormalizeResult<Disposition<()>>,
{
    type Completion = ();

    fn visit(&mut self, node: &Value, visit: &Visit<'_, '_, T>) -> NormalizeResult<Disposition<()>> {
        (self.0)(node, visit)
    }
}

/// Walks JSON trees while tracking a [`StateMachine`].
pub struct JsonStateWalker<'m, T> {
    machine: &'m StateMachine<T>,
    start: Option<StateId>,
    visit_anonymous: bool,
    visit_off_road: bool,
}

impl<'m, T> JsonStateWalker<'m, T> {
    /// Creates a walker that visits every node, starting at `start`.
    ///
    /// A `None` start walks the whole tree off-road.
    pub fn new(machine: &'m StateMachine<T>, start: impl Into<Option<StateId>>) -> Self {
        Self {
            machine,
            start: start.into(),
            visit_anonymous: true,
            visit_off_road: true,
        }
    }

    /// Whether nodes at anonymous states are visited (they are always descended).
    pub fn visit_anonymous(mut self, enabled: bool) -> Self {
        self.visit_anonymous = enabled;
        self
    }

    /// Whether off-road nodes are visited. Unvisited off-road nodes are not descended.
    pub fn visit_off_road(mut self, enabled: bool) -> Self {
        self.visit_off_road = enabled;
        self
    }

    /// Walks `root` in place.
    ///
    /// # Arguments
    ///
    /// * `root` - The tree; a replacement for the top node is written here.
    /// * `visitor` - Receives every eligible node.
    pub fn walk<V: Visitor<T>>(&self, root: &mut Value, visitor: &mut V) -> NormalizeResult<()> {
        let mut tracker = self.machine.tracker_from(self.start);
        self.walk_node(root, &mut tracker, visitor)
    }

    fn walk_node<V: Visitor<T>>(
        &self,
        node: &mut Value,
        tracker: &mut Tracker<'m, T>,
        visitor: &mut V,
    ) -> NormalizeResult<()> {
        let eligible = match tracker.site() {
            Site::Named(_) => true,
            Site::Anonymous => self.visit_anonymous,
            Site::OffRoad => self.visit_off_road,
        };
        if !eligible {
            if tracker.is_off_road() {
                return Ok(());
            }
            return self.walk_children(node, tracker, visitor);
        }

        let mut completions = Vec::new();
        loop {
            let disposition = visitor.visit(node, &Visit { tracker: &*tracker })?;
            let Disposition {
                mut action,
                replacement,
                completion,
            } = disposition;
            completions.extend(completion);
            match replacement {
                Some(new_node) if new_node != *node => *node = new_node,
                _ if action == Action::Revisit => action = Action::Descend,
                _ => {}
            }
            match action {
                Action::Revisit => continue,
                Action::Descend => {
                    self.walk_children(node, tracker, visitor)?;
                    break;
                }
                Action::Done => break,
            }
        }

        while let Some(completion) = completions.pop() {
            visitor.complete(completion, node, &Visit { tracker: &*tracker })?;
        }
        Ok(())
    }

    fn walk_children<V: Visitor<T>>(
        &self,
        node: &mut Value,
        tracker: &mut Tracker<'m, T>,
        visitor: &mut V,
    ) -> NormalizeResult<()> {
        match node {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    tracker.move_key(key);
                    self.walk_node(child, tracker, visitor)?;
                    tracker.backup(1)?;
                }
            }
            Value::Array(items) => {
                for (idx, child) in items.iter_mut().enumerate() {
                    tracker.move_index(idx);
                    self.walk_node(child, tracker, visitor)?;
                    tracker.backup(1)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::machine::StateMachineBuilder;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum S {
        Root,
        Obj,
        Item,
    }

    fn machine() -> (StateMachine<S>, StateId) {
        let mut b = StateMachineBuilder::new();
        let root = b.state(S::Root);
        let obj = b.state(S::Obj);
        let item = b.state(S::Item);
        b.transit(root, &["a"], obj).unwrap();
        b.transit(obj, &["list", "#"], item).unwrap();
        b.transit(obj, &["*"], obj).unwrap();
        (b.build(), root)
    }

    fn trace(walker: &JsonStateWalker<'_, S>, doc: &mut Value) -> Vec<String> {
        let mut seen = Vec::new();
        walker
            .walk(
                doc,
                &mut FnVisitor(|_: &Value, v: &Visit<'_, '_, S>| -> NormalizeResult<Disposition<()>> {
                    let site = match v.site() {
                        Site::Named(s) => format!("{:?}", s),
                        Site::Anonymous => "anon".into(),
                        Site::OffRoad => "off".into(),
                    };
                    seen.push(format!("{}:{}", v.pointer(), site));
                    Ok(Disposition::descend())
                }),
            )
            .unwrap();
        seen
    }

    #[test]
    fn test_simple_walk_order() {
        let (m, root) = machine();
        let mut doc = json!({"a": {"list": [1, 2], "b": {}}, "z": {"q": 1}});
        let seen = trace(&JsonStateWalker::new(&m, root), &mut doc);
        assert_eq!(
            seen,
            vec![
                ":Root",
                "/a:Obj",
                "/a/list:anon",
                "/a/list/0:Item",
                "/a/list/1:Item",
                "/a/b:Obj",
                "/z:off",
                "/z/q:off",
            ]
        );
    }

    #[test]
    fn test_suppressed_sites() {
        let (m, root) = machine();
        let mut doc = json!({"a": {"list": [1]}, "z": {"q": 1}});
        let walker = JsonStateWalker::new(&m, root)
            .visit_anonymous(false)
            .visit_off_road(false);
        let seen = trace(&walker, &mut doc);
        assert_eq!(seen, vec![":Root", "/a:Obj", "/a/list/0:Item"]);
    }

    #[test]
    fn test_prune_with_done() {
        let (m, root) = machine();
        let mut doc = json!({"a": {"b": {"c": {}}}});
        let mut seen = Vec::new();
        JsonStateWalker::new(&m, root)
            .walk(
                &mut doc,
                &mut FnVisitor(|_: &Value, v: &Visit<'_, '_, S>| -> NormalizeResult<Disposition<()>> {
                    seen.push(v.pointer().to_string());
                    if v.path().len() == 2 {
                        Ok(Disposition::done())
                    } else {
                        Ok(Disposition::descend())
                    }
                }),
            )
            .unwrap();
        assert_eq!(seen, vec!["", "/a", "/a/b"]);
    }

    #[test]
    fn test_replace_and_root_replacement() {
        let (m, root) = machine();
        let mut doc = json!({"a": {"x": 1}});
        JsonStateWalker::new(&m, root)
            .walk(
                &mut doc,
                &mut FnVisitor(|_: &Value, v: &Visit<'_, '_, S>| -> NormalizeResult<Disposition<()>> {
                    if v.pointer().to_string() == "/a/x" {
                        return Ok(Disposition::done_with(json!("replaced")));
                    }
                    Ok(Disposition::descend())
                }),
            )
            .unwrap();
        assert_eq!(doc, json!({"a": {"x": "replaced"}}));

        let mut top = json!({"old": true});
        JsonStateWalker::new(&m, root)
            .walk(
                &mut top,
                &mut FnVisitor(|_: &Value, _: &Visit<'_, '_, S>| -> NormalizeResult<Disposition<()>> {
                    Ok(Disposition::done_with(json!({"new": true})))
                }),
            )
            .unwrap();
        assert_eq!(top, json!({"new": true}));
    }

    #[test]
    fn test_revisit_and_degrade() {
        let (m, root) = machine();
        let mut doc = json!({"a": {"b": 1}});
        let mut seen = Vec::new();
        JsonStateWalker::new(&m, root)
            .walk(
                &mut doc,
                &mut FnVisitor(|node: &Value, v: &Visit<'_, '_, S>| -> NormalizeResult<Disposition<()>> {
                    seen.push(format!("{}={}", v.pointer(), node));
                    if node == &json!(1) {
                        return Ok(Disposition::revisit(json!(2)));
                    }
                    if node == &json!(2) {
                        // equal replacement degrades to a descend
                        return Ok(Disposition::revisit(json!(2)));
                    }
                    Ok(Disposition::descend())
                }),
            )
            .unwrap();
        assert_eq!(
            seen,
            vec![
                r#"={"a":{"b":1}}"#,
                r#"/a={"b":1}"#,
                "/a/b=1",
                "/a/b=2"
            ]
        );
        assert_eq!(doc, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_off_road_start() {
        let (m, _) = machine();
        let mut doc = json!({"a": {"list": [1]}});
        let seen = trace(&JsonStateWalker::new(&m, None::<StateId>), &mut doc);
        assert_eq!(seen, vec![":off", "/a:off", "/a/list:off", "/a/list/0:off"]);
    }

    struct Completing {
        log: Vec<String>,
    }

    impl Visitor<S> for Completing {
        type Completion = String;

        fn visit(
            &mut self,
            node: &Value,
            visit: &Visit<'_, '_, S>,
        ) -> NormalizeResult<Disposition<String>> {
            let here = visit.pointer().to_string();
            self.log.push(format!("visit {}", here));
            if node == &json!("first") {
                return Ok(Disposition::revisit(json!("second")).with_completion("outer".into()));
            }
            if node == &json!("second") {
                return Ok(Disposition::done().with_completion("inner".into()));
            }
            Ok(Disposition::descend().with_completion(format!("node {}", here)))
        }

        fn complete(
            &mut self,
            completion: String,
            node: &mut Value,
            _visit: &Visit<'_, '_, S>,
        ) -> NormalizeResult<()> {
            self.log.push(format!("complete {} ({})", completion, node));
            Ok(())
        }
    }

    #[test]
    fn test_completions_run_after_subtree_lifo() {
        let (m, root) = machine();
        let mut doc = json!({"a": "first"});
        let mut visitor = Completing { log: Vec::new() };
        JsonStateWalker::new(&m, root).walk(&mut doc, &mut visitor).unwrap();
        assert_eq!(
            visitor.log,
            vec![
                "visit ",
                "visit /a",
                "visit /a",
                r#"complete inner ("second")"#,
                r#"complete outer ("second")"#,
                r#"complete node  ({"a":"second"})"#,
            ]
        );
    }
}
