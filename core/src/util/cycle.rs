//! # Cycle Detection
//!
//! Tracks the set of objects currently "being visited" during a recursive
//! process. Re-entering an active object is a cycle, reported either as a
//! `false` return or as a [`CycleError`].

use derive_more::Display;
use indexmap::{IndexMap, IndexSet};
use std::fmt::Debug;
use std::hash::Hash;

/// How visited objects are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equality {
    /// `Eq`/`Hash` equality.
    Value,
    /// Same address in memory.
    Identity,
}

/// What happens when an active object is visited again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// `visit` returns `Ok(false)`.
    Report,
    /// `visit` returns `Err(CycleError)`.
    Fail,
}

/// A revisit of an active object, raised in [`FailureMode::Fail`].
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("Cycle detected at {_0}")]
pub struct CycleError(pub String);

impl std::error::Error for CycleError {}

/// Active-visit set.
#[derive(Debug)]
pub struct CycleDetector<K> {
    equality: Equality,
    failure: FailureMode,
    by_value: IndexSet<K>,
    by_address: IndexMap<usize, K>,
}

impl<K: Eq + Hash + Clone + Debug> Default for CycleDetector<K> {
    fn default() -> Self {
        Self::new(Equality::Value, FailureMode::Report)
    }
}

impl<K: Eq + Hash + Clone + Debug> CycleDetector<K> {
    /// Creates a detector.
    pub fn new(equality: Equality, failure: FailureMode) -> Self {
        Self {
            equality,
            failure,
            by_value: IndexSet::new(),
            by_address: IndexMap::new(),
        }
    }

    /// Marks `key` active.
    ///
    /// Returns `Ok(true)` for a fresh visit. A repeat visit yields `Ok(false)`
    /// or a [`CycleError`], per the failure mode, and leaves the set unchanged.
    pub fn visit(&mut self, key: &K) -> Result<bool, CycleError> {
        let fresh = match self.equality {
            Equality::Value => self.by_value.insert(key.clone()),
            Equality::Identity => {
                let addr = address(key);
                if self.by_address.contains_key(&addr) {
                    false
                } else {
                    self.by_address.insert(addr, key.clone());
                    true
                }
            }
        };
        match (fresh, self.failure) {
            (true, _) => Ok(true),
            (false, FailureMode::Report) => Ok(false),
            (false, FailureMode::Fail) => Err(CycleError(format!("{:?}", key))),
        }
    }

    /// Marks `key` inactive. Returns whether it was active.
    pub fn unvisit(&mut self, key: &K) -> bool {
        match self.equality {
            Equality::Value => self.by_value.shift_remove(key),
            Equality::Identity => self.by_address.shift_remove(&address(key)).is_some(),
        }
    }

    /// Whether `key` is currently active.
    pub fn is_active(&self, key: &K) -> bool {
        match self.equality {
            Equality::Value => self.by_value.contains(key),
            Equality::Identity => self.by_address.contains_key(&address(key)),
        }
    }

    /// Active objects in the order they were visited.
    pub fn active_visits(&self) -> Vec<&K> {
        match self.equality {
            Equality::Value => self.by_value.iter().collect(),
            Equality::Identity => self.by_address.values().collect(),
        }
    }

    /// Visits `key` for the lifetime of the returned guard.
    ///
    /// Returns `Ok(None)` on a repeat visit in [`FailureMode::Report`].
    pub fn enter(&mut self, key: &K) -> Result<Option<Visitation<'_, K>>, CycleError> {
        if self.visit(key)? {
            Ok(Some(Visitation {
                detector: self,
                key: key.clone(),
                addr: address(key),
            }))
        } else {
            Ok(None)
        }
    }
}

fn address<K>(key: &K) -> usize {
    key as *const K as usize
}

/// Scoped visit; unvisits on drop.
pub struct Visitation<'d, K: Eq + Hash + Clone + Debug> {
    detector: &'d mut CycleDetector<K>,
    key: K,
    addr: usize,
}

impl<K: Eq + Hash + Clone + Debug> Visitation<'_, K> {
    /// The detector, for nested visits.
    pub fn detector(&mut self) -> &mut CycleDetector<K> {
        self.detector
    }
}

impl<K: Eq + Hash + Clone + Debug> Drop for Visitation<'_, K> {
    fn drop(&mut self) {
        match self.detector.equality {
            Equality::Value => {
                self.detector.by_value.shift_remove(&self.key);
            }
            Equality::Identity => {
                self.detector.by_address.shift_remove(&self.addr);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality_report_mode() {
        let mut cd = CycleDetector::default();
        assert_eq!(cd.visit(&"a".to_string()), Ok(true));
        assert_eq!(cd.visit(&"b".to_string()), Ok(true));
        assert_eq!(cd.visit(&"a".to_string()), Ok(false));
        assert_eq!(cd.active_visits(), vec!["a", "b"]);
        assert!(cd.unvisit(&"a".to_string()));
        assert!(!cd.unvisit(&"a".to_string()));
        assert_eq!(cd.visit(&"a".to_string()), Ok(true));
    }

    #[test]
    fn test_fail_mode() {
        let mut cd = CycleDetector::new(Equality::Value, FailureMode::Fail);
        cd.visit(&1).unwrap();
        let err = cd.visit(&1).unwrap_err();
        assert_eq!(err.to_string(), "Cycle detected at 1");
    }

    #[test]
    fn test_identity_equality() {
        let first = vec![1];
        let second = vec![1];
        let mut cd = CycleDetector::new(Equality::Identity, FailureMode::Report);
        assert_eq!(cd.visit(&first), Ok(true));
        assert_eq!(cd.visit(&second), Ok(true));
        assert_eq!(cd.visit(&first), Ok(false));
        assert!(cd.unvisit(&first));
        assert!(cd.is_active(&second));
        assert!(!cd.is_active(&first));
    }

    #[test]
    fn test_visitation_guard_unvisits_on_drop() {
        let mut cd = CycleDetector::default();
        {
            let mut outer = cd.enter(&"x").unwrap().unwrap();
            assert!(outer.detector().enter(&"x").unwrap().is_none());
            {
                let _inner = outer.detector().enter(&"y").unwrap().unwrap();
            }
            assert_eq!(outer.detector().active_visits(), vec![&"x"]);
        }
        assert!(cd.active_visits().is_empty());
    }
}
