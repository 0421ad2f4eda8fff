//! Rules and facts, keyed by predicate and arity.

use std::borrow::Cow;
use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::error::Result;
use crate::relation::Relation;
use crate::rule::{Constant, Predicate, Rule};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A predicate together with the arity it is used at.
///
/// This is the key of every relation: `a(1)` and `a(1, 1)` are unrelated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PredicateWithArity {
    /// The predicate symbol
    pub predicate: Predicate,
    /// The number of columns
    pub arity: usize,
}

impl PredicateWithArity {
    /// Pairs a predicate with an arity.
    #[must_use]
    pub const fn new(predicate: Predicate, arity: usize) -> Self {
        Self { predicate, arity }
    }
}

impl fmt::Display for PredicateWithArity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.predicate, self.arity)
    }
}

/// The derivation rules of a program, grouped by head relation.
#[derive(Debug, Clone)]
pub struct RulesDatabase<T> {
    rules: IndexMap<PredicateWithArity, IndexSet<Rule<T>>>,
}

impl<T> Default for RulesDatabase<T> {
    fn default() -> Self {
        Self {
            rules: IndexMap::new(),
        }
    }
}

impl<T: Constant> RulesDatabase<T> {
    /// Files a rule under its head relation.
    fn insert(&mut self, rule: Rule<T>) {
        self.rules.entry(rule.head().key()).or_default().insert(rule);
    }

    /// The rules deriving `key`; empty if there are none.
    pub fn get(&self, key: &PredicateWithArity) -> impl Iterator<Item = &Rule<T>> + '_ {
        self.rules.get(key).into_iter().flatten()
    }

    /// Whether any rule derives `key`.
    #[must_use]
    pub fn contains(&self, key: &PredicateWithArity) -> bool {
        self.rules.contains_key(key)
    }

    /// Relations derived by at least one rule.
    pub fn keys(&self) -> impl Iterator<Item = &PredicateWithArity> + '_ {
        self.rules.keys()
    }

    /// Relations with their rules.
    pub fn iter(&self) -> impl Iterator<Item = (&PredicateWithArity, &IndexSet<Rule<T>>)> + '_ {
        self.rules.iter()
    }

    /// Number of derived relations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The same database restricted to the given relations.
    #[must_use]
    pub fn filter(&self, keys: &IndexSet<PredicateWithArity>) -> Self {
        Self {
            rules: self
                .rules
                .iter()
                .filter(|(key, _)| keys.contains(*key))
                .map(|(key, rules)| (*key, rules.clone()))
                .collect(),
        }
    }
}

impl<T: Constant> FromIterator<Rule<T>> for RulesDatabase<T> {
    fn from_iter<I: IntoIterator<Item = Rule<T>>>(iter: I) -> Self {
        let mut database = Self::default();
        for rule in iter {
            database.insert(rule);
        }
        database
    }
}

/// Relations of facts, keyed by predicate and arity.
///
/// Missing keys read as the empty relation of their arity.
#[derive(Debug, Clone)]
pub struct FactsDatabase<T> {
    relations: IndexMap<PredicateWithArity, Relation<T>>,
}

impl<T> Default for FactsDatabase<T> {
    fn default() -> Self {
        Self {
            relations: IndexMap::new(),
        }
    }
}

impl<T: Constant> FactsDatabase<T> {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The relation stored under `key`.
    #[must_use]
    pub fn get(&self, key: &PredicateWithArity) -> Cow<'_, Relation<T>> {
        match self.relations.get(key) {
            Some(relation) => Cow::Borrowed(relation),
            None => Cow::Owned(Relation::empty(key.arity)),
        }
    }

    /// Whether anything was ever stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &PredicateWithArity) -> bool {
        self.relations.contains_key(key)
    }

    /// Keys with a stored relation.
    pub fn keys(&self) -> impl Iterator<Item = &PredicateWithArity> + '_ {
        self.relations.keys()
    }

    /// Whether every stored relation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.values().all(Relation::is_empty)
    }

    /// Adds one fact to the relation under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArityMismatch`](crate::Error::ArityMismatch) if the
    /// fact does not have `key.arity` values.
    pub fn insert(
        &mut self,
        key: PredicateWithArity,
        fact: impl IntoIterator<Item = T>,
    ) -> Result<()> {
        let fact = Relation::from_facts(key.arity, [fact])?;
        self.merge(key, &fact);
        Ok(())
    }

    /// Replaces the relation under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the relation's arity differs from `key.arity`.
    pub fn set(&mut self, key: PredicateWithArity, relation: Relation<T>) {
        assert_eq!(
            key.arity,
            relation.arity(),
            "relation stored under a key of another arity"
        );
        self.relations.insert(key, relation);
    }

    /// Adds every row of `relation` to the relation under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the relation's arity differs from `key.arity`.
    pub fn merge(&mut self, key: PredicateWithArity, relation: &Relation<T>) {
        assert_eq!(
            key.arity,
            relation.arity(),
            "relation stored under a key of another arity"
        );
        match self.relations.get_mut(&key) {
            Some(existing) => existing.extend(relation),
            None => {
                self.relations.insert(key, relation.clone());
            }
        }
    }

    /// Merges every relation of `other` into this database.
    pub fn extend(&mut self, other: &Self) {
        for (key, relation) in &other.relations {
            self.merge(*key, relation);
        }
    }

    /// Both databases merged relation-wise.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.extend(other);
        result
    }
}

impl<T: Constant> FromIterator<(PredicateWithArity, Relation<T>)> for FactsDatabase<T> {
    fn from_iter<I: IntoIterator<Item = (PredicateWithArity, Relation<T>)>>(iter: I) -> Self {
        let mut database = Self::default();
        for (key, relation) in iter {
            database.set(key, relation);
        }
        database
    }
}

impl<T: Constant> PartialEq for FactsDatabase<T> {
    fn eq(&self, other: &Self) -> bool {
        self.keys()
            .chain(other.keys())
            .all(|key| self.get(key) == other.get(key))
    }
}

impl<T: Constant> Eq for FactsDatabase<T> {}
