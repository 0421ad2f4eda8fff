use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;

use crate::database::PredicateWithArity;
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bounds shared by every constant type a program can hold.
pub trait Constant: Clone + Eq + Hash + fmt::Debug {}

impl<T: Clone + Eq + Hash + fmt::Debug> Constant for T {}

/// An opaque predicate symbol, minted by a [`ProgramBuilder`](crate::ProgramBuilder).
///
/// The same symbol used at two arities names two unrelated relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Predicate(u32);

impl Predicate {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A variable, scoped to the single rule it appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Variable(u32);

impl Variable {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A single position of a literal: either a bound constant or a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Atom<T> {
    /// A constant (e.g. `1`, `"alice"`)
    Value(T),
    /// A variable which gets bound during evaluation
    Variable(Variable),
}

impl<T> Atom<T> {
    /// Returns the constant, if this atom is one.
    #[must_use]
    pub fn as_value(&self) -> Option<&T> {
        match self {
            Atom::Value(value) => Some(value),
            Atom::Variable(_) => None,
        }
    }

    /// Returns the variable, if this atom is one.
    #[must_use]
    pub fn as_variable(&self) -> Option<Variable> {
        match self {
            Atom::Variable(variable) => Some(*variable),
            Atom::Value(_) => None,
        }
    }
}

impl<T> From<Variable> for Atom<T> {
    fn from(variable: Variable) -> Self {
        Atom::Variable(variable)
    }
}

/// A derived fact: one constant per column.
pub type Fact<T> = Vec<T>;

/// The head of a rule (e.g. `path(x, y)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeadLiteral<T> {
    /// The predicate the rule derives facts for
    pub predicate: Predicate,
    /// The pattern of the derived facts
    pub atoms: Vec<Atom<T>>,
}

impl<T> HeadLiteral<T> {
    /// Creates a head literal.
    #[must_use]
    pub fn new(predicate: Predicate, atoms: Vec<Atom<T>>) -> Self {
        Self { predicate, atoms }
    }

    /// Number of atoms.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.atoms.len()
    }

    /// The relation this literal names.
    #[must_use]
    pub fn key(&self) -> PredicateWithArity {
        PredicateWithArity::new(self.predicate, self.arity())
    }
}

/// A literal in a rule body, possibly negated (e.g. `!tc(x, y)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyLiteral<T> {
    /// The predicate to match against
    pub predicate: Predicate,
    /// The pattern to match
    pub atoms: Vec<Atom<T>>,
    /// Whether the pattern must be absent rather than present
    pub negated: bool,
}

impl<T> BodyLiteral<T> {
    /// Creates a body literal.
    #[must_use]
    pub fn new(predicate: Predicate, atoms: Vec<Atom<T>>, negated: bool) -> Self {
        Self {
            predicate,
            atoms,
            negated,
        }
    }

    /// Number of atoms.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.atoms.len()
    }

    /// The relation this literal reads.
    #[must_use]
    pub fn key(&self) -> PredicateWithArity {
        PredicateWithArity::new(self.predicate, self.arity())
    }

    /// Variables of the literal, in order of appearance (with repetitions).
    pub fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.atoms.iter().filter_map(Atom::as_variable)
    }
}

/// The function an [`AggregationRule`] folds its groups with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AggregationFunction {
    /// Number of distinct rows in the group
    Count,
    /// Sum of the aggregated columns
    Sum,
    /// Smallest value of the aggregated columns
    Min,
    /// Largest value of the aggregated columns
    Max,
}

impl fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregationFunction::Count => "count",
            AggregationFunction::Sum => "sum",
            AggregationFunction::Min => "min",
            AggregationFunction::Max => "max",
        };
        f.write_str(name)
    }
}

/// An aggregate declaration: `function((same...), (columns...), result)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aggregate {
    /// The fold applied to each group
    pub function: AggregationFunction,
    /// Variables forming the grouping key
    pub same: BTreeSet<Variable>,
    /// Variables whose values are folded
    pub columns: BTreeSet<Variable>,
    /// Variable receiving the folded value
    pub result: Variable,
}

impl Aggregate {
    /// Creates an aggregate declaration.
    pub fn new(
        function: AggregationFunction,
        same: impl IntoIterator<Item = Variable>,
        columns: impl IntoIterator<Item = Variable>,
        result: Variable,
    ) -> Self {
        Self {
            function,
            same: same.into_iter().collect(),
            columns: columns.into_iter().collect(),
            result,
        }
    }
}

/// A rule deriving facts from the join of its body literals.
///
/// A rule with an empty body is a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CombinationRule<T> {
    /// The conclusion of the rule
    pub head: HeadLiteral<T>,
    /// The conditions of the rule
    pub body: Vec<BodyLiteral<T>>,
}

/// A rule deriving facts by aggregating the rows of a single clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AggregationRule<T> {
    /// The conclusion of the rule
    pub head: HeadLiteral<T>,
    /// The clause whose rows are aggregated
    pub clause: BodyLiteral<T>,
    /// How the rows are grouped and folded
    pub aggregate: Aggregate,
}

/// A derivation rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Rule<T> {
    /// Join, select and project
    Combination(CombinationRule<T>),
    /// Group and fold
    Aggregation(AggregationRule<T>),
}

impl<T> Rule<T> {
    /// The head of the rule.
    #[must_use]
    pub fn head(&self) -> &HeadLiteral<T> {
        match self {
            Rule::Combination(rule) => &rule.head,
            Rule::Aggregation(rule) => &rule.head,
        }
    }

    /// The body of the rule. Aggregation rules have exactly one literal.
    #[must_use]
    pub fn body(&self) -> &[BodyLiteral<T>] {
        match self {
            Rule::Combination(rule) => &rule.body,
            Rule::Aggregation(rule) => std::slice::from_ref(&rule.clause),
        }
    }

    /// Whether the rule is a fact, i.e. a combination rule without body.
    #[must_use]
    pub fn is_fact(&self) -> bool {
        matches!(self, Rule::Combination(rule) if rule.body.is_empty())
    }
}

/// Accumulates the body of a rule before freezing it into a [`Rule`].
#[derive(Debug, Clone)]
pub struct RuleBuilder<T> {
    literals: Vec<BodyLiteral<T>>,
    aggregates: Vec<Aggregate>,
}

impl<T> Default for RuleBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RuleBuilder<T> {
    /// Creates a builder with an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            literals: Vec::new(),
            aggregates: Vec::new(),
        }
    }

    /// Adds a body literal.
    pub fn literal(
        &mut self,
        predicate: Predicate,
        atoms: Vec<Atom<T>>,
        negated: bool,
    ) -> &mut Self {
        self.literals.push(BodyLiteral::new(predicate, atoms, negated));
        self
    }

    /// Declares the aggregate of the rule.
    pub fn aggregate(
        &mut self,
        function: AggregationFunction,
        same: impl IntoIterator<Item = Variable>,
        columns: impl IntoIterator<Item = Variable>,
        result: Variable,
    ) -> &mut Self {
        self.aggregates
            .push(Aggregate::new(function, same, columns, result));
        self
    }

    /// Freezes the builder into a rule with the given head.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedAggregation`] if an aggregate was declared
    /// without exactly one body literal, if more than one aggregate was
    /// declared, or if the aggregate itself is inconsistent with the head.
    pub fn build(mut self, head: HeadLiteral<T>) -> Result<Rule<T>> {
        let Some(aggregate) = self.aggregates.pop() else {
            return Ok(Rule::Combination(CombinationRule {
                head,
                body: self.literals,
            }));
        };
        if !self.aggregates.is_empty() {
            return Err(Error::MalformedAggregation(format!(
                "expected exactly one aggregate, found {}",
                self.aggregates.len() + 1
            )));
        }
        let clause = match (self.literals.pop(), self.literals.is_empty()) {
            (Some(clause), true) => clause,
            (clause, _) => {
                return Err(Error::MalformedAggregation(format!(
                    "expected exactly one body literal, found {}",
                    self.literals.len() + usize::from(clause.is_some())
                )));
            }
        };
        validate_aggregate(&head, &aggregate)?;
        Ok(Rule::Aggregation(AggregationRule {
            head,
            clause,
            aggregate,
        }))
    }
}

/// Checks an aggregate against the head it feeds.
pub(crate) fn validate_aggregate<T>(head: &HeadLiteral<T>, aggregate: &Aggregate) -> Result<()> {
    if let Some(variable) = aggregate.same.intersection(&aggregate.columns).next() {
        return Err(Error::MalformedAggregation(format!(
            "{variable} is both grouped and aggregated"
        )));
    }
    if aggregate.same.contains(&aggregate.result) || aggregate.columns.contains(&aggregate.result) {
        return Err(Error::MalformedAggregation(format!(
            "result {} is also grouped or aggregated",
            aggregate.result
        )));
    }
    if aggregate.function != AggregationFunction::Count && aggregate.columns.is_empty() {
        return Err(Error::MalformedAggregation(format!(
            "{} needs at least one column",
            aggregate.function
        )));
    }
    for variable in head.atoms.iter().filter_map(Atom::as_variable) {
        if variable != aggregate.result && !aggregate.same.contains(&variable) {
            return Err(Error::MalformedAggregation(format!(
                "head variable {variable} is neither grouped nor the result"
            )));
        }
    }
    Ok(())
}
