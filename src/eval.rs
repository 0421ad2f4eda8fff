//! Fixpoint evaluation of stratified rules.
//!
//! Rules are compiled on the fly into relational algebra: the body literals
//! are joined positionally, repeated variables and constants become a
//! selection, and the head becomes a projection (or an aggregation).

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use log::{debug, log_enabled, trace, Level};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::database::{FactsDatabase, PredicateWithArity, RulesDatabase};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::relation::{AggregationColumn, Column, Relation};
use crate::rule::{AggregationRule, Atom, BodyLiteral, CombinationRule, Constant, Rule, Variable};
use crate::stratify::stratify;

/// The fixpoint algorithm used for every stratum.
///
/// Both algorithms derive the same relations. Semi-naive evaluation only
/// joins against the tuples found in the previous round, which is usually
/// much cheaper on recursive rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Algorithm {
    /// Recompute every relation from scratch until nothing changes
    Naive,
    /// Only join against the tuples derived in the previous round
    #[default]
    SemiNaive,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Naive => f.write_str("naive"),
            Algorithm::SemiNaive => f.write_str("semi-naive"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "naive" => Ok(Algorithm::Naive),
            "semi-naive" => Ok(Algorithm::SemiNaive),
            other => Err(Error::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// What rule evaluation needs besides the relations themselves.
#[derive(Debug)]
pub(crate) struct Context<'a, T> {
    /// Constants spanning the domain of negation
    pub values: &'a [T],
    /// Arithmetic for aggregation
    pub domain: &'a dyn Domain<T>,
}

// Column layout of a list of atoms laid side by side.
struct Bindings<T> {
    selection: Vec<Vec<Column<T>>>,
    positions: IndexMap<Variable, usize>,
}

impl<T: Constant> Bindings<T> {
    fn new<'a>(atoms: impl IntoIterator<Item = &'a Atom<T>>) -> Self
    where
        T: 'a,
    {
        let mut occurrences: IndexMap<Variable, Vec<usize>> = IndexMap::new();
        let mut selection = Vec::new();
        for (index, atom) in atoms.into_iter().enumerate() {
            match atom {
                Atom::Variable(variable) => occurrences.entry(*variable).or_default().push(index),
                Atom::Value(value) => {
                    selection.push(vec![Column::Index(index), Column::Constant(value.clone())]);
                }
            }
        }

        selection.extend(
            occurrences
                .values()
                .filter(|indices| indices.len() > 1)
                .map(|indices| indices.iter().copied().map(Column::Index).collect()),
        );
        let positions = occurrences
            .into_iter()
            .map(|(variable, indices)| (variable, indices[0]))
            .collect();

        Self {
            selection,
            positions,
        }
    }

    // Rules are checked for groundedness before they are stored, so every
    // variable reaching evaluation is bound.
    fn position(&self, variable: Variable) -> usize {
        self.positions[&variable]
    }
}

/// Evaluates a single rule.
///
/// `source` provides the relation read by the body literal at each
/// position; negation is applied here, on top of what it returns.
pub(crate) fn eval_rule<'a, T, F>(
    rule: &Rule<T>,
    context: &Context<'_, T>,
    mut source: F,
) -> Result<Relation<T>>
where
    T: Constant + 'a,
    F: FnMut(usize, &BodyLiteral<T>) -> Cow<'a, Relation<T>>,
{
    match rule {
        Rule::Combination(rule) => {
            let inputs: Vec<_> = rule
                .body
                .iter()
                .enumerate()
                .map(|(position, literal)| read(context, &mut source, position, literal))
                .collect();
            combine(rule, &inputs)
        }
        Rule::Aggregation(rule) => {
            let input = read(context, &mut source, 0, &rule.clause);
            aggregate(rule, &input, context.domain)
        }
    }
}

fn read<'a, T, F>(
    context: &Context<'_, T>,
    source: &mut F,
    position: usize,
    literal: &BodyLiteral<T>,
) -> Cow<'a, Relation<T>>
where
    T: Constant + 'a,
    F: FnMut(usize, &BodyLiteral<T>) -> Cow<'a, Relation<T>>,
{
    let relation = source(position, literal);
    if literal.negated {
        Cow::Owned(relation.negated(context.values))
    } else {
        relation
    }
}

fn combine<T: Constant>(
    rule: &CombinationRule<T>,
    inputs: &[Cow<'_, Relation<T>>],
) -> Result<Relation<T>> {
    let joined = Relation::join_all(inputs.iter().map(|relation| &**relation))?;
    let bindings = Bindings::new(rule.body.iter().flat_map(|literal| &literal.atoms));
    let columns: Vec<Column<T>> = rule
        .head
        .atoms
        .iter()
        .map(|atom| match atom {
            Atom::Variable(variable) => Column::Index(bindings.position(*variable)),
            Atom::Value(value) => Column::Constant(value.clone()),
        })
        .collect();
    Ok(joined.select(&bindings.selection).project(&columns))
}

fn aggregate<T: Constant>(
    rule: &AggregationRule<T>,
    input: &Relation<T>,
    domain: &dyn Domain<T>,
) -> Result<Relation<T>> {
    let bindings = Bindings::new(&rule.clause.atoms);
    let aggregate = &rule.aggregate;
    let same: Vec<usize> = aggregate
        .same
        .iter()
        .map(|variable| bindings.position(*variable))
        .collect();
    let columns: Vec<usize> = aggregate
        .columns
        .iter()
        .map(|variable| bindings.position(*variable))
        .collect();
    let projection: Vec<AggregationColumn<T>> = rule
        .head
        .atoms
        .iter()
        .map(|atom| match atom {
            Atom::Variable(variable) if *variable == aggregate.result => {
                AggregationColumn::Aggregate
            }
            Atom::Variable(variable) => {
                AggregationColumn::Column(Column::Index(bindings.position(*variable)))
            }
            Atom::Value(value) => AggregationColumn::Column(Column::Constant(value.clone())),
        })
        .collect();

    input
        .select(&bindings.selection)
        .aggregate(&projection, &same, domain, aggregate.function, &columns)
}

// Applies every rule once and unions the results per head relation.
fn apply_all<'a, T, F>(
    rules: &RulesDatabase<T>,
    context: &Context<'_, T>,
    mut source: F,
) -> Result<FactsDatabase<T>>
where
    T: Constant + 'a,
    F: FnMut(usize, &BodyLiteral<T>) -> Cow<'a, Relation<T>>,
{
    let mut derived = FactsDatabase::new();
    for (key, key_rules) in rules.iter() {
        let mut relation = Relation::empty(key.arity);
        for rule in key_rules {
            relation = relation.union(&eval_rule(rule, context, &mut source)?);
        }
        derived.set(*key, relation);
    }
    Ok(derived)
}

/// Naive evaluation of one stratum.
///
/// Every round recomputes all relations of the stratum from the facts and
/// the previous round, until a round changes nothing. Returns the derived
/// relations only.
pub(crate) fn naive<T: Constant>(
    rules: &RulesDatabase<T>,
    facts: &FactsDatabase<T>,
    context: &Context<'_, T>,
) -> Result<FactsDatabase<T>> {
    let mut derived = FactsDatabase::new();
    let mut iteration = 0_usize;
    loop {
        iteration += 1;
        let known = facts.union(&derived);
        let next = apply_all(rules, context, |_, literal| known.get(&literal.key()))?;
        if next == derived {
            debug!("naive evaluation reached a fixpoint after {iteration} iterations");
            return Ok(derived);
        }
        trace_sizes(Algorithm::Naive, iteration, &next);
        derived = next;
    }
}

/// Semi-naive evaluation of one stratum.
///
/// The first round reads the facts only. Afterwards each rule is evaluated
/// once per positive literal over the stratum, reading the previous round's
/// new tuples at that position and the full relations everywhere else.
/// Returns the derived relations only.
pub(crate) fn semi_naive<T: Constant>(
    rules: &RulesDatabase<T>,
    facts: &FactsDatabase<T>,
    context: &Context<'_, T>,
) -> Result<FactsDatabase<T>> {
    let mut derived = apply_all(rules, context, |_, literal| facts.get(&literal.key()))?;
    let mut delta = derived.clone();
    let mut iteration = 0_usize;
    loop {
        iteration += 1;
        let known = facts.union(&derived);
        let mut next = FactsDatabase::new();
        for (key, key_rules) in rules.iter() {
            let mut relation = Relation::empty(key.arity);
            for rule in key_rules {
                for position in delta_positions(rule, rules) {
                    let found = eval_rule(rule, context, |index, literal| {
                        if index == position {
                            delta.get(&literal.key())
                        } else {
                            known.get(&literal.key())
                        }
                    })?;
                    relation = relation.union(&found);
                }
            }
            next.set(*key, relation.minus(&known.get(key)));
        }

        if next.is_empty() {
            debug!("semi-naive evaluation reached a fixpoint after {iteration} iterations");
            return Ok(derived);
        }
        trace_sizes(Algorithm::SemiNaive, iteration, &next);
        derived.extend(&next);
        delta = next;
    }
}

// Body positions that can see new tuples while the stratum is evaluated.
fn delta_positions<'r, T: Constant>(
    rule: &'r Rule<T>,
    stratum: &'r RulesDatabase<T>,
) -> impl Iterator<Item = usize> + 'r {
    rule.body()
        .iter()
        .enumerate()
        .filter(move |(_, literal)| !literal.negated && stratum.contains(&literal.key()))
        .map(|(position, _)| position)
}

fn trace_sizes<T: Constant>(algorithm: Algorithm, iteration: usize, relations: &FactsDatabase<T>) {
    if log_enabled!(Level::Trace) {
        for key in relations.keys() {
            trace!(
                "{algorithm} iteration {iteration}: {key} has {} new tuples",
                relations.get(key).len()
            );
        }
    }
}

/// Evaluates every stratum `target` depends on, in order.
///
/// Returns `facts` extended with every relation derived on the way.
pub(crate) fn stratified<T: Constant>(
    target: PredicateWithArity,
    rules: &RulesDatabase<T>,
    facts: &FactsDatabase<T>,
    context: &Context<'_, T>,
    algorithm: Algorithm,
) -> Result<FactsDatabase<T>> {
    let strata = stratify(rules, target)?;
    let mut facts = facts.clone();
    for (index, stratum) in strata.iter().enumerate() {
        let stratum_rules = rules.filter(stratum);
        if stratum_rules.is_empty() {
            continue;
        }
        debug!(
            "evaluating stratum {index} ({} relations) with {algorithm} evaluation",
            stratum_rules.len()
        );
        let derived = match algorithm {
            Algorithm::Naive => naive(&stratum_rules, &facts, context)?,
            Algorithm::SemiNaive => semi_naive(&stratum_rules, &facts, context)?,
        };
        facts.extend(&derived);
    }
    Ok(facts)
}
