use indexmap::IndexSet;
use log::debug;

use crate::database::{FactsDatabase, PredicateWithArity, RulesDatabase};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::eval::{stratified, Algorithm, Context};
use crate::relation::Relation;
use crate::rule::{
    validate_aggregate, Atom, Constant, Fact, HeadLiteral, Predicate, Rule, RuleBuilder, Variable,
};
use crate::safety::check;

/// Collects the rules and facts of a program.
///
/// Predicates and variables are minted by the builder, so identifiers never
/// collide within one program. Every rule is checked when it is added; a
/// rejected rule leaves the builder unchanged.
#[derive(Debug, Clone)]
pub struct ProgramBuilder<T> {
    algorithm: Algorithm,
    next_predicate: u32,
    next_variable: u32,
    rules: Vec<Rule<T>>,
    facts: FactsDatabase<T>,
    constants: IndexSet<T>,
}

impl<T: Constant> Default for ProgramBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Constant> ProgramBuilder<T> {
    /// Create a builder for a program evaluated semi-naively
    #[must_use]
    pub fn new() -> Self {
        Self::with_algorithm(Algorithm::default())
    }

    /// Create a builder for a program evaluated with `algorithm`
    #[must_use]
    pub fn with_algorithm(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            next_predicate: 0,
            next_variable: 0,
            rules: Vec::new(),
            facts: FactsDatabase::new(),
            constants: IndexSet::new(),
        }
    }

    /// Mints a fresh predicate.
    ///
    /// # Panics
    ///
    /// Panics once every `u32` identifier has been handed out.
    pub fn predicate(&mut self) -> Predicate {
        assert!(
            self.next_predicate < u32::MAX,
            "predicate identifiers exhausted"
        );
        let predicate = Predicate::new(self.next_predicate);
        self.next_predicate += 1;
        predicate
    }

    /// Mints a fresh variable.
    ///
    /// # Panics
    ///
    /// Panics once every `u32` identifier has been handed out.
    pub fn variable(&mut self) -> Variable {
        assert!(
            self.next_variable < u32::MAX,
            "variable identifiers exhausted"
        );
        let variable = Variable::new(self.next_variable);
        self.next_variable += 1;
        variable
    }

    /// Adds constants to the domain negation ranges over.
    ///
    /// Constants written in rules and facts are part of the domain already;
    /// this is only needed for values that only aggregation produces.
    pub fn constants(&mut self, values: impl IntoIterator<Item = T>) -> &mut Self {
        self.constants.extend(values);
        self
    }

    /// Adds the rule `predicate(atoms) :- body`.
    ///
    /// `body` receives a [`RuleBuilder`] to declare the body literals and the
    /// optional aggregate.
    ///
    /// # Errors
    ///
    /// Fails if the aggregate is malformed or a variable is not grounded, and
    /// with [`Error::PredicateOverflow`] if a predicate has the largest identifier.
    pub fn rule<F>(
        &mut self,
        predicate: Predicate,
        atoms: Vec<Atom<T>>,
        body: F,
    ) -> Result<&mut Self>
    where
        F: FnOnce(&mut RuleBuilder<T>),
    {
        let mut builder = RuleBuilder::new();
        body(&mut builder);
        let rule = builder.build(HeadLiteral::new(predicate, atoms))?;
        self.add_rule(rule)
    }

    /// Adds the fact `predicate(values)`.
    ///
    /// # Errors
    ///
    /// Runs the checks of [`ProgramBuilder::add_rule`]. A head made of values
    /// only fails them when `predicate` has the largest identifier.
    pub fn fact(
        &mut self,
        predicate: Predicate,
        values: impl IntoIterator<Item = T>,
    ) -> Result<&mut Self> {
        let atoms = values.into_iter().map(Atom::Value).collect();
        self.rule(predicate, atoms, |_| {})
    }

    /// Adds many facts of `predicate` at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArityMismatch`](crate::Error::ArityMismatch) if a row
    /// does not have `arity` values, and [`Error::PredicateOverflow`] if
    /// `predicate` has the largest identifier. No row is added in either case.
    pub fn facts<I, F>(&mut self, predicate: Predicate, arity: usize, rows: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = F>,
        F: IntoIterator<Item = T>,
    {
        let relation = Relation::from_facts(arity, rows)?;
        self.reserve([predicate])?;
        self.facts.merge(PredicateWithArity::new(predicate, arity), &relation);
        Ok(self)
    }

    /// Adds a rule built elsewhere, e.g. parsed or deserialized.
    ///
    /// # Errors
    ///
    /// Fails if the aggregate is malformed or a variable is not grounded, and
    /// with [`Error::PredicateOverflow`] if a predicate has the largest
    /// identifier, since no fresh predicate could be minted after it.
    pub fn add_rule(&mut self, rule: Rule<T>) -> Result<&mut Self> {
        if let Rule::Aggregation(aggregation) = &rule {
            validate_aggregate(&aggregation.head, &aggregation.aggregate)?;
        }
        check(&rule)?;

        let body = rule.body().iter().map(|literal| literal.predicate);
        self.reserve(std::iter::once(rule.head().predicate).chain(body))?;

        if rule.is_fact() {
            let head = rule.head();
            let values = head.atoms.iter().filter_map(Atom::as_value).cloned();
            self.facts.insert(head.key(), values)?;
        } else {
            self.rules.push(rule);
        }
        Ok(self)
    }

    // Predicates of rules built elsewhere must not be minted again.
    fn reserve(&mut self, predicates: impl IntoIterator<Item = Predicate>) -> Result<()> {
        let mut next = self.next_predicate;
        for predicate in predicates {
            let after = predicate
                .id()
                .checked_add(1)
                .ok_or(Error::PredicateOverflow(predicate))?;
            next = next.max(after);
        }
        self.next_predicate = next;
        Ok(())
    }

    /// Freezes the builder into a program using `domain` for aggregation.
    pub fn build(self, domain: impl Domain<T> + 'static) -> Program<T> {
        let mut values = self.constants;
        for rule in &self.rules {
            let body = rule.body().iter().flat_map(|literal| &literal.atoms);
            let atoms = rule.head().atoms.iter().chain(body);
            values.extend(atoms.filter_map(Atom::as_value).cloned());
        }
        for key in self.facts.keys() {
            values.extend(self.facts.get(key).iter().flatten().cloned());
        }

        let count = self.rules.len();
        let rules: RulesDatabase<T> = self.rules.into_iter().collect();
        debug!(
            "built program: {count} rules for {} relations, {} fact relations, {} constants, {} evaluation",
            rules.len(),
            self.facts.keys().count(),
            values.len(),
            self.algorithm
        );

        Program {
            rules,
            facts: self.facts,
            values: values.into_iter().collect(),
            domain: Box::new(domain),
            algorithm: self.algorithm,
        }
    }
}

/// A frozen program, ready to answer queries.
///
/// Solving never changes the program: every call starts again from the
/// facts it was built with.
#[derive(Debug)]
pub struct Program<T> {
    rules: RulesDatabase<T>,
    facts: FactsDatabase<T>,
    values: Vec<T>,
    domain: Box<dyn Domain<T>>,
    algorithm: Algorithm,
}

impl<T: Constant> Program<T> {
    /// Every fact of `predicate` at `arity`, with the program's algorithm.
    ///
    /// # Errors
    ///
    /// Fails if the relations the query depends on cannot be stratified, or
    /// if the domain cannot perform an aggregation.
    pub fn solve(&self, predicate: Predicate, arity: usize) -> Result<IndexSet<Fact<T>>> {
        self.solve_with(predicate, arity, self.algorithm)
    }

    /// Every fact of `predicate` at `arity`, with the given algorithm.
    ///
    /// # Errors
    ///
    /// See [`Program::solve`].
    pub fn solve_with(
        &self,
        predicate: Predicate,
        arity: usize,
        algorithm: Algorithm,
    ) -> Result<IndexSet<Fact<T>>> {
        let target = PredicateWithArity::new(predicate, arity);
        if !self.rules.contains(&target) {
            debug!("{target} has no rules, reading its facts");
            return Ok(self.facts.get(&target).iter().map(<[T]>::to_vec).collect());
        }

        debug!("solving {target} with {algorithm} evaluation");
        let context = Context {
            values: &self.values,
            domain: self.domain.as_ref(),
        };
        let solved = stratified(target, &self.rules, &self.facts, &context, algorithm)?;
        let facts: IndexSet<Fact<T>> = solved.get(&target).iter().map(<[T]>::to_vec).collect();
        debug!("{target} has {} facts", facts.len());
        Ok(facts)
    }

    /// The algorithm [`Program::solve`] uses.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The derivation rules, by head relation.
    #[must_use]
    pub fn rules(&self) -> &RulesDatabase<T> {
        &self.rules
    }

    /// The base facts.
    #[must_use]
    pub fn facts(&self) -> &FactsDatabase<T> {
        &self.facts
    }
}
