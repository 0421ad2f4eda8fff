//! # Stratalog
//!
//! An in-memory Datalog engine with stratified negation and aggregation.
//!
//! ## Features
//!
//! - Recursive rules, evaluated naively or semi-naively
//! - Negated body literals, ranging over the constants of the program
//! - `min`, `max`, `sum` and `count` aggregation, grouped by variables
//! - Groundedness and stratification checks with typed errors
//! - A textual rule syntax behind the `parsing` feature
//!
//! ## Example
//!
//! ```rust
//! use stratalog::{NumberDomain, ProgramBuilder};
//!
//! # fn main() -> stratalog::Result<()> {
//! let mut builder = ProgramBuilder::<i64>::new();
//! let edge = builder.predicate();
//! let path = builder.predicate();
//! let (x, y, z) = (builder.variable(), builder.variable(), builder.variable());
//!
//! builder.facts(edge, 2, [[1, 2], [2, 3]])?;
//! builder.rule(path, vec![x.into(), y.into()], |body| {
//!     body.literal(edge, vec![x.into(), y.into()], false);
//! })?;
//! builder.rule(path, vec![x.into(), z.into()], |body| {
//!     body.literal(path, vec![x.into(), y.into()], false)
//!         .literal(edge, vec![y.into(), z.into()], false);
//! })?;
//!
//! let program = builder.build(NumberDomain);
//! let paths = program.solve(path, 2)?;
//! assert_eq!(paths.len(), 3);
//! assert!(paths.contains(&vec![1, 3]));
//! # Ok(())
//! # }
//! ```

mod database;
mod domain;
mod engine;
mod error;
mod eval;
mod graph;
#[cfg(feature = "parsing")]
mod parser;
mod relation;
mod rule;
pub mod safety;
pub mod stratify;

pub use database::{FactsDatabase, PredicateWithArity, RulesDatabase};
pub use domain::{Domain, NumberDomain, StringDomain};
pub use engine::{Program, ProgramBuilder};
pub use error::{Error, Result};
pub use eval::Algorithm;
#[cfg(feature = "parsing")]
pub use parser::Parser;
pub use relation::{AggregationColumn, Column, Relation, Tuple};
pub use rule::{
    Aggregate, AggregationFunction, AggregationRule, Atom, BodyLiteral, CombinationRule, Constant,
    Fact, HeadLiteral, Predicate, Rule, RuleBuilder, Variable,
};
