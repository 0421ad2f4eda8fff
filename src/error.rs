//! Error types

use thiserror::Error;

use crate::database::PredicateWithArity;
use crate::rule::{Predicate, Variable};

/// Errors raised while building or solving a program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A variable is not bound by any positive body literal (or aggregate result)
    #[error("variable {variable} in a rule for {predicate} is not grounded")]
    NotGrounded {
        /// Head predicate of the offending rule
        predicate: Predicate,
        /// The unbound variable
        variable: Variable,
    },

    /// An aggregation rule does not have the expected shape
    #[error("malformed aggregation rule: {0}")]
    MalformedAggregation(String),

    /// A fact does not have as many values as its relation has columns
    #[error("arity mismatch: expected {expected} values, found {found}")]
    ArityMismatch {
        /// Arity of the relation
        expected: usize,
        /// Length of the offending fact
        found: usize,
    },

    /// Negation or aggregation closes a cycle through its own stratum
    #[error("program is not stratifiable: {predicate} depends on {dependency} through negation or aggregation in its own stratum")]
    NoStratification {
        /// Head of the offending rule
        predicate: PredicateWithArity,
        /// The negated or aggregated dependency
        dependency: PredicateWithArity,
    },

    /// The domain cannot perform an operation needed by an aggregate
    #[error("domain does not support {0}")]
    UnsupportedOperation(&'static str),

    /// Aggregation overflowed the domain's value type
    #[error("arithmetic overflow during aggregation")]
    Overflow,

    /// A predicate leaves no identifier for the builder to mint after it
    #[error("predicate {0} leaves no identifier to mint after it")]
    PredicateOverflow(Predicate),

    /// A join was requested over no relations at all
    #[error("cannot join an empty list of relations")]
    EmptyJoin,

    /// An evaluation algorithm name was not recognized
    #[error("unknown evaluation algorithm `{0}`, expected `naive` or `semi-naive`")]
    UnknownAlgorithm(String),

    /// Program text could not be parsed
    #[cfg(feature = "parsing")]
    #[error("parse error: {0}")]
    Parse(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
