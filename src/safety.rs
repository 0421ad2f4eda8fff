//! Groundedness checks, run on every rule before it is stored.

use indexmap::IndexSet;

use crate::error::{Error, Result};
use crate::rule::{Atom, BodyLiteral, Rule, Variable};

/// Checks that every variable of the rule is limited.
///
/// A variable is limited when it occurs in a positive body literal, or is the
/// result of the rule's aggregate. Facts have no limited variables, so their
/// head must be made of constants only.
///
/// # Errors
///
/// Returns [`Error::NotGrounded`] with the first variable that is not limited.
pub fn check<T>(rule: &Rule<T>) -> Result<()> {
    let aggregate = match rule {
        Rule::Aggregation(rule) => Some(&rule.aggregate),
        Rule::Combination(_) => None,
    };
    let mut limited: IndexSet<Variable> = rule
        .body()
        .iter()
        .filter(|literal| !literal.negated)
        .flat_map(BodyLiteral::variables)
        .collect();
    limited.extend(aggregate.map(|aggregate| aggregate.result));

    let head = rule.head();
    let variables = head
        .atoms
        .iter()
        .chain(rule.body().iter().flat_map(|literal| literal.atoms.iter()))
        .filter_map(Atom::as_variable)
        .chain(
            aggregate
                .into_iter()
                .flat_map(|aggregate| aggregate.same.iter().chain(&aggregate.columns).copied()),
        );

    for variable in variables {
        if !limited.contains(&variable) {
            return Err(Error::NotGrounded {
                predicate: head.predicate,
                variable,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{AggregationFunction, HeadLiteral, Predicate, RuleBuilder};

    fn rule(
        head: Vec<Atom<i32>>,
        body: &[(Vec<Atom<i32>>, bool)],
        aggregate: Option<(AggregationFunction, Vec<u32>, Vec<u32>, u32)>,
    ) -> Rule<i32> {
        let mut builder = RuleBuilder::new();
        for (index, (atoms, negated)) in body.iter().enumerate() {
            let predicate = Predicate::new(u32::try_from(index).unwrap() + 1);
            builder.literal(predicate, atoms.clone(), *negated);
        }
        if let Some((function, same, columns, result)) = aggregate {
            let same = same.into_iter().map(Variable::new);
            let columns = columns.into_iter().map(Variable::new);
            builder.aggregate(function, same, columns, Variable::new(result));
        }
        builder
            .build(HeadLiteral::new(Predicate::new(0), head))
            .unwrap()
    }

    fn v(id: u32) -> Atom<i32> {
        Atom::Variable(Variable::new(id))
    }

    #[test]
    fn test_grounded_rule_passes() {
        let checked = rule(vec![v(0), v(1)], &[(vec![v(0), v(1)], false)], None);
        assert_eq!(check(&checked), Ok(()));
    }

    #[test]
    fn test_ground_fact_passes() {
        let checked = rule(vec![Atom::Value(1), Atom::Value(2)], &[], None);
        assert_eq!(check(&checked), Ok(()));
    }

    #[test]
    fn test_fact_with_variable_is_rejected() {
        let checked = rule(vec![v(0)], &[], None);
        assert_eq!(
            check(&checked),
            Err(Error::NotGrounded {
                predicate: Predicate::new(0),
                variable: Variable::new(0),
            })
        );
    }

    #[test]
    fn test_unused_head_variable_is_rejected() {
        // b(x, y) :- a(y).
        let checked = rule(vec![v(0), v(1)], &[(vec![v(1)], false)], None);
        assert_eq!(
            check(&checked),
            Err(Error::NotGrounded {
                predicate: Predicate::new(0),
                variable: Variable::new(0),
            })
        );
    }

    #[test]
    fn test_variable_only_in_negated_literal_is_rejected() {
        // a(x) :- !b(x).
        let checked = rule(vec![v(0)], &[(vec![v(0)], true)], None);
        assert!(matches!(check(&checked), Err(Error::NotGrounded { .. })));

        // a(x) :- c(x), !b(x, y).
        let checked = rule(
            vec![v(0)],
            &[(vec![v(0)], false), (vec![v(0), v(1)], true)],
            None,
        );
        assert_eq!(
            check(&checked),
            Err(Error::NotGrounded {
                predicate: Predicate::new(0),
                variable: Variable::new(1),
            })
        );
    }

    #[test]
    fn test_negation_of_bound_variables_passes() {
        // a(x) :- c(x), !b(x).
        let checked = rule(
            vec![v(0)],
            &[(vec![v(0)], false), (vec![v(0)], true)],
            None,
        );
        assert_eq!(check(&checked), Ok(()));
    }

    #[test]
    fn test_aggregate_result_is_limited() {
        // r(s) :- p(v), sum((), (v), s).
        let checked = rule(
            vec![v(1)],
            &[(vec![v(0)], false)],
            Some((AggregationFunction::Sum, vec![], vec![0], 1)),
        );
        assert_eq!(check(&checked), Ok(()));
    }

    #[test]
    fn test_aggregate_of_negated_clause_is_rejected() {
        // a(s) :- !b(x), count((x), (), s).
        let checked = rule(
            vec![v(1)],
            &[(vec![v(0)], true)],
            Some((AggregationFunction::Count, vec![0], vec![], 1)),
        );
        assert!(matches!(check(&checked), Err(Error::NotGrounded { .. })));
    }

    #[test]
    fn test_aggregate_over_unknown_column_is_rejected() {
        // r(s) :- p(v), sum((), (w), s).
        let checked = rule(
            vec![v(1)],
            &[(vec![v(0)], false)],
            Some((AggregationFunction::Sum, vec![], vec![2], 1)),
        );
        assert_eq!(
            check(&checked),
            Err(Error::NotGrounded {
                predicate: Predicate::new(0),
                variable: Variable::new(2),
            })
        );
    }
}
