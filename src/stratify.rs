//! Splitting the rules a query needs into strata.
//!
//! A stratum is a strongly connected component of the dependency graph of
//! the relations reachable from the target. Strata are returned in
//! evaluation order: every relation a stratum reads through negation or
//! aggregation belongs to an earlier stratum.

use std::collections::VecDeque;

use indexmap::IndexSet;
use log::{debug, log_enabled, trace, Level};

use crate::database::{PredicateWithArity, RulesDatabase};
use crate::error::{Error, Result};
use crate::graph::DirectedGraph;
use crate::rule::{Constant, Rule};

/// Relations `target` transitively depends on, `target` included, in
/// breadth-first order.
pub fn dependencies<T: Constant>(
    rules: &RulesDatabase<T>,
    target: PredicateWithArity,
) -> IndexSet<PredicateWithArity> {
    let mut visited = IndexSet::new();
    visited.insert(target);
    let mut queue = VecDeque::from([target]);

    while let Some(key) = queue.pop_front() {
        for rule in rules.get(&key) {
            for literal in rule.body() {
                if visited.insert(literal.key()) {
                    queue.push_back(literal.key());
                }
            }
        }
    }
    visited
}

/// Strata of the relations `target` depends on, in evaluation order.
///
/// # Errors
///
/// Returns [`Error::NoStratification`] if a rule negates or aggregates a
/// relation from its own stratum.
pub fn stratify<T: Constant>(
    rules: &RulesDatabase<T>,
    target: PredicateWithArity,
) -> Result<Vec<IndexSet<PredicateWithArity>>> {
    let relations = dependencies(rules, target);

    let mut graph = DirectedGraph::new(relations.len());
    for (head, key) in relations.iter().enumerate() {
        for rule in rules.get(key) {
            for literal in rule.body() {
                if let Some(body) = relations.get_index_of(&literal.key()) {
                    graph.add_edge(body, head);
                }
            }
        }
    }

    let components = graph.strongly_connected_components();
    let strata: Vec<IndexSet<PredicateWithArity>> = graph
        .condensation(&components)
        .topological_order()
        .into_iter()
        .map(|component| {
            components[component]
                .iter()
                .map(|&vertex| relations[vertex])
                .collect()
        })
        .collect();

    check(rules, &strata)?;

    debug!(
        "{} relations for {target} split into {} strata",
        relations.len(),
        strata.len()
    );
    if log_enabled!(Level::Trace) {
        for (index, stratum) in strata.iter().enumerate() {
            let keys: Vec<String> = stratum.iter().map(ToString::to_string).collect();
            trace!("stratum {index}: {}", keys.join(", "));
        }
    }
    Ok(strata)
}

// Negated literals and aggregated clauses must read relations that are
// complete by the time their stratum runs.
fn check<T: Constant>(
    rules: &RulesDatabase<T>,
    strata: &[IndexSet<PredicateWithArity>],
) -> Result<()> {
    let mut seen: IndexSet<PredicateWithArity> = IndexSet::new();
    for stratum in strata {
        for key in stratum {
            for rule in rules.get(key) {
                let aggregation = matches!(rule, Rule::Aggregation(_));
                for literal in rule.body() {
                    if (literal.negated || aggregation) && !seen.contains(&literal.key()) {
                        return Err(Error::NoStratification {
                            predicate: *key,
                            dependency: literal.key(),
                        });
                    }
                }
            }
        }
        seen.extend(stratum.iter().copied());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{AggregationFunction, Atom, HeadLiteral, Predicate, RuleBuilder, Variable};

    fn key(predicate: u32, arity: usize) -> PredicateWithArity {
        PredicateWithArity::new(Predicate::new(predicate), arity)
    }

    fn x() -> Atom<i32> {
        Atom::Variable(Variable::new(0))
    }

    // head(x) :- body...(x), with `true` marking negated literals.
    fn unary(head: u32, body: &[(u32, bool)]) -> Rule<i32> {
        let mut builder = RuleBuilder::new();
        for &(predicate, negated) in body {
            builder.literal(Predicate::new(predicate), vec![x()], negated);
        }
        builder
            .build(HeadLiteral::new(Predicate::new(head), vec![x()]))
            .unwrap()
    }

    // head(s) :- body(x), count((), (), s).
    fn count(head: u32, body: u32) -> Rule<i32> {
        let s = Variable::new(1);
        let mut builder = RuleBuilder::new();
        builder
            .literal(Predicate::new(body), vec![x()], false)
            .aggregate(AggregationFunction::Count, [], [], s);
        builder
            .build(HeadLiteral::new(Predicate::new(head), vec![s.into()]))
            .unwrap()
    }

    fn position(strata: &[IndexSet<PredicateWithArity>], key: PredicateWithArity) -> usize {
        strata
            .iter()
            .position(|stratum| stratum.contains(&key))
            .unwrap()
    }

    fn database(rules: impl IntoIterator<Item = Rule<i32>>) -> RulesDatabase<i32> {
        rules.into_iter().collect()
    }

    #[test]
    fn test_dependencies_follow_rule_bodies() {
        // 0 :- 1, !2.   1 :- 3.   4 :- 0.
        let rules = database([
            unary(0, &[(1, false), (2, true)]),
            unary(1, &[(3, false)]),
            unary(4, &[(0, false)]),
        ]);

        let closure = dependencies(&rules, key(0, 1));
        assert_eq!(
            closure,
            [key(0, 1), key(1, 1), key(2, 1), key(3, 1)]
                .into_iter()
                .collect::<IndexSet<_>>()
        );
        assert!(!closure.contains(&key(4, 1)));
    }

    #[test]
    fn test_dependencies_distinguish_arities() {
        let rules = database([unary(0, &[(1, false)])]);
        assert_eq!(dependencies(&rules, key(0, 2)).len(), 1);
    }

    #[test]
    fn test_negated_dependency_is_evaluated_first() {
        // 0 :- 1, !2.   2 :- 3.
        let rules = database([
            unary(0, &[(1, false), (2, true)]),
            unary(2, &[(3, false)]),
        ]);

        let strata = stratify(&rules, key(0, 1)).unwrap();
        assert_eq!(strata.len(), 4);
        assert!(position(&strata, key(2, 1)) < position(&strata, key(0, 1)));
        assert!(position(&strata, key(3, 1)) < position(&strata, key(2, 1)));
    }

    #[test]
    fn test_mutual_recursion_shares_a_stratum() {
        // 0 :- 1.   1 :- 0.   1 :- 2.
        let rules = database([
            unary(0, &[(1, false)]),
            unary(1, &[(0, false)]),
            unary(1, &[(2, false)]),
        ]);

        let strata = stratify(&rules, key(0, 1)).unwrap();
        assert_eq!(strata.len(), 2);
        assert_eq!(position(&strata, key(0, 1)), position(&strata, key(1, 1)));
        assert_eq!(position(&strata, key(2, 1)), 0);
    }

    #[test]
    fn test_recursion_next_to_resolved_negation_is_stratified() {
        // 0 :- 1, !2.   1 :- 0.   1 :- 3.   (2 and 3 are base relations)
        let rules = database([
            unary(0, &[(1, false), (2, true)]),
            unary(1, &[(0, false)]),
            unary(1, &[(3, false)]),
        ]);

        let strata = stratify(&rules, key(0, 1)).unwrap();
        assert_eq!(position(&strata, key(0, 1)), position(&strata, key(1, 1)));
        assert!(position(&strata, key(2, 1)) < position(&strata, key(0, 1)));
    }

    #[test]
    fn test_negation_through_own_stratum_is_rejected() {
        // 0 :- !0, 1.
        let rules = database([unary(0, &[(0, true), (1, false)])]);
        assert_eq!(
            stratify(&rules, key(0, 1)),
            Err(Error::NoStratification {
                predicate: key(0, 1),
                dependency: key(0, 1),
            })
        );
    }

    #[test]
    fn test_negation_through_a_cycle_is_rejected() {
        // 0 :- 1.   1 :- 2, !0.
        let rules = database([
            unary(0, &[(1, false)]),
            unary(1, &[(2, false), (0, true)]),
        ]);
        assert_eq!(
            stratify(&rules, key(0, 1)),
            Err(Error::NoStratification {
                predicate: key(1, 1),
                dependency: key(0, 1),
            })
        );
    }

    #[test]
    fn test_aggregation_over_own_stratum_is_rejected() {
        // 1 :- 0.   0 :- 1, count(...).
        let rules = database([unary(1, &[(0, false)]), count(0, 1)]);
        assert!(matches!(
            stratify(&rules, key(0, 1)),
            Err(Error::NoStratification { .. })
        ));
    }

    #[test]
    fn test_aggregation_over_earlier_stratum_is_accepted() {
        let rules = database([count(0, 1), unary(1, &[(2, false)])]);
        let strata = stratify(&rules, key(0, 1)).unwrap();
        assert!(position(&strata, key(1, 1)) < position(&strata, key(0, 1)));
    }

    #[test]
    fn test_unrelated_cycle_does_not_block_target() {
        // 0 :- !0, 1.   2 :- 1.
        let rules = database([
            unary(0, &[(0, true), (1, false)]),
            unary(2, &[(1, false)]),
        ]);
        assert!(stratify(&rules, key(0, 1)).is_err());
        assert_eq!(stratify(&rules, key(2, 1)).unwrap().len(), 2);
    }
}
