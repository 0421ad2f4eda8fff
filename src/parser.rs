//! Textual programs over integer constants.
//!
//! ```text
//! rule      ::= head "." | head ":-" body "."
//! head      ::= name "(" [atom {"," atom}] ")"
//! body      ::= item {"," item}
//! item      ::= literal | aggregate
//! literal   ::= ["!"] name "(" [atom {"," atom}] ")"
//! aggregate ::= ("min"|"max"|"sum"|"count") "(" "(" [name {"," name}] ")" "," "(" [name {"," name}] ")" "," name ")"
//! atom      ::= name | integer
//! ```
//!
//! Names in atom position are variables, scoped to their rule. Predicate
//! names are interned by the [`Parser`], so several inputs can share them.

use indexmap::IndexMap;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, i64 as integer, multispace0};
use nom::combinator::{all_consuming, map, opt, recognize, value};
use nom::error::{convert_error, VerboseError};
use nom::multi::{many0, many0_count, separated_list0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::Finish;

use crate::engine::ProgramBuilder;
use crate::error::{Error, Result};
use crate::rule::{AggregationFunction, Atom, HeadLiteral, Predicate, RuleBuilder, Variable};

type IResult<'a, O> = nom::IResult<&'a str, O, VerboseError<&'a str>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Term<'a> {
    Name(&'a str),
    Number(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Literal<'a> {
    negated: bool,
    predicate: &'a str,
    terms: Vec<Term<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Aggregate<'a> {
    function: AggregationFunction,
    same: Vec<&'a str>,
    columns: Vec<&'a str>,
    result: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item<'a> {
    Literal(Literal<'a>),
    Aggregate(Aggregate<'a>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause<'a> {
    head: Literal<'a>,
    body: Vec<Item<'a>>,
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<'a, O>
where
    F: FnMut(&'a str) -> IResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn name(input: &str) -> IResult<'_, &str> {
    ws(recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    )))(input)
}

fn term(input: &str) -> IResult<'_, Term<'_>> {
    alt((map(ws(integer), Term::Number), map(name, Term::Name)))(input)
}

fn literal(input: &str) -> IResult<'_, Literal<'_>> {
    map(
        tuple((
            opt(ws(char('!'))),
            name,
            delimited(
                ws(char('(')),
                separated_list0(ws(char(',')), term),
                ws(char(')')),
            ),
        )),
        |(negated, predicate, terms)| Literal {
            negated: negated.is_some(),
            predicate,
            terms,
        },
    )(input)
}

fn function(input: &str) -> IResult<'_, AggregationFunction> {
    ws(alt((
        value(AggregationFunction::Min, tag("min")),
        value(AggregationFunction::Max, tag("max")),
        value(AggregationFunction::Sum, tag("sum")),
        value(AggregationFunction::Count, tag("count")),
    )))(input)
}

fn names(input: &str) -> IResult<'_, Vec<&str>> {
    delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), name),
        ws(char(')')),
    )(input)
}

fn aggregate(input: &str) -> IResult<'_, Aggregate<'_>> {
    map(
        tuple((
            function,
            ws(char('(')),
            names,
            ws(char(',')),
            names,
            ws(char(',')),
            name,
            ws(char(')')),
        )),
        |(function, _, same, _, columns, _, result, _)| Aggregate {
            function,
            same,
            columns,
            result,
        },
    )(input)
}

fn item(input: &str) -> IResult<'_, Item<'_>> {
    alt((
        map(aggregate, Item::Aggregate),
        map(literal, Item::Literal),
    ))(input)
}

fn rule_body(input: &str) -> IResult<'_, Vec<Item<'_>>> {
    preceded(ws(tag(":-")), separated_list1(ws(char(',')), item))(input)
}

fn clause(input: &str) -> IResult<'_, Clause<'_>> {
    let (rest, (head, body)) = terminated(pair(literal, opt(rule_body)), ws(char('.')))(input)?;
    let body = body.unwrap_or_default();
    Ok((rest, Clause { head, body }))
}

fn clauses(input: &str) -> Result<Vec<Clause<'_>>> {
    all_consuming(terminated(many0(clause), multispace0))(input)
        .finish()
        .map(|(_, clauses)| clauses)
        .map_err(|error| Error::Parse(convert_error(input, error)))
}

/// Reads textual rules into a [`ProgramBuilder`].
#[derive(Debug, Clone, Default)]
pub struct Parser {
    predicates: IndexMap<String, Predicate>,
}

impl Parser {
    /// Creates a parser that knows no predicate yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The predicate interned for `name`, if any input mentioned it.
    #[must_use]
    pub fn predicate(&self, name: &str) -> Option<Predicate> {
        self.predicates.get(name).copied()
    }

    /// Parses `input` and adds its rules and facts to `builder`.
    ///
    /// Nothing is added unless the whole input is syntactically valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for invalid syntax or a negated head, and the
    /// errors of [`ProgramBuilder::add_rule`] for invalid rules. Rules before
    /// an invalid one stay added.
    pub fn parse(&mut self, input: &str, builder: &mut ProgramBuilder<i64>) -> Result<()> {
        for clause in clauses(input)? {
            self.lower(clause, builder)?;
        }
        Ok(())
    }

    fn lower(&mut self, clause: Clause<'_>, builder: &mut ProgramBuilder<i64>) -> Result<()> {
        if clause.head.negated {
            return Err(Error::Parse(format!(
                "the head `{}` of a rule cannot be negated",
                clause.head.predicate
            )));
        }

        let mut scope: IndexMap<&str, Variable> = IndexMap::new();
        let mut rule = RuleBuilder::new();
        for item in &clause.body {
            match item {
                Item::Literal(literal) => {
                    let predicate = self.intern(literal.predicate, builder);
                    let atoms = atoms(&literal.terms, &mut scope, builder);
                    rule.literal(predicate, atoms, literal.negated);
                }
                Item::Aggregate(aggregate) => {
                    let same: Vec<Variable> = aggregate
                        .same
                        .iter()
                        .map(|&name| variable(name, &mut scope, builder))
                        .collect();
                    let columns: Vec<Variable> = aggregate
                        .columns
                        .iter()
                        .map(|&name| variable(name, &mut scope, builder))
                        .collect();
                    let result = variable(aggregate.result, &mut scope, builder);
                    rule.aggregate(aggregate.function, same, columns, result);
                }
            }
        }

        let predicate = self.intern(clause.head.predicate, builder);
        let head = HeadLiteral::new(predicate, atoms(&clause.head.terms, &mut scope, builder));
        builder.add_rule(rule.build(head)?)?;
        Ok(())
    }

    fn intern(&mut self, name: &str, builder: &mut ProgramBuilder<i64>) -> Predicate {
        if let Some(predicate) = self.predicates.get(name) {
            return *predicate;
        }
        let predicate = builder.predicate();
        self.predicates.insert(name.to_string(), predicate);
        predicate
    }
}

fn variable<'a>(
    name: &'a str,
    scope: &mut IndexMap<&'a str, Variable>,
    builder: &mut ProgramBuilder<i64>,
) -> Variable {
    *scope.entry(name).or_insert_with(|| builder.variable())
}

fn atoms<'a>(
    terms: &[Term<'a>],
    scope: &mut IndexMap<&'a str, Variable>,
    builder: &mut ProgramBuilder<i64>,
) -> Vec<Atom<i64>> {
    terms
        .iter()
        .map(|term| match *term {
            Term::Number(number) => Atom::Value(number),
            Term::Name(name) => Atom::Variable(variable(name, scope, builder)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NumberDomain;
    use crate::engine::Program;

    fn program(text: &str) -> anyhow::Result<(Program<i64>, Parser)> {
        let mut parser = Parser::new();
        let mut builder = ProgramBuilder::new();
        parser.parse(text, &mut builder)?;
        Ok((builder.build(NumberDomain), parser))
    }

    fn solve(program: &Program<i64>, parser: &Parser, name: &str, arity: usize) -> Vec<Vec<i64>> {
        let predicate = parser.predicate(name).unwrap();
        let mut facts: Vec<_> = program
            .solve(predicate, arity)
            .unwrap()
            .into_iter()
            .collect();
        facts.sort();
        facts
    }

    #[test]
    fn test_parses_simple_rule() {
        let parsed = clauses("a(X):-b(X).").unwrap();
        assert_eq!(
            parsed,
            vec![Clause {
                head: Literal {
                    negated: false,
                    predicate: "a",
                    terms: vec![Term::Name("X")],
                },
                body: vec![Item::Literal(Literal {
                    negated: false,
                    predicate: "b",
                    terms: vec![Term::Name("X")],
                })],
            }]
        );
    }

    #[test]
    fn test_parses_aggregation_rule() {
        let parsed = clauses("a(x,s):-b(x,v),sum((x),(v),s).").unwrap();
        assert_eq!(
            parsed[0].body[1],
            Item::Aggregate(Aggregate {
                function: AggregationFunction::Sum,
                same: vec!["x"],
                columns: vec!["v"],
                result: "s",
            })
        );
    }

    #[test]
    fn test_parses_facts_negation_and_whitespace() {
        let parsed = clauses("  e(1, -2).\n\n n(x) :- v(x),\n  !e(x, 3) .\n").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed[0].head.terms,
            vec![Term::Number(1), Term::Number(-2)]
        );
        assert!(parsed[0].body.is_empty());
        assert_eq!(
            parsed[1].body[1],
            Item::Literal(Literal {
                negated: true,
                predicate: "e",
                terms: vec![Term::Name("x"), Term::Number(3)],
            })
        );
    }

    #[test]
    fn test_names_starting_like_functions_are_literals() {
        let parsed = clauses("a(x) :- minimum(x).").unwrap();
        assert_eq!(
            parsed[0].body[0],
            Item::Literal(Literal {
                negated: false,
                predicate: "minimum",
                terms: vec![Term::Name("x")],
            })
        );
    }

    #[test]
    fn test_syntax_errors_are_reported() {
        assert!(matches!(clauses("a(x) :- b(x)"), Err(Error::Parse(_))));
        assert!(matches!(clauses("a(x) :- ."), Err(Error::Parse(_))));
        assert!(matches!(clauses("a(x)"), Err(Error::Parse(_))));
        assert_eq!(clauses(" \n"), Ok(vec![]));
    }

    #[test]
    fn test_transitive_closure_program() -> anyhow::Result<()> {
        let (program, parser) = program(
            "
            e(1, 2). e(2, 3).
            tc(x, y) :- e(x, y).
            tc(x, y) :- tc(x, z), e(z, y).
            v(x) :- e(x, y).
            v(y) :- e(x, y).
            ntc(x, y) :- v(x), v(y), !tc(x, y).
            ",
        )?;

        assert_eq!(
            solve(&program, &parser, "tc", 2),
            vec![vec![1, 2], vec![1, 3], vec![2, 3]]
        );
        assert_eq!(solve(&program, &parser, "ntc", 2).len(), 6);
        Ok(())
    }

    #[test]
    fn test_aggregation_program() -> anyhow::Result<()> {
        let (program, parser) = program(
            "
            q(1, 1, 2). q(1, 2, 3). q(2, 1, 4).
            p(x, s) :- q(x, y, v), max((x), (v), s).
            total(s) :- q(x, y, v), sum((), (v), s).
            ",
        )?;

        assert_eq!(
            solve(&program, &parser, "p", 2),
            vec![vec![1, 3], vec![2, 4]]
        );
        assert_eq!(solve(&program, &parser, "total", 1), vec![vec![9]]);
        Ok(())
    }

    #[test]
    fn test_predicates_are_shared_across_inputs() -> anyhow::Result<()> {
        let mut parser = Parser::new();
        let mut builder = ProgramBuilder::new();
        parser.parse("e(1, 2).", &mut builder)?;
        let e = parser.predicate("e");
        parser.parse("e(2, 3). path(x, y) :- e(x, y).", &mut builder)?;

        assert_eq!(parser.predicate("e"), e);
        assert!(parser.predicate("missing").is_none());
        let program = builder.build(NumberDomain);
        assert_eq!(solve(&program, &parser, "path", 2).len(), 2);
        Ok(())
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let mut builder = ProgramBuilder::new();
        let mut parser = Parser::new();

        assert!(matches!(
            parser.parse("b(x, y) :- a(y).", &mut builder),
            Err(Error::NotGrounded { .. })
        ));
        assert!(matches!(
            parser.parse("!a(x) :- b(x).", &mut builder),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parser.parse("a(s) :- b(x), c(x), count((), (), s).", &mut builder),
            Err(Error::MalformedAggregation(_))
        ));
        assert!(matches!(
            parser.parse("e(x).", &mut builder),
            Err(Error::NotGrounded { .. })
        ));
    }
}
