//! Relations and the relational algebra the evaluator is built on.
//!
//! Every algebra operator takes its inputs by reference and returns a fresh
//! [`Relation`].

use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::rule::{AggregationFunction, Constant};

/// One row of a relation.
pub type Tuple<T> = SmallVec<[T; 4]>;

/// A column of a selection or projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column<T> {
    /// The value at this index of the row
    Index(usize),
    /// A constant value, regardless of the row
    Constant(T),
}

impl<T> Column<T> {
    fn value<'a>(&'a self, row: &'a [T]) -> &'a T {
        match self {
            Column::Index(index) => &row[*index],
            Column::Constant(value) => value,
        }
    }
}

/// A column of an aggregation projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregationColumn<T> {
    /// A plain column, which must be part of the grouping key
    Column(Column<T>),
    /// The aggregated value of the group
    Aggregate,
}

/// A set of tuples sharing an arity.
#[derive(Debug, Clone)]
pub struct Relation<T> {
    arity: usize,
    tuples: IndexSet<Tuple<T>>,
}

impl<T: Constant> PartialEq for Relation<T> {
    fn eq(&self, other: &Self) -> bool {
        self.arity == other.arity && self.tuples == other.tuples
    }
}

impl<T: Constant> Eq for Relation<T> {}

impl<T: Constant> Relation<T> {
    /// The relation with no rows.
    #[must_use]
    pub fn empty(arity: usize) -> Self {
        Self {
            arity,
            tuples: IndexSet::new(),
        }
    }

    fn from_tuples(arity: usize, tuples: IndexSet<Tuple<T>>) -> Self {
        debug_assert!(tuples.iter().all(|tuple| tuple.len() == arity));
        Self { arity, tuples }
    }

    /// Builds a relation from facts, checking that each fact has `arity` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArityMismatch`] for the first fact of the wrong length.
    pub fn from_facts<I, F>(arity: usize, facts: I) -> Result<Self>
    where
        I: IntoIterator<Item = F>,
        F: IntoIterator<Item = T>,
    {
        let tuples = facts
            .into_iter()
            .map(|fact| {
                let tuple: Tuple<T> = fact.into_iter().collect();
                if tuple.len() == arity {
                    Ok(tuple)
                } else {
                    Err(Error::ArityMismatch {
                        expected: arity,
                        found: tuple.len(),
                    })
                }
            })
            .collect::<Result<_>>()?;
        Ok(Self::from_tuples(arity, tuples))
    }

    /// Every tuple of length `arity` made of the given values.
    ///
    /// The domain of arity zero holds the single empty tuple.
    #[must_use]
    pub fn domain(arity: usize, values: &[T]) -> Self {
        let mut tuples: IndexSet<Tuple<T>> = IndexSet::new();
        tuples.insert(Tuple::new());
        for _ in 0..arity {
            tuples = tuples
                .iter()
                .flat_map(|prefix| {
                    values.iter().map(move |value| {
                        let mut tuple = prefix.clone();
                        tuple.push(value.clone());
                        tuple
                    })
                })
                .collect();
        }
        Self::from_tuples(arity, tuples)
    }

    /// Number of columns.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Whether the relation has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Whether the relation holds the given row.
    #[must_use]
    pub fn contains(&self, tuple: &[T]) -> bool {
        self.tuples.contains(tuple)
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.tuples.iter().map(SmallVec::as_slice)
    }

    /// Keeps the rows in which, for every group, all columns hold equal values.
    ///
    /// # Panics
    ///
    /// Panics if an index column is not below the arity.
    #[must_use]
    pub fn select(&self, selection: &[Vec<Column<T>>]) -> Self {
        self.assert_in_range(selection.iter().flatten());
        let tuples = self
            .tuples
            .iter()
            .filter(|row| {
                selection.iter().all(|group| {
                    let mut values = group.iter().map(|column| column.value(row));
                    match values.next() {
                        Some(first) => values.all(|value| value == first),
                        None => true,
                    }
                })
            })
            .cloned()
            .collect();
        Self::from_tuples(self.arity, tuples)
    }

    /// Concatenates every row of `self` with every row of `other`.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        let tuples = self
            .tuples
            .iter()
            .flat_map(|left| {
                other.tuples.iter().map(move |right| {
                    let mut tuple = left.clone();
                    tuple.extend(right.iter().cloned());
                    tuple
                })
            })
            .collect();
        Self::from_tuples(self.arity + other.arity, tuples)
    }

    /// Folds [`Relation::join`] over the relations, left to right.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyJoin`] when no relation is given.
    pub fn join_all<'a, I>(relations: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Self>,
        T: 'a,
    {
        let mut relations = relations.into_iter();
        let first = relations.next().ok_or(Error::EmptyJoin)?;
        Ok(relations.fold(first.clone(), |result, relation| result.join(relation)))
    }

    /// Maps every row to the given columns.
    ///
    /// # Panics
    ///
    /// Panics if an index column is not below the arity.
    #[must_use]
    pub fn project(&self, columns: &[Column<T>]) -> Self {
        self.assert_in_range(columns);
        let tuples = self
            .tuples
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| column.value(row).clone())
                    .collect()
            })
            .collect();
        Self::from_tuples(columns.len(), tuples)
    }

    fn assert_in_range<'a>(&self, columns: impl IntoIterator<Item = &'a Column<T>>)
    where
        T: 'a,
    {
        for column in columns {
            if let Column::Index(index) = column {
                assert!(
                    *index < self.arity,
                    "column {index} is out of range for arity {}",
                    self.arity
                );
            }
        }
    }

    /// Rows present in either relation.
    ///
    /// # Panics
    ///
    /// Panics if the arities differ.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        assert_eq!(
            self.arity, other.arity,
            "union of relations with different arity"
        );
        let mut tuples = self.tuples.clone();
        tuples.extend(other.tuples.iter().cloned());
        Self::from_tuples(self.arity, tuples)
    }

    /// Adds the rows of `other` in place.
    ///
    /// # Panics
    ///
    /// Panics if the arities differ.
    pub fn extend(&mut self, other: &Self) {
        assert_eq!(
            self.arity, other.arity,
            "union of relations with different arity"
        );
        self.tuples.extend(other.tuples.iter().cloned());
    }

    /// Removes duplicate rows. Rows are kept in a set, so this only copies.
    #[must_use]
    pub fn distinct(&self) -> Self {
        self.clone()
    }

    /// Rows of `self` absent from `other`.
    ///
    /// # Panics
    ///
    /// Panics if the arities differ.
    #[must_use]
    pub fn minus(&self, other: &Self) -> Self {
        assert_eq!(
            self.arity, other.arity,
            "difference of relations with different arity"
        );
        let tuples = self
            .tuples
            .iter()
            .filter(|row| !other.tuples.contains(*row))
            .cloned()
            .collect();
        Self::from_tuples(self.arity, tuples)
    }

    /// The complement of the relation within the domain built from `values`.
    #[must_use]
    pub fn negated(&self, values: &[T]) -> Self {
        Self::domain(self.arity, values).minus(self)
    }

    /// Groups the distinct rows by the `same` indices and folds the `columns`
    /// of each group with `function`.
    ///
    /// Rows are projected with `projection`; [`AggregationColumn::Aggregate`]
    /// receives the folded value. Rows of one group landing on the same output
    /// are combined with the domain operation matching `function`.
    ///
    /// # Errors
    ///
    /// Fails if the domain cannot perform the operation `function` needs.
    ///
    /// # Panics
    ///
    /// Panics if `same` and `columns` overlap, if an index of either is not
    /// below the arity, or if a plain index column of the projection is not
    /// part of `same`.
    pub fn aggregate(
        &self,
        projection: &[AggregationColumn<T>],
        same: &[usize],
        domain: &dyn Domain<T>,
        function: AggregationFunction,
        columns: &[usize],
    ) -> Result<Self> {
        assert!(
            columns.iter().all(|index| !same.contains(index)),
            "aggregated columns must not be grouped"
        );
        if let Some(&index) = same.iter().chain(columns).max() {
            assert!(
                index < self.arity,
                "column {index} is out of range for arity {}",
                self.arity
            );
        }
        assert!(
            projection.iter().all(|column| match column {
                AggregationColumn::Column(Column::Index(index)) => same.contains(index),
                _ => true,
            }),
            "projected columns must be grouped"
        );

        let mut groups: IndexMap<Tuple<T>, Tuple<T>> = IndexMap::new();
        for row in &self.distinct().tuples {
            let key: Tuple<T> = same.iter().map(|&index| row[index].clone()).collect();
            let value = projection
                .iter()
                .map(|column| match column {
                    AggregationColumn::Column(column) => Ok(column.value(row).clone()),
                    AggregationColumn::Aggregate => {
                        function.transform(domain, columns.iter().map(|&index| &row[index]))
                    }
                })
                .collect::<Result<Tuple<T>>>()?;
            match groups.entry(key) {
                Entry::Occupied(mut entry) => {
                    let merged = merge(entry.get(), &value, projection, domain, function)?;
                    *entry.get_mut() = merged;
                }
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            }
        }

        Ok(Self::from_tuples(projection.len(), groups.into_values().collect()))
    }
}

/// Combines two projected rows of the same group, column by column.
fn merge<T: Constant>(
    first: &[T],
    second: &[T],
    projection: &[AggregationColumn<T>],
    domain: &dyn Domain<T>,
    function: AggregationFunction,
) -> Result<Tuple<T>> {
    projection
        .iter()
        .zip(first.iter().zip(second))
        .map(|(column, (x, y))| match column {
            AggregationColumn::Column(_) => Ok(x.clone()),
            AggregationColumn::Aggregate => function.combine(domain, x, y),
        })
        .collect()
}

impl AggregationFunction {
    /// The value a single row contributes to its group.
    fn transform<'a, T: Constant + 'a>(
        self,
        domain: &dyn Domain<T>,
        values: impl IntoIterator<Item = &'a T>,
    ) -> Result<T> {
        if self == AggregationFunction::Count {
            return domain.unit();
        }
        let mut values = values.into_iter();
        let first = values.next().ok_or_else(|| {
            Error::MalformedAggregation(format!("{self} needs at least one column"))
        })?;
        values.try_fold(first.clone(), |acc, value| {
            self.combine(domain, &acc, value)
        })
    }

    /// Folds two partial results of a group.
    fn combine<T>(self, domain: &dyn Domain<T>, a: &T, b: &T) -> Result<T> {
        match self {
            AggregationFunction::Count | AggregationFunction::Sum => domain.sum(a, b),
            AggregationFunction::Min => domain.min(a, b),
            AggregationFunction::Max => domain.max(a, b),
        }
    }
}
