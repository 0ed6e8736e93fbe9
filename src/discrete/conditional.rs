//! Discrete conditional probability tables.
//!
//! A [`DiscreteConditional`] represents P(variable | parents) as a
//! row-normalized table, built once from a declarative [`Signature`] and
//! immutable afterwards. It supports the three query operations the Bayes
//! net engine composes: table lookup, per-node maximization given assigned
//! parents, and drawing from the conditional distribution given sampled
//! parents.

use crate::error::{TrellisError, TrellisResult};
use crate::Key;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;

/// A discrete variable paired with its number of states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscreteKey {
    /// Variable identifier
    pub id: Key,
    /// Number of states the variable can take
    pub cardinality: usize,
}

impl DiscreteKey {
    /// Create a new discrete key
    pub fn new(id: Key, cardinality: usize) -> Self {
        DiscreteKey { id, cardinality }
    }
}

impl fmt::Display for DiscreteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.id, self.cardinality)
    }
}

/// Mapping from variable id to chosen state index.
///
/// After [`crate::discrete::DiscreteBayesNet::optimize`] or
/// [`crate::discrete::DiscreteBayesNet::sample`] the assignment is total over
/// all variables referenced by the net.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    values: HashMap<Key, usize>,
}

impl Assignment {
    /// Create an empty assignment
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of a variable
    pub fn insert(&mut self, key: Key, value: usize) {
        self.values.insert(key, value);
    }

    /// Get the state of a variable, if assigned
    pub fn get(&self, key: Key) -> Option<usize> {
        self.values.get(&key).copied()
    }

    /// Number of assigned variables
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no variable is assigned
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (variable id, state) pairs in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (Key, usize)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }
}

impl FromIterator<(Key, usize)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (Key, usize)>>(iter: I) -> Self {
        Assignment {
            values: iter.into_iter().collect(),
        }
    }
}

/// Declarative specification of a conditional P(variable | parents).
///
/// The table is laid out row-per-parent-combination: parents form a
/// mixed-radix index with the first parent as the most significant digit,
/// and each row lists the (unnormalized) weights of the variable's states.
/// For a root variable the table is a single row.
///
/// # Example
/// ```
/// use trellis_solver::discrete::{DiscreteKey, Signature};
///
/// let asia = DiscreteKey::new(0, 2);
/// let smoking = DiscreteKey::new(1, 2);
/// // P(asia | smoking): one row per smoking state
/// let signature = Signature::new(asia)
///     .given(smoking)
///     .table(&[0.95, 0.05, 0.8, 0.2]);
/// ```
#[derive(Debug, Clone)]
pub struct Signature {
    /// The variable the conditional is over
    pub variable: DiscreteKey,
    /// Parent variables, most significant first in the row index
    pub parents: Vec<DiscreteKey>,
    /// Row-major table of state weights, one row per parent combination
    pub table: Vec<f64>,
}

impl Signature {
    /// Start a signature for the given variable
    pub fn new(variable: DiscreteKey) -> Self {
        Signature {
            variable,
            parents: Vec::new(),
            table: Vec::new(),
        }
    }

    /// Add a parent variable
    pub fn given(mut self, parent: DiscreteKey) -> Self {
        self.parents.push(parent);
        self
    }

    /// Set the probability table
    pub fn table(mut self, table: &[f64]) -> Self {
        self.table = table.to_vec();
        self
    }
}

/// An immutable discrete conditional probability table P(variable | parents).
///
/// Rows are normalized at construction, so each row is exactly the
/// conditional distribution of the variable given one parent combination.
#[derive(Debug, Clone)]
pub struct DiscreteConditional {
    variable: DiscreteKey,
    parents: Vec<DiscreteKey>,
    table: Vec<f64>,
}

impl DiscreteConditional {
    /// Build a conditional from a declarative signature.
    ///
    /// The table length must equal `product(parent cardinalities) *
    /// variable.cardinality` and every row must have positive mass; each row
    /// is normalized to sum to one.
    pub fn from_signature(signature: Signature) -> TrellisResult<Self> {
        let Signature {
            variable,
            parents,
            mut table,
        } = signature;

        if variable.cardinality == 0 {
            return Err(TrellisError::InvalidInput(format!(
                "variable {} has zero cardinality",
                variable.id
            )));
        }
        let rows: usize = parents.iter().map(|p| p.cardinality).product();
        let expected = rows * variable.cardinality;
        if table.len() != expected {
            return Err(TrellisError::InvalidInput(format!(
                "table for variable {} has {} entries, expected {}",
                variable.id,
                table.len(),
                expected
            )));
        }
        if table.iter().any(|&p| p < 0.0 || !p.is_finite()) {
            return Err(TrellisError::InvalidInput(format!(
                "table for variable {} contains negative or non-finite entries",
                variable.id
            )));
        }

        for row in 0..rows {
            let slice = &mut table[row * variable.cardinality..(row + 1) * variable.cardinality];
            let sum: f64 = slice.iter().sum();
            if sum <= 0.0 {
                return Err(TrellisError::InvalidInput(format!(
                    "table row {} for variable {} has zero mass",
                    row, variable.id
                )));
            }
            for p in slice.iter_mut() {
                *p /= sum;
            }
        }

        Ok(DiscreteConditional {
            variable,
            parents,
            table,
        })
    }

    /// The variable this conditional is over
    pub fn variable(&self) -> DiscreteKey {
        self.variable
    }

    /// The parent variables
    pub fn parents(&self) -> &[DiscreteKey] {
        &self.parents
    }

    /// Row index for the given parent values (mixed radix, first parent most
    /// significant). Missing or out-of-range parent values are invalid input.
    fn row_index(&self, assignment: &Assignment) -> TrellisResult<usize> {
        let mut row = 0;
        for parent in &self.parents {
            let value = assignment.get(parent.id).ok_or_else(|| {
                TrellisError::InvalidInput(format!(
                    "assignment is missing parent {} of variable {}",
                    parent.id, self.variable.id
                ))
            })?;
            if value >= parent.cardinality {
                return Err(TrellisError::InvalidInput(format!(
                    "state {} out of range for parent {} (cardinality {})",
                    value, parent.id, parent.cardinality
                )));
            }
            row = row * parent.cardinality + value;
        }
        Ok(row)
    }

    /// The conditional distribution row selected by the parent values
    fn distribution(&self, assignment: &Assignment) -> TrellisResult<&[f64]> {
        let row = self.row_index(assignment)?;
        let start = row * self.variable.cardinality;
        Ok(&self.table[start..start + self.variable.cardinality])
    }

    /// Table value P(variable = assignment[variable] | parents = assignment[parents])
    pub fn evaluate(&self, assignment: &Assignment) -> TrellisResult<f64> {
        let distribution = self.distribution(assignment)?;
        let value = assignment.get(self.variable.id).ok_or_else(|| {
            TrellisError::InvalidInput(format!(
                "assignment is missing variable {}",
                self.variable.id
            ))
        })?;
        if value >= self.variable.cardinality {
            return Err(TrellisError::InvalidInput(format!(
                "state {} out of range for variable {} (cardinality {})",
                value, self.variable.id, self.variable.cardinality
            )));
        }
        Ok(distribution[value])
    }

    /// The state of this conditional's variable that maximizes the
    /// conditional probability given already-assigned parent values.
    /// Ties resolve to the lowest state index.
    pub fn solve(&self, parents: &Assignment) -> TrellisResult<usize> {
        let distribution = self.distribution(parents)?;
        let mut best = 0;
        for (state, &p) in distribution.iter().enumerate() {
            if p > distribution[best] {
                best = state;
            }
        }
        Ok(best)
    }

    /// Draw one state of this conditional's variable from its conditional
    /// distribution given already-assigned parent values (inverse CDF).
    pub fn sample_with<R: Rng + ?Sized>(
        &self,
        parents: &Assignment,
        rng: &mut R,
    ) -> TrellisResult<usize> {
        let distribution = self.distribution(parents)?;
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for (state, &p) in distribution.iter().enumerate() {
            cumulative += p;
            if u < cumulative {
                return Ok(state);
            }
        }
        // Rounding slack: the row sums to 1 up to floating point error.
        Ok(self.variable.cardinality - 1)
    }
}

impl fmt::Display for DiscreteConditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P({}", self.variable)?;
        if !self.parents.is_empty() {
            write!(f, " |")?;
            for parent in &self.parents {
                write!(f, " {}", parent)?;
            }
        }
        write!(f, ")")
    }
}
