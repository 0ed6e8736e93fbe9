//! Nonlinear factor-graph optimization.
//!
//! The optimizer in this module orchestrates external capabilities through
//! two trait seams: [`NonlinearGraph`] (linearization and total error of the
//! fixed factor graph) and [`Values`] (per-variable dimensions and the
//! manifold retraction of the estimate). Jacobian computation and
//! factorization internals stay outside this module; the
//! [`LevenbergMarquardt`] loop only owns the damping schedule and the
//! iterate/accept/reject control flow.

use crate::error::TrellisResult;
use crate::linear::{GaussianFactorGraph, VectorValues};
use crate::Key;
use nalgebra::DVector;
use std::collections::HashMap;

pub mod levenberg_marquardt;

pub use levenberg_marquardt::{LevenbergMarquardt, LmState};

/// Fixed variable sequencing used for linearization.
///
/// Computed once per optimization run and reused every iteration; factor
/// blocks and step segments are indexed by position in this ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering {
    keys: Vec<Key>,
}

impl Ordering {
    /// Create an ordering over the given keys
    pub fn from_keys(keys: Vec<Key>) -> Self {
        Ordering { keys }
    }

    /// The keys in order
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Position of a key in the ordering
    pub fn index_of(&self, key: Key) -> Option<usize> {
        self.keys.iter().position(|&k| k == key)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ordering is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<Key> for Ordering {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Ordering {
            keys: iter.into_iter().collect(),
        }
    }
}

/// A continuous estimate the optimizer can retract solved steps onto.
///
/// For vector-space estimates retraction degenerates to addition (see
/// [`EuclideanValues`]); manifold-valued estimates supply their own update.
pub trait Values: Clone {
    /// Per-variable tangent-space dimensions under the ordering.
    ///
    /// The result is only valid for the ordering it was computed with; the
    /// optimizer caches it per run.
    fn dims(&self, ordering: &Ordering) -> Vec<usize>;

    /// Apply a solved step onto this estimate, producing a new estimate
    fn retract(&self, step: &VectorValues, ordering: &Ordering) -> Self;
}

/// A fixed set of nonlinear residual factors over continuous variables.
///
/// Immutable across one optimization run. `linearize` must be deterministic
/// for a fixed estimate/ordering pair.
pub trait NonlinearGraph {
    /// The estimate type this graph is defined over
    type Values: Values;

    /// Local linear (Gaussian) approximation of the graph at the estimate
    fn linearize(
        &self,
        values: &Self::Values,
        ordering: &Ordering,
    ) -> TrellisResult<GaussianFactorGraph>;

    /// Total residual cost at the estimate, always >= 0
    fn error(&self, values: &Self::Values) -> f64;
}

/// Vector-space estimate: one `DVector` block per key, retraction is
/// plain addition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EuclideanValues {
    values: HashMap<Key, DVector<f64>>,
}

impl EuclideanValues {
    /// Create an empty estimate
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block of a variable
    pub fn insert(&mut self, key: Key, value: DVector<f64>) {
        self.values.insert(key, value);
    }

    /// Get the block of a variable
    pub fn get(&self, key: Key) -> Option<&DVector<f64>> {
        self.values.get(&key)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no variable is present
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Values for EuclideanValues {
    fn dims(&self, ordering: &Ordering) -> Vec<usize> {
        ordering
            .keys()
            .iter()
            .map(|key| self.values.get(key).map_or(0, |v| v.len()))
            .collect()
    }

    fn retract(&self, step: &VectorValues, ordering: &Ordering) -> Self {
        let mut updated = self.clone();
        for (index, key) in ordering.keys().iter().enumerate() {
            if let Some(block) = updated.values.get_mut(key) {
                *block += step.segment(index);
            }
        }
        updated
    }
}

/// Configuration for the Levenberg-Marquardt optimizer.
///
/// The factorization and elimination selectors are plain strings, resolved
/// (and validated) at the start of every [`LevenbergMarquardt::iterate`]
/// call; unknown selectors are a fatal configuration error raised before any
/// linearization or solve attempt.
#[derive(Debug, Clone)]
pub struct LmConfig {
    /// Initial damping factor, must be > 0
    pub lambda_initial: f64,
    /// Multiplicative damping adjustment, must be > 1
    pub lambda_factor: f64,
    /// Upper bound on the damping factor; reaching it without progress ends
    /// the inner trial loop
    pub lambda_upper_bound: f64,
    /// Linear solver factorization selector: "cholesky" or "qr"
    pub factorization: String,
    /// Elimination strategy selector: "sequential" or "multifrontal"
    pub elimination: String,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            lambda_initial: 1e-5,
            lambda_factor: 10.0,
            lambda_upper_bound: 1e5,
            factorization: "cholesky".to_string(),
            elimination: "multifrontal".to_string(),
        }
    }
}

impl LmConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial damping factor
    pub fn with_lambda_initial(mut self, lambda_initial: f64) -> Self {
        self.lambda_initial = lambda_initial;
        self
    }

    /// Set the multiplicative damping adjustment factor
    pub fn with_lambda_factor(mut self, lambda_factor: f64) -> Self {
        self.lambda_factor = lambda_factor;
        self
    }

    /// Set the damping upper bound
    pub fn with_lambda_upper_bound(mut self, lambda_upper_bound: f64) -> Self {
        self.lambda_upper_bound = lambda_upper_bound;
        self
    }

    /// Set the factorization selector
    pub fn with_factorization(mut self, factorization: &str) -> Self {
        self.factorization = factorization.to_string();
        self
    }

    /// Set the elimination selector
    pub fn with_elimination(mut self, elimination: &str) -> Self {
        self.elimination = elimination.to_string();
        self
    }
}
