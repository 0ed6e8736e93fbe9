//! Gaussian linear systems produced by linearization.
//!
//! A [`GaussianFactorGraph`] is an ordered collection of already-whitened
//! [`JacobianFactor`]s over variables indexed by their position in the run's
//! ordering. The Levenberg-Marquardt loop never solves the raw system: it
//! builds a [damped copy](GaussianFactorGraph::damped) with one isotropic
//! prior per variable and hands that to the [`solver`] module.

use crate::error::{TrellisError, TrellisResult};
use nalgebra::{DMatrix, DVector};

pub mod solver;

pub use solver::{solve, Elimination, Factorization, SolveOutcome};

/// One whitened block row of a Gaussian linear system.
///
/// Contributes `‖Σ_k A_k · dx_k − b‖²` to the least-squares objective, where
/// `A_k` is the block for the k-th involved variable and `keys` are indices
/// into the run's [`crate::nonlinear::Ordering`].
#[derive(Debug, Clone)]
pub struct JacobianFactor {
    keys: Vec<usize>,
    blocks: Vec<DMatrix<f64>>,
    rhs: DVector<f64>,
}

impl JacobianFactor {
    /// Create a factor over the given ordering indices.
    ///
    /// All blocks must share the same row count, which must match the rhs
    /// length.
    pub fn new(
        keys: Vec<usize>,
        blocks: Vec<DMatrix<f64>>,
        rhs: DVector<f64>,
    ) -> TrellisResult<Self> {
        if keys.len() != blocks.len() {
            return Err(TrellisError::InvalidInput(format!(
                "factor has {} keys but {} blocks",
                keys.len(),
                blocks.len()
            )));
        }
        if keys.is_empty() {
            return Err(TrellisError::InvalidInput(
                "factor involves no variables".to_string(),
            ));
        }
        for block in &blocks {
            if block.nrows() != rhs.len() {
                return Err(TrellisError::InvalidInput(format!(
                    "block has {} rows but rhs has {}",
                    block.nrows(),
                    rhs.len()
                )));
            }
        }
        Ok(JacobianFactor { keys, blocks, rhs })
    }

    /// Create a factor over a single variable
    pub fn unary(key: usize, block: DMatrix<f64>, rhs: DVector<f64>) -> TrellisResult<Self> {
        Self::new(vec![key], vec![block], rhs)
    }

    /// Unary isotropic prior centered at zero displacement with the given
    /// standard deviation: whitened rows `(1/sigma)·I`, zero rhs. This is the
    /// regularizing factor the damping schedule appends per variable.
    pub fn isotropic_prior(key: usize, dim: usize, sigma: f64) -> Self {
        JacobianFactor {
            keys: vec![key],
            blocks: vec![DMatrix::identity(dim, dim) / sigma],
            rhs: DVector::zeros(dim),
        }
    }

    /// Ordering indices of the involved variables
    pub fn keys(&self) -> &[usize] {
        &self.keys
    }

    /// Whitened Jacobian blocks, one per key
    pub fn blocks(&self) -> &[DMatrix<f64>] {
        &self.blocks
    }

    /// Whitened right-hand side
    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Number of residual rows this factor contributes
    pub fn rows(&self) -> usize {
        self.rhs.len()
    }
}

/// An ordered collection of [`JacobianFactor`]s forming one linear system.
#[derive(Debug, Clone, Default)]
pub struct GaussianFactorGraph {
    factors: Vec<JacobianFactor>,
}

impl GaussianFactorGraph {
    /// Create an empty linear system
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factor
    pub fn push(&mut self, factor: JacobianFactor) {
        self.factors.push(factor);
    }

    /// Number of factors
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Whether the system holds no factors
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// The factors in insertion order
    pub fn factors(&self) -> &[JacobianFactor] {
        &self.factors
    }

    /// Total residual rows across all factors
    pub fn residual_rows(&self) -> usize {
        self.factors.iter().map(|f| f.rows()).sum()
    }

    /// Build the damped copy of this system: the original factors plus one
    /// unary isotropic prior per variable with standard deviation
    /// `1/sqrt(lambda)` centered at zero. The original is not mutated.
    ///
    /// Larger lambda means a tighter prior and a more conservative step;
    /// smaller lambda approaches the undamped Gauss-Newton solution.
    pub fn damped(&self, lambda: f64, dims: &[usize]) -> GaussianFactorGraph {
        let sigma = 1.0 / lambda.sqrt();
        let mut damped = self.clone();
        damped.factors.reserve(dims.len());
        for (key, &dim) in dims.iter().enumerate() {
            damped.push(JacobianFactor::isotropic_prior(key, dim, sigma));
        }
        damped
    }
}

/// The solved step, laid out as per-variable segments under the ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorValues {
    segments: Vec<DVector<f64>>,
}

impl VectorValues {
    /// Split a flat solution vector into per-variable segments
    pub fn from_flat(flat: &DVector<f64>, dims: &[usize]) -> TrellisResult<Self> {
        let total: usize = dims.iter().sum();
        if flat.len() != total {
            return Err(TrellisError::LinearAlgebra(format!(
                "solution has {} rows but the ordering dimensions sum to {}",
                flat.len(),
                total
            )));
        }
        let mut segments = Vec::with_capacity(dims.len());
        let mut offset = 0;
        for &dim in dims {
            segments.push(flat.rows(offset, dim).into_owned());
            offset += dim;
        }
        Ok(VectorValues { segments })
    }

    /// Step segment of the variable at the given ordering index
    pub fn segment(&self, index: usize) -> &DVector<f64> {
        &self.segments[index]
    }

    /// Number of variable segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the step holds no segments
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total dimension across all segments
    pub fn dim(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }

    /// Euclidean norm of the full step
    pub fn norm(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.norm_squared())
            .sum::<f64>()
            .sqrt()
    }
}
