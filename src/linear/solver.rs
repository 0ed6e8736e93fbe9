//! Elimination-order linear solvers for damped Gaussian systems.
//!
//! Two interchangeable elimination strategies are provided: a dense
//! sequential path backed by `nalgebra` (small systems) and a sparse
//! multifrontal path backed by `faer` (large, sparse systems). Each supports
//! Cholesky of the normal equations or QR of the stacked Jacobian.
//!
//! Numerical indefiniteness (the system is not safely factorable) is
//! reported as [`SolveOutcome::Indefinite`] so the damping-trial loop can
//! branch on the tag; every other failure is fatal and returned as an error.

use crate::error::{TrellisError, TrellisResult};
use crate::linear::{GaussianFactorGraph, VectorValues};
use faer::linalg::solvers::{Solve, SolveLstsqCore};
use faer::sparse::linalg::solvers;
use faer::sparse::{SparseColMat, Triplet};
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::str::FromStr;

/// Matrix factorization used by the linear solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Factorization {
    /// Cholesky factorization of the normal equations (fast, requires a
    /// positive-definite system)
    #[default]
    Cholesky,
    /// QR factorization of the stacked Jacobian (slower, better conditioned)
    Qr,
}

impl FromStr for Factorization {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cholesky" => Ok(Factorization::Cholesky),
            "qr" => Ok(Factorization::Qr),
            other => Err(TrellisError::InvalidConfig(format!(
                "unknown factorization '{}' (expected 'cholesky' or 'qr')",
                other
            ))),
        }
    }
}

impl fmt::Display for Factorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factorization::Cholesky => write!(f, "cholesky"),
            Factorization::Qr => write!(f, "qr"),
        }
    }
}

/// Elimination strategy used by the linear solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Elimination {
    /// Dense sequential elimination (nalgebra)
    Sequential,
    /// Sparse multifrontal elimination (faer)
    #[default]
    Multifrontal,
}

impl FromStr for Elimination {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Elimination::Sequential),
            "multifrontal" => Ok(Elimination::Multifrontal),
            other => Err(TrellisError::InvalidConfig(format!(
                "unknown elimination '{}' (expected 'sequential' or 'multifrontal')",
                other
            ))),
        }
    }
}

impl fmt::Display for Elimination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Elimination::Sequential => write!(f, "sequential"),
            Elimination::Multifrontal => write!(f, "multifrontal"),
        }
    }
}

/// Tagged result of a damped solve.
///
/// `Indefinite` is recoverable: the damping-trial loop treats it as a
/// rejected trial and retries with a larger lambda. Fatal failures are
/// returned as `Err` instead, never as a variant here.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    /// The solved step vector
    Step(VectorValues),
    /// The system is not safely factorable at this damping level
    Indefinite,
}

/// Column offsets of each variable under the ordering dimensions
fn column_offsets(dims: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(dims.len());
    let mut offset = 0;
    for &dim in dims {
        offsets.push(offset);
        offset += dim;
    }
    offsets
}

/// Validate factor shapes against the ordering dimensions.
/// Mismatches are structural, hence fatal.
fn check_shapes(system: &GaussianFactorGraph, dims: &[usize]) -> TrellisResult<()> {
    for factor in system.factors() {
        for (&key, block) in factor.keys().iter().zip(factor.blocks()) {
            if key >= dims.len() {
                return Err(TrellisError::LinearAlgebra(format!(
                    "factor references variable index {} but the ordering has {} variables",
                    key,
                    dims.len()
                )));
            }
            if block.ncols() != dims[key] {
                return Err(TrellisError::LinearAlgebra(format!(
                    "block for variable {} has {} columns, expected {}",
                    key,
                    block.ncols(),
                    dims[key]
                )));
            }
        }
    }
    Ok(())
}

/// Solve the (damped) system for a step vector.
///
/// The system is interpreted as the least-squares problem
/// `min ‖A·dx − b‖²` over the stacked factor rows, with columns laid out by
/// `dims` under the run's ordering.
pub fn solve(
    system: &GaussianFactorGraph,
    dims: &[usize],
    factorization: Factorization,
    elimination: Elimination,
) -> TrellisResult<SolveOutcome> {
    check_shapes(system, dims)?;
    match elimination {
        Elimination::Sequential => solve_dense(system, dims, factorization),
        Elimination::Multifrontal => solve_sparse(system, dims, factorization),
    }
}

/// Stack all factor rows into a dense Jacobian and rhs
fn assemble_dense(system: &GaussianFactorGraph, dims: &[usize]) -> (DMatrix<f64>, DVector<f64>) {
    let offsets = column_offsets(dims);
    let cols: usize = dims.iter().sum();
    let rows = system.residual_rows();

    let mut a = DMatrix::zeros(rows, cols);
    let mut b = DVector::zeros(rows);
    let mut row = 0;
    for factor in system.factors() {
        for (&key, block) in factor.keys().iter().zip(factor.blocks()) {
            a.view_mut((row, offsets[key]), (block.nrows(), block.ncols()))
                .copy_from(block);
        }
        b.rows_mut(row, factor.rows()).copy_from(factor.rhs());
        row += factor.rows();
    }
    (a, b)
}

fn solve_dense(
    system: &GaussianFactorGraph,
    dims: &[usize],
    factorization: Factorization,
) -> TrellisResult<SolveOutcome> {
    let (a, b) = assemble_dense(system, dims);

    match factorization {
        Factorization::Cholesky => {
            // Normal equations: (A^T A) dx = A^T b
            let hessian = a.transpose() * &a;
            let gradient = a.transpose() * &b;
            match nalgebra::linalg::Cholesky::new(hessian) {
                Some(cholesky) => {
                    let dx = cholesky.solve(&gradient);
                    Ok(SolveOutcome::Step(VectorValues::from_flat(&dx, dims)?))
                }
                None => Ok(SolveOutcome::Indefinite),
            }
        }
        Factorization::Qr => {
            // Thin QR of the stacked Jacobian: R dx = Q^T b
            let qr = a.qr();
            let qtb = qr.q().transpose() * &b;
            match qr.r().solve_upper_triangular(&qtb) {
                Some(dx) => Ok(SolveOutcome::Step(VectorValues::from_flat(&dx, dims)?)),
                // Singular triangular factor: rank deficient, recoverable by damping
                None => Ok(SolveOutcome::Indefinite),
            }
        }
    }
}

/// Stack all factor rows into a sparse Jacobian and dense rhs
fn assemble_sparse(
    system: &GaussianFactorGraph,
    dims: &[usize],
) -> TrellisResult<(SparseColMat<usize, f64>, faer::Mat<f64>)> {
    let offsets = column_offsets(dims);
    let cols: usize = dims.iter().sum();
    let rows = system.residual_rows();

    let mut triplets = Vec::new();
    let mut b = faer::Mat::<f64>::zeros(rows, 1);
    let mut row = 0;
    for factor in system.factors() {
        for (&key, block) in factor.keys().iter().zip(factor.blocks()) {
            for r in 0..block.nrows() {
                for c in 0..block.ncols() {
                    let value = block[(r, c)];
                    if value.abs() > 1e-15 {
                        triplets.push(Triplet::new(row + r, offsets[key] + c, value));
                    }
                }
            }
        }
        for r in 0..factor.rows() {
            b[(row + r, 0)] = factor.rhs()[r];
        }
        row += factor.rows();
    }

    let a = SparseColMat::try_new_from_triplets(rows, cols, &triplets).map_err(|e| {
        TrellisError::LinearAlgebra(format!("failed to create sparse matrix: {:?}", e))
    })?;
    Ok((a, b))
}

fn solve_sparse(
    system: &GaussianFactorGraph,
    dims: &[usize],
    factorization: Factorization,
) -> TrellisResult<SolveOutcome> {
    let cols: usize = dims.iter().sum();
    let (a, b) = assemble_sparse(system, dims)?;

    match factorization {
        Factorization::Cholesky => {
            // Normal equations: (A^T A) dx = A^T b
            let hessian = a
                .as_ref()
                .transpose()
                .to_col_major()
                .map_err(|e| {
                    TrellisError::LinearAlgebra(format!("failed to transpose Jacobian: {:?}", e))
                })?
                * a.as_ref();
            let gradient = a.as_ref().transpose() * b;

            let symbolic = solvers::SymbolicLlt::try_new(hessian.symbolic(), faer::Side::Lower)
                .map_err(|e| {
                    TrellisError::LinearAlgebra(format!("symbolic analysis failed: {:?}", e))
                })?;
            match solvers::Llt::try_new_with_symbolic(symbolic, hessian.as_ref(), faer::Side::Lower)
            {
                Ok(cholesky) => {
                    let dx = cholesky.solve(gradient);
                    let flat = DVector::from_fn(cols, |i, _| dx[(i, 0)]);
                    Ok(SolveOutcome::Step(VectorValues::from_flat(&flat, dims)?))
                }
                // Non-positive pivot: the system is indefinite at this damping level
                Err(_) => Ok(SolveOutcome::Indefinite),
            }
        }
        Factorization::Qr => {
            let symbolic = solvers::SymbolicQr::try_new(a.symbolic()).map_err(|e| {
                TrellisError::Solver(format!("sparse QR factorization failed: {:?}", e))
            })?;
            let qr = solvers::Qr::try_new_with_symbolic(symbolic, a.as_ref()).map_err(|e| {
                TrellisError::Solver(format!("sparse QR factorization failed: {:?}", e))
            })?;
            let mut solution = b;
            qr.solve_lstsq_in_place_with_conj(faer::Conj::No, solution.as_mut());
            let flat = DVector::from_fn(cols, |i, _| solution[(i, 0)]);
            Ok(SolveOutcome::Step(VectorValues::from_flat(&flat, dims)?))
        }
    }
}
