//! Integration tests for the Levenberg-Marquardt optimization loop, driven
//! through the public trait seams with vector-space estimates.

use nalgebra::{dmatrix, dvector};
use trellis_solver::linear::{GaussianFactorGraph, JacobianFactor};
use trellis_solver::nonlinear::{
    EuclideanValues, LevenbergMarquardt, LmConfig, NonlinearGraph, Ordering,
};
use trellis_solver::TrellisResult;

const X0: usize = 0;
const X1: usize = 1;

/// Convex quadratic: minimize (x - 3)^2 over a single scalar variable.
struct QuadraticGraph;

impl QuadraticGraph {
    fn x(values: &EuclideanValues) -> f64 {
        values.get(X0).map_or(0.0, |v| v[0])
    }
}

impl NonlinearGraph for QuadraticGraph {
    type Values = EuclideanValues;

    fn linearize(
        &self,
        values: &EuclideanValues,
        _ordering: &Ordering,
    ) -> TrellisResult<GaussianFactorGraph> {
        let x = Self::x(values);
        let mut linear = GaussianFactorGraph::new();
        // residual x - 3, Jacobian 1, rhs is the negated residual
        linear.push(JacobianFactor::unary(0, dmatrix![1.0], dvector![3.0 - x])?);
        Ok(linear)
    }

    fn error(&self, values: &EuclideanValues) -> f64 {
        (Self::x(values) - 3.0).powi(2)
    }
}

/// Two-variable chain: prior x0 = 1 plus between constraint x1 - x0 = 2.
/// Minimum at (1, 3) with zero error.
struct ChainGraph;

impl NonlinearGraph for ChainGraph {
    type Values = EuclideanValues;

    fn linearize(
        &self,
        values: &EuclideanValues,
        ordering: &Ordering,
    ) -> TrellisResult<GaussianFactorGraph> {
        let x0 = values.get(X0).map_or(0.0, |v| v[0]);
        let x1 = values.get(X1).map_or(0.0, |v| v[0]);
        let i0 = ordering.index_of(X0).expect("X0 in ordering");
        let i1 = ordering.index_of(X1).expect("X1 in ordering");

        let mut linear = GaussianFactorGraph::new();
        linear.push(JacobianFactor::unary(i0, dmatrix![1.0], dvector![1.0 - x0])?);
        linear.push(JacobianFactor::new(
            vec![i0, i1],
            vec![dmatrix![-1.0], dmatrix![1.0]],
            dvector![2.0 - (x1 - x0)],
        )?);
        Ok(linear)
    }

    fn error(&self, values: &EuclideanValues) -> f64 {
        let x0 = values.get(X0).map_or(0.0, |v| v[0]);
        let x1 = values.get(X1).map_or(0.0, |v| v[0]);
        (x0 - 1.0).powi(2) + ((x1 - x0) - 2.0).powi(2)
    }
}

fn strategies() -> [(&'static str, &'static str); 4] {
    [
        ("cholesky", "sequential"),
        ("cholesky", "multifrontal"),
        ("qr", "sequential"),
        ("qr", "multifrontal"),
    ]
}

#[test]
fn quadratic_converges_with_every_strategy() {
    for (factorization, elimination) in strategies() {
        let config = LmConfig::default()
            .with_factorization(factorization)
            .with_elimination(elimination);
        let mut optimizer =
            LevenbergMarquardt::with_config(QuadraticGraph, Ordering::from_keys(vec![X0]), config);

        let mut values = EuclideanValues::new();
        values.insert(X0, dvector![0.0]);
        let mut state = optimizer.initial_state(values);
        assert_eq!(state.error, 9.0);

        let mut errors = vec![state.error];
        for _ in 0..20 {
            state = optimizer.iterate(&state).unwrap();
            errors.push(state.error);
        }

        assert!(
            errors.windows(2).all(|w| w[1] <= w[0]),
            "error sequence must be non-increasing with {}/{}: {:?}",
            factorization,
            elimination,
            errors
        );
        let x = state.values.get(X0).unwrap()[0];
        assert!(
            (x - 3.0).abs() < 1e-6,
            "estimate {} did not converge to 3 with {}/{}",
            x,
            factorization,
            elimination
        );
        assert_eq!(state.iterations, 20);
    }
}

#[test]
fn chain_converges_to_exact_minimum() {
    let mut optimizer = LevenbergMarquardt::new(ChainGraph, Ordering::from_keys(vec![X0, X1]));

    let mut values = EuclideanValues::new();
    values.insert(X0, dvector![-4.0]);
    values.insert(X1, dvector![7.0]);
    let mut state = optimizer.initial_state(values);

    for _ in 0..10 {
        let next = optimizer.iterate(&state).unwrap();
        assert!(next.error <= state.error);
        state = next;
    }

    assert!(state.error < 1e-10);
    assert!((state.values.get(X0).unwrap()[0] - 1.0).abs() < 1e-5);
    assert!((state.values.get(X1).unwrap()[0] - 3.0).abs() < 1e-5);
}

#[test]
fn states_form_an_inspectable_chain() {
    let mut optimizer =
        LevenbergMarquardt::new(QuadraticGraph, Ordering::from_keys(vec![X0]));

    let mut values = EuclideanValues::new();
    values.insert(X0, dvector![0.0]);

    let mut states = vec![optimizer.initial_state(values)];
    for i in 0..5 {
        let next = optimizer.iterate(&states[i]).unwrap();
        states.push(next);
    }

    for (i, pair) in states.windows(2).enumerate() {
        assert_eq!(pair[1].iterations, pair[0].iterations + 1);
        assert!(pair[1].error <= pair[0].error, "regressed at step {}", i);
    }
    assert!(states[5].made_progress(&states[0]));
}
