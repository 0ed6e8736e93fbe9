//! Levenberg-Marquardt optimization loop.
//!
//! The Levenberg-Marquardt algorithm interpolates between the Gauss-Newton
//! algorithm and gradient descent by adding a damping factor lambda: each
//! outer iteration linearizes the graph once, then runs an inner trial loop
//! that solves a damped copy of the linear system, retracts the step onto
//! the estimate, and accepts or rejects the result while adjusting lambda.
//!
//! Recoverable numerical conditions (indefinite damped systems, steps that
//! worsen the error) are resolved entirely inside the trial loop; `iterate`
//! itself only fails for configuration errors or fatal solver failures.

use crate::error::{TrellisError, TrellisResult};
use crate::linear::{solver, Elimination, Factorization, SolveOutcome};
use crate::nonlinear::{LmConfig, NonlinearGraph, Ordering, Values};
use tracing::{debug, warn};

/// Immutable snapshot of one optimization iteration.
///
/// Each call to [`LevenbergMarquardt::iterate`] produces a fresh state from
/// the previous one; prior states are never mutated, so a caller can keep
/// the chain for convergence diagnostics.
#[derive(Debug, Clone)]
pub struct LmState<V> {
    /// Current estimate
    pub values: V,
    /// Total graph error at the estimate, always >= 0; non-increasing
    /// across accepted iterations
    pub error: f64,
    /// Current damping factor, always > 0
    pub lambda: f64,
    /// Number of outer iterations performed so far
    pub iterations: usize,
}

impl<V> LmState<V> {
    /// Whether this state improved on the previous one.
    ///
    /// Both lambda-saturation give-up and true convergence leave the error
    /// unchanged while the iteration count advances; the loop does not
    /// distinguish them, so a driver's stopping policy should compare
    /// consecutive states with this helper.
    pub fn made_progress(&self, previous: &Self) -> bool {
        self.error < previous.error
    }
}

/// Levenberg-Marquardt optimizer over a fixed nonlinear graph and ordering.
///
/// The per-variable dimension vector is instance state, computed lazily on
/// the first [`iterate`](LevenbergMarquardt::iterate) call and reused for
/// the optimizer's lifetime; it is only valid for this instance's ordering.
/// `iterate` therefore takes `&mut self` and an instance must not be shared
/// across concurrent calls, though independent instances are fully isolated.
pub struct LevenbergMarquardt<G: NonlinearGraph> {
    graph: G,
    ordering: Ordering,
    config: LmConfig,
    dims: Option<Vec<usize>>,
}

impl<G: NonlinearGraph> LevenbergMarquardt<G> {
    /// Create an optimizer with the default configuration
    pub fn new(graph: G, ordering: Ordering) -> Self {
        Self::with_config(graph, ordering, LmConfig::default())
    }

    /// Create an optimizer with the given configuration
    pub fn with_config(graph: G, ordering: Ordering, config: LmConfig) -> Self {
        Self {
            graph,
            ordering,
            config,
            dims: None,
        }
    }

    /// The fixed nonlinear graph
    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// The run-level ordering
    pub fn ordering(&self) -> &Ordering {
        &self.ordering
    }

    /// The optimizer configuration
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Wrap an initial estimate: computes its error under the graph, seeds
    /// lambda from the configuration, iteration count zero.
    pub fn initial_state(&self, values: G::Values) -> LmState<G::Values> {
        let error = self.graph.error(&values);
        LmState {
            values,
            error,
            lambda: self.config.lambda_initial,
            iterations: 0,
        }
    }

    /// Resolve and validate the configured strategy selectors.
    /// Fatal on unknown selectors or non-positive damping parameters.
    fn resolve_config(&self) -> TrellisResult<(Factorization, Elimination)> {
        let factorization: Factorization = self.config.factorization.parse()?;
        let elimination: Elimination = self.config.elimination.parse()?;
        if self.config.lambda_initial <= 0.0 {
            return Err(TrellisError::InvalidConfig(format!(
                "lambda_initial must be > 0, got {}",
                self.config.lambda_initial
            )));
        }
        if self.config.lambda_factor <= 1.0 {
            return Err(TrellisError::InvalidConfig(format!(
                "lambda_factor must be > 1, got {}",
                self.config.lambda_factor
            )));
        }
        Ok((factorization, elimination))
    }

    /// Perform one outer Levenberg-Marquardt iteration.
    ///
    /// Linearizes the graph once at the current estimate, then repeatedly
    /// solves damped copies of the linear system until a step is accepted
    /// (candidate error <= current error) or lambda saturates at its upper
    /// bound. Saturation is not an error: the returned state keeps the
    /// current estimate and error with the iteration count advanced.
    pub fn iterate(&mut self, current: &LmState<G::Values>) -> TrellisResult<LmState<G::Values>> {
        // Configuration errors are fatal and must surface before any
        // linearization or solve attempt.
        let (factorization, elimination) = self.resolve_config()?;

        // Linearize once; the linear system is fixed across inner trials.
        let linear = self.graph.linearize(&current.values, &self.ordering)?;

        // Computed on the first call only, then reused for this instance.
        let dims = self
            .dims
            .get_or_insert_with(|| current.values.dims(&self.ordering))
            .clone();

        let mut lambda = current.lambda;
        let mut next_values = current.values.clone();
        let mut next_error = current.error;

        // Keep increasing lambda until we make progress or saturate. The
        // upper bound is the sole non-progress termination guard.
        loop {
            debug!(lambda, "trying damping trial");
            let damped = linear.damped(lambda, &dims);
            match solver::solve(&damped, &dims, factorization, elimination)? {
                SolveOutcome::Step(step) => {
                    debug!(step_norm = step.norm(), "solved damped system");
                    let candidate = current.values.retract(&step, &self.ordering);
                    let error = self.graph.error(&candidate);
                    if error <= current.error {
                        // Accept: become more adventurous.
                        next_values = candidate;
                        next_error = error;
                        lambda /= self.config.lambda_factor;
                        break;
                    } else if lambda >= self.config.lambda_upper_bound {
                        warn!(
                            lambda,
                            "giving up: cannot decrease error with maximum lambda"
                        );
                        break;
                    } else {
                        lambda *= self.config.lambda_factor;
                    }
                }
                SolveOutcome::Indefinite => {
                    // Implicit rejection of this trial.
                    debug!(lambda, "damped system indefinite, increasing lambda");
                    if lambda >= self.config.lambda_upper_bound {
                        warn!(
                            lambda,
                            "giving up: damped system indefinite at maximum lambda"
                        );
                        break;
                    }
                    lambda *= self.config.lambda_factor;
                }
            }
        }

        Ok(LmState {
            values: next_values,
            error: next_error,
            lambda,
            iterations: current.iterations + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::{GaussianFactorGraph, JacobianFactor};
    use crate::nonlinear::EuclideanValues;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    const X: usize = 0;

    /// Scalar graph with true error (x - target)^2.
    ///
    /// `gain` scales the linearized right-hand side: 1.0 gives a consistent
    /// Gauss-Newton model, larger values deliberately overshoot so steps get
    /// rejected until damping reins them in.
    struct ScalarGraph {
        target: f64,
        gain: f64,
    }

    impl ScalarGraph {
        fn x(&self, values: &EuclideanValues) -> f64 {
            values.get(X).map_or(0.0, |v| v[0])
        }
    }

    impl NonlinearGraph for ScalarGraph {
        type Values = EuclideanValues;

        fn linearize(
            &self,
            values: &EuclideanValues,
            _ordering: &Ordering,
        ) -> TrellisResult<GaussianFactorGraph> {
            let x = self.x(values);
            let mut linear = GaussianFactorGraph::new();
            linear.push(JacobianFactor::unary(
                0,
                dmatrix![1.0],
                dvector![self.gain * (self.target - x)],
            )?);
            Ok(linear)
        }

        fn error(&self, values: &EuclideanValues) -> f64 {
            (self.x(values) - self.target).powi(2)
        }
    }

    /// Graph whose linearize must never run; used to prove configuration
    /// errors surface first.
    struct UnreachableGraph;

    impl NonlinearGraph for UnreachableGraph {
        type Values = EuclideanValues;

        fn linearize(
            &self,
            _values: &EuclideanValues,
            _ordering: &Ordering,
        ) -> TrellisResult<GaussianFactorGraph> {
            panic!("linearize must not be called for an invalid configuration");
        }

        fn error(&self, _values: &EuclideanValues) -> f64 {
            0.0
        }
    }

    fn start_at_zero() -> EuclideanValues {
        let mut values = EuclideanValues::new();
        values.insert(X, dvector![0.0]);
        values
    }

    #[test]
    fn test_initial_state() {
        let optimizer = LevenbergMarquardt::new(
            ScalarGraph {
                target: 3.0,
                gain: 1.0,
            },
            Ordering::from_keys(vec![X]),
        );
        let state = optimizer.initial_state(start_at_zero());
        assert_eq!(state.error, 9.0);
        assert_eq!(state.iterations, 0);
        assert_eq!(state.lambda, optimizer.config().lambda_initial);
    }

    #[test]
    fn test_accepted_step_shrinks_lambda() {
        let config = LmConfig::default()
            .with_lambda_initial(1e-3)
            .with_elimination("sequential");
        let mut optimizer = LevenbergMarquardt::with_config(
            ScalarGraph {
                target: 3.0,
                gain: 1.0,
            },
            Ordering::from_keys(vec![X]),
            config,
        );
        let state0 = optimizer.initial_state(start_at_zero());
        let state1 = optimizer.iterate(&state0).unwrap();

        assert!(state1.error < state0.error);
        assert_eq!(state1.iterations, 1);
        assert_eq!(state1.lambda, state0.lambda / 10.0);
    }

    #[test]
    fn test_one_rejection_then_acceptance_restores_lambda() {
        // gain 10 from x=0: trial at lambda=2 gives dx = 30/3 = 10,
        // error 49 > 9, rejected; lambda=6 gives dx = 30/7, error
        // (9/7)^2 < 9, accepted. One growth and one shrink cancel.
        let config = LmConfig::default()
            .with_lambda_initial(2.0)
            .with_lambda_factor(3.0)
            .with_elimination("sequential");
        let mut optimizer = LevenbergMarquardt::with_config(
            ScalarGraph {
                target: 3.0,
                gain: 10.0,
            },
            Ordering::from_keys(vec![X]),
            config,
        );
        let state0 = optimizer.initial_state(start_at_zero());
        let state1 = optimizer.iterate(&state0).unwrap();

        assert_relative_eq!(state1.lambda, state0.lambda, epsilon = 1e-12);
        assert_relative_eq!(state1.error, (9.0f64 / 7.0).powi(2), epsilon = 1e-9);
        assert_relative_eq!(state1.values.get(X).unwrap()[0], 30.0 / 7.0, epsilon = 1e-9);
        assert_eq!(state1.iterations, 1);
    }

    #[test]
    fn test_lambda_saturation_gives_up_without_error() {
        let config = LmConfig::default()
            .with_lambda_initial(2.0)
            .with_lambda_factor(2.0)
            .with_lambda_upper_bound(2.0)
            .with_elimination("sequential");
        let mut optimizer = LevenbergMarquardt::with_config(
            ScalarGraph {
                target: 3.0,
                gain: 10.0,
            },
            Ordering::from_keys(vec![X]),
            config,
        );
        let state0 = optimizer.initial_state(start_at_zero());
        let state1 = optimizer.iterate(&state0).unwrap();

        // Unchanged estimate and error, advanced iteration counter.
        assert_eq!(state1.values, state0.values);
        assert_eq!(state1.error, state0.error);
        assert_eq!(state1.iterations, state0.iterations + 1);
        assert!(!state1.made_progress(&state0));
    }

    #[test]
    fn test_invalid_selectors_fail_before_linearization() {
        for config in [
            LmConfig::default().with_factorization("ldl"),
            LmConfig::default().with_elimination("cyclic"),
        ] {
            let mut optimizer = LevenbergMarquardt::with_config(
                UnreachableGraph,
                Ordering::from_keys(vec![X]),
                config,
            );
            let state = LmState {
                values: start_at_zero(),
                error: 0.0,
                lambda: 1.0,
                iterations: 0,
            };
            let result = optimizer.iterate(&state);
            assert!(matches!(result, Err(TrellisError::InvalidConfig(_))));
        }
    }
}
