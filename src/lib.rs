//! trellis-solver: a graphical-model inference and optimization kernel.
//!
//! The crate provides two tightly related engines:
//! - [`discrete`]: exact inference over a discrete Bayes net stored as an
//!   ordered chain of conditional probability tables (joint evaluation,
//!   most-probable-assignment solving, ancestral sampling).
//! - [`nonlinear`]: iterative nonlinear least-squares optimization of a
//!   continuous estimate against a nonlinear factor graph, using an
//!   adaptively damped Levenberg-Marquardt linearize-solve-retract loop.
//!
//! The [`linear`] module supplies the Gaussian linear systems the nonlinear
//! loop solves each iteration, backed by `faer` sparse factorizations and
//! `nalgebra` dense factorizations.

pub mod discrete;
pub mod error;
pub mod linear;
pub mod logger;
pub mod nonlinear;

pub use error::{TrellisError, TrellisResult};
pub use logger::{init_logger, init_logger_with_level};

/// Unique identifier for variables, shared by the discrete and continuous engines
pub type Key = usize;
