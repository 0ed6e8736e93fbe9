//! Discrete Bayes net stored in elimination order.

use crate::discrete::{Assignment, DiscreteConditional, Signature};
use crate::error::TrellisResult;
use rand::Rng;

/// An ordered chain of discrete conditionals forming a Bayes net.
///
/// Storage order is *elimination order*: the reverse of ancestral
/// (parents-first) order. A conditional added via [`DiscreteBayesNet::add`]
/// must have all of its parents appear later in the chain. [`optimize`] and
/// [`sample`] traverse the chain in reverse, so every conditional sees its
/// parents already assigned; this is what makes the greedy per-node argmax
/// exact.
///
/// The net is built once and then used only for read queries, which take
/// `&self` and are safe to run from multiple threads.
///
/// [`optimize`]: DiscreteBayesNet::optimize
/// [`sample`]: DiscreteBayesNet::sample
#[derive(Debug, Clone, Default)]
pub struct DiscreteBayesNet {
    /// Conditionals in elimination order (parents of entry i live at indices > i)
    conditionals: Vec<DiscreteConditional>,
}

impl DiscreteBayesNet {
    /// Create an empty Bayes net
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a conditional from the signature and append it in elimination
    /// order. The caller must add conditionals so that each one's parents
    /// already appear — in the ancestral sense — later in the chain.
    pub fn add(&mut self, signature: Signature) -> TrellisResult<()> {
        let conditional = DiscreteConditional::from_signature(signature)?;
        self.conditionals.push(conditional);
        Ok(())
    }

    /// Number of conditionals in the net
    pub fn len(&self) -> usize {
        self.conditionals.len()
    }

    /// Whether the net holds no conditionals
    pub fn is_empty(&self) -> bool {
        self.conditionals.is_empty()
    }

    /// The conditionals in storage (elimination) order
    pub fn conditionals(&self) -> &[DiscreteConditional] {
        &self.conditionals
    }

    /// Joint probability of a full assignment: the product of every
    /// conditional's table value. The traversal runs in fixed storage order
    /// for determinism; an empty net yields 1.0 (empty product).
    pub fn evaluate(&self, assignment: &Assignment) -> TrellisResult<f64> {
        let mut result = 1.0;
        for conditional in &self.conditionals {
            result *= conditional.evaluate(assignment)?;
        }
        Ok(result)
    }

    /// The exact most-probable joint assignment.
    ///
    /// Traverses conditionals in reverse storage order (ancestral,
    /// parents-first) and greedily maximizes each variable given its
    /// already-assigned parents. An empty net yields an empty assignment.
    pub fn optimize(&self) -> TrellisResult<Assignment> {
        let mut result = Assignment::new();
        for conditional in self.conditionals.iter().rev() {
            let state = conditional.solve(&result)?;
            result.insert(conditional.variable().id, state);
        }
        Ok(result)
    }

    /// Draw one joint sample by ancestral sampling with a thread-local RNG.
    /// Stochastic by design; see [`sample_with`](DiscreteBayesNet::sample_with)
    /// for deterministic seeding.
    pub fn sample(&self) -> TrellisResult<Assignment> {
        self.sample_with(&mut rand::rng())
    }

    /// Draw one joint sample by ancestral sampling with the supplied RNG.
    ///
    /// Same reverse (parents-first) traversal as [`optimize`], drawing each
    /// variable from its conditional distribution given already-sampled
    /// parents.
    ///
    /// [`optimize`]: DiscreteBayesNet::optimize
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> TrellisResult<Assignment> {
        let mut result = Assignment::new();
        for conditional in self.conditionals.iter().rev() {
            let state = conditional.sample_with(&result, rng)?;
            result.insert(conditional.variable().id, state);
        }
        Ok(result)
    }
}
