//! Exact inference over discrete Bayes nets.
//!
//! A [`DiscreteBayesNet`] is an ordered chain of conditional probability
//! tables stored in *elimination order*: each conditional's parents appear
//! later in the chain, so ancestral (parents-first) order is the reverse of
//! storage order. The net is built once via [`DiscreteBayesNet::add`] and
//! thereafter queried read-only:
//! - [`DiscreteBayesNet::evaluate`]: joint probability of a full assignment
//! - [`DiscreteBayesNet::optimize`]: exact most-probable assignment
//! - [`DiscreteBayesNet::sample`]: one joint ancestral sample

pub mod bayes_net;
pub mod conditional;

pub use bayes_net::DiscreteBayesNet;
pub use conditional::{Assignment, DiscreteConditional, DiscreteKey, Signature};
