//! Token selection strategies.
//!
//! A session asks its [`TokenSelector`] for one token per round. The
//! default selector leans on an external preference list some of the time
//! and otherwise picks uniformly from what the round offers.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Picks the token to back in a round.
pub trait TokenSelector: Send + Sync {
    /// Choose from `available`, optionally guided by `preferred`.
    ///
    /// Returns `None` only when `available` is empty.
    fn select_token(&mut self, available: &[String], preferred: &[String]) -> Option<String>;
}

/// First entry of `preferred` that the round offers.
pub fn preferred_match<'a>(available: &'a [String], preferred: &[String]) -> Option<&'a String> {
    preferred
        .iter()
        .find_map(|wanted| available.iter().find(|token| *token == wanted))
}

/// Preference-list selector with a random gate.
///
/// With probability `prefer_probability` the first preferred token present
/// in the round wins; otherwise, or when none is present, the choice is
/// uniform over the round's tokens.
#[derive(Debug, Clone)]
pub struct PreferredTokenSelector<R = StdRng> {
    prefer_probability: f64,
    rng: R,
}

impl PreferredTokenSelector<StdRng> {
    /// Selector seeded from OS entropy.
    pub fn new(prefer_probability: f64) -> Self {
        Self::with_rng(prefer_probability, StdRng::from_entropy())
    }

    /// Deterministic selector for reproducible runs.
    pub fn seeded(prefer_probability: f64, seed: u64) -> Self {
        Self::with_rng(prefer_probability, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> PreferredTokenSelector<R> {
    /// Selector over a caller-supplied RNG.
    pub fn with_rng(prefer_probability: f64, rng: R) -> Self {
        Self {
            prefer_probability: prefer_probability.clamp(0.0, 1.0),
            rng,
        }
    }

    /// Probability of taking the preferred branch.
    pub fn prefer_probability(&self) -> f64 {
        self.prefer_probability
    }
}

impl<R: Rng + Send + Sync> TokenSelector for PreferredTokenSelector<R> {
    fn select_token(&mut self, available: &[String], preferred: &[String]) -> Option<String> {
        if available.is_empty() {
            return None;
        }

        if self.rng.gen_bool(self.prefer_probability) {
            if let Some(token) = preferred_match(available, preferred) {
                return Some(token.clone());
            }
        }

        available.choose(&mut self.rng).cloned()
    }
}
