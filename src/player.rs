use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::error::{DetoxError, Result};
use crate::session::Session;
use crate::types::LoanId;

/// What a player wants to do with the proposal currently on offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Replace the loan in `slot` with the proposal.
    Accept { slot: LoanId },
    Reject,
    /// Do nothing this tick.
    Pass,
}

/// Stands in for the human at the controls. Called once per clock tick.
pub trait Player {
    fn decide(&mut self, session: &Session) -> Decision;
}

/// Accepts a proposal only into the slot where it raises the score the most,
/// and only if the gain exceeds `min_gain`.
#[derive(Debug, Clone, Default)]
pub struct GreedyPlayer {
    pub min_gain: f64,
}

impl Player for GreedyPlayer {
    fn decide(&mut self, session: &Session) -> Decision {
        let Some(&terms) = session.proposal() else {
            return Decision::Pass;
        };
        let current = session.metrics().score;

        let best = session
            .portfolio()
            .loans()
            .iter()
            .filter_map(|loan| {
                session.preview(loan.index, terms).ok().map(|m| (loan.index, m.score))
            })
            .fold(None, |best: Option<(LoanId, f64)>, (slot, score)| match best {
                Some((_, s)) if s >= score => best,
                _ => Some((slot, score)),
            });

        match best {
            Some((slot, score)) if score > current + self.min_gain => Decision::Accept { slot },
            _ => Decision::Reject,
        }
    }
}

/// Accepts with a fixed probability into a uniformly chosen slot.
#[derive(Debug, Clone)]
pub struct RandomPlayer {
    rng: ChaCha20Rng,
    accept_probability: f64,
}

impl RandomPlayer {
    /// `accept_probability` must lie in `[0, 1]`; NaN is rejected.
    pub fn new(seed: u64, accept_probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&accept_probability) {
            return Err(DetoxError::InvalidConfiguration(format!(
                "accept_probability must lie in [0, 1], got {accept_probability}"
            )));
        }
        Ok(RandomPlayer { rng: ChaCha20Rng::seed_from_u64(seed), accept_probability })
    }
}

impl Player for RandomPlayer {
    fn decide(&mut self, session: &Session) -> Decision {
        if session.proposal().is_none() {
            return Decision::Pass;
        }
        if self.rng.random_bool(self.accept_probability) {
            let slot = LoanId(self.rng.random_range(0..session.portfolio().len()));
            Decision::Accept { slot }
        } else {
            Decision::Reject
        }
    }
}
