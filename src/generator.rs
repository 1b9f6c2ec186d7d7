use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DetoxError, Result};
use crate::loan::{LoanTerms, Portfolio};
use crate::types::round_to;

/// Range from which the two seed-loan slots are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedIndexRange {
    /// Draw from `0..n` regardless of portfolio size. With the default
    /// `Fixed(10)`, portfolios larger than 10 only get seed loans in the
    /// first ten slots, and a portfolio smaller than `n` may get no seed
    /// loan at all when a draw lands past its end.
    Fixed(usize),
    /// Draw from `0..size`.
    PortfolioSize,
}

impl SeedIndexRange {
    fn upper(self, size: usize) -> usize {
        match self {
            SeedIndexRange::Fixed(n) => n,
            SeedIndexRange::PortfolioSize => size,
        }
    }
}

/// Parameters of the random loan generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Mean of the Normal draw for expected loss.
    pub el_mean: f64,
    /// Standard deviation of the Normal draw for expected loss.
    pub el_std_dev: f64,
    /// Lower bound applied to the expected loss draw.
    pub el_floor: f64,
    /// Upper bound (and uniform scale) of baseline portfolio exposures.
    pub base_exposure_cap: f64,
    /// Lower bound of any generated exposure.
    pub exposure_floor: f64,
    /// Upper bound of a proposed loan's exposure.
    pub exposure_cap: f64,
    pub medium_seed_exposure: f64,
    pub large_seed_exposure: f64,
    pub seed_index_range: SeedIndexRange,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            el_mean: 0.05,
            el_std_dev: 0.05,
            el_floor: 0.005,
            base_exposure_cap: 0.3,
            exposure_floor: 0.1,
            exposure_cap: 1.0,
            medium_seed_exposure: 0.8,
            large_seed_exposure: 1.0,
            seed_index_range: SeedIndexRange::Fixed(10),
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if !self.el_mean.is_finite() {
            errors.push(format!("el_mean must be finite, got {}", self.el_mean));
        }
        if !(self.el_std_dev.is_finite() && self.el_std_dev >= 0.0) {
            errors.push(format!("el_std_dev must be finite and >= 0, got {}", self.el_std_dev));
        }
        if !(self.el_floor > 0.0 && self.el_floor < 1.0) {
            errors.push(format!("el_floor must lie in (0, 1), got {}", self.el_floor));
        }
        if !(self.exposure_floor > 0.0
            && self.exposure_floor <= self.base_exposure_cap
            && self.base_exposure_cap <= self.exposure_cap
            && self.exposure_cap <= 1.0)
        {
            errors.push(format!(
                "exposure bounds must satisfy 0 < floor <= base cap <= cap <= 1, got {} / {} / {}",
                self.exposure_floor, self.base_exposure_cap, self.exposure_cap
            ));
        }
        for (name, value) in [
            ("medium_seed_exposure", self.medium_seed_exposure),
            ("large_seed_exposure", self.large_seed_exposure),
        ] {
            if !(value >= self.exposure_floor && value <= self.exposure_cap) {
                errors.push(format!(
                    "{name} must lie in [{}, {}], got {value}",
                    self.exposure_floor, self.exposure_cap
                ));
            }
        }
        if self.seed_index_range == SeedIndexRange::Fixed(0) {
            errors.push("seed_index_range must be non-empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DetoxError::InvalidConfiguration(errors.join("; ")))
        }
    }
}

/// Draws random portfolios and new-loan proposals.
///
/// The random source is supplied per call so callers decide whether it is a
/// seeded `ChaCha20Rng` (sessions, tests) or anything else implementing `Rng`.
#[derive(Debug, Clone)]
pub struct LoanGenerator {
    config: GeneratorConfig,
    el_dist: Normal<f64>,
}

impl Default for LoanGenerator {
    fn default() -> Self {
        let config = GeneratorConfig::default();
        let el_dist =
            Normal::new(config.el_mean, config.el_std_dev).expect("default Normal params are valid");
        LoanGenerator { config, el_dist }
    }
}

impl LoanGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let el_dist = Normal::new(config.el_mean, config.el_std_dev)
            .map_err(|e| DetoxError::InvalidConfiguration(format!("expected loss draw: {e}")))?;
        Ok(LoanGenerator { config, el_dist })
    }

    /// Generate a portfolio of `size` loans with indices `0..size`.
    ///
    /// Two slots are drawn first: the "large" slot gets `large_seed_exposure`
    /// and the "medium" slot `medium_seed_exposure`. If both draws coincide the
    /// large exposure wins and the portfolio carries a single seed loan.
    pub fn initialize_portfolio(&self, size: usize, rng: &mut impl Rng) -> Result<Portfolio> {
        if size == 0 {
            return Err(DetoxError::InvalidConfiguration(
                "portfolio size must be at least 1".to_string(),
            ));
        }

        let upper = self.config.seed_index_range.upper(size) as f64;
        let large_i = (upper * rng.random::<f64>()) as usize;
        let medium_i = (upper * rng.random::<f64>()) as usize;
        debug!(size, large_i, medium_i, "generating portfolio");

        let mut terms = Vec::with_capacity(size);
        for i in 0..size {
            let (expected_loss, spread) = self.draw_loss_and_spread(rng);
            let base = (self.config.base_exposure_cap * rng.random::<f64>())
                .clamp(self.config.exposure_floor, self.config.base_exposure_cap);
            let exposure = seeded_exposure(i, large_i, medium_i, base, &self.config);
            terms.push(LoanTerms { expected_loss, spread, exposure: round_to(exposure, 2) });
        }
        Portfolio::from_terms(terms)
    }

    /// Draw a new-loan proposal. Exposure covers the full `[floor, cap]` range.
    pub fn propose_new_loan(&self, rng: &mut impl Rng) -> LoanTerms {
        let (expected_loss, spread) = self.draw_loss_and_spread(rng);
        let exposure =
            rng.random::<f64>().clamp(self.config.exposure_floor, self.config.exposure_cap);
        LoanTerms { expected_loss, spread, exposure: round_to(exposure, 2) }
    }

    /// Spread is derived from the unrounded loss so that, after rounding both,
    /// `spread >= expected_loss` still holds.
    fn draw_loss_and_spread(&self, rng: &mut impl Rng) -> (f64, f64) {
        let el = self.el_dist.sample(rng).max(self.config.el_floor);
        let s = (el * (1.0 + rng.random::<f64>())).clamp(0.0, 1.0);
        (round_to(el, 2), round_to(s, 2))
    }
}

fn seeded_exposure(
    i: usize,
    large_i: usize,
    medium_i: usize,
    base: f64,
    config: &GeneratorConfig,
) -> f64 {
    let mut exposure = base;
    if i == medium_i {
        exposure = config.medium_seed_exposure;
    }
    if i == large_i {
        exposure = config.large_seed_exposure;
    }
    exposure
}

/// Generate a portfolio with the default generator parameters.
pub fn initialize_portfolio(size: usize, rng: &mut impl Rng) -> Result<Portfolio> {
    LoanGenerator::default().initialize_portfolio(size, rng)
}

/// Draw a proposal with the default generator parameters.
pub fn propose_new_loan(rng: &mut impl Rng) -> LoanTerms {
    LoanGenerator::default().propose_new_loan(rng)
}
