use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DetoxError, Result};
use crate::generator::GeneratorConfig;

/// Upper bound on `duration / time_delta`, the number of decision ticks.
pub const MAX_TICKS: f64 = 10_000_000.0;

/// Parameters of one detox session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub seed: u64,
    /// Number of loans in the book. Fixed for the session.
    pub portfolio_size: usize,
    /// Proposals (accepted or rejected) available per session.
    pub new_loan_limit: u32,
    /// Time budget in simulated seconds.
    pub duration: f64,
    /// Clock resolution: one player decision per tick.
    pub time_delta: f64,
    /// The session is won when the final score is strictly above this.
    pub winning_score: f64,
    pub generator: GeneratorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

impl SessionConfig {
    pub fn canonical() -> Self {
        SessionConfig {
            seed: 42,
            portfolio_size: 10,
            new_loan_limit: 100,
            duration: 300.0,
            time_delta: 1.0,
            winning_score: 500.0,
            generator: GeneratorConfig::default(),
        }
    }

    /// Load from a TOML file. Missing keys take their canonical values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DetoxError::ConfigIo(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DetoxError::ConfigParse(e.to_string()))
    }

    /// Apply `DETOX_*` environment variable overrides.
    pub fn with_env_override(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_override(&lookup, "DETOX_SEED") {
            self.seed = v;
        }
        if let Some(v) = parse_override(&lookup, "DETOX_PORTFOLIO_SIZE") {
            self.portfolio_size = v;
        }
        if let Some(v) = parse_override(&lookup, "DETOX_NEW_LOAN_LIMIT") {
            self.new_loan_limit = v;
        }
        if let Some(v) = parse_override(&lookup, "DETOX_DURATION") {
            self.duration = v;
        }
        if let Some(v) = parse_override(&lookup, "DETOX_TIME_DELTA") {
            self.time_delta = v;
        }
        if let Some(v) = parse_override(&lookup, "DETOX_WINNING_SCORE") {
            self.winning_score = v;
        }
        self
    }

    /// The config of the `i`th run of a batch: same parameters, seed offset
    /// by `i`. Seeds wrap around at `u64::MAX`.
    pub fn for_run(&self, i: u64) -> Self {
        SessionConfig { seed: self.seed.wrapping_add(i), ..self.clone() }
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.portfolio_size == 0 {
            errors.push("portfolio_size must be at least 1".to_string());
        }
        if self.new_loan_limit == 0 {
            errors.push("new_loan_limit must be at least 1".to_string());
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            errors.push(format!("duration must be positive, got {}", self.duration));
        }
        if !(self.time_delta.is_finite() && self.time_delta > 0.0 && self.time_delta <= self.duration)
        {
            errors.push(format!(
                "time_delta must lie in (0, duration], got {}",
                self.time_delta
            ));
        } else if self.duration.is_finite() && self.duration / self.time_delta > MAX_TICKS {
            errors.push(format!(
                "duration / time_delta must not exceed {MAX_TICKS} ticks, got {}",
                self.duration / self.time_delta
            ));
        }
        if !self.winning_score.is_finite() {
            errors.push(format!("winning_score must be finite, got {}", self.winning_score));
        }
        if let Err(DetoxError::InvalidConfiguration(msg)) = self.generator.validate() {
            errors.push(format!("generator: {msg}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DetoxError::InvalidConfiguration(errors.join("; ")))
        }
    }

    /// Load from TOML, apply `DETOX_*` overrides and validate the result.
    pub fn load_with_env_and_validate(path: &Path) -> Result<Self> {
        let config = Self::load(path)?.with_env_override();
        config.validate()?;
        Ok(config)
    }
}

fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable override");
            None
        }
    }
}
