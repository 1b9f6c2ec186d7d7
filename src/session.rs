//! The session driver: owns one portfolio and applies accept/reject decisions
//! against a proposal budget and a time budget.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{DetoxError, Result};
use crate::events::{Event, EventLog, SessionEvent};
use crate::generator::LoanGenerator;
use crate::loan::{Loan, LoanTerms, Portfolio};
use crate::metrics::{MetricsSnapshot, MetricsTrend};
use crate::types::{LoanId, Seconds, Turn};

/// Generated portfolios whose metrics are undefined are discarded and redrawn,
/// at most this many times.
const MAX_PORTFOLIO_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Final score strictly above the winning score.
    Detoxed,
    Failed,
}

/// Result of an accept or reject request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnOutcome {
    Accepted { slot: LoanId, metrics: MetricsSnapshot },
    Rejected,
    /// No proposals left; nothing changed.
    LimitReached,
    /// The time budget is spent; nothing changed.
    TimeExpired,
}

pub struct Session {
    config: SessionConfig,
    generator: LoanGenerator,
    rng: ChaCha20Rng,
    portfolio: Portfolio,
    proposal: Option<LoanTerms>,
    selected: LoanId,
    proposals_used: Turn,
    metrics: MetricsSnapshot,
    previous: MetricsSnapshot,
    elapsed: Seconds,
    expired_logged: bool,
    /// Session events in the order they happened.
    pub log: EventLog,
}

impl Session {
    /// Start a session with a `ChaCha20Rng` seeded from `config.seed`.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let rng = ChaCha20Rng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }

    /// Start a session drawing from an externally seeded random source.
    pub fn with_rng(config: SessionConfig, mut rng: ChaCha20Rng) -> Result<Self> {
        config.validate()?;
        let generator = LoanGenerator::new(config.generator.clone())?;
        let (portfolio, metrics) = fresh_portfolio(&generator, config.portfolio_size, &mut rng)?;

        let mut session = Session {
            config,
            generator,
            rng,
            portfolio,
            proposal: None,
            selected: LoanId(0),
            proposals_used: Turn(0),
            metrics,
            previous: metrics,
            elapsed: Seconds::ZERO,
            expired_logged: false,
            log: EventLog::new(),
        };
        session.start();
        Ok(session)
    }

    fn start(&mut self) {
        info!(
            size = self.portfolio.len(),
            score = self.metrics.score,
            concentration = self.metrics.concentration,
            profitability = self.metrics.profitability,
            "session started"
        );
        self.record(Event::SessionStarted {
            portfolio_size: self.portfolio.len(),
            metrics: self.metrics,
        });
        self.next_proposal();
    }

    /// Throw away the current portfolio and start over with fresh draws from
    /// the same random stream. The log is kept.
    pub fn reset(&mut self) -> Result<()> {
        let (portfolio, metrics) =
            fresh_portfolio(&self.generator, self.config.portfolio_size, &mut self.rng)?;
        self.portfolio = portfolio;
        self.metrics = metrics;
        self.previous = metrics;
        self.selected = LoanId(0);
        self.proposals_used = Turn(0);
        self.proposal = None;
        self.elapsed = Seconds::ZERO;
        self.expired_logged = false;
        self.record(Event::SessionReset);
        self.start();
        Ok(())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// The loan on offer, or `None` once the proposal budget is used up.
    pub fn proposal(&self) -> Option<&LoanTerms> {
        self.proposal.as_ref()
    }

    pub fn selected(&self) -> LoanId {
        self.selected
    }

    pub fn selected_loan(&self) -> &Loan {
        // `selected` is only ever set to a validated slot.
        &self.portfolio.loans()[self.selected.0]
    }

    pub fn metrics(&self) -> &MetricsSnapshot {
        &self.metrics
    }

    /// Metrics before the most recent accepted proposal.
    pub fn previous_metrics(&self) -> &MetricsSnapshot {
        &self.previous
    }

    pub fn trend(&self) -> MetricsTrend {
        MetricsTrend::between(&self.previous, &self.metrics)
    }

    pub fn proposals_used(&self) -> u32 {
        self.proposals_used.0
    }

    pub fn proposals_remaining(&self) -> u32 {
        self.config.new_loan_limit.saturating_sub(self.proposals_used.0)
    }

    pub fn elapsed(&self) -> Seconds {
        self.elapsed
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed.0 >= self.config.duration
    }

    pub fn outcome(&self) -> Outcome {
        if self.metrics.score > self.config.winning_score {
            Outcome::Detoxed
        } else {
            Outcome::Failed
        }
    }

    pub fn select(&mut self, slot: LoanId) -> Result<()> {
        self.portfolio.get(slot)?;
        if slot != self.selected {
            self.selected = slot;
            self.record(Event::LoanSelected { slot });
        }
        Ok(())
    }

    /// Metrics the portfolio would have if `terms` replaced the loan in `slot`.
    /// The portfolio itself is left untouched.
    pub fn preview(&self, slot: LoanId, terms: LoanTerms) -> Result<MetricsSnapshot> {
        let mut what_if = self.portfolio.clone();
        what_if.replace(slot, terms)?;
        MetricsSnapshot::compute(&what_if)
    }

    /// Replace the selected loan with the proposal and recompute all metrics.
    ///
    /// If the new portfolio has an undefined metric the replacement is undone,
    /// the proposal stays on offer and the error is returned.
    pub fn accept(&mut self) -> Result<TurnOutcome> {
        let terms = match self.available_proposal() {
            Ok(terms) => terms,
            Err(blocked) => return Ok(blocked),
        };
        let slot = self.selected;
        let replaced = self.portfolio.replace(slot, terms)?;

        let metrics = match MetricsSnapshot::compute(&self.portfolio) {
            Ok(metrics) => metrics,
            Err(err) => {
                self.portfolio.replace(slot, replaced)?;
                warn!(slot = slot.0, %err, "accept rolled back");
                self.record(Event::ProposalRolledBack { slot, terms, reason: err.to_string() });
                return Err(err);
            }
        };

        self.proposals_used = self.proposals_used.next();
        self.previous = std::mem::replace(&mut self.metrics, metrics);
        debug!(
            turn = self.proposals_used.0,
            slot = slot.0,
            score = metrics.score,
            previous_score = self.previous.score,
            "proposal accepted"
        );
        self.record(Event::ProposalAccepted {
            turn: self.proposals_used,
            slot,
            replaced,
            terms,
            metrics,
        });
        self.next_proposal();
        Ok(TurnOutcome::Accepted { slot, metrics })
    }

    /// Discard the proposal and draw the next one.
    pub fn reject(&mut self) -> Result<TurnOutcome> {
        let terms = match self.available_proposal() {
            Ok(terms) => terms,
            Err(blocked) => return Ok(blocked),
        };
        self.proposals_used = self.proposals_used.next();
        debug!(turn = self.proposals_used.0, "proposal rejected");
        self.record(Event::ProposalRejected { turn: self.proposals_used, terms });
        self.next_proposal();
        Ok(TurnOutcome::Rejected)
    }

    /// Advance the session clock by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        self.advance_to(self.elapsed.offset(dt));
    }

    /// Move the session clock forward to `at`. The clock never runs backwards.
    pub fn advance_to(&mut self, at: Seconds) {
        if at > self.elapsed {
            self.elapsed = at;
        }
    }

    /// Spend the rest of the time budget and record the outcome.
    pub fn finish(&mut self) -> Outcome {
        self.advance_to(Seconds(self.config.duration));
        let outcome = self.outcome();
        if !self.expired_logged {
            self.expired_logged = true;
            info!(score = self.metrics.score, ?outcome, "time expired");
            self.record(Event::TimeExpired { score: self.metrics.score, outcome });
        }
        outcome
    }

    fn available_proposal(&self) -> std::result::Result<LoanTerms, TurnOutcome> {
        if self.is_expired() {
            return Err(TurnOutcome::TimeExpired);
        }
        self.proposal.ok_or(TurnOutcome::LimitReached)
    }

    fn next_proposal(&mut self) {
        if self.proposals_used.0 >= self.config.new_loan_limit {
            self.proposal = None;
            info!(limit = self.config.new_loan_limit, "proposal limit reached");
            self.record(Event::ProposalLimitReached { limit: self.config.new_loan_limit });
            return;
        }
        let terms = self.generator.propose_new_loan(&mut self.rng);
        self.proposal = Some(terms);
        self.record(Event::LoanProposed { turn: self.proposals_used, terms });
    }

    /// Put `terms` on offer in place of the drawn proposal.
    #[cfg(test)]
    pub(crate) fn offer(&mut self, terms: LoanTerms) {
        self.proposal = Some(terms);
    }

    fn record(&mut self, event: Event) {
        self.log.push(SessionEvent { time: self.elapsed, event });
    }
}

fn fresh_portfolio(
    generator: &LoanGenerator,
    size: usize,
    rng: &mut ChaCha20Rng,
) -> Result<(Portfolio, MetricsSnapshot)> {
    let mut last_err = None;
    for attempt in 1..=MAX_PORTFOLIO_ATTEMPTS {
        let portfolio = generator.initialize_portfolio(size, rng)?;
        match MetricsSnapshot::compute(&portfolio) {
            Ok(metrics) => return Ok((portfolio, metrics)),
            Err(err @ DetoxError::DegenerateMetric { .. }) => {
                debug!(attempt, %err, "discarding portfolio with undefined metrics");
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        DetoxError::InvalidConfiguration("no portfolio attempts were made".to_string())
    }))
}
