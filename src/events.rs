use serde::Serialize;

use crate::loan::LoanTerms;
use crate::metrics::MetricsSnapshot;
use crate::session::Outcome;
use crate::types::{LoanId, Seconds, Turn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    /// A fresh portfolio was generated and its metrics computed.
    SessionStarted { portfolio_size: usize, metrics: MetricsSnapshot },
    /// The session was restarted; a `SessionStarted` follows.
    SessionReset,
    /// A new proposal is on offer. `turn` counts proposals already consumed.
    LoanProposed { turn: Turn, terms: LoanTerms },
    LoanSelected { slot: LoanId },
    /// The proposal replaced the loan in `slot`; `metrics` are post-replacement.
    ProposalAccepted {
        turn: Turn,
        slot: LoanId,
        replaced: LoanTerms,
        terms: LoanTerms,
        metrics: MetricsSnapshot,
    },
    ProposalRejected { turn: Turn, terms: LoanTerms },
    /// Accepting into `slot` would make a metric undefined; the portfolio was rolled back.
    ProposalRolledBack { slot: LoanId, terms: LoanTerms, reason: String },
    /// The per-session proposal budget is used up.
    ProposalLimitReached { limit: u32 },
    /// The time budget ran out. Fires once per session.
    TimeExpired { score: f64, outcome: Outcome },
}

/// One entry of the session log, stamped with the session clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    pub time: Seconds,
    pub event: Event,
}

pub type EventLog = Vec<SessionEvent>;
