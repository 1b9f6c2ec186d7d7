use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::{debug, warn};

use crate::analysis::RunSummary;
use crate::config::SessionConfig;
use crate::error::{DetoxError, Result};
use crate::player::{Decision, Player};
use crate::session::{Session, TurnOutcome};
use crate::types::Seconds;

/// Events driven by the session clock rather than by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// The `n`th decision point, at `n * time_delta` seconds.
    Tick { n: u64 },
    /// The time budget is spent.
    TimeExpired,
}

/// Queue entry. Ordered by time, ties broken by scheduling order.
#[derive(Debug, Clone, Copy)]
struct Scheduled {
    at: Seconds,
    seq: u64,
    event: ClockEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.0.total_cmp(&other.at.0).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Runs one session against a player on a simulated clock.
///
/// A decision point fires every `time_delta` seconds starting at zero, for as
/// long as it falls strictly before `duration`; `TimeExpired` fires at
/// `duration` and ends the run.
pub struct Simulation {
    queue: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
    pub session: Session,
    ticks: u64,
    accepted: u32,
    rolled_back: u32,
}

impl Simulation {
    pub fn from_config(config: SessionConfig) -> Result<Self> {
        let session = Session::new(config)?;
        let mut sim = Simulation {
            queue: BinaryHeap::new(),
            next_seq: 0,
            session,
            ticks: 0,
            accepted: 0,
            rolled_back: 0,
        };
        let duration = sim.session.config().duration;
        sim.schedule(Seconds::ZERO, ClockEvent::Tick { n: 0 });
        sim.schedule(Seconds(duration), ClockEvent::TimeExpired);
        Ok(sim)
    }

    fn schedule(&mut self, at: Seconds, event: ClockEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Scheduled { at, seq, event }));
    }

    /// Decision points fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until the time budget expires.
    pub fn run(&mut self, player: &mut dyn Player) -> Result<RunSummary> {
        let initial = *self.session.metrics();

        while let Some(Reverse(next)) = self.queue.pop() {
            self.session.advance_to(next.at);
            match next.event {
                ClockEvent::Tick { n } => {
                    self.ticks += 1;
                    self.on_tick(player)?;
                    let at = Seconds((n + 1) as f64 * self.session.config().time_delta);
                    if at.0 < self.session.config().duration {
                        self.schedule(at, ClockEvent::Tick { n: n + 1 });
                    }
                }
                ClockEvent::TimeExpired => {
                    self.session.finish();
                    break;
                }
            }
        }

        Ok(RunSummary {
            seed: self.session.config().seed,
            initial,
            final_metrics: *self.session.metrics(),
            proposals_used: self.session.proposals_used(),
            accepted: self.accepted,
            rolled_back: self.rolled_back,
            outcome: self.session.outcome(),
        })
    }

    fn on_tick(&mut self, player: &mut dyn Player) -> Result<()> {
        match player.decide(&self.session) {
            Decision::Pass => {}
            Decision::Reject => {
                self.session.reject()?;
            }
            Decision::Accept { slot } => {
                self.session.select(slot)?;
                match self.session.accept() {
                    Ok(TurnOutcome::Accepted { .. }) => self.accepted += 1,
                    Ok(_) => {}
                    Err(err @ DetoxError::DegenerateMetric { .. }) => {
                        // The proposal is unusable in this slot; move on to the next one.
                        warn!(%err, "proposal discarded after rollback");
                        self.rolled_back += 1;
                        self.session.reject()?;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        debug!(
            time = self.session.elapsed().0,
            score = self.session.metrics().score,
            remaining = self.session.proposals_remaining(),
            "tick"
        );
        Ok(())
    }
}
