use serde::Serialize;

use crate::metrics::MetricsSnapshot;
use crate::session::Outcome;

/// What one simulated session ended with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub initial: MetricsSnapshot,
    pub final_metrics: MetricsSnapshot,
    /// Proposals consumed (accepted or rejected).
    pub proposals_used: u32,
    pub accepted: u32,
    /// Accepts undone because they left a metric undefined.
    pub rolled_back: u32,
    pub outcome: Outcome,
}

impl RunSummary {
    pub fn score_gain(&self) -> f64 {
        self.final_metrics.score - self.initial.score
    }
}

/// Distribution statistics for a continuous metric across N runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Cross-run distribution of final metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStats {
    pub runs: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub final_score: DistStats,
    pub score_gain: DistStats,
    pub final_profitability: DistStats,
    pub final_concentration: DistStats,
    pub accepted: DistStats,
}

/// Interpolated quantile of an ascending, non-empty slice.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let below = pos.floor() as usize;
    let above = pos.ceil() as usize;
    sorted[below] + (sorted[above] - sorted[below]) * (pos - below as f64)
}

/// Sorts `values` in place and summarises them. `None` when empty.
pub fn percentile_stats(values: &mut [f64]) -> Option<DistStats> {
    values.sort_by(f64::total_cmp);
    let sorted: &[f64] = values;
    let (&min, &max) = (sorted.first()?, sorted.last()?);
    let n = sorted.len();

    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std_dev = match n {
        1 => 0.0,
        _ => {
            let sum_sq: f64 = sorted.iter().map(|x| (x - mean) * (x - mean)).sum();
            (sum_sq / (n - 1) as f64).sqrt()
        }
    };
    let q = |p| quantile(sorted, p);

    Some(DistStats {
        n,
        min,
        p5: q(0.05),
        p25: q(0.25),
        p50: q(0.50),
        p75: q(0.75),
        p95: q(0.95),
        max,
        mean,
        std_dev,
    })
}

/// Summarise a batch of runs. `None` for an empty batch.
pub fn analyse_runs(runs: &[RunSummary]) -> Option<BatchStats> {
    let collect = |f: fn(&RunSummary) -> f64| -> Vec<f64> { runs.iter().map(f).collect() };

    let final_score = percentile_stats(&mut collect(|r| r.final_metrics.score))?;
    let score_gain = percentile_stats(&mut collect(RunSummary::score_gain))?;
    let final_profitability = percentile_stats(&mut collect(|r| r.final_metrics.profitability))?;
    let final_concentration = percentile_stats(&mut collect(|r| r.final_metrics.concentration))?;
    let accepted = percentile_stats(&mut collect(|r| r.accepted as f64))?;

    let wins = runs.iter().filter(|r| r.outcome == Outcome::Detoxed).count();
    Some(BatchStats {
        runs: runs.len(),
        wins,
        win_rate: wins as f64 / runs.len() as f64,
        final_score,
        score_gain,
        final_profitability,
        final_concentration,
        accepted,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn snapshot(score: f64) -> MetricsSnapshot {
        MetricsSnapshot { total_exposure: 3.0, profitability: 2.0, concentration: 4.0, score }
    }

    fn run(seed: u64, initial: f64, last: f64, outcome: Outcome) -> RunSummary {
        RunSummary {
            seed,
            initial: snapshot(initial),
            final_metrics: snapshot(last),
            proposals_used: 100,
            accepted: seed as u32,
            rolled_back: 0,
            outcome,
        }
    }

    #[test]
    fn percentile_stats_known_values() {
        let mut values = vec![5.0, 1.0, 4.0, 2.0, 3.0];
        let stats = percentile_stats(&mut values).unwrap();
        assert_eq!(stats.n, 5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.p50, 3.0);
        assert_relative_eq!(stats.p25, 2.0);
        assert_relative_eq!(stats.p5, 1.2, epsilon = 1e-12);
        assert_relative_eq!(stats.mean, 3.0);
        assert_relative_eq!(stats.std_dev, 2.5f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn percentile_stats_single_value() {
        let stats = percentile_stats(&mut [7.0]).unwrap();
        assert_eq!(stats.p5, 7.0);
        assert_eq!(stats.p95, 7.0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn percentile_stats_empty_returns_none() {
        assert!(percentile_stats(&mut []).is_none());
    }

    #[test]
    fn analyse_runs_empty_returns_none() {
        assert!(analyse_runs(&[]).is_none());
    }

    #[test]
    fn analyse_runs_win_rate_and_gain() {
        let runs = vec![
            run(1, 100.0, 600.0, Outcome::Detoxed),
            run(2, 200.0, 300.0, Outcome::Failed),
            run(3, 300.0, 900.0, Outcome::Detoxed),
            run(4, 400.0, 400.0, Outcome::Failed),
        ];
        let stats = analyse_runs(&runs).unwrap();
        assert_eq!(stats.runs, 4);
        assert_eq!(stats.wins, 2);
        assert_relative_eq!(stats.win_rate, 0.5);
        assert_eq!(stats.final_score.min, 300.0);
        assert_eq!(stats.final_score.max, 900.0);
        assert_relative_eq!(stats.score_gain.mean, (500.0 + 100.0 + 600.0 + 0.0) / 4.0);
        assert_relative_eq!(stats.accepted.mean, 2.5);
    }

    #[test]
    fn batch_stats_serializes() {
        let stats = analyse_runs(&[run(1, 1.0, 2.0, Outcome::Failed)]).unwrap();
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["runs"], 1);
        assert_eq!(value["final_score"]["p50"], 2.0);
    }
}
