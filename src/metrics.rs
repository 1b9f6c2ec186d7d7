//! Portfolio-level metrics.
//!
//! Every function recomputes from the full set of loans; nothing is cached
//! because the session mutates the portfolio between calls.

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::{DetoxError, Result};
use crate::loan::{Loan, Portfolio};
use crate::types::round_to;

/// Sum of exposures, rounded to 2 decimals.
pub fn total_exposure(loans: &[Loan]) -> f64 {
    round_to(loans.iter().map(Loan::exposure).sum::<f64>(), 2)
}

/// Exposure-weighted margin (spread minus expected loss) as a percentage of
/// total exposure.
pub fn profitability(loans: &[Loan]) -> Result<f64> {
    let total = total_exposure(loans);
    if total == 0.0 {
        return Err(DetoxError::degenerate("profitability", "total exposure is zero"));
    }
    let margin: f64 = loans.iter().map(|l| l.terms.margin() * l.exposure()).sum();
    Ok(100.0 * margin / total)
}

/// Risk-weighted Herfindahl-Hirschman index.
///
/// Shares are loss-weighted exposures `el * exp` over total exposure; the sum
/// of squared shares is normalised by the mean loss-weighted share and
/// reported in whole points.
pub fn concentration_index(loans: &[Loan]) -> Result<f64> {
    let total = total_exposure(loans);
    if total == 0.0 {
        return Err(DetoxError::degenerate("concentration index", "total exposure is zero"));
    }
    let (weighted, weighted_sq) = loans.iter().fold((0.0, 0.0), |(sum, sq), l| {
        let w = l.terms.weighted_loss();
        (sum + w, sq + w * w)
    });
    let average = weighted / total;
    if average == 0.0 {
        return Err(DetoxError::degenerate(
            "concentration index",
            "loss-weighted exposure is zero",
        ));
    }
    let hhi = weighted_sq / (total * total);
    // Rounded twice; kept for output compatibility.
    let result = round_to(100.0 * hhi / average, 0);
    Ok(round_to(result, 0))
}

/// Profitability per point of concentration, scaled by 1000, 1 decimal.
pub fn score(loans: &[Loan]) -> Result<f64> {
    let risk = concentration_index(loans)?;
    if risk == 0.0 {
        return Err(DetoxError::degenerate("score", "concentration index is zero"));
    }
    let ret = profitability(loans)?;
    Ok(round_to(1000.0 * ret / risk, 1))
}

/// Plain HHI of exposure shares, in `(0, 1]`. Ignores credit quality.
pub fn exposure_hhi(loans: &[Loan]) -> Result<f64> {
    let total = total_exposure(loans);
    if total == 0.0 {
        return Err(DetoxError::degenerate("exposure HHI", "total exposure is zero"));
    }
    Ok(loans.iter().map(|l| (l.exposure() / total).powi(2)).sum())
}

/// The four headline metrics of a portfolio at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_exposure: f64,
    pub profitability: f64,
    pub concentration: f64,
    pub score: f64,
}

impl MetricsSnapshot {
    pub fn compute(portfolio: &Portfolio) -> Result<Self> {
        Self::from_loans(portfolio.loans())
    }

    pub fn from_loans(loans: &[Loan]) -> Result<Self> {
        Ok(MetricsSnapshot {
            total_exposure: total_exposure(loans),
            profitability: profitability(loans)?,
            concentration: concentration_index(loans)?,
            score: score(loans)?,
        })
    }
}

/// Direction of a metric between two snapshots, judged from the portfolio
/// manager's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Improved,
    Worsened,
    Unchanged,
}

impl Trend {
    /// Higher is better.
    pub fn higher_is_better(previous: f64, current: f64) -> Self {
        match current.partial_cmp(&previous) {
            Some(Ordering::Greater) => Trend::Improved,
            Some(Ordering::Less) => Trend::Worsened,
            _ => Trend::Unchanged,
        }
    }

    /// Lower is better.
    pub fn lower_is_better(previous: f64, current: f64) -> Self {
        Self::higher_is_better(current, previous)
    }

    /// Raw direction for metrics with no preferred sign.
    pub fn direction(previous: f64, current: f64) -> Ordering {
        current.partial_cmp(&previous).unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsTrend {
    pub score: Trend,
    pub profitability: Trend,
    pub concentration: Trend,
}

impl MetricsTrend {
    pub fn between(previous: &MetricsSnapshot, current: &MetricsSnapshot) -> Self {
        MetricsTrend {
            score: Trend::higher_is_better(previous.score, current.score),
            profitability: Trend::higher_is_better(previous.profitability, current.profitability),
            concentration: Trend::lower_is_better(previous.concentration, current.concentration),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::seq::SliceRandom;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::generator::initialize_portfolio;
    use crate::loan::LoanTerms;

    fn terms(el: f64, s: f64, exp: f64) -> LoanTerms {
        LoanTerms { expected_loss: el, spread: s, exposure: exp }
    }

    fn two_loan_portfolio() -> Portfolio {
        Portfolio::from_terms([terms(0.05, 0.10, 0.2), terms(0.02, 0.03, 0.8)]).unwrap()
    }

    #[test]
    fn total_exposure_two_loans() {
        assert_eq!(total_exposure(two_loan_portfolio().loans()), 1.0);
    }

    #[test]
    fn total_exposure_rounds_to_cents() {
        let p = Portfolio::from_terms([terms(0.05, 0.1, 0.101), terms(0.05, 0.1, 0.202)]).unwrap();
        assert_eq!(total_exposure(p.loans()), 0.3);
    }

    #[test]
    fn profitability_two_loans() {
        let p = two_loan_portfolio();
        assert_relative_eq!(profitability(p.loans()).unwrap(), 1.8, epsilon = 1e-9);
    }

    #[test]
    fn concentration_two_loans() {
        // weighted losses 0.01 and 0.016; 100 * 0.000356 / 0.026 = 1.369
        let p = two_loan_portfolio();
        assert_eq!(concentration_index(p.loans()).unwrap(), 1.0);
    }

    #[test]
    fn score_two_loans() {
        let p = two_loan_portfolio();
        assert_eq!(score(p.loans()).unwrap(), 1800.0);
    }

    #[test]
    fn snapshot_matches_individual_metrics() {
        let p = two_loan_portfolio();
        let snap = MetricsSnapshot::compute(&p).unwrap();
        assert_eq!(snap.total_exposure, 1.0);
        assert_relative_eq!(snap.profitability, 1.8, epsilon = 1e-9);
        assert_eq!(snap.concentration, 1.0);
        assert_eq!(snap.score, 1800.0);
    }

    #[test]
    fn concentrated_loss_raises_index() {
        // One large loan carries almost all of the expected loss.
        let p = Portfolio::from_terms([
            terms(0.20, 0.25, 1.0),
            terms(0.01, 0.02, 0.1),
            terms(0.01, 0.02, 0.1),
        ])
        .unwrap();
        let spread_out = Portfolio::from_terms([
            terms(0.05, 0.06, 0.4),
            terms(0.05, 0.06, 0.4),
            terms(0.05, 0.06, 0.4),
        ])
        .unwrap();
        assert!(
            concentration_index(p.loans()).unwrap() > concentration_index(spread_out.loans()).unwrap()
        );
    }

    #[test]
    fn score_degenerate_when_concentration_rounds_to_zero() {
        let p = Portfolio::from_terms((0..10).map(|_| terms(0.01, 0.02, 0.1))).unwrap();
        assert_eq!(concentration_index(p.loans()).unwrap(), 0.0);
        let err = score(p.loans()).unwrap_err();
        assert!(matches!(err, DetoxError::DegenerateMetric { metric: "score", .. }));
    }

    #[test]
    fn zero_exposure_is_degenerate() {
        let p = Portfolio::from_terms([terms(0.05, 0.1, 0.0)]).unwrap();
        assert!(matches!(profitability(p.loans()), Err(DetoxError::DegenerateMetric { .. })));
        assert!(matches!(concentration_index(p.loans()), Err(DetoxError::DegenerateMetric { .. })));
        assert!(matches!(exposure_hhi(p.loans()), Err(DetoxError::DegenerateMetric { .. })));
    }

    #[test]
    fn zero_expected_loss_is_degenerate() {
        let p = Portfolio::from_terms([terms(0.0, 0.1, 0.5), terms(0.0, 0.2, 0.5)]).unwrap();
        let err = concentration_index(p.loans()).unwrap_err();
        assert!(err.to_string().contains("loss-weighted"));
    }

    #[test]
    fn exposure_hhi_bounds() {
        let single = Portfolio::from_terms([terms(0.05, 0.1, 0.5)]).unwrap();
        assert_relative_eq!(exposure_hhi(single.loans()).unwrap(), 1.0, epsilon = 1e-12);

        let even = Portfolio::from_terms((0..4).map(|_| terms(0.05, 0.1, 0.25))).unwrap();
        assert_relative_eq!(exposure_hhi(even.loans()).unwrap(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn trend_directions() {
        let prev = MetricsSnapshot {
            total_exposure: 3.0,
            profitability: 2.0,
            concentration: 30.0,
            score: 66.7,
        };
        let better = MetricsSnapshot {
            total_exposure: 3.2,
            profitability: 2.5,
            concentration: 20.0,
            score: 125.0,
        };
        let t = MetricsTrend::between(&prev, &better);
        assert_eq!(t.score, Trend::Improved);
        assert_eq!(t.profitability, Trend::Improved);
        assert_eq!(t.concentration, Trend::Improved);

        let t = MetricsTrend::between(&better, &prev);
        assert_eq!(t.score, Trend::Worsened);
        assert_eq!(t.concentration, Trend::Worsened);

        let t = MetricsTrend::between(&prev, &prev);
        assert_eq!(t.score, Trend::Unchanged);
        assert_eq!(Trend::direction(prev.total_exposure, better.total_exposure), Ordering::Greater);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_metrics_order_independent(seed in any::<u64>(), size in 1usize..40) {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let p = initialize_portfolio(size, &mut rng).unwrap();
            let mut shuffled = p.loans().to_vec();
            shuffled.shuffle(&mut rng);

            prop_assert_eq!(total_exposure(p.loans()), total_exposure(&shuffled));
            let a = profitability(p.loans()).unwrap();
            let b = profitability(&shuffled).unwrap();
            prop_assert!((a - b).abs() < 1e-9, "profitability {} vs {}", a, b);
            let a = concentration_index(p.loans()).unwrap();
            let b = concentration_index(&shuffled).unwrap();
            prop_assert!((a - b).abs() < 1e-9, "concentration {} vs {}", a, b);
            if let (Ok(a), Ok(b)) = (score(p.loans()), score(&shuffled)) {
                prop_assert!((a - b).abs() < 1e-6, "score {} vs {}", a, b);
            }
        }

        #[test]
        fn prop_metrics_idempotent(seed in any::<u64>(), size in 1usize..40) {
            let p = initialize_portfolio(size, &mut ChaCha20Rng::seed_from_u64(seed)).unwrap();
            let loans = p.loans();
            prop_assert_eq!(total_exposure(loans).to_bits(), total_exposure(loans).to_bits());
            prop_assert_eq!(profitability(loans), profitability(loans));
            prop_assert_eq!(concentration_index(loans), concentration_index(loans));
            prop_assert_eq!(score(loans), score(loans));
        }

        #[test]
        fn prop_total_exposure_grows_with_size(seed in any::<u64>(), size in 2usize..60) {
            let p = initialize_portfolio(size, &mut ChaCha20Rng::seed_from_u64(seed)).unwrap();
            let loans = p.loans();
            for k in 1..size {
                let smaller = total_exposure(&loans[..k]);
                let larger = total_exposure(&loans[..=k]);
                prop_assert!(larger >= smaller, "k={}: {} < {}", k, larger, smaller);
                prop_assert!(larger - smaller >= 0.1 - 1e-9);
            }
        }
    }
}
