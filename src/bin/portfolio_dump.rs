use std::env;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use detox::config::SessionConfig;
use detox::generator::LoanGenerator;
use detox::metrics::{self, MetricsSnapshot};

/// Draw `n` portfolios from the canonical config and dump every loan as NDJSON
/// on stdout, with a per-portfolio metrics summary on stderr.
///
/// Usage: `portfolio_dump [n_portfolios]`
fn main() -> anyhow::Result<()> {
    let config = SessionConfig::canonical().with_env_override();
    config.validate()?;

    let n_portfolios: u64 = env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(1);

    let generator = LoanGenerator::new(config.generator.clone())?;
    let mut rng = ChaCha20Rng::seed_from_u64(config.seed);

    for p in 0..n_portfolios {
        let portfolio = generator.initialize_portfolio(config.portfolio_size, &mut rng)?;
        for loan in portfolio.loans() {
            let mut value = serde_json::to_value(loan)?;
            value["portfolio"] = p.into();
            println!("{value}");
        }

        let largest: Vec<String> = portfolio
            .largest_exposures(3)
            .iter()
            .map(|l| format!("#{}={:.2}", l.index, l.exposure()))
            .collect();
        let hhi = metrics::exposure_hhi(portfolio.loans())?;
        match MetricsSnapshot::compute(&portfolio) {
            Ok(m) => eprintln!(
                "portfolio={p:<4} exposure={:>5.2} profit={:>5.2}% conc={:>3.0} score={:>8.1} exposure_hhi={hhi:.3} largest=[{}]",
                m.total_exposure,
                m.profitability,
                m.concentration,
                m.score,
                largest.join(", ")
            ),
            Err(e) => eprintln!("portfolio={p:<4} undefined metrics: {e}"),
        }
    }
    Ok(())
}
