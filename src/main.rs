use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use detox::analysis::{self, BatchStats, DistStats, RunSummary};
use detox::config::SessionConfig;
use detox::events::SessionEvent;
use detox::player::{GreedyPlayer, Player, RandomPlayer};
use detox::simulation::Simulation;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlayerKind {
    Greedy,
    Random,
}

impl PlayerKind {
    fn build(self, seed: u64, accept_probability: f64) -> detox::Result<Box<dyn Player>> {
        Ok(match self {
            PlayerKind::Greedy => Box::new(GreedyPlayer::default()),
            PlayerKind::Random => Box::new(RandomPlayer::new(seed, accept_probability)?),
        })
    }
}

fn parse_probability(s: &str) -> std::result::Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{s} is not a probability in [0, 1]"))
    }
}

/// Headless credit portfolio detox sessions.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML session configuration; canonical values are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed of the first run (overrides the config).
    #[arg(long)]
    seed: Option<u64>,
    /// Number of independent runs, seeded `seed..seed + runs`.
    #[arg(long)]
    runs: Option<u64>,
    #[arg(long, value_enum, default_value = "greedy")]
    player: PlayerKind,
    /// Acceptance probability of the random player.
    #[arg(long, default_value_t = 0.2, value_parser = parse_probability)]
    accept_probability: f64,
    /// NDJSON event log of a single run.
    #[arg(long, default_value = "events.ndjson")]
    output: PathBuf,
    /// Directory for per-seed NDJSON logs in multi-run mode.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("detox=warn")))
        .init();

    let cli = Cli::parse();

    let mut base_config = match &cli.config {
        Some(path) => SessionConfig::load_with_env_and_validate(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::canonical().with_env_override(),
    };
    if let Some(seed) = cli.seed {
        base_config.seed = seed;
    }
    base_config.validate().context("invalid session configuration")?;
    tracing::info!(seed = base_config.seed, runs = ?cli.runs, player = ?cli.player, "starting");

    match cli.runs {
        Some(n) => run_batch(&cli, &base_config, n),
        None => run_single(&cli, base_config),
    }
}

fn run_single(cli: &Cli, config: SessionConfig) -> Result<()> {
    let seed = config.seed;
    let mut sim = Simulation::from_config(config)?;
    let mut player = cli.player.build(seed, cli.accept_probability)?;
    let summary = sim.run(player.as_mut())?;

    write_log(&cli.output, &sim.session.log)?;

    if !cli.quiet {
        println!("Events logged: {} → {}", sim.session.log.len(), cli.output.display());
        print_summary(&summary);
    }
    Ok(())
}

fn run_batch(cli: &Cli, base_config: &SessionConfig, n: u64) -> Result<()> {
    if let Some(dir) = &cli.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }

    let summaries: Vec<RunSummary> = (0..n)
        .into_par_iter()
        .map(|i| -> Result<RunSummary> {
            let config = base_config.for_run(i);
            let seed = config.seed;
            let mut sim = Simulation::from_config(config)?;
            let mut player = cli.player.build(seed, cli.accept_probability)?;
            let summary = sim.run(player.as_mut())?;

            if let Some(dir) = &cli.output_dir {
                let path = dir.join(format!("events_seed_{seed}.ndjson"));
                write_log(&path, &sim.session.log)?;
                if !cli.quiet {
                    println!("Seed {seed}: {} events → {}", sim.session.log.len(), path.display());
                }
            }
            Ok(summary)
        })
        .collect::<Result<_>>()?;

    if !cli.quiet {
        print_runs(&summaries);
        match analysis::analyse_runs(&summaries) {
            Some(stats) => print_batch(&stats),
            None => eprintln!("Warning: no runs to analyse"),
        }
    }
    Ok(())
}

fn write_log(path: &Path, log: &[SessionEvent]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for ev in log {
        serde_json::to_writer(&mut writer, ev)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_summary(s: &RunSummary) {
    println!("\n=== Session (seed {}) ===", s.seed);
    println!("{:>14} | {:>10} | {:>10}", "", "Initial", "Final");
    println!("{}", "-".repeat(40));
    println!("{:>14} | {:>10.2} | {:>10.2}", "Exposure (bn)", s.initial.total_exposure, s.final_metrics.total_exposure);
    println!("{:>14} | {:>9.2}% | {:>9.2}%", "Profitability", s.initial.profitability, s.final_metrics.profitability);
    println!("{:>14} | {:>10.0} | {:>10.0}", "Concentration", s.initial.concentration, s.final_metrics.concentration);
    println!("{:>14} | {:>10.1} | {:>10.1}", "Score", s.initial.score, s.final_metrics.score);
    println!(
        "\nProposals used: {}  accepted: {}  rolled back: {}  outcome: {:?}",
        s.proposals_used, s.accepted, s.rolled_back, s.outcome
    );
}

fn print_runs(summaries: &[RunSummary]) {
    println!("\n=== Per-Run Results ===");
    println!(
        "{:>6} | {:>9} | {:>9} | {:>7} | {:>6} | {:>5} | {:>8}",
        "Seed", "Score0", "Score", "Profit%", "Conc", "Acc#", "Outcome"
    );
    println!("{}", "-".repeat(68));
    for s in summaries {
        println!(
            "{:>6} | {:>9.1} | {:>9.1} | {:>6.2}% | {:>6.0} | {:>5} | {:>8}",
            s.seed,
            s.initial.score,
            s.final_metrics.score,
            s.final_metrics.profitability,
            s.final_metrics.concentration,
            s.accepted,
            format!("{:?}", s.outcome),
        );
    }
}

fn print_dist_row(label: &str, ds: &DistStats) {
    println!(
        "{:>14} | {:>8.1} | {:>8.1} | {:>8.1} | {:>8.1} | {:>8.1} | {:>8.1} | {:>8.1} | {:>8.1} | {:>8.1}",
        label, ds.min, ds.p5, ds.p25, ds.p50, ds.p75, ds.p95, ds.max, ds.mean, ds.std_dev,
    );
}

fn print_batch(stats: &BatchStats) {
    println!("\n=== Multi-Run Distribution (N={} runs) ===", stats.runs);
    println!(
        "{:>14} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8}",
        "Metric", "min", "p5", "p25", "p50", "p75", "p95", "max", "mean", "stddev"
    );
    print_dist_row("Score", &stats.final_score);
    print_dist_row("Score gain", &stats.score_gain);
    print_dist_row("Profit%", &stats.final_profitability);
    print_dist_row("Concentration", &stats.final_concentration);
    print_dist_row("Accepted#", &stats.accepted);
    println!(
        "\nDetoxed: {}/{} ({:.1}%)",
        stats.wins,
        stats.runs,
        stats.win_rate * 100.0
    );
}
