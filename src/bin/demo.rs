//! End-to-end demo: simulate a catalog of stars, sample the power-law exponent
//! with Metropolis-Hastings and print the posterior summary.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use bayes_mcmc::core::TraceObserver;
use bayes_mcmc::metropolis_hastings::MetropolisHastings;
use bayes_mcmc::mock::simulate_catalog;
use bayes_mcmc::model::ParallaxModel;
use bayes_mcmc::stats::summarize;
use clap::Parser;
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Estimate a distance-prior exponent from simulated parallaxes.
#[derive(Parser, Debug)]
#[command(name = "demo", version, about)]
struct Cli {
    /// Number of simulated stars.
    #[arg(long, default_value_t = 500)]
    stars: usize,

    /// Maximum distance of the prior support.
    #[arg(long, default_value_t = 100.0)]
    dist_max: f64,

    /// Exponent used to simulate the catalog.
    #[arg(long, default_value_t = 2.0)]
    true_alpha: f64,

    /// Parallax uncertainty of every star.
    #[arg(long, default_value_t = 2.0e-3)]
    plx_err: f64,

    /// Initial exponent of the chain.
    #[arg(long, default_value_t = 3.0)]
    alpha0: f64,

    /// Standard deviation of the random-walk proposal.
    #[arg(long, default_value_t = 0.3)]
    step_size: f64,

    /// Chain length, initial state included.
    #[arg(long, default_value_t = 200)]
    steps: usize,

    /// Entries discarded before summarizing.
    #[arg(long, default_value_t = 10)]
    burn_in: usize,

    /// RNG seed for both simulation and sampling. Random when omitted.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Evaluate the per-star integrals in parallel.
    #[arg(long)]
    parallel: bool,

    /// Show a progress bar instead of per-step trace events.
    #[arg(long)]
    progress: bool,

    /// Write the full chain to this CSV file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bayes_mcmc={level},demo={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let seed = cli.seed.unwrap_or_else(|| thread_rng().gen());
    info!(seed, stars = cli.stars, "simulating catalog");

    let mut rng = SmallRng::seed_from_u64(seed);
    let catalog = simulate_catalog(&mut rng, cli.stars, cli.dist_max, cli.true_alpha, cli.plx_err)
        .context("simulating catalog")?;
    let model = ParallaxModel::new(cli.dist_max, catalog.observations)
        .context("building model")?
        .parallel(cli.parallel);

    let mut mh = MetropolisHastings::new(model, cli.alpha0, cli.step_size)
        .context("building sampler")?
        .set_seed(seed.wrapping_add(1));
    let chain = if cli.progress {
        mh.run_progress(cli.steps)?
    } else {
        mh.run_with_observer(cli.steps, &mut TraceObserver)?
    };

    let summary = summarize(chain.view(), cli.burn_in).context("summarizing chain")?;
    println!(
        "alpha = {summary} (true {:.2}, {} samples, acceptance {:.2})",
        cli.true_alpha, summary.n_samples, summary.acceptance_rate
    );

    if let Some(path) = cli.output {
        save(&chain, &path)?;
    }
    Ok(())
}

#[cfg(feature = "csv")]
fn save(chain: &ndarray::Array1<f64>, path: &std::path::Path) -> Result<()> {
    bayes_mcmc::io::csv::save_chain_csv(chain.view(), path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "saved chain");
    Ok(())
}

#[cfg(not(feature = "csv"))]
fn save(_chain: &ndarray::Array1<f64>, _path: &std::path::Path) -> Result<()> {
    anyhow::bail!("chain export needs the `csv` feature")
}
