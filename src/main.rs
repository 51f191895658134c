use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use traffic_signals::{
    Clock, HistoryStore, JsonLinesHistory, MemoryHistory, NetworkConfig, SignalNetwork,
    SyntheticCounts, SystemClock, VirtualClock,
};

/// Runs a network of adaptive traffic signals.
#[derive(Debug, Parser)]
#[command(name = "traffic-signals")]
struct Cli {
    /// JSON network config. Uses the built-in network if omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seconds between ticks.
    #[arg(long, default_value_t = 3)]
    tick_secs: u32,
    /// Stop after this many ticks.
    #[arg(long)]
    ticks: Option<u64>,
    /// Append history to this JSON lines file instead of keeping it in memory.
    #[arg(long)]
    history: Option<PathBuf>,
    /// Feed signals generated vehicle counts before every tick.
    #[arg(long)]
    synthetic: bool,
    /// Draw generated counts from a Poisson distribution with this mean.
    #[arg(long, requires = "synthetic")]
    poisson_mean: Option<f64>,
    /// Advance a virtual clock instead of sleeping between ticks.
    #[arg(long)]
    fast: bool,
    /// Log every phase transition.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        })
        .init();

    let config = match &cli.config {
        Some(path) => NetworkConfig::load(path)?,
        None => NetworkConfig::default(),
    };

    let file_history = match &cli.history {
        Some(path) => Some(Arc::new(
            JsonLinesHistory::open(path)
                .with_context(|| format!("opening history file {}", path.display()))?,
        )),
        None => None,
    };
    let history: Arc<dyn HistoryStore> = match &file_history {
        Some(history) => history.clone(),
        None => Arc::new(MemoryHistory::new()),
    };

    let virtual_clock = cli.fast.then(|| VirtualClock::new(SystemClock::new().now()));
    let clock: Arc<dyn Clock> = match &virtual_clock {
        Some(clock) => Arc::new(clock.clone()),
        None => Arc::new(SystemClock::new()),
    };

    let network = SignalNetwork::new(&config, clock, history).context("invalid network config")?;
    if let Some(history) = &file_history {
        for name in history.unclaimed() {
            warn!("History file has records for {:?}, which is not configured", name);
        }
    }

    let synthetic = match (cli.synthetic, cli.poisson_mean) {
        (false, _) => None,
        (true, Some(mean)) => Some(SyntheticCounts::poisson(mean)?),
        (true, None) => Some(SyntheticCounts::default()),
    };
    let mut rng = rand::thread_rng();

    let mut tick = 0;
    while cli.ticks.map_or(true, |n| tick < n) {
        match &virtual_clock {
            Some(clock) => clock.advance_secs(cli.tick_secs),
            None => thread::sleep(Duration::from_secs(cli.tick_secs as u64)),
        }

        if let Some(source) = &synthetic {
            network.resample_counts(&mut rng, source);
        }

        let report = network.tick(cli.tick_secs);
        for (id, err) in &report.failures {
            error!("Transition of {:?} not recorded: {}", id, err);
        }
        if let Some(err) = &report.flush_failure {
            error!("History not saved this tick: {}", err);
        }
        for id in &report.changed {
            if let Ok(state) = network.get_signal(*id) {
                info!(
                    "{} ({}): {} for {}s, {} vehicles, efficiency {}",
                    state.info.name,
                    state.info.location,
                    state.phase,
                    state.remaining_secs,
                    state.vehicle_count,
                    state.efficiency,
                );
            }
        }
        tick += 1;
    }

    println!("{}", serde_json::to_string_pretty(&network.analytics())?);
    Ok(())
}
