//! `loopbot run`: heartbeat loop against the paper market.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use loopbot_arbitrage::{LoopArbitrageEngine, PaperMarket};
use loopbot_core::{AppConfig, ConfigWatcher};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{paper_engine, TuningArgs};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Market file (TOML)
    #[arg(short, long, env = "LOOPBOT_MARKET")]
    pub market: PathBuf,

    /// Stop after this many steps; runs until Ctrl+C when omitted
    #[arg(long)]
    pub steps: Option<u64>,

    /// Heartbeat in milliseconds, overriding the configured interval
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Rank and log the best loop without submitting trades
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

pub async fn run_engine(
    args: &RunArgs,
    config: &AppConfig,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = config.clone();
    config.arbitrage = args.tuning.apply(config.arbitrage);
    if args.dry_run {
        config.execution.enabled = false;
    }
    let interval = Duration::from_millis(
        args.interval_ms
            .unwrap_or(config.execution.step_interval_ms)
            .max(1),
    );

    let (market, engine) = paper_engine(&args.market, &config)?;
    info!(
        market = %args.market.display(),
        max_hops = engine.max_hops(),
        execution = config.execution.enabled,
        "Starting loop arbitrage"
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down...");
                running.store(false, Ordering::SeqCst);
                engine.shutdown();
            }
        });
    }

    if let Some(path) = config_path {
        let (watcher, rx) = ConfigWatcher::new(config.clone());
        tokio::spawn(async move {
            if let Err(e) = watcher.watch(&path).await {
                warn!(error = %e, "Config watcher stopped");
            }
        });
        tokio::spawn(apply_config_updates(rx, Arc::clone(&engine), args.tuning.clone()));
    }

    if engine.rediscover().await.is_none() {
        warn!("Initial discovery did not complete");
    }

    match args.steps {
        Some(steps) => run_steps(&engine, &running, steps, interval).await,
        None => engine.run(interval).await,
    }

    report(&engine, &market);
    Ok(())
}

async fn run_steps(
    engine: &LoopArbitrageEngine,
    running: &AtomicBool,
    steps: u64,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    for n in 1..=steps {
        ticker.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if let Some(handle) = engine.sync_pairs() {
            if handle.await.ok().flatten().is_none() {
                warn!(step = n, "Re-discovery did not complete");
            }
        }
        match engine.step().await {
            Ok(report) => debug!(
                step = n,
                profitable = report.profitable,
                outcome = ?report.outcome,
                "Step completed"
            ),
            Err(e) => {
                error!(step = n, error = %e, "Stopping");
                break;
            }
        }
    }
}

/// Re-runs discovery when a reloaded config changes the hop limit.
/// Command-line tuning still takes precedence over the file.
async fn apply_config_updates(
    mut rx: watch::Receiver<AppConfig>,
    engine: Arc<LoopArbitrageEngine>,
    tuning: TuningArgs,
) {
    while rx.changed().await.is_ok() {
        let reloaded = rx.borrow_and_update().arbitrage.clone();
        let max_hops = tuning.apply(reloaded).max_hops;
        if max_hops != engine.max_hops() {
            info!(
                from = engine.max_hops(),
                to = max_hops,
                "Applying reloaded max_hops"
            );
            // The engine supervises the round and logs a failed one.
            drop(engine.set_max_hops(max_hops));
        }
    }
}

fn report(engine: &LoopArbitrageEngine, market: &PaperMarket) {
    let stats = engine.stats();
    println!("Rounds:       {}", stats.rounds);
    println!("Executions:   {}", stats.executions);
    println!("Dry runs:     {}", stats.dry_runs);
    println!("Untradeable:  {}", stats.noted_untradeable);
    println!("Failures:     {}", stats.failures);
    println!("Balances ({}):", market.fund());
    for (coin, _fund, balance) in market.balances() {
        println!("  {:<16} {}", coin.to_string(), balance.available);
    }
}
