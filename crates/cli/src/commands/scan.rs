//! `loopbot scan`: one discovery and evaluation round, nothing submitted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use loopbot_arbitrage::LoopSummary;
use loopbot_core::AppConfig;
use tracing::info;

use super::{paper_engine, TuningArgs};

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Market file (TOML)
    #[arg(short, long, env = "LOOPBOT_MARKET")]
    pub market: PathBuf,

    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Only show the best N loops
    #[arg(long)]
    pub top: Option<usize>,

    /// Print loop summaries as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run_scan(args: &ScanArgs, config: &AppConfig) -> Result<()> {
    let mut config = config.clone();
    config.execution.enabled = false;
    config.arbitrage = args.tuning.apply(config.arbitrage);

    let (_market, engine) = paper_engine(&args.market, &config)?;
    let discovery = engine
        .rediscover()
        .await
        .context("Loop discovery did not complete")?;
    info!(
        loops = discovery.loops.len(),
        expansions = discovery.expansions,
        faults = discovery.faults.len(),
        "Discovery finished"
    );

    let report = engine.step().await?;
    info!(
        evaluated = report.evaluated,
        profitable = report.profitable,
        excluded = report.excluded,
        "Evaluation finished"
    );

    let mut summaries = engine.collection().summaries();
    if let Some(top) = args.top {
        summaries.truncate(top);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print_table(&summaries);
    }
    Ok(())
}

fn print_table(summaries: &[LoopSummary]) {
    if summaries.is_empty() {
        println!("No loops found");
        return;
    }

    println!(
        "{:<18} {:>4} {:>9} {:>12} {:>12} {:>12} {:>10}  Path",
        "Loop", "Legs", "Best", "Forward", "Backward", "Volume", "Scale"
    );
    for summary in summaries {
        println!(
            "{:<18} {:>4} {:>9} {:>12} {:>12} {:>12} {:>10}  {}",
            summary.key.to_string(),
            summary.legs.len(),
            summary.best_direction.to_string(),
            summary.forward_ratio.round_dp(6),
            summary.backward_ratio.round_dp(6),
            summary.trade_volume.round_dp(6),
            summary.trade_scale.round_dp(4),
            summary.coins.join(" -> "),
        );
        if !summary.tradeability.is_empty() {
            println!("{:<18} {}", "", summary.tradeability);
        }
    }
}
