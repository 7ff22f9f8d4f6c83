mod run;
mod scan;
mod validate;

pub use run::{run_engine, RunArgs};
pub use scan::{run_scan, ScanArgs};
pub use validate::{run_validate, ValidateArgs};

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, ValueEnum};
use loopbot_arbitrage::{LoopArbitrageEngine, PaperExecutor, PaperMarket};
use loopbot_core::{AppConfig, ArbitrageConfig, MarketSnapshot};
use rust_decimal::Decimal;

use crate::market_file::MarketFile;

/// Loads a market file and wires an engine that trades against it on paper.
pub(crate) fn paper_engine(
    market_path: &std::path::Path,
    config: &AppConfig,
) -> Result<(Arc<PaperMarket>, Arc<LoopArbitrageEngine>)> {
    let market = Arc::new(MarketFile::load(market_path)?.into_market()?);
    let engine = LoopArbitrageEngine::new(
        Arc::clone(&market) as Arc<dyn MarketSnapshot>,
        Arc::new(PaperExecutor::new(Arc::clone(&market))),
        config,
    );
    Ok((market, Arc::new(engine)))
}

/// Named tuning profiles for discovery and evaluation.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Default,
    Conservative,
    Aggressive,
}

impl Preset {
    fn config(self) -> ArbitrageConfig {
        match self {
            Self::Default => ArbitrageConfig::default(),
            Self::Conservative => ArbitrageConfig::conservative(),
            Self::Aggressive => ArbitrageConfig::aggressive(),
        }
    }
}

/// Command-line overrides of the `[arbitrage]` config section.
#[derive(Args, Debug, Clone, Default)]
pub struct TuningArgs {
    /// Replace the configured tuning with a named preset; the fund is kept
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Override the configured maximum loop length
    #[arg(long)]
    pub max_hops: Option<usize>,

    /// Only count directions above this ratio as profitable, e.g. 1.002
    #[arg(long)]
    pub min_profit_ratio: Option<Decimal>,

    /// Fraction of available balance held back, e.g. 0.001
    #[arg(long)]
    pub balance_discount: Option<Decimal>,
}

impl TuningArgs {
    /// Applies the preset first, then the individual overrides.
    #[must_use]
    pub fn apply(&self, configured: ArbitrageConfig) -> ArbitrageConfig {
        let mut config = match self.preset {
            Some(preset) => ArbitrageConfig {
                fund: configured.fund,
                discovery_poll_ms: configured.discovery_poll_ms,
                ..preset.config()
            },
            None => configured,
        };
        if let Some(max_hops) = self.max_hops {
            config = config.with_max_hops(max_hops);
        }
        if let Some(ratio) = self.min_profit_ratio {
            config = config.with_min_profit_ratio(ratio);
        }
        if let Some(discount) = self.balance_discount {
            config = config.with_balance_discount(discount);
        }
        config
    }
}
