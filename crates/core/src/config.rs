use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::FundId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub arbitrage: ArbitrageConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
}

/// Tuning for loop discovery and evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrageConfig {
    /// Maximum number of legs in a loop.
    pub max_hops: usize,

    /// Tiers a merged curve must hold before the balance cut-off may stop
    /// further refinement.
    pub merge_tier_floor: usize,

    /// Fraction of the available balance held back to absorb rounding
    /// (0.001 = 0.1%).
    pub balance_discount: Decimal,

    /// A direction counts as profitable only above this ratio.
    pub min_profit_ratio: Decimal,

    /// Poll timeout of the discovery work queue in milliseconds.
    pub discovery_poll_ms: u64,

    /// Fund whose balances limit and pay for trades.
    pub fund: FundId,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            max_hops: 5,
            merge_tier_floor: 8,
            balance_discount: Decimal::new(1, 3),
            min_profit_ratio: Decimal::ONE,
            discovery_poll_ms: 10,
            fund: FundId::default(),
        }
    }
}

impl ArbitrageConfig {
    /// Short loops and a wider rounding buffer.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            max_hops: 3,
            balance_discount: Decimal::new(5, 3),
            min_profit_ratio: Decimal::new(1002, 3),
            ..Self::default()
        }
    }

    /// Longer loops and finer curve refinement.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_hops: 6,
            merge_tier_floor: 16,
            balance_discount: Decimal::new(5, 4),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    #[must_use]
    pub fn with_balance_discount(mut self, discount: Decimal) -> Self {
        self.balance_discount = discount;
        self
    }

    #[must_use]
    pub fn with_min_profit_ratio(mut self, ratio: Decimal) -> Self {
        self.min_profit_ratio = ratio;
        self
    }

    #[must_use]
    pub fn with_fund(mut self, fund: FundId) -> Self {
        self.fund = fund;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// When false, the best loop is ranked and logged but never submitted.
    pub enabled: bool,

    /// Heartbeat between evaluation rounds in milliseconds.
    pub step_interval_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            step_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
