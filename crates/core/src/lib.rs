pub mod config;
pub mod config_loader;
pub mod config_watcher;
pub mod events;
pub mod market;
pub mod traits;

pub use config::{AppConfig, ArbitrageConfig, ExecutionConfig, LoggingConfig};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH};
pub use config_watcher::ConfigWatcher;
pub use events::{TradeFill, TradeRequest};
pub use market::{
    AmountRange, AmountViolation, Balance, CoinId, Conversion, ExchangeId, FundId, MarketError,
    OrderBook, PairId, PriceLevel, TradeLimits, TradePair, TradeSide, CROSS_EXCHANGE,
};
pub use traits::{MarketSnapshot, TradeExecutor};
