use crate::events::{TradeFill, TradeRequest};
use crate::market::{Balance, CoinId, FundId, OrderBook, PairId, TradePair};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read-only view of the market owned by the exchange connectivity layer (or
/// a simulation engine).
///
/// Implementations synchronise internally and return copies; callers never
/// hold a lock across their own computation.
pub trait MarketSnapshot: Send + Sync {
    /// All currently tradeable pairs, cross-exchange links included.
    fn pairs(&self) -> Vec<TradePair>;

    /// Depth of one pair, if it is known.
    fn order_book(&self, pair: &PairId) -> Option<OrderBook>;

    /// Balance of `coin` inside `fund`; zero when unknown.
    fn balance(&self, coin: &CoinId, fund: &FundId) -> Balance;

    /// Current time on the live or simulated clock.
    fn now(&self) -> DateTime<Utc>;
}

#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn submit_trade(&self, request: TradeRequest) -> Result<TradeFill>;
}
