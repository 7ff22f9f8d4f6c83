//! In-memory market and executor for dry runs and tests.
//!
//! [`PaperMarket`] owns pairs, books and balances behind one lock and hands
//! out copies, like a live connectivity layer would. [`PaperExecutor`] fills
//! requests against those books, consuming depth and moving balances.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loopbot_core::{
    Balance, CoinId, FundId, MarketSnapshot, OrderBook, PairId, PriceLevel, TradeExecutor,
    TradeFill, TradePair, TradeRequest, TradeSide,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::debug;

// =============================================================================
// Paper Market
// =============================================================================

#[derive(Debug, Default)]
struct PaperState {
    pairs: BTreeMap<PairId, TradePair>,
    books: HashMap<PairId, OrderBook>,
    balances: HashMap<(CoinId, FundId), Balance>,
    clock: Option<DateTime<Utc>>,
}

/// Internally synchronised in-memory [`MarketSnapshot`].
#[derive(Debug, Default)]
pub struct PaperMarket {
    state: RwLock<PaperState>,
    fund: FundId,
}

impl PaperMarket {
    /// Market whose `set_balance` writes to the default fund.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Market whose `set_balance` writes to `fund`.
    #[must_use]
    pub fn with_fund(fund: FundId) -> Self {
        Self {
            state: RwLock::new(PaperState::default()),
            fund,
        }
    }

    /// Adds or replaces a pair and its book.
    ///
    /// Cross-exchange pairs always get unlimited 1:1 depth.
    pub fn add_pair(&self, pair: TradePair, book: OrderBook) {
        let book = if pair.is_cross_exchange() {
            OrderBook::unlimited_parity()
        } else {
            book
        };
        let mut state = self.state.write();
        state.books.insert(pair.id.clone(), book);
        state.pairs.insert(pair.id.clone(), pair);
    }

    /// Adds a cross-exchange pair.
    pub fn add_cross_pair(&self, pair: TradePair) {
        self.add_pair(pair, OrderBook::unlimited_parity());
    }

    pub fn remove_pair(&self, id: &PairId) -> Option<TradePair> {
        let mut state = self.state.write();
        state.books.remove(id);
        state.pairs.remove(id)
    }

    #[must_use]
    pub fn pair(&self, id: &PairId) -> Option<TradePair> {
        self.state.read().pairs.get(id).cloned()
    }

    /// Replaces the book of a known pair; unknown pairs are ignored.
    pub fn set_order_book(&self, id: &PairId, book: OrderBook) {
        let mut state = self.state.write();
        if state.pairs.contains_key(id) {
            state.books.insert(id.clone(), book);
        }
    }

    /// Sets a balance in this market's fund.
    pub fn set_balance(&self, coin: CoinId, balance: Balance) {
        let fund = self.fund.clone();
        self.set_fund_balance(coin, fund, balance);
    }

    pub fn set_fund_balance(&self, coin: CoinId, fund: FundId, balance: Balance) {
        self.state.write().balances.insert((coin, fund), balance);
    }

    /// Pins the clock; `None` follows wall time.
    pub fn set_clock(&self, now: Option<DateTime<Utc>>) {
        self.state.write().clock = now;
    }

    #[must_use]
    pub fn fund(&self) -> &FundId {
        &self.fund
    }

    /// Every non-zero balance, sorted by coin.
    #[must_use]
    pub fn balances(&self) -> Vec<(CoinId, FundId, Balance)> {
        let state = self.state.read();
        let mut out: Vec<(CoinId, FundId, Balance)> = state
            .balances
            .iter()
            .filter(|(_, b)| !b.total.is_zero())
            .map(|((coin, fund), b)| (coin.clone(), fund.clone(), *b))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl MarketSnapshot for PaperMarket {
    fn pairs(&self) -> Vec<TradePair> {
        self.state.read().pairs.values().cloned().collect()
    }

    fn order_book(&self, pair: &PairId) -> Option<OrderBook> {
        self.state.read().books.get(pair).cloned()
    }

    fn balance(&self, coin: &CoinId, fund: &FundId) -> Balance {
        self.state
            .read()
            .balances
            .get(&(coin.clone(), fund.clone()))
            .copied()
            .unwrap_or_default()
    }

    fn now(&self) -> DateTime<Utc> {
        self.state.read().clock.unwrap_or_else(Utc::now)
    }
}

// =============================================================================
// Paper Executor
// =============================================================================

/// Fills trades against a [`PaperMarket`].
///
/// The pair fee is charged on the output. Filled depth is removed from the book.
#[derive(Debug, Clone)]
pub struct PaperExecutor {
    market: Arc<PaperMarket>,
}

impl PaperExecutor {
    #[must_use]
    pub fn new(market: Arc<PaperMarket>) -> Self {
        Self { market }
    }

    fn fill(&self, request: &TradeRequest) -> Result<TradeFill> {
        let now = self.market.now();
        let mut state = self.market.state.write();

        let pair = state
            .pairs
            .get(&request.pair)
            .cloned()
            .ok_or_else(|| anyhow!("unknown pair {}", request.pair))?;
        let side = pair.side_for(&request.input_coin)?;
        if side != request.side {
            bail!(
                "{} on {} spends {}, not {}",
                request.side,
                pair.id,
                if request.side == TradeSide::Sell { &pair.base } else { &pair.quote },
                request.input_coin
            );
        }
        let output_coin = pair
            .other(&request.input_coin)
            .cloned()
            .ok_or_else(|| anyhow!("{} not traded by {}", request.input_coin, pair.id))?;

        let input_key = (request.input_coin.clone(), request.fund.clone());
        let available = state
            .balances
            .get(&input_key)
            .map_or(Decimal::ZERO, |b| b.available);
        if available < request.volume {
            bail!(
                "insufficient {}: {} available, {} requested",
                request.input_coin,
                available,
                request.volume
            );
        }

        let book = state
            .books
            .get_mut(&request.pair)
            .ok_or_else(|| anyhow!("no order book for {}", request.pair))?;
        let conversion = book.convert(side, request.volume);
        if conversion.input.is_zero() {
            bail!("no depth on {} for {}", request.pair, side);
        }
        if !pair.is_cross_exchange() {
            consume(book, side, conversion.input);
        }

        let fee = conversion.output.saturating_mul(pair.fee_rate);
        adjust(&mut state.balances, input_key, -conversion.input);
        adjust(
            &mut state.balances,
            (output_coin, request.fund.clone()),
            conversion.output - fee,
        );

        debug!(
            request_id = %request.request_id,
            pair = %pair.id,
            side = %side,
            input = %conversion.input,
            output = %conversion.output,
            fee = %fee,
            "Paper trade filled"
        );

        Ok(TradeFill {
            request_id: request.request_id,
            pair: pair.id,
            input_volume: conversion.input,
            output_volume: conversion.output,
            fee,
            timestamp: now,
        })
    }
}

#[async_trait]
impl TradeExecutor for PaperExecutor {
    async fn submit_trade(&self, request: TradeRequest) -> Result<TradeFill> {
        self.fill(&request)
    }
}

fn adjust(balances: &mut HashMap<(CoinId, FundId), Balance>, key: (CoinId, FundId), delta: Decimal) {
    let balance = balances.entry(key).or_default();
    balance.total += delta;
    balance.available += delta;
}

/// Removes `input` worth of depth from the side a trade consumed.
fn consume(book: &mut OrderBook, side: TradeSide, input: Decimal) {
    let levels = match side {
        TradeSide::Sell => &mut book.bids,
        TradeSide::Buy => &mut book.asks,
    };
    let mut remaining = input;
    let mut kept: Vec<PriceLevel> = Vec::with_capacity(levels.len());
    for level in levels.drain(..) {
        if remaining.is_zero() {
            kept.push(level);
            continue;
        }
        // Depth is base volume; buys spend quote.
        let base_taken = match side {
            TradeSide::Sell => level.volume.min(remaining),
            TradeSide::Buy => level.volume.min(
                remaining
                    .checked_div(level.price)
                    .unwrap_or(level.volume),
            ),
        };
        remaining -= match side {
            TradeSide::Sell => base_taken,
            TradeSide::Buy => base_taken.saturating_mul(level.price).min(remaining),
        };
        let left = level.volume - base_taken;
        if left > Decimal::ZERO {
            kept.push(PriceLevel::new(level.price, left));
        }
    }
    *levels = kept;
}
