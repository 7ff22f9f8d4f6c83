//! Market data model shared by the loop arbitrage crates.
//!
//! Everything here is a plain value type. Collaborators that own live market
//! state hand out copies of these types through [`crate::MarketSnapshot`], so
//! the arbitrage core never holds a reference into externally locked data.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exchange identifier used for the synthetic pairs that move a coin between
/// two real exchanges.
pub const CROSS_EXCHANGE: &str = "cross";

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while constructing or querying market data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketError {
    /// A pair was declared with the same coin on both sides.
    #[error("Pair {pair} has identical base and quote coin {coin}")]
    SameCoin {
        /// Offending pair.
        pair: PairId,
        /// The duplicated coin.
        coin: CoinId,
    },

    /// A cross-exchange pair must link one symbol on two different exchanges.
    #[error("Cross-exchange pair {pair} must link {base} and {quote} with equal symbols on different exchanges")]
    InvalidCrossLink {
        /// Offending pair.
        pair: PairId,
        /// Base coin.
        base: CoinId,
        /// Quote coin.
        quote: CoinId,
    },

    /// A coin was used against a pair that does not contain it.
    #[error("Coin {coin} is not traded by pair {pair}")]
    CoinNotInPair {
        /// The pair.
        pair: PairId,
        /// The coin that was expected in it.
        coin: CoinId,
    },

    /// No pair with the given id exists.
    #[error("Unknown pair: {0}")]
    UnknownPair(PairId),
}

// =============================================================================
// Identifiers
// =============================================================================

/// Identifies an exchange (or the cross-exchange pseudo exchange).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(pub String);

impl ExchangeId {
    /// Creates an exchange id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The cross-exchange pseudo exchange.
    #[must_use]
    pub fn cross() -> Self {
        Self(CROSS_EXCHANGE.to_string())
    }

    /// Returns true for the cross-exchange pseudo exchange.
    #[must_use]
    pub fn is_cross(&self) -> bool {
        self.0 == CROSS_EXCHANGE
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A currency symbol scoped to one exchange.
///
/// The same real-world currency on two exchanges is two distinct coins, linked
/// only through a cross-exchange pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoinId {
    /// Exchange holding the coin.
    pub exchange: ExchangeId,
    /// Currency symbol (e.g., "BTC").
    pub symbol: String,
}

impl CoinId {
    /// Creates a coin id.
    #[must_use]
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: ExchangeId::new(exchange),
            symbol: symbol.into(),
        }
    }
}

impl std::fmt::Display for CoinId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.exchange)
    }
}

/// Identifies a trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairId(pub String);

impl PairId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the conventional `exchange:BASE/QUOTE` id.
    #[must_use]
    pub fn for_coins(exchange: &ExchangeId, base: &CoinId, quote: &CoinId) -> Self {
        if exchange.is_cross() {
            Self(format!("{exchange}:{base}/{quote}"))
        } else {
            Self(format!("{exchange}:{}/{}", base.symbol, quote.symbol))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PairId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named sub-account partition of an exchange balance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FundId(pub String);

impl FundId {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Default for FundId {
    fn default() -> Self {
        Self("main".to_string())
    }
}

impl std::fmt::Display for FundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Trade Side
// =============================================================================

/// Which side of a pair's book a conversion consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    /// Spend quote, receive base (consumes asks).
    Buy,
    /// Spend base, receive quote (consumes bids).
    Sell,
}

impl TradeSide {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Order Book
// =============================================================================

/// One price level of an order book. Volume is always in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price in quote per base.
    pub price: Decimal,
    /// Volume in base units.
    pub volume: Decimal,
}

impl PriceLevel {
    #[must_use]
    pub const fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

/// Result of walking an order book with a given input amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    /// Amount of the input coin actually consumed.
    pub input: Decimal,
    /// Amount of the output coin received, before fees.
    pub output: Decimal,
}

impl Conversion {
    /// Output per unit of input, or zero when nothing was consumed.
    #[must_use]
    pub fn rate(&self) -> Decimal {
        if self.input.is_zero() {
            return Decimal::ZERO;
        }
        self.output.checked_div(self.input).unwrap_or(Decimal::ZERO)
    }
}

/// Depth snapshot of one pair.
///
/// Bids are kept sorted best (highest) first, asks best (lowest) first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl OrderBook {
    /// Builds a book from unsorted levels, dropping empty or non-positive levels.
    #[must_use]
    pub fn new(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        let mut bids: Vec<PriceLevel> = bids
            .into_iter()
            .filter(|l| l.price > Decimal::ZERO && l.volume > Decimal::ZERO)
            .collect();
        let mut asks: Vec<PriceLevel> = asks
            .into_iter()
            .filter(|l| l.price > Decimal::ZERO && l.volume > Decimal::ZERO)
            .collect();
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self { bids, asks }
    }

    /// Book with unlimited 1:1 depth on both sides, used for cross-exchange pairs.
    #[must_use]
    pub fn unlimited_parity() -> Self {
        let level = PriceLevel::new(Decimal::ONE, Decimal::MAX);
        Self {
            bids: vec![level],
            asks: vec![level],
        }
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Levels consumed by a conversion on `side`.
    #[must_use]
    pub fn levels(&self, side: TradeSide) -> &[PriceLevel] {
        match side {
            TradeSide::Buy => &self.asks,
            TradeSide::Sell => &self.bids,
        }
    }

    /// Walks the book spending `amount` of the input coin.
    ///
    /// Selling spends base against the bids; buying spends quote against the
    /// asks. Stops early when depth runs out, in which case `input < amount`.
    #[must_use]
    pub fn convert(&self, side: TradeSide, amount: Decimal) -> Conversion {
        let mut remaining = amount.max(Decimal::ZERO);
        let mut output = Decimal::ZERO;

        for level in self.levels(side) {
            if remaining.is_zero() {
                break;
            }
            match side {
                TradeSide::Sell => {
                    let take = level.volume.min(remaining);
                    output = output.saturating_add(take.saturating_mul(level.price));
                    remaining -= take;
                }
                TradeSide::Buy => {
                    let capacity = level.volume.saturating_mul(level.price);
                    let take = capacity.min(remaining);
                    output = output.saturating_add(take.checked_div(level.price).unwrap_or(Decimal::ZERO));
                    remaining -= take;
                }
            }
        }

        Conversion {
            input: amount.max(Decimal::ZERO) - remaining,
            output,
        }
    }
}

// =============================================================================
// Trade Limits
// =============================================================================

/// Inclusive range of allowed trade amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl AmountRange {
    #[must_use]
    pub const fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    /// Range accepting any non-negative amount.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            min: Decimal::ZERO,
            max: Decimal::MAX,
        }
    }

    #[must_use]
    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && amount <= self.max
    }
}

impl Default for AmountRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Allowed amounts on each side of a pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLimits {
    /// Allowed base amount per order.
    #[serde(default)]
    pub base: AmountRange,
    /// Allowed quote amount (notional) per order.
    #[serde(default)]
    pub quote: AmountRange,
}

/// A leg amount that falls outside the pair's allowed range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{amount} {coin} outside allowed range [{min}, {max}] on {pair}")]
pub struct AmountViolation {
    pub pair: PairId,
    pub coin: CoinId,
    pub amount: Decimal,
    pub min: Decimal,
    pub max: Decimal,
}

// =============================================================================
// Trade Pair
// =============================================================================

/// An unordered base/quote pair on one exchange, or a cross-exchange link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePair {
    pub id: PairId,
    pub base: CoinId,
    pub quote: CoinId,
    pub exchange: ExchangeId,
    /// Fee as a fraction of the received amount (0.001 = 0.1%).
    pub fee_rate: Decimal,
    #[serde(default)]
    pub limits: TradeLimits,
}

impl TradePair {
    /// Creates an ordinary pair on `base.exchange`.
    ///
    /// # Errors
    /// Returns [`MarketError::SameCoin`] when base equals quote.
    pub fn new(base: CoinId, quote: CoinId, fee_rate: Decimal) -> Result<Self, MarketError> {
        let exchange = base.exchange.clone();
        let id = PairId::for_coins(&exchange, &base, &quote);
        Self::with_id(id, base, quote, exchange, fee_rate)
    }

    /// Creates a cross-exchange pair linking one symbol on two exchanges.
    ///
    /// # Errors
    /// Returns [`MarketError::InvalidCrossLink`] unless the symbols match and
    /// the exchanges differ.
    pub fn cross(base: CoinId, quote: CoinId) -> Result<Self, MarketError> {
        let exchange = ExchangeId::cross();
        let id = PairId::for_coins(&exchange, &base, &quote);
        if base.symbol != quote.symbol || base.exchange == quote.exchange {
            return Err(MarketError::InvalidCrossLink {
                pair: id,
                base,
                quote,
            });
        }
        Self::with_id(id, base, quote, exchange, Decimal::ZERO)
    }

    /// Creates a pair with an explicit id.
    ///
    /// The fee is forced to zero when the coins live on different exchanges.
    ///
    /// # Errors
    /// Returns [`MarketError::SameCoin`] when base equals quote.
    pub fn with_id(
        id: PairId,
        base: CoinId,
        quote: CoinId,
        exchange: ExchangeId,
        fee_rate: Decimal,
    ) -> Result<Self, MarketError> {
        if base == quote {
            return Err(MarketError::SameCoin { pair: id, coin: base });
        }
        let fee_rate = if base.exchange == quote.exchange {
            fee_rate
        } else {
            Decimal::ZERO
        };
        Ok(Self {
            id,
            base,
            quote,
            exchange,
            fee_rate,
            limits: TradeLimits::default(),
        })
    }

    /// Sets the allowed trade amounts.
    #[must_use]
    pub fn with_limits(mut self, limits: TradeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// True when this pair moves a coin between exchanges.
    #[must_use]
    pub fn is_cross_exchange(&self) -> bool {
        self.base.exchange != self.quote.exchange
    }

    #[must_use]
    pub fn contains(&self, coin: &CoinId) -> bool {
        &self.base == coin || &self.quote == coin
    }

    /// The coin on the other side of `coin`, if `coin` belongs to the pair.
    #[must_use]
    pub fn other(&self, coin: &CoinId) -> Option<&CoinId> {
        if &self.base == coin {
            Some(&self.quote)
        } else if &self.quote == coin {
            Some(&self.base)
        } else {
            None
        }
    }

    /// Side of the book consumed when spending `input`.
    ///
    /// # Errors
    /// Returns [`MarketError::CoinNotInPair`] when `input` is not in the pair.
    pub fn side_for(&self, input: &CoinId) -> Result<TradeSide, MarketError> {
        if &self.base == input {
            Ok(TradeSide::Sell)
        } else if &self.quote == input {
            Ok(TradeSide::Buy)
        } else {
            Err(MarketError::CoinNotInPair {
                pair: self.id.clone(),
                coin: input.clone(),
            })
        }
    }

    fn range_for(&self, coin: &CoinId) -> AmountRange {
        if coin == &self.base {
            self.limits.base
        } else {
            self.limits.quote
        }
    }

    /// Checks a leg's input and output amounts against the allowed ranges.
    ///
    /// The outer error is structural (the coin is not in the pair); the inner
    /// list holds every amount outside its range.
    ///
    /// # Errors
    /// Returns [`MarketError::CoinNotInPair`] when `input` is not in the pair.
    pub fn check_amounts(
        &self,
        input: &CoinId,
        input_amount: Decimal,
        output_amount: Decimal,
    ) -> Result<Vec<AmountViolation>, MarketError> {
        let output = self.other(input).ok_or_else(|| MarketError::CoinNotInPair {
            pair: self.id.clone(),
            coin: input.clone(),
        })?;

        let mut violations = Vec::new();
        for (coin, amount) in [(input, input_amount), (output, output_amount)] {
            let range = self.range_for(coin);
            if !range.contains(amount) {
                violations.push(AmountViolation {
                    pair: self.id.clone(),
                    coin: coin.clone(),
                    amount,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(violations)
    }
}

impl std::fmt::Display for TradePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

// =============================================================================
// Balance
// =============================================================================

/// Balance of one coin in one fund.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub total: Decimal,
    pub held: Decimal,
    pub available: Decimal,
}

impl Balance {
    /// Balance with nothing held in open orders.
    #[must_use]
    pub const fn available(amount: Decimal) -> Self {
        Self {
            total: amount,
            held: Decimal::ZERO,
            available: amount,
        }
    }
}
