//! Loop types shared by discovery, evaluation and execution.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use loopbot_core::{CoinId, PairId, TradePair, TradeSide};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LoopError;

// =============================================================================
// Direction
// =============================================================================

/// Traversal direction of a loop. Both start and end on the loop's `beg` coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Legs in discovery order.
    Forward,
    /// Legs in reverse order.
    Backward,
}

impl Direction {
    /// Both directions, forward first.
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Backward];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Loop Key
// =============================================================================

/// Order-independent identity of a loop's leg set.
///
/// The same cycle found from a different seed pair, or walked the other way
/// round, hashes to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopKey(pub u64);

impl LoopKey {
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a PairId>) -> Self {
        let mut ids: Vec<&PairId> = pairs.into_iter().collect();
        ids.sort();
        let mut hasher = DefaultHasher::new();
        for id in ids {
            id.hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

impl std::fmt::Display for LoopKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// =============================================================================
// Loop Leg
// =============================================================================

/// One leg of a loop resolved for a direction.
#[derive(Debug, Clone)]
pub struct LoopLeg {
    /// Position in walk order.
    pub index: usize,
    pub pair: Arc<TradePair>,
    /// Coin spent on this leg.
    pub input: CoinId,
    /// Coin received on this leg.
    pub output: CoinId,
    pub side: TradeSide,
}

// =============================================================================
// Direction Report
// =============================================================================

/// Evaluation result of one direction, written only by that direction's
/// evaluation unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionReport {
    /// Ending amount over starting amount before fees.
    pub gross_ratio: Decimal,
    /// Ending amount minus carried fees, over starting amount.
    pub profit_ratio: Decimal,
    /// Profitable volume of the starting coin.
    pub trade_volume: Decimal,
    /// Fraction of `trade_volume` the balances allow, in [0, 1].
    pub trade_scale: Decimal,
    /// Coin whose balance set the trade scale, when below one.
    pub limiting_coin: Option<CoinId>,
    /// Why the loop is not (fully) tradeable.
    pub notes: Vec<String>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl DirectionReport {
    #[must_use]
    pub fn is_profitable(&self, min_ratio: Decimal) -> bool {
        self.profit_ratio > min_ratio
    }

    /// Human readable tradeability text.
    #[must_use]
    pub fn tradeability(&self) -> String {
        if self.evaluated_at.is_none() {
            return "not evaluated".to_string();
        }
        if self.notes.is_empty() {
            return "tradeable".to_string();
        }
        self.notes.join("; ")
    }
}

// =============================================================================
// Trade Loop
// =============================================================================

/// A closed chain of trading pairs.
///
/// The leg list and coins are immutable after discovery; each direction keeps
/// its own report slot so the forward and backward evaluation units never
/// write the same field.
#[derive(Debug)]
pub struct TradeLoop {
    key: LoopKey,
    pairs: Vec<Arc<TradePair>>,
    beg: CoinId,
    end: CoinId,
    forward: Mutex<DirectionReport>,
    backward: Mutex<DirectionReport>,
}

impl TradeLoop {
    /// Builds a loop from its legs in forward order, starting at `beg`.
    ///
    /// # Errors
    /// Returns [`LoopError`] when the legs do not chain or do not return to `beg`.
    pub fn new(pairs: Vec<Arc<TradePair>>, beg: CoinId) -> Result<Self, LoopError> {
        if pairs.is_empty() {
            return Err(LoopError::Empty);
        }
        let end = walk(&pairs, &beg, Direction::Forward)?
            .last()
            .map(|leg| leg.output.clone())
            .ok_or(LoopError::Empty)?;
        if end != beg {
            return Err(LoopError::NotClosed { beg, end });
        }
        let key = LoopKey::from_pairs(pairs.iter().map(|p| &p.id));
        Ok(Self {
            key,
            pairs,
            beg,
            end,
            forward: Mutex::new(DirectionReport::default()),
            backward: Mutex::new(DirectionReport::default()),
        })
    }

    #[must_use]
    pub fn key(&self) -> LoopKey {
        self.key
    }

    #[must_use]
    pub fn pairs(&self) -> &[Arc<TradePair>] {
        &self.pairs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Starting coin.
    #[must_use]
    pub fn beg(&self) -> &CoinId {
        &self.beg
    }

    /// Coin reached after the last forward leg; equals [`Self::beg`].
    #[must_use]
    pub fn end(&self) -> &CoinId {
        &self.end
    }

    /// Resolves each leg's input/output coin for `direction`.
    ///
    /// # Errors
    /// Returns [`LoopError::BrokenChain`] if a leg does not trade the coin
    /// held when it is reached.
    pub fn legs(&self, direction: Direction) -> Result<Vec<LoopLeg>, LoopError> {
        walk(&self.pairs, &self.beg, direction)
    }

    /// Coins visited in `direction`, starting and ending with `beg`.
    #[must_use]
    pub fn coin_path(&self, direction: Direction) -> Vec<CoinId> {
        let mut path = vec![self.beg.clone()];
        if let Ok(legs) = self.legs(direction) {
            path.extend(legs.into_iter().map(|leg| leg.output));
        }
        path
    }

    /// True when the first or last leg is cross-exchange, or two adjacent legs are.
    #[must_use]
    pub fn has_cross_exchange_violation(&self) -> bool {
        let first_or_last_cross = self.pairs.first().is_some_and(|p| p.is_cross_exchange())
            || self.pairs.last().is_some_and(|p| p.is_cross_exchange());
        first_or_last_cross
            || self
                .pairs
                .windows(2)
                .any(|w| w[0].is_cross_exchange() && w[1].is_cross_exchange())
    }

    fn slot(&self, direction: Direction) -> &Mutex<DirectionReport> {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    /// Copy of the latest report for `direction`.
    #[must_use]
    pub fn report(&self, direction: Direction) -> DirectionReport {
        self.slot(direction).lock().clone()
    }

    pub fn set_report(&self, direction: Direction, report: DirectionReport) {
        *self.slot(direction).lock() = report;
    }

    #[must_use]
    pub fn profit_ratio(&self, direction: Direction) -> Decimal {
        self.slot(direction).lock().profit_ratio
    }

    /// Direction with the higher known profit ratio (forward on ties).
    #[must_use]
    pub fn best_direction(&self) -> Direction {
        if self.profit_ratio(Direction::Backward) > self.profit_ratio(Direction::Forward) {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }

    #[must_use]
    pub fn best_ratio(&self) -> Decimal {
        self.profit_ratio(Direction::Forward)
            .max(self.profit_ratio(Direction::Backward))
    }

    /// Display row for observers.
    #[must_use]
    pub fn summary(&self) -> LoopSummary {
        let forward = self.report(Direction::Forward);
        let backward = self.report(Direction::Backward);
        let best_direction = self.best_direction();
        let best = match best_direction {
            Direction::Forward => &forward,
            Direction::Backward => &backward,
        };
        LoopSummary {
            key: self.key,
            legs: self.pairs.iter().map(|p| p.id.to_string()).collect(),
            coins: self
                .coin_path(best_direction)
                .iter()
                .map(ToString::to_string)
                .collect(),
            forward_ratio: forward.profit_ratio,
            backward_ratio: backward.profit_ratio,
            best_direction,
            trade_volume: best.trade_volume,
            trade_scale: best.trade_scale,
            limiting_coin: best.limiting_coin.as_ref().map(ToString::to_string),
            tradeability: best.tradeability(),
        }
    }
}

impl std::fmt::Display for TradeLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path: Vec<String> = self
            .coin_path(Direction::Forward)
            .iter()
            .map(ToString::to_string)
            .collect();
        write!(f, "{}", path.join(" -> "))
    }
}

fn walk(
    pairs: &[Arc<TradePair>],
    beg: &CoinId,
    direction: Direction,
) -> Result<Vec<LoopLeg>, LoopError> {
    let ordered: Vec<&Arc<TradePair>> = match direction {
        Direction::Forward => pairs.iter().collect(),
        Direction::Backward => pairs.iter().rev().collect(),
    };

    let mut current = beg.clone();
    let mut legs = Vec::with_capacity(ordered.len());
    for (index, pair) in ordered.into_iter().enumerate() {
        let broken = || LoopError::BrokenChain {
            leg: index,
            pair: pair.id.clone(),
            coin: current.clone(),
        };
        let output = pair.other(&current).cloned().ok_or_else(broken)?;
        let side = pair.side_for(&current).map_err(|_| broken())?;
        legs.push(LoopLeg {
            index,
            pair: Arc::clone(pair),
            input: current.clone(),
            output: output.clone(),
            side,
        });
        current = output;
    }
    Ok(legs)
}

// =============================================================================
// Loop Summary
// =============================================================================

/// Serializable display row of a loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub key: LoopKey,
    pub legs: Vec<String>,
    pub coins: Vec<String>,
    pub forward_ratio: Decimal,
    pub backward_ratio: Decimal,
    pub best_direction: Direction,
    pub trade_volume: Decimal,
    pub trade_scale: Decimal,
    pub limiting_coin: Option<String>,
    pub tradeability: String,
}
