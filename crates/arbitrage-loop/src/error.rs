//! Error types for loop arbitrage.
//!
//! Aborted discovery and insufficient balance are deliberately absent: the
//! first is an [`crate::discovery::DiscoveryOutcome`] variant, the second a
//! zero trade scale with a diagnostic on the loop.

use loopbot_core::{AmountViolation, CoinId, MarketError, PairId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Structural problems with a loop's legs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoopError {
    /// A loop needs at least one leg.
    #[error("Loop has no legs")]
    Empty,

    /// Walking the loop reached a pair that does not trade the current coin.
    #[error("Leg {leg} ({pair}) does not trade {coin}")]
    BrokenChain {
        /// Zero-based leg index in walk order.
        leg: usize,
        /// Pair of that leg.
        pair: PairId,
        /// Coin held when the leg was reached.
        coin: CoinId,
    },

    /// Walking the loop did not end on the starting coin.
    #[error("Loop starting at {beg} ends at {end}")]
    NotClosed {
        /// Starting coin.
        beg: CoinId,
        /// Coin reached after the last leg.
        end: CoinId,
    },

    /// The market does not know the pair's depth.
    #[error("No order book for pair {0}")]
    MissingOrderBook(PairId),

    #[error(transparent)]
    Market(#[from] MarketError),
}

/// A leg amount outside the pair's allowed range.
///
/// Rendered into a loop's tradeability notes rather than propagated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LegViolation {
    /// Planned amounts at full volume are out of range.
    #[error("leg {leg}: {violation}")]
    Unscaled {
        leg: usize,
        violation: AmountViolation,
    },

    /// Amounts after balance scaling are out of range; the loop is untradeable.
    #[error("leg {leg} at scale {scale}: {violation}")]
    Scaled {
        leg: usize,
        scale: Decimal,
        violation: AmountViolation,
    },
}

/// Failures while submitting a loop's legs.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A leg submission failed; earlier legs may already be filled.
    #[error("Leg {leg} ({pair}) failed after {filled} filled legs: {error:#}")]
    LegFailed {
        /// Zero-based leg index.
        leg: usize,
        /// Pair of the failed leg.
        pair: PairId,
        /// Legs already filled before the failure.
        filled: usize,
        /// Error returned by the exchange collaborator.
        error: anyhow::Error,
    },

    /// The engine was deactivated by an earlier execution fault.
    #[error("Engine is inactive after an execution fault")]
    Inactive,
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
