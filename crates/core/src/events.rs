use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::{CoinId, FundId, PairId, TradeSide};

/// A single leg submission handed to the exchange-execution collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Client-side id, shared by nothing else.
    pub request_id: Uuid,
    pub pair: PairId,
    pub fund: FundId,
    pub side: TradeSide,
    /// Coin being spent.
    pub input_coin: CoinId,
    /// Amount of `input_coin` to spend.
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl TradeRequest {
    #[must_use]
    pub fn new(
        pair: PairId,
        fund: FundId,
        side: TradeSide,
        input_coin: CoinId,
        volume: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            pair,
            fund,
            side,
            input_coin,
            volume,
            timestamp,
        }
    }
}

/// Realized result of a leg submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill {
    pub request_id: Uuid,
    pub pair: PairId,
    /// Amount of the input coin actually spent.
    pub input_volume: Decimal,
    /// Amount of the output coin received, before the fee.
    pub output_volume: Decimal,
    /// Fee charged, in the output coin.
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl TradeFill {
    /// Output per unit of input, or zero for an empty fill.
    #[must_use]
    pub fn rate(&self) -> Decimal {
        if self.input_volume.is_zero() {
            return Decimal::ZERO;
        }
        self.output_volume
            .checked_div(self.input_volume)
            .unwrap_or(Decimal::ZERO)
    }
}
