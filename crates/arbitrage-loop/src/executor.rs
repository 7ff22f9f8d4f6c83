//! Executes at most one profitable loop per evaluation round.
//!
//! Candidates are ranked by descending profit ratio. Zero-scale candidates are
//! noted and skipped; the first tradeable one has its legs submitted in order
//! and the round ends. A failed leg is fatal for the session: the caller is
//! expected to deactivate rather than retry a partially filled loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loopbot_core::{ExecutionConfig, FundId, TradeExecutor, TradeFill, TradeRequest};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::ExecutionError;
use crate::evaluator::ProfitableLoop;
use crate::types::{Direction, LoopKey};

// =============================================================================
// Outcomes
// =============================================================================

/// A loop whose legs were all filled.
#[derive(Debug, Clone)]
pub struct ExecutedLoop {
    pub loop_key: LoopKey,
    pub direction: Direction,
    pub profit_ratio: Decimal,
    pub trade_scale: Decimal,
    /// Start coin submitted on the first leg.
    pub start_volume: Decimal,
    /// Output of the last leg before fees.
    pub end_volume: Decimal,
    /// Fees carried through the legs, in the start coin.
    pub fee_carry: Decimal,
    pub fills: Vec<TradeFill>,
}

impl ExecutedLoop {
    /// Realized (end − fees) / start.
    #[must_use]
    pub fn realized_ratio(&self) -> Decimal {
        (self.end_volume - self.fee_carry)
            .checked_div(self.start_volume)
            .unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Nothing was profitable this round.
    Idle,
    /// Every profitable candidate had a zero trade scale.
    Untradeable { noted: usize },
    /// Execution is disabled; the best tradeable candidate was only logged.
    DryRun {
        loop_key: LoopKey,
        direction: Direction,
        profit_ratio: Decimal,
    },
    Executed(ExecutedLoop),
}

impl ExecutionOutcome {
    #[must_use]
    pub fn executed(&self) -> Option<&ExecutedLoop> {
        match self {
            Self::Executed(executed) => Some(executed),
            _ => None,
        }
    }
}

/// Counters across rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub rounds: u64,
    pub executions: u64,
    pub dry_runs: u64,
    /// Profitable candidates skipped for a zero trade scale.
    pub noted_untradeable: u64,
    pub failures: u64,
}

// =============================================================================
// Executor
// =============================================================================

pub struct LoopExecutor {
    executor: Arc<dyn TradeExecutor>,
    fund: FundId,
    enabled: bool,
    stats: Mutex<ExecutionStats>,
}

impl std::fmt::Debug for LoopExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopExecutor")
            .field("fund", &self.fund)
            .field("enabled", &self.enabled)
            .field("stats", &*self.stats.lock())
            .finish_non_exhaustive()
    }
}

impl LoopExecutor {
    #[must_use]
    pub fn new(executor: Arc<dyn TradeExecutor>, fund: FundId, config: &ExecutionConfig) -> Self {
        Self {
            executor,
            fund,
            enabled: config.enabled,
            stats: Mutex::new(ExecutionStats::default()),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        *self.stats.lock()
    }

    /// Sorts candidates by descending profit ratio.
    #[must_use]
    pub fn rank(mut candidates: Vec<ProfitableLoop>) -> Vec<ProfitableLoop> {
        candidates.sort_by(|a, b| {
            b.profit_ratio()
                .cmp(&a.profit_ratio())
                .then_with(|| a.trade_loop.key().cmp(&b.trade_loop.key()))
        });
        candidates
    }

    /// Ranks `candidates` and executes the best tradeable one.
    ///
    /// # Errors
    /// Returns [`ExecutionError::LegFailed`] when a leg submission fails.
    pub async fn execute_best(
        &self,
        candidates: Vec<ProfitableLoop>,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        self.stats.lock().rounds += 1;
        if candidates.is_empty() {
            debug!("No profitable loops this round");
            return Ok(ExecutionOutcome::Idle);
        }

        let mut noted = 0usize;
        for candidate in Self::rank(candidates) {
            if !candidate.is_tradeable() {
                noted += 1;
                self.stats.lock().noted_untradeable += 1;
                warn!(
                    loop_key = %candidate.trade_loop.key(),
                    direction = %candidate.direction,
                    ratio = %candidate.profit_ratio(),
                    reason = %candidate.report.tradeability(),
                    "Skipping untradeable loop"
                );
                continue;
            }

            if !self.enabled {
                self.stats.lock().dry_runs += 1;
                info!(
                    loop_key = %candidate.trade_loop.key(),
                    direction = %candidate.direction,
                    ratio = %candidate.profit_ratio(),
                    volume = %candidate.report.trade_volume,
                    scale = %candidate.trade_scale(),
                    "Execution disabled, best loop not submitted"
                );
                return Ok(ExecutionOutcome::DryRun {
                    loop_key: candidate.trade_loop.key(),
                    direction: candidate.direction,
                    profit_ratio: candidate.profit_ratio(),
                });
            }

            return self.execute(&candidate, now).await.map(ExecutionOutcome::Executed);
        }

        Ok(ExecutionOutcome::Untradeable { noted })
    }

    /// Submits every leg of `candidate` in order at its planned input × scale.
    async fn execute(
        &self,
        candidate: &ProfitableLoop,
        now: DateTime<Utc>,
    ) -> Result<ExecutedLoop, ExecutionError> {
        let key = candidate.trade_loop.key();
        let scale = candidate.trade_scale();
        info!(
            loop_key = %key,
            direction = %candidate.direction,
            path = %candidate.trade_loop,
            ratio = %candidate.profit_ratio(),
            scale = %scale,
            "Executing loop"
        );

        let mut fills = Vec::with_capacity(candidate.legs.len());
        let mut fee_carry = Decimal::ZERO;
        let mut end_volume = Decimal::ZERO;

        for plan in &candidate.legs {
            let request = TradeRequest::new(
                plan.pair.id.clone(),
                self.fund.clone(),
                plan.side,
                plan.input.clone(),
                plan.input_volume.saturating_mul(scale),
                now,
            );

            let fill = match self.executor.submit_trade(request).await {
                Ok(fill) => fill,
                Err(e) => {
                    self.stats.lock().failures += 1;
                    error!(
                        loop_key = %key,
                        leg = plan.index,
                        pair = %plan.pair.id,
                        filled = fills.len(),
                        error = %e,
                        "Leg submission failed"
                    );
                    return Err(ExecutionError::LegFailed {
                        leg: plan.index,
                        pair: plan.pair.id.clone(),
                        filled: fills.len(),
                        error: e,
                    });
                }
            };

            fee_carry = fee_carry
                .saturating_mul(fill.rate())
                .saturating_add(fill.fee);
            end_volume = fill.output_volume;
            debug!(
                loop_key = %key,
                leg = plan.index,
                pair = %plan.pair.id,
                input = %fill.input_volume,
                output = %fill.output_volume,
                fee_carry = %fee_carry,
                "Leg filled"
            );
            fills.push(fill);
        }

        let executed = ExecutedLoop {
            loop_key: key,
            direction: candidate.direction,
            profit_ratio: candidate.profit_ratio(),
            trade_scale: scale,
            start_volume: fills.first().map_or(Decimal::ZERO, |f| f.input_volume),
            end_volume,
            fee_carry,
            fills,
        };
        self.stats.lock().executions += 1;
        info!(
            loop_key = %key,
            start = %executed.start_volume,
            end = %executed.end_volume,
            fees = %executed.fee_carry,
            realized_ratio = %executed.realized_ratio(),
            "Loop executed"
        );
        Ok(executed)
    }
}
