//! Profitability evaluation of discovered loops.
//!
//! Each (loop, direction) is an independent unit:
//!
//! 1. Merge every leg's depth into one start-coin conversion curve.
//! 2. Sum the tiers priced above one into a candidate volume.
//! 3. Walk the real books at that volume, carrying fees separately.
//! 4. Scale the trade to the available balances and validate leg amounts.
//!
//! Units run on the blocking pool and write only their own direction's
//! report slot on the loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use loopbot_core::{ArbitrageConfig, CoinId, MarketSnapshot, OrderBook, TradePair, TradeSide};
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::curve::{ConversionCurve, MergeLimit};
use crate::error::{panic_message, LegViolation, LoopError};
use crate::types::{Direction, DirectionReport, LoopKey, LoopLeg, TradeLoop};

// =============================================================================
// Results
// =============================================================================

/// Planned amounts for one leg at the candidate volume.
#[derive(Debug, Clone)]
pub struct LegPlan {
    pub index: usize,
    pub pair: Arc<TradePair>,
    pub input: CoinId,
    pub output: CoinId,
    pub side: TradeSide,
    /// Input consumed, before scaling.
    pub input_volume: Decimal,
    /// Output received before fees, before scaling.
    pub output_volume: Decimal,
    /// Fee charged on the output.
    pub fee: Decimal,
}

impl LegPlan {
    /// Output per unit of input on this leg.
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

/// Outcome of evaluating one direction of one loop.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub loop_key: LoopKey,
    pub direction: Direction,
    pub report: DirectionReport,
    /// Leg plans; empty when no volume was profitable.
    pub legs: Vec<LegPlan>,
    /// Set when a leg failed validation for a reason other than its amounts.
    pub structural_error: Option<LoopError>,
}

impl Evaluation {
    /// Profitable above `min_ratio` and structurally sound.
    #[must_use]
    pub fn qualifies(&self, min_ratio: Decimal) -> bool {
        self.structural_error.is_none() && self.report.is_profitable(min_ratio)
    }
}

/// A direction flagged profitable in the current round.
#[derive(Debug, Clone)]
pub struct ProfitableLoop {
    pub trade_loop: Arc<TradeLoop>,
    pub direction: Direction,
    pub report: DirectionReport,
    pub legs: Vec<LegPlan>,
}

impl ProfitableLoop {
    #[must_use]
    pub fn profit_ratio(&self) -> Decimal {
        self.report.profit_ratio
    }

    #[must_use]
    pub fn trade_scale(&self) -> Decimal {
        self.report.trade_scale
    }

    /// False when balances or amount limits leave nothing to trade.
    #[must_use]
    pub fn is_tradeable(&self) -> bool {
        self.report.trade_scale > Decimal::ZERO
    }
}

/// Aggregate of one evaluation round.
#[derive(Debug, Default)]
pub struct EvaluationRound {
    /// Directions that passed, in completion order.
    pub profitable: Vec<ProfitableLoop>,
    /// Units evaluated, two per loop.
    pub evaluated: usize,
    /// Units excluded for structural problems or missing depth.
    pub excluded: usize,
    /// Units that faulted.
    pub faults: usize,
}

enum UnitOutcome {
    Profitable(Box<ProfitableLoop>),
    Unprofitable,
    Excluded,
}

// =============================================================================
// Evaluator
// =============================================================================

/// Computes profit ratio, trade volume and trade scale per loop direction.
#[derive(Debug, Clone, Default)]
pub struct LoopEvaluator {
    config: ArbitrageConfig,
}

impl LoopEvaluator {
    #[must_use]
    pub fn new(config: ArbitrageConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ArbitrageConfig {
        &self.config
    }

    /// Evaluates `lp` in `direction` against `market` without touching the loop.
    ///
    /// # Errors
    /// Returns [`LoopError`] if the legs do not chain or a pair has no book.
    pub fn evaluate(
        &self,
        lp: &TradeLoop,
        direction: Direction,
        market: &dyn MarketSnapshot,
    ) -> Result<Evaluation, LoopError> {
        let legs = lp.legs(direction)?;
        let books = legs
            .iter()
            .map(|leg| {
                market
                    .order_book(&leg.pair.id)
                    .ok_or_else(|| LoopError::MissingOrderBook(leg.pair.id.clone()))
            })
            .collect::<Result<Vec<OrderBook>, LoopError>>()?;

        let fund = &self.config.fund;
        let start_balance = market.balance(lp.beg(), fund).available;
        let curve = self.merged_curve(&legs, &books, start_balance);
        let volume = curve.profitable_volume();

        let mut evaluation = Evaluation {
            loop_key: lp.key(),
            direction,
            report: DirectionReport {
                evaluated_at: Some(market.now()),
                ..DirectionReport::default()
            },
            legs: Vec::new(),
            structural_error: None,
        };
        let report = &mut evaluation.report;

        if volume.is_zero() {
            // Report the marginal rate so the collection can still be ranked.
            let marginal = curve.first_price().unwrap_or(Decimal::ZERO);
            let fee_factor = legs.iter().fold(Decimal::ONE, |acc, leg| {
                acc.saturating_mul(Decimal::ONE - leg.pair.fee_rate)
            });
            report.gross_ratio = marginal;
            report.profit_ratio = marginal.saturating_mul(fee_factor);
            report.notes.push(if curve.is_empty() {
                "no order book depth".to_string()
            } else {
                "no profitable volume".to_string()
            });
            return Ok(evaluation);
        }

        let walk = walk_legs(&legs, &books, volume);
        report.trade_volume = volume;
        report.gross_ratio = walk.end.checked_div(volume).unwrap_or(Decimal::ZERO);
        report.profit_ratio = (walk.end - walk.fee_carry)
            .checked_div(volume)
            .unwrap_or(Decimal::ZERO);
        report.notes.extend(walk.notes);
        evaluation.legs = walk.plans;

        if !evaluation.report.is_profitable(self.config.min_profit_ratio) {
            return Ok(evaluation);
        }

        self.apply_scale(&mut evaluation, market);
        self.validate_amounts(&mut evaluation);
        Ok(evaluation)
    }

    /// Evaluates and stores the report on the loop.
    ///
    /// Returns the profitable candidate, if any. Errors are stored as notes
    /// with a zero ratio so the loop still sorts.
    pub fn evaluate_and_record(
        &self,
        lp: &Arc<TradeLoop>,
        direction: Direction,
        market: &dyn MarketSnapshot,
    ) -> Result<Option<ProfitableLoop>, LoopError> {
        match self.evaluate(lp, direction, market) {
            Ok(evaluation) => {
                debug!(
                    loop_key = %lp.key(),
                    direction = %direction,
                    ratio = %evaluation.report.profit_ratio,
                    volume = %evaluation.report.trade_volume,
                    scale = %evaluation.report.trade_scale,
                    "Loop evaluated"
                );
                lp.set_report(direction, evaluation.report.clone());

                if let Some(e) = &evaluation.structural_error {
                    error!(loop_key = %lp.key(), direction = %direction, error = %e, "Structurally invalid loop excluded");
                    return Err(e.clone());
                }
                if !evaluation.qualifies(self.config.min_profit_ratio) {
                    return Ok(None);
                }
                if evaluation.report.trade_scale.is_zero() {
                    warn!(
                        loop_key = %lp.key(),
                        direction = %direction,
                        ratio = %evaluation.report.profit_ratio,
                        reason = %evaluation.report.tradeability(),
                        "Profitable loop is not tradeable"
                    );
                }
                Ok(Some(ProfitableLoop {
                    trade_loop: Arc::clone(lp),
                    direction,
                    report: evaluation.report,
                    legs: evaluation.legs,
                }))
            }
            Err(e) => {
                match &e {
                    LoopError::MissingOrderBook(pair) => {
                        warn!(loop_key = %lp.key(), direction = %direction, pair = %pair, "Loop skipped, no order book");
                    }
                    _ => {
                        error!(loop_key = %lp.key(), direction = %direction, error = %e, "Structurally invalid loop excluded");
                    }
                }
                lp.set_report(
                    direction,
                    DirectionReport {
                        notes: vec![e.to_string()],
                        evaluated_at: Some(market.now()),
                        ..DirectionReport::default()
                    },
                );
                Err(e)
            }
        }
    }

    /// Evaluates both directions of every loop concurrently and waits for all.
    pub async fn evaluate_all(
        &self,
        loops: &[Arc<TradeLoop>],
        market: Arc<dyn MarketSnapshot>,
    ) -> EvaluationRound {
        let mut units = JoinSet::new();
        for lp in loops {
            for direction in Direction::ALL {
                let evaluator = self.clone();
                let lp = Arc::clone(lp);
                let market = Arc::clone(&market);
                units.spawn_blocking(move || {
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        evaluator.evaluate_and_record(&lp, direction, market.as_ref())
                    }));
                    match outcome {
                        Ok(Ok(Some(candidate))) => Ok(UnitOutcome::Profitable(Box::new(candidate))),
                        Ok(Ok(None)) => Ok(UnitOutcome::Unprofitable),
                        Ok(Err(_)) => Ok(UnitOutcome::Excluded),
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            warn!(
                                loop_key = %lp.key(),
                                direction = %direction,
                                message = %message,
                                "Evaluation worker fault"
                            );
                            Err(lp.key())
                        }
                    }
                });
            }
        }

        let mut round = EvaluationRound::default();
        while let Some(joined) = units.join_next().await {
            round.evaluated += 1;
            match joined {
                Ok(Ok(UnitOutcome::Profitable(candidate))) => round.profitable.push(*candidate),
                Ok(Ok(UnitOutcome::Unprofitable)) => {}
                Ok(Ok(UnitOutcome::Excluded)) => round.excluded += 1,
                Ok(Err(_)) => round.faults += 1,
                Err(e) => {
                    error!(error = %e, "Evaluation task failed");
                    round.faults += 1;
                }
            }
        }

        info!(
            evaluated = round.evaluated,
            profitable = round.profitable.len(),
            excluded = round.excluded,
            faults = round.faults,
            "Evaluation round completed"
        );
        round
    }

    // =========================================================================
    // Steps
    // =========================================================================

    fn merged_curve(
        &self,
        legs: &[LoopLeg],
        books: &[OrderBook],
        start_balance: Decimal,
    ) -> ConversionCurve {
        let limit = MergeLimit {
            min_tiers: self.config.merge_tier_floor,
            volume: start_balance,
        };
        let mut curve = ConversionCurve::unbounded();
        for (leg, book) in legs.iter().zip(books) {
            let depth = ConversionCurve::from_order_book(book, leg.side);
            let projected = curve.project(&depth);
            curve = curve.merge(&projected, Some(limit)).curve;
            trace!(
                leg = leg.index,
                pair = %leg.pair.id,
                tiers = curve.len(),
                volume = %curve.total_volume(),
                "Merged leg depth"
            );
        }
        curve
    }

    fn apply_scale(&self, evaluation: &mut Evaluation, market: &dyn MarketSnapshot) {
        let keep = Decimal::ONE - self.config.balance_discount;
        let mut scale = Decimal::ONE;
        let mut limiting = None;

        for plan in &evaluation.legs {
            let available = market
                .balance(&plan.input, &self.config.fund)
                .available
                .saturating_mul(keep);
            let required = plan
                .input_volume
                .saturating_mul(Decimal::ONE + plan.pair.fee_rate);
            let factor = if required.is_zero() {
                Decimal::ONE
            } else {
                available
                    .checked_div(required)
                    .unwrap_or(Decimal::ONE)
                    .clamp(Decimal::ZERO, Decimal::ONE)
            };
            if factor < scale {
                scale = factor;
                limiting = Some(plan.input.clone());
            }
        }

        let report = &mut evaluation.report;
        report.trade_scale = scale;
        if let Some(coin) = &limiting {
            report
                .notes
                .push(format!("{coin} balance limits trade scale to {}", scale.round_dp(6)));
        }
        report.limiting_coin = limiting;
    }

    fn validate_amounts(&self, evaluation: &mut Evaluation) {
        let scale = evaluation.report.trade_scale;
        let mut notes = Vec::new();
        let mut untradeable = false;

        for plan in &evaluation.legs {
            let unscaled = match plan.pair.check_amounts(
                &plan.input,
                plan.input_volume,
                plan.output_volume,
            ) {
                Ok(violations) => violations,
                Err(e) => {
                    notes.push(e.to_string());
                    evaluation.structural_error.get_or_insert(LoopError::Market(e));
                    continue;
                }
            };
            notes.extend(unscaled.into_iter().map(|violation| {
                LegViolation::Unscaled {
                    leg: plan.index,
                    violation,
                }
                .to_string()
            }));

            if scale.is_zero() {
                continue;
            }
            if let Ok(scaled) = plan.pair.check_amounts(
                &plan.input,
                plan.input_volume.saturating_mul(scale),
                plan.output_volume.saturating_mul(scale),
            ) {
                if !scaled.is_empty() {
                    untradeable = true;
                }
                notes.extend(scaled.into_iter().map(|violation| {
                    LegViolation::Scaled {
                        leg: plan.index,
                        scale: scale.round_dp(6),
                        violation,
                    }
                    .to_string()
                }));
            }
        }

        if untradeable {
            evaluation.report.trade_scale = Decimal::ZERO;
        }
        evaluation.report.notes.extend(notes);
    }
}

// =============================================================================
// Fee-aware walk
// =============================================================================

struct Walk {
    plans: Vec<LegPlan>,
    end: Decimal,
    fee_carry: Decimal,
    notes: Vec<String>,
}

/// Converts `volume` through every leg with the real books.
///
/// Fees stay out of the traded amount; they are carried in the current coin,
/// converted at each leg's rate and subtracted from the end amount by the caller.
fn walk_legs(legs: &[LoopLeg], books: &[OrderBook], volume: Decimal) -> Walk {
    let mut amount = volume;
    let mut fee_carry = Decimal::ZERO;
    let mut plans = Vec::with_capacity(legs.len());
    let mut notes = Vec::new();

    for (leg, book) in legs.iter().zip(books) {
        let conversion = book.convert(leg.side, amount);
        if conversion.input < amount {
            notes.push(format!(
                "leg {} ({}) depth covers {} of {} {}",
                leg.index, leg.pair.id, conversion.input, amount, leg.input
            ));
        }
        let fee = conversion.output.saturating_mul(leg.pair.fee_rate);
        fee_carry = fee_carry
            .saturating_mul(conversion.rate())
            .saturating_add(fee);

        trace!(
            leg = leg.index,
            pair = %leg.pair.id,
            side = %leg.side,
            input = %conversion.input,
            output = %conversion.output,
            fee_carry = %fee_carry,
            "Walked leg"
        );

        plans.push(LegPlan {
            index: leg.index,
            pair: Arc::clone(&leg.pair),
            input: leg.input.clone(),
            output: leg.output.clone(),
            side: leg.side,
            input_volume: conversion.input,
            output_volume: conversion.output,
            fee,
        });
        amount = conversion.output;
    }

    Walk {
        plans,
        end: amount,
        fee_carry,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperMarket;
    use loopbot_core::{AmountRange, Balance, PriceLevel, TradeLimits};
    use rust_decimal_macros::dec;

    fn coin(symbol: &str) -> CoinId {
        CoinId::new("kraken", symbol)
    }

    fn pair(base: &str, quote: &str) -> TradePair {
        TradePair::new(coin(base), coin(quote), dec!(0.001)).unwrap()
    }

    fn book(bid: Decimal, bid_vol: Decimal, ask: Decimal, ask_vol: Decimal) -> OrderBook {
        OrderBook::new(
            vec![PriceLevel::new(bid, bid_vol)],
            vec![PriceLevel::new(ask, ask_vol)],
        )
    }

    /// BTC -> USD -> ETH -> BTC turns 1 BTC into 3.6 BTC before fees.
    fn mispriced_market(eth_btc_bid: Decimal) -> PaperMarket {
        let market = PaperMarket::new();
        market.add_pair(pair("BTC", "USD"), book(dec!(10), dec!(5), dec!(10.1), dec!(5)));
        market.add_pair(pair("ETH", "USD"), book(dec!(4.9), dec!(100), dec!(5), dec!(100)));
        market.add_pair(
            pair("ETH", "BTC"),
            book(eth_btc_bid, dec!(100), dec!(1.85), dec!(100)),
        );
        market.set_balance(coin("BTC"), Balance::available(dec!(10)));
        market.set_balance(coin("USD"), Balance::available(dec!(1000)));
        market.set_balance(coin("ETH"), Balance::available(dec!(1000)));
        market
    }

    fn triangle(market: &PaperMarket) -> Arc<TradeLoop> {
        let pairs = ["kraken:BTC/USD", "kraken:ETH/USD", "kraken:ETH/BTC"]
            .iter()
            .map(|id| Arc::new(market.pair(&loopbot_core::PairId::new(*id)).unwrap()))
            .collect();
        Arc::new(TradeLoop::new(pairs, coin("BTC")).unwrap())
    }

    #[test]
    fn test_end_to_end_forward_ratio() {
        let market = mispriced_market(dec!(1.8));
        let lp = triangle(&market);
        let evaluation = LoopEvaluator::default()
            .evaluate(&lp, Direction::Forward, &market)
            .unwrap();
        let report = &evaluation.report;

        // Only 5 BTC of bid depth: 5 BTC -> 50 USD -> 10 ETH -> 18 BTC.
        assert_eq!(report.trade_volume, dec!(5));
        assert_eq!(report.gross_ratio, dec!(3.6));
        // Fees carried: 0.05 USD -> 0.02 ETH -> 0.054 BTC.
        assert_eq!(report.profit_ratio, dec!(3.5892));
        assert!(report.profit_ratio > Decimal::ONE);
        assert_eq!(report.trade_scale, Decimal::ONE);
        assert!(report.limiting_coin.is_none());
        assert!(evaluation.qualifies(Decimal::ONE));

        let fees: Vec<Decimal> = evaluation.legs.iter().map(|p| p.fee).collect();
        assert_eq!(fees, vec![dec!(0.05), dec!(0.01), dec!(0.018)]);
    }

    #[test]
    fn test_backward_direction_is_unprofitable() {
        let market = mispriced_market(dec!(1.8));
        let lp = triangle(&market);
        let evaluation = LoopEvaluator::default()
            .evaluate(&lp, Direction::Backward, &market)
            .unwrap();
        let report = &evaluation.report;

        assert!(report.profit_ratio < Decimal::ONE);
        assert!(report.profit_ratio > dec!(0.25));
        assert_eq!(report.trade_volume, Decimal::ZERO);
        assert!(evaluation.legs.is_empty());
        assert_eq!(report.tradeability(), "no profitable volume");
    }

    #[test]
    fn test_trade_scale_limited_by_scarcest_balance() {
        let market = mispriced_market(dec!(1.8));
        market.set_balance(coin("ETH"), Balance::available(dec!(2)));
        let lp = triangle(&market);
        let report = LoopEvaluator::default()
            .evaluate(&lp, Direction::Forward, &market)
            .unwrap()
            .report;

        // The ETH leg needs 10 ETH plus fee; 2 ETH less the rounding discount are held.
        let expected = dec!(1.998) / dec!(10.01);
        assert!((report.trade_scale - expected).abs() < dec!(0.0000001));
        assert_eq!(report.limiting_coin, Some(coin("ETH")));
        assert!(report.tradeability().contains("ETH@kraken"));
    }

    #[test]
    fn test_trade_scale_clamped_to_zero_without_balance() {
        let market = mispriced_market(dec!(1.8));
        market.set_balance(coin("USD"), Balance::default());
        let lp = triangle(&market);
        let report = LoopEvaluator::default()
            .evaluate(&lp, Direction::Forward, &market)
            .unwrap()
            .report;
        assert_eq!(report.trade_scale, Decimal::ZERO);
        assert_eq!(report.limiting_coin, Some(coin("USD")));
    }

    #[test]
    fn test_price_injection_raises_only_benefiting_direction() {
        let evaluator = LoopEvaluator::default();

        let base = mispriced_market(dec!(1.8));
        let lp = triangle(&base);
        let forward = evaluator.evaluate(&lp, Direction::Forward, &base).unwrap();
        let backward = evaluator.evaluate(&lp, Direction::Backward, &base).unwrap();

        // Raising the ETH/BTC bid only touches the leg sold forward.
        let injected = mispriced_market(dec!(1.8) * dec!(1.1));
        let forward_up = evaluator.evaluate(&lp, Direction::Forward, &injected).unwrap();
        let backward_same = evaluator.evaluate(&lp, Direction::Backward, &injected).unwrap();

        assert!(forward_up.report.profit_ratio > forward.report.profit_ratio);
        assert_eq!(
            backward_same.report.profit_ratio,
            backward.report.profit_ratio
        );
    }

    #[test]
    fn test_scaled_amount_out_of_range_forces_zero_scale() {
        let market = mispriced_market(dec!(1.8));
        market.set_balance(coin("ETH"), Balance::available(dec!(2)));
        // Orders below 5 ETH are rejected; scaling the 10 ETH leg down to ~2 breaks it.
        let limited = pair("ETH", "BTC").with_limits(TradeLimits {
            base: AmountRange::new(dec!(5), Decimal::MAX),
            quote: AmountRange::unbounded(),
        });
        market.add_pair(limited, book(dec!(1.8), dec!(100), dec!(1.85), dec!(100)));
        let lp = triangle(&market);

        let evaluation = LoopEvaluator::default()
            .evaluate(&lp, Direction::Forward, &market)
            .unwrap();
        assert!(evaluation.report.profit_ratio > Decimal::ONE);
        assert_eq!(evaluation.report.trade_scale, Decimal::ZERO);
        assert!(evaluation.structural_error.is_none());
        assert!(evaluation
            .report
            .notes
            .iter()
            .any(|n| n.contains("at scale")));
    }

    #[test]
    fn test_unscaled_violation_is_only_a_note() {
        let market = mispriced_market(dec!(1.8));
        let capped = pair("BTC", "USD").with_limits(TradeLimits {
            base: AmountRange::new(Decimal::ZERO, dec!(100)),
            quote: AmountRange::new(Decimal::ZERO, dec!(10)),
        });
        market.add_pair(capped, book(dec!(10), dec!(5), dec!(10.1), dec!(5)));
        market.set_balance(coin("BTC"), Balance::available(dec!(0.5)));
        let lp = triangle(&market);

        let evaluation = LoopEvaluator::default()
            .evaluate(&lp, Direction::Forward, &market)
            .unwrap();
        // 50 USD unscaled breaks the cap; scaled to ~0.5 BTC it does not.
        assert!(evaluation.report.trade_scale > Decimal::ZERO);
        assert!(evaluation.report.notes.iter().any(|n| n.starts_with("leg 0:")));
        assert!(evaluation.qualifies(Decimal::ONE));
    }

    #[test]
    fn test_structural_error_excludes_loop() {
        let market = mispriced_market(dec!(1.8));
        // A pair whose id claims ETH/BTC but trades something else.
        let bogus = TradePair::with_id(
            loopbot_core::PairId::new("kraken:ETH/BTC"),
            coin("ETH"),
            coin("SOL"),
            loopbot_core::ExchangeId::new("kraken"),
            dec!(0.001),
        )
        .unwrap();
        let good = triangle(&market);
        let pairs = vec![
            Arc::clone(&good.pairs()[0]),
            Arc::clone(&good.pairs()[1]),
            Arc::new(bogus),
        ];
        // The chain is broken, so the loop cannot even be built.
        assert!(TradeLoop::new(pairs, coin("BTC")).is_err());

        market.remove_pair(&loopbot_core::PairId::new("kraken:ETH/BTC"));
        let err = LoopEvaluator::default()
            .evaluate_and_record(&good, Direction::Forward, &market)
            .unwrap_err();
        assert!(matches!(err, LoopError::MissingOrderBook(_)));
        assert!(good
            .report(Direction::Forward)
            .tradeability()
            .contains("No order book"));
    }

    #[test]
    fn test_empty_book_reports_no_depth() {
        let market = mispriced_market(dec!(1.8));
        market.set_order_book(
            &loopbot_core::PairId::new("kraken:ETH/USD"),
            OrderBook::default(),
        );
        let lp = triangle(&market);
        let report = LoopEvaluator::default()
            .evaluate(&lp, Direction::Forward, &market)
            .unwrap()
            .report;
        assert_eq!(report.profit_ratio, Decimal::ZERO);
        assert_eq!(report.tradeability(), "no order book depth");
    }

    #[tokio::test]
    async fn test_evaluate_all_records_both_directions() {
        let market = Arc::new(mispriced_market(dec!(1.8)));
        let lp = triangle(&market);
        let round = LoopEvaluator::default()
            .evaluate_all(&[Arc::clone(&lp)], market)
            .await;

        assert_eq!(round.evaluated, 2);
        assert_eq!(round.faults, 0);
        assert_eq!(round.profitable.len(), 1);
        assert_eq!(round.profitable[0].direction, Direction::Forward);
        assert_eq!(lp.best_direction(), Direction::Forward);
        assert!(lp.report(Direction::Backward).evaluated_at.is_some());
        assert!(lp.profit_ratio(Direction::Backward) > Decimal::ZERO);
    }

    /// Panics whenever a bitstamp book is read.
    struct FaultyBooks(PaperMarket);

    impl MarketSnapshot for FaultyBooks {
        fn pairs(&self) -> Vec<TradePair> {
            self.0.pairs()
        }

        fn order_book(&self, pair: &loopbot_core::PairId) -> Option<OrderBook> {
            assert!(!pair.as_str().starts_with("bitstamp:"), "feed handler crashed");
            self.0.order_book(pair)
        }

        fn balance(&self, coin: &CoinId, fund: &loopbot_core::FundId) -> Balance {
            self.0.balance(coin, fund)
        }

        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            self.0.now()
        }
    }

    #[tokio::test]
    async fn test_worker_fault_is_counted_and_round_completes() {
        let market = mispriced_market(dec!(1.8));
        let bitstamp = |symbol: &str| CoinId::new("bitstamp", symbol);
        let faulty_pairs: Vec<Arc<TradePair>> = [("BTC", "USD"), ("ETH", "USD"), ("ETH", "BTC")]
            .iter()
            .map(|(b, q)| {
                let pair = TradePair::new(bitstamp(b), bitstamp(q), dec!(0.001)).unwrap();
                market.add_pair(pair.clone(), book(dec!(1), dec!(1), dec!(1), dec!(1)));
                Arc::new(pair)
            })
            .collect();
        let faulty = Arc::new(TradeLoop::new(faulty_pairs, bitstamp("BTC")).unwrap());
        let healthy = triangle(&market);

        let round = LoopEvaluator::default()
            .evaluate_all(
                &[Arc::clone(&faulty), Arc::clone(&healthy)],
                Arc::new(FaultyBooks(market)),
            )
            .await;

        assert_eq!(round.evaluated, 4);
        assert_eq!(round.faults, 2);
        assert_eq!(round.excluded, 0);
        assert_eq!(round.profitable.len(), 1);
        assert_eq!(round.profitable[0].trade_loop.key(), healthy.key());
        assert!(faulty.report(Direction::Forward).evaluated_at.is_none());
    }
}
