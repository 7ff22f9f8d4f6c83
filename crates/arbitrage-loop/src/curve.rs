//! Cumulative conversion curves and the lock-step merge.
//!
//! A curve maps an amount of some input coin to an amount of an output coin.
//! Each [`Tier`] covers the input range from the previous tier's cumulative
//! volume up to its own, converted at the tier's price (output per input).
//!
//! Merging two curves that share an input unit composes their rates tier by
//! tier:
//!
//! ```text
//!   left:   |----- 1 @ 2 -----|
//!   right:  |----------- 2 @ 3 ------------|
//!   merged: |----- 1 @ 6 -----|   right keeps 1 unconsumed
//! ```
//!
//! A leg's own depth is denominated in the coin held before that leg, so the
//! evaluator first [projects](ConversionCurve::project) it into start-coin
//! units through the curve accumulated so far, then merges.

use loopbot_core::{OrderBook, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One tier of a conversion curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Cumulative input volume at the end of this tier.
    pub volume: Decimal,
    /// Output per unit of input within this tier.
    pub price: Decimal,
}

impl Tier {
    #[must_use]
    pub const fn new(volume: Decimal, price: Decimal) -> Self {
        Self { volume, price }
    }
}

/// Bound on how far a merge refines the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeLimit {
    /// Tiers the output must hold before the volume bound applies.
    pub min_tiers: usize,
    /// Input volume beyond which deeper tiers are not needed.
    pub volume: Decimal,
}

/// Output of [`ConversionCurve::merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub curve: ConversionCurve,
    /// Input volume of the left curve the merge did not reach.
    pub left_unconsumed: Decimal,
    /// Input volume of the right curve the merge did not reach.
    pub right_unconsumed: Decimal,
}

/// Ordered, strictly increasing cumulative volume tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionCurve {
    tiers: Vec<Tier>,
}

impl ConversionCurve {
    /// Builds a curve, dropping tiers that do not extend the cumulative volume.
    #[must_use]
    pub fn new(tiers: impl IntoIterator<Item = Tier>) -> Self {
        let mut out: Vec<Tier> = Vec::new();
        for tier in tiers {
            let prev = out.last().map_or(Decimal::ZERO, |t| t.volume);
            if tier.volume > prev && tier.price >= Decimal::ZERO {
                out.push(tier);
            }
        }
        Self { tiers: out }
    }

    /// Identity curve over an unlimited amount of the start coin.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            tiers: vec![Tier::new(Decimal::MAX, Decimal::ONE)],
        }
    }

    /// Depth of `book` as a curve in the input coin of `side`.
    ///
    /// Selling spends base against bids (volume in base, price quote/base).
    /// Buying spends quote against asks (volume in quote, price base/quote).
    #[must_use]
    pub fn from_order_book(book: &OrderBook, side: TradeSide) -> Self {
        let mut cumulative = Decimal::ZERO;
        let tiers = book.levels(side).iter().map(|level| {
            let (width, price) = match side {
                TradeSide::Sell => (level.volume, level.price),
                TradeSide::Buy => (
                    level.volume.saturating_mul(level.price),
                    Decimal::ONE.checked_div(level.price).unwrap_or(Decimal::ZERO),
                ),
            };
            cumulative = cumulative.saturating_add(width);
            Tier::new(cumulative, price)
        });
        Self::new(tiers.collect::<Vec<_>>())
    }

    #[must_use]
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Total input volume covered.
    #[must_use]
    pub fn total_volume(&self) -> Decimal {
        self.tiers.last().map_or(Decimal::ZERO, |t| t.volume)
    }

    /// Price of the shallowest tier, i.e. the marginal rate.
    #[must_use]
    pub fn first_price(&self) -> Option<Decimal> {
        self.tiers.first().map(|t| t.price)
    }

    /// Sum of tier widths whose price exceeds one.
    #[must_use]
    pub fn profitable_volume(&self) -> Decimal {
        let mut prev = Decimal::ZERO;
        let mut total = Decimal::ZERO;
        for tier in &self.tiers {
            if tier.price > Decimal::ONE {
                total = total.saturating_add(tier.volume - prev);
            }
            prev = tier.volume;
        }
        total
    }

    /// Output produced by spending `input`, capped at the curve's depth.
    #[must_use]
    pub fn output_for_input(&self, input: Decimal) -> Decimal {
        let mut prev = Decimal::ZERO;
        let mut output = Decimal::ZERO;
        for tier in &self.tiers {
            if input <= prev {
                break;
            }
            let take = tier.volume.min(input) - prev;
            output = output.saturating_add(take.saturating_mul(tier.price));
            prev = tier.volume;
        }
        output
    }

    /// Input needed to produce `output`, capped at the curve's total volume.
    #[must_use]
    pub fn input_for_output(&self, output: Decimal) -> Decimal {
        let mut prev = Decimal::ZERO;
        let mut produced = Decimal::ZERO;
        for tier in &self.tiers {
            let width = tier.volume - prev;
            let tier_output = width.saturating_mul(tier.price);
            if produced.saturating_add(tier_output) >= output {
                let needed = (output - produced)
                    .checked_div(tier.price)
                    .unwrap_or(width);
                return prev.saturating_add(needed).min(tier.volume);
            }
            produced = produced.saturating_add(tier_output);
            prev = tier.volume;
        }
        prev
    }

    /// Re-expresses `leg`, whose input is this curve's output coin, in this
    /// curve's input units.
    ///
    /// Leg depth beyond what this curve can deliver is dropped.
    #[must_use]
    pub fn project(&self, leg: &ConversionCurve) -> ConversionCurve {
        let limit = self.total_volume();
        let mut tiers = Vec::with_capacity(leg.len());
        for tier in &leg.tiers {
            let volume = self.input_for_output(tier.volume).min(limit);
            tiers.push(Tier::new(volume, tier.price));
            if volume >= limit {
                break;
            }
        }
        Self::new(tiers)
    }

    /// Lock-step merge of two curves sharing an input unit.
    ///
    /// Each output tier spans the lesser of both sides' next cumulative
    /// volumes at the product of their prices. The side with less remaining
    /// volume advances; ties advance both. With a `limit`, the merge stops
    /// once the output holds `min_tiers` tiers and covers `limit.volume`.
    #[must_use]
    pub fn merge(&self, other: &ConversionCurve, limit: Option<MergeLimit>) -> MergeResult {
        let (left, right) = (&self.tiers, &other.tiers);
        let mut tiers = Vec::with_capacity(left.len().max(right.len()));
        let mut consumed = Decimal::ZERO;
        let (mut i, mut j) = (0, 0);

        while i < left.len() && j < right.len() {
            if let Some(limit) = limit {
                if tiers.len() >= limit.min_tiers && consumed >= limit.volume {
                    break;
                }
            }

            let (a, b) = (left[i], right[j]);
            let next = a.volume.min(b.volume);
            if next > consumed {
                tiers.push(Tier::new(next, a.price.saturating_mul(b.price)));
                consumed = next;
            }

            match a.volume.cmp(&b.volume) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }

        MergeResult {
            curve: Self { tiers },
            left_unconsumed: (self.total_volume() - consumed).max(Decimal::ZERO),
            right_unconsumed: (other.total_volume() - consumed).max(Decimal::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopbot_core::PriceLevel;
    use rust_decimal_macros::dec;

    fn curve(tiers: &[(Decimal, Decimal)]) -> ConversionCurve {
        ConversionCurve::new(tiers.iter().map(|&(v, p)| Tier::new(v, p)))
    }

    #[test]
    fn test_merge_composes_rates_and_reports_unconsumed() {
        let a = curve(&[(dec!(1), dec!(2))]);
        let b = curve(&[(dec!(2), dec!(3))]);
        let merged = a.merge(&b, None);

        assert_eq!(merged.curve.tiers(), &[Tier::new(dec!(1), dec!(6))]);
        assert_eq!(merged.left_unconsumed, Decimal::ZERO);
        assert_eq!(merged.right_unconsumed, dec!(1));
    }

    #[test]
    fn test_merge_interleaves_breakpoints() {
        let a = curve(&[(dec!(2), dec!(1)), (dec!(5), dec!(0.5))]);
        let b = curve(&[(dec!(3), dec!(4)), (dec!(6), dec!(2))]);
        let merged = a.merge(&b, None);

        assert_eq!(
            merged.curve.tiers(),
            &[
                Tier::new(dec!(2), dec!(4)),
                Tier::new(dec!(3), dec!(2)),
                Tier::new(dec!(5), dec!(1)),
            ]
        );
        assert_eq!(merged.right_unconsumed, dec!(1));
    }

    #[test]
    fn test_merge_ties_advance_both_sides() {
        let a = curve(&[(dec!(1), dec!(2)), (dec!(3), dec!(1))]);
        let b = curve(&[(dec!(1), dec!(3)), (dec!(3), dec!(1))]);
        let merged = a.merge(&b, None);
        assert_eq!(
            merged.curve.tiers(),
            &[Tier::new(dec!(1), dec!(6)), Tier::new(dec!(3), dec!(1))]
        );
    }

    #[test]
    fn test_merge_with_unbounded_sentinel_does_not_overflow() {
        let leg = curve(&[(dec!(5), dec!(10)), (dec!(8), dec!(9))]);
        let merged = ConversionCurve::unbounded().merge(&leg, None);
        assert_eq!(merged.curve, leg);
        assert_eq!(merged.left_unconsumed, Decimal::MAX - dec!(8));
    }

    #[test]
    fn test_merge_limit_stops_refinement() {
        let a = curve(&[(dec!(1), dec!(1)), (dec!(2), dec!(1)), (dec!(3), dec!(1))]);
        let b = ConversionCurve::unbounded();
        let limit = MergeLimit {
            min_tiers: 2,
            volume: dec!(1.5),
        };
        let merged = a.merge(&b, Some(limit));
        assert_eq!(merged.curve.len(), 2);
        assert_eq!(merged.curve.total_volume(), dec!(2));
    }

    #[test]
    fn test_merge_limit_waits_for_tier_floor() {
        let a = curve(&[(dec!(10), dec!(1)), (dec!(20), dec!(1))]);
        let limit = MergeLimit {
            min_tiers: 8,
            volume: dec!(1),
        };
        let merged = a.merge(&ConversionCurve::unbounded(), Some(limit));
        assert_eq!(merged.curve.len(), 2);
    }

    #[test]
    fn test_from_order_book_sell_and_buy() {
        let book = OrderBook::new(
            vec![
                PriceLevel::new(dec!(10), dec!(1)),
                PriceLevel::new(dec!(9), dec!(2)),
            ],
            vec![
                PriceLevel::new(dec!(5), dec!(2)),
                PriceLevel::new(dec!(10), dec!(1)),
            ],
        );

        let sell = ConversionCurve::from_order_book(&book, TradeSide::Sell);
        assert_eq!(
            sell.tiers(),
            &[Tier::new(dec!(1), dec!(10)), Tier::new(dec!(3), dec!(9))]
        );

        let buy = ConversionCurve::from_order_book(&book, TradeSide::Buy);
        assert_eq!(
            buy.tiers(),
            &[Tier::new(dec!(10), dec!(0.2)), Tier::new(dec!(20), dec!(0.1))]
        );
        assert_eq!(buy.output_for_input(dec!(20)), dec!(3));
    }

    #[test]
    fn test_curve_matches_book_conversion() {
        let book = OrderBook::new(
            vec![
                PriceLevel::new(dec!(10), dec!(1)),
                PriceLevel::new(dec!(9), dec!(2)),
            ],
            vec![],
        );
        let sell = ConversionCurve::from_order_book(&book, TradeSide::Sell);
        assert_eq!(
            sell.output_for_input(dec!(2)),
            book.convert(TradeSide::Sell, dec!(2)).output
        );
    }

    #[test]
    fn test_input_for_output_inverts_and_caps() {
        let c = curve(&[(dec!(1), dec!(10)), (dec!(3), dec!(5))]);
        assert_eq!(c.input_for_output(dec!(5)), dec!(0.5));
        assert_eq!(c.input_for_output(dec!(15)), dec!(2));
        assert_eq!(c.input_for_output(dec!(1000)), dec!(3));
        assert_eq!(ConversionCurve::unbounded().input_for_output(dec!(7)), dec!(7));
    }

    #[test]
    fn test_project_into_start_units() {
        // 1 BTC -> 10 USD for the first BTC, 5 USD for the next two.
        let accumulated = curve(&[(dec!(1), dec!(10)), (dec!(3), dec!(5))]);
        // USD -> ETH: first 5 USD at 0.2, next 100 USD at 0.1.
        let leg = curve(&[(dec!(5), dec!(0.2)), (dec!(105), dec!(0.1))]);

        let projected = accumulated.project(&leg);
        assert_eq!(
            projected.tiers(),
            &[Tier::new(dec!(0.5), dec!(0.2)), Tier::new(dec!(3), dec!(0.1))]
        );

        let merged = accumulated.merge(&projected, None).curve;
        assert_eq!(
            merged.tiers(),
            &[
                Tier::new(dec!(0.5), dec!(2)),
                Tier::new(dec!(1), dec!(1)),
                Tier::new(dec!(3), dec!(0.5)),
            ]
        );
        // 3 BTC -> 20 USD -> 1 + 1.5 ETH
        assert_eq!(merged.output_for_input(dec!(3)), dec!(2.5));
    }

    #[test]
    fn test_profitable_volume() {
        let c = curve(&[(dec!(2), dec!(1.5)), (dec!(3), dec!(1)), (dec!(7), dec!(0.9))]);
        assert_eq!(c.profitable_volume(), dec!(2));
        assert_eq!(ConversionCurve::default().profitable_volume(), Decimal::ZERO);
    }

    #[test]
    fn test_new_drops_non_increasing_tiers() {
        let c = curve(&[(dec!(1), dec!(2)), (dec!(1), dec!(3)), (dec!(0.5), dec!(1))]);
        assert_eq!(c.len(), 1);
    }
}
