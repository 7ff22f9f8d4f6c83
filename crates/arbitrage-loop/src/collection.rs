//! Observable collection of discovered loops.

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::{LoopSummary, TradeLoop};

pub type LoopList = Arc<Vec<Arc<TradeLoop>>>;

/// Current loops, replaced wholesale on every publish.
///
/// Observers subscribe to a `watch` channel and always see a complete list.
#[derive(Debug)]
pub struct LoopCollection {
    tx: watch::Sender<LoopList>,
}

impl Default for LoopCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopCollection {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self { tx }
    }

    /// Replaces every loop at once, sorted by best known ratio.
    pub fn replace(&self, mut loops: Vec<Arc<TradeLoop>>) {
        sort_by_best_ratio(&mut loops);
        self.tx.send_replace(Arc::new(loops));
    }

    /// Re-sorts the current loops after their reports changed.
    pub fn resort(&self) {
        self.tx.send_modify(|current| {
            let mut loops = current.as_ref().clone();
            sort_by_best_ratio(&mut loops);
            *current = Arc::new(loops);
        });
    }

    /// Current loops.
    #[must_use]
    pub fn snapshot(&self) -> LoopList {
        Arc::clone(&self.tx.borrow())
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoopList> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Display rows in collection order.
    #[must_use]
    pub fn summaries(&self) -> Vec<LoopSummary> {
        self.snapshot().iter().map(|lp| lp.summary()).collect()
    }
}

fn sort_by_best_ratio(loops: &mut [Arc<TradeLoop>]) {
    loops.sort_by(|a, b| {
        b.best_ratio()
            .cmp(&a.best_ratio())
            .then_with(|| a.key().cmp(&b.key()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, DirectionReport};
    use loopbot_core::{CoinId, TradePair};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn triangle(ex: &str) -> Arc<TradeLoop> {
        let coin = |s: &str| CoinId::new(ex, s);
        let pairs = [("BTC", "USD"), ("ETH", "USD"), ("ETH", "BTC")]
            .iter()
            .map(|(b, q)| Arc::new(TradePair::new(coin(b), coin(q), dec!(0.001)).unwrap()))
            .collect();
        Arc::new(TradeLoop::new(pairs, coin("BTC")).unwrap())
    }

    fn rate(lp: &TradeLoop, direction: Direction, ratio: Decimal) {
        lp.set_report(
            direction,
            DirectionReport {
                profit_ratio: ratio,
                ..DirectionReport::default()
            },
        );
    }

    #[test]
    fn test_replace_publishes_to_subscribers() {
        let collection = LoopCollection::new();
        let mut rx = collection.subscribe();
        assert!(collection.is_empty());

        collection.replace(vec![triangle("a"), triangle("b")]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 2);
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_resort_orders_by_best_ratio() {
        let collection = LoopCollection::new();
        let (a, b) = (triangle("a"), triangle("b"));
        collection.replace(vec![Arc::clone(&a), Arc::clone(&b)]);

        rate(&a, Direction::Forward, dec!(0.9));
        rate(&b, Direction::Backward, dec!(1.2));
        collection.resort();

        let loops = collection.snapshot();
        assert_eq!(loops[0].key(), b.key());
        assert_eq!(collection.summaries()[0].best_direction, Direction::Backward);
    }
}
