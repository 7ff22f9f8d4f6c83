//! Coin → pairs index used by loop discovery.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use loopbot_core::{CoinId, TradePair};

/// Immutable adjacency index over one pair set.
///
/// Built fresh whenever the pair set changes and shared read-only with every
/// discovery worker.
#[derive(Debug, Default)]
pub struct LoopGraphIndex {
    pairs: Vec<Arc<TradePair>>,
    by_coin: HashMap<CoinId, Vec<Arc<TradePair>>>,
    fingerprint: u64,
}

impl LoopGraphIndex {
    /// Indexes `pairs` by both of their coins.
    #[must_use]
    pub fn build(pairs: Vec<TradePair>) -> Self {
        let pairs: Vec<Arc<TradePair>> = pairs.into_iter().map(Arc::new).collect();
        let mut by_coin: HashMap<CoinId, Vec<Arc<TradePair>>> = HashMap::new();
        for pair in &pairs {
            by_coin
                .entry(pair.base.clone())
                .or_default()
                .push(Arc::clone(pair));
            by_coin
                .entry(pair.quote.clone())
                .or_default()
                .push(Arc::clone(pair));
        }
        let fingerprint = Self::fingerprint_of(pairs.iter().map(AsRef::as_ref));
        Self {
            pairs,
            by_coin,
            fingerprint,
        }
    }

    /// Structural fingerprint of a pair set: ids and coins only, never prices.
    #[must_use]
    pub fn fingerprint_of<'a>(pairs: impl IntoIterator<Item = &'a TradePair>) -> u64 {
        let mut keys: Vec<(&str, &CoinId, &CoinId)> = pairs
            .into_iter()
            .map(|p| (p.id.as_str(), &p.base, &p.quote))
            .collect();
        keys.sort();
        let mut hasher = DefaultHasher::new();
        keys.hash(&mut hasher);
        hasher.finish()
    }

    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    #[must_use]
    pub fn pairs(&self) -> &[Arc<TradePair>] {
        &self.pairs
    }

    /// Pairs touching `coin`.
    #[must_use]
    pub fn pairs_for(&self, coin: &CoinId) -> &[Arc<TradePair>] {
        self.by_coin.get(coin).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn coin_count(&self) -> usize {
        self.by_coin.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair(ex: &str, base: &str, quote: &str) -> TradePair {
        TradePair::new(CoinId::new(ex, base), CoinId::new(ex, quote), dec!(0.001)).unwrap()
    }

    #[test]
    fn test_index_by_both_coins() {
        let index = LoopGraphIndex::build(vec![
            pair("kraken", "BTC", "USD"),
            pair("kraken", "ETH", "USD"),
            pair("kraken", "ETH", "BTC"),
        ]);
        assert_eq!(index.pair_count(), 3);
        assert_eq!(index.coin_count(), 3);
        assert_eq!(index.pairs_for(&CoinId::new("kraken", "USD")).len(), 2);
        assert!(index.pairs_for(&CoinId::new("binance", "USD")).is_empty());
    }

    #[test]
    fn test_fingerprint_ignores_order_and_fees() {
        let a = LoopGraphIndex::build(vec![
            pair("kraken", "BTC", "USD"),
            pair("kraken", "ETH", "USD"),
        ]);
        let mut cheaper = pair("kraken", "ETH", "USD");
        cheaper.fee_rate = dec!(0.0001);
        let b = LoopGraphIndex::build(vec![cheaper, pair("kraken", "BTC", "USD")]);
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = LoopGraphIndex::build(vec![pair("kraken", "BTC", "USD")]);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
