//! TOML market files for the paper market.
//!
//! ```toml
//! fund = "main"
//!
//! [[pairs]]
//! exchange = "kraken"
//! base = "BTC"
//! quote = "USD"
//! fee_rate = "0.001"
//! bids = [["10", "5"]]        # [price, volume]
//! asks = [["10.1", "5"]]
//!
//! [[cross]]
//! symbol = "BTC"
//! from = "kraken"
//! to = "binance"
//!
//! [[balances]]
//! exchange = "kraken"
//! symbol = "BTC"
//! available = "10"
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Format, Toml},
    Figment,
};
use loopbot_arbitrage::PaperMarket;
use loopbot_core::{Balance, CoinId, FundId, OrderBook, PriceLevel, TradeLimits, TradePair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_fee_rate() -> Decimal {
    Decimal::new(1, 3)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketFile {
    /// Fund whose balances are listed; defaults to `main`.
    #[serde(default)]
    pub fund: FundId,
    #[serde(default)]
    pub pairs: Vec<PairEntry>,
    #[serde(default)]
    pub cross: Vec<CrossEntry>,
    #[serde(default)]
    pub balances: Vec<BalanceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairEntry {
    pub exchange: String,
    pub base: String,
    pub quote: String,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    #[serde(default)]
    pub bids: Vec<[Decimal; 2]>,
    #[serde(default)]
    pub asks: Vec<[Decimal; 2]>,
    #[serde(default)]
    pub limits: Option<TradeLimits>,
}

/// Transfer link for one symbol between two exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossEntry {
    pub symbol: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub exchange: String,
    pub symbol: String,
    pub available: Decimal,
    #[serde(default)]
    pub held: Decimal,
}

/// Counts reported by `loopbot validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketOverview {
    pub exchanges: Vec<String>,
    pub pairs: usize,
    pub cross_links: usize,
    pub coins: usize,
    pub funded_coins: usize,
    pub empty_books: Vec<String>,
}

impl MarketFile {
    /// Reads a market file from disk.
    ///
    /// # Errors
    /// Fails when the file is missing or does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("market file {} not found", path.display());
        }
        Figment::from(Toml::file(path))
            .extract()
            .with_context(|| format!("Failed to parse market file {}", path.display()))
    }

    /// Parses market file contents.
    ///
    /// # Errors
    /// Fails when the contents do not parse.
    pub fn parse(contents: &str) -> Result<Self> {
        Figment::from(Toml::string(contents))
            .extract()
            .context("Failed to parse market file")
    }

    /// Trading pairs with their order books.
    ///
    /// # Errors
    /// Fails on a pair whose base and quote are the same coin.
    pub fn trade_pairs(&self) -> Result<Vec<(TradePair, OrderBook)>> {
        self.pairs
            .iter()
            .map(|entry| {
                let pair = TradePair::new(
                    CoinId::new(&entry.exchange, &entry.base),
                    CoinId::new(&entry.exchange, &entry.quote),
                    entry.fee_rate,
                )
                .with_context(|| {
                    format!("invalid pair {}:{}/{}", entry.exchange, entry.base, entry.quote)
                })?;
                let pair = match entry.limits {
                    Some(limits) => pair.with_limits(limits),
                    None => pair,
                };
                Ok((pair, OrderBook::new(levels(&entry.bids), levels(&entry.asks))))
            })
            .collect()
    }

    /// Cross-exchange transfer pairs.
    ///
    /// # Errors
    /// Fails when a link stays on one exchange.
    pub fn cross_pairs(&self) -> Result<Vec<TradePair>> {
        self.cross
            .iter()
            .map(|entry| {
                TradePair::cross(
                    CoinId::new(&entry.from, &entry.symbol),
                    CoinId::new(&entry.to, &entry.symbol),
                )
                .with_context(|| {
                    format!("invalid cross link {} {} -> {}", entry.symbol, entry.from, entry.to)
                })
            })
            .collect()
    }

    /// Builds a paper market holding every pair, link and balance.
    ///
    /// # Errors
    /// Fails on any invalid pair or cross link.
    pub fn into_market(self) -> Result<PaperMarket> {
        let market = PaperMarket::with_fund(self.fund.clone());
        for (pair, book) in self.trade_pairs()? {
            market.add_pair(pair, book);
        }
        for pair in self.cross_pairs()? {
            market.add_cross_pair(pair);
        }
        for entry in self.balances {
            market.set_balance(
                CoinId::new(entry.exchange, entry.symbol),
                Balance {
                    total: entry.available + entry.held,
                    held: entry.held,
                    available: entry.available,
                },
            );
        }
        Ok(market)
    }

    /// # Errors
    /// Fails on any invalid pair or cross link.
    pub fn overview(&self) -> Result<MarketOverview> {
        let pairs = self.trade_pairs()?;
        let cross = self.cross_pairs()?;

        let mut exchanges = BTreeSet::new();
        let mut coins = BTreeSet::new();
        let mut empty_books = Vec::new();
        for (pair, book) in &pairs {
            exchanges.insert(pair.exchange.to_string());
            coins.insert(pair.base.clone());
            coins.insert(pair.quote.clone());
            if book.best_bid().is_none() && book.best_ask().is_none() {
                empty_books.push(pair.id.to_string());
            }
        }
        for pair in &cross {
            coins.insert(pair.base.clone());
            coins.insert(pair.quote.clone());
        }
        let funded_coins = self
            .balances
            .iter()
            .filter(|b| b.available > Decimal::ZERO)
            .count();

        Ok(MarketOverview {
            exchanges: exchanges.into_iter().collect(),
            pairs: pairs.len(),
            cross_links: cross.len(),
            coins: coins.len(),
            funded_coins,
            empty_books,
        })
    }
}

fn levels(raw: &[[Decimal; 2]]) -> Vec<PriceLevel> {
    raw.iter()
        .map(|[price, volume]| PriceLevel::new(*price, *volume))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopbot_core::{MarketSnapshot, PairId};
    use rust_decimal_macros::dec;
    use std::io::Write;

    const SAMPLE: &str = r#"
fund = "main"

[[pairs]]
exchange = "kraken"
base = "BTC"
quote = "USD"
bids = [["10", "5"]]
asks = [["10.1", "5"]]

[[pairs]]
exchange = "binance"
base = "ETH"
quote = "BTC"
fee_rate = "0.002"
bids = [["0.09", "100"]]
asks = [["0.1", "100"]]

[pairs.limits.base]
min = "0.01"
max = "50"

[[pairs]]
exchange = "binance"
base = "SOL"
quote = "BTC"

[[cross]]
symbol = "BTC"
from = "kraken"
to = "binance"

[[balances]]
exchange = "kraken"
symbol = "BTC"
available = "10"
held = "1"

[[balances]]
exchange = "binance"
symbol = "ETH"
available = "0"
"#;

    #[test]
    fn test_parse_sample() {
        let file = MarketFile::parse(SAMPLE).unwrap();
        assert_eq!(file.fund, FundId::default());
        assert_eq!(file.pairs.len(), 3);
        assert_eq!(file.pairs[0].fee_rate, dec!(0.001));
        assert_eq!(file.pairs[1].fee_rate, dec!(0.002));
        assert_eq!(file.pairs[0].asks, vec![[dec!(10.1), dec!(5)]]);
        assert_eq!(file.cross.len(), 1);
        assert_eq!(file.balances[0].held, dec!(1));
    }

    #[test]
    fn test_limits_are_applied() {
        let file = MarketFile::parse(SAMPLE).unwrap();
        let pairs = file.trade_pairs().unwrap();
        let (eth_btc, _) = &pairs[1];
        assert_eq!(eth_btc.limits.base.min, dec!(0.01));
        assert_eq!(eth_btc.limits.base.max, dec!(50));
    }

    #[test]
    fn test_into_market() {
        let market = MarketFile::parse(SAMPLE).unwrap().into_market().unwrap();
        assert_eq!(market.pairs().len(), 4);

        let btc = market.balance(&CoinId::new("kraken", "BTC"), &FundId::default());
        assert_eq!(btc.available, dec!(10));
        assert_eq!(btc.total, dec!(11));

        let book = market
            .order_book(&PairId::new("kraken:BTC/USD"))
            .unwrap();
        assert_eq!(book.best_bid(), Some(dec!(10)));
    }

    #[test]
    fn test_overview() {
        let overview = MarketFile::parse(SAMPLE).unwrap().overview().unwrap();
        assert_eq!(overview.exchanges, vec!["binance", "kraken"]);
        assert_eq!(overview.pairs, 3);
        assert_eq!(overview.cross_links, 1);
        // BTC, USD on kraken; ETH, BTC, SOL on binance.
        assert_eq!(overview.coins, 5);
        assert_eq!(overview.funded_coins, 1);
        assert_eq!(overview.empty_books, vec!["binance:SOL/BTC"]);
    }

    #[test]
    fn test_same_exchange_cross_link_is_rejected() {
        let file = MarketFile::parse(
            r#"
[[cross]]
symbol = "BTC"
from = "kraken"
to = "kraken"
"#,
        )
        .unwrap();
        assert!(file.cross_pairs().is_err());
        assert!(file.into_market().is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(SAMPLE.as_bytes()).unwrap();
        let file = MarketFile::load(tmp.path()).unwrap();
        assert_eq!(file.pairs.len(), 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = MarketFile::load("does/not/exist.toml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
