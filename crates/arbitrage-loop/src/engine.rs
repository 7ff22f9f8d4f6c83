//! Loop arbitrage engine.
//!
//! Ties discovery, evaluation and execution to a market snapshot and exposes
//! the entry points a bot lifecycle drives: `pairs_changed` on structural
//! market changes, `step` on every heartbeat, and an observable collection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loopbot_core::{AppConfig, MarketSnapshot, TradeExecutor};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::abort::{AbortController, AbortSignal};
use crate::collection::{LoopCollection, LoopList};
use crate::discovery::{DiscoveryConfig, DiscoveryOutcome, DiscoveryReport, LoopDiscovery};
use crate::error::ExecutionError;
use crate::evaluator::LoopEvaluator;
use crate::executor::{ExecutionOutcome, ExecutionStats, LoopExecutor};
use crate::graph::LoopGraphIndex;

/// What one `step` did.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Loops in the collection at the start of the step.
    pub loops: usize,
    /// Evaluation units run (two per loop).
    pub evaluated: usize,
    pub profitable: usize,
    pub excluded: usize,
    pub faults: usize,
    pub outcome: ExecutionOutcome,
}

/// Drives loop discovery, evaluation and execution against one market.
pub struct LoopArbitrageEngine {
    market: Arc<dyn MarketSnapshot>,
    discovery: RwLock<LoopDiscovery>,
    evaluator: LoopEvaluator,
    executor: LoopExecutor,
    collection: Arc<LoopCollection>,
    abort: AbortController,
    publish_lock: Arc<Mutex<()>>,
    fingerprints: Arc<Mutex<PairSetState>>,
    active: AtomicBool,
}

/// Pair-set fingerprints of the published collection and of the round in flight.
#[derive(Debug, Default)]
struct PairSetState {
    published: Option<u64>,
    pending: Option<u64>,
}

impl std::fmt::Debug for LoopArbitrageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopArbitrageEngine")
            .field("discovery", &*self.discovery.read())
            .field("loops", &self.collection.len())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl LoopArbitrageEngine {
    #[must_use]
    pub fn new(
        market: Arc<dyn MarketSnapshot>,
        executor: Arc<dyn TradeExecutor>,
        config: &AppConfig,
    ) -> Self {
        let arbitrage = &config.arbitrage;
        Self {
            market,
            discovery: RwLock::new(LoopDiscovery::new(DiscoveryConfig::from(arbitrage))),
            evaluator: LoopEvaluator::new(arbitrage.clone()),
            executor: LoopExecutor::new(executor, arbitrage.fund.clone(), &config.execution),
            collection: Arc::new(LoopCollection::new()),
            abort: AbortController::new(),
            publish_lock: Arc::new(Mutex::new(())),
            fingerprints: Arc::new(Mutex::new(PairSetState::default())),
            active: AtomicBool::new(true),
        }
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Starts a discovery round over the current pair set.
    ///
    /// Any round still running is superseded and publishes nothing. The
    /// returned handle resolves to the report of a round that published.
    pub fn pairs_changed(&self) -> JoinHandle<Option<DiscoveryReport>> {
        let signal = self.abort.issue();
        let index = Arc::new(LoopGraphIndex::build(self.market.pairs()));
        let fingerprint = index.fingerprint();
        self.fingerprints.lock().pending = Some(fingerprint);
        info!(
            pairs = index.pair_count(),
            coins = index.coin_count(),
            "Pair set changed, starting loop discovery"
        );

        let round = DiscoveryRound {
            discovery: self.discovery.read().clone(),
            index,
            signal,
            collection: Arc::clone(&self.collection),
            publish_lock: Arc::clone(&self.publish_lock),
            fingerprints: Arc::clone(&self.fingerprints),
        };
        self.supervise(tokio::spawn(round.run()), fingerprint)
    }

    /// Logs a failed controller and clears its pending fingerprint so the next
    /// `sync_pairs` retries. The returned handle never carries a panic.
    fn supervise(
        &self,
        controller: JoinHandle<Option<DiscoveryReport>>,
        fingerprint: u64,
    ) -> JoinHandle<Option<DiscoveryReport>> {
        let fingerprints = Arc::clone(&self.fingerprints);
        tokio::spawn(async move {
            match controller.await {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, fingerprint, "Loop discovery controller failed, round abandoned");
                    let mut state = fingerprints.lock();
                    if state.pending == Some(fingerprint) {
                        state.pending = None;
                    }
                    None
                }
            }
        })
    }

    /// Runs discovery to completion.
    ///
    /// Returns `None` when the round was aborted or its controller failed; the
    /// previous collection then stays in place.
    pub async fn rediscover(&self) -> Option<DiscoveryReport> {
        match self.pairs_changed().await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Loop discovery supervisor failed");
                None
            }
        }
    }

    /// Starts discovery only when the structural pair set differs from both
    /// the published collection and the round already in flight.
    pub fn sync_pairs(&self) -> Option<JoinHandle<Option<DiscoveryReport>>> {
        let current = Some(LoopGraphIndex::fingerprint_of(self.market.pairs().iter()));
        {
            let state = self.fingerprints.lock();
            if state.published == current || state.pending == current {
                return None;
            }
        }
        Some(self.pairs_changed())
    }

    /// Changes the hop limit and re-discovers.
    pub fn set_max_hops(&self, max_hops: usize) -> JoinHandle<Option<DiscoveryReport>> {
        {
            let mut discovery = self.discovery.write();
            let mut config = discovery.config().clone();
            config.max_hops = max_hops;
            *discovery = LoopDiscovery::new(config);
        }
        info!(max_hops, "Max hops changed");
        self.pairs_changed()
    }

    #[must_use]
    pub fn max_hops(&self) -> usize {
        self.discovery.read().config().max_hops
    }

    // =========================================================================
    // Evaluation & Execution
    // =========================================================================

    /// Evaluates every loop, executes at most one and re-sorts the collection.
    ///
    /// # Errors
    /// Returns [`ExecutionError::Inactive`] once the engine has deactivated,
    /// and the leg failure that deactivated it.
    pub async fn step(&self) -> Result<StepReport, ExecutionError> {
        if !self.is_active() {
            return Err(ExecutionError::Inactive);
        }

        let loops = self.collection.snapshot();
        let round = self
            .evaluator
            .evaluate_all(&loops, Arc::clone(&self.market))
            .await;
        let (evaluated, profitable, excluded, faults) = (
            round.evaluated,
            round.profitable.len(),
            round.excluded,
            round.faults,
        );

        let result = self
            .executor
            .execute_best(round.profitable, self.market.now())
            .await;
        self.collection.resort();

        match result {
            Ok(outcome) => Ok(StepReport {
                loops: loops.len(),
                evaluated,
                profitable,
                excluded,
                faults,
                outcome,
            }),
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                error!(error = %e, "Execution failed, deactivating loop arbitrage");
                Err(e)
            }
        }
    }

    /// Steps every `interval` until shutdown or deactivation.
    ///
    /// Structural pair changes seen between steps trigger re-discovery.
    pub async fn run(&self, interval: Duration) {
        let interval = interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(interval);
        info!(interval_ms = interval.as_millis() as u64, "Loop arbitrage started");

        loop {
            ticker.tick().await;
            if self.abort.is_shutdown() {
                break;
            }
            if self.sync_pairs().is_some() {
                // The supervisor logs a failed round and lets the next tick retry.
                debug!("Re-discovering loops in the background");
            }
            match self.step().await {
                Ok(report) => debug!(
                    loops = report.loops,
                    profitable = report.profitable,
                    "Step completed"
                ),
                Err(ExecutionError::Inactive) => break,
                Err(e) => {
                    warn!(error = %e, "Stopping after execution fault");
                    break;
                }
            }
        }
        info!(stats = ?self.executor.stats(), "Loop arbitrage stopped");
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Aborts discovery and stops `run`.
    pub fn shutdown(&self) {
        self.abort.shutdown();
        info!("Loop arbitrage shutting down");
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.abort.is_shutdown()
    }

    #[must_use]
    pub fn loops(&self) -> LoopList {
        self.collection.snapshot()
    }

    #[must_use]
    pub fn collection(&self) -> &Arc<LoopCollection> {
        &self.collection
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoopList> {
        self.collection.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        self.executor.stats()
    }
}

/// One spawned discovery round and what it publishes into.
struct DiscoveryRound {
    discovery: LoopDiscovery,
    index: Arc<LoopGraphIndex>,
    signal: AbortSignal,
    collection: Arc<LoopCollection>,
    publish_lock: Arc<Mutex<()>>,
    fingerprints: Arc<Mutex<PairSetState>>,
}

impl DiscoveryRound {
    async fn run(self) -> Option<DiscoveryReport> {
        let fingerprint = self.index.fingerprint();
        let DiscoveryOutcome::Completed(report) = self
            .discovery
            .discover(self.index, self.signal.clone())
            .await
        else {
            return None;
        };

        // A newer round may only publish after this one has checked and published.
        let _guard = self.publish_lock.lock();
        if self.signal.should_abort() {
            debug!("Discovery superseded before publishing");
            return None;
        }
        self.collection.replace(report.loops.clone());
        {
            let mut state = self.fingerprints.lock();
            state.published = Some(fingerprint);
            if state.pending == Some(fingerprint) {
                state.pending = None;
            }
        }
        info!(
            loops = report.loops.len(),
            faults = report.faults.len(),
            "Loop collection published"
        );
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{PaperExecutor, PaperMarket};
    use loopbot_core::{Balance, CoinId, OrderBook, PriceLevel, TradePair};
    use rust_decimal_macros::dec;

    fn coin(symbol: &str) -> CoinId {
        CoinId::new("kraken", symbol)
    }

    fn book(bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> OrderBook {
        OrderBook::new(
            vec![PriceLevel::new(bid, dec!(100))],
            vec![PriceLevel::new(ask, dec!(100))],
        )
    }

    fn market() -> Arc<PaperMarket> {
        let market = Arc::new(PaperMarket::new());
        let pair = |b: &str, q: &str| TradePair::new(coin(b), coin(q), dec!(0.001)).unwrap();
        market.add_pair(pair("BTC", "USD"), book(dec!(10), dec!(10.1)));
        market.add_pair(pair("ETH", "USD"), book(dec!(4.9), dec!(5)));
        market.add_pair(pair("ETH", "BTC"), book(dec!(0.49), dec!(0.5)));
        for symbol in ["BTC", "USD", "ETH"] {
            market.set_balance(coin(symbol), Balance::available(dec!(1000)));
        }
        market
    }

    fn engine(market: &Arc<PaperMarket>) -> LoopArbitrageEngine {
        LoopArbitrageEngine::new(
            Arc::clone(market) as Arc<dyn MarketSnapshot>,
            Arc::new(PaperExecutor::new(Arc::clone(market))),
            &AppConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_rediscover_publishes_collection() {
        let market = market();
        let engine = engine(&market);
        let mut rx = engine.subscribe();

        let report = engine.rediscover().await.unwrap();
        assert_eq!(report.loops.len(), 1);
        assert_eq!(engine.loops().len(), 1);
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_sync_pairs_ignores_price_ticks() {
        let market = market();
        let engine = engine(&market);
        engine.rediscover().await.unwrap();

        market.set_order_book(
            &loopbot_core::PairId::new("kraken:ETH/BTC"),
            book(dec!(0.6), dec!(0.61)),
        );
        assert!(engine.sync_pairs().is_none());

        market.remove_pair(&loopbot_core::PairId::new("kraken:ETH/BTC"));
        let handle = engine.sync_pairs().unwrap();
        let report = handle.await.unwrap().unwrap();
        assert!(report.loops.is_empty());
        assert!(engine.loops().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_round_keeps_latest_result() {
        let market = market();
        let engine = engine(&market);
        let stale = engine.pairs_changed();
        let fresh = engine.pairs_changed();

        assert!(stale.await.unwrap().is_none());
        assert!(fresh.await.unwrap().is_some());
        assert_eq!(engine.loops().len(), 1);
        assert!(engine.fingerprints.lock().pending.is_none());
    }

    #[tokio::test]
    async fn test_fingerprint_recorded_only_after_publish() {
        let market = market();
        let engine = engine(&market);
        let current = LoopGraphIndex::fingerprint_of(market.pairs().iter());

        let handle = engine.pairs_changed();
        {
            let state = engine.fingerprints.lock();
            assert_eq!(state.published, None);
            assert_eq!(state.pending, Some(current));
        }
        // A round in flight for the same pair set is not restarted.
        assert!(engine.sync_pairs().is_none());

        assert!(handle.await.unwrap().is_some());
        let state = engine.fingerprints.lock();
        assert_eq!(state.published, Some(current));
        assert_eq!(state.pending, None);
    }

    #[tokio::test]
    async fn test_controller_fault_is_logged_and_retried() {
        let market = market();
        let engine = engine(&market);
        let current = LoopGraphIndex::fingerprint_of(market.pairs().iter());
        engine.fingerprints.lock().pending = Some(current);
        assert!(engine.sync_pairs().is_none());

        let crashed: JoinHandle<Option<DiscoveryReport>> =
            tokio::spawn(async { panic!("graph index poisoned") });
        assert!(engine.supervise(crashed, current).await.unwrap().is_none());
        {
            let state = engine.fingerprints.lock();
            assert_eq!(state.published, None);
            assert_eq!(state.pending, None);
        }
        assert!(engine.loops().is_empty());

        let retry = engine.sync_pairs().unwrap();
        let report = retry.await.unwrap().unwrap();
        assert_eq!(report.loops.len(), 1);
        assert_eq!(engine.loops().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_still_publishes() {
        let market = market();
        let engine = engine(&market);
        drop(engine.sync_pairs().unwrap());

        for _ in 0..200 {
            if engine.fingerprints.lock().published.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.loops().len(), 1);
        assert!(engine.sync_pairs().is_none());
    }

    #[tokio::test]
    async fn test_set_max_hops_rediscovers() {
        let market = market();
        let engine = engine(&market);
        engine.rediscover().await.unwrap();

        let report = engine.set_max_hops(2).await.unwrap().unwrap();
        assert_eq!(engine.max_hops(), 2);
        assert!(report.loops.is_empty());
        assert!(engine.loops().is_empty());
    }

    #[tokio::test]
    async fn test_step_without_arbitrage_is_idle() {
        let market = market();
        let engine = engine(&market);
        engine.rediscover().await.unwrap();

        let report = engine.step().await.unwrap();
        assert_eq!(report.loops, 1);
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.profitable, 0);
        assert!(matches!(report.outcome, ExecutionOutcome::Idle));
    }

    #[tokio::test]
    async fn test_shutdown_deactivates() {
        let market = market();
        let engine = engine(&market);
        engine.shutdown();
        assert!(!engine.is_active());
        assert!(matches!(engine.step().await, Err(ExecutionError::Inactive)));
        assert!(engine.rediscover().await.is_none());
    }
}
