//! Concurrent loop discovery.
//!
//! A controller drains a work queue of partial loops and hands each one to a
//! blocking-pool worker, which either closes it into a [`TradeLoop`] or
//! extends it and queues it again. The round ends on quiescence: the queue
//! was empty on a poll and no worker is in flight.
//!
//! ```text
//!  seeds (one per non-cross pair)
//!        │
//!        ▼
//!  ┌───────────┐  poll   ┌────────────┐  closed   ┌─────────────┐
//!  │ work queue│ ──────► │ expand()   │ ────────► │ found (key) │
//!  └───────────┘         │ (worker)   │           └─────────────┘
//!        ▲               └─────┬──────┘
//!        └──── extended ───────┘
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loopbot_core::{ArbitrageConfig, CoinId, TradePair};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::abort::AbortSignal;
use crate::error::panic_message;
use crate::graph::LoopGraphIndex;
use crate::types::{LoopKey, TradeLoop};

// =============================================================================
// Configuration
// =============================================================================

/// Discovery bounds.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum legs per loop.
    pub max_hops: usize,
    /// How long the controller waits on an empty queue before checking quiescence.
    pub poll_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::from(&ArbitrageConfig::default())
    }
}

impl From<&ArbitrageConfig> for DiscoveryConfig {
    fn from(config: &ArbitrageConfig) -> Self {
        Self {
            max_hops: config.max_hops,
            poll_interval: Duration::from_millis(config.discovery_poll_ms.max(1)),
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// A fault caught at a worker boundary.
#[derive(Debug, Clone)]
pub struct WorkerFault {
    /// The partial loop the worker was expanding.
    pub unit: String,
    pub message: String,
}

/// Result of a completed round.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Closed loops, one per key, sorted by key.
    pub loops: Vec<Arc<TradeLoop>>,
    /// Expansion units dispatched.
    pub expansions: usize,
    pub faults: Vec<WorkerFault>,
}

#[derive(Debug)]
pub enum DiscoveryOutcome {
    Completed(DiscoveryReport),
    /// Shut down or superseded; nothing may be published.
    Aborted,
}

impl DiscoveryOutcome {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    #[must_use]
    pub fn into_report(self) -> Option<DiscoveryReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Aborted => None,
        }
    }
}

// =============================================================================
// Partial Loops
// =============================================================================

#[derive(Debug, Clone)]
struct PartialLoop {
    legs: Vec<Arc<TradePair>>,
    beg: CoinId,
    end: CoinId,
}

impl PartialLoop {
    fn seed(pair: &Arc<TradePair>) -> Self {
        Self {
            legs: vec![Arc::clone(pair)],
            beg: pair.base.clone(),
            end: pair.quote.clone(),
        }
    }

    fn extended(&self, pair: &Arc<TradePair>, beg: &CoinId, end: &CoinId) -> Self {
        let mut legs = self.legs.clone();
        legs.push(Arc::clone(pair));
        Self {
            legs,
            beg: beg.clone(),
            end: end.clone(),
        }
    }

    fn uses(&self, pair: &TradePair) -> bool {
        self.legs.iter().any(|leg| leg.id == pair.id)
    }
}

impl std::fmt::Display for PartialLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let legs: Vec<&str> = self.legs.iter().map(|p| p.id.as_str()).collect();
        write!(f, "{} [{}] {}", self.beg, legs.join(", "), self.end)
    }
}

// =============================================================================
// Worker State
// =============================================================================

struct Shared {
    index: Arc<LoopGraphIndex>,
    max_hops: usize,
    queue: mpsc::UnboundedSender<PartialLoop>,
    found: Mutex<HashMap<LoopKey, Arc<TradeLoop>>>,
    faults: Mutex<Vec<WorkerFault>>,
    abort: AbortSignal,
    expand: ExpandFn,
}

type ExpandFn = fn(&Shared, &PartialLoop);

/// Counts a dispatched unit until dropped, including during a panic unwind.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Enumerates every valid closed loop of a pair set.
#[derive(Debug, Clone, Default)]
pub struct LoopDiscovery {
    config: DiscoveryConfig,
}

impl LoopDiscovery {
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Runs one discovery round over `index`.
    ///
    /// Loops never start or end with a cross-exchange leg, never contain two
    /// adjacent cross-exchange legs, and hold at most `max_hops` legs.
    pub async fn discover(&self, index: Arc<LoopGraphIndex>, abort: AbortSignal) -> DiscoveryOutcome {
        self.run_round(index, abort, expand).await
    }

    async fn run_round(
        &self,
        index: Arc<LoopGraphIndex>,
        abort: AbortSignal,
        expand: ExpandFn,
    ) -> DiscoveryOutcome {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut seeds = 0usize;
        for pair in index.pairs().iter().filter(|p| !p.is_cross_exchange()) {
            // The receiver is alive for the whole round.
            let _ = tx.send(PartialLoop::seed(pair));
            seeds += 1;
        }

        let shared = Arc::new(Shared {
            index,
            max_hops: self.config.max_hops,
            queue: tx,
            found: Mutex::new(HashMap::new()),
            faults: Mutex::new(Vec::new()),
            abort: abort.clone(),
            expand,
        });

        let in_flight = Arc::new(AtomicUsize::new(0));
        let mut workers = JoinSet::new();
        let mut expansions = 0usize;

        debug!(seeds, max_hops = self.config.max_hops, "Loop discovery started");

        loop {
            if abort.should_abort() {
                debug!(expansions, "Loop discovery aborted");
                return DiscoveryOutcome::Aborted;
            }

            while let Some(joined) = workers.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Discovery worker task failed");
                }
            }

            match tokio::time::timeout(self.config.poll_interval, rx.recv()).await {
                Ok(Some(partial)) => {
                    let guard = InFlight::enter(&in_flight);
                    let shared = Arc::clone(&shared);
                    expansions += 1;
                    workers.spawn_blocking(move || {
                        let _guard = guard;
                        run_unit(&shared, &partial);
                    });
                }
                Ok(None) => break,
                Err(_) => {
                    // Workers enqueue before releasing their guard, so an idle
                    // counter followed by an empty queue means nothing is left.
                    if in_flight.load(Ordering::SeqCst) == 0 && rx.is_empty() {
                        break;
                    }
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Discovery worker task failed");
            }
        }

        if abort.should_abort() {
            debug!(expansions, "Loop discovery aborted before publishing");
            return DiscoveryOutcome::Aborted;
        }

        let mut loops: Vec<Arc<TradeLoop>> = shared.found.lock().values().cloned().collect();
        loops.sort_by_key(|lp| lp.key());
        let faults = std::mem::take(&mut *shared.faults.lock());

        info!(
            loops = loops.len(),
            expansions,
            faults = faults.len(),
            "Loop discovery completed"
        );

        DiscoveryOutcome::Completed(DiscoveryReport {
            loops,
            expansions,
            faults,
        })
    }
}

fn run_unit(shared: &Shared, partial: &PartialLoop) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (shared.expand)(shared, partial))) {
        let message = panic_message(payload.as_ref());
        warn!(unit = %partial, message = %message, "Discovery worker fault");
        shared.faults.lock().push(WorkerFault {
            unit: partial.to_string(),
            message,
        });
    }
}

fn expand(shared: &Shared, partial: &PartialLoop) {
    let Some(last) = partial.legs.last() else {
        return;
    };
    trace!(partial = %partial, "Expanding partial loop");

    if partial.legs.len() == 1 {
        // Both ends of a single leg are free; growing from `beg` is the same
        // as walking the first leg the other way round.
        for (from, opposite) in [(&partial.end, &partial.beg), (&partial.beg, &partial.end)] {
            for candidate in shared.index.pairs_for(from) {
                if shared.abort.should_abort() {
                    return;
                }
                if candidate.id == last.id {
                    continue;
                }
                let Some(other) = candidate.other(from) else {
                    continue;
                };
                if other == opposite {
                    continue;
                }
                if candidate.is_cross_exchange() && last.is_cross_exchange() {
                    continue;
                }
                if 2 < shared.max_hops {
                    enqueue(shared, partial.extended(candidate, opposite, other));
                }
            }
        }
        return;
    }

    let next_len = partial.legs.len() + 1;
    for candidate in shared.index.pairs_for(&partial.end) {
        if shared.abort.should_abort() {
            return;
        }
        if partial.uses(candidate) {
            continue;
        }
        if candidate.is_cross_exchange() && last.is_cross_exchange() {
            continue;
        }
        let Some(other) = candidate.other(&partial.end) else {
            continue;
        };

        if *other == partial.beg {
            if candidate.is_cross_exchange() || next_len > shared.max_hops {
                continue;
            }
            close(shared, partial, candidate);
        } else if next_len < shared.max_hops {
            enqueue(shared, partial.extended(candidate, &partial.beg, other));
        }
    }
}

fn enqueue(shared: &Shared, partial: PartialLoop) {
    // Send only fails once the controller is gone, which means the round was dropped.
    let _ = shared.queue.send(partial);
}

fn close(shared: &Shared, partial: &PartialLoop, closing: &Arc<TradePair>) {
    let key = LoopKey::from_pairs(
        partial
            .legs
            .iter()
            .map(|p| &p.id)
            .chain(std::iter::once(&closing.id)),
    );
    if shared.found.lock().contains_key(&key) {
        return;
    }

    let mut legs = partial.legs.clone();
    legs.push(Arc::clone(closing));
    match TradeLoop::new(legs, partial.beg.clone()) {
        Ok(lp) => {
            trace!(loop_key = %key, path = %lp, "Loop closed");
            shared.found.lock().entry(key).or_insert_with(|| Arc::new(lp));
        }
        Err(e) => {
            error!(partial = %partial, error = %e, "Closed loop failed validation");
        }
    }
}
