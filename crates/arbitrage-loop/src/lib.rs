//! Closed-loop arbitrage across one or more exchanges.
//!
//! A loop is a chain of trading pairs that returns to the coin it started
//! from. When the product of the rates along the chain exceeds one after fees,
//! walking it is a riskless gain bounded by book depth and balances:
//!
//! ```text
//! BTC/USD bid 10     1 BTC -> 10 USD
//! ETH/USD ask 5     10 USD ->  2 ETH
//! ETH/BTC bid 1.8    2 ETH -> 3.6 BTC
//!
//! gross ratio: 3.6 (forward); the backward walk is a loss
//! ```
//!
//! # Modules
//!
//! - [`graph`]: coin → pair index and structural fingerprint
//! - [`discovery`]: concurrent enumeration of valid loops
//! - [`curve`]: cumulative conversion curves and their lock-step merge
//! - [`evaluator`]: profit ratio, trade volume and trade scale per direction
//! - [`executor`]: ranking and execution of at most one loop per round
//! - [`engine`]: lifecycle entry points and the observable loop collection
//! - [`paper`]: in-memory market and executor
//!
//! # Example
//!
//! ```ignore
//! use loopbot_arbitrage::{LoopArbitrageEngine, PaperExecutor, PaperMarket};
//!
//! let market = Arc::new(PaperMarket::new());
//! // ... add pairs, books and balances ...
//! let engine = LoopArbitrageEngine::new(
//!     market.clone(),
//!     Arc::new(PaperExecutor::new(market)),
//!     &AppConfig::default(),
//! );
//!
//! engine.rediscover().await;
//! let report = engine.step().await?;
//! ```
//!
//! # Loop rules
//!
//! Discovered loops never start or end with a cross-exchange leg, never hold
//! two adjacent cross-exchange legs, and have at most `max_hops` legs. The
//! same cycle found from different seeds is one loop.

pub mod abort;
pub mod collection;
pub mod curve;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod graph;
pub mod paper;
pub mod types;

pub use abort::{AbortController, AbortSignal};
pub use collection::{LoopCollection, LoopList};
pub use curve::{ConversionCurve, MergeLimit, MergeResult, Tier};
pub use discovery::{DiscoveryConfig, DiscoveryOutcome, DiscoveryReport, LoopDiscovery, WorkerFault};
pub use engine::{LoopArbitrageEngine, StepReport};
pub use error::{ExecutionError, LegViolation, LoopError};
pub use evaluator::{Evaluation, EvaluationRound, LegPlan, LoopEvaluator, ProfitableLoop};
pub use executor::{ExecutedLoop, ExecutionOutcome, ExecutionStats, LoopExecutor};
pub use graph::LoopGraphIndex;
pub use paper::{PaperExecutor, PaperMarket};
pub use types::{Direction, DirectionReport, LoopKey, LoopLeg, LoopSummary, TradeLoop};
