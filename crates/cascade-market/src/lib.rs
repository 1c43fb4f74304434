//! Market-facing logic for the Cascade simulation.
//!
//! This crate holds everything a factory needs to reason about trading
//! without touching world state: production costs, profit evaluation,
//! the read-only market view, and the strategy interface with its
//! bundled implementations. It sits between `cascade-types` /
//! `cascade-ledger` (data and accounting) and `cascade-core` (the world
//! loop that wires strategies to negotiation and execution).
//!
//! # Modules
//!
//! - [`cost`] -- Per-factory production cost model ([`CostModel`])
//! - [`utility`] -- Profit formula and breach primitives ([`UtilityEvaluator`])
//! - [`view`] -- Read-only per-agent market facts ([`MarketView`], [`StepOutcome`])
//! - [`strategy`] -- The [`FactoryStrategy`] seam, [`StrategyKind`] config and [`DoNothing`]
//! - [`random`] -- [`RandomTrader`], quotes uniformly inside the band
//! - [`greedy`] -- [`GreedyTrader`], quotes outstanding need at the band edge
//!
//! # Usage
//!
//! ```
//! use cascade_market::{UtilityEvaluator, UtilityParams};
//! use cascade_types::Product;
//! use rust_decimal::Decimal;
//!
//! let evaluator = UtilityEvaluator::new(UtilityParams {
//!     input_product: Product::new(0),
//!     output_product: Product::new(1),
//!     production_cost: Decimal::from(2),
//!     storage_cost: Decimal::from(5),
//!     delivery_penalty: Decimal::from(5),
//!     exogenous_qin: 10,
//!     exogenous_pin: Decimal::from(100),
//!     exogenous_qout: 10,
//!     exogenous_pout: Decimal::from(300),
//! });
//!
//! // Ten units bought for 100, ten sold for 300, converted at cost 2.
//! assert_eq!(evaluator.evaluate(&[]), Decimal::from(-220));
//! ```

pub mod cost;
pub mod greedy;
pub mod random;
pub mod strategy;
pub mod utility;
pub mod view;

// Re-export primary types at crate root for convenience.
pub use cost::{CostError, CostModel};
pub use greedy::GreedyTrader;
pub use random::RandomTrader;
pub use strategy::{
    DEFAULT_MAX_QUANTITY, DoNothing, FactoryStrategy, Quote, StrategyKind, StrategyParams,
    build_strategy,
};
pub use utility::{TradeTotals, UtilityEvaluator, UtilityParams, breach_level, is_breach};
pub use view::{ChainTotals, MarketView, StepExogenous, StepOutcome};
