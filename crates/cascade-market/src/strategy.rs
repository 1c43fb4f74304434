//! The strategy seam between factories and the negotiation layer.
//!
//! Every factory owns one boxed [`FactoryStrategy`], composed at world
//! build time from the configured [`StrategyKind`]. The world drives the
//! strategy through three capabilities:
//!
//! 1. [`quote`] -- respond to a negotiation opportunity with terms.
//! 2. [`on_contract_signed`] -- notification after a contract registers.
//! 3. [`on_step`] -- end-of-step feedback with realized quantities,
//!    charges and profit.
//!
//! Strategies never touch world state: they see a read-only
//! [`MarketView`] and return values. All randomness flows through the
//! RNG handle the world passes in, so runs stay reproducible.
//!
//! [`quote`]: FactoryStrategy::quote
//! [`on_contract_signed`]: FactoryStrategy::on_contract_signed
//! [`on_step`]: FactoryStrategy::on_step

use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cascade_types::{AgentId, Contract, TradeRole};

use crate::greedy::GreedyTrader;
use crate::random::RandomTrader;
use crate::view::{MarketView, StepOutcome};

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// Proposed trade terms for one negotiation opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Units offered or requested.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Decimal,
}

impl Quote {
    /// Build a quote.
    pub const fn new(quantity: u32, unit_price: Decimal) -> Self {
        Self {
            quantity,
            unit_price,
        }
    }
}

// ---------------------------------------------------------------------------
// The strategy capability set
// ---------------------------------------------------------------------------

/// Decision interface implemented by every trading strategy.
pub trait FactoryStrategy {
    /// Respond to a negotiation opportunity against `counterpart`.
    ///
    /// `role` says which side of the trade this factory would take.
    /// Returning `None` declines the opportunity.
    fn quote(
        &mut self,
        view: &MarketView,
        role: TradeRole,
        counterpart: AgentId,
        rng: &mut dyn RngCore,
    ) -> Option<Quote>;

    /// Notification that a contract involving this factory registered.
    fn on_contract_signed(&mut self, _view: &MarketView, _contract: &Contract) {}

    /// End-of-step feedback with the factory's realized outcome.
    fn on_step(&mut self, _view: &MarketView, _outcome: &StepOutcome) {}
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default quantity cap for stochastic strategies.
pub const DEFAULT_MAX_QUANTITY: u32 = 10;

/// Strategy selection by name, as it appears in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Never quotes; trades only through exogenous schedules.
    #[default]
    DoNothing,
    /// Quotes random quantities and prices inside the catalog band.
    Random,
    /// Quotes outstanding need at the favorable edge of the band.
    Greedy,
}

/// Per-agent strategy parameters, order-aligned with the agent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Upper bound on quoted quantity for stochastic strategies.
    pub max_quantity: u32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            max_quantity: DEFAULT_MAX_QUANTITY,
        }
    }
}

/// Instantiate the strategy a kind and parameter set describe.
pub fn build_strategy(kind: StrategyKind, params: StrategyParams) -> Box<dyn FactoryStrategy> {
    match kind {
        StrategyKind::DoNothing => Box::new(DoNothing::new()),
        StrategyKind::Random => Box::new(RandomTrader::new(params.max_quantity)),
        StrategyKind::Greedy => Box::new(GreedyTrader::new()),
    }
}

// ---------------------------------------------------------------------------
// The baseline strategy
// ---------------------------------------------------------------------------

/// A strategy that declines every negotiation opportunity.
///
/// Factories running it trade only through their exogenous schedules,
/// which makes it the baseline for accounting tests: interior factories
/// with this strategy never touch their ledgers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DoNothing;

impl DoNothing {
    /// Build the do-nothing strategy.
    pub const fn new() -> Self {
        Self
    }
}

impl FactoryStrategy for DoNothing {
    fn quote(
        &mut self,
        _view: &MarketView,
        _role: TradeRole,
        _counterpart: AgentId,
        _rng: &mut dyn RngCore,
    ) -> Option<Quote> {
        None
    }
}
