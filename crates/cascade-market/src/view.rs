//! Read-only per-agent market facts.
//!
//! A [`MarketView`] is the only window a strategy gets on the world:
//! its own profile and ledger snapshot, the step clock, the catalog,
//! this step's exogenous schedule and the trading partners it may quote
//! to. Views are rebuilt every step from world state; mutating one
//! changes nothing outside the strategy that holds it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cascade_ledger::FactorySnapshot;
use cascade_types::{AgentId, FactoryProfile, Product};

/// The factory's own scheduled exogenous flows for the current step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExogenous {
    /// Input units scheduled to arrive from the external supplier.
    pub supply_quantity: u32,
    /// Unit price charged for the scheduled supply.
    pub supply_price: Decimal,
    /// Output units scheduled for delivery to the external consumer.
    pub sale_quantity: u32,
    /// Unit price credited per delivered sale unit.
    pub sale_price: Decimal,
}

/// Chain-wide exogenous quantities for the current step.
///
/// Interior factories have no exogenous schedule of their own; these
/// totals tell them how much is flowing through the chain so they can
/// size their quotes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTotals {
    /// Units entering the chain at the first level this step.
    pub exogenous_supply: u64,
    /// Units demanded from the last level this step.
    pub exogenous_sales: u64,
}

/// Everything a strategy may know when quoting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketView {
    /// The factory this view belongs to.
    pub agent: AgentId,
    /// The factory's production level (index of its assigned process).
    pub level: u32,
    /// Product the factory buys.
    pub input_product: Product,
    /// Product the factory sells.
    pub output_product: Product,
    /// Number of products in the chain.
    pub n_products: u32,
    /// Number of processes (production levels) in the chain.
    pub n_processes: u32,
    /// The factory's immutable profile.
    pub profile: FactoryProfile,
    /// Snapshot of the factory's ledger at the start of negotiation.
    pub ledger: FactorySnapshot,
    /// Current simulation step.
    pub step: u64,
    /// Total steps the run will execute.
    pub n_steps: u64,
    /// Reference price per product, indexed by product level.
    pub catalog_prices: Vec<Decimal>,
    /// Per-unit settlement rate for residual inventory.
    pub storage_cost: Decimal,
    /// Per-unit settlement rate for unmet output commitments.
    pub delivery_penalty: Decimal,
    /// The factory's own exogenous schedule for this step.
    pub exogenous: StepExogenous,
    /// Factories one level below that may sell to this one.
    pub suppliers: Vec<AgentId>,
    /// Factories one level above that may buy from this one.
    pub consumers: Vec<AgentId>,
    /// Chain-wide exogenous totals for this step.
    pub chain_totals: ChainTotals,
}

impl MarketView {
    /// Catalog price of a product, zero when the product is unknown.
    pub fn catalog_price(&self, product: Product) -> Decimal {
        let index = usize::try_from(product.level()).unwrap_or(usize::MAX);
        self.catalog_prices
            .get(index)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// The negotiation price band for a product: half to double catalog.
    ///
    /// Generated exogenous prices always land inside this band, so
    /// strategies quoting within it stay comparable to the external
    /// market.
    pub fn trading_band(&self, product: Product) -> (Decimal, Decimal) {
        let catalog = self.catalog_price(product);
        let floor = catalog.checked_div(Decimal::TWO).unwrap_or(Decimal::ZERO);
        let ceiling = catalog.saturating_mul(Decimal::TWO);
        (floor, ceiling)
    }

    /// Whether this factory sits at the first level (exogenous supply).
    pub const fn is_first_level(&self) -> bool {
        self.level == 0
    }

    /// Whether this factory sits at the last level (exogenous sales).
    pub const fn is_last_level(&self) -> bool {
        self.level.saturating_add(1) == self.n_processes
    }
}

// ---------------------------------------------------------------------------
// Step feedback
// ---------------------------------------------------------------------------

/// Realized quantities and charges delivered to a strategy after a step.
///
/// `qin`/`pin` cover everything the factory actually received and paid
/// for (negotiated deliveries, exogenous supply, shortfall purchases);
/// `qout`/`pout` cover everything it delivered and was paid for.
/// `profit` is the step's net balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// The step this outcome describes.
    pub step: u64,
    /// Input units received.
    pub qin: u32,
    /// Total paid for input units.
    pub pin: Decimal,
    /// Output units delivered.
    pub qout: u32,
    /// Total received for output units.
    pub pout: Decimal,
    /// Units produced on the factory's lines.
    pub produced: u32,
    /// Production cost charged for the step's runs.
    pub production_charge: Decimal,
    /// Storage cost charged on residual inventory.
    pub storage_charge: Decimal,
    /// Penalty charged on unmet output commitments.
    pub delivery_charge: Decimal,
    /// Net balance change over the step.
    pub profit: Decimal,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_ledger::FactoryLedger;

    use super::*;

    fn make_view(level: u32, n_processes: u32) -> MarketView {
        let agent = AgentId::new(3);
        MarketView {
            agent,
            level,
            input_product: Product::new(level),
            output_product: Product::new(level.saturating_add(1)),
            n_products: n_processes.saturating_add(1),
            n_processes,
            profile: FactoryProfile::with_zero_schedules(vec![vec![2, 3]], 4, 3),
            ledger: FactoryLedger::new(agent, Decimal::from(1000)).snapshot(),
            step: 0,
            n_steps: 4,
            catalog_prices: vec![Decimal::from(20), Decimal::from(40), Decimal::from(60)],
            storage_cost: Decimal::from(5),
            delivery_penalty: Decimal::from(5),
            exogenous: StepExogenous {
                supply_quantity: 0,
                supply_price: Decimal::ZERO,
                sale_quantity: 0,
                sale_price: Decimal::ZERO,
            },
            suppliers: Vec::new(),
            consumers: Vec::new(),
            chain_totals: ChainTotals {
                exogenous_supply: 0,
                exogenous_sales: 0,
            },
        }
    }

    #[test]
    fn catalog_lookup_by_product_level() {
        let view = make_view(1, 2);
        assert_eq!(view.catalog_price(Product::new(0)), Decimal::from(20));
        assert_eq!(view.catalog_price(Product::new(2)), Decimal::from(60));
        assert_eq!(view.catalog_price(Product::new(9)), Decimal::ZERO);
    }

    #[test]
    fn trading_band_spans_half_to_double_catalog() {
        let view = make_view(0, 2);
        let (floor, ceiling) = view.trading_band(Product::new(1));
        assert_eq!(floor, Decimal::from(20));
        assert_eq!(ceiling, Decimal::from(80));
    }

    #[test]
    fn edge_level_classification() {
        assert!(make_view(0, 3).is_first_level());
        assert!(!make_view(0, 3).is_last_level());
        assert!(make_view(2, 3).is_last_level());
        assert!(!make_view(1, 3).is_first_level());
        assert!(!make_view(1, 3).is_last_level());
    }
}
