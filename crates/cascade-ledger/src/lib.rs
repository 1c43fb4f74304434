//! Economic state and audit records for the Cascade simulation.
//!
//! Every unit of goods and every unit of money that moves during a run
//! passes through this crate. Factories hold their live state in a
//! [`FactoryLedger`]; the world records each movement in the append-only
//! [`TradeLog`]; the conservation checker verifies at each step boundary
//! that no goods appeared from or vanished into nothing.
//!
//! # Architecture
//!
//! The ledger crate provides three modules:
//!
//! - [`factory`] -- The [`FactoryLedger`]: per-agent balance, inventory,
//!   and bankruptcy flag with a checked mutation API.
//! - [`log`] -- The [`TradeLog`]: append-only entry log with typed
//!   recording methods and flow queries.
//! - [`conservation`] -- Goods conservation verification and anomaly
//!   detection.
//!
//! # Conservation Law
//!
//! Goods enter factory inventories only through exogenous supply,
//! shortfall purchases, and production yield; they leave only through
//! exogenous sales, production consumption, and end-of-step disposal.
//! Negotiated deliveries move goods between factories and net to zero.
//! For every step S and product P:
//!
//! ```text
//! closing(P) == opening(P) + sources(P, S) - sinks(P, S)
//! ```
//!
//! A violation produces a [`FlowAnomaly`] -- the simulation's most
//! critical integrity alert. The ledger never panics; it returns errors.
//!
//! # Double-Entry Bookkeeping
//!
//! Every entry moves exactly one asset along one axis -- goods or money
//! -- from a debit party to a credit party. A trade therefore produces
//! two entries: the goods leg and the payment leg. Entry kinds and their
//! expected endpoints:
//!
//! | Kind | Axis | From (debit) | To (credit) |
//! |------|------|--------------|-------------|
//! | `Delivery` | goods | Factory | Factory |
//! | `ExogenousSupply` | goods | Supplier | Factory |
//! | `ShortfallPurchase` | goods | Supplier | Factory |
//! | `ExogenousSale` | goods | Factory | Consumer |
//! | `ProductionConsume` | goods | Factory | outside |
//! | `ProductionYield` | goods | outside | Factory |
//! | `Disposal` | goods | Factory | outside |
//! | `TradePayment` | money | Factory | Factory |
//! | `SupplyPayment` | money | Factory | Supplier |
//! | `ShortfallPayment` | money | Factory | Supplier |
//! | `SalePayment` | money | Consumer | Factory |
//! | `ProductionCharge` | money | Factory | outside |
//! | `StorageCharge` | money | Factory | outside |
//! | `DeliveryPenalty` | money | Factory | outside |
//!
//! "Outside" means the movement has no counterparty inside the economy:
//! production consumes and creates goods, and operating charges leave
//! the economy entirely.
//!
//! # Usage
//!
//! ```
//! use cascade_ledger::TradeLog;
//! use cascade_ledger::conservation::ConservationResult;
//! use cascade_types::{AgentId, ContractId, Product};
//! use rust_decimal::Decimal;
//!
//! let mut log = TradeLog::new();
//! let miner = AgentId::new(0);
//!
//! // Scheduled raw material arrives at the input level.
//! log.record_exogenous_supply(0, ContractId::new(0), Product::new(0), 10, miner)
//!     .ok();
//! log.record_supply_payment(0, ContractId::new(0), Decimal::from(100), miner)
//!     .ok();
//!
//! // Internal transfers balance trivially for this step.
//! assert_eq!(log.verify_internal_balance(0), ConservationResult::Balanced);
//! ```

pub mod conservation;
pub mod factory;
pub mod log;

// Re-export primary types at crate root.
pub use conservation::{ConservationResult, GoodsTotals};
pub use factory::{FactoryLedger, FactorySnapshot};
pub use log::{EntryKind, EntryParams, LedgerEntry, TradeLog};

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use cascade_types::Product;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when mutating a ledger or recording log entries.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A goods entry must move at least one unit.
    #[error("goods entry quantity must be non-zero")]
    ZeroQuantity,

    /// A money entry must move a non-zero amount.
    #[error("money entry amount must be non-zero")]
    ZeroAmount,

    /// Money amounts are always recorded as positive transfers.
    #[error("money amount must be positive, got {amount}")]
    NegativeAmount {
        /// The invalid amount.
        amount: Decimal,
    },

    /// A goods entry did not name the product it moves.
    #[error("goods entry of kind {kind:?} is missing its product")]
    MissingProduct {
        /// The entry kind being recorded.
        kind: EntryKind,
    },

    /// An entry tried to carry both goods and money.
    #[error("entry of kind {kind:?} must move goods or money, not both")]
    MixedAxes {
        /// The entry kind being recorded.
        kind: EntryKind,
    },

    /// The debit/credit parties do not match the expected endpoints for
    /// the entry kind.
    #[error("invalid party for {kind:?} {side}: expected {expected}, got {actual}")]
    WrongParty {
        /// The entry kind being validated.
        kind: EntryKind,
        /// Which side of the entry ("debit" or "credit").
        side: &'static str,
        /// The expected endpoint class.
        expected: &'static str,
        /// The actual endpoint class.
        actual: &'static str,
    },

    /// A release asked for more units than the factory holds.
    #[error("insufficient inventory of {product}: requested {requested}, available {available}")]
    InsufficientInventory {
        /// The product being released.
        product: Product,
        /// Units the factory holds.
        available: u32,
        /// Units the caller asked for.
        requested: u32,
    },

    /// An inventory addition overflowed the per-product counter.
    #[error("inventory overflow for {product}")]
    InventoryOverflow {
        /// The product being received.
        product: Product,
    },

    /// A balance update overflowed the decimal range.
    #[error("balance arithmetic overflow")]
    BalanceOverflow,

    /// An internal error that should not occur in normal operation.
    #[error("internal ledger error: {0}")]
    InternalError(&'static str),
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A goods conservation violation detected during step verification.
///
/// This is the `FLOW_ANOMALY` alert. When the conservation check finds
/// that a product's closing inventory does not reconcile with its opening
/// inventory plus sources minus sinks, this struct captures the details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowAnomaly {
    /// The step where the anomaly was detected.
    pub step: u64,
    /// Per-product imbalance. For the internal balance check the pair is
    /// (`debit_total`, `credit_total`); for the full conservation check
    /// it is (`expected_closing`, `found_closing`).
    pub imbalances: BTreeMap<Product, (i64, i64)>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for FlowAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
