//! Structured run events.
//!
//! Breaches, bankruptcies, and voided contracts surface as events on the
//! run report, never as failures that abort the run. Events are plain
//! serializable data; external statistics tooling consumes them as-is.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::contract::Party;
use crate::ids::{AgentId, ContractId};
use crate::product::Product;

// ---------------------------------------------------------------------------
// Breaches
// ---------------------------------------------------------------------------

/// What kind of shortfall caused a breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreachKind {
    /// The seller held less inventory than the contract quantity.
    Inventory,
    /// The buyer could not pay for the full quantity without crossing
    /// the bankruptcy floor.
    Funds,
    /// Realized exogenous supply fell short of the schedule.
    MissingSupply,
    /// A scheduled exogenous sale could not be delivered in full.
    MissingDelivery,
}

/// Record of a commitment not fully honored at execution.
///
/// Non-fatal by design: the honorable portion executes and the deficit is
/// recorded here. `contract` is absent for schedule-level breaches
/// (missing exogenous supply has no contract of its own).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachRecord {
    /// Step at which the breach occurred.
    pub step: u64,
    /// The breached contract, if one exists.
    pub contract: Option<ContractId>,
    /// The kind of shortfall.
    pub kind: BreachKind,
    /// The party that failed to honor the commitment.
    pub responsible: Party,
    /// The party on the receiving end of the shortfall.
    pub victim: Party,
    /// The product concerned.
    pub product: Product,
    /// Units committed.
    pub committed: u32,
    /// Units not delivered or not paid for.
    pub deficit: u32,
    /// Normalized severity, `deficit / committed`, in [0, 1].
    pub level: Decimal,
}

impl BreachRecord {
    /// Normalized breach severity for a committed/deficit pair.
    ///
    /// Zero when nothing was committed.
    pub fn severity(committed: u32, deficit: u32) -> Decimal {
        if committed == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(deficit)
            .checked_div(Decimal::from(committed))
            .unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Voided contracts
// ---------------------------------------------------------------------------

/// Why a registered contract was dropped without execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoidReason {
    /// The contract was never signed.
    Unsigned,
    /// One party went bankrupt before execution.
    BankruptParty {
        /// The bankrupt party.
        agent: AgentId,
    },
    /// The annotation references an agent the world does not know.
    UnknownAgent {
        /// The unknown id.
        agent: AgentId,
    },
    /// A negotiated registration named a system endpoint as one side.
    ExternalEndpoint {
        /// The offending party.
        party: Party,
    },
    /// Buyer and seller do not sit on adjacent production levels.
    NotAdjacent {
        /// The annotated buyer.
        buyer: AgentId,
        /// The annotated seller.
        seller: AgentId,
    },
    /// The annotated product matches neither the seller's output nor the
    /// buyer's input.
    ProductMismatch {
        /// The annotated product.
        product: Product,
    },
}

// ---------------------------------------------------------------------------
// World events
// ---------------------------------------------------------------------------

/// One structured event on the run's output ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldEvent {
    /// A contract was registered and signed.
    ContractSigned {
        /// Step of registration.
        step: u64,
        /// The registered contract.
        contract: ContractId,
        /// Traded product.
        product: Product,
        /// Contracted units.
        quantity: u32,
        /// Price per unit.
        unit_price: Decimal,
        /// Paying side.
        buyer: Party,
        /// Delivering side.
        seller: Party,
    },
    /// A registered contract was dropped without execution.
    ContractVoided {
        /// Step at which the contract was dropped.
        step: u64,
        /// The dropped contract.
        contract: ContractId,
        /// Why it was dropped.
        reason: VoidReason,
    },
    /// A commitment was breached.
    Breach {
        /// The breach details.
        record: BreachRecord,
    },
    /// An agent crossed the bankruptcy floor.
    Bankruptcy {
        /// Step of the triggering balance update.
        step: u64,
        /// The newly bankrupt agent.
        agent: AgentId,
        /// Balance after the triggering update.
        balance: Decimal,
    },
}
