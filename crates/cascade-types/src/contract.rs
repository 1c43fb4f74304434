//! Contracts and their fixed-shape annotations.
//!
//! A contract is produced by the negotiation collaborator (or materialized
//! from an exogenous schedule), immutable once created, and only ever read
//! by the executor. The annotation is a fixed-shape record -- traded
//! product plus the buyer and seller parties -- validated when the draft
//! is constructed, so malformed trade descriptions never reach execution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ContractId};
use crate::product::Product;

/// Signing-step sentinel for a contract that was never signed.
///
/// Any negative signing step means void; this is the canonical value.
pub const NEVER_SIGNED: i64 = -1;

// ---------------------------------------------------------------------------
// Parties and roles
// ---------------------------------------------------------------------------

/// One side of a trade.
///
/// Besides factory agents, two implicit system endpoints exist: the
/// external supplier that raw material arrives from, and the external
/// consumer that final-product demand comes from. Exogenous schedules
/// materialize as contracts against these endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Party {
    /// A factory agent inside the simulation.
    Factory(AgentId),
    /// The implicit endpoint supplying raw material to the input level.
    ExternalSupplier,
    /// The implicit endpoint buying final output from the last level.
    ExternalConsumer,
}

impl Party {
    /// The agent id if this party is a factory.
    pub const fn factory(self) -> Option<AgentId> {
        match self {
            Self::Factory(id) => Some(id),
            Self::ExternalSupplier | Self::ExternalConsumer => None,
        }
    }

    /// Whether this party is one of the system endpoints.
    pub const fn is_external(self) -> bool {
        matches!(self, Self::ExternalSupplier | Self::ExternalConsumer)
    }
}

impl core::fmt::Display for Party {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Factory(id) => write!(f, "factory {id}"),
            Self::ExternalSupplier => write!(f, "external supplier"),
            Self::ExternalConsumer => write!(f, "external consumer"),
        }
    }
}

/// The role an agent plays in a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeRole {
    /// Pays money, receives goods.
    Buyer,
    /// Delivers goods, receives money.
    Seller,
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// Fixed-shape trade description attached to every contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAnnotation {
    /// The product being traded.
    pub product: Product,
    /// The party paying money and receiving goods.
    pub buyer: Party,
    /// The party delivering goods and receiving money.
    pub seller: Party,
}

impl ContractAnnotation {
    /// Create an annotation. Validation happens in [`ContractDraft::new`].
    pub const fn new(product: Product, buyer: Party, seller: Party) -> Self {
        Self {
            product,
            buyer,
            seller,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Validation failures when constructing a contract draft.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContractError {
    /// The contract carries no quantity.
    #[error("contract quantity must be positive")]
    ZeroQuantity,

    /// The unit price is negative.
    #[error("unit price must be non-negative, got {price}")]
    NegativeUnitPrice {
        /// The offending price.
        price: Decimal,
    },

    /// Buyer and seller are the same party.
    #[error("buyer and seller are the same party: {party}")]
    SamePartyBothSides {
        /// The party appearing on both sides.
        party: Party,
    },

    /// Both sides are system endpoints; no factory is involved.
    #[error("neither side of the contract is a factory")]
    BothSidesExternal,

    /// The external supplier endpoint only ever sells.
    #[error("external supplier cannot appear as buyer")]
    SupplierEndpointAsBuyer,

    /// The external consumer endpoint only ever buys.
    #[error("external consumer cannot appear as seller")]
    ConsumerEndpointAsSeller,
}

// ---------------------------------------------------------------------------
// Draft and contract
// ---------------------------------------------------------------------------

/// Validated trade terms awaiting registration.
///
/// The negotiation collaborator produces drafts; the world assigns the
/// [`ContractId`] and signing step when it registers them, which fixes
/// the creation order used for deterministic execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDraft {
    /// Units to be delivered.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Who trades what with whom.
    pub annotation: ContractAnnotation,
}

impl ContractDraft {
    /// Validate trade terms into a draft.
    pub fn new(
        quantity: u32,
        unit_price: Decimal,
        annotation: ContractAnnotation,
    ) -> Result<Self, ContractError> {
        if quantity == 0 {
            return Err(ContractError::ZeroQuantity);
        }
        if unit_price < Decimal::ZERO {
            return Err(ContractError::NegativeUnitPrice { price: unit_price });
        }
        if annotation.buyer == annotation.seller {
            return Err(ContractError::SamePartyBothSides {
                party: annotation.buyer,
            });
        }
        if annotation.buyer.is_external() && annotation.seller.is_external() {
            return Err(ContractError::BothSidesExternal);
        }
        if annotation.buyer == Party::ExternalSupplier {
            return Err(ContractError::SupplierEndpointAsBuyer);
        }
        if annotation.seller == Party::ExternalConsumer {
            return Err(ContractError::ConsumerEndpointAsSeller);
        }
        Ok(Self {
            quantity,
            unit_price,
            annotation,
        })
    }

    /// Register the draft as a contract with its id and signing step.
    pub const fn into_contract(self, id: ContractId, signed_at: i64) -> Contract {
        Contract {
            id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            signed_at,
            annotation: self.annotation,
        }
    }
}

/// A registered contract.
///
/// Immutable; the executor only reads it. `signed_at` below zero means
/// the contract was never signed and must not execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Registration id, in creation order.
    pub id: ContractId,
    /// Units to be delivered.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Step at which the contract was signed; negative means void.
    pub signed_at: i64,
    /// Who trades what with whom.
    pub annotation: ContractAnnotation,
}

impl Contract {
    /// Whether the contract was ever signed.
    pub const fn is_signed(&self) -> bool {
        self.signed_at >= 0
    }

    /// Whether this contract realizes scheduled exogenous supply.
    pub fn is_exogenous_supply(&self) -> bool {
        self.annotation.seller == Party::ExternalSupplier
    }

    /// Whether this contract realizes a scheduled exogenous sale.
    pub fn is_exogenous_sale(&self) -> bool {
        self.annotation.buyer == Party::ExternalConsumer
    }

    /// Whether both sides are factories.
    pub fn is_negotiated(&self) -> bool {
        !self.annotation.buyer.is_external() && !self.annotation.seller.is_external()
    }

    /// Total price for the full quantity, if it fits in a [`Decimal`].
    pub fn total_price(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.unit_price)
    }

    /// The role the given agent plays in this contract, if any.
    pub fn role_of(&self, agent: AgentId) -> Option<TradeRole> {
        if self.annotation.buyer == Party::Factory(agent) {
            Some(TradeRole::Buyer)
        } else if self.annotation.seller == Party::Factory(agent) {
            Some(TradeRole::Seller)
        } else {
            None
        }
    }
}
