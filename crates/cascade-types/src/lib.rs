//! Shared type definitions for the Cascade supply chain simulation.
//!
//! This crate is the single source of truth for the types that flow
//! between the ledger, market, and engine crates.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers (dense indices plus the run UUID)
//! - [`product`] -- Products, processes, and production ratios
//! - [`contract`] -- Contracts, parties, and fixed-shape annotations
//! - [`profile`] -- Immutable per-factory configuration
//! - [`events`] -- Structured run events (breaches, bankruptcies, voids)

pub mod contract;
pub mod events;
pub mod ids;
pub mod product;
pub mod profile;

// Re-export all public types at crate root for convenience.
pub use contract::{
    Contract, ContractAnnotation, ContractDraft, ContractError, NEVER_SIGNED, Party, TradeRole,
};
pub use events::{BreachKind, BreachRecord, VoidReason, WorldEvent};
pub use ids::{AgentId, ContractId, EntryId, RunId};
pub use product::{Process, Product, ProductionRatio};
pub use profile::{FactoryProfile, INFINITE_COST, ProfileError};
