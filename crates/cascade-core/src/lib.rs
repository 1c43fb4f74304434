//! World loop, contract execution, and run orchestration for the
//! Cascade simulation.
//!
//! This crate owns the step cycle that turns signed contracts into
//! inventory and balance changes: exogenous inflow, the level-by-level
//! transfer and production sweep, exogenous delivery, settlement,
//! bankruptcy, and conservation verification.
//!
//! # Modules
//!
//! - [`clock`] -- Step clock with horizon tracking.
//! - [`config`] -- Configuration loading from `cascade-config.yaml`
//!   into strongly-typed structs.
//! - [`executor`] -- The staged contract execution pipeline.
//! - [`negotiation`] -- [`NegotiationProvider`] trait, trading-pair
//!   eligibility, and the built-in [`QuoteMatcher`].
//! - [`report`] -- The serializable [`RunReport`] run artifact.
//! - [`topology`] -- Chain layout: levels, products, and adjacency.
//! - [`world`] -- The [`World`]: build, step, and run to completion.
//! - [`worldgen`] -- Seeded random world generation.
//!
//! [`NegotiationProvider`]: negotiation::NegotiationProvider
//! [`QuoteMatcher`]: negotiation::QuoteMatcher
//! [`RunReport`]: report::RunReport
//! [`World`]: world::World

pub mod clock;
pub mod config;
pub mod executor;
pub mod negotiation;
pub mod report;
pub mod topology;
pub mod world;
pub mod worldgen;
