//! The world: one simulated supply chain and its step loop.
//!
//! [`World::build`] turns a validated [`WorldConfig`] into a live
//! economy: the chain topology, one ledger, cost model, and strategy
//! per factory, a seeded RNG, and the step clock. [`World::step`] then
//! runs one step end to end:
//!
//! 1. Materialize the step's exogenous contracts from the profiles.
//! 2. Build per-agent market views and the eligible trading pairs.
//! 3. Let the negotiation provider turn quotes into contract drafts.
//! 4. Register drafts, screening each against the chain structure.
//! 5. Execute the batch through the settlement pipeline.
//! 6. Feed realized outcomes back to the strategies and advance the
//!    clock.
//!
//! [`World::run`] wraps the step loop with termination handling: the
//! run ends when the clock reaches its horizon or when every factory
//! is bankrupt. A [`StepCallback`] observes each completed step.
//!
//! Identical configurations produce identical runs. All randomness
//! flows through the world's seeded RNG, ids are dense and assigned in
//! creation order, and every map is ordered.

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use cascade_ledger::{FactoryLedger, TradeLog};
use cascade_market::{
    ChainTotals, CostModel, FactoryStrategy, MarketView, StepExogenous, build_strategy,
};
use cascade_types::{
    AgentId, Contract, ContractAnnotation, ContractDraft, ContractId, FactoryProfile, NEVER_SIGNED,
    Party, Product, VoidReason, WorldEvent,
};

use crate::clock::{ClockError, StepClock};
use crate::config::{ConfigurationError, WorldConfig};
use crate::executor::{
    self, ContractOutcome, ContractStatus, EconomyState, ExecutionError, ExecutionPolicy,
};
use crate::negotiation::{NegotiationError, NegotiationProvider};
use crate::topology::ChainTopology;

/// Errors that can end a run early.
#[derive(Debug, Error)]
pub enum WorldError {
    /// The step clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The negotiation provider failed.
    #[error("negotiation failed at step {step}")]
    Negotiation {
        /// The step being negotiated.
        step: u64,
        /// The underlying negotiation error.
        #[source]
        source: NegotiationError,
    },

    /// The settlement pipeline failed.
    #[error("execution failed: {source}")]
    Execution {
        /// The underlying execution error.
        #[from]
        source: ExecutionError,
    },

    /// A step was requested after the run terminated.
    #[error("the run has already terminated")]
    AlreadyTerminated,
}

/// Lifecycle of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldPhase {
    /// Built, no step executed yet.
    Init,
    /// At least one step executed, horizon not reached.
    Running,
    /// The run is over; further steps are refused.
    Terminated,
}

/// Counters describing one completed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    /// The step that ran.
    pub step: u64,
    /// Negotiated contracts signed this step.
    pub contracts_signed: u32,
    /// Contracts that delivered at least one unit.
    pub trades_executed: u32,
    /// Breach events recorded this step.
    pub breaches: u32,
    /// Agents newly frozen this step.
    pub bankruptcies: u32,
    /// Agents still solvent after the step.
    pub active_agents: u32,
    /// Sum of all factory balances, bankrupt ones included.
    pub total_balance: Decimal,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEndReason {
    /// The clock reached its horizon.
    Completed,
    /// Every factory went bankrupt before the horizon.
    AllBankrupt,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Why the run ended.
    pub end_reason: RunEndReason,
    /// The last step summary, if any step completed.
    pub final_summary: Option<StepSummary>,
    /// Total steps executed.
    pub total_steps: u64,
}

/// Callback invoked after each step completes.
///
/// Implementations can use this to stream summaries, collect balance
/// trajectories, or snapshot world state mid-run.
pub trait StepCallback: Send {
    /// Called after a step completes successfully.
    fn on_step(&mut self, summary: &StepSummary, world: &World);
}

/// A no-op step callback.
pub struct NoOpCallback;

impl StepCallback for NoOpCallback {
    fn on_step(&mut self, _summary: &StepSummary, _world: &World) {}
}

/// One live simulation: economy state, strategies, clock, and history.
pub struct World {
    clock: StepClock,
    state: EconomyState,
    profiles: Vec<FactoryProfile>,
    strategies: BTreeMap<AgentId, Box<dyn FactoryStrategy>>,
    contracts: Vec<Contract>,
    outcomes: BTreeMap<ContractId, ContractOutcome>,
    events: Vec<WorldEvent>,
    step_summaries: Vec<StepSummary>,
    rng: SmallRng,
    phase: WorldPhase,
    config: WorldConfig,
}

impl World {
    /// Build a world from a configuration.
    ///
    /// Validates the configuration, lays the agents out on the chain,
    /// and gives each one a ledger at the initial balance, a cost model
    /// for its assigned process, and its configured strategy. The RNG
    /// is seeded from the configuration, so equal configs build equal
    /// worlds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when validation fails or a
    /// profile cannot back a cost model for its assigned process.
    pub fn build(config: WorldConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let catalog = config.effective_catalog();
        let n_processes = u32::try_from(config.n_processes()).unwrap_or(u32::MAX);
        let per_level = u32::try_from(config.agents_per_level()).unwrap_or(u32::MAX);
        let topology = ChainTopology::new(n_processes, per_level);

        let mut cost_models = BTreeMap::new();
        let mut ledgers = BTreeMap::new();
        let mut strategies = BTreeMap::new();
        for (index, profile) in config.profiles.iter().enumerate() {
            let agent = AgentId::new(u32::try_from(index).unwrap_or(u32::MAX));
            let Some(process) = topology.process_of(agent) else {
                continue;
            };
            let model = CostModel::new(profile, process)
                .map_err(|source| ConfigurationError::Cost { agent, source })?;
            cost_models.insert(agent, model);
            ledgers.insert(agent, FactoryLedger::new(agent, config.initial_balance));
            strategies.insert(
                agent,
                build_strategy(config.strategy_kind_of(index), config.strategy_params_of(index)),
            );
        }

        let policy = ExecutionPolicy {
            bankruptcy_limit: config.bankruptcy_limit,
            buy_missing_products: config.buy_missing_products,
            storage_cost: config.storage_cost,
            delivery_penalty: config.delivery_penalty,
            bankruptcy_gate: config.bankruptcy_gate,
            catalog_prices: catalog,
        };
        let state = EconomyState {
            topology,
            policy,
            ratios: config.ratios(),
            cost_models,
            ledgers,
            log: TradeLog::new(),
        };
        let clock = StepClock::new(config.n_steps)?;
        let rng = SmallRng::seed_from_u64(config.seed);
        let profiles = config.profiles.clone();

        info!(
            agents = config.n_agents(),
            levels = n_processes,
            steps = config.n_steps,
            seed = config.seed,
            "world built"
        );
        Ok(Self {
            clock,
            state,
            profiles,
            strategies,
            contracts: Vec::new(),
            outcomes: BTreeMap::new(),
            events: Vec::new(),
            step_summaries: Vec::new(),
            rng,
            phase: WorldPhase::Init,
            config,
        })
    }

    /// Execute one full step.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] when the run has already terminated, the
    /// provider fails, or the settlement pipeline hits a fatal error.
    pub fn step(&mut self, provider: &mut dyn NegotiationProvider) -> Result<StepSummary, WorldError> {
        if self.phase == WorldPhase::Terminated {
            return Err(WorldError::AlreadyTerminated);
        }
        self.phase = WorldPhase::Running;
        let step = self.clock.current_step();

        // --- Materialize the exogenous schedule ---
        let mut batch = self.materialize_exogenous(step);

        // --- Negotiate ---
        let views = self.build_views(step);
        let bankrupt: BTreeSet<AgentId> = self
            .state
            .ledgers
            .iter()
            .filter(|(_, ledger)| ledger.is_bankrupt())
            .map(|(&agent, _)| agent)
            .collect();
        let pairs = self.state.topology.eligible_pairs(&bankrupt);
        let drafts = provider
            .negotiate(step, &pairs, &views, &mut self.strategies, &mut self.rng)
            .map_err(|source| WorldError::Negotiation { step, source })?;

        // --- Register ---
        let contracts_signed = self.register_drafts(step, drafts, &views, &mut batch);

        // --- Execute ---
        let report = executor::apply_step(&mut self.state, step, &batch)?;

        // --- Feed back and record ---
        let breaches = report
            .events
            .iter()
            .filter(|event| matches!(event, WorldEvent::Breach { .. }))
            .count();
        let trades_executed = report
            .contract_outcomes
            .values()
            .filter(|outcome| outcome.delivered > 0)
            .count();
        for (agent, outcome) in &report.outcomes {
            let (Some(view), Some(strategy)) = (views.get(agent), self.strategies.get_mut(agent))
            else {
                continue;
            };
            strategy.on_step(view, outcome);
        }
        self.outcomes
            .extend(report.contract_outcomes.iter().map(|(&id, &outcome)| (id, outcome)));
        self.events.extend(report.events);

        // --- Summarize and advance ---
        let active_agents = count_as_u32(
            self.state
                .ledgers
                .values()
                .filter(|ledger| !ledger.is_bankrupt())
                .count(),
        );
        let total_balance = self
            .state
            .ledgers
            .values()
            .fold(Decimal::ZERO, |sum, ledger| {
                sum.saturating_add(ledger.balance())
            });
        let summary = StepSummary {
            step,
            contracts_signed,
            trades_executed: count_as_u32(trades_executed),
            breaches: count_as_u32(breaches),
            bankruptcies: count_as_u32(report.newly_bankrupt.len()),
            active_agents,
            total_balance,
        };
        info!(
            step,
            contracts = summary.contracts_signed,
            trades = summary.trades_executed,
            breaches = summary.breaches,
            active = summary.active_agents,
            "step complete"
        );
        self.step_summaries.push(summary.clone());

        self.clock.advance()?;
        if self.clock.is_finished() || active_agents == 0 {
            self.phase = WorldPhase::Terminated;
        }
        Ok(summary)
    }

    /// Run the step loop until a termination condition is met.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if any step fails unrecoverably.
    pub fn run(
        &mut self,
        provider: &mut dyn NegotiationProvider,
        callback: &mut dyn StepCallback,
    ) -> Result<RunOutcome, WorldError> {
        let mut total_steps: u64 = 0;
        info!(
            steps = self.clock.n_steps(),
            agents = self.state.ledgers.len(),
            "run starting"
        );

        loop {
            // --- Execute one step ---
            let summary = self.step(provider)?;
            total_steps = total_steps.saturating_add(1);

            // --- Notify callback ---
            callback.on_step(&summary, self);

            // --- Check elimination ---
            if summary.active_agents == 0 {
                info!(step = summary.step, "all agents bankrupt");
                return Ok(RunOutcome {
                    end_reason: RunEndReason::AllBankrupt,
                    final_summary: Some(summary),
                    total_steps,
                });
            }

            // --- Check horizon ---
            if self.clock.is_finished() {
                info!(steps = total_steps, "horizon reached");
                return Ok(RunOutcome {
                    end_reason: RunEndReason::Completed,
                    final_summary: Some(summary),
                    total_steps,
                });
            }
        }
    }

    // -----------------------------------------------------------------
    // Step internals
    // -----------------------------------------------------------------

    /// Turn the step's scheduled exogenous flows into pre-signed
    /// contracts. Each contract is registered in the world history and
    /// added to the execution batch.
    fn materialize_exogenous(&mut self, step: u64) -> Vec<Contract> {
        let mut batch = Vec::new();
        let topology = self.state.topology;
        let signed_at = step_timestamp(step);
        for agent in topology.all_agents() {
            if !self.is_active(agent) {
                continue;
            }
            let Some(profile) = self.profile_of(agent) else {
                continue;
            };
            let (Some(input), Some(output)) = (
                topology.input_product_of(agent),
                topology.output_product_of(agent),
            ) else {
                continue;
            };

            let supply_quantity = profile.supply_at(step, input);
            let supply_price = profile.supply_price_at(step, input);
            let sale_quantity = profile.sale_at(step, output);
            let sale_price = profile.sale_price_at(step, output);

            if supply_quantity > 0 {
                let annotation =
                    ContractAnnotation::new(input, Party::Factory(agent), Party::ExternalSupplier);
                self.push_exogenous(
                    step,
                    signed_at,
                    supply_quantity,
                    supply_price,
                    annotation,
                    &mut batch,
                );
            }
            if sale_quantity > 0 {
                let annotation =
                    ContractAnnotation::new(output, Party::ExternalConsumer, Party::Factory(agent));
                self.push_exogenous(
                    step,
                    signed_at,
                    sale_quantity,
                    sale_price,
                    annotation,
                    &mut batch,
                );
            }
        }
        batch
    }

    fn push_exogenous(
        &mut self,
        step: u64,
        signed_at: i64,
        quantity: u32,
        unit_price: Decimal,
        annotation: ContractAnnotation,
        batch: &mut Vec<Contract>,
    ) {
        match ContractDraft::new(quantity, unit_price, annotation) {
            Ok(draft) => {
                let contract = draft.into_contract(self.next_contract_id(), signed_at);
                self.contracts.push(contract.clone());
                batch.push(contract);
            }
            Err(error) => {
                // Profiles are validated at build; reaching this means
                // the schedule and the validator disagree.
                warn!(step, %error, "scheduled exogenous contract skipped");
            }
        }
    }

    /// Register negotiated drafts. Structurally sound drafts are signed
    /// and join the execution batch; the rest are recorded as rejected.
    /// Returns the number of signed contracts.
    fn register_drafts(
        &mut self,
        step: u64,
        drafts: Vec<ContractDraft>,
        views: &BTreeMap<AgentId, MarketView>,
        batch: &mut Vec<Contract>,
    ) -> u32 {
        let mut signed: u32 = 0;
        for draft in drafts {
            let id = self.next_contract_id();
            if let Some(reason) = self.rejection_reason(&draft) {
                warn!(step, contract = %id, reason = ?reason, "draft rejected at registration");
                self.outcomes.insert(
                    id,
                    ContractOutcome {
                        status: ContractStatus::Rejected,
                        delivered: 0,
                    },
                );
                self.events.push(WorldEvent::ContractVoided {
                    step,
                    contract: id,
                    reason,
                });
                self.contracts.push(draft.into_contract(id, NEVER_SIGNED));
                continue;
            }

            let contract = draft.into_contract(id, step_timestamp(step));
            self.events.push(WorldEvent::ContractSigned {
                step,
                contract: id,
                product: contract.annotation.product,
                quantity: contract.quantity,
                unit_price: contract.unit_price,
                buyer: contract.annotation.buyer,
                seller: contract.annotation.seller,
            });
            debug!(
                step,
                contract = %id,
                quantity = contract.quantity,
                %contract.unit_price,
                "contract signed"
            );
            for party in [contract.annotation.buyer, contract.annotation.seller] {
                let Some(agent) = party.factory() else {
                    continue;
                };
                let (Some(view), Some(strategy)) =
                    (views.get(&agent), self.strategies.get_mut(&agent))
                else {
                    continue;
                };
                strategy.on_contract_signed(view, &contract);
            }
            self.contracts.push(contract.clone());
            batch.push(contract);
            signed = signed.saturating_add(1);
        }
        signed
    }

    /// Why a draft cannot register, or `None` when it can.
    fn rejection_reason(&self, draft: &ContractDraft) -> Option<VoidReason> {
        let Some(buyer) = draft.annotation.buyer.factory() else {
            return Some(VoidReason::ExternalEndpoint {
                party: draft.annotation.buyer,
            });
        };
        let Some(seller) = draft.annotation.seller.factory() else {
            return Some(VoidReason::ExternalEndpoint {
                party: draft.annotation.seller,
            });
        };
        let topology = self.state.topology;
        let Some(buyer_level) = topology.level_of(buyer) else {
            return Some(VoidReason::UnknownAgent { agent: buyer });
        };
        let Some(seller_level) = topology.level_of(seller) else {
            return Some(VoidReason::UnknownAgent { agent: seller });
        };
        if buyer_level != seller_level.saturating_add(1) {
            return Some(VoidReason::NotAdjacent { buyer, seller });
        }
        if topology.output_product_of(seller) != Some(draft.annotation.product) {
            return Some(VoidReason::ProductMismatch {
                product: draft.annotation.product,
            });
        }
        None
    }

    /// Build the read-only market view for every solvent agent.
    fn build_views(&self, step: u64) -> BTreeMap<AgentId, MarketView> {
        let topology = self.state.topology;
        let policy = &self.state.policy;
        let chain_totals = self.chain_totals(step);
        let mut views = BTreeMap::new();
        for agent in topology.all_agents() {
            let Some(ledger) = self.state.ledgers.get(&agent) else {
                continue;
            };
            if ledger.is_bankrupt() {
                continue;
            }
            let Some(profile) = self.profile_of(agent) else {
                continue;
            };
            let (Some(level), Some(input), Some(output)) = (
                topology.level_of(agent),
                topology.input_product_of(agent),
                topology.output_product_of(agent),
            ) else {
                continue;
            };
            let exogenous = StepExogenous {
                supply_quantity: profile.supply_at(step, input),
                supply_price: profile.supply_price_at(step, input),
                sale_quantity: profile.sale_at(step, output),
                sale_price: profile.sale_price_at(step, output),
            };
            views.insert(
                agent,
                MarketView {
                    agent,
                    level,
                    input_product: input,
                    output_product: output,
                    n_products: topology.n_levels().saturating_add(1),
                    n_processes: topology.n_levels(),
                    profile: profile.clone(),
                    ledger: ledger.snapshot(),
                    step,
                    n_steps: self.clock.n_steps(),
                    catalog_prices: policy.catalog_prices.clone(),
                    storage_cost: policy.storage_cost,
                    delivery_penalty: policy.delivery_penalty,
                    exogenous,
                    suppliers: topology.suppliers_of(agent),
                    consumers: topology.consumers_of(agent),
                    chain_totals,
                },
            );
        }
        views
    }

    /// Chain-wide exogenous totals for the step: scheduled supply into
    /// the first level and scheduled sales out of the last, counting
    /// solvent agents only.
    fn chain_totals(&self, step: u64) -> ChainTotals {
        let topology = self.state.topology;
        let raw = Product::new(0);
        let final_product = Product::new(topology.n_levels());
        let last_level = topology.n_levels().saturating_sub(1);
        let mut totals = ChainTotals::default();
        for agent in topology.agents_at_level(0) {
            if !self.is_active(agent) {
                continue;
            }
            let Some(profile) = self.profile_of(agent) else {
                continue;
            };
            totals.exogenous_supply = totals
                .exogenous_supply
                .saturating_add(u64::from(profile.supply_at(step, raw)));
        }
        for agent in topology.agents_at_level(last_level) {
            if !self.is_active(agent) {
                continue;
            }
            let Some(profile) = self.profile_of(agent) else {
                continue;
            };
            totals.exogenous_sales = totals
                .exogenous_sales
                .saturating_add(u64::from(profile.sale_at(step, final_product)));
        }
        totals
    }

    fn is_active(&self, agent: AgentId) -> bool {
        self.state
            .ledgers
            .get(&agent)
            .is_some_and(|ledger| !ledger.is_bankrupt())
    }

    fn profile_of(&self, agent: AgentId) -> Option<&FactoryProfile> {
        self.profiles
            .get(usize::try_from(agent.into_inner()).unwrap_or(usize::MAX))
    }

    fn next_contract_id(&self) -> ContractId {
        ContractId::new(u32::try_from(self.contracts.len()).unwrap_or(u32::MAX))
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// The step the world will execute next.
    #[must_use]
    pub const fn current_step(&self) -> u64 {
        self.clock.current_step()
    }

    /// Where the world is in its lifecycle.
    #[must_use]
    pub const fn phase(&self) -> WorldPhase {
        self.phase
    }

    /// The configuration the world was built from.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The chain layout.
    #[must_use]
    pub const fn topology(&self) -> ChainTopology {
        self.state.topology
    }

    /// One factory's ledger.
    #[must_use]
    pub fn ledger(&self, agent: AgentId) -> Option<&FactoryLedger> {
        self.state.ledgers.get(&agent)
    }

    /// All factory ledgers, keyed by agent.
    #[must_use]
    pub const fn ledgers(&self) -> &BTreeMap<AgentId, FactoryLedger> {
        &self.state.ledgers
    }

    /// The append-only movement log.
    #[must_use]
    pub const fn trade_log(&self) -> &TradeLog {
        &self.state.log
    }

    /// Every event the run has emitted, in order.
    #[must_use]
    pub fn events(&self) -> &[WorldEvent] {
        &self.events
    }

    /// Every contract registered so far, in id order.
    #[must_use]
    pub fn contracts(&self) -> &[Contract] {
        &self.contracts
    }

    /// The terminal outcome of a contract, once known.
    #[must_use]
    pub fn outcome_of(&self, contract: ContractId) -> Option<ContractOutcome> {
        self.outcomes.get(&contract).copied()
    }

    /// Summaries of every completed step.
    #[must_use]
    pub fn step_summaries(&self) -> &[StepSummary] {
        &self.step_summaries
    }
}

/// Log the run end sequence after [`World::run`] returns.
pub fn log_run_end(outcome: &RunOutcome) {
    info!(
        reason = ?outcome.end_reason,
        total_steps = outcome.total_steps,
        final_step = outcome.final_summary.as_ref().map(|summary| summary.step),
        "run ended"
    );
    if let Some(ref summary) = outcome.final_summary {
        info!(
            step = summary.step,
            active_agents = summary.active_agents,
            total_balance = %summary.total_balance,
            "final step summary"
        );
    } else {
        warn!("run ended with no steps executed");
    }
}

fn step_timestamp(step: u64) -> i64 {
    i64::try_from(step).unwrap_or(i64::MAX)
}

fn count_as_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_types::INFINITE_COST;
    use rust_decimal_macros::dec;

    use crate::negotiation::SilentNegotiation;

    use super::*;

    /// A two-level, one-agent-per-level config with zero schedules.
    fn quiet_config(n_steps: u64) -> WorldConfig {
        let first = FactoryProfile::with_zero_schedules(
            vec![vec![2, INFINITE_COST]; 3],
            usize::try_from(n_steps).unwrap(),
            3,
        );
        let second = FactoryProfile::with_zero_schedules(
            vec![vec![INFINITE_COST, 2]; 3],
            usize::try_from(n_steps).unwrap(),
            3,
        );
        WorldConfig {
            profiles: vec![first, second],
            n_steps,
            ..WorldConfig::default()
        }
    }

    #[test]
    fn build_rejects_empty_rosters() {
        let config = WorldConfig::default();
        assert!(matches!(
            World::build(config),
            Err(ConfigurationError::NoAgents)
        ));
    }

    #[test]
    fn build_lays_out_the_chain() {
        let world = World::build(quiet_config(5)).unwrap();
        assert_eq!(world.phase(), WorldPhase::Init);
        assert_eq!(world.current_step(), 0);
        assert_eq!(world.topology().n_levels(), 2);
        assert_eq!(world.ledgers().len(), 2);
        assert_eq!(
            world.ledger(AgentId::new(0)).unwrap().balance(),
            dec!(1000)
        );
    }

    #[test]
    fn quiet_step_leaves_balances_alone() {
        let mut world = World::build(quiet_config(3)).unwrap();
        let mut provider = SilentNegotiation::new();

        let summary = world.step(&mut provider).unwrap();

        assert_eq!(summary.step, 0);
        assert_eq!(summary.contracts_signed, 0);
        assert_eq!(summary.trades_executed, 0);
        assert_eq!(summary.breaches, 0);
        assert_eq!(summary.active_agents, 2);
        assert_eq!(summary.total_balance, dec!(2000));
        assert_eq!(world.phase(), WorldPhase::Running);
        assert_eq!(world.current_step(), 1);
    }

    #[test]
    fn stepping_past_the_horizon_is_refused() {
        let mut world = World::build(quiet_config(1)).unwrap();
        let mut provider = SilentNegotiation::new();

        world.step(&mut provider).unwrap();
        assert_eq!(world.phase(), WorldPhase::Terminated);
        assert!(matches!(
            world.step(&mut provider),
            Err(WorldError::AlreadyTerminated)
        ));
    }

    #[test]
    fn run_completes_at_the_horizon() {
        let mut world = World::build(quiet_config(4)).unwrap();
        let mut provider = SilentNegotiation::new();
        let mut callback = NoOpCallback;

        let outcome = world.run(&mut provider, &mut callback).unwrap();

        assert_eq!(outcome.end_reason, RunEndReason::Completed);
        assert_eq!(outcome.total_steps, 4);
        assert_eq!(outcome.final_summary.unwrap().step, 3);
        assert_eq!(world.step_summaries().len(), 4);
    }

    #[test]
    fn scheduled_supply_becomes_a_contract() {
        let mut config = quiet_config(2);
        // Three raw units at 10 arrive for the first agent on step 0.
        let profile = config.profiles.first_mut().unwrap();
        *profile
            .external_supplies
            .first_mut()
            .unwrap()
            .first_mut()
            .unwrap() = 3;
        *profile
            .external_supply_prices
            .first_mut()
            .unwrap()
            .first_mut()
            .unwrap() = dec!(10);

        let mut world = World::build(config).unwrap();
        let mut provider = SilentNegotiation::new();
        let summary = world.step(&mut provider).unwrap();

        assert_eq!(summary.trades_executed, 1);
        assert_eq!(world.contracts().len(), 1);
        let contract = world.contracts().first().unwrap();
        assert!(contract.is_exogenous_supply());
        let outcome = world.outcome_of(contract.id).unwrap();
        assert_eq!(outcome.status, ContractStatus::Executed);
        assert_eq!(outcome.delivered, 3);
        // 1000 - 30 supply - 6 storage on the disposed units.
        assert_eq!(
            world.ledger(AgentId::new(0)).unwrap().balance(),
            dec!(964)
        );
    }

    #[test]
    fn rejected_draft_touches_nothing() {
        let mut world = World::build(quiet_config(2)).unwrap();
        // Same-level endpoints cannot trade.
        let draft = ContractDraft::new(
            2,
            dec!(10),
            ContractAnnotation::new(
                Product::new(1),
                Party::Factory(AgentId::new(1)),
                Party::Factory(AgentId::new(1)),
            ),
        );
        assert!(draft.is_err());

        let draft = ContractDraft::new(
            2,
            dec!(10),
            ContractAnnotation::new(
                Product::new(1),
                Party::Factory(AgentId::new(0)),
                Party::Factory(AgentId::new(1)),
            ),
        )
        .unwrap();
        let reason = world.rejection_reason(&draft);
        assert!(matches!(reason, Some(VoidReason::NotAdjacent { .. })));

        let views = world.build_views(0);
        let mut batch = Vec::new();
        let signed = world.register_drafts(0, vec![draft], &views, &mut batch);
        assert_eq!(signed, 0);
        assert!(batch.is_empty());
        assert_eq!(world.contracts().len(), 1);
        let outcome = world.outcome_of(ContractId::new(0)).unwrap();
        assert_eq!(outcome.status, ContractStatus::Rejected);
    }

    #[test]
    fn unknown_agent_draft_is_rejected() {
        let world = World::build(quiet_config(2)).unwrap();
        let draft = ContractDraft::new(
            2,
            dec!(10),
            ContractAnnotation::new(
                Product::new(1),
                Party::Factory(AgentId::new(7)),
                Party::Factory(AgentId::new(0)),
            ),
        )
        .unwrap();
        assert!(matches!(
            world.rejection_reason(&draft),
            Some(VoidReason::UnknownAgent { agent }) if agent == AgentId::new(7)
        ));
    }

    #[test]
    fn product_mismatch_draft_is_rejected() {
        let world = World::build(quiet_config(2)).unwrap();
        let draft = ContractDraft::new(
            2,
            dec!(10),
            ContractAnnotation::new(
                Product::new(2),
                Party::Factory(AgentId::new(1)),
                Party::Factory(AgentId::new(0)),
            ),
        )
        .unwrap();
        assert!(matches!(
            world.rejection_reason(&draft),
            Some(VoidReason::ProductMismatch { product }) if product == Product::new(2)
        ));
    }
}
