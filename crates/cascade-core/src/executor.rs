//! Contract execution: the settlement pipeline that turns one step's
//! contract batch into ledger movements.
//!
//! [`apply_step`] runs the batch through a fixed sequence of stages:
//!
//! 1. **Order and screen** -- sort the batch by creation order (then
//!    buyer, then seller) and void contracts that are unsigned or name
//!    a bankrupt or unknown party. Output commitments per seller are
//!    tallied here so production knows what to aim for.
//! 2. **Exogenous inflow** -- scheduled raw material arrives in full
//!    and is charged in full, even past the bankruptcy floor.
//! 3. **Transfers and production** -- a sweep from raw to final: for
//!    each level, negotiated deliveries of its input product execute
//!    first, then its factories produce toward their commitments.
//!    Interleaving the two lets goods cross the whole chain inside a
//!    single step. Deliveries are capped by seller inventory and buyer
//!    funds; every shortfall is recorded as a breach, never an error.
//! 4. **Exogenous delivery** -- scheduled sales leave output
//!    inventories, bounded by what is actually on hand.
//! 5. **Settlement** -- a penalty per unit of unmet output commitment,
//!    a storage charge per residual unit, then disposal of whatever
//!    remains. Inventories are empty between steps.
//! 6. **Bankruptcy check** -- agents whose balance moved this step and
//!    now sits at or below the floor are frozen. An optional breach
//!    gate also freezes agents whose quantity mismatch is too large.
//! 7. **Conservation guarantee** -- the trade log must reconcile, both
//!    internally and against the inventory snapshots taken around the
//!    step. A violation aborts the run.
//!
//! Shortfalls degrade gracefully; only ledger corruption and
//! conservation anomalies are fatal.

use std::collections::{BTreeMap, BTreeSet};

use cascade_ledger::{
    ConservationResult, FactoryLedger, FlowAnomaly, GoodsTotals, LedgerError, TradeLog,
};
use cascade_market::{CostModel, StepOutcome, breach_level};
use cascade_types::{
    AgentId, BreachKind, BreachRecord, Contract, ContractId, Party, Product, ProductionRatio,
    VoidReason, WorldEvent,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::topology::ChainTopology;

/// When an agent is declared bankrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankruptcyGate {
    /// Freeze an agent whose balance reaches the floor after a step
    /// that moved its money. This is the default.
    #[default]
    BalanceOnly,
    /// Additionally freeze an agent whose goods flow was too lopsided,
    /// measured as `|qin - qout| / max(qin, qout)` over the step.
    /// Agents that moved no goods at all are never gated this way.
    BreachLevel {
        /// Mismatch ratio at or above which the agent is frozen.
        threshold: Decimal,
    },
}

/// Execution-time knobs shared by every agent.
///
/// Read-only during a step; the world builds one from its configuration
/// and the effective catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Balance at or below which a touched agent is frozen.
    pub bankruptcy_limit: Decimal,
    /// Whether production may purchase missing input at catalog price
    /// instead of running short.
    pub buy_missing_products: bool,
    /// Charge per residual inventory unit at settlement.
    pub storage_cost: Decimal,
    /// Charge per unit of unmet output commitment at settlement.
    pub delivery_penalty: Decimal,
    /// When agents are declared bankrupt.
    pub bankruptcy_gate: BankruptcyGate,
    /// Reference price per product, indexed by product level. Used for
    /// shortfall purchases.
    pub catalog_prices: Vec<Decimal>,
}

impl ExecutionPolicy {
    /// The catalog price of `product`, or zero when the catalog does
    /// not cover it.
    #[must_use]
    pub fn catalog_price(&self, product: Product) -> Decimal {
        usize::try_from(product.level())
            .ok()
            .and_then(|index| self.catalog_prices.get(index))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// Everything the executor reads and writes for one world.
///
/// The world owns one of these for the whole run; executor unit tests
/// build them in memory from hand-made ledgers and cost models.
#[derive(Debug)]
pub struct EconomyState {
    /// The production chain layout.
    pub topology: ChainTopology,
    /// Execution-time knobs.
    pub policy: ExecutionPolicy,
    /// Input/output ratio per process, indexed by process.
    pub ratios: Vec<ProductionRatio>,
    /// Per-agent production cost model.
    pub cost_models: BTreeMap<AgentId, CostModel>,
    /// Per-agent balance and inventory.
    pub ledgers: BTreeMap<AgentId, FactoryLedger>,
    /// The append-only movement log backing conservation checks.
    pub log: TradeLog,
}

/// How a contract fared at execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// The full quantity moved.
    Executed,
    /// Some of the quantity moved; the deficit became a breach. A
    /// delivery of zero still counts here when the contract was valid.
    PartiallyExecuted,
    /// Screened out at execution time without touching any ledger.
    Voided,
    /// Refused at registration time; never entered a batch.
    Rejected,
}

/// Terminal status and realized quantity for one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractOutcome {
    /// How the contract ended.
    pub status: ContractStatus,
    /// Units actually delivered.
    pub delivered: u32,
}

/// What one step of execution did, agent by agent and contract by
/// contract.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// The step that was executed.
    pub step: u64,
    /// Terminal outcome per contract in the batch.
    pub contract_outcomes: BTreeMap<ContractId, ContractOutcome>,
    /// Realized flows per agent alive at the start of the step.
    pub outcomes: BTreeMap<AgentId, StepOutcome>,
    /// Breaches, voids, and bankruptcies in occurrence order.
    pub events: Vec<WorldEvent>,
    /// Agents frozen by this step's bankruptcy check.
    pub newly_bankrupt: Vec<AgentId>,
}

/// A fatal execution failure. Breaches are events, not errors; this
/// type covers ledger corruption and conservation violations only.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A ledger operation failed mid-step.
    #[error("ledger failure at step {step}")]
    Ledger {
        /// The step being executed.
        step: u64,
        /// The underlying ledger error.
        #[source]
        source: LedgerError,
    },

    /// The post-step conservation check found imbalanced goods flows.
    #[error("goods conservation violated at step {step}: {anomaly}")]
    Conservation {
        /// The step being executed.
        step: u64,
        /// The detected imbalance.
        anomaly: FlowAnomaly,
    },
}

/// Executes one step's contract batch against the economy.
///
/// The batch may arrive in any order and may mix negotiated and
/// exogenous contracts; stage 1 imposes the canonical order. On success
/// the state reflects the whole step and the report describes it. On
/// error the state must be discarded, because a partially applied step
/// is not meaningful.
///
/// # Errors
///
/// Returns [`ExecutionError`] when a ledger rejects a movement the
/// pipeline believed valid, or when the conservation check fails.
pub fn apply_step(
    state: &mut EconomyState,
    step: u64,
    contracts: &[Contract],
) -> Result<ExecutionReport, ExecutionError> {
    let mut work = StepWork::new(state, step);

    // --- Stage 1: Order and screen ---
    let batch = stage_order(state, &mut work, contracts);

    // --- Stage 2: Exogenous inflow ---
    stage_exogenous_inflow(state, &mut work, &batch)?;

    // --- Stage 3: Transfers and production, level by level ---
    stage_level_sweep(state, &mut work, &batch)?;

    // --- Stage 4: Exogenous delivery ---
    stage_exogenous_delivery(state, &mut work, &batch)?;

    // --- Stage 5: Settlement ---
    stage_settlement(state, &mut work)?;

    // --- Stage 6: Bankruptcy check ---
    stage_bankruptcy(state, &mut work);

    // --- Stage 7: Conservation guarantee ---
    verify_flows(state, &work)?;

    Ok(build_report(state, work))
}

// ---------------------------------------------------------------------------
// Per-step working set
// ---------------------------------------------------------------------------

/// Mutable scratch state threaded through the stages of one step.
#[derive(Debug)]
struct StepWork {
    step: u64,
    /// Agents already frozen when the step began. They are skipped
    /// everywhere and excluded from the report.
    bankrupt_at_start: BTreeSet<AgentId>,
    /// Output units each agent stands behind this step, from valid
    /// contracts where it is the seller.
    commitments: BTreeMap<AgentId, u32>,
    flows: BTreeMap<AgentId, AgentFlows>,
    contract_outcomes: BTreeMap<ContractId, ContractOutcome>,
    events: Vec<WorldEvent>,
    newly_bankrupt: Vec<AgentId>,
    /// Inventory totals before the step, for the conservation check.
    opening: GoodsTotals,
    opening_balances: BTreeMap<AgentId, Decimal>,
}

impl StepWork {
    fn new(state: &EconomyState, step: u64) -> Self {
        let opening = inventory_totals(&state.ledgers);
        let opening_balances = state
            .ledgers
            .iter()
            .map(|(&agent, ledger)| (agent, ledger.balance()))
            .collect();
        let bankrupt_at_start = state
            .ledgers
            .iter()
            .filter(|(_, ledger)| ledger.is_bankrupt())
            .map(|(&agent, _)| agent)
            .collect();
        Self {
            step,
            bankrupt_at_start,
            commitments: BTreeMap::new(),
            flows: BTreeMap::new(),
            contract_outcomes: BTreeMap::new(),
            events: Vec::new(),
            newly_bankrupt: Vec::new(),
            opening,
            opening_balances,
        }
    }
}

/// Accumulated goods and money movement for one agent in one step.
#[derive(Debug, Clone, Default)]
struct AgentFlows {
    qin: u32,
    pin: Decimal,
    qout: u32,
    pout: Decimal,
    produced: u32,
    production_charge: Decimal,
    storage_charge: Decimal,
    delivery_charge: Decimal,
    /// Whether any money moved. Only touched agents face the balance
    /// bankruptcy check.
    touched: bool,
}

impl AgentFlows {
    fn add_inflow(&mut self, quantity: u32, amount: Decimal) {
        self.qin = self.qin.saturating_add(quantity);
        self.pin = self.pin.saturating_add(amount);
        if amount > Decimal::ZERO {
            self.touched = true;
        }
    }

    fn add_outflow(&mut self, quantity: u32, amount: Decimal) {
        self.qout = self.qout.saturating_add(quantity);
        self.pout = self.pout.saturating_add(amount);
        if amount > Decimal::ZERO {
            self.touched = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 1: Order and screen
// ---------------------------------------------------------------------------

/// Sorts the batch into canonical order, voids what cannot execute,
/// and tallies output commitments for the survivors.
fn stage_order(state: &EconomyState, work: &mut StepWork, contracts: &[Contract]) -> Vec<Contract> {
    let mut batch: Vec<Contract> = contracts.to_vec();
    batch.sort_by_key(|contract| {
        (
            contract.id,
            contract.annotation.buyer,
            contract.annotation.seller,
        )
    });

    let mut valid = Vec::with_capacity(batch.len());
    for contract in batch {
        if let Some(reason) = void_reason(state, &contract) {
            debug!(
                step = work.step,
                contract = %contract.id,
                reason = ?reason,
                "contract voided before execution"
            );
            work.contract_outcomes.insert(
                contract.id,
                ContractOutcome {
                    status: ContractStatus::Voided,
                    delivered: 0,
                },
            );
            work.events.push(WorldEvent::ContractVoided {
                step: work.step,
                contract: contract.id,
                reason,
            });
            continue;
        }
        if let Some(seller) = contract.annotation.seller.factory() {
            let committed = work.commitments.entry(seller).or_insert(0);
            *committed = committed.saturating_add(contract.quantity);
        }
        valid.push(contract);
    }
    valid
}

fn void_reason(state: &EconomyState, contract: &Contract) -> Option<VoidReason> {
    if !contract.is_signed() {
        return Some(VoidReason::Unsigned);
    }
    for party in [contract.annotation.buyer, contract.annotation.seller] {
        if let Some(agent) = party.factory() {
            match state.ledgers.get(&agent) {
                None => return Some(VoidReason::UnknownAgent { agent }),
                Some(ledger) if ledger.is_bankrupt() => {
                    return Some(VoidReason::BankruptParty { agent });
                }
                Some(_) => {}
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Stage 2: Exogenous inflow
// ---------------------------------------------------------------------------

/// Delivers scheduled supply in full and charges for it in full. The
/// charge ignores the bankruptcy floor; an agent can be driven under by
/// its own supply schedule, which is what the bankruptcy check is for.
fn stage_exogenous_inflow(
    state: &mut EconomyState,
    work: &mut StepWork,
    batch: &[Contract],
) -> Result<(), ExecutionError> {
    let step = work.step;
    for contract in batch.iter().filter(|c| c.is_exogenous_supply()) {
        let Some(buyer) = contract.annotation.buyer.factory() else {
            return Err(missing(step, "exogenous supply without a factory buyer"));
        };
        let product = contract.annotation.product;
        let quantity = contract.quantity;
        let amount = contract.total_price().ok_or_else(|| money_overflow(step))?;

        let ledger = state
            .ledgers
            .get_mut(&buyer)
            .ok_or_else(|| missing(step, "buyer ledger absent for screened contract"))?;
        if quantity > 0 {
            ledger.receive(product, quantity).map_err(ledger_err(step))?;
            state
                .log
                .record_exogenous_supply(step, contract.id, product, quantity, buyer)
                .map_err(ledger_err(step))?;
        }
        if amount > Decimal::ZERO {
            let ledger = state
                .ledgers
                .get_mut(&buyer)
                .ok_or_else(|| missing(step, "buyer ledger absent for screened contract"))?;
            ledger.charge(amount).map_err(ledger_err(step))?;
            state
                .log
                .record_supply_payment(step, contract.id, amount, buyer)
                .map_err(ledger_err(step))?;
        }

        work.flows.entry(buyer).or_default().add_inflow(quantity, amount);
        work.contract_outcomes.insert(
            contract.id,
            ContractOutcome {
                status: ContractStatus::Executed,
                delivered: quantity,
            },
        );
        debug!(
            step,
            contract = %contract.id,
            agent = %buyer,
            quantity,
            %amount,
            "exogenous supply delivered"
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage 3: Transfers and production
// ---------------------------------------------------------------------------

/// Sweeps the chain from raw to final. At each level, negotiated
/// deliveries of that level's input product execute first, then the
/// level's factories produce. Raw material can therefore become final
/// product within one step.
fn stage_level_sweep(
    state: &mut EconomyState,
    work: &mut StepWork,
    batch: &[Contract],
) -> Result<(), ExecutionError> {
    let topology = state.topology;
    for level in 0..topology.n_levels() {
        let inbound = Product::new(level);
        for contract in batch
            .iter()
            .filter(|c| c.is_negotiated() && c.annotation.product == inbound)
        {
            execute_transfer(state, work, contract)?;
        }
        for agent in topology.agents_at_level(level) {
            produce_at(state, work, agent)?;
        }
    }
    Ok(())
}

/// Moves goods and money for one negotiated contract. The delivered
/// quantity is the contract quantity capped by seller inventory and by
/// what the buyer can pay without crossing the bankruptcy floor; each
/// cap that binds produces a breach against the responsible side.
#[allow(clippy::too_many_lines)]
fn execute_transfer(
    state: &mut EconomyState,
    work: &mut StepWork,
    contract: &Contract,
) -> Result<(), ExecutionError> {
    let step = work.step;
    let (Some(seller), Some(buyer)) = (
        contract.annotation.seller.factory(),
        contract.annotation.buyer.factory(),
    ) else {
        return Err(missing(step, "negotiated contract with an external party"));
    };
    let product = contract.annotation.product;
    let quantity = contract.quantity;
    let unit_price = contract.unit_price;

    // Both caps read before either ledger is mutated.
    let seller_stock = state
        .ledgers
        .get(&seller)
        .map_or(0, |ledger| ledger.quantity_of(product));
    let headroom = state.ledgers.get(&buyer).map_or(Decimal::ZERO, |ledger| {
        ledger.balance().saturating_sub(state.policy.bankruptcy_limit)
    });
    let affordable = affordable_units(headroom, unit_price, quantity);
    let delivered = quantity.min(seller_stock).min(affordable);

    if seller_stock < quantity {
        let deficit = quantity.saturating_sub(seller_stock);
        push_breach(
            work,
            BreachRecord {
                step,
                contract: Some(contract.id),
                kind: BreachKind::Inventory,
                responsible: Party::Factory(seller),
                victim: Party::Factory(buyer),
                product,
                committed: quantity,
                deficit,
                level: BreachRecord::severity(quantity, deficit),
            },
        );
    }
    if affordable < quantity {
        let deficit = quantity.saturating_sub(affordable);
        push_breach(
            work,
            BreachRecord {
                step,
                contract: Some(contract.id),
                kind: BreachKind::Funds,
                responsible: Party::Factory(buyer),
                victim: Party::Factory(seller),
                product,
                committed: quantity,
                deficit,
                level: BreachRecord::severity(quantity, deficit),
            },
        );
    }

    if delivered > 0 {
        let amount = unit_price
            .checked_mul(Decimal::from(delivered))
            .ok_or_else(|| money_overflow(step))?;

        let seller_ledger = state
            .ledgers
            .get_mut(&seller)
            .ok_or_else(|| missing(step, "seller ledger absent for screened contract"))?;
        seller_ledger
            .release(product, delivered)
            .map_err(ledger_err(step))?;
        if amount > Decimal::ZERO {
            seller_ledger.credit(amount).map_err(ledger_err(step))?;
        }

        let buyer_ledger = state
            .ledgers
            .get_mut(&buyer)
            .ok_or_else(|| missing(step, "buyer ledger absent for screened contract"))?;
        buyer_ledger
            .receive(product, delivered)
            .map_err(ledger_err(step))?;
        if amount > Decimal::ZERO {
            buyer_ledger.charge(amount).map_err(ledger_err(step))?;
        }

        state
            .log
            .record_delivery(step, contract.id, product, delivered, seller, buyer)
            .map_err(ledger_err(step))?;
        if amount > Decimal::ZERO {
            state
                .log
                .record_trade_payment(step, contract.id, amount, buyer, seller)
                .map_err(ledger_err(step))?;
        }

        work.flows.entry(seller).or_default().add_outflow(delivered, amount);
        work.flows.entry(buyer).or_default().add_inflow(delivered, amount);
        debug!(
            step,
            contract = %contract.id,
            seller = %seller,
            buyer = %buyer,
            delivered,
            %amount,
            "negotiated delivery executed"
        );
    }

    let status = if delivered == quantity {
        ContractStatus::Executed
    } else {
        ContractStatus::PartiallyExecuted
    };
    work.contract_outcomes
        .insert(contract.id, ContractOutcome { status, delivered });
    Ok(())
}

/// Runs one agent's production toward its output commitment. Input
/// shortfalls either trigger a catalog-price purchase (when the policy
/// allows it) or a `MissingSupply` breach and a reduced run count.
#[allow(clippy::too_many_lines)]
fn produce_at(
    state: &mut EconomyState,
    work: &mut StepWork,
    agent: AgentId,
) -> Result<(), ExecutionError> {
    let step = work.step;
    if work.bankrupt_at_start.contains(&agent) {
        return Ok(());
    }
    let commitment = work.commitments.get(&agent).copied().unwrap_or(0);
    if commitment == 0 {
        return Ok(());
    }
    let Some(process) = state.topology.process_of(agent) else {
        return Err(missing(step, "agent outside the chain topology"));
    };
    let ratio = usize::try_from(process.index())
        .ok()
        .and_then(|index| state.ratios.get(index))
        .copied()
        .ok_or_else(|| missing(step, "production ratio absent for process"))?;
    let capacity = state
        .cost_models
        .get(&agent)
        .map_or(0, CostModel::capacity);

    let runs_wanted = ratio.runs_for_output(commitment).min(capacity);
    if runs_wanted == 0 {
        return Ok(());
    }
    let input = process.input();
    let output = process.output();
    let input_needed = ratio.input_for_runs(runs_wanted);
    let available = state
        .ledgers
        .get(&agent)
        .map_or(0, |ledger| ledger.quantity_of(input));

    let runs = if available >= input_needed {
        runs_wanted
    } else if state.policy.buy_missing_products {
        let gap = input_needed.saturating_sub(available);
        let cost = state
            .policy
            .catalog_price(input)
            .checked_mul(Decimal::from(gap))
            .ok_or_else(|| money_overflow(step))?;
        let ledger = state
            .ledgers
            .get_mut(&agent)
            .ok_or_else(|| missing(step, "ledger absent for producing agent"))?;
        ledger.receive(input, gap).map_err(ledger_err(step))?;
        state
            .log
            .record_shortfall_purchase(step, input, gap, agent)
            .map_err(ledger_err(step))?;
        if cost > Decimal::ZERO {
            let ledger = state
                .ledgers
                .get_mut(&agent)
                .ok_or_else(|| missing(step, "ledger absent for producing agent"))?;
            ledger.charge(cost).map_err(ledger_err(step))?;
            state
                .log
                .record_shortfall_payment(step, cost, agent)
                .map_err(ledger_err(step))?;
        }
        work.flows.entry(agent).or_default().add_inflow(gap, cost);
        debug!(step, agent = %agent, gap, %cost, "missing input bought at catalog price");
        runs_wanted
    } else {
        let gap = input_needed.saturating_sub(available);
        push_breach(
            work,
            BreachRecord {
                step,
                contract: None,
                kind: BreachKind::MissingSupply,
                responsible: Party::ExternalSupplier,
                victim: Party::Factory(agent),
                product: input,
                committed: input_needed,
                deficit: gap,
                level: BreachRecord::severity(input_needed, gap),
            },
        );
        ratio.runs_from_input(available).min(runs_wanted)
    };
    if runs == 0 {
        return Ok(());
    }

    let consumed = ratio.input_for_runs(runs);
    let yielded = ratio.output_for_runs(runs);
    let charge = state
        .cost_models
        .get(&agent)
        .map_or(Decimal::ZERO, |model| model.cost_of_runs(runs));

    let ledger = state
        .ledgers
        .get_mut(&agent)
        .ok_or_else(|| missing(step, "ledger absent for producing agent"))?;
    if consumed > 0 {
        ledger.release(input, consumed).map_err(ledger_err(step))?;
        state
            .log
            .record_production_consume(step, input, consumed, agent)
            .map_err(ledger_err(step))?;
    }
    if yielded > 0 {
        let ledger = state
            .ledgers
            .get_mut(&agent)
            .ok_or_else(|| missing(step, "ledger absent for producing agent"))?;
        ledger.receive(output, yielded).map_err(ledger_err(step))?;
        state
            .log
            .record_production_yield(step, output, yielded, agent)
            .map_err(ledger_err(step))?;
    }
    if charge > Decimal::ZERO {
        let ledger = state
            .ledgers
            .get_mut(&agent)
            .ok_or_else(|| missing(step, "ledger absent for producing agent"))?;
        ledger.charge(charge).map_err(ledger_err(step))?;
        state
            .log
            .record_production_charge(step, charge, agent)
            .map_err(ledger_err(step))?;
    }

    let flows = work.flows.entry(agent).or_default();
    flows.produced = flows.produced.saturating_add(yielded);
    flows.production_charge = flows.production_charge.saturating_add(charge);
    if charge > Decimal::ZERO {
        flows.touched = true;
    }
    debug!(step, agent = %agent, runs, yielded, %charge, "production run complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage 4: Exogenous delivery
// ---------------------------------------------------------------------------

/// Ships scheduled sales out of output inventory. Unlike inflow, the
/// shipment is bounded by what the agent actually holds; the consumer
/// pays only for delivered units and the shortfall becomes a
/// `MissingDelivery` breach.
fn stage_exogenous_delivery(
    state: &mut EconomyState,
    work: &mut StepWork,
    batch: &[Contract],
) -> Result<(), ExecutionError> {
    let step = work.step;
    for contract in batch.iter().filter(|c| c.is_exogenous_sale()) {
        let Some(seller) = contract.annotation.seller.factory() else {
            return Err(missing(step, "exogenous sale without a factory seller"));
        };
        let product = contract.annotation.product;
        let quantity = contract.quantity;

        let stock = state
            .ledgers
            .get(&seller)
            .map_or(0, |ledger| ledger.quantity_of(product));
        let delivered = quantity.min(stock);

        if delivered < quantity {
            let deficit = quantity.saturating_sub(delivered);
            push_breach(
                work,
                BreachRecord {
                    step,
                    contract: Some(contract.id),
                    kind: BreachKind::MissingDelivery,
                    responsible: Party::Factory(seller),
                    victim: Party::ExternalConsumer,
                    product,
                    committed: quantity,
                    deficit,
                    level: BreachRecord::severity(quantity, deficit),
                },
            );
        }

        if delivered > 0 {
            let amount = contract
                .unit_price
                .checked_mul(Decimal::from(delivered))
                .ok_or_else(|| money_overflow(step))?;
            let ledger = state
                .ledgers
                .get_mut(&seller)
                .ok_or_else(|| missing(step, "seller ledger absent for screened contract"))?;
            ledger.release(product, delivered).map_err(ledger_err(step))?;
            state
                .log
                .record_exogenous_sale(step, contract.id, product, delivered, seller)
                .map_err(ledger_err(step))?;
            if amount > Decimal::ZERO {
                let ledger = state
                    .ledgers
                    .get_mut(&seller)
                    .ok_or_else(|| missing(step, "seller ledger absent for screened contract"))?;
                ledger.credit(amount).map_err(ledger_err(step))?;
                state
                    .log
                    .record_sale_payment(step, contract.id, amount, seller)
                    .map_err(ledger_err(step))?;
            }
            work.flows.entry(seller).or_default().add_outflow(delivered, amount);
            debug!(
                step,
                contract = %contract.id,
                agent = %seller,
                delivered,
                %amount,
                "exogenous sale shipped"
            );
        }

        let status = if delivered == quantity {
            ContractStatus::Executed
        } else {
            ContractStatus::PartiallyExecuted
        };
        work.contract_outcomes
            .insert(contract.id, ContractOutcome { status, delivered });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage 5: Settlement
// ---------------------------------------------------------------------------

/// Charges the delivery penalty on unmet commitments and storage on
/// whatever is still held, then disposes of all residual inventory.
/// Every step starts from empty shelves.
fn stage_settlement(state: &mut EconomyState, work: &mut StepWork) -> Result<(), ExecutionError> {
    let step = work.step;
    let topology = state.topology;
    for agent in topology.all_agents() {
        if work.bankrupt_at_start.contains(&agent) {
            continue;
        }
        let committed = work.commitments.get(&agent).copied().unwrap_or(0);
        let shipped = work.flows.get(&agent).map_or(0, |flows| flows.qout);
        let unmet = committed.saturating_sub(shipped);

        let leftovers: Vec<(Product, u32)> = state.ledgers.get(&agent).map_or_else(Vec::new, |l| {
            l.inventory().iter().map(|(&p, &q)| (p, q)).collect()
        });
        let residual = leftovers
            .iter()
            .fold(0_u64, |sum, &(_, q)| sum.saturating_add(u64::from(q)));

        if unmet > 0 {
            let penalty = state
                .policy
                .delivery_penalty
                .checked_mul(Decimal::from(unmet))
                .ok_or_else(|| money_overflow(step))?;
            if penalty > Decimal::ZERO {
                let ledger = state
                    .ledgers
                    .get_mut(&agent)
                    .ok_or_else(|| missing(step, "ledger absent at settlement"))?;
                ledger.charge(penalty).map_err(ledger_err(step))?;
                state
                    .log
                    .record_delivery_penalty(step, penalty, agent)
                    .map_err(ledger_err(step))?;
                let flows = work.flows.entry(agent).or_default();
                flows.delivery_charge = flows.delivery_charge.saturating_add(penalty);
                flows.touched = true;
                debug!(step, agent = %agent, unmet, %penalty, "delivery penalty charged");
            }
        }

        if residual > 0 {
            let storage = state
                .policy
                .storage_cost
                .checked_mul(Decimal::from(residual))
                .ok_or_else(|| money_overflow(step))?;
            if storage > Decimal::ZERO {
                let ledger = state
                    .ledgers
                    .get_mut(&agent)
                    .ok_or_else(|| missing(step, "ledger absent at settlement"))?;
                ledger.charge(storage).map_err(ledger_err(step))?;
                state
                    .log
                    .record_storage_charge(step, storage, agent)
                    .map_err(ledger_err(step))?;
                let flows = work.flows.entry(agent).or_default();
                flows.storage_charge = flows.storage_charge.saturating_add(storage);
                flows.touched = true;
                debug!(step, agent = %agent, residual, %storage, "storage charged");
            }
        }

        for (product, _) in leftovers {
            let Some(ledger) = state.ledgers.get_mut(&agent) else {
                continue;
            };
            let drained = ledger.drain(product);
            if drained > 0 {
                state
                    .log
                    .record_disposal(step, product, drained, agent)
                    .map_err(ledger_err(step))?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage 6: Bankruptcy
// ---------------------------------------------------------------------------

/// Freezes agents at or below the balance floor, and under the breach
/// gate also agents whose goods flow was too lopsided. Only agents the
/// step actually touched are examined for balance; untouched agents
/// keep whatever balance they had.
fn stage_bankruptcy(state: &mut EconomyState, work: &mut StepWork) {
    let limit = state.policy.bankruptcy_limit;
    let gate = state.policy.bankruptcy_gate;
    let topology = state.topology;
    for agent in topology.all_agents() {
        let Some(ledger) = state.ledgers.get_mut(&agent) else {
            continue;
        };
        if ledger.is_bankrupt() {
            continue;
        }
        let flows = work.flows.get(&agent);
        let touched = flows.is_some_and(|f| f.touched);
        let under_floor = touched && ledger.balance() <= limit;
        let over_gate = match gate {
            BankruptcyGate::BalanceOnly => false,
            BankruptcyGate::BreachLevel { threshold } => flows.is_some_and(|f| {
                (f.qin > 0 || f.qout > 0) && breach_level(f.qin, f.qout) >= threshold
            }),
        };
        if under_floor || over_gate {
            ledger.mark_bankrupt();
            let balance = ledger.balance();
            warn!(step = work.step, agent = %agent, %balance, "agent bankrupt");
            work.events.push(WorldEvent::Bankruptcy {
                step: work.step,
                agent,
                balance,
            });
            work.newly_bankrupt.push(agent);
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 7: Conservation
// ---------------------------------------------------------------------------

fn verify_flows(state: &EconomyState, work: &StepWork) -> Result<(), ExecutionError> {
    let step = work.step;
    if let ConservationResult::Anomaly(anomaly) = state.log.verify_internal_balance(step) {
        return Err(ExecutionError::Conservation { step, anomaly });
    }
    let closing = inventory_totals(&state.ledgers);
    if let ConservationResult::Anomaly(anomaly) =
        state.log.verify_conservation(step, &work.opening, &closing)
    {
        return Err(ExecutionError::Conservation { step, anomaly });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Report assembly and helpers
// ---------------------------------------------------------------------------

fn build_report(state: &EconomyState, work: StepWork) -> ExecutionReport {
    let mut outcomes = BTreeMap::new();
    for agent in state.topology.all_agents() {
        if work.bankrupt_at_start.contains(&agent) {
            continue;
        }
        let flows = work.flows.get(&agent).cloned().unwrap_or_default();
        let closing = state
            .ledgers
            .get(&agent)
            .map_or(Decimal::ZERO, FactoryLedger::balance);
        let opening = work
            .opening_balances
            .get(&agent)
            .copied()
            .unwrap_or(Decimal::ZERO);
        outcomes.insert(
            agent,
            StepOutcome {
                step: work.step,
                qin: flows.qin,
                pin: flows.pin,
                qout: flows.qout,
                pout: flows.pout,
                produced: flows.produced,
                production_charge: flows.production_charge,
                storage_charge: flows.storage_charge,
                delivery_charge: flows.delivery_charge,
                profit: closing.saturating_sub(opening),
            },
        );
    }
    ExecutionReport {
        step: work.step,
        contract_outcomes: work.contract_outcomes,
        outcomes,
        events: work.events,
        newly_bankrupt: work.newly_bankrupt,
    }
}

/// Units the buyer can pay for without its balance crossing the floor.
/// A non-positive unit price never constrains the purchase.
fn affordable_units(headroom: Decimal, unit_price: Decimal, requested: u32) -> u32 {
    if unit_price <= Decimal::ZERO {
        return requested;
    }
    if headroom <= Decimal::ZERO {
        return 0;
    }
    let units = headroom
        .checked_div(unit_price)
        .unwrap_or(Decimal::ZERO)
        .floor();
    units.to_u32().map_or(requested, |u| u.min(requested))
}

fn push_breach(work: &mut StepWork, record: BreachRecord) {
    warn!(
        step = record.step,
        kind = ?record.kind,
        responsible = %record.responsible,
        committed = record.committed,
        deficit = record.deficit,
        "commitment breached"
    );
    work.events.push(WorldEvent::Breach { record });
}

fn inventory_totals(ledgers: &BTreeMap<AgentId, FactoryLedger>) -> GoodsTotals {
    let mut totals = GoodsTotals::new();
    for ledger in ledgers.values() {
        for (&product, &quantity) in ledger.inventory() {
            let entry = totals.entry(product).or_insert(0);
            *entry = entry.saturating_add(u64::from(quantity));
        }
    }
    totals
}

fn ledger_err(step: u64) -> impl FnOnce(LedgerError) -> ExecutionError {
    move |source| ExecutionError::Ledger { step, source }
}

const fn missing(step: u64, what: &'static str) -> ExecutionError {
    ExecutionError::Ledger {
        step,
        source: LedgerError::InternalError(what),
    }
}

const fn money_overflow(step: u64) -> ExecutionError {
    ExecutionError::Ledger {
        step,
        source: LedgerError::BalanceOverflow,
    }
}
