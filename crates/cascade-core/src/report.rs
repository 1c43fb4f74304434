//! Serializable run reports.
//!
//! A [`RunReport`] is the complete artifact of one finished run: the
//! configuration that produced it, every step summary, every contract
//! with its terminal ruling, the event stream, final agent standings,
//! and the full trade log. Serialized as JSON the report is
//! self-contained: replaying the embedded config with the recorded
//! seed reproduces the run step for step.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cascade_ledger::LedgerEntry;
use cascade_market::StrategyKind;
use cascade_types::{AgentId, Contract, RunId, WorldEvent};

use crate::config::WorldConfig;
use crate::executor::{ContractOutcome, ContractStatus};
use crate::world::{RunEndReason, RunOutcome, StepSummary, World};

/// A registered contract paired with its terminal ruling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    /// The contract as registered.
    pub contract: Contract,
    /// How execution ended for it.
    pub status: ContractStatus,
    /// Units actually delivered against it.
    pub delivered: u32,
}

/// Final standing of one factory at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStanding {
    /// The factory.
    pub agent: AgentId,
    /// Its level in the production chain.
    pub level: u32,
    /// The strategy it traded with.
    pub strategy: StrategyKind,
    /// Closing balance.
    pub final_balance: Decimal,
    /// Whether it ended the run bankrupt.
    pub bankrupt: bool,
}

/// Complete serializable record of one run.
///
/// Everything an offline analysis needs: per-step aggregates, the
/// full contract book with rulings, the breach and bankruptcy event
/// stream, and the ledger-level trade log for unit-by-unit audits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique identifier for this run.
    pub run_id: RunId,
    /// The seed the world was built with.
    pub seed: u64,
    /// When this report was assembled.
    pub generated_at: DateTime<Utc>,
    /// Why the run ended.
    pub end_reason: RunEndReason,
    /// Number of steps executed.
    pub total_steps: u64,
    /// The full configuration, sufficient to replay the run.
    pub config: WorldConfig,
    /// Per-step summaries in step order.
    pub steps: Vec<StepSummary>,
    /// Final standing of every factory.
    pub standings: Vec<AgentStanding>,
    /// Every contract the world registered, with terminal rulings.
    pub contracts: Vec<ContractRecord>,
    /// The full world event stream.
    pub events: Vec<WorldEvent>,
    /// The full trade log.
    pub trade_log: Vec<LedgerEntry>,
}

impl RunReport {
    /// Assemble a report from a world and the outcome of its run.
    ///
    /// Contracts the executor never ruled on fall back to
    /// [`ContractStatus::Voided`] with zero delivered; once a step has
    /// run there are none, so the fallback only shows up for worlds
    /// reported before their first step.
    #[must_use]
    pub fn from_world(world: &World, outcome: &RunOutcome) -> Self {
        let topology = world.topology();
        let config = world.config();

        let standings = world
            .ledgers()
            .iter()
            .map(|(agent, ledger)| AgentStanding {
                agent: *agent,
                level: topology.level_of(*agent).unwrap_or(0),
                strategy: config
                    .strategy_kind_of(usize::try_from(agent.into_inner()).unwrap_or(usize::MAX)),
                final_balance: ledger.balance(),
                bankrupt: ledger.is_bankrupt(),
            })
            .collect();

        let contracts = world
            .contracts()
            .iter()
            .map(|contract| {
                let ruling = world.outcome_of(contract.id).unwrap_or(ContractOutcome {
                    status: ContractStatus::Voided,
                    delivered: 0,
                });
                ContractRecord {
                    contract: contract.clone(),
                    status: ruling.status,
                    delivered: ruling.delivered,
                }
            })
            .collect();

        Self {
            run_id: RunId::new(),
            seed: config.seed,
            generated_at: Utc::now(),
            end_reason: outcome.end_reason,
            total_steps: outcome.total_steps,
            config: config.clone(),
            steps: world.step_summaries().to_vec(),
            standings,
            contracts,
            events: world.events().to_vec(),
            trade_log: world.trade_log().all_entries().to_vec(),
        }
    }

    /// Number of contracts that ended in full execution.
    #[must_use]
    pub fn executed_contracts(&self) -> usize {
        self.contracts
            .iter()
            .filter(|record| record.status == ContractStatus::Executed)
            .count()
    }

    /// Standings of agents that ended the run bankrupt.
    pub fn bankrupt_agents(&self) -> impl Iterator<Item = &AgentStanding> {
        self.standings.iter().filter(|standing| standing.bankrupt)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_types::{FactoryProfile, INFINITE_COST};
    use rust_decimal_macros::dec;

    use crate::negotiation::SilentNegotiation;
    use crate::world::NoOpCallback;

    use super::*;

    /// Two levels, one agent each; three raw units arrive on step 0.
    fn reported_config(n_steps: u64) -> WorldConfig {
        let mut first = FactoryProfile::with_zero_schedules(
            vec![vec![2, INFINITE_COST]; 3],
            usize::try_from(n_steps).unwrap(),
            3,
        );
        *first
            .external_supplies
            .first_mut()
            .unwrap()
            .first_mut()
            .unwrap() = 3;
        *first
            .external_supply_prices
            .first_mut()
            .unwrap()
            .first_mut()
            .unwrap() = dec!(10);
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
    fn report_captures_the_whole_run() {
        let config = reported_config(2);
        let mut world = World::build(config).unwrap();
        let mut provider = SilentNegotiation::new();
        let mut callback = NoOpCallback;
        let outcome = world.run(&mut provider, &mut callback).unwrap();

        let report = RunReport::from_world(&world, &outcome);

        assert_eq!(report.seed, 42);
        assert_eq!(report.end_reason, RunEndReason::Completed);
        assert_eq!(report.total_steps, 2);
        assert_eq!(report.steps.len(), 2);

        assert_eq!(report.standings.len(), 2);
        let first = report.standings.first().unwrap();
        assert_eq!(first.agent, AgentId::new(0));
        assert_eq!(first.level, 0);
        assert_eq!(first.strategy, StrategyKind::DoNothing);
        // 1000 - 30 supply payment - 6 storage on the stranded units.
        assert_eq!(first.final_balance, dec!(964));
        assert!(!first.bankrupt);
        let second = report.standings.last().unwrap();
        assert_eq!(second.level, 1);
        assert_eq!(second.final_balance, dec!(1000));

        assert_eq!(report.contracts.len(), 1);
        let record = report.contracts.first().unwrap();
        assert_eq!(record.status, ContractStatus::Executed);
        assert_eq!(record.delivered, 3);
        assert_eq!(report.executed_contracts(), 1);
        assert_eq!(report.bankrupt_agents().count(), 0);

        assert!(!report.trade_log.is_empty());
    }

    #[test]
    fn report_before_the_first_step_is_empty() {
        let world = World::build(reported_config(2)).unwrap();
        let outcome = RunOutcome {
            end_reason: RunEndReason::Completed,
            final_summary: None,
            total_steps: 0,
        };

        let report = RunReport::from_world(&world, &outcome);

        assert_eq!(report.total_steps, 0);
        assert!(report.steps.is_empty());
        assert!(report.contracts.is_empty());
        assert!(report.events.is_empty());
        assert!(report.trade_log.is_empty());
        assert_eq!(report.standings.len(), 2);
        assert!(report
            .standings
            .iter()
            .all(|standing| standing.final_balance == dec!(1000)));
    }

    #[test]
    fn report_round_trips_through_json() {
        let config = reported_config(2);
        let mut world = World::build(config).unwrap();
        let mut provider = SilentNegotiation::new();
        let mut callback = NoOpCallback;
        let outcome = world.run(&mut provider, &mut callback).unwrap();
        let report = RunReport::from_world(&world, &outcome);

        let json = serde_json::to_string(&report).unwrap();
        let decoded: RunReport = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.run_id, report.run_id);
        assert_eq!(decoded.seed, report.seed);
        assert_eq!(decoded.total_steps, report.total_steps);
        assert_eq!(decoded.steps, report.steps);
        assert_eq!(decoded.standings, report.standings);
        assert_eq!(decoded.contracts, report.contracts);
        assert_eq!(decoded.trade_log, report.trade_log);
    }
}
