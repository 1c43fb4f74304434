//! Per-factory production cost model.
//!
//! A [`CostModel`] is derived from a factory's cost matrix and its
//! assigned process at world build time. It answers the three questions
//! production accounting asks every step:
//!
//! 1. How many runs can this factory execute? (one run per runnable line)
//! 2. What does one unit cost at the margin? (cheapest line, feeds the
//!    utility formula)
//! 3. What do `k` runs cost in total? (cheapest lines first, one run
//!    each)
//!
//! Lines whose cost cell is [`INFINITE_COST`] cannot run the process and
//! are excluded before any arithmetic happens.

use rust_decimal::Decimal;

use cascade_types::{FactoryProfile, INFINITE_COST, Process};

/// Failures when deriving a cost model from a profile.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CostError {
    /// Every line of the cost matrix carries the infinite sentinel for
    /// the assigned process.
    #[error("no line can run {process}")]
    NoRunnableLine {
        /// The process the factory was assigned.
        process: Process,
    },
}

/// Production cost schedule for one factory and its assigned process.
///
/// Holds the runnable lines' per-run costs sorted ascending, so the
/// cheapest-lines-first charging rule is a prefix sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostModel {
    process: Process,
    line_costs: Vec<u32>,
}

impl CostModel {
    /// Derive the cost model for `process` from a profile's cost matrix.
    ///
    /// Filters out lines that cannot run the process and sorts the rest
    /// by cost. At least one line must be runnable.
    pub fn new(profile: &FactoryProfile, process: Process) -> Result<Self, CostError> {
        let mut line_costs: Vec<u32> = profile
            .process_costs(process)
            .into_iter()
            .filter(|&cost| cost != INFINITE_COST)
            .collect();
        if line_costs.is_empty() {
            return Err(CostError::NoRunnableLine { process });
        }
        line_costs.sort_unstable();
        Ok(Self {
            process,
            line_costs,
        })
    }

    /// The process this model prices.
    pub const fn process(&self) -> Process {
        self.process
    }

    /// Maximum production runs per step: one run per runnable line.
    pub fn capacity(&self) -> u32 {
        u32::try_from(self.line_costs.len()).unwrap_or(u32::MAX)
    }

    /// Per-run costs of the runnable lines, cheapest first.
    pub fn line_costs(&self) -> &[u32] {
        &self.line_costs
    }

    /// Marginal cost of the cheapest runnable line.
    ///
    /// This is the `production_cost` rate the utility formula applies to
    /// every converted unit.
    pub fn unit_cost(&self) -> Decimal {
        self.line_costs
            .first()
            .copied()
            .map_or(Decimal::ZERO, Decimal::from)
    }

    /// Total cost of `runs` production runs, cheapest lines first.
    ///
    /// Runs beyond [`Self::capacity`] cost nothing because no line exists
    /// to execute them; callers bound their requests by capacity.
    pub fn cost_of_runs(&self, runs: u32) -> Decimal {
        let take = usize::try_from(runs).unwrap_or(usize::MAX);
        self.line_costs
            .iter()
            .take(take)
            .fold(Decimal::ZERO, |total, &cost| {
                total.saturating_add(Decimal::from(cost))
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn make_model(costs: Vec<Vec<u32>>, process: Process) -> Result<CostModel, CostError> {
        let profile = FactoryProfile::with_zero_schedules(costs, 1, 3);
        CostModel::new(&profile, process)
    }

    #[test]
    fn sorts_runnable_lines_by_cost() {
        let model = make_model(
            vec![vec![5, INFINITE_COST], vec![2, 1], vec![INFINITE_COST, 4]],
            Process::new(0),
        )
        .unwrap();
        assert_eq!(model.line_costs(), &[2, 5]);
        assert_eq!(model.capacity(), 2);
    }

    #[test]
    fn rejects_profile_with_no_runnable_line() {
        let result = make_model(
            vec![vec![INFINITE_COST, 3], vec![INFINITE_COST, 7]],
            Process::new(0),
        );
        assert_eq!(
            result,
            Err(CostError::NoRunnableLine {
                process: Process::new(0)
            })
        );
    }

    #[test]
    fn unit_cost_is_cheapest_line() {
        let model = make_model(vec![vec![6, 9], vec![3, 9], vec![4, 9]], Process::new(0)).unwrap();
        assert_eq!(model.unit_cost(), Decimal::from(3));
    }

    #[test]
    fn cost_of_runs_charges_cheapest_lines_first() {
        let model = make_model(vec![vec![6, 9], vec![3, 9], vec![4, 9]], Process::new(0)).unwrap();
        assert_eq!(model.cost_of_runs(0), Decimal::ZERO);
        assert_eq!(model.cost_of_runs(1), Decimal::from(3));
        assert_eq!(model.cost_of_runs(2), Decimal::from(7));
        assert_eq!(model.cost_of_runs(3), Decimal::from(13));
    }

    #[test]
    fn cost_of_runs_saturates_at_capacity() {
        let model = make_model(vec![vec![2, 9]], Process::new(0)).unwrap();
        assert_eq!(model.cost_of_runs(50), Decimal::from(2));
    }
}
