//! Immutable per-factory configuration.
//!
//! A [`FactoryProfile`] carries the production cost matrix and the four
//! exogenous schedule matrices. It is built once at world construction
//! and never mutated afterwards; every run-time question about a factory's
//! capabilities or scheduled exogenous flows is answered from here.
//!
//! Matrix shapes:
//!
//! | matrix | rows | columns |
//! |---|---|---|
//! | `costs` | production lines | processes |
//! | `external_supplies`, `external_supply_prices` | steps | products |
//! | `external_sales`, `external_sale_prices` | steps | products |

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::product::{Process, Product};

/// Sentinel cost meaning "this line cannot run this process".
///
/// Never participates in arithmetic; runnable-line filters exclude it
/// before any cost is summed.
pub const INFINITE_COST: u32 = u32::MAX;

/// Validation failures for a factory profile.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProfileError {
    /// The cost matrix has no production lines at all.
    #[error("profile has no production lines")]
    NoLines,

    /// A cost matrix row does not cover every process.
    #[error("cost row for line {line} covers {found} processes, expected {expected}")]
    RaggedCostMatrix {
        /// The offending line index.
        line: usize,
        /// Processes the chain defines.
        expected: usize,
        /// Processes the row actually covers.
        found: usize,
    },

    /// No line can run the factory's assigned process.
    #[error("no line can run {process}")]
    ProcessNotRunnable {
        /// The assigned process.
        process: Process,
    },

    /// A schedule matrix has the wrong number of step rows.
    #[error("{matrix} covers {found} steps, expected {expected}")]
    ScheduleSteps {
        /// Which schedule matrix is malformed.
        matrix: &'static str,
        /// Steps the run will execute.
        expected: u64,
        /// Steps the matrix actually covers.
        found: usize,
    },

    /// A schedule row does not cover every product.
    #[error("{matrix} row for step {step} covers {found} products, expected {expected}")]
    ScheduleProducts {
        /// Which schedule matrix is malformed.
        matrix: &'static str,
        /// The offending step row.
        step: usize,
        /// Products the chain defines.
        expected: usize,
        /// Products the row actually covers.
        found: usize,
    },

    /// A scheduled price is negative.
    #[error("{matrix} has negative price {price} at step {step}, product {product}")]
    NegativeSchedulePrice {
        /// Which schedule matrix is malformed.
        matrix: &'static str,
        /// The offending step row.
        step: usize,
        /// The offending product column.
        product: usize,
        /// The offending price.
        price: Decimal,
    },
}

/// Immutable configuration for one factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryProfile {
    /// Cost per produced unit for each line and process;
    /// [`INFINITE_COST`] marks a line that cannot run a process.
    pub costs: Vec<Vec<u32>>,
    /// Scheduled exogenous supply quantities per step and product.
    pub external_supplies: Vec<Vec<u32>>,
    /// Unit prices charged for scheduled exogenous supply.
    pub external_supply_prices: Vec<Vec<Decimal>>,
    /// Scheduled exogenous sale quantities per step and product.
    pub external_sales: Vec<Vec<u32>>,
    /// Unit prices credited for delivered exogenous sales.
    pub external_sale_prices: Vec<Vec<Decimal>>,
}

impl FactoryProfile {
    /// A profile with the given cost matrix and all-zero schedules.
    ///
    /// Interior factories have no exogenous flows; their schedules are
    /// zero everywhere. `n_steps` rows by `n_products` columns.
    pub fn with_zero_schedules(costs: Vec<Vec<u32>>, n_steps: usize, n_products: usize) -> Self {
        Self {
            costs,
            external_supplies: vec![vec![0; n_products]; n_steps],
            external_supply_prices: vec![vec![Decimal::ZERO; n_products]; n_steps],
            external_sales: vec![vec![0; n_products]; n_steps],
            external_sale_prices: vec![vec![Decimal::ZERO; n_products]; n_steps],
        }
    }

    /// Number of production lines.
    pub fn n_lines(&self) -> usize {
        self.costs.len()
    }

    /// Scheduled exogenous supply quantity at a step for a product.
    ///
    /// Out-of-range lookups read as zero; schedules are dense after
    /// validation, so this only happens past the end of the run.
    pub fn supply_at(&self, step: u64, product: Product) -> u32 {
        Self::quantity_at(&self.external_supplies, step, product)
    }

    /// Unit price of scheduled exogenous supply at a step for a product.
    pub fn supply_price_at(&self, step: u64, product: Product) -> Decimal {
        Self::price_at(&self.external_supply_prices, step, product)
    }

    /// Scheduled exogenous sale quantity at a step for a product.
    pub fn sale_at(&self, step: u64, product: Product) -> u32 {
        Self::quantity_at(&self.external_sales, step, product)
    }

    /// Unit price of a scheduled exogenous sale at a step for a product.
    pub fn sale_price_at(&self, step: u64, product: Product) -> Decimal {
        Self::price_at(&self.external_sale_prices, step, product)
    }

    /// The cost matrix column for one process, one entry per line.
    pub fn process_costs(&self, process: Process) -> Vec<u32> {
        let column = usize::try_from(process.index()).unwrap_or(usize::MAX);
        self.costs
            .iter()
            .map(|row| row.get(column).copied().unwrap_or(INFINITE_COST))
            .collect()
    }

    /// Validate the profile against the chain dimensions and the
    /// factory's assigned process.
    pub fn validate(
        &self,
        n_steps: u64,
        n_products: usize,
        process: Process,
    ) -> Result<(), ProfileError> {
        if self.costs.is_empty() {
            return Err(ProfileError::NoLines);
        }
        let n_processes = n_products.saturating_sub(1);
        for (line, row) in self.costs.iter().enumerate() {
            if row.len() != n_processes {
                return Err(ProfileError::RaggedCostMatrix {
                    line,
                    expected: n_processes,
                    found: row.len(),
                });
            }
        }
        if !self
            .process_costs(process)
            .iter()
            .any(|&cost| cost != INFINITE_COST)
        {
            return Err(ProfileError::ProcessNotRunnable { process });
        }

        Self::validate_quantity_schedule("external_supplies", &self.external_supplies, n_steps, n_products)?;
        Self::validate_quantity_schedule("external_sales", &self.external_sales, n_steps, n_products)?;
        Self::validate_price_schedule(
            "external_supply_prices",
            &self.external_supply_prices,
            n_steps,
            n_products,
        )?;
        Self::validate_price_schedule(
            "external_sale_prices",
            &self.external_sale_prices,
            n_steps,
            n_products,
        )?;
        Ok(())
    }

    fn quantity_at(matrix: &[Vec<u32>], step: u64, product: Product) -> u32 {
        let row = usize::try_from(step).unwrap_or(usize::MAX);
        let column = usize::try_from(product.level()).unwrap_or(usize::MAX);
        matrix
            .get(row)
            .and_then(|cells| cells.get(column))
            .copied()
            .unwrap_or(0)
    }

    fn price_at(matrix: &[Vec<Decimal>], step: u64, product: Product) -> Decimal {
        let row = usize::try_from(step).unwrap_or(usize::MAX);
        let column = usize::try_from(product.level()).unwrap_or(usize::MAX);
        matrix
            .get(row)
            .and_then(|cells| cells.get(column))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn validate_quantity_schedule(
        matrix_name: &'static str,
        matrix: &[Vec<u32>],
        n_steps: u64,
        n_products: usize,
    ) -> Result<(), ProfileError> {
        if u64::try_from(matrix.len()).unwrap_or(u64::MAX) != n_steps {
            return Err(ProfileError::ScheduleSteps {
                matrix: matrix_name,
                expected: n_steps,
                found: matrix.len(),
            });
        }
        for (step, row) in matrix.iter().enumerate() {
            if row.len() != n_products {
                return Err(ProfileError::ScheduleProducts {
                    matrix: matrix_name,
                    step,
                    expected: n_products,
                    found: row.len(),
                });
            }
        }
        Ok(())
    }

    fn validate_price_schedule(
        matrix_name: &'static str,
        matrix: &[Vec<Decimal>],
        n_steps: u64,
        n_products: usize,
    ) -> Result<(), ProfileError> {
        if u64::try_from(matrix.len()).unwrap_or(u64::MAX) != n_steps {
            return Err(ProfileError::ScheduleSteps {
                matrix: matrix_name,
                expected: n_steps,
                found: matrix.len(),
            });
        }
        for (step, row) in matrix.iter().enumerate() {
            if row.len() != n_products {
                return Err(ProfileError::ScheduleProducts {
                    matrix: matrix_name,
                    step,
                    expected: n_products,
                    found: row.len(),
                });
            }
            for (product, price) in row.iter().enumerate() {
                if *price < Decimal::ZERO {
                    return Err(ProfileError::NegativeSchedulePrice {
                        matrix: matrix_name,
                        step,
                        product,
                        price: *price,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn runnable_profile() -> FactoryProfile {
        // Two lines, two processes; both lines run process 0 only.
        let costs = vec![vec![3, INFINITE_COST], vec![5, INFINITE_COST]];
        FactoryProfile::with_zero_schedules(costs, 4, 3)
    }

    #[test]
    fn validates_runnable_process() {
        let profile = runnable_profile();
        assert!(profile.validate(4, 3, Process::new(0)).is_ok());
    }

    #[test]
    fn rejects_unrunnable_process() {
        let profile = runnable_profile();
        assert_eq!(
            profile.validate(4, 3, Process::new(1)),
            Err(ProfileError::ProcessNotRunnable {
                process: Process::new(1)
            })
        );
    }

    #[test]
    fn rejects_empty_cost_matrix() {
        let profile = FactoryProfile::with_zero_schedules(Vec::new(), 4, 3);
        assert_eq!(
            profile.validate(4, 3, Process::new(0)),
            Err(ProfileError::NoLines)
        );
    }

    #[test]
    fn rejects_ragged_cost_matrix() {
        let costs = vec![vec![3, 4], vec![5]];
        let profile = FactoryProfile::with_zero_schedules(costs, 4, 3);
        assert!(matches!(
            profile.validate(4, 3, Process::new(0)),
            Err(ProfileError::RaggedCostMatrix { line: 1, .. })
        ));
    }

    #[test]
    fn rejects_wrong_schedule_steps() {
        let profile = runnable_profile();
        assert!(matches!(
            profile.validate(9, 3, Process::new(0)),
            Err(ProfileError::ScheduleSteps { .. })
        ));
    }

    #[test]
    fn rejects_negative_schedule_price() {
        let mut profile = runnable_profile();
        *profile
            .external_supply_prices
            .get_mut(2)
            .and_then(|row| row.get_mut(0))
            .unwrap() = Decimal::from(-7);
        assert!(matches!(
            profile.validate(4, 3, Process::new(0)),
            Err(ProfileError::NegativeSchedulePrice {
                step: 2,
                product: 0,
                ..
            })
        ));
    }

    #[test]
    fn out_of_range_lookups_read_as_zero() {
        let profile = runnable_profile();
        assert_eq!(profile.supply_at(99, Product::new(0)), 0);
        assert_eq!(profile.sale_price_at(99, Product::new(2)), Decimal::ZERO);
    }

    #[test]
    fn process_costs_returns_column() {
        let profile = runnable_profile();
        assert_eq!(profile.process_costs(Process::new(0)), vec![3, 5]);
        assert_eq!(
            profile.process_costs(Process::new(1)),
            vec![INFINITE_COST, INFINITE_COST]
        );
    }
}
