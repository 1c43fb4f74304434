//! Products, processes, and production ratios.
//!
//! The supply chain is a linear transformation chain: product 0 is the
//! raw input, product `n_processes` the final output, and process `p`
//! turns product `p` into product `p+1`. A factory is configured to run
//! exactly one process, which fixes its input and output products.

use serde::{Deserialize, Serialize};

/// A product level in the production chain.
///
/// Level 0 is the raw input; the highest level is the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Product(pub u32);

impl Product {
    /// Create a product from its chain level.
    pub const fn new(level: u32) -> Self {
        Self(level)
    }

    /// Return the chain level.
    pub const fn level(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for Product {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A production process in the chain.
///
/// Process `p` consumes product `p` and yields product `p+1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Process(pub u32);

impl Process {
    /// Create a process from its chain position.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Return the chain position.
    pub const fn index(self) -> u32 {
        self.0
    }

    /// The product this process consumes.
    pub const fn input(self) -> Product {
        Product(self.0)
    }

    /// The product this process yields.
    pub const fn output(self) -> Product {
        Product(self.0.saturating_add(1))
    }
}

impl core::fmt::Display for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "proc{}", self.0)
    }
}

/// Units consumed and yielded by one production run of a process.
///
/// The default 1:1 ratio gives the unit chain; other ratios let a single
/// run consume or yield several units at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRatio {
    /// Input units consumed per run.
    pub inputs_per_run: u32,
    /// Output units yielded per run.
    pub outputs_per_run: u32,
}

impl ProductionRatio {
    /// The unit chain ratio: one input unit becomes one output unit.
    pub const UNIT: Self = Self {
        inputs_per_run: 1,
        outputs_per_run: 1,
    };

    /// Create a ratio. Both sides must be at least 1; zero on either side
    /// would make a run either free or pointless and is rejected at
    /// configuration validation.
    pub const fn new(inputs_per_run: u32, outputs_per_run: u32) -> Self {
        Self {
            inputs_per_run,
            outputs_per_run,
        }
    }

    /// Whether both sides of the ratio are non-zero.
    pub const fn is_valid(self) -> bool {
        self.inputs_per_run > 0 && self.outputs_per_run > 0
    }

    /// Runs needed to yield at least `quantity` output units.
    ///
    /// Zero for an invalid (zero-output) ratio.
    pub const fn runs_for_output(self, quantity: u32) -> u32 {
        let full = match quantity.checked_div(self.outputs_per_run) {
            Some(runs) => runs,
            None => return 0,
        };
        match quantity.checked_rem(self.outputs_per_run) {
            Some(0) | None => full,
            Some(_) => full.saturating_add(1),
        }
    }

    /// Runs achievable with `available` input units.
    ///
    /// Zero for an invalid (zero-input) ratio.
    pub const fn runs_from_input(self, available: u32) -> u32 {
        match available.checked_div(self.inputs_per_run) {
            Some(runs) => runs,
            None => 0,
        }
    }

    /// Input units consumed by `runs` production runs.
    pub const fn input_for_runs(self, runs: u32) -> u32 {
        runs.saturating_mul(self.inputs_per_run)
    }

    /// Output units yielded by `runs` production runs.
    pub const fn output_for_runs(self, runs: u32) -> u32 {
        runs.saturating_mul(self.outputs_per_run)
    }
}

impl Default for ProductionRatio {
    fn default() -> Self {
        Self::UNIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_products_are_adjacent() {
        let process = Process::new(2);
        assert_eq!(process.input(), Product::new(2));
        assert_eq!(process.output(), Product::new(3));
    }

    #[test]
    fn unit_ratio_is_identity() {
        let ratio = ProductionRatio::UNIT;
        assert_eq!(ratio.runs_for_output(7), 7);
        assert_eq!(ratio.runs_from_input(7), 7);
        assert_eq!(ratio.input_for_runs(7), 7);
        assert_eq!(ratio.output_for_runs(7), 7);
    }

    #[test]
    fn ratio_rounds_runs_up_for_output() {
        // 3 outputs per run: 7 outputs need 3 runs.
        let ratio = ProductionRatio::new(2, 3);
        assert_eq!(ratio.runs_for_output(7), 3);
        assert_eq!(ratio.input_for_runs(3), 6);
        assert_eq!(ratio.output_for_runs(3), 9);
    }

    #[test]
    fn ratio_rounds_runs_down_for_input() {
        // 2 inputs per run: 7 inputs support 3 runs.
        let ratio = ProductionRatio::new(2, 3);
        assert_eq!(ratio.runs_from_input(7), 3);
    }

    #[test]
    fn zero_ratio_is_invalid() {
        assert!(!ProductionRatio::new(0, 1).is_valid());
        assert!(!ProductionRatio::new(1, 0).is_valid());
        assert!(ProductionRatio::UNIT.is_valid());
    }
}
