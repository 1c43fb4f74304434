//! Profit evaluation over contract sets.
//!
//! The [`UtilityEvaluator`] maps a set of signed contracts to the profit
//! a factory would realize from them, given its cost rates and the
//! exogenous baseline fixed at construction. It is pure: strategies call
//! it repeatedly against hypothetical contract sets while negotiating,
//! and the executor's settlement applies the same arithmetic to the
//! realized quantities.
//!
//! The profit of an input total `(qin, pin)` and an output total
//! `(qout, pout)` is
//!
//! ```text
//! pin - pout - production_cost * min(qin, qout)
//!            - storage_cost    * max(0, qin - qout)
//!            - delivery_penalty * max(0, qout - qin)
//! ```
//!
//! Production cost applies only to units actually converted; excess
//! input accrues storage cost and unmet output commitments accrue the
//! delivery penalty.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cascade_types::{Contract, Product};

// ---------------------------------------------------------------------------
// Breach primitives
// ---------------------------------------------------------------------------

/// Normalized quantity mismatch in `[0, 1]`.
///
/// Zero when both totals are zero; otherwise `|qin - qout|` over the
/// larger of the two, reaching one when a side is entirely unmet.
pub fn breach_level(qin: u32, qout: u32) -> Decimal {
    let largest = qin.max(qout);
    if largest < 1 {
        return Decimal::ZERO;
    }
    Decimal::from(qin.abs_diff(qout))
        .checked_div(Decimal::from(largest))
        .unwrap_or(Decimal::ZERO)
}

/// Whether an input/output total pair constitutes a breach.
///
/// Matched totals are never a breach, including the all-zero pair.
pub const fn is_breach(qin: u32, qout: u32) -> bool {
    qin != qout
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Everything an evaluator needs at construction.
///
/// Packs the cost rates and the exogenous baseline into one argument to
/// satisfy clippy's argument count limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilityParams {
    /// Product the factory buys.
    pub input_product: Product,
    /// Product the factory sells.
    pub output_product: Product,
    /// Cost rate per converted unit.
    pub production_cost: Decimal,
    /// Cost rate per unit of excess input.
    pub storage_cost: Decimal,
    /// Penalty rate per unit of unmet output commitment.
    pub delivery_penalty: Decimal,
    /// Exogenous input units already committed this step.
    pub exogenous_qin: u32,
    /// Total price of the exogenous input commitment.
    pub exogenous_pin: Decimal,
    /// Exogenous output units already committed this step.
    pub exogenous_qout: u32,
    /// Total price of the exogenous output commitment.
    pub exogenous_pout: Decimal,
}

/// Input/output totals a contract set aggregates to.
///
/// `pin` and `pout` are full prices, not unit prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTotals {
    /// Total input units.
    pub qin: u32,
    /// Total price of the input units.
    pub pin: Decimal,
    /// Total output units.
    pub qout: u32,
    /// Total price of the output units.
    pub pout: Decimal,
}

/// Pure profit function over a factory's contract sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtilityEvaluator {
    params: UtilityParams,
}

impl UtilityEvaluator {
    /// Build an evaluator with fixed rates and exogenous baseline.
    pub const fn new(params: UtilityParams) -> Self {
        Self { params }
    }

    /// The parameters the evaluator was built with.
    pub const fn params(&self) -> &UtilityParams {
        &self.params
    }

    /// Aggregate a contract set into input/output totals.
    ///
    /// Starts from the exogenous baseline, then adds every *signed*
    /// contract whose annotated product matches the factory's input or
    /// output product. Unsigned contracts and contracts on unrelated
    /// products contribute nothing.
    pub fn totals(&self, contracts: &[Contract]) -> TradeTotals {
        let mut totals = TradeTotals {
            qin: self.params.exogenous_qin,
            pin: self.params.exogenous_pin,
            qout: self.params.exogenous_qout,
            pout: self.params.exogenous_pout,
        };
        for contract in contracts {
            if !contract.is_signed() {
                continue;
            }
            let value = contract.total_price().unwrap_or(Decimal::MAX);
            if contract.annotation.product == self.params.input_product {
                totals.qin = totals.qin.saturating_add(contract.quantity);
                totals.pin = totals.pin.saturating_add(value);
            } else if contract.annotation.product == self.params.output_product {
                totals.qout = totals.qout.saturating_add(contract.quantity);
                totals.pout = totals.pout.saturating_add(value);
            }
        }
        totals
    }

    /// Profit of a pre-aggregated total pair.
    pub fn profit_of(&self, totals: &TradeTotals) -> Decimal {
        let converted = Decimal::from(totals.qin.min(totals.qout));
        let stored = Decimal::from(totals.qin.saturating_sub(totals.qout));
        let unmet = Decimal::from(totals.qout.saturating_sub(totals.qin));
        totals
            .pin
            .saturating_sub(totals.pout)
            .saturating_sub(self.params.production_cost.saturating_mul(converted))
            .saturating_sub(self.params.storage_cost.saturating_mul(stored))
            .saturating_sub(self.params.delivery_penalty.saturating_mul(unmet))
    }

    /// Profit of a contract set: aggregation followed by the formula.
    pub fn evaluate(&self, contracts: &[Contract]) -> Decimal {
        self.profit_of(&self.totals(contracts))
    }
}
