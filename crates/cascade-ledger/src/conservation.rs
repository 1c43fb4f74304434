//! Goods conservation verification for the trade log.
//!
//! The conservation law enforces that factory inventories reconcile with
//! the recorded flows: goods enter through exogenous supply, shortfall
//! purchases, and production yield; they leave through exogenous sales,
//! production consumption, and disposal. Negotiated deliveries move goods
//! between factories and net to zero.
//!
//! For each product P in step S, the check is:
//!
//! ```text
//! closing(P) == opening(P) + sources(P, S) - sinks(P, S)
//! ```
//!
//! where `opening` and `closing` are per-product inventory totals summed
//! across all factories at the step's boundaries.
//!
//! A violation produces a [`FlowAnomaly`] -- the simulation's most
//! critical integrity alert.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use cascade_types::Product;

use crate::log::{EntryKind, LedgerEntry};
use crate::FlowAnomaly;

/// Per-product inventory totals summed across all factories.
pub type GoodsTotals = BTreeMap<Product, u64>;

/// The result of a conservation check for a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationResult {
    /// The log is balanced for this step.
    Balanced,
    /// One or more products have imbalanced flows.
    Anomaly(FlowAnomaly),
}

/// How an entry kind participates in the goods flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GoodsRole {
    /// Factory-to-factory movement; credit and debit cancel.
    Internal,
    /// Goods entering factory inventories.
    Source,
    /// Goods leaving factory inventories.
    Sink,
}

/// Classify an entry kind's role in the goods flow.
///
/// Money kinds return `None`; they never participate in goods checks.
const fn goods_role(kind: EntryKind) -> Option<GoodsRole> {
    match kind {
        EntryKind::Delivery => Some(GoodsRole::Internal),
        EntryKind::ExogenousSupply | EntryKind::ShortfallPurchase | EntryKind::ProductionYield => {
            Some(GoodsRole::Source)
        }
        EntryKind::ExogenousSale | EntryKind::ProductionConsume | EntryKind::Disposal => {
            Some(GoodsRole::Sink)
        }
        EntryKind::TradePayment
        | EntryKind::SupplyPayment
        | EntryKind::ShortfallPayment
        | EntryKind::SalePayment
        | EntryKind::ProductionCharge
        | EntryKind::StorageCharge
        | EntryKind::DeliveryPenalty => None,
    }
}

/// Verify that internal goods transfers balance for a single step.
///
/// Each well-formed delivery entry adds its quantity to both the credit
/// and debit accumulators equally, so this check passes by construction
/// for valid entries. It exists as defense-in-depth against corruption.
pub fn verify_internal_balance(step: u64, entries: &[LedgerEntry]) -> ConservationResult {
    // Per-product accumulators for internal movements only.
    let mut internal_credit: BTreeMap<Product, i64> = BTreeMap::new();
    let mut internal_debit: BTreeMap<Product, i64> = BTreeMap::new();

    for entry in entries {
        if entry.step != step {
            continue;
        }
        if goods_role(entry.kind) != Some(GoodsRole::Internal) {
            continue;
        }
        let Some(product) = entry.product else {
            continue;
        };

        // Credit side: the receiving factory gains the goods.
        let c = internal_credit.entry(product).or_insert(0);
        *c = match c.checked_add(i64::from(entry.quantity)) {
            Some(val) => val,
            None => return overflow_anomaly(step, product),
        };

        // Debit side: the sending factory loses the goods.
        let d = internal_debit.entry(product).or_insert(0);
        *d = match d.checked_add(i64::from(entry.quantity)) {
            Some(val) => val,
            None => return overflow_anomaly(step, product),
        };
    }

    // Collect all product keys from both maps.
    let all_products: BTreeSet<Product> = internal_credit
        .keys()
        .chain(internal_debit.keys())
        .copied()
        .collect();

    let mut imbalances: BTreeMap<Product, (i64, i64)> = BTreeMap::new();

    for product in &all_products {
        let total_credit = internal_credit.get(product).copied().unwrap_or(0);
        let total_debit = internal_debit.get(product).copied().unwrap_or(0);

        if total_credit != total_debit {
            imbalances.insert(*product, (total_debit, total_credit));
        }
    }

    if imbalances.is_empty() {
        ConservationResult::Balanced
    } else {
        let count = imbalances.len();
        ConservationResult::Anomaly(FlowAnomaly {
            step,
            imbalances,
            message: format!(
                "FLOW_ANOMALY at step {step}: internal transfer imbalance for {count} product(s)",
            ),
        })
    }
}

/// Verify the full goods conservation law for a single step.
///
/// Runs the internal balance check from [`verify_internal_balance`] and
/// then reconciles each product's closing inventory total against its
/// opening total plus recorded sources minus recorded sinks.
pub fn verify_conservation(
    step: u64,
    entries: &[LedgerEntry],
    opening: &GoodsTotals,
    closing: &GoodsTotals,
) -> ConservationResult {
    // First, the internal balance must hold.
    let result = verify_internal_balance(step, entries);
    if let ConservationResult::Anomaly(_) = &result {
        return result;
    }

    // Net recorded flow per product: sources add, sinks subtract.
    let mut net: BTreeMap<Product, i64> = BTreeMap::new();

    for entry in entries {
        if entry.step != step {
            continue;
        }
        let Some(product) = entry.product else {
            continue;
        };

        let signed = match goods_role(entry.kind) {
            Some(GoodsRole::Source) => i64::from(entry.quantity),
            Some(GoodsRole::Sink) => -i64::from(entry.quantity),
            Some(GoodsRole::Internal) | None => continue,
        };

        let v = net.entry(product).or_insert(0);
        *v = match v.checked_add(signed) {
            Some(val) => val,
            None => return overflow_anomaly(step, product),
        };
    }

    // Reconcile every product seen in the inventories or the flows.
    let all_products: BTreeSet<Product> = opening
        .keys()
        .chain(closing.keys())
        .chain(net.keys())
        .copied()
        .collect();

    let mut imbalances: BTreeMap<Product, (i64, i64)> = BTreeMap::new();

    for product in &all_products {
        let opened = total_of(opening, *product);
        let closed = total_of(closing, *product);
        let flow = net.get(product).copied().unwrap_or(0);

        let expected = match opened.checked_add(flow) {
            Some(val) => val,
            None => return overflow_anomaly(step, *product),
        };

        if expected != closed {
            imbalances.insert(*product, (expected, closed));
        }
    }

    if imbalances.is_empty() {
        ConservationResult::Balanced
    } else {
        let count = imbalances.len();
        warn!(step, products = count, "goods conservation violated");
        ConservationResult::Anomaly(FlowAnomaly {
            step,
            imbalances,
            message: format!(
                "FLOW_ANOMALY at step {step}: goods conservation violated for {count} product(s)",
            ),
        })
    }
}

/// Read a product's inventory total as a signed value.
fn total_of(totals: &GoodsTotals, product: Product) -> i64 {
    let raw = totals.get(&product).copied().unwrap_or(0);
    i64::try_from(raw).unwrap_or(i64::MAX)
}

/// Construct an anomaly result for arithmetic overflow during summation.
fn overflow_anomaly(step: u64, product: Product) -> ConservationResult {
    let mut imbalances = BTreeMap::new();
    imbalances.insert(product, (0, 0));
    ConservationResult::Anomaly(FlowAnomaly {
        step,
        imbalances,
        message: format!(
            "FLOW_ANOMALY at step {step}: arithmetic overflow while summing {product}",
        ),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use cascade_types::{AgentId, EntryId, Party};

    use super::*;

    /// Helper to create a goods entry without going through the log.
    fn make_entry(step: u64, kind: EntryKind, product: Product, quantity: u32) -> LedgerEntry {
        let factory = Party::Factory(AgentId::new(0));
        let partner = Party::Factory(AgentId::new(1));
        let (debit, credit) = match kind {
            EntryKind::Delivery => (Some(factory), Some(partner)),
            EntryKind::ExogenousSupply | EntryKind::ShortfallPurchase => {
                (Some(Party::ExternalSupplier), Some(factory))
            }
            EntryKind::ExogenousSale => (Some(factory), Some(Party::ExternalConsumer)),
            EntryKind::ProductionYield => (None, Some(factory)),
            _ => (Some(factory), None),
        };
        LedgerEntry {
            id: EntryId::new(0),
            step,
            kind,
            debit,
            credit,
            product: Some(product),
            quantity,
            amount: Decimal::ZERO,
            contract: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn empty_step_is_balanced() {
        let result = verify_internal_balance(1, &[]);
        assert_eq!(result, ConservationResult::Balanced);

        let result = verify_conservation(1, &[], &GoodsTotals::new(), &GoodsTotals::new());
        assert_eq!(result, ConservationResult::Balanced);
    }

    #[test]
    fn delivery_is_internally_balanced() {
        // A delivery is internal: it adds quantity to both credit and debit.
        let entries = vec![make_entry(1, EntryKind::Delivery, Product::new(1), 5)];
        let result = verify_internal_balance(1, &entries);
        assert_eq!(result, ConservationResult::Balanced);
    }

    #[test]
    fn supply_alone_is_internally_balanced() {
        // Exogenous supply is a source flow, not internal. It does not
        // participate in the internal balance check.
        let entries = vec![make_entry(1, EntryKind::ExogenousSupply, Product::new(0), 10)];
        let result = verify_internal_balance(1, &entries);
        assert_eq!(result, ConservationResult::Balanced);
    }

    #[test]
    fn conservation_accepts_reconciled_step() {
        // Supply 10 raw units, consume all 10 in production, yield 5
        // upstream units, sell 3, dispose of 2. Everything reconciles to
        // empty closing inventories.
        let entries = vec![
            make_entry(1, EntryKind::ExogenousSupply, Product::new(0), 10),
            make_entry(1, EntryKind::ProductionConsume, Product::new(0), 10),
            make_entry(1, EntryKind::ProductionYield, Product::new(1), 5),
            make_entry(1, EntryKind::ExogenousSale, Product::new(1), 3),
            make_entry(1, EntryKind::Disposal, Product::new(1), 2),
        ];
        let result = verify_conservation(1, &entries, &GoodsTotals::new(), &GoodsTotals::new());
        assert_eq!(result, ConservationResult::Balanced);
    }

    #[test]
    fn conservation_accepts_goods_held_in_inventory() {
        let entries = vec![make_entry(1, EntryKind::ExogenousSupply, Product::new(0), 10)];
        let closing = GoodsTotals::from([(Product::new(0), 10)]);
        let result = verify_conservation(1, &entries, &GoodsTotals::new(), &closing);
        assert_eq!(result, ConservationResult::Balanced);
    }

    #[test]
    fn conservation_detects_vanished_goods() {
        // Ten units arrived but the closing inventories are empty and no
        // sink consumed them.
        let entries = vec![make_entry(1, EntryKind::ExogenousSupply, Product::new(0), 10)];
        let result = verify_conservation(1, &entries, &GoodsTotals::new(), &GoodsTotals::new());

        let anomaly = match result {
            ConservationResult::Anomaly(a) => Some(a),
            ConservationResult::Balanced => None,
        };
        assert!(anomaly.is_some());
        if let Some(anomaly) = anomaly {
            assert_eq!(anomaly.step, 1);
            assert_eq!(
                anomaly.imbalances.get(&Product::new(0)).copied(),
                Some((10, 0))
            );
        }
    }

    #[test]
    fn conservation_counts_delivery_as_internal() {
        // A delivery moves goods between factories; the aggregate totals
        // are untouched.
        let entries = vec![make_entry(1, EntryKind::Delivery, Product::new(0), 5)];
        let totals = GoodsTotals::from([(Product::new(0), 5)]);
        let result = verify_conservation(1, &entries, &totals, &totals);
        assert_eq!(result, ConservationResult::Balanced);
    }

    #[test]
    fn entries_from_other_steps_are_ignored() {
        let entries = vec![
            make_entry(1, EntryKind::ExogenousSupply, Product::new(0), 10),
            make_entry(1, EntryKind::Disposal, Product::new(0), 10),
            make_entry(2, EntryKind::ExogenousSupply, Product::new(0), 99),
        ];
        let result = verify_conservation(1, &entries, &GoodsTotals::new(), &GoodsTotals::new());
        assert_eq!(result, ConservationResult::Balanced);
    }

    #[test]
    fn money_entries_never_participate() {
        let mut entry = make_entry(1, EntryKind::StorageCharge, Product::new(0), 0);
        entry.amount = Decimal::from(25);
        // Even with a product attached, a money entry is not a goods flow.
        let result = verify_conservation(
            1,
            &[entry],
            &GoodsTotals::new(),
            &GoodsTotals::new(),
        );
        assert_eq!(result, ConservationResult::Balanced);
    }

    #[test]
    fn anomaly_construction_has_correct_fields() {
        let mut imbalances = BTreeMap::new();
        imbalances.insert(Product::new(0), (10, 7));

        let anomaly = FlowAnomaly {
            step: 42,
            imbalances,
            message: "FLOW_ANOMALY at step 42: test".to_owned(),
        };

        assert_eq!(anomaly.step, 42);
        assert!(anomaly.imbalances.contains_key(&Product::new(0)));
        assert!(anomaly.message.contains("FLOW_ANOMALY"));
        assert!(anomaly.message.contains("42"));

        let pair = anomaly.imbalances.get(&Product::new(0)).copied();
        assert_eq!(pair, Some((10, 7)));
    }

    #[test]
    fn anomaly_display_shows_message() {
        let anomaly = FlowAnomaly {
            step: 5,
            imbalances: BTreeMap::new(),
            message: "FLOW_ANOMALY at step 5: test display".to_owned(),
        };
        let display = format!("{anomaly}");
        assert!(display.contains("FLOW_ANOMALY"));
        assert!(display.contains("step 5"));
    }

    #[test]
    fn goods_role_classification() {
        assert_eq!(goods_role(EntryKind::Delivery), Some(GoodsRole::Internal));

        assert_eq!(
            goods_role(EntryKind::ExogenousSupply),
            Some(GoodsRole::Source)
        );
        assert_eq!(
            goods_role(EntryKind::ShortfallPurchase),
            Some(GoodsRole::Source)
        );
        assert_eq!(
            goods_role(EntryKind::ProductionYield),
            Some(GoodsRole::Source)
        );

        assert_eq!(goods_role(EntryKind::ExogenousSale), Some(GoodsRole::Sink));
        assert_eq!(
            goods_role(EntryKind::ProductionConsume),
            Some(GoodsRole::Sink)
        );
        assert_eq!(goods_role(EntryKind::Disposal), Some(GoodsRole::Sink));

        assert_eq!(goods_role(EntryKind::TradePayment), None);
        assert_eq!(goods_role(EntryKind::StorageCharge), None);
    }
}
