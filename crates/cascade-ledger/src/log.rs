//! The trade log: an append-only record of all goods and money movements.
//!
//! The [`TradeLog`] is the in-memory audit record for the current run. It
//! holds all [`LedgerEntry`] values and provides methods for recording
//! movements, querying flows, and verifying the conservation law.
//!
//! # Design
//!
//! - **Append-only**: entries are never modified or deleted.
//! - **Single-axis**: each entry moves goods or money, never both; a
//!   trade records one goods leg and one payment leg.
//! - **Validated**: quantities and amounts are strictly positive and the
//!   debit/credit parties must match the endpoint contract of the kind.
//! - **Precision**: money uses [`Decimal`], goods use whole `u32` units.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cascade_types::{AgentId, ContractId, EntryId, Party, Product};

use crate::conservation::{self, ConservationResult, GoodsTotals};
use crate::LedgerError;

// ---------------------------------------------------------------------------
// Entry kinds
// ---------------------------------------------------------------------------

/// The category of movement a ledger entry records.
///
/// Goods kinds move whole units of a product; money kinds move a decimal
/// amount. The expected debit/credit endpoints for each kind are listed
/// in the crate-level documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Negotiated goods moving from a selling factory to a buying factory.
    Delivery,
    /// Scheduled raw material arriving from the external supplier.
    ExogenousSupply,
    /// Auto-purchased input covering a production shortfall.
    ShortfallPurchase,
    /// Scheduled output delivered to the external consumer.
    ExogenousSale,
    /// Input units consumed by production runs.
    ProductionConsume,
    /// Output units created by production runs.
    ProductionYield,
    /// Residual units disposed of at settlement.
    Disposal,
    /// Payment for a negotiated delivery, buyer to seller.
    TradePayment,
    /// Payment for scheduled raw material, factory to supplier.
    SupplyPayment,
    /// Payment for shortfall input, factory to supplier.
    ShortfallPayment,
    /// Revenue for a scheduled sale, consumer to factory.
    SalePayment,
    /// Operating cost of production runs.
    ProductionCharge,
    /// Per-unit charge on residual inventory.
    StorageCharge,
    /// Per-unit penalty on unmet output commitments.
    DeliveryPenalty,
}

impl EntryKind {
    /// Whether entries of this kind move goods.
    pub const fn is_goods(self) -> bool {
        matches!(
            self,
            Self::Delivery
                | Self::ExogenousSupply
                | Self::ShortfallPurchase
                | Self::ExogenousSale
                | Self::ProductionConsume
                | Self::ProductionYield
                | Self::Disposal
        )
    }

    /// Whether entries of this kind move money.
    pub const fn is_money(self) -> bool {
        !self.is_goods()
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One recorded movement of goods or money.
///
/// The debit party loses the asset, the credit party gains it. A side of
/// `None` means the movement has no counterparty inside the economy
/// (production, disposal, operating charges).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Dense entry id, in recording order.
    pub id: EntryId,
    /// The step the movement belongs to.
    pub step: u64,
    /// The category of movement.
    pub kind: EntryKind,
    /// The party losing the asset.
    pub debit: Option<Party>,
    /// The party gaining the asset.
    pub credit: Option<Party>,
    /// The product moved; `None` for pure money entries.
    pub product: Option<Product>,
    /// Units moved; zero for money entries.
    pub quantity: u32,
    /// Money moved; zero for goods entries.
    pub amount: Decimal,
    /// The contract the movement settles, if any.
    pub contract: Option<ContractId>,
    /// Wall-clock recording time, for report artifacts only.
    pub recorded_at: DateTime<Utc>,
}

/// Parameters for recording a general ledger entry.
///
/// Packs the many arguments of a movement into a single struct to satisfy
/// clippy's argument count limit and improve call-site readability.
#[derive(Debug, Clone)]
pub struct EntryParams {
    /// The step the movement belongs to.
    pub step: u64,
    /// The category of movement.
    pub kind: EntryKind,
    /// The party losing the asset.
    pub debit: Option<Party>,
    /// The party gaining the asset.
    pub credit: Option<Party>,
    /// The product moved; required for goods kinds.
    pub product: Option<Product>,
    /// Units moved; required non-zero for goods kinds.
    pub quantity: u32,
    /// Money moved; required non-zero for money kinds.
    pub amount: Decimal,
    /// The contract the movement settles, if any.
    pub contract: Option<ContractId>,
}

// ---------------------------------------------------------------------------
// Endpoint validation
// ---------------------------------------------------------------------------

/// Coarse classification of an entry endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointClass {
    /// A factory agent.
    Factory,
    /// The external raw-material supplier.
    Supplier,
    /// The external final-product consumer.
    Consumer,
    /// No counterparty inside the economy.
    Outside,
}

impl EndpointClass {
    const fn label(self) -> &'static str {
        match self {
            Self::Factory => "factory",
            Self::Supplier => "external supplier",
            Self::Consumer => "external consumer",
            Self::Outside => "outside",
        }
    }
}

const fn classify(party: Option<Party>) -> EndpointClass {
    match party {
        Some(Party::Factory(_)) => EndpointClass::Factory,
        Some(Party::ExternalSupplier) => EndpointClass::Supplier,
        Some(Party::ExternalConsumer) => EndpointClass::Consumer,
        None => EndpointClass::Outside,
    }
}

/// Return the expected (debit, credit) endpoint classes for each kind.
const fn expected_endpoints(kind: EntryKind) -> (EndpointClass, EndpointClass) {
    match kind {
        EntryKind::Delivery | EntryKind::TradePayment => {
            (EndpointClass::Factory, EndpointClass::Factory)
        }
        EntryKind::ExogenousSupply | EntryKind::ShortfallPurchase => {
            (EndpointClass::Supplier, EndpointClass::Factory)
        }
        EntryKind::ExogenousSale => (EndpointClass::Factory, EndpointClass::Consumer),
        EntryKind::ProductionYield => (EndpointClass::Outside, EndpointClass::Factory),
        EntryKind::SupplyPayment | EntryKind::ShortfallPayment => {
            (EndpointClass::Factory, EndpointClass::Supplier)
        }
        EntryKind::SalePayment => (EndpointClass::Consumer, EndpointClass::Factory),
        EntryKind::ProductionConsume
        | EntryKind::Disposal
        | EntryKind::ProductionCharge
        | EntryKind::StorageCharge
        | EntryKind::DeliveryPenalty => (EndpointClass::Factory, EndpointClass::Outside),
    }
}

/// Validate that the debit/credit parties match the endpoint contract
/// for the given [`EntryKind`].
fn validate_endpoints(
    kind: EntryKind,
    debit: Option<Party>,
    credit: Option<Party>,
) -> Result<(), LedgerError> {
    let (expected_debit, expected_credit) = expected_endpoints(kind);

    let actual_debit = classify(debit);
    if actual_debit != expected_debit {
        return Err(LedgerError::WrongParty {
            kind,
            side: "debit",
            expected: expected_debit.label(),
            actual: actual_debit.label(),
        });
    }

    let actual_credit = classify(credit);
    if actual_credit != expected_credit {
        return Err(LedgerError::WrongParty {
            kind,
            side: "credit",
            expected: expected_credit.label(),
            actual: actual_credit.label(),
        });
    }

    Ok(())
}

/// Validate that the entry carries exactly its own axis.
fn validate_axis(params: &EntryParams) -> Result<(), LedgerError> {
    if params.kind.is_goods() {
        if params.quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        if params.product.is_none() {
            return Err(LedgerError::MissingProduct { kind: params.kind });
        }
        if !params.amount.is_zero() {
            return Err(LedgerError::MixedAxes { kind: params.kind });
        }
    } else {
        if params.amount.is_sign_negative() {
            return Err(LedgerError::NegativeAmount {
                amount: params.amount,
            });
        }
        if params.amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if params.quantity != 0 {
            return Err(LedgerError::MixedAxes { kind: params.kind });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trade log
// ---------------------------------------------------------------------------

/// The append-only audit record of all movements in a run.
///
/// Every goods or money movement -- deliveries, payments, exogenous
/// flows, production, disposal, and operating charges -- produces one
/// [`LedgerEntry`] appended here. The log enforces three invariants:
///
/// 1. Quantities and amounts are strictly positive (validated at entry).
/// 2. Every kind has the correct debit/credit endpoints.
/// 3. The conservation law holds at the end of every step.
#[derive(Debug, Default)]
pub struct TradeLog {
    /// All entries, in recording order.
    entries: Vec<LedgerEntry>,
    /// Next dense entry id.
    next_id: u32,
}

impl TradeLog {
    /// Create a new empty log.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Return the number of entries in the log.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether the log has no entries.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a movement.
    ///
    /// This is the general-purpose recording method; the typed `record_*`
    /// methods below delegate to it. The entry id is assigned here, in
    /// recording order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation. Nothing is
    /// appended on failure.
    pub fn record(&mut self, params: EntryParams) -> Result<&LedgerEntry, LedgerError> {
        validate_axis(&params)?;
        validate_endpoints(params.kind, params.debit, params.credit)?;

        let entry = LedgerEntry {
            id: EntryId::new(self.next_id),
            step: params.step,
            kind: params.kind,
            debit: params.debit,
            credit: params.credit,
            product: params.product,
            quantity: params.quantity,
            amount: params.amount,
            contract: params.contract,
            recorded_at: Utc::now(),
        };
        self.next_id = self.next_id.saturating_add(1);
        self.entries.push(entry);

        // Return a reference to the entry we just pushed.
        self.entries.last().ok_or(LedgerError::InternalError(
            "failed to retrieve entry after append",
        ))
    }

    /// Record a negotiated delivery (seller to buyer).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_delivery(
        &mut self,
        step: u64,
        contract: ContractId,
        product: Product,
        quantity: u32,
        seller: AgentId,
        buyer: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::Delivery,
            debit: Some(Party::Factory(seller)),
            credit: Some(Party::Factory(buyer)),
            product: Some(product),
            quantity,
            amount: Decimal::ZERO,
            contract: Some(contract),
        })
    }

    /// Record the payment for a negotiated delivery (buyer to seller).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_trade_payment(
        &mut self,
        step: u64,
        contract: ContractId,
        amount: Decimal,
        buyer: AgentId,
        seller: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::TradePayment,
            debit: Some(Party::Factory(buyer)),
            credit: Some(Party::Factory(seller)),
            product: None,
            quantity: 0,
            amount,
            contract: Some(contract),
        })
    }

    /// Record scheduled raw material arriving (supplier to factory).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_exogenous_supply(
        &mut self,
        step: u64,
        contract: ContractId,
        product: Product,
        quantity: u32,
        buyer: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::ExogenousSupply,
            debit: Some(Party::ExternalSupplier),
            credit: Some(Party::Factory(buyer)),
            product: Some(product),
            quantity,
            amount: Decimal::ZERO,
            contract: Some(contract),
        })
    }

    /// Record the payment for scheduled raw material (factory to supplier).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_supply_payment(
        &mut self,
        step: u64,
        contract: ContractId,
        amount: Decimal,
        buyer: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::SupplyPayment,
            debit: Some(Party::Factory(buyer)),
            credit: Some(Party::ExternalSupplier),
            product: None,
            quantity: 0,
            amount,
            contract: Some(contract),
        })
    }

    /// Record scheduled output delivered (factory to consumer).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_exogenous_sale(
        &mut self,
        step: u64,
        contract: ContractId,
        product: Product,
        quantity: u32,
        seller: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::ExogenousSale,
            debit: Some(Party::Factory(seller)),
            credit: Some(Party::ExternalConsumer),
            product: Some(product),
            quantity,
            amount: Decimal::ZERO,
            contract: Some(contract),
        })
    }

    /// Record the revenue for a scheduled sale (consumer to factory).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_sale_payment(
        &mut self,
        step: u64,
        contract: ContractId,
        amount: Decimal,
        seller: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::SalePayment,
            debit: Some(Party::ExternalConsumer),
            credit: Some(Party::Factory(seller)),
            product: None,
            quantity: 0,
            amount,
            contract: Some(contract),
        })
    }

    /// Record an auto-purchased shortfall input (supplier to factory).
    ///
    /// Shortfall purchases have no contract of their own.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_shortfall_purchase(
        &mut self,
        step: u64,
        product: Product,
        quantity: u32,
        buyer: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::ShortfallPurchase,
            debit: Some(Party::ExternalSupplier),
            credit: Some(Party::Factory(buyer)),
            product: Some(product),
            quantity,
            amount: Decimal::ZERO,
            contract: None,
        })
    }

    /// Record the payment for a shortfall input (factory to supplier).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_shortfall_payment(
        &mut self,
        step: u64,
        amount: Decimal,
        buyer: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::ShortfallPayment,
            debit: Some(Party::Factory(buyer)),
            credit: Some(Party::ExternalSupplier),
            product: None,
            quantity: 0,
            amount,
            contract: None,
        })
    }

    /// Record input units consumed by production runs.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_production_consume(
        &mut self,
        step: u64,
        product: Product,
        quantity: u32,
        agent: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::ProductionConsume,
            debit: Some(Party::Factory(agent)),
            credit: None,
            product: Some(product),
            quantity,
            amount: Decimal::ZERO,
            contract: None,
        })
    }

    /// Record output units created by production runs.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_production_yield(
        &mut self,
        step: u64,
        product: Product,
        quantity: u32,
        agent: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::ProductionYield,
            debit: None,
            credit: Some(Party::Factory(agent)),
            product: Some(product),
            quantity,
            amount: Decimal::ZERO,
            contract: None,
        })
    }

    /// Record residual units disposed of at settlement.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_disposal(
        &mut self,
        step: u64,
        product: Product,
        quantity: u32,
        agent: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::Disposal,
            debit: Some(Party::Factory(agent)),
            credit: None,
            product: Some(product),
            quantity,
            amount: Decimal::ZERO,
            contract: None,
        })
    }

    /// Record the operating cost of production runs.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_production_charge(
        &mut self,
        step: u64,
        amount: Decimal,
        agent: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::ProductionCharge,
            debit: Some(Party::Factory(agent)),
            credit: None,
            product: None,
            quantity: 0,
            amount,
            contract: None,
        })
    }

    /// Record the per-unit charge on residual inventory.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_storage_charge(
        &mut self,
        step: u64,
        amount: Decimal,
        agent: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::StorageCharge,
            debit: Some(Party::Factory(agent)),
            credit: None,
            product: None,
            quantity: 0,
            amount,
            contract: None,
        })
    }

    /// Record the per-unit penalty on unmet output commitments.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry fails validation.
    pub fn record_delivery_penalty(
        &mut self,
        step: u64,
        amount: Decimal,
        agent: AgentId,
    ) -> Result<&LedgerEntry, LedgerError> {
        self.record(EntryParams {
            step,
            kind: EntryKind::DeliveryPenalty,
            debit: Some(Party::Factory(agent)),
            credit: None,
            product: None,
            quantity: 0,
            amount,
            contract: None,
        })
    }

    /// Verify that internal goods transfers balance for a given step.
    ///
    /// Returns [`ConservationResult::Balanced`] if the log is balanced,
    /// or [`ConservationResult::Anomaly`] with details about the imbalance.
    pub fn verify_internal_balance(&self, step: u64) -> ConservationResult {
        conservation::verify_internal_balance(step, &self.entries)
    }

    /// Verify the full goods conservation law for a given step.
    ///
    /// `opening` and `closing` are the per-product inventory totals summed
    /// across all factories at the step's boundaries.
    pub fn verify_conservation(
        &self,
        step: u64,
        opening: &GoodsTotals,
        closing: &GoodsTotals,
    ) -> ConservationResult {
        conservation::verify_conservation(step, &self.entries, opening, closing)
    }

    /// Return all entries for a given step.
    pub fn entries_for_step(&self, step: u64) -> Vec<&LedgerEntry> {
        self.entries.iter().filter(|e| e.step == step).collect()
    }

    /// Return all entries, in recording order.
    pub fn all_entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Net units of `product` the party has gained over the whole log.
    ///
    /// Positive means the party received more than it sent.
    pub fn goods_balance(&self, party: Party, product: Product) -> i64 {
        let mut balance = 0_i64;

        for entry in &self.entries {
            if entry.product != Some(product) {
                continue;
            }

            // Credit: party receives the goods.
            if entry.credit == Some(party) {
                balance = balance.saturating_add(i64::from(entry.quantity));
            }

            // Debit: party loses the goods.
            if entry.debit == Some(party) {
                balance = balance.saturating_sub(i64::from(entry.quantity));
            }
        }

        balance
    }

    /// Net money the party has received over the whole log.
    ///
    /// Positive means the party was paid more than it paid out. Operating
    /// charges count against the paying factory.
    pub fn money_flow(&self, party: Party) -> Decimal {
        let mut flow = Decimal::ZERO;

        for entry in &self.entries {
            if entry.kind.is_goods() {
                continue;
            }

            if entry.credit == Some(party) {
                flow = flow.saturating_add(entry.amount);
            }
            if entry.debit == Some(party) {
                flow = flow.saturating_sub(entry.amount);
            }
        }

        flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: u64 = 1;

    fn factory(index: u32) -> AgentId {
        AgentId::new(index)
    }

    #[test]
    fn new_log_is_empty() {
        let log = TradeLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn record_delivery_appends_entry() {
        let mut log = TradeLog::new();
        let result = log.record_delivery(
            STEP,
            ContractId::new(0),
            Product::new(1),
            5,
            factory(0),
            factory(1),
        );
        assert!(result.is_ok());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn entry_ids_are_sequential() {
        let mut log = TradeLog::new();
        let _ = log.record_production_yield(STEP, Product::new(1), 5, factory(0));
        let _ = log.record_disposal(STEP, Product::new(1), 5, factory(0));

        let ids: Vec<u32> = log
            .all_entries()
            .iter()
            .map(|e| e.id.into_inner())
            .collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn zero_quantity_goods_rejected() {
        let mut log = TradeLog::new();
        let result = log.record_delivery(
            STEP,
            ContractId::new(0),
            Product::new(1),
            0,
            factory(0),
            factory(1),
        );
        assert!(matches!(result, Err(LedgerError::ZeroQuantity)));
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn zero_amount_money_rejected() {
        let mut log = TradeLog::new();
        let result = log.record_storage_charge(STEP, Decimal::ZERO, factory(0));
        assert!(matches!(result, Err(LedgerError::ZeroAmount)));
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn negative_amount_rejected() {
        let mut log = TradeLog::new();
        let result = log.record_trade_payment(
            STEP,
            ContractId::new(0),
            Decimal::from(-5),
            factory(1),
            factory(0),
        );
        assert!(matches!(result, Err(LedgerError::NegativeAmount { .. })));
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn goods_entry_without_product_rejected() {
        let mut log = TradeLog::new();
        let result = log.record(EntryParams {
            step: STEP,
            kind: EntryKind::Disposal,
            debit: Some(Party::Factory(factory(0))),
            credit: None,
            product: None,
            quantity: 3,
            amount: Decimal::ZERO,
            contract: None,
        });
        assert!(matches!(result, Err(LedgerError::MissingProduct { .. })));
    }

    #[test]
    fn mixed_axis_entry_rejected() {
        let mut log = TradeLog::new();
        let result = log.record(EntryParams {
            step: STEP,
            kind: EntryKind::Delivery,
            debit: Some(Party::Factory(factory(0))),
            credit: Some(Party::Factory(factory(1))),
            product: Some(Product::new(1)),
            quantity: 3,
            amount: Decimal::from(40),
            contract: None,
        });
        assert!(matches!(result, Err(LedgerError::MixedAxes { .. })));
    }

    #[test]
    fn wrong_endpoint_rejected() {
        // Exogenous supply must be debited from the external supplier.
        let mut log = TradeLog::new();
        let result = log.record(EntryParams {
            step: STEP,
            kind: EntryKind::ExogenousSupply,
            debit: Some(Party::Factory(factory(0))),
            credit: Some(Party::Factory(factory(1))),
            product: Some(Product::new(0)),
            quantity: 3,
            amount: Decimal::ZERO,
            contract: None,
        });
        assert!(matches!(
            result,
            Err(LedgerError::WrongParty { side: "debit", .. })
        ));
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn goods_balance_tracks_net_flow() {
        let mut log = TradeLog::new();
        let p = Product::new(1);

        // Seller yields 10, delivers 4 to the buyer.
        let _ = log.record_production_yield(STEP, p, 10, factory(0));
        let _ = log.record_delivery(STEP, ContractId::new(0), p, 4, factory(0), factory(1));

        assert_eq!(log.goods_balance(Party::Factory(factory(0)), p), 6);
        assert_eq!(log.goods_balance(Party::Factory(factory(1)), p), 4);
    }

    #[test]
    fn money_flow_tracks_net_payments() {
        let mut log = TradeLog::new();

        // Buyer pays 40 for a trade, seller pays a 5 storage charge.
        let _ = log.record_trade_payment(
            STEP,
            ContractId::new(0),
            Decimal::from(40),
            factory(1),
            factory(0),
        );
        let _ = log.record_storage_charge(STEP, Decimal::from(5), factory(0));

        assert_eq!(log.money_flow(Party::Factory(factory(0))), Decimal::from(35));
        assert_eq!(
            log.money_flow(Party::Factory(factory(1))),
            Decimal::from(-40)
        );
    }

    #[test]
    fn entries_for_step_filters_correctly() {
        let mut log = TradeLog::new();
        let _ = log.record_production_yield(1, Product::new(1), 5, factory(0));
        let _ = log.record_production_yield(2, Product::new(1), 3, factory(0));

        assert_eq!(log.entries_for_step(1).len(), 1);
        assert_eq!(log.entries_for_step(2).len(), 1);
        assert_eq!(log.entries_for_step(3).len(), 0);
    }

    #[test]
    fn delivery_balances_internally() {
        let mut log = TradeLog::new();
        let _ = log.record_delivery(
            STEP,
            ContractId::new(0),
            Product::new(1),
            5,
            factory(0),
            factory(1),
        );
        assert_eq!(log.verify_internal_balance(STEP), ConservationResult::Balanced);
    }

    #[test]
    fn entries_roundtrip_serde() {
        let mut log = TradeLog::new();
        let _ = log.record_exogenous_sale(
            STEP,
            ContractId::new(2),
            Product::new(3),
            7,
            factory(5),
        );

        let entry = log.all_entries().first();
        assert!(entry.is_some());
        if let Some(original) = entry {
            let json = serde_json::to_string(original).ok();
            assert!(json.is_some());
            let restored: Option<LedgerEntry> =
                json.and_then(|text| serde_json::from_str(&text).ok());
            assert_eq!(restored.as_ref(), Some(original));
        }
    }
}
