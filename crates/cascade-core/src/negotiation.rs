//! The negotiation seam between the world loop and whatever produces
//! signed contracts.
//!
//! The core never negotiates; it hands a [`NegotiationProvider`] the
//! step number, the admissible pairs, and read-only market views, and
//! receives back one atomic batch of contract drafts. Swapping the
//! provider swaps the entire negotiation mechanism without touching the
//! execution pipeline.

use std::collections::BTreeMap;

use cascade_market::{FactoryStrategy, MarketView, Quote};
use cascade_types::{AgentId, ContractAnnotation, ContractDraft, ContractError, Party, TradeRole};
use rand::RngCore;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, trace};

use crate::topology::TradingPair;

/// Errors a negotiation provider can produce.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// The provider produced trade terms that fail contract validation.
    #[error("provider produced invalid terms: {source}")]
    InvalidTerms {
        /// The underlying contract error.
        #[from]
        source: ContractError,
    },

    /// An internal provider failure.
    #[error("negotiation provider error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

/// Source of signed contracts for one step.
///
/// Implementations may be as simple as [`SilentNegotiation`] or as
/// involved as an external negotiation service; the world only requires
/// that the returned batch is complete when the call returns. Drafts
/// are signed and registered by the world in batch order.
pub trait NegotiationProvider {
    /// Produce this step's contract drafts as one atomic batch.
    ///
    /// `pairs` lists every admissible seller/buyer combination in
    /// deterministic order; `views` holds the read-only market facts
    /// per live agent; `strategies` are the per-agent deciders the
    /// provider may consult for quotes.
    ///
    /// # Errors
    ///
    /// Returns a [`NegotiationError`] if the provider cannot produce a
    /// batch; the step is then aborted before any state changes.
    fn negotiate(
        &mut self,
        step: u64,
        pairs: &[TradingPair],
        views: &BTreeMap<AgentId, MarketView>,
        strategies: &mut BTreeMap<AgentId, Box<dyn FactoryStrategy>>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ContractDraft>, NegotiationError>;
}

/// A provider that never produces a contract.
///
/// Useful for tests and for running worlds on their exogenous schedules
/// alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNegotiation;

impl SilentNegotiation {
    /// Create a new silent provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NegotiationProvider for SilentNegotiation {
    fn negotiate(
        &mut self,
        _step: u64,
        _pairs: &[TradingPair],
        _views: &BTreeMap<AgentId, MarketView>,
        _strategies: &mut BTreeMap<AgentId, Box<dyn FactoryStrategy>>,
        _rng: &mut dyn RngCore,
    ) -> Result<Vec<ContractDraft>, NegotiationError> {
        Ok(Vec::new())
    }
}

/// Single-round quote matching.
///
/// For every admissible pair, the seller is asked for an ask quote and
/// the buyer for a bid quote. When the books cross (bid price at or
/// above ask price), a contract draft is formed for the smaller of the
/// two quantities at the midpoint price. Either side may decline by
/// returning no quote.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteMatcher;

impl QuoteMatcher {
    /// Create a new quote matcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NegotiationProvider for QuoteMatcher {
    fn negotiate(
        &mut self,
        step: u64,
        pairs: &[TradingPair],
        views: &BTreeMap<AgentId, MarketView>,
        strategies: &mut BTreeMap<AgentId, Box<dyn FactoryStrategy>>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ContractDraft>, NegotiationError> {
        let mut drafts = Vec::new();
        for pair in pairs {
            let (Some(seller_view), Some(buyer_view)) =
                (views.get(&pair.seller), views.get(&pair.buyer))
            else {
                continue;
            };
            // The seller quotes first; pair order is deterministic, so
            // the RNG consumption order is too.
            let ask = strategies
                .get_mut(&pair.seller)
                .and_then(|s| s.quote(seller_view, TradeRole::Seller, pair.buyer, rng));
            let Some(ask) = ask else {
                trace!(step, seller = %pair.seller, buyer = %pair.buyer, "seller declined");
                continue;
            };
            let bid = strategies
                .get_mut(&pair.buyer)
                .and_then(|s| s.quote(buyer_view, TradeRole::Buyer, pair.seller, rng));
            let Some(bid) = bid else {
                trace!(step, seller = %pair.seller, buyer = %pair.buyer, "buyer declined");
                continue;
            };
            if let Some(draft) = match_quotes(pair, ask, bid)? {
                debug!(
                    step,
                    seller = %pair.seller,
                    buyer = %pair.buyer,
                    quantity = draft.quantity,
                    unit_price = %draft.unit_price,
                    "books crossed"
                );
                drafts.push(draft);
            }
        }
        Ok(drafts)
    }
}

/// Form a draft when the bid meets or exceeds the ask.
fn match_quotes(
    pair: &TradingPair,
    ask: Quote,
    bid: Quote,
) -> Result<Option<ContractDraft>, NegotiationError> {
    if bid.unit_price < ask.unit_price {
        return Ok(None);
    }
    let quantity = ask.quantity.min(bid.quantity);
    if quantity == 0 {
        return Ok(None);
    }
    let unit_price = midpoint(ask.unit_price, bid.unit_price);
    let annotation = ContractAnnotation::new(
        pair.product,
        Party::Factory(pair.buyer),
        Party::Factory(pair.seller),
    );
    let draft = ContractDraft::new(quantity, unit_price, annotation)?;
    Ok(Some(draft))
}

fn midpoint(ask: Decimal, bid: Decimal) -> Decimal {
    ask.saturating_add(bid)
        .checked_div(Decimal::TWO)
        .unwrap_or(ask)
}
