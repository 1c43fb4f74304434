//! A strategy that quotes its outstanding need at its best price.

use rand::RngCore;
use tracing::trace;

use cascade_types::{AgentId, Contract, TradeRole};

use crate::strategy::{FactoryStrategy, Quote};
use crate::view::MarketView;

/// Quotes the factory's outstanding need at the favorable band edge.
///
/// The need is the factory's commitment for the step minus whatever
/// signed contracts have already secured:
///
/// - First-level factories sell what their exogenous supply delivers.
/// - Last-level factories buy what their exogenous sales demand.
/// - Interior factories carry an equal share of the goods entering the
///   chain this step, derived from the chain's exogenous totals.
///
/// Prices sit at the band edge that favors the quoting side, a
/// concession-free first offer: sellers ask the ceiling, buyers bid the
/// floor. Two greedy books therefore never cross under a single-round
/// matcher; crossing takes an accommodating counterpart.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GreedyTrader {
    step: Option<u64>,
    secured_input: u32,
    secured_output: u32,
}

impl GreedyTrader {
    /// Build a greedy trader with no secured quantities.
    pub const fn new() -> Self {
        Self {
            step: None,
            secured_input: 0,
            secured_output: 0,
        }
    }

    /// Reset the secured counters when the step changes.
    fn sync_step(&mut self, step: u64) {
        if self.step != Some(step) {
            self.step = Some(step);
            self.secured_input = 0;
            self.secured_output = 0;
        }
    }

    /// The factory's full commitment for this step on one side.
    fn commitment(view: &MarketView, role: TradeRole) -> u32 {
        match role {
            TradeRole::Seller if view.is_first_level() => view.exogenous.supply_quantity,
            TradeRole::Buyer if view.is_last_level() => view.exogenous.sale_quantity,
            TradeRole::Seller | TradeRole::Buyer => Self::interior_share(view),
        }
    }

    /// Equal share of the chain inflow for an interior factory.
    ///
    /// Adjacent levels have the same population in generated worlds, so
    /// the larger neighbour list stands in for the peer count.
    fn interior_share(view: &MarketView) -> u32 {
        let peers = view.suppliers.len().max(view.consumers.len()).max(1);
        let peers = u64::try_from(peers).unwrap_or(u64::MAX);
        let inflow = view.chain_totals.exogenous_supply;
        let base = inflow.checked_div(peers).unwrap_or(0);
        let extra = match inflow.checked_rem(peers) {
            Some(0) | None => 0,
            Some(_) => 1,
        };
        u32::try_from(base.saturating_add(extra)).unwrap_or(u32::MAX)
    }
}

impl FactoryStrategy for GreedyTrader {
    fn quote(
        &mut self,
        view: &MarketView,
        role: TradeRole,
        counterpart: AgentId,
        _rng: &mut dyn RngCore,
    ) -> Option<Quote> {
        self.sync_step(view.step);

        let secured = match role {
            TradeRole::Buyer => self.secured_input,
            TradeRole::Seller => self.secured_output,
        };
        let need = Self::commitment(view, role).saturating_sub(secured);
        if need == 0 {
            trace!(agent = %view.agent, ?role, %counterpart, "greedy need already covered");
            return None;
        }

        let product = match role {
            TradeRole::Buyer => view.input_product,
            TradeRole::Seller => view.output_product,
        };
        let (floor, ceiling) = view.trading_band(product);
        let unit_price = match role {
            TradeRole::Buyer => floor,
            TradeRole::Seller => ceiling,
        };
        trace!(agent = %view.agent, ?role, %counterpart, need, %unit_price, "greedy quote");
        Some(Quote::new(need, unit_price))
    }

    fn on_contract_signed(&mut self, view: &MarketView, contract: &Contract) {
        self.sync_step(view.step);
        match contract.role_of(view.agent) {
            Some(TradeRole::Buyer) => {
                self.secured_input = self.secured_input.saturating_add(contract.quantity);
            }
            Some(TradeRole::Seller) => {
                self.secured_output = self.secured_output.saturating_add(contract.quantity);
            }
            None => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_ledger::FactoryLedger;
    use cascade_types::{
        ContractAnnotation, ContractDraft, ContractId, FactoryProfile, Party, Product,
    };
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rust_decimal::Decimal;

    use super::*;
    use crate::view::{ChainTotals, StepExogenous};

    fn make_view(level: u32, n_processes: u32) -> MarketView {
        let agent = AgentId::new(4);
        let process_count = usize::try_from(n_processes).unwrap();
        MarketView {
            agent,
            level,
            input_product: Product::new(level),
            output_product: Product::new(level.saturating_add(1)),
            n_products: n_processes.saturating_add(1),
            n_processes,
            profile: FactoryProfile::with_zero_schedules(
                vec![vec![2; process_count]],
                8,
                process_count.saturating_add(1),
            ),
            ledger: FactoryLedger::new(agent, Decimal::from(1000)).snapshot(),
            step: 2,
            n_steps: 8,
            catalog_prices: vec![
                Decimal::from(20),
                Decimal::from(40),
                Decimal::from(60),
                Decimal::from(80),
            ],
            storage_cost: Decimal::from(4),
            delivery_penalty: Decimal::from(4),
            exogenous: StepExogenous {
                supply_quantity: 0,
                supply_price: Decimal::ZERO,
                sale_quantity: 0,
                sale_price: Decimal::ZERO,
            },
            suppliers: vec![AgentId::new(0), AgentId::new(1)],
            consumers: vec![AgentId::new(8), AgentId::new(9)],
            chain_totals: ChainTotals {
                exogenous_supply: 7,
                exogenous_sales: 7,
            },
        }
    }

    fn signed_sale(view: &MarketView, quantity: u32) -> Contract {
        let annotation = ContractAnnotation::new(
            view.output_product,
            Party::Factory(AgentId::new(8)),
            Party::Factory(view.agent),
        );
        ContractDraft::new(quantity, Decimal::from(50), annotation)
            .unwrap()
            .into_contract(ContractId::new(0), 2)
    }

    #[test]
    fn first_level_sells_its_exogenous_supply() {
        let mut strategy = GreedyTrader::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut view = make_view(0, 3);
        view.suppliers = Vec::new();
        view.exogenous.supply_quantity = 6;

        let quote = strategy
            .quote(&view, TradeRole::Seller, AgentId::new(8), &mut rng)
            .unwrap();
        assert_eq!(quote.quantity, 6);
        let (_, ceiling) = view.trading_band(view.output_product);
        assert_eq!(quote.unit_price, ceiling);
    }

    #[test]
    fn last_level_buys_its_exogenous_demand() {
        let mut strategy = GreedyTrader::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut view = make_view(2, 3);
        view.consumers = Vec::new();
        view.exogenous.sale_quantity = 5;

        let quote = strategy
            .quote(&view, TradeRole::Buyer, AgentId::new(0), &mut rng)
            .unwrap();
        assert_eq!(quote.quantity, 5);
        let (floor, _) = view.trading_band(view.input_product);
        assert_eq!(quote.unit_price, floor);
    }

    #[test]
    fn interior_need_is_a_chain_share() {
        let mut strategy = GreedyTrader::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let view = make_view(1, 3);

        // 7 units entering, 2 factories per level: share rounds up to 4.
        let quote = strategy
            .quote(&view, TradeRole::Buyer, AgentId::new(0), &mut rng)
            .unwrap();
        assert_eq!(quote.quantity, 4);
    }

    #[test]
    fn signed_contracts_shrink_the_need() {
        let mut strategy = GreedyTrader::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut view = make_view(0, 3);
        view.suppliers = Vec::new();
        view.exogenous.supply_quantity = 6;

        strategy.on_contract_signed(&view, &signed_sale(&view, 4));
        let quote = strategy
            .quote(&view, TradeRole::Seller, AgentId::new(8), &mut rng)
            .unwrap();
        assert_eq!(quote.quantity, 2);

        strategy.on_contract_signed(&view, &signed_sale(&view, 2));
        assert_eq!(
            strategy.quote(&view, TradeRole::Seller, AgentId::new(8), &mut rng),
            None
        );
    }

    #[test]
    fn secured_counters_reset_on_a_new_step() {
        let mut strategy = GreedyTrader::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut view = make_view(0, 3);
        view.suppliers = Vec::new();
        view.exogenous.supply_quantity = 6;

        strategy.on_contract_signed(&view, &signed_sale(&view, 6));
        assert_eq!(
            strategy.quote(&view, TradeRole::Seller, AgentId::new(8), &mut rng),
            None
        );

        view.step = 3;
        let quote = strategy
            .quote(&view, TradeRole::Seller, AgentId::new(8), &mut rng)
            .unwrap();
        assert_eq!(quote.quantity, 6);
    }

    #[test]
    fn zero_commitment_declines() {
        let mut strategy = GreedyTrader::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut view = make_view(1, 3);
        view.chain_totals.exogenous_supply = 0;

        assert_eq!(
            strategy.quote(&view, TradeRole::Seller, AgentId::new(8), &mut rng),
            None
        );
    }
}
