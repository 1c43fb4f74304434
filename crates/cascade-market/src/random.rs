//! A strategy that quotes uniformly at random inside the catalog band.

use rand::{Rng, RngCore};
use rust_decimal::Decimal;

use cascade_types::{AgentId, TradeRole};

use crate::strategy::{FactoryStrategy, Quote};
use crate::view::MarketView;

/// Resolution of the price draw inside the band.
const PRICE_STEPS: u32 = 1000;

/// Quotes a random quantity and a random price inside the band.
///
/// Useful as negotiation background noise and as the counterpart that
/// actually trades in matcher-based integration tests. Every draw goes
/// through the RNG handle passed to [`quote`], so a seeded run produces
/// the same quotes every time.
///
/// [`quote`]: FactoryStrategy::quote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomTrader {
    max_quantity: u32,
}

impl RandomTrader {
    /// Build a random trader quoting between one and `max_quantity`
    /// units. A zero cap is treated as one.
    pub const fn new(max_quantity: u32) -> Self {
        Self { max_quantity }
    }
}

impl FactoryStrategy for RandomTrader {
    fn quote(
        &mut self,
        view: &MarketView,
        role: TradeRole,
        _counterpart: AgentId,
        rng: &mut dyn RngCore,
    ) -> Option<Quote> {
        let product = match role {
            TradeRole::Buyer => view.input_product,
            TradeRole::Seller => view.output_product,
        };
        let quantity = rng.random_range(1..=self.max_quantity.max(1));

        // Integer roll scaled into the band keeps the price a Decimal.
        let (floor, ceiling) = view.trading_band(product);
        let spread = ceiling.saturating_sub(floor);
        let roll: u32 = rng.random_range(0..=PRICE_STEPS);
        let fraction = Decimal::from(roll)
            .checked_div(Decimal::from(PRICE_STEPS))
            .unwrap_or(Decimal::ZERO);
        let unit_price = floor.saturating_add(spread.saturating_mul(fraction));

        Some(Quote::new(quantity, unit_price))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_ledger::FactoryLedger;
    use cascade_types::{FactoryProfile, Product};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::view::{ChainTotals, StepExogenous};

    fn make_view() -> MarketView {
        let agent = AgentId::new(5);
        MarketView {
            agent,
            level: 1,
            input_product: Product::new(1),
            output_product: Product::new(2),
            n_products: 3,
            n_processes: 2,
            profile: FactoryProfile::with_zero_schedules(vec![vec![2, 4]], 4, 3),
            ledger: FactoryLedger::new(agent, Decimal::from(500)).snapshot(),
            step: 1,
            n_steps: 4,
            catalog_prices: vec![Decimal::from(20), Decimal::from(40), Decimal::from(60)],
            storage_cost: Decimal::from(5),
            delivery_penalty: Decimal::from(5),
            exogenous: StepExogenous {
                supply_quantity: 0,
                supply_price: Decimal::ZERO,
                sale_quantity: 0,
                sale_price: Decimal::ZERO,
            },
            suppliers: vec![AgentId::new(0), AgentId::new(1)],
            consumers: vec![AgentId::new(8), AgentId::new(9)],
            chain_totals: ChainTotals {
                exogenous_supply: 10,
                exogenous_sales: 10,
            },
        }
    }

    #[test]
    fn quotes_stay_inside_the_band() {
        let mut strategy = RandomTrader::new(6);
        let mut rng = SmallRng::seed_from_u64(11);
        let view = make_view();
        let (floor, ceiling) = view.trading_band(view.output_product);

        for _ in 0..64 {
            let quote = strategy
                .quote(&view, TradeRole::Seller, AgentId::new(8), &mut rng)
                .unwrap();
            assert!(quote.quantity >= 1 && quote.quantity <= 6);
            assert!(quote.unit_price >= floor && quote.unit_price <= ceiling);
        }
    }

    #[test]
    fn buyer_quotes_price_the_input_product() {
        let mut strategy = RandomTrader::new(4);
        let mut rng = SmallRng::seed_from_u64(11);
        let view = make_view();
        let (floor, ceiling) = view.trading_band(view.input_product);

        for _ in 0..64 {
            let quote = strategy
                .quote(&view, TradeRole::Buyer, AgentId::new(0), &mut rng)
                .unwrap();
            assert!(quote.unit_price >= floor && quote.unit_price <= ceiling);
        }
    }

    #[test]
    fn same_seed_reproduces_the_quote_sequence() {
        let view = make_view();
        let mut first = Vec::new();
        let mut second = Vec::new();

        for quotes in [&mut first, &mut second] {
            let mut strategy = RandomTrader::new(9);
            let mut rng = SmallRng::seed_from_u64(2024);
            for _ in 0..12 {
                quotes.push(strategy.quote(&view, TradeRole::Seller, AgentId::new(8), &mut rng));
            }
        }

        assert_eq!(first, second);
    }

    #[test]
    fn zero_cap_still_quotes_one_unit() {
        let mut strategy = RandomTrader::new(0);
        let mut rng = SmallRng::seed_from_u64(3);
        let view = make_view();

        let quote = strategy
            .quote(&view, TradeRole::Seller, AgentId::new(8), &mut rng)
            .unwrap();
        assert_eq!(quote.quantity, 1);
    }
}
