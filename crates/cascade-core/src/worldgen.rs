//! Random world generation.
//!
//! [`generate`] lays out a standard tournament-style chain: unit
//! production ratios, a linear catalog, per-line costs drawn uniformly,
//! and exogenous schedules confined to the chain's edges. Supply for
//! the first level stops a few steps before the horizon and sales from
//! the last level start a few steps after zero, so every scheduled unit
//! has enough steps to cross the chain.
//!
//! Generation is deterministic for a given RNG state; the engine seeds
//! it from the run configuration.

use rand::Rng;
use rust_decimal::Decimal;

use cascade_types::{FactoryProfile, INFINITE_COST};

use crate::config::WorldConfig;

/// Resolution of price draws inside a band.
const PRICE_STEPS: u32 = 1000;

/// Highest per-unit line cost the generator will draw.
const MAX_LINE_COST: u32 = 6;

/// Shape of a generated world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenParams {
    /// Number of processes (production levels).
    pub n_processes: u32,
    /// Factories per level.
    pub n_agents_per_level: u32,
    /// Production lines per factory; also the scheduled units per step.
    pub n_lines: u32,
    /// Steps the run will execute.
    pub n_steps: u64,
}

impl Default for GenParams {
    fn default() -> Self {
        Self {
            n_processes: 2,
            n_agents_per_level: 2,
            n_lines: 10,
            n_steps: 50,
        }
    }
}

/// The derived reference catalog: `20 * (p + 1)` per product level.
#[must_use]
pub fn default_catalog(n_products: usize) -> Vec<Decimal> {
    (0..n_products)
        .map(|level| Decimal::from(20).saturating_mul(Decimal::from(level.saturating_add(1))))
        .collect()
}

/// Generate a complete random world configuration.
///
/// Line costs are uniform in `1..=6` on the assigned process and
/// infinite elsewhere. First-level supply is priced uniformly between
/// half catalog and catalog; last-level sales between catalog and
/// double catalog, matching the negotiation band. The returned config
/// keeps default scalars (balances, penalties, seed); callers layer
/// their own on top with [`WorldConfig::adopt_chain`].
pub fn generate(params: &GenParams, rng: &mut impl Rng) -> WorldConfig {
    let n_processes = params.n_processes.max(1);
    let per_level = params.n_agents_per_level.max(1);
    let n_products = usize::try_from(n_processes.saturating_add(1)).unwrap_or(usize::MAX);
    let catalog = default_catalog(n_products);

    let raw_price = catalog.first().copied().unwrap_or(Decimal::from(20));
    let final_price = catalog.last().copied().unwrap_or(Decimal::from(20));
    let context = GenContext {
        n_processes,
        n_lines: params.n_lines.max(1),
        n_steps: params.n_steps,
        n_products,
        raw_price,
        final_price,
        supply_end: params.n_steps.saturating_sub(u64::from(n_processes)),
        sales_start: u64::from(n_processes).min(params.n_steps),
    };

    let mut profiles = Vec::new();
    for level in 0..n_processes {
        for _slot in 0..per_level {
            profiles.push(generate_profile(&context, level, rng));
        }
    }

    let n_processes_len = usize::try_from(n_processes).unwrap_or(usize::MAX);
    WorldConfig {
        process_inputs: vec![1; n_processes_len],
        process_outputs: vec![1; n_processes_len],
        catalog_prices: catalog,
        agent_types: Vec::new(),
        agent_params: Vec::new(),
        profiles,
        n_steps: params.n_steps,
        ..WorldConfig::default()
    }
}

/// Shared generation inputs, bundled to keep call sites small.
struct GenContext {
    n_processes: u32,
    n_lines: u32,
    n_steps: u64,
    n_products: usize,
    raw_price: Decimal,
    final_price: Decimal,
    supply_end: u64,
    sales_start: u64,
}

fn generate_profile(context: &GenContext, level: u32, rng: &mut impl Rng) -> FactoryProfile {
    let costs: Vec<Vec<u32>> = (0..context.n_lines)
        .map(|_line| {
            (0..context.n_processes)
                .map(|process| {
                    if process == level {
                        rng.random_range(1..=MAX_LINE_COST)
                    } else {
                        INFINITE_COST
                    }
                })
                .collect()
        })
        .collect();
    let mut profile = FactoryProfile::with_zero_schedules(
        costs,
        usize::try_from(context.n_steps).unwrap_or(usize::MAX),
        context.n_products,
    );

    if level == 0 {
        let floor = context
            .raw_price
            .checked_div(Decimal::TWO)
            .unwrap_or(Decimal::ZERO);
        for step in 0..context.supply_end {
            let index = usize::try_from(step).unwrap_or(usize::MAX);
            if let Some(quantity) = profile
                .external_supplies
                .get_mut(index)
                .and_then(|row| row.first_mut())
            {
                *quantity = context.n_lines;
            }
            if let Some(price) = profile
                .external_supply_prices
                .get_mut(index)
                .and_then(|row| row.first_mut())
            {
                *price = price_between(floor, context.raw_price, rng);
            }
        }
    }
    if level.saturating_add(1) == context.n_processes {
        let ceiling = context.final_price.saturating_mul(Decimal::TWO);
        for step in context.sales_start..context.n_steps {
            let index = usize::try_from(step).unwrap_or(usize::MAX);
            if let Some(quantity) = profile
                .external_sales
                .get_mut(index)
                .and_then(|row| row.last_mut())
            {
                *quantity = context.n_lines;
            }
            if let Some(price) = profile
                .external_sale_prices
                .get_mut(index)
                .and_then(|row| row.last_mut())
            {
                *price = price_between(context.final_price, ceiling, rng);
            }
        }
    }
    profile
}

/// A uniform price draw in `[floor, ceiling]`, kept on the integer
/// grid of [`PRICE_STEPS`] so the result stays an exact `Decimal`.
fn price_between(floor: Decimal, ceiling: Decimal, rng: &mut impl Rng) -> Decimal {
    let spread = ceiling.saturating_sub(floor);
    let roll: u32 = rng.random_range(0..=PRICE_STEPS);
    let fraction = Decimal::from(roll)
        .checked_div(Decimal::from(PRICE_STEPS))
        .unwrap_or(Decimal::ZERO);
    floor.saturating_add(spread.saturating_mul(fraction))
}
