//! Chain topology: which agents sit at which production level, and who
//! may trade with whom.
//!
//! Agents are assigned level by level at world build, so agent id order
//! equals level order: the first `agents_per_level` ids are level 0, the
//! next block level 1, and so on. Trade is only possible between
//! adjacent levels, always in the direction of the chain.

use std::collections::BTreeSet;

use cascade_types::{AgentId, Process, Product};

/// One admissible seller/buyer pairing for a negotiation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingPair {
    /// The selling agent (one level below the buyer).
    pub seller: AgentId,
    /// The buying agent.
    pub buyer: AgentId,
    /// The product that would change hands: the seller's output.
    pub product: Product,
}

/// The static shape of the production chain.
///
/// Built once from a validated config and never mutated; bankruptcy
/// filtering happens at pair enumeration time, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTopology {
    n_processes: u32,
    agents_per_level: u32,
}

impl ChainTopology {
    /// Create a topology of `n_processes` levels with `agents_per_level`
    /// agents on each.
    #[must_use]
    pub const fn new(n_processes: u32, agents_per_level: u32) -> Self {
        Self {
            n_processes,
            agents_per_level,
        }
    }

    /// Number of production levels (equal to the number of processes).
    #[must_use]
    pub const fn n_levels(&self) -> u32 {
        self.n_processes
    }

    /// Agents on each level.
    #[must_use]
    pub const fn agents_per_level(&self) -> u32 {
        self.agents_per_level
    }

    /// Total number of agents in the world.
    #[must_use]
    pub const fn n_agents(&self) -> u32 {
        self.n_processes.saturating_mul(self.agents_per_level)
    }

    /// All agent ids in id order.
    pub fn all_agents(&self) -> impl Iterator<Item = AgentId> {
        (0..self.n_agents()).map(AgentId::new)
    }

    /// The production level of `agent`, or `None` for an unknown id.
    #[must_use]
    pub const fn level_of(&self, agent: AgentId) -> Option<u32> {
        let index = agent.into_inner();
        if index >= self.n_agents() {
            return None;
        }
        match index.checked_div(self.agents_per_level) {
            Some(level) => Some(level),
            None => None,
        }
    }

    /// The process `agent` runs, or `None` for an unknown id.
    #[must_use]
    pub const fn process_of(&self, agent: AgentId) -> Option<Process> {
        match self.level_of(agent) {
            Some(level) => Some(Process::new(level)),
            None => None,
        }
    }

    /// The product `agent` consumes, or `None` for an unknown id.
    #[must_use]
    pub const fn input_product_of(&self, agent: AgentId) -> Option<Product> {
        match self.process_of(agent) {
            Some(process) => Some(process.input()),
            None => None,
        }
    }

    /// The product `agent` produces, or `None` for an unknown id.
    #[must_use]
    pub const fn output_product_of(&self, agent: AgentId) -> Option<Product> {
        match self.process_of(agent) {
            Some(process) => Some(process.output()),
            None => None,
        }
    }

    /// Agent ids at `level`, empty for a level outside the chain.
    #[must_use]
    pub fn agents_at_level(&self, level: u32) -> Vec<AgentId> {
        if level >= self.n_processes {
            return Vec::new();
        }
        let start = level.saturating_mul(self.agents_per_level);
        let end = start.saturating_add(self.agents_per_level);
        (start..end).map(AgentId::new).collect()
    }

    /// The agents one level below `agent` that may sell to it. Empty
    /// for level 0, which buys only from the external supplier.
    #[must_use]
    pub fn suppliers_of(&self, agent: AgentId) -> Vec<AgentId> {
        match self.level_of(agent) {
            Some(level) if level > 0 => self.agents_at_level(level.saturating_sub(1)),
            _ => Vec::new(),
        }
    }

    /// The agents one level above `agent` that may buy from it. Empty
    /// for the last level, which sells only to the external consumer.
    #[must_use]
    pub fn consumers_of(&self, agent: AgentId) -> Vec<AgentId> {
        match self.level_of(agent) {
            Some(level) => self.agents_at_level(level.saturating_add(1)),
            None => Vec::new(),
        }
    }

    /// Enumerate every admissible seller/buyer pair for a negotiation
    /// round, skipping bankrupt agents on either side.
    ///
    /// The order is deterministic: ascending seller level, then seller
    /// id, then buyer id.
    #[must_use]
    pub fn eligible_pairs(&self, bankrupt: &BTreeSet<AgentId>) -> Vec<TradingPair> {
        let mut pairs = Vec::new();
        for seller_level in 0..self.n_processes.saturating_sub(1) {
            let buyer_level = seller_level.saturating_add(1);
            let product = Product::new(buyer_level);
            for seller in self.agents_at_level(seller_level) {
                if bankrupt.contains(&seller) {
                    continue;
                }
                for buyer in self.agents_at_level(buyer_level) {
                    if bankrupt.contains(&buyer) {
                        continue;
                    }
                    pairs.push(TradingPair {
                        seller,
                        buyer,
                        product,
                    });
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_by_two() -> ChainTopology {
        ChainTopology::new(3, 2)
    }

    #[test]
    fn levels_follow_id_order() {
        let topology = three_by_two();
        assert_eq!(topology.n_agents(), 6);
        assert_eq!(topology.level_of(AgentId::new(0)), Some(0));
        assert_eq!(topology.level_of(AgentId::new(1)), Some(0));
        assert_eq!(topology.level_of(AgentId::new(2)), Some(1));
        assert_eq!(topology.level_of(AgentId::new(5)), Some(2));
        assert_eq!(topology.level_of(AgentId::new(6)), None);
    }

    #[test]
    fn products_follow_process() {
        let topology = three_by_two();
        assert_eq!(
            topology.input_product_of(AgentId::new(2)),
            Some(Product::new(1))
        );
        assert_eq!(
            topology.output_product_of(AgentId::new(2)),
            Some(Product::new(2))
        );
    }

    #[test]
    fn edges_of_the_chain_have_no_factory_partners() {
        let topology = three_by_two();
        assert!(topology.suppliers_of(AgentId::new(0)).is_empty());
        assert!(topology.consumers_of(AgentId::new(4)).is_empty());
    }

    #[test]
    fn interior_agents_see_whole_adjacent_levels() {
        let topology = three_by_two();
        assert_eq!(
            topology.suppliers_of(AgentId::new(2)),
            vec![AgentId::new(0), AgentId::new(1)]
        );
        assert_eq!(
            topology.consumers_of(AgentId::new(2)),
            vec![AgentId::new(4), AgentId::new(5)]
        );
    }

    #[test]
    fn eligible_pairs_cover_adjacent_levels_in_order() {
        let topology = three_by_two();
        let pairs = topology.eligible_pairs(&BTreeSet::new());
        // 2 level gaps, 2x2 pairs each.
        assert_eq!(pairs.len(), 8);
        assert_eq!(
            pairs.first().copied(),
            Some(TradingPair {
                seller: AgentId::new(0),
                buyer: AgentId::new(2),
                product: Product::new(1),
            })
        );
        assert_eq!(
            pairs.last().copied(),
            Some(TradingPair {
                seller: AgentId::new(3),
                buyer: AgentId::new(5),
                product: Product::new(2),
            })
        );
    }

    #[test]
    fn bankrupt_agents_are_excluded_from_pairs() {
        let topology = three_by_two();
        let mut bankrupt = BTreeSet::new();
        bankrupt.insert(AgentId::new(0));
        let pairs = topology.eligible_pairs(&bankrupt);
        assert_eq!(pairs.len(), 6);
        assert!(pairs.iter().all(|pair| pair.seller != AgentId::new(0)));
    }
}
