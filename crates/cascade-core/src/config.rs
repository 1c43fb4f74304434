//! Configuration loading and build-time validation for Cascade worlds.
//!
//! The canonical configuration lives in `cascade-config.yaml` at the
//! project root. [`WorldConfig`] mirrors the YAML structure with named
//! per-field defaults, so a partial file (or none at all) still yields a
//! usable config. Validation is a separate, explicit step: a config that
//! parses may still be rejected by [`WorldConfig::validate`] before any
//! step runs.

use std::path::Path;

use cascade_market::{CostError, StrategyKind, StrategyParams};
use cascade_types::{AgentId, FactoryProfile, Process, Product, ProductionRatio, ProfileError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::ClockError;
use crate::executor::BankruptcyGate;
use crate::worldgen;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Errors that make a configuration unusable for building a world.
///
/// All of these are fatal at build time; none of them can occur once a
/// run has started.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// The run must have at least one step.
    #[error("n_steps must be at least 1")]
    ZeroSteps,

    /// The chain must have at least one process.
    #[error("the chain must have at least one process")]
    ZeroProcesses,

    /// `process_inputs` and `process_outputs` disagree on chain length.
    #[error("process_inputs has {inputs} entries but process_outputs has {outputs}")]
    RatioListMismatch {
        /// Entries in `process_inputs`.
        inputs: usize,
        /// Entries in `process_outputs`.
        outputs: usize,
    },

    /// A production ratio consumes or yields zero units per run.
    #[error("{process} has a zero units-per-run ratio")]
    InvalidRatio {
        /// The offending process.
        process: Process,
    },

    /// An explicit catalog does not cover every product.
    #[error("catalog_prices has {found} entries, expected {expected}")]
    CatalogLength {
        /// One price per product.
        expected: usize,
        /// Entries actually present.
        found: usize,
    },

    /// A catalog price is negative.
    #[error("catalog price for {product} is negative: {price}")]
    NegativeCatalogPrice {
        /// The offending product.
        product: Product,
        /// The configured price.
        price: Decimal,
    },

    /// The world must have at least one agent.
    #[error("no agent profiles configured")]
    NoAgents,

    /// Agents cannot be split evenly across production levels.
    #[error("{agents} agents cannot be split evenly across {levels} levels")]
    UnevenLevels {
        /// Configured agent count.
        agents: usize,
        /// Configured level count.
        levels: usize,
    },

    /// `agent_types` is neither empty nor one entry per profile.
    #[error("agent_types has {found} entries, expected {expected} (or none)")]
    AgentTypesLength {
        /// One entry per profile.
        expected: usize,
        /// Entries actually present.
        found: usize,
    },

    /// `agent_params` is neither empty nor one entry per profile.
    #[error("agent_params has {found} entries, expected {expected} (or none)")]
    AgentParamsLength {
        /// One entry per profile.
        expected: usize,
        /// Entries actually present.
        found: usize,
    },

    /// An agent's profile is malformed for its assigned process.
    #[error("profile for {agent}: {source}")]
    Profile {
        /// The agent whose profile failed validation.
        agent: AgentId,
        /// The underlying profile error.
        #[source]
        source: ProfileError,
    },

    /// An agent's cost model could not be built.
    #[error("cost model for {agent}: {source}")]
    Cost {
        /// The agent whose cost model failed to build.
        agent: AgentId,
        /// The underlying cost error.
        #[source]
        source: CostError,
    },

    /// Every agent would start at or below the bankruptcy floor.
    #[error("initial_balance {initial_balance} is below bankruptcy_limit {bankruptcy_limit}")]
    InitialBalanceBelowFloor {
        /// Configured starting balance.
        initial_balance: Decimal,
        /// Configured bankruptcy floor.
        bankruptcy_limit: Decimal,
    },

    /// The step clock rejected the configured horizon.
    #[error("clock rejected configuration: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// Top-level world configuration.
///
/// Mirrors the structure of `cascade-config.yaml`. Chain-shaped fields
/// (`profiles`, `catalog_prices`, the agent lists) default to empty;
/// an empty `profiles` list means "generate a world" to the engine
/// binary, while [`WorldConfig::validate`] rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Units consumed per production run, one entry per process. The
    /// list length defines the chain length.
    #[serde(default = "default_process_inputs")]
    pub process_inputs: Vec<u32>,

    /// Units produced per production run, one entry per process.
    #[serde(default = "default_process_outputs")]
    pub process_outputs: Vec<u32>,

    /// Reference price per product. Empty derives `20 * (p + 1)`.
    #[serde(default)]
    pub catalog_prices: Vec<Decimal>,

    /// Per-agent strategy selection, order-aligned with `profiles`.
    /// Empty applies the default strategy to every agent.
    #[serde(default)]
    pub agent_types: Vec<StrategyKind>,

    /// Per-agent strategy parameters, order-aligned with `profiles`.
    /// Empty applies default parameters to every agent.
    #[serde(default)]
    pub agent_params: Vec<StrategyParams>,

    /// One factory profile per agent, listed level by level.
    #[serde(default)]
    pub profiles: Vec<FactoryProfile>,

    /// Terminal step count.
    #[serde(default = "default_n_steps")]
    pub n_steps: u64,

    /// Starting balance for every ledger.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,

    /// Balance floor at or below which bankruptcy triggers.
    #[serde(default = "default_bankruptcy_limit")]
    pub bankruptcy_limit: Decimal,

    /// Auto-fill unmet production input from the external source at
    /// catalog price instead of leaving it as a breach.
    #[serde(default)]
    pub buy_missing_products: bool,

    /// Per-unit settlement rate on residual inventory.
    #[serde(default = "default_storage_cost")]
    pub storage_cost: Decimal,

    /// Per-unit settlement rate on unmet output commitments.
    #[serde(default = "default_delivery_penalty")]
    pub delivery_penalty: Decimal,

    /// Which signal gates bankruptcy.
    #[serde(default, with = "serde_yml::with::singleton_map")]
    pub bankruptcy_gate: BankruptcyGate,

    /// Seed for the explicit RNG handle.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            process_inputs: default_process_inputs(),
            process_outputs: default_process_outputs(),
            catalog_prices: Vec::new(),
            agent_types: Vec::new(),
            agent_params: Vec::new(),
            profiles: Vec::new(),
            n_steps: default_n_steps(),
            initial_balance: default_initial_balance(),
            bankruptcy_limit: default_bankruptcy_limit(),
            buy_missing_products: false,
            storage_cost: default_storage_cost(),
            delivery_penalty: default_delivery_penalty(),
            bankruptcy_gate: BankruptcyGate::BalanceOnly,
            seed: default_seed(),
        }
    }
}

impl WorldConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Number of processes in the chain.
    #[must_use]
    pub const fn n_processes(&self) -> usize {
        self.process_inputs.len()
    }

    /// Number of products in the chain (one more than processes).
    #[must_use]
    pub const fn n_products(&self) -> usize {
        self.process_inputs.len().saturating_add(1)
    }

    /// Number of configured agents.
    #[must_use]
    pub const fn n_agents(&self) -> usize {
        self.profiles.len()
    }

    /// Agents per production level, zero if the split is not even.
    #[must_use]
    pub fn agents_per_level(&self) -> usize {
        self.profiles
            .len()
            .checked_div(self.n_processes())
            .unwrap_or(0)
    }

    /// The catalog actually in force: the explicit one, or the derived
    /// `20 * (p + 1)` ladder when none is configured.
    #[must_use]
    pub fn effective_catalog(&self) -> Vec<Decimal> {
        if self.catalog_prices.is_empty() {
            worldgen::default_catalog(self.n_products())
        } else {
            self.catalog_prices.clone()
        }
    }

    /// Production ratios per process, zipped from the input/output lists.
    #[must_use]
    pub fn ratios(&self) -> Vec<ProductionRatio> {
        self.process_inputs
            .iter()
            .zip(&self.process_outputs)
            .map(|(&inputs, &outputs)| ProductionRatio::new(inputs, outputs))
            .collect()
    }

    /// Strategy kind for the agent at `index`, defaulting when the
    /// `agent_types` list is empty.
    #[must_use]
    pub fn strategy_kind_of(&self, index: usize) -> StrategyKind {
        self.agent_types.get(index).copied().unwrap_or_default()
    }

    /// Strategy parameters for the agent at `index`, defaulting when
    /// the `agent_params` list is empty.
    #[must_use]
    pub fn strategy_params_of(&self, index: usize) -> StrategyParams {
        self.agent_params.get(index).copied().unwrap_or_default()
    }

    /// Replace the chain-shaped fields (processes, catalog, profiles,
    /// step count) with those of `chain`, keeping this config's scalar
    /// settings. Per-agent strategy lists are kept only when they
    /// already cover the new agent count.
    pub fn adopt_chain(&mut self, chain: Self) {
        let n_agents = chain.profiles.len();
        self.process_inputs = chain.process_inputs;
        self.process_outputs = chain.process_outputs;
        self.catalog_prices = chain.catalog_prices;
        self.profiles = chain.profiles;
        self.n_steps = chain.n_steps;
        if self.agent_types.len() != n_agents {
            self.agent_types = chain.agent_types;
        }
        if self.agent_params.len() != n_agents {
            self.agent_params = chain.agent_params;
        }
    }

    /// Check that this configuration can build a runnable world.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found. The checks cover
    /// the chain shape, the catalog, the agent lists, every profile
    /// against its assigned process, and the balance floor.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.n_steps == 0 {
            return Err(ConfigurationError::ZeroSteps);
        }
        let levels = self.n_processes();
        if levels == 0 {
            return Err(ConfigurationError::ZeroProcesses);
        }
        if self.process_inputs.len() != self.process_outputs.len() {
            return Err(ConfigurationError::RatioListMismatch {
                inputs: self.process_inputs.len(),
                outputs: self.process_outputs.len(),
            });
        }
        for (index, ratio) in self.ratios().iter().enumerate() {
            if !ratio.is_valid() {
                return Err(ConfigurationError::InvalidRatio {
                    process: Process::new(index_as_u32(index)),
                });
            }
        }

        let n_products = self.n_products();
        if !self.catalog_prices.is_empty() && self.catalog_prices.len() != n_products {
            return Err(ConfigurationError::CatalogLength {
                expected: n_products,
                found: self.catalog_prices.len(),
            });
        }
        for (index, price) in self.catalog_prices.iter().enumerate() {
            if price.is_sign_negative() && !price.is_zero() {
                return Err(ConfigurationError::NegativeCatalogPrice {
                    product: Product::new(index_as_u32(index)),
                    price: *price,
                });
            }
        }

        let agents = self.profiles.len();
        if agents == 0 {
            return Err(ConfigurationError::NoAgents);
        }
        match agents.checked_rem(levels) {
            Some(0) => {}
            _ => {
                return Err(ConfigurationError::UnevenLevels { agents, levels });
            }
        }
        if !self.agent_types.is_empty() && self.agent_types.len() != agents {
            return Err(ConfigurationError::AgentTypesLength {
                expected: agents,
                found: self.agent_types.len(),
            });
        }
        if !self.agent_params.is_empty() && self.agent_params.len() != agents {
            return Err(ConfigurationError::AgentParamsLength {
                expected: agents,
                found: self.agent_params.len(),
            });
        }

        let per_level = self.agents_per_level().max(1);
        for (index, profile) in self.profiles.iter().enumerate() {
            let level = index.checked_div(per_level).unwrap_or(0);
            let process = Process::new(index_as_u32(level));
            profile
                .validate(self.n_steps, n_products, process)
                .map_err(|source| ConfigurationError::Profile {
                    agent: AgentId::new(index_as_u32(index)),
                    source,
                })?;
        }

        if self.initial_balance < self.bankruptcy_limit {
            return Err(ConfigurationError::InitialBalanceBelowFloor {
                initial_balance: self.initial_balance,
                bankruptcy_limit: self.bankruptcy_limit,
            });
        }
        Ok(())
    }
}

fn index_as_u32(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_process_inputs() -> Vec<u32> {
    vec![1, 1]
}

fn default_process_outputs() -> Vec<u32> {
    vec![1, 1]
}

const fn default_n_steps() -> u64 {
    50
}

const fn default_initial_balance() -> Decimal {
    Decimal::ONE_THOUSAND
}

const fn default_bankruptcy_limit() -> Decimal {
    Decimal::ZERO
}

const fn default_storage_cost() -> Decimal {
    Decimal::TWO
}

fn default_delivery_penalty() -> Decimal {
    Decimal::from(5)
}

const fn default_seed() -> u64 {
    42
}

#[cfg(test)]
mod tests {
    use cascade_types::INFINITE_COST;
    use rust_decimal_macros::dec;

    use super::*;

    fn two_level_profiles(n_steps: u64) -> Vec<FactoryProfile> {
        let steps = usize::try_from(n_steps).unwrap_or(usize::MAX);
        vec![
            FactoryProfile::with_zero_schedules(vec![vec![2, INFINITE_COST]], steps, 3),
            FactoryProfile::with_zero_schedules(vec![vec![INFINITE_COST, 3]], steps, 3),
        ]
    }

    #[test]
    fn default_config_values() {
        let config = WorldConfig::default();
        assert_eq!(config.n_steps, 50);
        assert_eq!(config.seed, 42);
        assert_eq!(config.initial_balance, Decimal::ONE_THOUSAND);
        assert_eq!(config.bankruptcy_limit, Decimal::ZERO);
        assert_eq!(config.storage_cost, Decimal::TWO);
        assert_eq!(config.delivery_penalty, dec!(5));
        assert!(!config.buy_missing_products);
        assert_eq!(config.bankruptcy_gate, BankruptcyGate::BalanceOnly);
        assert!(config.profiles.is_empty());
        assert_eq!(config.n_processes(), 2);
        assert_eq!(config.n_products(), 3);
    }

    #[test]
    fn default_config_has_no_agents() {
        let config = WorldConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::NoAgents)
        ));
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
n_steps: 4
seed: 9
initial_balance: 500
bankruptcy_limit: -100
buy_missing_products: true
storage_cost: 1
delivery_penalty: 3
bankruptcy_gate:
  breach_level:
    threshold: 0.5
process_inputs: [1, 1]
process_outputs: [1, 1]
catalog_prices: [20, 40, 60]
agent_types: [random, do_nothing]
agent_params:
  - max_quantity: 5
  - {}
profiles:
  - costs: [[2, 4294967295], [3, 4294967295]]
    external_supplies: [[3, 0, 0], [3, 0, 0], [0, 0, 0], [0, 0, 0]]
    external_supply_prices: [[10, 0, 0], [10, 0, 0], [0, 0, 0], [0, 0, 0]]
    external_sales: [[0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0]]
    external_sale_prices: [[0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0]]
  - costs: [[4294967295, 5], [4294967295, 2]]
    external_supplies: [[0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0]]
    external_supply_prices: [[0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0]]
    external_sales: [[0, 0, 3], [0, 0, 3], [0, 0, 0], [0, 0, 0]]
    external_sale_prices: [[0, 0, 60], [0, 0, 60], [0, 0, 0], [0, 0, 0]]
"#;
        let config = WorldConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.n_steps, 4);
        assert_eq!(config.seed, 9);
        assert_eq!(config.initial_balance, dec!(500));
        assert_eq!(config.bankruptcy_limit, dec!(-100));
        assert!(config.buy_missing_products);
        assert_eq!(
            config.bankruptcy_gate,
            BankruptcyGate::BreachLevel {
                threshold: dec!(0.5)
            }
        );
        assert_eq!(config.agent_types.first().copied(), Some(StrategyKind::Random));
        assert_eq!(
            config.agent_types.get(1).copied(),
            Some(StrategyKind::DoNothing)
        );
        assert_eq!(
            config.agent_params.first().map(|p| p.max_quantity),
            Some(5)
        );
        assert_eq!(config.n_agents(), 2);
        assert_eq!(config.agents_per_level(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "n_steps: 12\n";
        let config = WorldConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        // The one override sticks
        assert_eq!(config.n_steps, 12);
        // Everything else uses defaults
        assert_eq!(config.seed, 42);
        assert_eq!(config.initial_balance, Decimal::ONE_THOUSAND);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn parse_empty_yaml() {
        let config = WorldConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn uneven_levels_rejected() {
        let mut profiles = two_level_profiles(50);
        profiles.push(FactoryProfile::with_zero_schedules(vec![vec![1, 1]], 50, 3));
        let config = WorldConfig {
            profiles,
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::UnevenLevels {
                agents: 3,
                levels: 2
            })
        ));
    }

    #[test]
    fn mismatched_agent_types_rejected() {
        let config = WorldConfig {
            profiles: two_level_profiles(50),
            agent_types: vec![StrategyKind::Greedy],
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::AgentTypesLength {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn zero_steps_rejected() {
        let config = WorldConfig {
            n_steps: 0,
            profiles: two_level_profiles(50),
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ZeroSteps)
        ));
    }

    #[test]
    fn initial_balance_below_floor_rejected() {
        let config = WorldConfig {
            profiles: two_level_profiles(50),
            initial_balance: dec!(-50),
            bankruptcy_limit: Decimal::ZERO,
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InitialBalanceBelowFloor { .. })
        ));
    }

    #[test]
    fn wrong_schedule_shape_rejected() {
        // Schedules sized for 10 steps in a 50-step world.
        let config = WorldConfig {
            profiles: two_level_profiles(10),
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Profile { .. })
        ));
    }

    #[test]
    fn effective_catalog_derives_when_unset() {
        let config = WorldConfig::default();
        assert_eq!(config.effective_catalog(), vec![dec!(20), dec!(40), dec!(60)]);

        let explicit = WorldConfig {
            catalog_prices: vec![dec!(5), dec!(6), dec!(7)],
            ..WorldConfig::default()
        };
        assert_eq!(explicit.effective_catalog(), vec![dec!(5), dec!(6), dec!(7)]);
    }

    #[test]
    fn adopt_chain_keeps_scalars() {
        let mut config = WorldConfig {
            initial_balance: dec!(250),
            storage_cost: dec!(9),
            agent_types: vec![StrategyKind::Greedy],
            ..WorldConfig::default()
        };

        let chain = WorldConfig {
            profiles: two_level_profiles(30),
            catalog_prices: vec![dec!(20), dec!(40), dec!(60)],
            n_steps: 30,
            agent_types: vec![StrategyKind::DoNothing; 2],
            agent_params: vec![StrategyParams::default(); 2],
            ..WorldConfig::default()
        };

        config.adopt_chain(chain);
        assert_eq!(config.initial_balance, dec!(250));
        assert_eq!(config.storage_cost, dec!(9));
        assert_eq!(config.n_steps, 30);
        assert_eq!(config.n_agents(), 2);
        // The one-entry type list did not cover the new agents.
        assert_eq!(config.agent_types, vec![StrategyKind::DoNothing; 2]);
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("cascade-config.yaml");
        if path.exists() {
            let config = WorldConfig::from_file(&path);
            assert!(config.is_ok(), "failed to load project config: {config:?}");
        }
    }
}
