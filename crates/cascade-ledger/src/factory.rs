//! Per-factory economic state: balance, inventory, bankruptcy flag.
//!
//! The [`FactoryLedger`] is the only mutable state a factory owns. All
//! mutation goes through checked methods -- no silent overflows, no
//! panics, and no partial updates: a failed operation leaves the ledger
//! exactly as it was.
//!
//! Balances are signed and may go negative; debt is legal and only the
//! executor's bankruptcy check acts on it. Inventories are unsigned and
//! can never go negative: a release of more units than the factory holds
//! is refused.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cascade_types::{AgentId, Product};

use crate::LedgerError;

/// Live economic state of one factory agent.
///
/// Created at world build with the configured initial balance and an
/// empty inventory. The bankruptcy flag is monotonic: once set it never
/// clears for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryLedger {
    /// The owning agent.
    agent: AgentId,
    /// Signed money balance.
    balance: Decimal,
    /// Units held per product. Products with zero units carry no key.
    inventory: BTreeMap<Product, u32>,
    /// Whether the agent has crossed the bankruptcy floor.
    bankrupt: bool,
}

impl FactoryLedger {
    /// Create a ledger for `agent` with the given starting balance and an
    /// empty inventory.
    pub const fn new(agent: AgentId, initial_balance: Decimal) -> Self {
        Self {
            agent,
            balance: initial_balance,
            inventory: BTreeMap::new(),
            bankrupt: false,
        }
    }

    /// The agent this ledger belongs to.
    pub const fn agent(&self) -> AgentId {
        self.agent
    }

    /// Current money balance.
    pub const fn balance(&self) -> Decimal {
        self.balance
    }

    /// Whether the agent has been marked bankrupt.
    pub const fn is_bankrupt(&self) -> bool {
        self.bankrupt
    }

    /// Units of `product` currently held.
    pub fn quantity_of(&self, product: Product) -> u32 {
        self.inventory.get(&product).copied().unwrap_or(0)
    }

    /// All held products and quantities.
    pub const fn inventory(&self) -> &BTreeMap<Product, u32> {
        &self.inventory
    }

    /// Total units held across all products.
    pub fn total_units(&self) -> u64 {
        self.inventory
            .values()
            .fold(0_u64, |total, qty| total.saturating_add(u64::from(*qty)))
    }

    /// Add `amount` to the balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NegativeAmount`] if `amount` is negative and
    /// [`LedgerError::BalanceOverflow`] if the addition overflows.
    pub fn credit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount.is_sign_negative() {
            return Err(LedgerError::NegativeAmount { amount });
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }

    /// Subtract `amount` from the balance.
    ///
    /// The balance is allowed to go negative; whether the resulting debt
    /// bankrupts the agent is the executor's decision, not the ledger's.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NegativeAmount`] if `amount` is negative and
    /// [`LedgerError::BalanceOverflow`] if the subtraction overflows.
    pub fn charge(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount.is_sign_negative() {
            return Err(LedgerError::NegativeAmount { amount });
        }
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }

    /// Add `quantity` units of `product` to the inventory.
    ///
    /// A zero quantity is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InventoryOverflow`] if the per-product
    /// counter would overflow. The inventory is unchanged on failure.
    pub fn receive(&mut self, product: Product, quantity: u32) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Ok(());
        }
        let current = self.quantity_of(product);
        let updated = current
            .checked_add(quantity)
            .ok_or(LedgerError::InventoryOverflow { product })?;
        self.inventory.insert(product, updated);
        Ok(())
    }

    /// Remove `quantity` units of `product` from the inventory.
    ///
    /// A zero quantity is a no-op. Removes the key entirely if the held
    /// quantity reaches zero.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientInventory`] if the factory holds
    /// fewer units than requested. The inventory is unchanged on failure.
    pub fn release(&mut self, product: Product, quantity: u32) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Ok(());
        }
        let available = self.quantity_of(product);
        if available < quantity {
            return Err(LedgerError::InsufficientInventory {
                product,
                available,
                requested: quantity,
            });
        }
        let remaining = available.saturating_sub(quantity);
        if remaining == 0 {
            self.inventory.remove(&product);
        } else {
            self.inventory.insert(product, remaining);
        }
        Ok(())
    }

    /// Remove and return all held units of `product`.
    ///
    /// Used at settlement when residual inventory is disposed of.
    pub fn drain(&mut self, product: Product) -> u32 {
        self.inventory.remove(&product).unwrap_or(0)
    }

    /// Mark the agent bankrupt. The flag never clears.
    pub const fn mark_bankrupt(&mut self) {
        self.bankrupt = true;
    }

    /// An immutable copy of the current state for reporting.
    pub fn snapshot(&self) -> FactorySnapshot {
        FactorySnapshot {
            agent: self.agent,
            balance: self.balance,
            inventory: self.inventory.clone(),
            bankrupt: self.bankrupt,
        }
    }
}

/// Point-in-time copy of a factory's economic state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorySnapshot {
    /// The agent the snapshot describes.
    pub agent: AgentId,
    /// Money balance at snapshot time.
    pub balance: Decimal,
    /// Units held per product at snapshot time.
    pub inventory: BTreeMap<Product, u32>,
    /// Whether the agent was bankrupt at snapshot time.
    pub bankrupt: bool,
}
