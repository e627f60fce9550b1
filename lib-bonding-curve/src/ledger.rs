//! Token Ledger
//!
//! Serialized-unit ledger consumed by the settlement orchestrator. Each mint
//! creates a new batch id; burns are authorized here, not by the pricing core.

use std::collections::{BTreeSet, HashMap};

use lib_types::{Address, BatchId};

use crate::errors::{CurveError, CurveResult};

/// Ledger of minted batches and their holders
pub trait TokenLedger {
    /// Mint `quantity` units of a fresh batch to `to`
    fn mint(&mut self, to: &Address, quantity: u64) -> CurveResult<BatchId>;

    /// Destroy `quantity` units of `batch_id` held by `from`
    fn burn(&mut self, from: &Address, batch_id: BatchId, quantity: u64) -> CurveResult<()>;

    /// Destroy several batches at once; all or nothing
    fn burn_batch(&mut self, from: &Address, batch_ids: &[BatchId], quantities: &[u64]) -> CurveResult<()>;

    fn balance_of(&self, owner: &Address, batch_id: BatchId) -> u64;

    /// Live units across all batches
    fn total_supply(&self) -> u64;
}

/// In-memory reference ledger
///
/// Batch ids are assigned sequentially from 1.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenLedger {
    last_batch: u64,
    balances: HashMap<(Address, BatchId), u64>,
    holdings: HashMap<Address, BTreeSet<BatchId>>,
    total_supply: u64,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches currently held by an owner, ascending
    pub fn batches_of(&self, owner: &Address) -> Vec<BatchId> {
        self.holdings
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of batches ever minted
    pub fn batch_count(&self) -> u64 {
        self.last_batch
    }

    /// Check a single burn against current balances
    fn check_burn(&self, from: &Address, batch_id: BatchId, quantity: u64) -> CurveResult<()> {
        if quantity == 0 {
            return Err(CurveError::InvalidQuantity("Burn quantity must be positive".to_string()));
        }
        if batch_id.value() == 0 || batch_id.value() > self.last_batch {
            return Err(CurveError::UnknownBatch(batch_id));
        }
        let have = self.balance_of(from, batch_id);
        if have == 0 {
            return Err(CurveError::Unauthorized(format!(
                "{} holds no units of batch {}",
                from, batch_id
            )));
        }
        if have < quantity {
            return Err(CurveError::InsufficientBalance {
                batch_id,
                have,
                need: quantity,
            });
        }
        Ok(())
    }

    fn debit(&mut self, from: &Address, batch_id: BatchId, quantity: u64) {
        let key = (*from, batch_id);
        let remaining = self.balances.get(&key).copied().unwrap_or(0) - quantity;
        if remaining == 0 {
            self.balances.remove(&key);
            if let Some(ids) = self.holdings.get_mut(from) {
                ids.remove(&batch_id);
                if ids.is_empty() {
                    self.holdings.remove(from);
                }
            }
        } else {
            self.balances.insert(key, remaining);
        }
        self.total_supply -= quantity;
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn mint(&mut self, to: &Address, quantity: u64) -> CurveResult<BatchId> {
        if quantity == 0 {
            return Err(CurveError::InvalidQuantity("Mint quantity must be positive".to_string()));
        }
        let batch_id = BatchId::new(self.last_batch)
            .next()
            .ok_or(CurveError::ArithmeticFault("batch id overflow"))?;
        let total_supply = self
            .total_supply
            .checked_add(quantity)
            .ok_or(CurveError::ArithmeticFault("ledger supply overflow"))?;

        self.last_batch = batch_id.value();
        self.total_supply = total_supply;
        self.balances.insert((*to, batch_id), quantity);
        self.holdings.entry(*to).or_default().insert(batch_id);
        Ok(batch_id)
    }

    fn burn(&mut self, from: &Address, batch_id: BatchId, quantity: u64) -> CurveResult<()> {
        self.check_burn(from, batch_id, quantity)?;
        self.debit(from, batch_id, quantity);
        Ok(())
    }

    fn burn_batch(&mut self, from: &Address, batch_ids: &[BatchId], quantities: &[u64]) -> CurveResult<()> {
        if batch_ids.len() != quantities.len() {
            return Err(CurveError::InvalidQuantity(format!(
                "{} batch ids but {} quantities",
                batch_ids.len(),
                quantities.len()
            )));
        }

        // Repeated ids are checked against their combined quantity
        let mut combined: HashMap<BatchId, u64> = HashMap::new();
        for (&batch_id, &quantity) in batch_ids.iter().zip(quantities) {
            if quantity == 0 {
                return Err(CurveError::InvalidQuantity("Burn quantity must be positive".to_string()));
            }
            let entry = combined.entry(batch_id).or_insert(0);
            *entry = entry
                .checked_add(quantity)
                .ok_or(CurveError::ArithmeticFault("burn quantity overflow"))?;
        }
        for (&batch_id, &quantity) in &combined {
            self.check_burn(from, batch_id, quantity)?;
        }

        for (batch_id, quantity) in combined {
            self.debit(from, batch_id, quantity);
        }
        Ok(())
    }

    fn balance_of(&self, owner: &Address, batch_id: BatchId) -> u64 {
        self.balances.get(&(*owner, batch_id)).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u64 {
        self.total_supply
    }
}
