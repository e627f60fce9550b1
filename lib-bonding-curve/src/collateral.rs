//! Collateral Transfer
//!
//! Moves the curve's settlement asset between accounts. Exactly one asset is
//! active per curve. Token collateral is pulled through an allowance granted
//! to the custody account; native collateral is pulled as the value attached
//! to the call. Pushes out of custody are direct transfers in both cases.
//!
//! Every call either completes in full or fails without moving anything.

use std::collections::HashMap;

use lib_types::{Address, Amount};

use crate::errors::{CurveError, CurveResult};
use crate::types::CollateralAsset;

/// Atomic movement of the settlement asset
pub trait CollateralTransfer {
    /// Asset this collaborator moves
    fn asset(&self) -> CollateralAsset;

    /// Move `amount` from a payer into custody
    fn pull(&mut self, asset: CollateralAsset, from: &Address, custody: &Address, amount: Amount) -> CurveResult<()>;

    /// Move `amount` out of custody to a recipient
    fn push(&mut self, asset: CollateralAsset, custody: &Address, to: &Address, amount: Amount) -> CurveResult<()>;

    fn balance_of(&self, owner: &Address) -> Amount;
}

/// In-memory reference collateral for one asset
#[derive(Debug, Clone)]
pub struct InMemoryCollateral {
    asset: CollateralAsset,
    balances: HashMap<Address, Amount>,
    /// (owner, spender) -> remaining allowance
    allowances: HashMap<(Address, Address), Amount>,
}

impl InMemoryCollateral {
    pub fn new(asset: CollateralAsset) -> Self {
        Self {
            asset,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    pub fn native() -> Self {
        Self::new(CollateralAsset::Native)
    }

    /// Credit an account out of thin air
    pub fn deposit(&mut self, owner: &Address, amount: Amount) -> CurveResult<()> {
        let balance = self.balances.entry(*owner).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(CurveError::ArithmeticFault("collateral balance overflow"))?;
        Ok(())
    }

    /// Let `spender` pull up to `amount` of `owner`'s token collateral
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) {
        self.allowances.insert((*owner, *spender), amount);
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn check_asset(&self, asset: CollateralAsset) -> CurveResult<()> {
        if asset != self.asset {
            return Err(CurveError::AssetMismatch {
                expected: self.asset,
                actual: asset,
            });
        }
        Ok(())
    }

    fn move_funds(&mut self, from: &Address, to: &Address, amount: Amount) -> CurveResult<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let available = self.balance_of(from);
        let debited = available.checked_sub(amount).ok_or_else(|| {
            CurveError::TransferFailed(format!(
                "{} holds {}, needs {}",
                from, available, amount
            ))
        })?;
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(CurveError::ArithmeticFault("collateral balance overflow"))?;

        self.balances.insert(*from, debited);
        self.balances.insert(*to, credited);
        Ok(())
    }
}

impl CollateralTransfer for InMemoryCollateral {
    fn asset(&self) -> CollateralAsset {
        self.asset
    }

    fn pull(&mut self, asset: CollateralAsset, from: &Address, custody: &Address, amount: Amount) -> CurveResult<()> {
        self.check_asset(asset)?;
        if asset.is_native() {
            return self.move_funds(from, custody, amount);
        }

        let allowance = self.allowance(from, custody);
        let remaining = allowance.checked_sub(amount).ok_or_else(|| {
            CurveError::TransferFailed(format!(
                "allowance {} for custody is below {}",
                allowance, amount
            ))
        })?;
        self.move_funds(from, custody, amount)?;
        self.allowances.insert((*from, *custody), remaining);
        Ok(())
    }

    fn push(&mut self, asset: CollateralAsset, custody: &Address, to: &Address, amount: Amount) -> CurveResult<()> {
        self.check_asset(asset)?;
        self.move_funds(custody, to, amount)
    }

    fn balance_of(&self, owner: &Address) -> Amount {
        self.balances.get(owner).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::TokenId;

    fn payer() -> Address {
        Address::new([1u8; 32])
    }

    fn custody() -> Address {
        Address::new([0xCC; 32])
    }

    fn token() -> CollateralAsset {
        CollateralAsset::Token(TokenId::new([7u8; 32]))
    }

    #[test]
    fn test_native_pull_and_push() {
        let mut collateral = InMemoryCollateral::native();
        collateral.deposit(&payer(), 100).unwrap();

        collateral.pull(CollateralAsset::Native, &payer(), &custody(), 60).unwrap();
        assert_eq!(collateral.balance_of(&payer()), 40);
        assert_eq!(collateral.balance_of(&custody()), 60);

        collateral.push(CollateralAsset::Native, &custody(), &payer(), 15).unwrap();
        assert_eq!(collateral.balance_of(&custody()), 45);
        assert_eq!(collateral.balance_of(&payer()), 55);
    }

    #[test]
    fn test_token_pull_spends_allowance() {
        let mut collateral = InMemoryCollateral::new(token());
        collateral.deposit(&payer(), 100).unwrap();

        let result = collateral.pull(token(), &payer(), &custody(), 10);
        assert!(matches!(result, Err(CurveError::TransferFailed(_))));

        collateral.approve(&payer(), &custody(), 50);
        collateral.pull(token(), &payer(), &custody(), 30).unwrap();
        assert_eq!(collateral.allowance(&payer(), &custody()), 20);
        assert_eq!(collateral.balance_of(&custody()), 30);
    }

    #[test]
    fn test_failed_pull_moves_nothing() {
        let mut collateral = InMemoryCollateral::new(token());
        collateral.deposit(&payer(), 10).unwrap();
        collateral.approve(&payer(), &custody(), 50);

        assert!(collateral.pull(token(), &payer(), &custody(), 20).is_err());
        assert_eq!(collateral.balance_of(&payer()), 10);
        assert_eq!(collateral.allowance(&payer(), &custody()), 50);
    }

    #[test]
    fn test_wrong_asset_rejected() {
        let mut collateral = InMemoryCollateral::native();
        collateral.deposit(&payer(), 10).unwrap();
        assert!(matches!(
            collateral.pull(token(), &payer(), &custody(), 1),
            Err(CurveError::AssetMismatch { .. })
        ));
    }
}
