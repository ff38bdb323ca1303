use near_sdk::store::LookupMap;
use near_sdk::{env, near, AccountId, IntoStorageKey, NearToken, StorageUsage};

use crate::error::SwapError;

/// Cost of `bytes` of contract state at the current byte price.
pub fn storage_cost(bytes: StorageUsage) -> NearToken {
    env::storage_byte_cost().saturating_mul(bytes as u128)
}

/// Prepaid NEAR per account, spent on storage for NFTs they deposit.
///
/// Deposits arrive through `nft_on_transfer`, which the NFT contract calls with no
/// attached NEAR, so the owner has to fund their storage up front.
#[near(serializers = [borsh])]
pub struct StorageBalances {
    balances: LookupMap<AccountId, NearToken>,
}

impl StorageBalances {
    pub fn new<S: IntoStorageKey>(prefix: S) -> Self {
        Self {
            balances: LookupMap::new(prefix),
        }
    }

    pub fn balance_of(&self, account_id: &AccountId) -> NearToken {
        self.balances
            .get(account_id)
            .copied()
            .unwrap_or(NearToken::from_yoctonear(0))
    }

    pub fn credit(&mut self, account_id: &AccountId, amount: NearToken) {
        let balance = self.balance_of(account_id).saturating_add(amount);
        self.balances.insert(account_id.clone(), balance);
    }

    pub fn debit(&mut self, account_id: &AccountId, amount: NearToken) -> Result<(), SwapError> {
        let balance = self.balance_of(account_id);
        if balance < amount {
            return Err(SwapError::InsufficientStorageDeposit {
                required: amount.as_yoctonear(),
                attached: balance.as_yoctonear(),
            });
        }
        self.balances
            .insert(account_id.clone(), balance.saturating_sub(amount));
        Ok(())
    }

    /// Takes what it can of `amount`, down to zero.
    pub fn debit_up_to(&mut self, account_id: &AccountId, amount: NearToken) {
        let balance = self.balance_of(account_id);
        self.balances
            .insert(account_id.clone(), balance.saturating_sub(amount));
    }

    /// Empties the balance, keeping the entry so a later credit costs nothing extra.
    pub fn take_all(&mut self, account_id: &AccountId) -> NearToken {
        let balance = self.balance_of(account_id);
        if !balance.is_zero() {
            self.balances
                .insert(account_id.clone(), NearToken::from_yoctonear(0));
        }
        balance
    }

    pub fn flush(&mut self) {
        self.balances.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use near_sdk::test_utils::{accounts, VMContextBuilder};
    use near_sdk::testing_env;

    fn setup() -> StorageBalances {
        testing_env!(VMContextBuilder::new().build());
        StorageBalances::new(b"b")
    }

    #[test]
    fn credit_and_debit() {
        let mut balances = setup();
        assert!(balances.balance_of(&accounts(0)).is_zero());

        balances.credit(&accounts(0), NearToken::from_millinear(10));
        balances.credit(&accounts(0), NearToken::from_millinear(5));
        balances
            .debit(&accounts(0), NearToken::from_millinear(12))
            .unwrap();
        assert_eq!(
            balances.balance_of(&accounts(0)),
            NearToken::from_millinear(3)
        );
    }

    #[test]
    fn overdraft_is_rejected_and_changes_nothing() {
        let mut balances = setup();
        balances.credit(&accounts(0), NearToken::from_millinear(1));

        let err = balances
            .debit(&accounts(0), NearToken::from_millinear(2))
            .unwrap_err();
        assert!(matches!(err, SwapError::InsufficientStorageDeposit { .. }));
        assert_eq!(
            balances.balance_of(&accounts(0)),
            NearToken::from_millinear(1)
        );
    }

    #[test]
    fn debit_up_to_stops_at_zero() {
        let mut balances = setup();
        balances.credit(&accounts(0), NearToken::from_millinear(1));
        balances.debit_up_to(&accounts(0), NearToken::from_millinear(2));
        assert!(balances.balance_of(&accounts(0)).is_zero());
    }

    #[test]
    fn take_all_empties_the_balance() {
        let mut balances = setup();
        balances.credit(&accounts(1), NearToken::from_millinear(7));
        assert_eq!(
            balances.take_all(&accounts(1)),
            NearToken::from_millinear(7)
        );
        assert!(balances.take_all(&accounts(1)).is_zero());
    }

    #[test]
    fn storage_cost_uses_byte_price() {
        let _ = setup();
        assert_eq!(
            storage_cost(100),
            env::storage_byte_cost().saturating_mul(100)
        );
        assert!(storage_cost(0).is_zero());
    }
}
