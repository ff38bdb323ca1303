use near_sdk::store::{IterableMap, IterableSet, LookupMap};
use near_sdk::{near, AccountId, IntoStorageKey};

use crate::asset::AssetRef;
use crate::error::TransferError;

/// The asset-transfer capability the swap registry depends on.
///
/// Each `transfer` is all-or-nothing on its own: it either moves the asset or
/// returns an error having changed nothing. Two transfers are not atomic
/// together; the registry undoes a landed first leg itself and aborts the call
/// if that undo fails. `CustodyLedger` transfers are synchronous storage writes,
/// so inside a contract call the platform also reverts everything on panic.
pub trait AssetLedger {
    /// Moves `asset` from `from` to `to`.
    ///
    /// Fails with `NotOwner` unless `from` currently holds the asset and with
    /// `TransferRejected` unless `to` may receive it. A failed transfer changes nothing.
    fn transfer(
        &mut self,
        asset: &AssetRef,
        from: &AccountId,
        to: &AccountId,
    ) -> Result<(), TransferError>;

    fn current_owner(&self, asset: &AssetRef) -> Option<AccountId>;
}

/// Ownership records for NEP-171 tokens deposited into the contract.
///
/// Tokens enter through `nft_on_transfer` and leave through a withdrawal; in between,
/// swaps move them by rewriting the recorded owner.
#[near(serializers = [borsh])]
pub struct CustodyLedger {
    pub owners: IterableMap<AssetRef, AccountId>,
    pub receivers: IterableSet<AccountId>,
    // Owner -> assets held, kept in step with `owners`
    by_owner: LookupMap<AccountId, Vec<AssetRef>>,
}

impl CustodyLedger {
    pub fn new<O, R, A>(owners_prefix: O, receivers_prefix: R, by_owner_prefix: A) -> Self
    where
        O: IntoStorageKey,
        R: IntoStorageKey,
        A: IntoStorageKey,
    {
        Self {
            owners: IterableMap::new(owners_prefix),
            receivers: IterableSet::new(receivers_prefix),
            by_owner: LookupMap::new(by_owner_prefix),
        }
    }

    /// Enables `account_id` to hold tokens. Returns false if it already could.
    pub fn register(&mut self, account_id: AccountId) -> bool {
        self.receivers.insert(account_id)
    }

    pub fn is_registered(&self, account_id: &AccountId) -> bool {
        self.receivers.contains(account_id)
    }

    /// Writes cached changes so `env::storage_usage` reflects them.
    pub fn flush(&mut self) {
        self.owners.flush();
        self.receivers.flush();
        self.by_owner.flush();
    }

    /// Records a token that just arrived from `owner`.
    pub fn deposit(&mut self, asset: AssetRef, owner: AccountId) -> Result<(), TransferError> {
        if !self.is_registered(&owner) || self.owners.contains_key(&asset) {
            return Err(TransferError::TransferRejected {
                asset,
                receiver: owner,
            });
        }
        self.set_owner(asset, owner);
        Ok(())
    }

    /// Takes a token out of custody ahead of sending it back to its owner.
    pub fn release(&mut self, asset: &AssetRef, owner: &AccountId) -> Result<(), TransferError> {
        self.assert_owner(asset, owner)?;
        self.owners.remove(asset);
        self.unindex(owner, asset);
        Ok(())
    }

    /// Undoes a `release` whose outgoing transfer failed.
    pub fn restore(&mut self, asset: AssetRef, owner: AccountId) {
        if let Some(previous) = self.owners.get(&asset).cloned() {
            self.unindex(&previous, &asset);
        }
        self.set_owner(asset, owner);
    }

    pub fn assets_of(&self, account_id: &AccountId, from_index: usize, limit: usize) -> Vec<AssetRef> {
        self.by_owner
            .get(account_id)
            .map(|assets| {
                assets
                    .iter()
                    .skip(from_index)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_owner(&mut self, asset: AssetRef, owner: AccountId) {
        self.by_owner
            .entry(owner.clone())
            .or_insert_with(Vec::new)
            .push(asset.clone());
        self.owners.insert(asset, owner);
    }

    fn unindex(&mut self, owner: &AccountId, asset: &AssetRef) {
        let now_empty = match self.by_owner.get_mut(owner) {
            Some(assets) => {
                assets.retain(|held| held != asset);
                assets.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_owner.remove(owner);
        }
    }

    fn assert_owner(&self, asset: &AssetRef, account: &AccountId) -> Result<(), TransferError> {
        match self.owners.get(asset) {
            Some(owner) if owner == account => Ok(()),
            _ => Err(TransferError::NotOwner {
                asset: asset.clone(),
                account: account.clone(),
            }),
        }
    }
}

impl AssetLedger for CustodyLedger {
    fn transfer(
        &mut self,
        asset: &AssetRef,
        from: &AccountId,
        to: &AccountId,
    ) -> Result<(), TransferError> {
        self.assert_owner(asset, from)?;
        if !self.is_registered(to) {
            return Err(TransferError::TransferRejected {
                asset: asset.clone(),
                receiver: to.clone(),
            });
        }
        self.unindex(from, asset);
        self.set_owner(asset.clone(), to.clone());
        Ok(())
    }

    fn current_owner(&self, asset: &AssetRef) -> Option<AccountId> {
        self.owners.get(asset).cloned()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use near_sdk::test_utils::{accounts, VMContextBuilder};
    use near_sdk::testing_env;

    fn setup() -> CustodyLedger {
        testing_env!(VMContextBuilder::new().build());
        CustodyLedger::new(b"o", b"r", b"a")
    }

    fn nft(token_id: &str) -> AssetRef {
        AssetRef::new("nft.near".parse().unwrap(), token_id)
    }

    #[test]
    fn register_is_idempotent() {
        let mut ledger = setup();
        assert!(ledger.register(accounts(0)));
        assert!(!ledger.register(accounts(0)));
        assert!(ledger.is_registered(&accounts(0)));
        assert!(!ledger.is_registered(&accounts(1)));
    }

    #[test]
    fn deposit_requires_registered_owner() {
        let mut ledger = setup();
        let err = ledger.deposit(nft("1"), accounts(0)).unwrap_err();
        assert_eq!(
            err,
            TransferError::TransferRejected {
                asset: nft("1"),
                receiver: accounts(0)
            }
        );
        assert_eq!(ledger.current_owner(&nft("1")), None);

        ledger.register(accounts(0));
        ledger.deposit(nft("1"), accounts(0)).unwrap();
        assert_eq!(ledger.current_owner(&nft("1")), Some(accounts(0)));
    }

    #[test]
    fn deposit_rejects_already_tracked_asset() {
        let mut ledger = setup();
        ledger.register(accounts(0));
        ledger.register(accounts(1));
        ledger.deposit(nft("1"), accounts(0)).unwrap();

        assert!(ledger.deposit(nft("1"), accounts(1)).is_err());
        assert_eq!(ledger.current_owner(&nft("1")), Some(accounts(0)));
    }

    #[test]
    fn transfer_checks_owner_and_receiver() {
        let mut ledger = setup();
        ledger.register(accounts(0));
        ledger.deposit(nft("1"), accounts(0)).unwrap();

        // Not the owner
        let err = ledger
            .transfer(&nft("1"), &accounts(1), &accounts(0))
            .unwrap_err();
        assert!(matches!(err, TransferError::NotOwner { .. }));

        // Receiver never registered
        let err = ledger
            .transfer(&nft("1"), &accounts(0), &accounts(1))
            .unwrap_err();
        assert!(matches!(err, TransferError::TransferRejected { .. }));
        assert_eq!(ledger.current_owner(&nft("1")), Some(accounts(0)));

        ledger.register(accounts(1));
        ledger
            .transfer(&nft("1"), &accounts(0), &accounts(1))
            .unwrap();
        assert_eq!(ledger.current_owner(&nft("1")), Some(accounts(1)));
    }

    #[test]
    fn transfer_of_untracked_asset_is_not_owner() {
        let mut ledger = setup();
        ledger.register(accounts(0));
        ledger.register(accounts(1));
        let err = ledger
            .transfer(&nft("404"), &accounts(0), &accounts(1))
            .unwrap_err();
        assert!(matches!(err, TransferError::NotOwner { .. }));
    }

    #[test]
    fn release_and_restore() {
        let mut ledger = setup();
        ledger.register(accounts(0));
        ledger.deposit(nft("1"), accounts(0)).unwrap();

        assert!(ledger.release(&nft("1"), &accounts(1)).is_err());
        ledger.release(&nft("1"), &accounts(0)).unwrap();
        assert_eq!(ledger.current_owner(&nft("1")), None);

        ledger.restore(nft("1"), accounts(0));
        assert_eq!(ledger.current_owner(&nft("1")), Some(accounts(0)));
    }

    #[test]
    fn assets_of_pages_through_owned_assets() {
        let mut ledger = setup();
        ledger.register(accounts(0));
        ledger.register(accounts(1));
        for id in ["1", "2", "3"] {
            ledger.deposit(nft(id), accounts(0)).unwrap();
        }
        ledger.deposit(nft("4"), accounts(1)).unwrap();

        assert_eq!(ledger.assets_of(&accounts(0), 0, 10).len(), 3);
        assert_eq!(ledger.assets_of(&accounts(0), 1, 1).len(), 1);
        assert_eq!(ledger.assets_of(&accounts(1), 0, 10), vec![nft("4")]);
        assert!(ledger.assets_of(&accounts(2), 0, 10).is_empty());
    }

    #[test]
    fn owner_index_follows_transfers_and_withdrawals() {
        let mut ledger = setup();
        ledger.register(accounts(0));
        ledger.register(accounts(1));
        ledger.deposit(nft("1"), accounts(0)).unwrap();
        ledger.deposit(nft("2"), accounts(0)).unwrap();

        ledger
            .transfer(&nft("1"), &accounts(0), &accounts(1))
            .unwrap();
        assert_eq!(ledger.assets_of(&accounts(0), 0, 10), vec![nft("2")]);
        assert_eq!(ledger.assets_of(&accounts(1), 0, 10), vec![nft("1")]);

        // Failed transfer leaves the index alone
        assert!(ledger
            .transfer(&nft("2"), &accounts(1), &accounts(0))
            .is_err());
        assert_eq!(ledger.assets_of(&accounts(0), 0, 10), vec![nft("2")]);

        ledger.release(&nft("2"), &accounts(0)).unwrap();
        assert!(ledger.assets_of(&accounts(0), 0, 10).is_empty());

        ledger.restore(nft("2"), accounts(0));
        assert_eq!(ledger.assets_of(&accounts(0), 0, 10), vec![nft("2")]);
        ledger.restore(nft("2"), accounts(0));
        assert_eq!(ledger.assets_of(&accounts(0), 0, 10), vec![nft("2")]);
    }
}
