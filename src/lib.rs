use near_sdk::json_types::Base58CryptoHash;
use near_sdk::{
    assert_one_yocto, env, ext_contract, log, near, AccountId, FunctionError, Gas, NearToken,
    Promise, PromiseError, PromiseOrValue, StorageUsage,
};

mod asset;
mod error;
mod events;
mod ledger;
mod registry;
mod storage;
mod swap;

pub use asset::{AssetRef, TokenId};
pub use error::{SwapError, TransferError};
pub use events::{EVENT_JSON_PREFIX, EVENT_STANDARD, EVENT_STANDARD_VERSION};
pub use ledger::{AssetLedger, CustodyLedger};
pub use registry::SwapRegistry;
pub use storage::{storage_cost, StorageBalances};
pub use swap::{derive_swap_id, SwapId, SwapRecord, SwapStatus, SwapView};

use events::log_asset_event;

const DEFAULT_PAGE_SIZE: u32 = 50;

// External contract interfaces
#[ext_contract(ext_nft)]
pub trait NonFungibleToken {
    fn nft_transfer(
        &mut self,
        receiver_id: AccountId,
        token_id: TokenId,
        approval_id: Option<u64>,
        memo: Option<String>,
    );
}

#[ext_contract(ext_self)]
pub trait SelfCallbacks {
    fn on_asset_withdrawn(&mut self, asset: AssetRef, owner: AccountId);
}

// Define the contract structure
#[near(contract_state)]
pub struct Contract {
    // Every open and completed swap, keyed by SwapId
    pub swaps: SwapRegistry,
    // Who owns each NFT deposited with the contract
    pub ledger: CustodyLedger,
    // Prepaid NEAR covering the storage of deposited NFTs
    pub storage: StorageBalances,
}

impl Default for Contract {
    fn default() -> Self {
        Self {
            swaps: SwapRegistry::new(b"s", b"p"),
            ledger: CustodyLedger::new(b"o", b"r", b"a"),
            storage: StorageBalances::new(b"b"),
        }
    }
}

#[near]
impl Contract {
    #[init]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the caller hold deposited NFTs and receive them through swaps.
    ///
    /// The attached deposit pays for the registration; the rest is refunded.
    #[payable]
    #[handle_result]
    pub fn register_account(&mut self) -> Result<(), SwapError> {
        let initial_usage = env::storage_usage();
        let account_id = env::predecessor_account_id();
        if self.ledger.register(account_id.clone()) {
            log!("ACCOUNT_REGISTERED: account='{}'", account_id);
        }
        self.settle_storage(initial_usage)
    }

    /// Offers `asset_a` in exchange for `asset_b`. Returns the swap id.
    ///
    /// The attached deposit pays for the swap record; the rest is refunded.
    #[payable]
    #[handle_result]
    pub fn propose(
        &mut self,
        asset_a: AssetRef,
        asset_b: AssetRef,
    ) -> Result<Base58CryptoHash, SwapError> {
        let initial_usage = env::storage_usage();
        let proposer = env::predecessor_account_id();
        let swap_id = self.swaps.propose(asset_a, asset_b, proposer)?;
        self.settle_storage(initial_usage)?;
        Ok(swap_id.into())
    }

    /// Executes an open swap against the caller's copy of `asset_b`.
    #[payable]
    #[handle_result]
    pub fn accept(&mut self, swap_id: Base58CryptoHash) -> Result<(), SwapError> {
        let initial_usage = env::storage_usage();
        let acceptor = env::predecessor_account_id();
        let swap_id: SwapId = swap_id.into();
        self.swaps.accept(&swap_id, &acceptor, &mut self.ledger)?;
        self.settle_storage(initial_usage)
    }

    /// Deletes an open swap and refunds the storage it held to the proposer.
    #[handle_result]
    pub fn cancel(&mut self, swap_id: Base58CryptoHash) -> Result<(), SwapError> {
        let initial_usage = env::storage_usage();
        let caller = env::predecessor_account_id();
        let swap_id: SwapId = swap_id.into();
        self.swaps.cancel(&swap_id, &caller)?;
        self.settle_storage(initial_usage)
    }

    // --- STORAGE ---

    /// Adds the attached NEAR to the storage balance of `account_id` (default: caller).
    /// The balance pays for NFTs that account deposits. Returns the new balance.
    #[payable]
    #[handle_result]
    pub fn storage_deposit(&mut self, account_id: Option<AccountId>) -> Result<NearToken, SwapError> {
        let account_id = account_id.unwrap_or_else(env::predecessor_account_id);
        let amount = env::attached_deposit();
        let initial_usage = env::storage_usage();

        self.storage.credit(&account_id, amount);
        self.storage.flush();
        // A first deposit pays for its own balance entry
        let entry_cost = storage_cost(env::storage_usage().saturating_sub(initial_usage));
        self.storage.debit(&account_id, entry_cost)?;

        log!(
            "STORAGE_DEPOSIT: account='{}', amount='{}'",
            account_id,
            amount.as_yoctonear()
        );
        Ok(self.storage.balance_of(&account_id))
    }

    /// Sends the caller's whole unspent storage balance back to them.
    #[payable]
    pub fn storage_withdraw(&mut self) -> NearToken {
        assert_one_yocto();
        let account_id = env::predecessor_account_id();
        let amount = self.storage.take_all(&account_id);
        if !amount.is_zero() {
            log!(
                "STORAGE_WITHDRAW: account='{}', amount='{}'",
                account_id,
                amount.as_yoctonear()
            );
            Promise::new(account_id).transfer(amount);
        }
        amount
    }

    /// NEP-171 receiver: deposits an NFT into custody on behalf of its previous owner.
    ///
    /// The token goes back to the sender (`true`) if the owner never registered
    /// or their storage balance cannot cover the new entry. `msg` is not used.
    #[allow(unused_variables)]
    pub fn nft_on_transfer(
        &mut self,
        sender_id: AccountId,
        previous_owner_id: AccountId,
        token_id: TokenId,
        msg: String,
    ) -> PromiseOrValue<bool> {
        let asset = AssetRef::new(env::predecessor_account_id(), token_id);

        match self.take_custody(&asset, &previous_owner_id) {
            Ok(()) => {
                log_asset_event("DEPOSITED", &asset, &previous_owner_id);
                PromiseOrValue::Value(false)
            }
            Err(err) => {
                log!("DEPOSIT_REJECTED: {}, sender='{}'", err, sender_id);
                PromiseOrValue::Value(true)
            }
        }
    }

    /// Sends a deposited NFT back to its owner's own account. The storage it
    /// freed goes to the owner's storage balance.
    #[payable]
    pub fn withdraw_asset(&mut self, asset: AssetRef) -> Promise {
        assert_one_yocto();
        let owner = env::predecessor_account_id();
        let initial_usage = env::storage_usage();
        if let Err(err) = self.ledger.release(&asset, &owner) {
            SwapError::from(err).panic();
        }
        self.ledger.flush();
        let freed = storage_cost(initial_usage.saturating_sub(env::storage_usage()));
        self.storage.credit(&owner, freed);

        log_asset_event("WITHDRAWN", &asset, &owner);

        ext_nft::ext(asset.contract_id.clone())
            .with_attached_deposit(NearToken::from_yoctonear(1))
            .with_static_gas(Self::forwarded_gas())
            .nft_transfer(
                owner.clone(),
                asset.token_id.clone(),
                None,
                Some("NFT swap withdrawal".to_string()),
            )
            .then(
                ext_self::ext(env::current_account_id())
                    .with_static_gas(Self::forwarded_gas())
                    .on_asset_withdrawn(asset, owner),
            )
    }

    // --- VIEWS ---

    pub fn get_swap(&self, swap_id: Base58CryptoHash) -> Option<SwapView> {
        let swap_id: SwapId = swap_id.into();
        self.swaps
            .get(&swap_id)
            .map(|record| SwapView::new(swap_id, record))
    }

    pub fn get_swaps(&self, from_index: Option<u32>, limit: Option<u32>) -> Vec<SwapView> {
        self.swaps
            .iter()
            .skip(from_index.unwrap_or(0) as usize)
            .take(limit.unwrap_or(DEFAULT_PAGE_SIZE) as usize)
            .map(|(swap_id, record)| SwapView::new(*swap_id, record))
            .collect()
    }

    pub fn get_swaps_by_proposer(
        &self,
        proposer: AccountId,
        from_index: Option<u32>,
        limit: Option<u32>,
    ) -> Vec<SwapView> {
        self.swaps
            .ids_by_proposer(&proposer)
            .iter()
            .skip(from_index.unwrap_or(0) as usize)
            .take(limit.unwrap_or(DEFAULT_PAGE_SIZE) as usize)
            .filter_map(|swap_id| {
                self.swaps
                    .get(swap_id)
                    .map(|record| SwapView::new(*swap_id, record))
            })
            .collect()
    }

    pub fn get_swap_count(&self) -> u32 {
        self.swaps.len()
    }

    /// The id `proposer` would get for proposing this pair.
    pub fn swap_id_of(
        &self,
        proposer: AccountId,
        asset_a: AssetRef,
        asset_b: AssetRef,
    ) -> Base58CryptoHash {
        derive_swap_id(&proposer, &asset_a, &asset_b).into()
    }

    pub fn asset_owner(&self, asset: AssetRef) -> Option<AccountId> {
        self.ledger.current_owner(&asset)
    }

    pub fn assets_of(
        &self,
        account_id: AccountId,
        from_index: Option<u32>,
        limit: Option<u32>,
    ) -> Vec<AssetRef> {
        self.ledger.assets_of(
            &account_id,
            from_index.unwrap_or(0) as usize,
            limit.unwrap_or(DEFAULT_PAGE_SIZE) as usize,
        )
    }

    pub fn is_registered(&self, account_id: AccountId) -> bool {
        self.ledger.is_registered(&account_id)
    }

    pub fn storage_balance_of(&self, account_id: AccountId) -> NearToken {
        self.storage.balance_of(&account_id)
    }

    // --- PRIVATE CALLBACKS ---
    #[private]
    pub fn on_asset_withdrawn(
        &mut self,
        #[callback_result] result: Result<(), PromiseError>,
        asset: AssetRef,
        owner: AccountId,
    ) {
        if result.is_err() {
            // The NFT never left; put it back in custody and take back the storage credit
            log_asset_event("WITHDRAW_FAILED", &asset, &owner);
            let initial_usage = env::storage_usage();
            self.ledger.restore(asset, owner.clone());
            self.ledger.flush();
            let cost = storage_cost(env::storage_usage().saturating_sub(initial_usage));
            self.storage.debit_up_to(&owner, cost);
        }
    }
}

impl Contract {
    fn forwarded_gas() -> Gas {
        env::prepaid_gas().saturating_div(4)
    }

    fn flush(&mut self) {
        self.swaps.flush();
        self.ledger.flush();
        self.storage.flush();
    }

    /// Charges the caller for the state this call added, out of the attached
    /// deposit, and refunds the rest. State the call freed is refunded too.
    fn settle_storage(&mut self, initial_usage: StorageUsage) -> Result<(), SwapError> {
        self.flush();
        let attached = env::attached_deposit();
        let usage = env::storage_usage();

        let refund = if usage >= initial_usage {
            let required = storage_cost(usage - initial_usage);
            if attached < required {
                return Err(SwapError::InsufficientStorageDeposit {
                    required: required.as_yoctonear(),
                    attached: attached.as_yoctonear(),
                });
            }
            attached.saturating_sub(required)
        } else {
            attached.saturating_add(storage_cost(initial_usage - usage))
        };

        if !refund.is_zero() {
            Promise::new(env::predecessor_account_id()).transfer(refund);
        }
        Ok(())
    }

    /// Records `owner` as holder of a freshly received NFT, paying for the entry
    /// from their storage balance. Leaves nothing behind on failure.
    fn take_custody(&mut self, asset: &AssetRef, owner: &AccountId) -> Result<(), SwapError> {
        let initial_usage = env::storage_usage();
        self.ledger.deposit(asset.clone(), owner.clone())?;
        self.ledger.flush();

        let cost = storage_cost(env::storage_usage().saturating_sub(initial_usage));
        if let Err(err) = self.storage.debit(owner, cost) {
            self.ledger.release(asset, owner)?;
            return Err(err);
        }
        Ok(())
    }
}
