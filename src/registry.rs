use near_sdk::store::{IterableMap, LookupMap};
use near_sdk::{env, near, AccountId, IntoStorageKey};

use crate::asset::AssetRef;
use crate::error::{SwapError, TransferError};
use crate::events::{emit_swap_executed, emit_swap_proposed, log_swap_event};
use crate::ledger::AssetLedger;
use crate::swap::{derive_swap_id, SwapId, SwapRecord, SwapStatus};

/// The swap table and the propose/accept/cancel state machine over it.
///
/// Caller identity is always passed in, never read from the environment.
#[near(serializers = [borsh])]
pub struct SwapRegistry {
    swaps: IterableMap<SwapId, SwapRecord>,
    // Proposer -> their swap ids, in proposal order
    by_proposer: LookupMap<AccountId, Vec<SwapId>>,
}

impl SwapRegistry {
    pub fn new<S, P>(swaps_prefix: S, proposers_prefix: P) -> Self
    where
        S: IntoStorageKey,
        P: IntoStorageKey,
    {
        Self {
            swaps: IterableMap::new(swaps_prefix),
            by_proposer: LookupMap::new(proposers_prefix),
        }
    }

    pub fn get(&self, swap_id: &SwapId) -> Option<&SwapRecord> {
        self.swaps.get(swap_id)
    }

    pub fn len(&self) -> u32 {
        self.swaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SwapId, &SwapRecord)> {
        self.swaps.iter()
    }

    pub fn ids_by_proposer(&self, proposer: &AccountId) -> &[SwapId] {
        self.by_proposer
            .get(proposer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Writes cached changes so `env::storage_usage` reflects them.
    pub fn flush(&mut self) {
        self.swaps.flush();
        self.by_proposer.flush();
    }

    /// Opens a new offer of `asset_a` (held by `caller`) in exchange for `asset_b`.
    pub fn propose(
        &mut self,
        asset_a: AssetRef,
        asset_b: AssetRef,
        caller: AccountId,
    ) -> Result<SwapId, SwapError> {
        if asset_a == asset_b {
            return Err(SwapError::IdenticalAssets);
        }
        let swap_id = derive_swap_id(&caller, &asset_a, &asset_b);
        if self.swaps.contains_key(&swap_id) {
            return Err(SwapError::DuplicateSwap);
        }

        emit_swap_proposed(&swap_id, &caller, &asset_a, &asset_b);
        self.by_proposer
            .entry(caller.clone())
            .or_insert_with(Vec::new)
            .push(swap_id);
        self.swaps
            .insert(swap_id, SwapRecord::new(asset_a, asset_b, caller));
        Ok(swap_id)
    }

    /// Executes an open swap: `asset_a` goes proposer -> caller, then `asset_b`
    /// goes caller -> proposer. Either both legs land or the record and the
    /// ledger are left as they were.
    ///
    /// Panics with `SWAP_COMPENSATION_FAILED` if the first leg lands, the second
    /// fails and the first cannot be moved back.
    pub fn accept<L: AssetLedger>(
        &mut self,
        swap_id: &SwapId,
        caller: &AccountId,
        ledger: &mut L,
    ) -> Result<(), SwapError> {
        let (asset_a, asset_b, proposer) = self.claim(swap_id, caller)?;

        if let Err(err) = Self::exchange(ledger, &asset_a, &asset_b, &proposer, caller) {
            self.release(swap_id);
            return Err(err.into());
        }

        self.complete(swap_id);
        emit_swap_executed(swap_id);
        Ok(())
    }

    /// Withdraws an open offer. Only the proposer may do this; the record is deleted.
    pub fn cancel(&mut self, swap_id: &SwapId, caller: &AccountId) -> Result<SwapRecord, SwapError> {
        let record = self.swaps.get(swap_id).ok_or(SwapError::UnknownSwap)?;
        if record.proposer != *caller {
            return Err(SwapError::NotProposer);
        }
        if !record.is_open() {
            return Err(SwapError::AlreadyCompleted);
        }

        let record = self.swaps.remove(swap_id).ok_or(SwapError::UnknownSwap)?;
        self.unindex(caller, swap_id);
        log_swap_event("CANCELLED", swap_id, caller);
        Ok(record)
    }

    fn unindex(&mut self, proposer: &AccountId, swap_id: &SwapId) {
        let now_empty = match self.by_proposer.get_mut(proposer) {
            Some(ids) => {
                ids.retain(|id| id != swap_id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_proposer.remove(proposer);
        }
    }

    // Reserves the swap for `caller`. Returns what the transfers need.
    fn claim(
        &mut self,
        swap_id: &SwapId,
        caller: &AccountId,
    ) -> Result<(AssetRef, AssetRef, AccountId), SwapError> {
        let record = self.swaps.get_mut(swap_id).ok_or(SwapError::UnknownSwap)?;
        if !record.is_open() {
            return Err(SwapError::AlreadyCompleted);
        }
        if record.proposer == *caller {
            return Err(SwapError::SelfAcceptance);
        }
        if record.acceptor.is_some() {
            return Err(SwapError::AlreadyAccepted);
        }

        record.acceptor = Some(caller.clone());
        Ok((
            record.asset_a.clone(),
            record.asset_b.clone(),
            record.proposer.clone(),
        ))
    }

    fn release(&mut self, swap_id: &SwapId) {
        if let Some(record) = self.swaps.get_mut(swap_id) {
            record.acceptor = None;
        }
    }

    fn complete(&mut self, swap_id: &SwapId) {
        if let Some(record) = self.swaps.get_mut(swap_id) {
            record.status = SwapStatus::Completed;
            record.completed_at = Some(env::block_timestamp());
        }
    }

    fn exchange<L: AssetLedger>(
        ledger: &mut L,
        asset_a: &AssetRef,
        asset_b: &AssetRef,
        proposer: &AccountId,
        acceptor: &AccountId,
    ) -> Result<(), TransferError> {
        ledger.transfer(asset_a, proposer, acceptor)?;

        if let Err(err) = ledger.transfer(asset_b, acceptor, proposer) {
            // Put the first leg back; a swap must never stay half-executed
            if let Err(undo) = ledger.transfer(asset_a, acceptor, proposer) {
                env::panic_str(&format!(
                    "SWAP_COMPENSATION_FAILED: asset='{}', holder='{}', cause='{}', undo='{}'",
                    asset_a, acceptor, err, undo
                ));
            }
            return Err(err);
        }
        Ok(())
    }
}
