use near_sdk::json_types::Base58CryptoHash;
use near_sdk::{borsh, env, near, AccountId, CryptoHash, Timestamp};

use crate::asset::AssetRef;

// Unique identifier for a swap. SHA256 over the borsh encoding of (proposer, asset_a, asset_b).
pub type SwapId = CryptoHash;

#[near(serializers = [json, borsh])]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapStatus {
    Open,
    Completed,
}

// One proposed or completed exchange. Cancelled swaps are deleted, never stored.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapRecord {
    pub asset_a: AssetRef, // Given up by the proposer
    pub asset_b: AssetRef, // Received by the proposer
    pub proposer: AccountId,
    pub acceptor: Option<AccountId>,
    pub status: SwapStatus,

    // Audit only
    pub proposed_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl SwapRecord {
    pub fn new(asset_a: AssetRef, asset_b: AssetRef, proposer: AccountId) -> Self {
        Self {
            asset_a,
            asset_b,
            proposer,
            acceptor: None,
            status: SwapStatus::Open,
            proposed_at: env::block_timestamp(),
            completed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == SwapStatus::Open
    }
}

/// Derives the swap id, so the same proposer offering the same pair twice collides.
pub fn derive_swap_id(proposer: &AccountId, asset_a: &AssetRef, asset_b: &AssetRef) -> SwapId {
    let preimage = borsh::to_vec(&(proposer, asset_a, asset_b))
        .unwrap_or_else(|_| env::panic_str("Failed to serialize swap id preimage"));
    env::sha256_array(&preimage)
}

/// JSON view of a stored swap, returned by the contract's view methods.
#[near(serializers = [json])]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapView {
    pub swap_id: Base58CryptoHash,
    pub asset_a: AssetRef,
    pub asset_b: AssetRef,
    pub proposer: AccountId,
    pub acceptor: Option<AccountId>,
    pub status: SwapStatus,
    pub proposed_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl SwapView {
    pub fn new(swap_id: SwapId, record: &SwapRecord) -> Self {
        Self {
            swap_id: swap_id.into(),
            asset_a: record.asset_a.clone(),
            asset_b: record.asset_b.clone(),
            proposer: record.proposer.clone(),
            acceptor: record.acceptor.clone(),
            status: record.status,
            proposed_at: record.proposed_at,
            completed_at: record.completed_at,
        }
    }
}
