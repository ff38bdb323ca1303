use near_sdk::{AccountId, FunctionError};

use crate::asset::AssetRef;

/// Failures surfaced by the asset ledger. A failed transfer leaves no partial state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("{account} does not own {asset}")]
    NotOwner { asset: AssetRef, account: AccountId },

    #[error("{receiver} cannot receive {asset}")]
    TransferRejected { asset: AssetRef, receiver: AccountId },
}

/// Every caller-visible rejection of a swap operation.
///
/// Returned from `#[handle_result]` contract methods, where an `Err` panics with the
/// display string and reverts the whole call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, FunctionError)]
pub enum SwapError {
    #[error("Swap with this id already exists")]
    DuplicateSwap,

    #[error("A swap needs two different assets")]
    IdenticalAssets,

    #[error("Swap not found")]
    UnknownSwap,

    #[error("Swap already completed")]
    AlreadyCompleted,

    #[error("Swap already accepted")]
    AlreadyAccepted,

    #[error("Proposer cannot accept their own swap")]
    SelfAcceptance,

    #[error("Only the proposer can cancel this swap")]
    NotProposer,

    #[error("Storage needs {required} yoctoNEAR but only {attached} is available")]
    InsufficientStorageDeposit { required: u128, attached: u128 },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}
