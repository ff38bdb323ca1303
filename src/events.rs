use near_sdk::serde_json::{self, json};
use near_sdk::{bs58, env, AccountId};

use crate::asset::AssetRef;
use crate::swap::SwapId;

pub const EVENT_STANDARD: &str = "nft_swap";
pub const EVENT_STANDARD_VERSION: &str = "1.0.0";
pub const EVENT_JSON_PREFIX: &str = "EVENT_JSON:";

pub fn encode_swap_id(swap_id: &SwapId) -> String {
    bs58::encode(swap_id).into_string()
}

// NEP-297 event line
fn emit_event(event: &str, data: serde_json::Value) {
    let payload = json!({
        "standard": EVENT_STANDARD,
        "version": EVENT_STANDARD_VERSION,
        "event": event,
        "data": [data],
    });
    env::log_str(&format!("{}{}", EVENT_JSON_PREFIX, payload));
}

pub fn emit_swap_proposed(
    swap_id: &SwapId,
    proposer: &AccountId,
    asset_a: &AssetRef,
    asset_b: &AssetRef,
) {
    emit_event(
        "swap_proposed",
        json!({
            "swap_id": encode_swap_id(swap_id),
            "proposer": proposer,
            "asset_a": asset_a,
            "asset_b": asset_b,
        }),
    );
}

pub fn emit_swap_executed(swap_id: &SwapId) {
    emit_event(
        "swap_executed",
        json!({ "swap_id": encode_swap_id(swap_id) }),
    );
}

// Helper for consistent operational logging
pub fn log_swap_event(event: &str, swap_id: &SwapId, actor: &AccountId) {
    env::log_str(&format!(
        "SWAP_{}: swap_id='{}', actor='{}'",
        event,
        encode_swap_id(swap_id),
        actor
    ));
}

pub fn log_asset_event(event: &str, asset: &AssetRef, actor: &AccountId) {
    env::log_str(&format!(
        "ASSET_{}: asset='{}', actor='{}'",
        event, asset, actor
    ));
}
