use std::fmt;

use near_sdk::{near, AccountId};

pub type TokenId = String;

/// A single NEP-171 token: the collection contract plus the token id inside it.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetRef {
    pub contract_id: AccountId,
    pub token_id: TokenId,
}

impl AssetRef {
    pub fn new(contract_id: AccountId, token_id: impl Into<TokenId>) -> Self {
        Self {
            contract_id,
            token_id: token_id.into(),
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.contract_id, self.token_id)
    }
}
