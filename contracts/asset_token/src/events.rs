use soroban_sdk::{contracttype, Address, String};

use crate::storage::Stage;

#[contracttype]
#[derive(Clone, Debug)]
pub struct StageChangedEvent {
    pub from: Stage,
    pub to: Stage,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct BuyEvent {
    pub buyer: Address,
    pub amount: i128,
    pub cents: i128,
    pub tokens: i128,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct PayoutEvent {
    pub from: Address,
    pub amount: i128,
    pub fee: i128,
    pub per_token_increase: i128,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct ClaimEvent {
    pub holder: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct ApprovalEvent {
    pub owner: Address,
    pub spender: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct ReclaimEvent {
    pub investor: Address,
    pub tokens_burned: i128,
    pub refund: i128,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct ProofOfCustodyEvent {
    pub custodian: Address,
    pub proof: String,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct PausedEvent {
    pub paused: bool,
}
