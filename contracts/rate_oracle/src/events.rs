use soroban_sdk::{contracttype, BytesN, String};

#[contracttype]
#[derive(Clone, Debug)]
pub struct RateQueriedEvent {
    pub symbol: String,
    pub query_id: BytesN<32>,
    pub recurring: bool,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct RateUpdatedEvent {
    pub symbol: String,
    pub rate: i128,
    pub query_id: BytesN<32>,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct SettingsUpdatedEvent {
    pub symbol: String,
    pub call_interval: u64,
    pub callback_gas_limit: u64,
}

#[contracttype]
#[derive(Clone, Debug)]
pub struct RetiredEvent {
    pub drained: i128,
}
