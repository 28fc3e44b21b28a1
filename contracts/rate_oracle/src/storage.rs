use soroban_sdk::{contracttype, BytesN, String};

/// Per-symbol fetch configuration. A record with an empty query string and
/// zero interval/gas limit means the symbol was never configured.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CurrencySettings {
    /// Query the off-chain provider runs to resolve the rate
    pub query_string: String,
    /// Seconds between automatic re-fetches (0 disables recurrence)
    pub call_interval: u64,
    /// Gas budget the provider should reserve for the callback
    pub callback_gas_limit: u64,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Initialized,
    Admin,
    Provider,
    FeeToken,
    QueryCost,
    RatesActive,
    ClearIntervals,
    Retired,
    QueryCounter,
    Rate(BytesN<8>),           // canonical symbol -> last fetched rate
    Settings(BytesN<8>),       // canonical symbol -> CurrencySettings
    PendingQuery(BytesN<32>),  // query id -> canonical symbol
    PendingBySymbol(BytesN<8>), // canonical symbol -> live query id
}
