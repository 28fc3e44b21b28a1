#![no_std]

pub mod codec;
mod error;
mod events;
mod storage;

#[cfg(test)]
mod test;

pub use error::Error;
pub use storage::CurrencySettings;

use events::*;
use storage::DataKey;

use soroban_sdk::{
    contract, contractimpl, token, Address, Bytes, BytesN, Env, String, Symbol,
};

#[contract]
pub struct RateOracle;

#[contractimpl]
impl RateOracle {
    // ============================================
    // INITIALIZATION & ADMIN
    // ============================================

    /// Initialize the oracle with its administrator, the off-chain provider
    /// identity allowed to settle callbacks, and the token used to pay for
    /// off-chain computation.
    ///
    /// # Errors
    /// - `AlreadyInitialized`: Contract already initialized
    pub fn initialize(
        env: Env,
        admin: Address,
        provider: Address,
        fee_token: Address,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Initialized) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();

        env.storage().instance().set(&DataKey::Initialized, &true);
        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Provider, &provider);
        env.storage().instance().set(&DataKey::FeeToken, &fee_token);
        env.storage().instance().set(&DataKey::RatesActive, &true);
        env.storage().instance().set(&DataKey::ClearIntervals, &false);
        env.storage().instance().set(&DataKey::QueryCost, &0i128);

        Ok(())
    }

    /// Configure (or reconfigure) how a currency symbol is fetched.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `ContractRetired`: Contract has been retired
    /// - `Unauthorized`: Caller is not admin
    /// - `EncodingTooLong`: Symbol is empty or longer than 8 bytes
    pub fn set_currency_settings(
        env: Env,
        from: Address,
        symbol: String,
        query_string: String,
        call_interval: u64,
        callback_gas_limit: u64,
    ) -> Result<(), Error> {
        Self::check_live(&env)?;
        Self::require_admin(&env, &from)?;

        let canonical = codec::canonical_symbol(&env, &symbol)?;
        let settings = CurrencySettings {
            query_string,
            call_interval,
            callback_gas_limit,
        };
        env.storage()
            .instance()
            .set(&DataKey::Settings(canonical.clone()), &settings);

        env.events().publish(
            (
                Symbol::new(&env, "settings_updated"),
                codec::symbol_string(&env, &canonical),
            ),
            SettingsUpdatedEvent {
                symbol: codec::symbol_string(&env, &canonical),
                call_interval,
                callback_gas_limit,
            },
        );

        Ok(())
    }

    /// Set the fee-token amount pulled from the admin on each manual fetch.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `ContractRetired`: Contract has been retired
    /// - `Unauthorized`: Caller is not admin
    /// - `InvalidAmount`: Cost is negative
    pub fn set_query_cost(env: Env, from: Address, cost: i128) -> Result<(), Error> {
        Self::check_live(&env)?;
        Self::require_admin(&env, &from)?;

        if cost < 0 {
            return Err(Error::InvalidAmount);
        }
        env.storage().instance().set(&DataKey::QueryCost, &cost);

        Ok(())
    }

    /// Flip the global recurrence switch. While false, settled callbacks do
    /// not re-arm follow-up queries. Returns the new value.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `ContractRetired`: Contract has been retired
    /// - `Unauthorized`: Caller is not admin
    pub fn toggle_rates_active(env: Env, from: Address) -> Result<bool, Error> {
        Self::check_live(&env)?;
        Self::require_admin(&env, &from)?;

        let next = !env
            .storage()
            .instance()
            .get::<DataKey, bool>(&DataKey::RatesActive)
            .unwrap_or(false);
        env.storage().instance().set(&DataKey::RatesActive, &next);

        Ok(next)
    }

    /// Flip the interval-clearing switch. While true, the next settled
    /// callback per symbol zeroes that symbol's interval instead of
    /// re-arming. Returns the new value.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `ContractRetired`: Contract has been retired
    /// - `Unauthorized`: Caller is not admin
    pub fn toggle_clear_rate_intervals(env: Env, from: Address) -> Result<bool, Error> {
        Self::check_live(&env)?;
        Self::require_admin(&env, &from)?;

        let next = !env
            .storage()
            .instance()
            .get::<DataKey, bool>(&DataKey::ClearIntervals)
            .unwrap_or(false);
        env.storage().instance().set(&DataKey::ClearIntervals, &next);

        Ok(next)
    }

    /// Drain the contract's fee-token balance to the admin and mark the
    /// oracle permanently inactive. Reads keep working; every state-changing
    /// entry point fails `ContractRetired` afterwards.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `ContractRetired`: Contract has already been retired
    /// - `Unauthorized`: Caller is not admin
    pub fn retire(env: Env, from: Address) -> Result<(), Error> {
        Self::check_live(&env)?;
        Self::require_admin(&env, &from)?;

        let fee_token: Address = env
            .storage()
            .instance()
            .get(&DataKey::FeeToken)
            .ok_or(Error::NotInitialized)?;

        let client = token::Client::new(&env, &fee_token);
        let balance = client.balance(&env.current_contract_address());
        if balance > 0 {
            client.transfer(&env.current_contract_address(), &from, &balance);
        }

        env.storage().instance().set(&DataKey::Retired, &true);

        env.events().publish(
            (Symbol::new(&env, "retired"), from),
            RetiredEvent { drained: balance },
        );

        Ok(())
    }

    // ============================================
    // FETCH / CALLBACK HANDSHAKE
    // ============================================

    /// Start an asynchronous rate fetch for a configured symbol. Pulls the
    /// query cost from the caller when one is set, supersedes any query
    /// still in flight for the symbol, and returns the new opaque query id.
    /// Settlement arrives later through `receive_callback`.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `ContractRetired`: Contract has been retired
    /// - `Unauthorized`: Caller is not admin
    /// - `EncodingTooLong`: Symbol is empty or longer than 8 bytes
    /// - `UnconfiguredSymbol`: No settings stored for this symbol
    pub fn fetch_rate(env: Env, from: Address, symbol: String) -> Result<BytesN<32>, Error> {
        Self::check_live(&env)?;
        Self::require_admin(&env, &from)?;

        let canonical = codec::canonical_symbol(&env, &symbol)?;
        if !env
            .storage()
            .instance()
            .has(&DataKey::Settings(canonical.clone()))
        {
            return Err(Error::UnconfiguredSymbol);
        }

        let cost: i128 = env
            .storage()
            .instance()
            .get(&DataKey::QueryCost)
            .unwrap_or(0);
        if cost > 0 {
            let fee_token: Address = env
                .storage()
                .instance()
                .get(&DataKey::FeeToken)
                .ok_or(Error::NotInitialized)?;
            token::Client::new(&env, &fee_token).transfer(
                &from,
                &env.current_contract_address(),
                &cost,
            );
        }

        Ok(Self::issue_query(&env, &canonical, false))
    }

    /// Settle a pending query. Only the registered provider may call this.
    /// Stores the delivered rate, consumes the pending query, and re-arms a
    /// fresh query when recurrence applies (rates active, interval nonzero,
    /// clear-intervals off). With clear-intervals on, the symbol's interval
    /// is zeroed instead.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `ContractRetired`: Contract has been retired
    /// - `Unauthorized`: Caller is not the registered provider
    /// - `UnknownQueryId`: No pending query matches this id
    /// - `InvalidRate`: Delivered rate is negative
    pub fn receive_callback(
        env: Env,
        from: Address,
        query_id: BytesN<32>,
        raw_rate: i128,
    ) -> Result<(), Error> {
        Self::check_live(&env)?;

        from.require_auth();
        let provider: Address = env
            .storage()
            .instance()
            .get(&DataKey::Provider)
            .ok_or(Error::NotInitialized)?;
        if from != provider {
            return Err(Error::Unauthorized);
        }

        let canonical: BytesN<8> = env
            .storage()
            .instance()
            .get(&DataKey::PendingQuery(query_id.clone()))
            .ok_or(Error::UnknownQueryId)?;

        if raw_rate < 0 {
            return Err(Error::InvalidRate);
        }

        env.storage()
            .instance()
            .remove(&DataKey::PendingQuery(query_id.clone()));
        let live: Option<BytesN<32>> = env
            .storage()
            .instance()
            .get(&DataKey::PendingBySymbol(canonical.clone()));
        if live == Some(query_id.clone()) {
            env.storage()
                .instance()
                .remove(&DataKey::PendingBySymbol(canonical.clone()));
        }

        env.storage()
            .instance()
            .set(&DataKey::Rate(canonical.clone()), &raw_rate);

        env.events().publish(
            (
                Symbol::new(&env, "rate_updated"),
                codec::symbol_string(&env, &canonical),
            ),
            RateUpdatedEvent {
                symbol: codec::symbol_string(&env, &canonical),
                rate: raw_rate,
                query_id,
            },
        );

        let mut settings: CurrencySettings = env
            .storage()
            .instance()
            .get(&DataKey::Settings(canonical.clone()))
            .ok_or(Error::UnconfiguredSymbol)?;
        let clear_intervals: bool = env
            .storage()
            .instance()
            .get(&DataKey::ClearIntervals)
            .unwrap_or(false);
        let rates_active: bool = env
            .storage()
            .instance()
            .get(&DataKey::RatesActive)
            .unwrap_or(false);

        if clear_intervals && settings.call_interval > 0 {
            settings.call_interval = 0;
            env.storage()
                .instance()
                .set(&DataKey::Settings(canonical.clone()), &settings);
        } else if rates_active && settings.call_interval > 0 {
            Self::issue_query(&env, &canonical, true);
        }

        Ok(())
    }

    // ============================================
    // VIEW FUNCTIONS
    // ============================================

    /// Last fetched rate for a symbol.
    ///
    /// # Errors
    /// - `EncodingTooLong`: Symbol is empty or longer than 8 bytes
    /// - `RateUnset`: No callback has ever delivered a positive rate
    pub fn get_rate(env: Env, symbol: String) -> Result<i128, Error> {
        let canonical = codec::canonical_symbol(&env, &symbol)?;
        let rate: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Rate(canonical))
            .unwrap_or(0);
        if rate <= 0 {
            return Err(Error::RateUnset);
        }
        Ok(rate)
    }

    /// Fetch settings for a symbol; zeroed/empty when never configured.
    ///
    /// # Errors
    /// - `EncodingTooLong`: Symbol is empty or longer than 8 bytes
    pub fn get_currency_settings(env: Env, symbol: String) -> Result<CurrencySettings, Error> {
        let canonical = codec::canonical_symbol(&env, &symbol)?;
        Ok(env
            .storage()
            .instance()
            .get(&DataKey::Settings(canonical))
            .unwrap_or(CurrencySettings {
                query_string: String::from_str(&env, ""),
                call_interval: 0,
                callback_gas_limit: 0,
            }))
    }

    /// Id of the query currently in flight for a symbol, if any.
    pub fn pending_query_id(env: Env, symbol: String) -> Option<BytesN<32>> {
        let canonical = codec::canonical_symbol(&env, &symbol).ok()?;
        env.storage()
            .instance()
            .get(&DataKey::PendingBySymbol(canonical))
    }

    /// Symbol a pending query id belongs to, if the id is still live.
    pub fn query_symbol(env: Env, query_id: BytesN<32>) -> Option<String> {
        let canonical: BytesN<8> = env
            .storage()
            .instance()
            .get(&DataKey::PendingQuery(query_id))?;
        Some(codec::symbol_string(&env, &canonical))
    }

    pub fn is_rates_active(env: Env) -> bool {
        env.storage()
            .instance()
            .get(&DataKey::RatesActive)
            .unwrap_or(false)
    }

    pub fn is_clear_intervals(env: Env) -> bool {
        env.storage()
            .instance()
            .get(&DataKey::ClearIntervals)
            .unwrap_or(false)
    }

    pub fn is_retired(env: Env) -> bool {
        env.storage()
            .instance()
            .get(&DataKey::Retired)
            .unwrap_or(false)
    }

    pub fn get_query_cost(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::QueryCost)
            .unwrap_or(0)
    }

    // ============================================
    // INTERNAL HELPERS
    // ============================================

    fn check_live(env: &Env) -> Result<(), Error> {
        if !env.storage().instance().has(&DataKey::Initialized) {
            return Err(Error::NotInitialized);
        }
        let retired = env
            .storage()
            .instance()
            .get::<DataKey, bool>(&DataKey::Retired)
            .unwrap_or(false);
        if retired {
            return Err(Error::ContractRetired);
        }
        Ok(())
    }

    fn require_admin(env: &Env, from: &Address) -> Result<(), Error> {
        from.require_auth();

        let admin: Address = env
            .storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(Error::NotInitialized)?;
        if *from != admin {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    /// Record a fresh pending query for a symbol and hand out its id. A
    /// query still in flight for the same symbol is superseded: its id stops
    /// matching and only the new one settles.
    fn issue_query(env: &Env, canonical: &BytesN<8>, recurring: bool) -> BytesN<32> {
        if let Some(stale) = env
            .storage()
            .instance()
            .get::<DataKey, BytesN<32>>(&DataKey::PendingBySymbol(canonical.clone()))
        {
            env.storage()
                .instance()
                .remove(&DataKey::PendingQuery(stale));
        }

        let query_id = Self::next_query_id(env, canonical);
        env.storage()
            .instance()
            .set(&DataKey::PendingQuery(query_id.clone()), canonical);
        env.storage()
            .instance()
            .set(&DataKey::PendingBySymbol(canonical.clone()), &query_id);

        env.events().publish(
            (
                Symbol::new(env, "rate_queried"),
                codec::symbol_string(env, canonical),
            ),
            RateQueriedEvent {
                symbol: codec::symbol_string(env, canonical),
                query_id: query_id.clone(),
                recurring,
            },
        );

        query_id
    }

    /// Opaque 256-bit handle, unique per request: a hash over a monotonic
    /// counter, the symbol, and the ledger timestamp.
    fn next_query_id(env: &Env, canonical: &BytesN<8>) -> BytesN<32> {
        let counter: u64 = env
            .storage()
            .instance()
            .get(&DataKey::QueryCounter)
            .unwrap_or(0)
            + 1;
        env.storage()
            .instance()
            .set(&DataKey::QueryCounter, &counter);

        let mut seed = [0u8; 24];
        seed[..8].copy_from_slice(&counter.to_be_bytes());
        seed[8..16].copy_from_slice(&canonical.to_array());
        seed[16..].copy_from_slice(&env.ledger().timestamp().to_be_bytes());

        env.crypto().sha256(&Bytes::from_array(env, &seed)).to_bytes()
    }
}
