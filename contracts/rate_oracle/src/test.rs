#![cfg(test)]

use crate::{CurrencySettings, Error, RateOracle, RateOracleClient};
use soroban_sdk::{testutils::Address as _, token, Address, BytesN, Env, String};

const EUR_RATE: i128 = 33_333;

fn setup() -> (Env, RateOracleClient<'static>, Address, Address) {
    let env = Env::default();
    env.mock_all_auths();

    let contract_id = env.register_contract(None, RateOracle);
    let client = RateOracleClient::new(&env, &contract_id);

    let admin = Address::generate(&env);
    let provider = Address::generate(&env);
    let fee_token = Address::generate(&env);
    client.initialize(&admin, &provider, &fee_token);

    (env, client, admin, provider)
}

fn configure_eur(env: &Env, client: &RateOracleClient, admin: &Address, call_interval: u64) {
    client.set_currency_settings(
        admin,
        &String::from_str(env, "EUR"),
        &String::from_str(env, "json(https://api.example.com/rates).EUR"),
        &call_interval,
        &200_000u64,
    );
}

#[test]
fn test_initialize_once() {
    let (_env, client, admin, provider) = setup();

    let result = client.try_initialize(&admin, &provider, &admin);
    assert_eq!(result, Err(Ok(Error::AlreadyInitialized)));

    assert!(client.is_rates_active());
    assert!(!client.is_clear_intervals());
    assert!(!client.is_retired());
    assert_eq!(client.get_query_cost(), 0);
}

#[test]
fn test_not_initialized_guard() {
    let env = Env::default();
    env.mock_all_auths();

    let contract_id = env.register_contract(None, RateOracle);
    let client = RateOracleClient::new(&env, &contract_id);
    let caller = Address::generate(&env);

    let result = client.try_fetch_rate(&caller, &String::from_str(&env, "EUR"));
    assert_eq!(result, Err(Ok(Error::NotInitialized)));
}

#[test]
fn test_settings_roundtrip() {
    let (env, client, admin, _provider) = setup();

    configure_eur(&env, &client, &admin, 60);

    let settings = client.get_currency_settings(&String::from_str(&env, "EUR"));
    assert_eq!(
        settings,
        CurrencySettings {
            query_string: String::from_str(&env, "json(https://api.example.com/rates).EUR"),
            call_interval: 60,
            callback_gas_limit: 200_000,
        }
    );
}

#[test]
fn test_settings_default_to_zeroed() {
    let (env, client, _admin, _provider) = setup();

    let settings = client.get_currency_settings(&String::from_str(&env, "GBP"));
    assert_eq!(settings.query_string, String::from_str(&env, ""));
    assert_eq!(settings.call_interval, 0);
    assert_eq!(settings.callback_gas_limit, 0);
}

#[test]
fn test_settings_require_admin() {
    let (env, client, _admin, _provider) = setup();

    let rando = Address::generate(&env);
    let result = client.try_set_currency_settings(
        &rando,
        &String::from_str(&env, "EUR"),
        &String::from_str(&env, "json(...)"),
        &0u64,
        &200_000u64,
    );
    assert_eq!(result, Err(Ok(Error::Unauthorized)));
}

#[test]
fn test_query_cost_validation() {
    let (env, client, admin, _provider) = setup();

    let rando = Address::generate(&env);
    assert_eq!(
        client.try_set_query_cost(&rando, &250i128),
        Err(Ok(Error::Unauthorized))
    );
    assert_eq!(
        client.try_set_query_cost(&admin, &(-1i128)),
        Err(Ok(Error::InvalidAmount))
    );

    client.set_query_cost(&admin, &250i128);
    assert_eq!(client.get_query_cost(), 250);
}

#[test]
fn test_settings_reject_oversize_symbol() {
    let (env, client, admin, _provider) = setup();

    let result = client.try_set_currency_settings(
        &admin,
        &String::from_str(&env, "USDTEUROS"),
        &String::from_str(&env, "json(...)"),
        &0u64,
        &200_000u64,
    );
    assert_eq!(result, Err(Ok(Error::EncodingTooLong)));
}

#[test]
fn test_fetch_requires_settings() {
    let (env, client, admin, _provider) = setup();

    let result = client.try_fetch_rate(&admin, &String::from_str(&env, "EUR"));
    assert_eq!(result, Err(Ok(Error::UnconfiguredSymbol)));
}

#[test]
fn test_fetch_requires_admin() {
    let (env, client, admin, _provider) = setup();

    configure_eur(&env, &client, &admin, 0);

    let rando = Address::generate(&env);
    let result = client.try_fetch_rate(&rando, &String::from_str(&env, "EUR"));
    assert_eq!(result, Err(Ok(Error::Unauthorized)));
}

#[test]
fn test_fetch_then_callback_stores_rate() {
    let (env, client, admin, provider) = setup();

    configure_eur(&env, &client, &admin, 0);

    let eur = String::from_str(&env, "EUR");
    let query_id = client.fetch_rate(&admin, &eur);

    assert_eq!(client.pending_query_id(&eur), Some(query_id.clone()));
    assert_eq!(client.query_symbol(&query_id), Some(eur.clone()));
    assert_eq!(client.try_get_rate(&eur), Err(Ok(Error::RateUnset)));

    client.receive_callback(&provider, &query_id, &EUR_RATE);

    assert_eq!(client.get_rate(&eur), EUR_RATE);
    assert_eq!(client.pending_query_id(&eur), None);
    assert_eq!(client.query_symbol(&query_id), None);

    // consumed exactly once
    let result = client.try_receive_callback(&provider, &query_id, &EUR_RATE);
    assert_eq!(result, Err(Ok(Error::UnknownQueryId)));
}

#[test]
fn test_callback_requires_provider() {
    let (env, client, admin, _provider) = setup();

    configure_eur(&env, &client, &admin, 0);
    let query_id = client.fetch_rate(&admin, &String::from_str(&env, "EUR"));

    let result = client.try_receive_callback(&admin, &query_id, &EUR_RATE);
    assert_eq!(result, Err(Ok(Error::Unauthorized)));
}

#[test]
fn test_callback_unknown_id() {
    let (env, client, _admin, provider) = setup();

    let bogus = BytesN::from_array(&env, &[7u8; 32]);
    let result = client.try_receive_callback(&provider, &bogus, &EUR_RATE);
    assert_eq!(result, Err(Ok(Error::UnknownQueryId)));
}

#[test]
fn test_callback_rejects_negative_rate() {
    let (env, client, admin, provider) = setup();

    configure_eur(&env, &client, &admin, 0);
    let eur = String::from_str(&env, "EUR");
    let query_id = client.fetch_rate(&admin, &eur);

    let result = client.try_receive_callback(&provider, &query_id, &(-1i128));
    assert_eq!(result, Err(Ok(Error::InvalidRate)));

    // the rejected callback leaves the query pending
    client.receive_callback(&provider, &query_id, &EUR_RATE);
    assert_eq!(client.get_rate(&eur), EUR_RATE);
}

#[test]
fn test_zero_rate_keeps_symbol_unset() {
    let (env, client, admin, provider) = setup();

    configure_eur(&env, &client, &admin, 0);
    let eur = String::from_str(&env, "EUR");
    let query_id = client.fetch_rate(&admin, &eur);

    client.receive_callback(&provider, &query_id, &0i128);
    assert_eq!(client.try_get_rate(&eur), Err(Ok(Error::RateUnset)));
}

#[test]
fn test_rearm_when_active_with_interval() {
    let (env, client, admin, provider) = setup();

    configure_eur(&env, &client, &admin, 60);
    let eur = String::from_str(&env, "EUR");
    let first = client.fetch_rate(&admin, &eur);

    client.receive_callback(&provider, &first, &50_000i128);

    // a fresh query is in flight without another fetch_rate call
    let rearmed = client.pending_query_id(&eur).unwrap();
    assert_ne!(rearmed, first);

    client.receive_callback(&provider, &rearmed, &50_100i128);
    assert_eq!(client.get_rate(&eur), 50_100);
}

#[test]
fn test_no_rearm_when_inactive() {
    let (env, client, admin, provider) = setup();

    configure_eur(&env, &client, &admin, 60);
    let eur = String::from_str(&env, "EUR");
    let query_id = client.fetch_rate(&admin, &eur);

    assert!(!client.toggle_rates_active(&admin));
    client.receive_callback(&provider, &query_id, &50_000i128);

    assert_eq!(client.pending_query_id(&eur), None);
    assert_eq!(client.get_rate(&eur), 50_000);
}

#[test]
fn test_no_rearm_when_interval_zero() {
    let (env, client, admin, provider) = setup();

    configure_eur(&env, &client, &admin, 0);
    let eur = String::from_str(&env, "EUR");
    let query_id = client.fetch_rate(&admin, &eur);

    client.receive_callback(&provider, &query_id, &50_000i128);
    assert_eq!(client.pending_query_id(&eur), None);
}

#[test]
fn test_clear_intervals_zeroes_and_suppresses() {
    let (env, client, admin, provider) = setup();

    configure_eur(&env, &client, &admin, 60);
    let eur = String::from_str(&env, "EUR");
    let query_id = client.fetch_rate(&admin, &eur);

    assert!(client.toggle_clear_rate_intervals(&admin));
    client.receive_callback(&provider, &query_id, &50_000i128);

    assert_eq!(client.pending_query_id(&eur), None);
    assert_eq!(client.get_currency_settings(&eur).call_interval, 0);
}

#[test]
fn test_fetch_supersedes_pending_query_for_symbol() {
    let (env, client, admin, provider) = setup();

    configure_eur(&env, &client, &admin, 0);
    let eur = String::from_str(&env, "EUR");

    let first = client.fetch_rate(&admin, &eur);
    let second = client.fetch_rate(&admin, &eur);
    assert_ne!(first, second);
    assert_eq!(client.pending_query_id(&eur), Some(second.clone()));

    // the superseded id no longer settles
    let result = client.try_receive_callback(&provider, &first, &EUR_RATE);
    assert_eq!(result, Err(Ok(Error::UnknownQueryId)));

    client.receive_callback(&provider, &second, &EUR_RATE);
    assert_eq!(client.get_rate(&eur), EUR_RATE);
}

#[test]
fn test_symbols_are_case_insensitive() {
    let (env, client, admin, provider) = setup();

    client.set_currency_settings(
        &admin,
        &String::from_str(&env, "eur"),
        &String::from_str(&env, "json(https://api.example.com/rates).EUR"),
        &0u64,
        &200_000u64,
    );

    let query_id = client.fetch_rate(&admin, &String::from_str(&env, "EUR"));
    client.receive_callback(&provider, &query_id, &EUR_RATE);

    assert_eq!(client.get_rate(&String::from_str(&env, "Eur")), EUR_RATE);
    assert_eq!(
        client
            .get_currency_settings(&String::from_str(&env, "eUr"))
            .call_interval,
        0
    );
}

#[test]
fn test_query_cost_pulled_on_fetch() {
    let env = Env::default();
    env.mock_all_auths();

    let contract_id = env.register_contract(None, RateOracle);
    let client = RateOracleClient::new(&env, &contract_id);

    let admin = Address::generate(&env);
    let provider = Address::generate(&env);
    let issuer = Address::generate(&env);
    let fee_token = env.register_stellar_asset_contract_v2(issuer.clone()).address();
    client.initialize(&admin, &provider, &fee_token);
    configure_eur(&env, &client, &admin, 0);

    token::StellarAssetClient::new(&env, &fee_token).mint(&admin, &1_000i128);
    client.set_query_cost(&admin, &250i128);

    client.fetch_rate(&admin, &String::from_str(&env, "EUR"));

    let fee_client = token::Client::new(&env, &fee_token);
    assert_eq!(fee_client.balance(&admin), 750);
    assert_eq!(fee_client.balance(&contract_id), 250);
}

#[test]
fn test_rearm_does_not_pull_query_cost() {
    let env = Env::default();
    env.mock_all_auths();

    let contract_id = env.register_contract(None, RateOracle);
    let client = RateOracleClient::new(&env, &contract_id);

    let admin = Address::generate(&env);
    let provider = Address::generate(&env);
    let issuer = Address::generate(&env);
    let fee_token = env.register_stellar_asset_contract_v2(issuer.clone()).address();
    client.initialize(&admin, &provider, &fee_token);
    configure_eur(&env, &client, &admin, 60);

    token::StellarAssetClient::new(&env, &fee_token).mint(&admin, &1_000i128);
    client.set_query_cost(&admin, &250i128);

    let eur = String::from_str(&env, "EUR");
    let first = client.fetch_rate(&admin, &eur);

    let fee_client = token::Client::new(&env, &fee_token);
    assert_eq!(fee_client.balance(&admin), 750);
    assert_eq!(fee_client.balance(&contract_id), 250);

    client.receive_callback(&provider, &first, &EUR_RATE);

    // the automatic re-fetch is in flight without a second payment
    let rearmed = client.pending_query_id(&eur).unwrap();
    assert_ne!(rearmed, first);
    assert_eq!(fee_client.balance(&admin), 750);
    assert_eq!(fee_client.balance(&contract_id), 250);

    client.receive_callback(&provider, &rearmed, &EUR_RATE);
    assert_eq!(client.get_rate(&eur), EUR_RATE);
}

#[test]
fn test_retire_drains_and_freezes() {
    let env = Env::default();
    env.mock_all_auths();

    let contract_id = env.register_contract(None, RateOracle);
    let client = RateOracleClient::new(&env, &contract_id);

    let admin = Address::generate(&env);
    let provider = Address::generate(&env);
    let issuer = Address::generate(&env);
    let fee_token = env.register_stellar_asset_contract_v2(issuer.clone()).address();
    client.initialize(&admin, &provider, &fee_token);
    configure_eur(&env, &client, &admin, 0);

    let eur = String::from_str(&env, "EUR");
    let query_id = client.fetch_rate(&admin, &eur);
    client.receive_callback(&provider, &query_id, &EUR_RATE);

    token::StellarAssetClient::new(&env, &fee_token).mint(&contract_id, &500i128);

    client.retire(&admin);

    let fee_client = token::Client::new(&env, &fee_token);
    assert_eq!(fee_client.balance(&contract_id), 0);
    assert_eq!(fee_client.balance(&admin), 500);
    assert!(client.is_retired());

    // reads survive, mutations do not
    assert_eq!(client.get_rate(&eur), EUR_RATE);
    assert_eq!(
        client.try_fetch_rate(&admin, &eur),
        Err(Ok(Error::ContractRetired))
    );
    assert_eq!(
        client.try_set_currency_settings(
            &admin,
            &eur,
            &String::from_str(&env, "json(...)"),
            &0u64,
            &200_000u64,
        ),
        Err(Ok(Error::ContractRetired))
    );
    assert_eq!(
        client.try_receive_callback(&provider, &query_id, &EUR_RATE),
        Err(Ok(Error::ContractRetired))
    );
    assert_eq!(
        client.try_toggle_rates_active(&admin),
        Err(Ok(Error::ContractRetired))
    );
    assert_eq!(client.try_retire(&admin), Err(Ok(Error::ContractRetired)));
}

#[test]
fn test_retire_requires_admin() {
    let (env, client, _admin, _provider) = setup();

    let rando = Address::generate(&env);
    assert_eq!(client.try_retire(&rando), Err(Ok(Error::Unauthorized)));
}
