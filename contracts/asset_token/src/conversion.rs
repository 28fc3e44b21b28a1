use soroban_sdk::{Env, U256};

use crate::error::Error;
use crate::storage::SCALE;

/// Convert a token-denominated amount into fiat cents at the given rate.
///
/// Formula: cents = floor(amount × rate / SCALE)
///
/// Example:
/// - amount: 1.0 (18 decimals), rate: 33,333 cents per whole unit
/// - cents: 1e18 × 33333 / 1e18 = 33,333
pub fn amount_to_cents(env: &Env, amount: i128, rate: i128) -> Result<i128, Error> {
    if rate <= 0 {
        return Err(Error::RateUnset);
    }
    mul_div_floor(env, amount, rate, SCALE)
}

/// Convert fiat cents into a token-denominated amount at the given rate.
///
/// Formula: amount = floor(cents × SCALE / rate)
pub fn cents_to_amount(env: &Env, cents: i128, rate: i128) -> Result<i128, Error> {
    if rate <= 0 {
        return Err(Error::RateUnset);
    }
    mul_div_floor(env, cents, SCALE, rate)
}

/// How many tokens a payment buys, pro rata against the funding goal
/// valued at the current rate.
///
/// Formula: tokens = floor(amount × total_supply / goal_amount)
/// where goal_amount = cents_to_amount(goal_cents). Paying one tenth of
/// the goal buys one tenth of the supply.
pub fn amount_to_tokens(
    env: &Env,
    amount: i128,
    rate: i128,
    goal_cents: i128,
    total_supply: i128,
) -> Result<i128, Error> {
    if goal_cents <= 0 || total_supply <= 0 {
        return Err(Error::InvalidAmount);
    }
    let goal_amount = cents_to_amount(env, goal_cents, rate)?;
    mul_div_floor(env, amount, total_supply, goal_amount)
}

/// Inverse of `amount_to_tokens`, used for refund accounting.
///
/// Formula: amount = floor(tokens × goal_amount / total_supply)
pub fn tokens_to_amount(
    env: &Env,
    tokens: i128,
    rate: i128,
    goal_cents: i128,
    total_supply: i128,
) -> Result<i128, Error> {
    if goal_cents <= 0 || total_supply <= 0 {
        return Err(Error::InvalidAmount);
    }
    let goal_amount = cents_to_amount(env, goal_cents, rate)?;
    mul_div_floor(env, tokens, goal_amount, total_supply)
}

/// floor(a × b / divisor) over 256-bit intermediates. Products of two
/// 18-decimal quantities overflow i128, so the multiply must go wide.
pub(crate) fn mul_div_floor(env: &Env, a: i128, b: i128, divisor: i128) -> Result<i128, Error> {
    if a < 0 || b < 0 {
        return Err(Error::InvalidAmount);
    }
    if divisor <= 0 {
        return Err(Error::InvalidAmount);
    }

    let wide = U256::from_u128(env, a as u128).mul(&U256::from_u128(env, b as u128));
    let quotient = wide
        .div(&U256::from_u128(env, divisor as u128))
        .to_u128()
        .ok_or(Error::InvalidAmount)?;
    if quotient > i128::MAX as u128 {
        return Err(Error::InvalidAmount);
    }
    Ok(quotient as i128)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EUR_RATE: i128 = 33_333;
    const GOAL_CENTS: i128 = 500_000;
    const SUPPLY: i128 = 100 * SCALE;
    // floor(500000 × 1e18 / 33333)
    const GOAL_AMOUNT: i128 = 15_000_150_001_500_015_000;

    #[test]
    fn test_amount_to_cents_floors() {
        let env = Env::default();

        assert_eq!(amount_to_cents(&env, SCALE, EUR_RATE).unwrap(), 33_333);
        // one wei short of 2.0 drops a whole cent
        assert_eq!(
            amount_to_cents(&env, 2 * SCALE - 1, EUR_RATE).unwrap(),
            66_665
        );
    }

    #[test]
    fn test_goal_amount_for_fixture_rate() {
        let env = Env::default();

        let goal = cents_to_amount(&env, GOAL_CENTS, EUR_RATE).unwrap();
        assert_eq!(goal, GOAL_AMOUNT);
    }

    #[test]
    fn test_cents_round_trip_within_one_cent() {
        let env = Env::default();

        // 33333 does not divide 5e23, so the floor eats one cent
        let amount = cents_to_amount(&env, GOAL_CENTS, EUR_RATE).unwrap();
        assert_eq!(amount_to_cents(&env, amount, EUR_RATE).unwrap(), 499_999);

        // an evenly dividing rate round-trips exactly
        let amount = cents_to_amount(&env, GOAL_CENTS, 1_000).unwrap();
        assert_eq!(amount_to_cents(&env, amount, 1_000).unwrap(), 500_000);
    }

    #[test]
    fn test_token_conversion_identity() {
        let env = Env::default();

        assert_eq!(
            amount_to_tokens(&env, GOAL_AMOUNT, EUR_RATE, GOAL_CENTS, SUPPLY).unwrap(),
            SUPPLY
        );
        assert_eq!(
            tokens_to_amount(&env, SUPPLY, EUR_RATE, GOAL_CENTS, SUPPLY).unwrap(),
            GOAL_AMOUNT
        );
    }

    #[test]
    fn test_tokens_proportional_to_payment() {
        let env = Env::default();

        let tokens =
            amount_to_tokens(&env, GOAL_AMOUNT / 10, EUR_RATE, GOAL_CENTS, SUPPLY).unwrap();
        assert_eq!(tokens, SUPPLY / 10);
    }

    #[test]
    fn test_wide_products_do_not_overflow() {
        let env = Env::default();

        // 1e25 × 1e15 = 1e40 overflows i128 but not the wide intermediate
        let amount = 10_000_000_000_000_000_000_000_000i128;
        let rate = 1_000_000_000_000_000i128;
        assert_eq!(
            amount_to_cents(&env, amount, rate).unwrap(),
            10_000_000_000_000_000_000_000
        );
    }

    #[test]
    fn test_negative_amount_rejected() {
        let env = Env::default();

        assert_eq!(
            amount_to_cents(&env, -1, EUR_RATE),
            Err(Error::InvalidAmount)
        );
        assert_eq!(
            tokens_to_amount(&env, -1, EUR_RATE, GOAL_CENTS, SUPPLY),
            Err(Error::InvalidAmount)
        );
    }

    #[test]
    fn test_rate_must_be_positive() {
        let env = Env::default();

        assert_eq!(amount_to_cents(&env, SCALE, 0), Err(Error::RateUnset));
        assert_eq!(cents_to_amount(&env, 100, -5), Err(Error::RateUnset));
        assert_eq!(
            amount_to_tokens(&env, SCALE, 0, GOAL_CENTS, SUPPLY),
            Err(Error::RateUnset)
        );
    }

    #[test]
    fn test_overflowing_result_rejected() {
        let env = Env::default();

        // rate so high the goal collapses to zero payment units
        assert_eq!(
            amount_to_tokens(&env, SCALE, 2 * SCALE, 1, SUPPLY),
            Err(Error::InvalidAmount)
        );
        assert_eq!(
            amount_to_cents(&env, i128::MAX, i128::MAX),
            Err(Error::InvalidAmount)
        );
    }
}
