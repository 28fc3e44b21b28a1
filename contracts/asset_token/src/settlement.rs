use soroban_sdk::{Env, U256};

use crate::conversion::mul_div_floor;
use crate::error::Error;
use crate::storage::{FEE_RATE_PER_MILLE, SCALE};

/// How an incoming payout divides between the platform and the holders.
pub struct PayoutSplit {
    /// Fee plus the sub-supply remainder that cannot spread evenly
    pub fee: i128,
    /// Amount added to the cumulative per-token payout counter
    pub per_token_increase: i128,
}

/// Platform fee on an amount.
///
/// Formula: fee = floor(amount × 5 / 1000)
pub fn calculate_fee(amount: i128) -> Result<i128, Error> {
    if amount < 0 {
        return Err(Error::InvalidAmount);
    }
    Ok(amount
        .checked_mul(FEE_RATE_PER_MILLE)
        .ok_or(Error::InvalidAmount)?
        / 1_000)
}

/// Split a payout into the fee-sink share and the per-token accrual.
///
/// The net amount is scaled by 1e18 before dividing by the supply so
/// sub-unit payouts still move the counter. Whatever the scaled division
/// leaves over is folded back into the fee, keeping the books exact.
pub fn split_payout(env: &Env, amount: i128, total_supply: i128) -> Result<PayoutSplit, Error> {
    if amount <= 0 {
        return Err(Error::InvalidAmount);
    }
    if total_supply <= 0 {
        return Err(Error::InvalidAmount);
    }

    let base_fee = calculate_fee(amount)?;
    let net = amount - base_fee;

    let scaled = U256::from_u128(env, net as u128).mul(&U256::from_u128(env, SCALE as u128));
    let supply = U256::from_u128(env, total_supply as u128);
    let per_token = scaled.div(&supply);
    let remainder = scaled.sub(&per_token.mul(&supply));

    let per_token_increase = per_token.to_u128().ok_or(Error::InvalidAmount)?;
    if per_token_increase > i128::MAX as u128 {
        return Err(Error::InvalidAmount);
    }
    let dust = remainder
        .div(&U256::from_u128(env, SCALE as u128))
        .to_u128()
        .ok_or(Error::InvalidAmount)? as i128;

    Ok(PayoutSplit {
        fee: base_fee + dust,
        per_token_increase: per_token_increase as i128,
    })
}

/// Payout accrued by a holder since their ledger position was last
/// settled.
///
/// Formula: delta = floor(balance × (total − last_settled) / SCALE)
pub fn payout_delta(
    env: &Env,
    balance: i128,
    total_per_token: i128,
    last_settled: i128,
) -> Result<i128, Error> {
    let delta = total_per_token - last_settled;
    if balance <= 0 || delta <= 0 {
        return Ok(0);
    }
    mul_div_floor(env, balance, delta, SCALE)
}

/// Everything a holder could claim right now: the carried unclaimed
/// balance plus whatever accrued since the last settlement.
pub fn current_payout(
    env: &Env,
    balance: i128,
    unclaimed: i128,
    total_per_token: i128,
    last_settled: i128,
) -> Result<i128, Error> {
    let delta = payout_delta(env, balance, total_per_token, last_settled)?;
    unclaimed.checked_add(delta).ok_or(Error::InvalidAmount)
}
