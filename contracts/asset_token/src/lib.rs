#![no_std]

mod conversion;
mod error;
mod events;
mod settlement;
mod storage;


pub use error::Error;
pub use storage::Stage;

use events::*;
use storage::{
    DataKey, DECIMALS, FEE_RATE_PER_MILLE, MAX_CURRENCY_LEN, MIN_ACTIVATION_TIMEOUT,
    MIN_FUNDING_TIMEOUT, MIN_TEXT_LEN, PROOF_OF_CUSTODY_LEN,
};

use soroban_sdk::{contract, contractimpl, token, vec, Address, Env, IntoVal, String, Symbol};

#[contract]
pub struct AssetToken;

#[contractimpl]
impl AssetToken {
    // ============================================
    // INITIALIZATION
    // ============================================

    /// Set up the token half: identity, roles, payment rail, and the full
    /// supply parked on the contract's own balance. The ledger starts
    /// paused in PreFunding.
    ///
    /// # Errors
    /// - `AlreadyInitialized`: Token half already initialized
    /// - `InvalidName`: Name shorter than 3 characters
    /// - `InvalidSymbol`: Symbol shorter than 3 characters
    /// - `InvalidSupply`: Total supply must be positive
    pub fn initialize_token(
        env: Env,
        owner: Address,
        name: String,
        symbol: String,
        custodian: Address,
        payment_token: Address,
        total_supply: i128,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::TokenInitialized) {
            return Err(Error::AlreadyInitialized);
        }

        owner.require_auth();

        // Validate: Human-readable identity
        if name.len() < MIN_TEXT_LEN {
            return Err(Error::InvalidName);
        }
        if symbol.len() < MIN_TEXT_LEN {
            return Err(Error::InvalidSymbol);
        }
        if total_supply <= 0 {
            return Err(Error::InvalidSupply);
        }

        env.storage().instance().set(&DataKey::TokenInitialized, &true);
        env.storage().instance().set(&DataKey::Owner, &owner);
        env.storage().instance().set(&DataKey::Custodian, &custodian);
        env.storage()
            .instance()
            .set(&DataKey::PaymentToken, &payment_token);
        env.storage().instance().set(&DataKey::Name, &name);
        env.storage().instance().set(&DataKey::Symbol, &symbol);
        env.storage()
            .instance()
            .set(&DataKey::TotalSupply, &total_supply);
        env.storage()
            .instance()
            .set(&DataKey::InitialSupply, &total_supply);
        env.storage().instance().set(
            &DataKey::Balance(env.current_contract_address()),
            &total_supply,
        );
        env.storage()
            .instance()
            .set(&DataKey::TotalPerTokenPayout, &0i128);
        env.storage().instance().set(&DataKey::Paused, &true);
        env.storage()
            .instance()
            .set(&DataKey::Stage, &Stage::PreFunding);

        Ok(())
    }

    /// Set up the crowdsale half: sale window, fiat goal, and the injected
    /// collaborators. Requires the oracle to already carry a usable rate
    /// for the fiat currency, so a sale can never open unpriceable.
    ///
    /// # Errors
    /// - `NotInitialized`: Token half not initialized
    /// - `CrowdsaleAlreadyInitialized`: Crowdsale half already initialized
    /// - `Unauthorized`: Caller is not owner
    /// - `InvalidCurrency`: Fiat currency not 3..=8 characters
    /// - `InvalidStartTime`: Funding must open in the future
    /// - `InvalidTimeout`: Timeout below the required minimum
    /// - `InvalidFundingGoal`: Goal not in (0, total_supply]
    /// - `RateUnset`: Oracle has no usable rate for the currency
    pub fn initialize_crowdsale(
        env: Env,
        from: Address,
        fiat_currency: String,
        broker: Address,
        start_time: u64,
        funding_timeout: u64,
        activation_timeout: u64,
        funding_goal_cents: i128,
        oracle: Address,
        whitelist: Address,
        fee_sink: Address,
    ) -> Result<(), Error> {
        Self::check_token_initialized(&env)?;
        if env.storage().instance().has(&DataKey::CrowdsaleInitialized) {
            return Err(Error::CrowdsaleAlreadyInitialized);
        }

        Self::require_owner(&env, &from)?;

        // Validate: Sale parameters
        if fiat_currency.len() < MIN_TEXT_LEN || fiat_currency.len() > MAX_CURRENCY_LEN {
            return Err(Error::InvalidCurrency);
        }
        if start_time < env.ledger().timestamp() {
            return Err(Error::InvalidStartTime);
        }
        if funding_timeout < MIN_FUNDING_TIMEOUT {
            return Err(Error::InvalidTimeout);
        }
        if activation_timeout < MIN_ACTIVATION_TIMEOUT {
            return Err(Error::InvalidTimeout);
        }
        let total_supply: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TotalSupply)
            .ok_or(Error::NotInitialized)?;
        if funding_goal_cents <= 0 || funding_goal_cents > total_supply {
            return Err(Error::InvalidFundingGoal);
        }

        env.storage()
            .instance()
            .set(&DataKey::CrowdsaleInitialized, &true);
        env.storage()
            .instance()
            .set(&DataKey::FiatCurrency, &fiat_currency);
        env.storage().instance().set(&DataKey::Broker, &broker);
        env.storage().instance().set(&DataKey::StartTime, &start_time);
        env.storage()
            .instance()
            .set(&DataKey::FundingTimeout, &funding_timeout);
        env.storage()
            .instance()
            .set(&DataKey::ActivationTimeout, &activation_timeout);
        env.storage()
            .instance()
            .set(&DataKey::FundingGoalCents, &funding_goal_cents);
        env.storage()
            .instance()
            .set(&DataKey::FundedAmountCents, &0i128);
        env.storage().instance().set(&DataKey::Oracle, &oracle);
        env.storage().instance().set(&DataKey::Whitelist, &whitelist);
        env.storage().instance().set(&DataKey::FeeSink, &fee_sink);

        // Validate: The configured currency must already be priceable
        Self::fetch_fiat_rate(&env)?;

        Ok(())
    }

    // ============================================
    // SALE LIFECYCLE
    // ============================================

    /// Open the funding window. Anyone may poke the machine once the
    /// start time has passed.
    ///
    /// # Errors
    /// - `CrowdsaleNotInitialized`: Crowdsale half not initialized
    /// - `InvalidStage`: Not in PreFunding
    /// - `TooEarly`: Start time has not been reached
    pub fn start_sale(env: Env) -> Result<(), Error> {
        Self::check_crowdsale_initialized(&env)?;

        if Self::read_stage(&env) != Stage::PreFunding {
            return Err(Error::InvalidStage);
        }

        let start_time: u64 = env
            .storage()
            .instance()
            .get(&DataKey::StartTime)
            .ok_or(Error::CrowdsaleNotInitialized)?;
        if env.ledger().timestamp() < start_time {
            return Err(Error::TooEarly);
        }

        Self::enter_stage(&env, Stage::Funding);
        Ok(())
    }

    /// Buy into the crowdsale. Payment is pulled in the payment token,
    /// valued in fiat cents at the live oracle rate, and answered with a
    /// pro-rata share of the supply. A buy that would overshoot the goal
    /// is clamped to the missing cents; reaching the goal flips the sale
    /// to Pending in the same call. Returns the tokens granted.
    ///
    /// # Errors
    /// - `CrowdsaleNotInitialized`: Crowdsale half not initialized
    /// - `InvalidStage`: Not in Funding (includes a sale past its deadline)
    /// - `NotWhitelisted`: Buyer failed the whitelist check
    /// - `InvalidAmount`: Amount not positive, or too small to register a cent
    /// - `RateUnset`: Oracle has no usable rate
    /// - `SoldOut`: Token allotment exceeds the contract's remaining balance
    pub fn buy(env: Env, buyer: Address, amount: i128) -> Result<i128, Error> {
        Self::check_crowdsale_initialized(&env)?;
        buyer.require_auth();

        if Self::poll_stage(&env)? != Stage::Funding {
            return Err(Error::InvalidStage);
        }
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        Self::check_whitelisted(&env, &buyer)?;

        let rate = Self::fetch_fiat_rate(&env)?;
        let cents = conversion::amount_to_cents(&env, amount, rate)?;
        if cents <= 0 {
            return Err(Error::InvalidAmount);
        }

        let goal_cents: i128 = env
            .storage()
            .instance()
            .get(&DataKey::FundingGoalCents)
            .ok_or(Error::CrowdsaleNotInitialized)?;
        let funded_cents: i128 = env
            .storage()
            .instance()
            .get(&DataKey::FundedAmountCents)
            .unwrap_or(0);

        // Clamp: Never take more cents than the goal still needs
        let remaining_cents = goal_cents - funded_cents;
        let (accepted_cents, accepted_amount) = if cents > remaining_cents {
            (
                remaining_cents,
                conversion::cents_to_amount(&env, remaining_cents, rate)?,
            )
        } else {
            (cents, amount)
        };
        if accepted_amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        let total_supply: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TotalSupply)
            .ok_or(Error::NotInitialized)?;
        let tokens =
            conversion::amount_to_tokens(&env, accepted_amount, rate, goal_cents, total_supply)?;
        if tokens <= 0 {
            return Err(Error::InvalidAmount);
        }

        // Validate: The contract must still hold the allotment
        let pool: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Balance(env.current_contract_address()))
            .unwrap_or(0);
        if tokens > pool {
            return Err(Error::SoldOut);
        }

        // Pull payment from the buyer
        let payment_token = Self::payment_token_address(&env)?;
        token::Client::new(&env, &payment_token).transfer(
            &buyer,
            &env.current_contract_address(),
            &accepted_amount,
        );

        // Move the allotment out of the contract's inventory
        env.storage().instance().set(
            &DataKey::Balance(env.current_contract_address()),
            &(pool - tokens),
        );
        let buyer_balance: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Balance(buyer.clone()))
            .unwrap_or(0);
        env.storage().instance().set(
            &DataKey::Balance(buyer.clone()),
            &buyer_balance
                .checked_add(tokens)
                .ok_or(Error::InvalidAmount)?,
        );

        // Record the refund basis and the fiat progress
        let invested: i128 = env
            .storage()
            .instance()
            .get(&DataKey::InvestmentOf(buyer.clone()))
            .unwrap_or(0);
        env.storage().instance().set(
            &DataKey::InvestmentOf(buyer.clone()),
            &invested
                .checked_add(accepted_amount)
                .ok_or(Error::InvalidAmount)?,
        );
        let new_funded = funded_cents
            .checked_add(accepted_cents)
            .ok_or(Error::InvalidAmount)?;
        env.storage()
            .instance()
            .set(&DataKey::FundedAmountCents, &new_funded);

        env.events().publish(
            (Symbol::new(&env, "buy"), buyer.clone()),
            BuyEvent {
                buyer,
                amount: accepted_amount,
                cents: accepted_cents,
                tokens,
            },
        );

        if new_funded >= goal_cents {
            Self::enter_stage(&env, Stage::Pending);
        }

        Ok(tokens)
    }

    /// Flag a timed-out sale as Failed. Anyone may call it: Funding fails
    /// after the funding deadline, Pending after the activation deadline.
    /// Entering Failed burns the contract's own unsold balance.
    ///
    /// # Errors
    /// - `CrowdsaleNotInitialized`: Crowdsale half not initialized
    /// - `TimeoutNotElapsed`: Deadline has not passed yet
    /// - `InvalidStage`: Not in Funding or Pending
    pub fn set_failed(env: Env) -> Result<(), Error> {
        Self::check_crowdsale_initialized(&env)?;

        let now = env.ledger().timestamp();
        match Self::read_stage(&env) {
            Stage::Funding => {
                if now < Self::funding_deadline_value(&env)? {
                    return Err(Error::TimeoutNotElapsed);
                }
                Self::enter_failed(&env)?;
            }
            Stage::Pending => {
                if now < Self::activation_deadline_value(&env)? {
                    return Err(Error::TimeoutNotElapsed);
                }
                Self::enter_failed(&env)?;
            }
            _ => return Err(Error::InvalidStage),
        }

        Ok(())
    }

    /// Tokenize the asset: store the proof of custody, skim the platform
    /// fee off the collected funding, credit the remainder to the broker's
    /// claimable entitlement, unpause, and go Active.
    ///
    /// # Errors
    /// - `CrowdsaleNotInitialized`: Crowdsale half not initialized
    /// - `Unauthorized`: Caller is not custodian
    /// - `InvalidStage`: Not in Pending, or the activation deadline passed
    /// - `InvalidProofOfCustody`: Not a 46-character Qm-prefixed ipfs hash
    pub fn activate(env: Env, from: Address, proof_of_custody: String) -> Result<(), Error> {
        Self::check_crowdsale_initialized(&env)?;
        Self::require_custodian(&env, &from)?;

        if Self::poll_stage(&env)? != Stage::Pending {
            return Err(Error::InvalidStage);
        }

        Self::validate_proof(&proof_of_custody)?;
        env.storage()
            .instance()
            .set(&DataKey::ProofOfCustody, &proof_of_custody);
        env.events().publish(
            (Symbol::new(&env, "proof_updated"), from.clone()),
            ProofOfCustodyEvent {
                custodian: from.clone(),
                proof: proof_of_custody,
            },
        );

        // Split the collected funding: fee to the sink, rest to the broker
        let payment_token = Self::payment_token_address(&env)?;
        let payment_client = token::Client::new(&env, &payment_token);
        let collected = payment_client.balance(&env.current_contract_address());
        let fee = settlement::calculate_fee(collected)?;
        if fee > 0 {
            let fee_sink: Address = env
                .storage()
                .instance()
                .get(&DataKey::FeeSink)
                .ok_or(Error::CrowdsaleNotInitialized)?;
            payment_client.transfer(&env.current_contract_address(), &fee_sink, &fee);
        }
        let remainder = collected - fee;
        if remainder > 0 {
            let broker: Address = env
                .storage()
                .instance()
                .get(&DataKey::Broker)
                .ok_or(Error::CrowdsaleNotInitialized)?;
            let unclaimed: i128 = env
                .storage()
                .instance()
                .get(&DataKey::UnclaimedOf(broker.clone()))
                .unwrap_or(0);
            env.storage().instance().set(
                &DataKey::UnclaimedOf(broker),
                &unclaimed
                    .checked_add(remainder)
                    .ok_or(Error::InvalidAmount)?,
            );
        }

        env.storage().instance().set(&DataKey::Paused, &false);
        Self::enter_stage(&env, Stage::Active);

        Ok(())
    }

    /// Refund an investor after the sale failed. Performs the Failed
    /// transition itself when a deadline has passed unnoticed. The refund
    /// is the exact recorded investment; the investor's tokens burn.
    ///
    /// # Errors
    /// - `CrowdsaleNotInitialized`: Crowdsale half not initialized
    /// - `InvalidStage`: Sale has not failed
    /// - `NothingToClaim`: No recorded investment
    pub fn reclaim(env: Env, from: Address) -> Result<i128, Error> {
        Self::check_crowdsale_initialized(&env)?;
        from.require_auth();

        if Self::poll_stage(&env)? != Stage::Failed {
            return Err(Error::InvalidStage);
        }

        let refund: i128 = env
            .storage()
            .instance()
            .get(&DataKey::InvestmentOf(from.clone()))
            .unwrap_or(0);
        if refund <= 0 {
            return Err(Error::NothingToClaim);
        }

        // Burn the investor's tokens and zero the record
        let balance: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Balance(from.clone()))
            .unwrap_or(0);
        if balance > 0 {
            let total_supply: i128 = env
                .storage()
                .instance()
                .get(&DataKey::TotalSupply)
                .ok_or(Error::NotInitialized)?;
            env.storage()
                .instance()
                .set(&DataKey::TotalSupply, &(total_supply - balance));
            env.storage()
                .instance()
                .remove(&DataKey::Balance(from.clone()));
        }
        env.storage()
            .instance()
            .remove(&DataKey::InvestmentOf(from.clone()));

        let payment_token = Self::payment_token_address(&env)?;
        token::Client::new(&env, &payment_token).transfer(
            &env.current_contract_address(),
            &from,
            &refund,
        );

        env.events().publish(
            (Symbol::new(&env, "reclaim"), from.clone()),
            ReclaimEvent {
                investor: from,
                tokens_burned: balance,
                refund,
            },
        );

        Ok(refund)
    }

    /// Wind the asset down. Claims stay open forever; the paused flag is
    /// cleared so no entitlement can be trapped in the terminal stage.
    ///
    /// # Errors
    /// - `CrowdsaleNotInitialized`: Crowdsale half not initialized
    /// - `Unauthorized`: Caller is not custodian or owner
    /// - `InvalidStage`: Not in Active
    pub fn terminate(env: Env, from: Address) -> Result<(), Error> {
        Self::check_crowdsale_initialized(&env)?;
        Self::require_custodian_or_owner(&env, &from)?;

        if Self::read_stage(&env) != Stage::Active {
            return Err(Error::InvalidStage);
        }

        env.storage().instance().set(&DataKey::Paused, &false);
        Self::enter_stage(&env, Stage::Terminated);

        Ok(())
    }

    /// Pause transfers and claims (emergency)
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `Unauthorized`: Caller is not owner
    /// - `InvalidStage`: Not in Active
    /// - `ContractPaused`: Already paused
    pub fn pause(env: Env, from: Address) -> Result<(), Error> {
        Self::check_token_initialized(&env)?;
        Self::require_owner(&env, &from)?;

        if Self::read_stage(&env) != Stage::Active {
            return Err(Error::InvalidStage);
        }
        if Self::read_paused(&env) {
            return Err(Error::ContractPaused);
        }

        env.storage().instance().set(&DataKey::Paused, &true);
        env.events().publish(
            (Symbol::new(&env, "paused"), from),
            PausedEvent { paused: true },
        );
        Ok(())
    }

    /// Unpause transfers and claims
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `Unauthorized`: Caller is not owner
    /// - `InvalidStage`: Not in Active
    /// - `ContractNotPaused`: Not currently paused
    pub fn unpause(env: Env, from: Address) -> Result<(), Error> {
        Self::check_token_initialized(&env)?;
        Self::require_owner(&env, &from)?;

        if Self::read_stage(&env) != Stage::Active {
            return Err(Error::InvalidStage);
        }
        if !Self::read_paused(&env) {
            return Err(Error::ContractNotPaused);
        }

        env.storage().instance().set(&DataKey::Paused, &false);
        env.events().publish(
            (Symbol::new(&env, "paused"), from),
            PausedEvent { paused: false },
        );
        Ok(())
    }

    // ============================================
    // DIVIDEND LEDGER
    // ============================================

    /// Distribute revenue to holders. Pulls the amount in payment tokens,
    /// forwards the fee plus undistributable dust to the fee sink, and
    /// advances the cumulative per-token payout counter.
    ///
    /// # Errors
    /// - `CrowdsaleNotInitialized`: Crowdsale half not initialized
    /// - `Unauthorized`: Caller is not broker or custodian
    /// - `InvalidStage`: Not in Active or Terminated
    /// - `InvalidAmount`: Amount must be positive
    pub fn payout(env: Env, from: Address, amount: i128) -> Result<(), Error> {
        Self::check_crowdsale_initialized(&env)?;
        Self::require_broker_or_custodian(&env, &from)?;

        let stage = Self::read_stage(&env);
        if stage != Stage::Active && stage != Stage::Terminated {
            return Err(Error::InvalidStage);
        }
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        let total_supply: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TotalSupply)
            .ok_or(Error::NotInitialized)?;
        let split = settlement::split_payout(&env, amount, total_supply)?;

        // Pull the payout, then forward the platform's cut
        let payment_token = Self::payment_token_address(&env)?;
        let payment_client = token::Client::new(&env, &payment_token);
        payment_client.transfer(&from, &env.current_contract_address(), &amount);
        if split.fee > 0 {
            let fee_sink: Address = env
                .storage()
                .instance()
                .get(&DataKey::FeeSink)
                .ok_or(Error::CrowdsaleNotInitialized)?;
            payment_client.transfer(&env.current_contract_address(), &fee_sink, &split.fee);
        }

        let total: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TotalPerTokenPayout)
            .unwrap_or(0);
        env.storage().instance().set(
            &DataKey::TotalPerTokenPayout,
            &total
                .checked_add(split.per_token_increase)
                .ok_or(Error::InvalidAmount)?,
        );

        env.events().publish(
            (Symbol::new(&env, "payout"), from.clone()),
            PayoutEvent {
                from,
                amount,
                fee: split.fee,
                per_token_increase: split.per_token_increase,
            },
        );

        Ok(())
    }

    /// Withdraw everything claimable by the caller: settled dividends plus
    /// any carried entitlement (the broker's activation remainder travels
    /// this path too). Returns the amount paid.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `InvalidStage`: Not in Active or Terminated
    /// - `ContractPaused`: Contract is paused
    /// - `NothingToClaim`: Nothing accrued
    pub fn claim(env: Env, from: Address) -> Result<i128, Error> {
        Self::check_token_initialized(&env)?;
        from.require_auth();

        let stage = Self::read_stage(&env);
        if stage != Stage::Active && stage != Stage::Terminated {
            return Err(Error::InvalidStage);
        }
        Self::check_not_paused(&env)?;

        Self::settle(&env, &from)?;
        let amount: i128 = env
            .storage()
            .instance()
            .get(&DataKey::UnclaimedOf(from.clone()))
            .unwrap_or(0);
        if amount <= 0 {
            return Err(Error::NothingToClaim);
        }

        env.storage()
            .instance()
            .set(&DataKey::UnclaimedOf(from.clone()), &0i128);

        let payment_token = Self::payment_token_address(&env)?;
        token::Client::new(&env, &payment_token).transfer(
            &env.current_contract_address(),
            &from,
            &amount,
        );

        env.events().publish(
            (Symbol::new(&env, "claim"), from.clone()),
            ClaimEvent {
                holder: from,
                amount,
            },
        );

        Ok(amount)
    }

    // ============================================
    // TOKEN SURFACE
    // ============================================

    /// Move tokens between holders. Both sides are settled against the
    /// payout counter before balances change, so past dividends stay with
    /// the seller and future ones follow the tokens.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `ContractPaused`: Contract is paused
    /// - `InvalidAmount`: Amount must be positive
    /// - `InsufficientBalance`: Sender doesn't have enough tokens
    pub fn transfer(env: Env, from: Address, to: Address, amount: i128) -> Result<(), Error> {
        Self::check_token_initialized(&env)?;
        from.require_auth();
        Self::check_not_paused(&env)?;

        Self::move_tokens(&env, &from, &to, amount)
    }

    /// Allow a spender to move the owner's tokens. A zero amount clears
    /// the allowance.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `InvalidAmount`: Amount must not be negative
    pub fn approve(env: Env, from: Address, spender: Address, amount: i128) -> Result<(), Error> {
        Self::check_token_initialized(&env)?;
        from.require_auth();

        if amount < 0 {
            return Err(Error::InvalidAmount);
        }
        env.storage()
            .instance()
            .set(&DataKey::Allowance(from.clone(), spender.clone()), &amount);

        env.events().publish(
            (Symbol::new(&env, "approval"), from.clone(), spender.clone()),
            ApprovalEvent {
                owner: from,
                spender,
                amount,
            },
        );

        Ok(())
    }

    /// Spend an allowance. Settlement semantics match `transfer`.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `ContractPaused`: Contract is paused
    /// - `InvalidAmount`: Amount must be positive
    /// - `InsufficientAllowance`: Spender allowance too low
    /// - `InsufficientBalance`: Owner doesn't have enough tokens
    pub fn transfer_from(
        env: Env,
        spender: Address,
        from: Address,
        to: Address,
        amount: i128,
    ) -> Result<(), Error> {
        Self::check_token_initialized(&env)?;
        spender.require_auth();
        Self::check_not_paused(&env)?;

        let allowance: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Allowance(from.clone(), spender.clone()))
            .unwrap_or(0);
        if amount > allowance {
            return Err(Error::InsufficientAllowance);
        }

        Self::move_tokens(&env, &from, &to, amount)?;

        env.storage().instance().set(
            &DataKey::Allowance(from.clone(), spender.clone()),
            &(allowance - amount),
        );

        Ok(())
    }

    /// Replace the stored proof hash after re-certification.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `Unauthorized`: Caller is not custodian
    /// - `InvalidStage`: Not in Active or Terminated
    /// - `InvalidProofOfCustody`: Not a 46-character Qm-prefixed ipfs hash
    pub fn update_proof_of_custody(env: Env, from: Address, proof: String) -> Result<(), Error> {
        Self::check_token_initialized(&env)?;
        Self::require_custodian(&env, &from)?;

        let stage = Self::read_stage(&env);
        if stage != Stage::Active && stage != Stage::Terminated {
            return Err(Error::InvalidStage);
        }

        Self::validate_proof(&proof)?;
        env.storage().instance().set(&DataKey::ProofOfCustody, &proof);

        env.events().publish(
            (Symbol::new(&env, "proof_updated"), from.clone()),
            ProofOfCustodyEvent {
                custodian: from,
                proof,
            },
        );

        Ok(())
    }

    // ============================================
    // VIEW FUNCTIONS
    // ============================================

    pub fn name(env: Env) -> Result<String, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Name)
            .ok_or(Error::NotInitialized)
    }

    pub fn symbol(env: Env) -> Result<String, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Symbol)
            .ok_or(Error::NotInitialized)
    }

    pub fn decimals(_env: Env) -> u32 {
        DECIMALS
    }

    pub fn fiat_currency(env: Env) -> Result<String, Error> {
        env.storage()
            .instance()
            .get(&DataKey::FiatCurrency)
            .ok_or(Error::CrowdsaleNotInitialized)
    }

    pub fn total_supply(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::TotalSupply)
            .unwrap_or(0)
    }

    pub fn initial_supply(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::InitialSupply)
            .unwrap_or(0)
    }

    pub fn balance_of(env: Env, holder: Address) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::Balance(holder))
            .unwrap_or(0)
    }

    pub fn allowance(env: Env, owner: Address, spender: Address) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::Allowance(owner, spender))
            .unwrap_or(0)
    }

    pub fn investment_of(env: Env, investor: Address) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::InvestmentOf(investor))
            .unwrap_or(0)
    }

    pub fn stage(env: Env) -> Stage {
        Self::read_stage(&env)
    }

    pub fn is_paused(env: Env) -> bool {
        Self::read_paused(&env)
    }

    pub fn funded_amount_cents(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::FundedAmountCents)
            .unwrap_or(0)
    }

    pub fn funding_goal_cents(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::FundingGoalCents)
            .unwrap_or(0)
    }

    pub fn start_time(env: Env) -> Result<u64, Error> {
        env.storage()
            .instance()
            .get(&DataKey::StartTime)
            .ok_or(Error::CrowdsaleNotInitialized)
    }

    pub fn funding_deadline(env: Env) -> Result<u64, Error> {
        Self::funding_deadline_value(&env)
    }

    pub fn activation_deadline(env: Env) -> Result<u64, Error> {
        Self::activation_deadline_value(&env)
    }

    pub fn owner(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Owner)
            .ok_or(Error::NotInitialized)
    }

    pub fn broker(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Broker)
            .ok_or(Error::CrowdsaleNotInitialized)
    }

    pub fn custodian(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Custodian)
            .ok_or(Error::NotInitialized)
    }

    pub fn proof_of_custody(env: Env) -> Option<String> {
        env.storage().instance().get(&DataKey::ProofOfCustody)
    }

    pub fn total_per_token_payout(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::TotalPerTokenPayout)
            .unwrap_or(0)
    }

    /// Everything a holder could claim right now, without settling.
    pub fn current_payout(env: Env, holder: Address) -> Result<i128, Error> {
        let total: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TotalPerTokenPayout)
            .unwrap_or(0);
        let last: i128 = env
            .storage()
            .instance()
            .get(&DataKey::LastSettledOf(holder.clone()))
            .unwrap_or(0);
        let balance: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Balance(holder.clone()))
            .unwrap_or(0);
        let unclaimed: i128 = env
            .storage()
            .instance()
            .get(&DataKey::UnclaimedOf(holder))
            .unwrap_or(0);
        settlement::current_payout(&env, balance, unclaimed, total, last)
    }

    pub fn fee_rate(_env: Env) -> i128 {
        FEE_RATE_PER_MILLE
    }

    pub fn calculate_fee(_env: Env, amount: i128) -> Result<i128, Error> {
        settlement::calculate_fee(amount)
    }

    /// Live oracle rate for the configured fiat currency.
    pub fn query_rate(env: Env) -> Result<i128, Error> {
        Self::fetch_fiat_rate(&env)
    }

    pub fn amount_to_cents(env: Env, amount: i128) -> Result<i128, Error> {
        let rate = Self::fetch_fiat_rate(&env)?;
        conversion::amount_to_cents(&env, amount, rate)
    }

    pub fn cents_to_amount(env: Env, cents: i128) -> Result<i128, Error> {
        let rate = Self::fetch_fiat_rate(&env)?;
        conversion::cents_to_amount(&env, cents, rate)
    }

    pub fn amount_to_tokens(env: Env, amount: i128) -> Result<i128, Error> {
        let rate = Self::fetch_fiat_rate(&env)?;
        let goal_cents: i128 = env
            .storage()
            .instance()
            .get(&DataKey::FundingGoalCents)
            .ok_or(Error::CrowdsaleNotInitialized)?;
        let total_supply: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TotalSupply)
            .ok_or(Error::NotInitialized)?;
        conversion::amount_to_tokens(&env, amount, rate, goal_cents, total_supply)
    }

    pub fn tokens_to_amount(env: Env, tokens: i128) -> Result<i128, Error> {
        let rate = Self::fetch_fiat_rate(&env)?;
        let goal_cents: i128 = env
            .storage()
            .instance()
            .get(&DataKey::FundingGoalCents)
            .ok_or(Error::CrowdsaleNotInitialized)?;
        let total_supply: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TotalSupply)
            .ok_or(Error::NotInitialized)?;
        conversion::tokens_to_amount(&env, tokens, rate, goal_cents, total_supply)
    }

    // ============================================
    // INTERNAL HELPERS
    // ============================================

    fn check_token_initialized(env: &Env) -> Result<(), Error> {
        if !env.storage().instance().has(&DataKey::TokenInitialized) {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    fn check_crowdsale_initialized(env: &Env) -> Result<(), Error> {
        Self::check_token_initialized(env)?;
        if !env.storage().instance().has(&DataKey::CrowdsaleInitialized) {
            return Err(Error::CrowdsaleNotInitialized);
        }
        Ok(())
    }

    fn check_not_paused(env: &Env) -> Result<(), Error> {
        if Self::read_paused(env) {
            return Err(Error::ContractPaused);
        }
        Ok(())
    }

    fn read_stage(env: &Env) -> Stage {
        env.storage()
            .instance()
            .get(&DataKey::Stage)
            .unwrap_or(Stage::PreFunding)
    }

    fn read_paused(env: &Env) -> bool {
        env.storage()
            .instance()
            .get(&DataKey::Paused)
            .unwrap_or(true)
    }

    fn require_owner(env: &Env, from: &Address) -> Result<(), Error> {
        from.require_auth();

        let owner: Address = env
            .storage()
            .instance()
            .get(&DataKey::Owner)
            .ok_or(Error::NotInitialized)?;
        if *from != owner {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    fn require_custodian(env: &Env, from: &Address) -> Result<(), Error> {
        from.require_auth();

        let custodian: Address = env
            .storage()
            .instance()
            .get(&DataKey::Custodian)
            .ok_or(Error::NotInitialized)?;
        if *from != custodian {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    fn require_custodian_or_owner(env: &Env, from: &Address) -> Result<(), Error> {
        from.require_auth();

        let custodian: Address = env
            .storage()
            .instance()
            .get(&DataKey::Custodian)
            .ok_or(Error::NotInitialized)?;
        let owner: Address = env
            .storage()
            .instance()
            .get(&DataKey::Owner)
            .ok_or(Error::NotInitialized)?;
        if *from != custodian && *from != owner {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    fn require_broker_or_custodian(env: &Env, from: &Address) -> Result<(), Error> {
        from.require_auth();

        let broker: Address = env
            .storage()
            .instance()
            .get(&DataKey::Broker)
            .ok_or(Error::CrowdsaleNotInitialized)?;
        let custodian: Address = env
            .storage()
            .instance()
            .get(&DataKey::Custodian)
            .ok_or(Error::NotInitialized)?;
        if *from != broker && *from != custodian {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    fn payment_token_address(env: &Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::PaymentToken)
            .ok_or(Error::NotInitialized)
    }

    fn funding_deadline_value(env: &Env) -> Result<u64, Error> {
        let start_time: u64 = env
            .storage()
            .instance()
            .get(&DataKey::StartTime)
            .ok_or(Error::CrowdsaleNotInitialized)?;
        let funding_timeout: u64 = env
            .storage()
            .instance()
            .get(&DataKey::FundingTimeout)
            .ok_or(Error::CrowdsaleNotInitialized)?;
        Ok(start_time.saturating_add(funding_timeout))
    }

    fn activation_deadline_value(env: &Env) -> Result<u64, Error> {
        let activation_timeout: u64 = env
            .storage()
            .instance()
            .get(&DataKey::ActivationTimeout)
            .ok_or(Error::CrowdsaleNotInitialized)?;
        Ok(Self::funding_deadline_value(env)?.saturating_add(activation_timeout))
    }

    /// Record a stage transition and announce it.
    fn enter_stage(env: &Env, to: Stage) {
        let from = Self::read_stage(env);
        env.storage().instance().set(&DataKey::Stage, &to);
        env.events().publish(
            (Symbol::new(env, "stage_changed"),),
            StageChangedEvent { from, to },
        );
    }

    /// The Failed transition burns the contract's own unsold inventory so
    /// only sold tokens remain against the refund pool.
    fn enter_failed(env: &Env) -> Result<(), Error> {
        let pool: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Balance(env.current_contract_address()))
            .unwrap_or(0);
        if pool > 0 {
            let total_supply: i128 = env
                .storage()
                .instance()
                .get(&DataKey::TotalSupply)
                .ok_or(Error::NotInitialized)?;
            env.storage()
                .instance()
                .set(&DataKey::TotalSupply, &(total_supply - pool));
            env.storage()
                .instance()
                .remove(&DataKey::Balance(env.current_contract_address()));
        }
        Self::enter_stage(env, Stage::Failed);
        Ok(())
    }

    /// Apply any deadline-driven transition before acting on the stage.
    fn poll_stage(env: &Env) -> Result<Stage, Error> {
        let stage = Self::read_stage(env);
        let now = env.ledger().timestamp();

        if stage == Stage::Funding && now >= Self::funding_deadline_value(env)? {
            Self::enter_failed(env)?;
            return Ok(Stage::Failed);
        }
        if stage == Stage::Pending && now >= Self::activation_deadline_value(env)? {
            Self::enter_failed(env)?;
            return Ok(Stage::Failed);
        }

        Ok(stage)
    }

    /// Current oracle rate for the configured currency; any failure on the
    /// oracle side reads as "no usable rate".
    fn fetch_fiat_rate(env: &Env) -> Result<i128, Error> {
        let oracle: Address = env
            .storage()
            .instance()
            .get(&DataKey::Oracle)
            .ok_or(Error::CrowdsaleNotInitialized)?;
        let currency: String = env
            .storage()
            .instance()
            .get(&DataKey::FiatCurrency)
            .ok_or(Error::CrowdsaleNotInitialized)?;

        match env.try_invoke_contract::<i128, soroban_sdk::Error>(
            &oracle,
            &Symbol::new(env, "get_rate"),
            vec![env, currency.into_val(env)],
        ) {
            Ok(Ok(rate)) if rate > 0 => Ok(rate),
            _ => Err(Error::RateUnset),
        }
    }

    /// Membership check against the whitelist collaborator; an unreachable
    /// or failing whitelist counts as not whitelisted.
    fn check_whitelisted(env: &Env, who: &Address) -> Result<(), Error> {
        let whitelist: Address = env
            .storage()
            .instance()
            .get(&DataKey::Whitelist)
            .ok_or(Error::CrowdsaleNotInitialized)?;

        match env.try_invoke_contract::<bool, soroban_sdk::Error>(
            &whitelist,
            &Symbol::new(env, "is_whitelisted"),
            vec![env, who.to_val()],
        ) {
            Ok(Ok(true)) => Ok(()),
            _ => Err(Error::NotWhitelisted),
        }
    }

    /// ipfs CIDv0 shape: exactly 46 bytes, "Qm" prefix.
    fn validate_proof(proof: &String) -> Result<(), Error> {
        if proof.len() != PROOF_OF_CUSTODY_LEN {
            return Err(Error::InvalidProofOfCustody);
        }
        let mut buf = [0u8; PROOF_OF_CUSTODY_LEN as usize];
        proof.copy_into_slice(&mut buf);
        if buf[0] != b'Q' || buf[1] != b'm' {
            return Err(Error::InvalidProofOfCustody);
        }
        Ok(())
    }

    /// Fold the payout accrued since the holder's last settlement into
    /// their unclaimed balance and move the snapshot forward.
    fn settle(env: &Env, holder: &Address) -> Result<(), Error> {
        let total: i128 = env
            .storage()
            .instance()
            .get(&DataKey::TotalPerTokenPayout)
            .unwrap_or(0);
        let last: i128 = env
            .storage()
            .instance()
            .get(&DataKey::LastSettledOf(holder.clone()))
            .unwrap_or(0);
        if last == total {
            return Ok(());
        }

        let balance: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Balance(holder.clone()))
            .unwrap_or(0);
        let delta = settlement::payout_delta(env, balance, total, last)?;
        if delta > 0 {
            let unclaimed: i128 = env
                .storage()
                .instance()
                .get(&DataKey::UnclaimedOf(holder.clone()))
                .unwrap_or(0);
            env.storage().instance().set(
                &DataKey::UnclaimedOf(holder.clone()),
                &unclaimed.checked_add(delta).ok_or(Error::InvalidAmount)?,
            );
        }
        env.storage()
            .instance()
            .set(&DataKey::LastSettledOf(holder.clone()), &total);

        Ok(())
    }

    fn move_tokens(env: &Env, from: &Address, to: &Address, amount: i128) -> Result<(), Error> {
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        let from_balance: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Balance(from.clone()))
            .unwrap_or(0);
        if from_balance < amount {
            return Err(Error::InsufficientBalance);
        }

        // Settle both sides before the balances move
        Self::settle(env, from)?;
        Self::settle(env, to)?;

        env.storage()
            .instance()
            .set(&DataKey::Balance(from.clone()), &(from_balance - amount));
        let to_balance: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Balance(to.clone()))
            .unwrap_or(0);
        env.storage().instance().set(
            &DataKey::Balance(to.clone()),
            &to_balance.checked_add(amount).ok_or(Error::InvalidAmount)?,
        );

        env.events().publish(
            (Symbol::new(env, "transfer"), from.clone(), to.clone()),
            TransferEvent {
                from: from.clone(),
                to: to.clone(),
                amount,
            },
        );

        Ok(())
    }
}
