use soroban_sdk::{contracttype, Address};

// Constants
pub const SCALE: i128 = 1_000_000_000_000_000_000; // 18 decimals
pub const DECIMALS: u32 = 18;
pub const FEE_RATE_PER_MILLE: i128 = 5; // 0.5% skimmed off activation and payouts
pub const MIN_FUNDING_TIMEOUT: u64 = 86_400; // 1 day
pub const MIN_ACTIVATION_TIMEOUT: u64 = 604_800; // 7 days
pub const MIN_TEXT_LEN: u32 = 3;
pub const MAX_CURRENCY_LEN: u32 = 8;
pub const PROOF_OF_CUSTODY_LEN: u32 = 46; // ipfs CIDv0 length

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Deployed and configured, funding window not yet open
    PreFunding = 0,
    /// Funding window open, whitelisted investors can buy
    Funding = 1,
    /// Goal reached, waiting for the custodian to activate
    Pending = 2,
    /// Funding or activation fell through, refunds only
    Failed = 3,
    /// Asset tokenized, transfers and payouts live
    Active = 4,
    /// Asset wound down, claims only
    Terminated = 5,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    // Two-phase setup flags
    TokenInitialized,
    CrowdsaleInitialized,
    // Roles and collaborators
    Owner,
    Broker,
    Custodian,
    Whitelist,
    FeeSink,
    Oracle,
    PaymentToken,
    // Token metadata
    Name,
    Symbol,
    FiatCurrency,
    TotalSupply,
    InitialSupply,
    // Crowdsale parameters
    StartTime,
    FundingTimeout,
    ActivationTimeout,
    FundingGoalCents,
    FundedAmountCents,
    // Lifecycle
    Stage,
    Paused,
    ProofOfCustody,
    // Dividend ledger
    TotalPerTokenPayout,
    // Per-holder records
    Balance(Address),
    Allowance(Address, Address), // (owner, spender)
    InvestmentOf(Address),
    UnclaimedOf(Address),
    LastSettledOf(Address),
}
