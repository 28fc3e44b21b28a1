use soroban_sdk::contracterror;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    // ============================================
    // INITIALIZATION ERRORS (1-5)
    // ============================================
    /// Token half already initialized
    AlreadyInitialized = 1,
    /// Contract not initialized
    NotInitialized = 2,
    /// Crowdsale half already initialized
    CrowdsaleAlreadyInitialized = 3,
    /// Crowdsale half not initialized
    CrowdsaleNotInitialized = 4,

    // ============================================
    // AUTHORIZATION ERRORS (10-15)
    // ============================================
    /// Caller not authorized (not owner/broker/custodian)
    Unauthorized = 10,

    // ============================================
    // LIFECYCLE ERRORS (20-29)
    // ============================================
    /// Operation not allowed in the current stage
    InvalidStage = 20,
    /// Funding has not opened yet
    TooEarly = 21,
    /// Deadline has not elapsed yet
    TimeoutNotElapsed = 22,

    // ============================================
    // SALE ERRORS (30-39)
    // ============================================
    /// Buyer is not on the whitelist
    NotWhitelisted = 30,
    /// All tokens have been sold
    SoldOut = 31,

    // ============================================
    // AMOUNT/BALANCE ERRORS (40-49)
    // ============================================
    /// Amount must be positive
    InvalidAmount = 40,
    /// Holder doesn't have enough tokens
    InsufficientBalance = 41,
    /// Spender allowance too low
    InsufficientAllowance = 42,

    // ============================================
    // PAYOUT ERRORS (50-59)
    // ============================================
    /// Nothing accrued for this holder
    NothingToClaim = 50,

    // ============================================
    // ORACLE ERRORS (60-69)
    // ============================================
    /// No usable exchange rate for the fiat currency
    RateUnset = 60,

    // ============================================
    // PARAMETER VALIDATION ERRORS (70-79)
    // ============================================
    /// Name shorter than 3 characters
    InvalidName = 70,
    /// Symbol shorter than 3 characters
    InvalidSymbol = 71,
    /// Fiat currency code empty or longer than 8 bytes
    InvalidCurrency = 72,
    /// Funding must open in the future
    InvalidStartTime = 73,
    /// Timeout below the required minimum
    InvalidTimeout = 74,
    /// Total supply must be positive
    InvalidSupply = 75,
    /// Funding goal must be positive
    InvalidFundingGoal = 76,
    /// Proof of custody must be a 46-character ipfs hash
    InvalidProofOfCustody = 77,

    // ============================================
    // OPERATIONAL ERRORS (80-89)
    // ============================================
    /// Contract is paused
    ContractPaused = 80,
    /// Contract is not paused
    ContractNotPaused = 81,
}
