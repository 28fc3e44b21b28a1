use soroban_sdk::contracterror;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    // ============================================
    // INITIALIZATION ERRORS (1-9)
    // ============================================
    /// Contract already initialized
    AlreadyInitialized = 1,
    /// Contract not initialized
    NotInitialized = 2,

    // ============================================
    // AUTHORIZATION ERRORS (10-19)
    // ============================================
    /// Caller not authorized (not admin/provider)
    Unauthorized = 10,

    // ============================================
    // RATE / QUERY ERRORS (20-29)
    // ============================================
    /// No currency settings configured for this symbol
    UnconfiguredSymbol = 20,
    /// Callback does not match any pending query
    UnknownQueryId = 21,
    /// No usable rate stored for this symbol
    RateUnset = 22,
    /// Callback delivered a negative rate
    InvalidRate = 23,

    // ============================================
    // ENCODING ERRORS (30-39)
    // ============================================
    /// Symbol does not fit the 8-byte canonical form
    EncodingTooLong = 30,

    // ============================================
    // AMOUNT ERRORS (40-49)
    // ============================================
    /// Amount must be non-negative
    InvalidAmount = 40,

    // ============================================
    // OPERATIONAL ERRORS (60-69)
    // ============================================
    /// Contract has been retired and drained
    ContractRetired = 60,
}
