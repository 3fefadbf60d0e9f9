//! Error types for the state transition engine

use chain_core::{Address, Gas, Wei};
use thiserror::Error;

/// Failure reported by the VM executor for one execution.
///
/// These never abort a transition: gas is still charged and the partial
/// result is handed back to the caller together with the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("out of gas")]
    OutOfGas,

    #[error("execution reverted")]
    Reverted,

    #[error("invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack limit reached")]
    StackOverflow,

    #[error("write protection")]
    WriteProtection,

    #[error("max call depth exceeded")]
    Depth,

    #[error("insufficient balance for transfer")]
    InsufficientBalance,

    #[error("contract address collision")]
    ContractAddressCollision,

    #[error("contract creation code storage out of gas")]
    CodeStoreOutOfGas,

    #[error("{0}")]
    Other(String),
}

impl VmError {
    /// Whether the contract itself asked for the revert
    pub fn is_revert(&self) -> bool {
        matches!(self, VmError::Reverted)
    }
}

/// Gas meter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GasError {
    /// Consumption would exceed the meter limit
    #[error("out of gas in location: {descriptor}; gas wanted: {wanted}, limit: {limit}")]
    OutOfGas {
        descriptor: String,
        wanted: Gas,
        limit: Gas,
    },

    /// u64 arithmetic overflow
    #[error("gas overflow in location: {0}")]
    Overflow(String),
}

/// Ledger view errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Insufficient balance
    #[error("Insufficient balance for {address}: required {required}, available {available}")]
    InsufficientBalance {
        address: Address,
        required: Wei,
        available: Wei,
    },

    /// Balance overflow
    #[error("Balance overflow for {0}")]
    BalanceOverflow(Address),

    /// Snapshot id that was never taken or already reverted
    #[error("Invalid snapshot id: {0}")]
    InvalidSnapshot(usize),

    /// Invalid or missing module parameters
    #[error("Invalid params: {0}")]
    Params(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors returned by a state transition.
///
/// Every variant except [`TransitionError::Vm`] is fatal: no partial
/// execution result is valid once one of them is returned.
#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid intrinsic gas for transaction: {0}")]
    InvalidIntrinsicGas(#[source] GasError),

    #[error("min gas price cannot be nil for denomination {0}")]
    MissingGasPrice(String),

    #[error("contract creation is disabled")]
    CreateDisabled,

    #[error("contract calls are disabled")]
    CallDisabled,

    #[error("failed to get logs: {0}")]
    LogRetrievalFailed(#[source] LedgerError),

    #[error("failed to finalize state: {0}")]
    FinalizeFailed(#[source] LedgerError),

    #[error("gas accounting error: {0}")]
    GasAccounting(String),

    #[error("ambient gas meter: {0}")]
    AmbientGas(#[from] GasError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("nonce overflow for {0}")]
    NonceOverflow(Address),

    #[error("static call requires a recipient")]
    StaticCallRequiresRecipient,

    #[error("evm error: {0}")]
    Vm(#[from] VmError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(String),
}

impl TransitionError {
    /// Whether the error aborts the transition (as opposed to a VM failure)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransitionError::Vm(_))
    }
}

impl From<toml::de::Error> for TransitionError {
    fn from(err: toml::de::Error) -> Self {
        TransitionError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TransitionError {
    fn from(err: serde_json::Error) -> Self {
        TransitionError::Config(err.to_string())
    }
}

impl From<prometheus::Error> for TransitionError {
    fn from(err: prometheus::Error) -> Self {
        TransitionError::Metrics(err.to_string())
    }
}

/// Result type for state transitions
pub type TransitionResult<T> = Result<T, TransitionError>;
