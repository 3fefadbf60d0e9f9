//! EVM state transition engine
//!
//! This crate applies a single call or contract creation against a
//! transactional ledger view through an external VM executor, reconciling
//! the VM's gas accounting with the caller's ledger-native gas meter.

pub mod account;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod gas;
pub mod memory;
pub mod metrics;
pub mod nonce;
pub mod state;
pub mod transition;

pub use account::{Account, AccountChanges, AccountState};
pub use config::{ChainConfig, ChainRules, Params, TransitionConfig};
pub use context::{
    hash_from_header, AmbientContext, BlockContext, ExecutionContext, GasPrices,
    HeightHashResolver, TxContext, VmConfig,
};
pub use error::{
    GasError, LedgerError, LedgerResult, TransitionError, TransitionResult, VmError,
};
pub use executor::{contract_address, CallOutcome, CreateOutcome, ExecutionScope, VmExecutor};
pub use gas::{
    intrinsic_gas, reconcile, GasInfo, GasMeter, GasSchedule, IntrinsicRules, StorageOp,
    VmGasReport,
};
pub use memory::MemoryLedger;
pub use metrics::{MetricTags, Metrics};
pub use nonce::NonceGuard;
pub use state::{LedgerView, SharedLedger};
pub use transition::{ExecutionResult, StateTransition, TransitionRequest};
