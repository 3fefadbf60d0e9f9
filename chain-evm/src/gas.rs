//! Gas metering and reconciliation
//!
//! Two meters are involved in every transition. The ambient [`GasMeter`]
//! belongs to the caller and tracks ledger-native costs (ante handler
//! bookkeeping, key-value access). The VM meters opcodes on its own and
//! only reports how much of its budget was left, as a [`VmGasReport`].
//! [`reconcile`] is the single place where the two meet.

use crate::{GasError, TransitionError, TransitionResult};
use chain_core::Gas;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Descriptor used when a failed execution is charged to the ambient meter
pub const EVM_EXECUTION_DESCRIPTOR: &str = "evm execution consumption";

/// Descriptor used when simulation tops the ambient meter up to intrinsic gas
pub const INTRINSIC_MATCH_DESCRIPTOR: &str = "Intrinsic gas match";

/// Gas costs charged outside opcode execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
    /// Base cost of a message call
    pub tx_gas: Gas,
    /// Base cost of a contract creation (homestead onwards)
    pub tx_gas_contract_creation: Gas,
    /// Cost per zero byte of payload
    pub tx_data_zero_gas: Gas,
    /// Cost per non-zero byte of payload before EIP-2028
    pub tx_data_non_zero_gas_frontier: Gas,
    /// Cost per non-zero byte of payload with EIP-2028
    pub tx_data_non_zero_gas_eip2028: Gas,
    /// Key-value existence check
    pub kv_has: Gas,
    /// Key-value read, flat part
    pub kv_read_flat: Gas,
    /// Key-value read, per byte
    pub kv_read_per_byte: Gas,
    /// Key-value write, flat part
    pub kv_write_flat: Gas,
    /// Key-value write, per byte
    pub kv_write_per_byte: Gas,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            tx_gas: 21_000,
            tx_gas_contract_creation: 53_000,
            tx_data_zero_gas: 4,
            tx_data_non_zero_gas_frontier: 68,
            tx_data_non_zero_gas_eip2028: 16,
            kv_has: 1_000,
            kv_read_flat: 1_000,
            kv_read_per_byte: 3,
            kv_write_flat: 2_000,
            kv_write_per_byte: 30,
        }
    }
}

impl GasSchedule {
    /// Load gas schedule from TOML configuration
    pub fn from_toml(toml_str: &str) -> TransitionResult<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Calculate key-value operation cost
    pub fn storage_cost(&self, operation: StorageOp, bytes: usize) -> Result<Gas, GasError> {
        let (flat, per_byte) = match operation {
            StorageOp::Has => return Ok(self.kv_has),
            StorageOp::Read => (self.kv_read_flat, self.kv_read_per_byte),
            StorageOp::Write => (self.kv_write_flat, self.kv_write_per_byte),
        };
        (bytes as u64)
            .checked_mul(per_byte)
            .and_then(|variable| variable.checked_add(flat))
            .ok_or_else(|| GasError::Overflow(operation.descriptor().to_string()))
    }
}

/// Protocol rules that change the intrinsic gas formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicRules {
    /// Contract creations pay the creation base cost
    pub homestead: bool,
    /// Non-zero payload bytes are priced per EIP-2028
    pub istanbul: bool,
}

impl Default for IntrinsicRules {
    fn default() -> Self {
        Self {
            homestead: true,
            istanbul: false,
        }
    }
}

/// Key-value operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Has,
    Read,
    Write,
}

impl StorageOp {
    fn descriptor(self) -> &'static str {
        match self {
            StorageOp::Has => "HasFlat",
            StorageOp::Read => "ReadFlat",
            StorageOp::Write => "WriteFlat",
        }
    }
}

/// Gas charged before any VM execution, from the payload alone
pub fn intrinsic_gas(
    payload: &[u8],
    is_create: bool,
    schedule: &GasSchedule,
    rules: IntrinsicRules,
) -> Result<Gas, GasError> {
    let mut gas = if is_create && rules.homestead {
        schedule.tx_gas_contract_creation
    } else {
        schedule.tx_gas
    };

    if payload.is_empty() {
        return Ok(gas);
    }

    let non_zero = payload.iter().filter(|b| **b != 0).count() as u64;
    let zero = payload.len() as u64 - non_zero;
    let non_zero_gas = if rules.istanbul {
        schedule.tx_data_non_zero_gas_eip2028
    } else {
        schedule.tx_data_non_zero_gas_frontier
    };

    gas = non_zero
        .checked_mul(non_zero_gas)
        .and_then(|cost| gas.checked_add(cost))
        .ok_or_else(|| GasError::Overflow("intrinsic non-zero data".to_string()))?;
    zero.checked_mul(schedule.tx_data_zero_gas)
        .and_then(|cost| gas.checked_add(cost))
        .ok_or_else(|| GasError::Overflow("intrinsic zero data".to_string()))
}

/// Ledger-native gas meter, either bounded or infinite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasMeter {
    /// Gas limit; `None` never runs out
    limit: Option<Gas>,
    /// Gas consumed so far
    consumed: Gas,
    /// Detailed gas consumption by descriptor
    breakdown: BTreeMap<String, Gas>,
}

impl GasMeter {
    /// Create a bounded gas meter
    pub fn new(limit: Gas) -> Self {
        Self {
            limit: Some(limit),
            consumed: 0,
            breakdown: BTreeMap::new(),
        }
    }

    /// Create a meter without a limit
    pub fn infinite() -> Self {
        Self {
            limit: None,
            consumed: 0,
            breakdown: BTreeMap::new(),
        }
    }

    /// Get remaining gas, `None` for an infinite meter
    pub fn remaining(&self) -> Option<Gas> {
        self.limit.map(|limit| limit.saturating_sub(self.consumed))
    }

    /// Get consumed gas
    pub fn consumed(&self) -> Gas {
        self.consumed
    }

    /// Get gas limit
    pub fn limit(&self) -> Option<Gas> {
        self.limit
    }

    /// Whether the meter never runs out
    pub fn is_infinite(&self) -> bool {
        self.limit.is_none()
    }

    /// Consume gas under `descriptor`
    pub fn consume(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        let consumed = self
            .consumed
            .checked_add(amount)
            .ok_or_else(|| GasError::Overflow(descriptor.to_string()))?;

        if let Some(limit) = self.limit {
            if consumed > limit {
                return Err(GasError::OutOfGas {
                    descriptor: descriptor.to_string(),
                    wanted: consumed,
                    limit,
                });
            }
        }

        self.consumed = consumed;
        *self.breakdown.entry(descriptor.to_string()).or_insert(0) += amount;
        Ok(())
    }

    /// Consume gas for a key-value operation on `bytes` bytes
    pub fn consume_storage(
        &mut self,
        operation: StorageOp,
        bytes: usize,
        schedule: &GasSchedule,
    ) -> Result<(), GasError> {
        let cost = schedule.storage_cost(operation, bytes)?;
        self.consume(cost, operation.descriptor())
    }

    /// Get gas consumption breakdown
    pub fn breakdown(&self) -> &BTreeMap<String, Gas> {
        &self.breakdown
    }
}

/// What the VM's own meter reports for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmGasReport {
    /// Budget handed to the VM
    pub gas_limit: Gas,
    /// Budget the VM did not use
    pub leftover: Gas,
    /// Whether the VM reported an error (revert included)
    pub failed: bool,
}

/// Gas figures of one completed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GasInfo {
    pub gas_limit: Gas,
    pub gas_consumed: Gas,
    pub gas_refunded: Gas,
}

impl GasInfo {
    /// Split a budget into consumed and refunded parts
    pub fn from_leftover(gas_limit: Gas, leftover: Gas) -> TransitionResult<Self> {
        let gas_consumed = gas_limit.checked_sub(leftover).ok_or_else(|| {
            TransitionError::GasAccounting(format!(
                "vm leftover gas {} exceeds its limit {}",
                leftover, gas_limit
            ))
        })?;
        Ok(Self {
            gas_limit,
            gas_consumed,
            gas_refunded: leftover,
        })
    }
}

/// Reconcile the VM's report with the ambient meter.
///
/// A failed execution is charged to the ambient meter in full; nothing is
/// refunded beyond the leftover the VM reports. A successful execution
/// leaves the ambient meter untouched.
pub fn reconcile(ambient: &mut GasMeter, report: &VmGasReport) -> TransitionResult<GasInfo> {
    let info = GasInfo::from_leftover(report.gas_limit, report.leftover)?;
    if report.failed {
        ambient.consume(info.gas_consumed, EVM_EXECUTION_DESCRIPTOR)?;
    }
    Ok(info)
}

/// Budget for a committing execution: what the ambient meter has not used
pub fn available_gas(request_limit: Gas, ambient_consumed: Gas) -> TransitionResult<Gas> {
    request_limit.checked_sub(ambient_consumed).ok_or_else(|| {
        TransitionError::GasAccounting(format!(
            "ambient gas consumed {} exceeds request gas limit {}",
            ambient_consumed, request_limit
        ))
    })
}

/// Budget for a simulated execution: the request limit minus intrinsic gas
pub fn simulated_available_gas(request_limit: Gas, intrinsic: Gas) -> TransitionResult<Gas> {
    request_limit.checked_sub(intrinsic).ok_or_else(|| {
        TransitionError::GasAccounting(format!(
            "intrinsic gas {} exceeds request gas limit {}",
            intrinsic, request_limit
        ))
    })
}

/// Raise the ambient meter to `intrinsic` if it has consumed less so far
pub fn match_intrinsic(ambient: &mut GasMeter, intrinsic: Gas) -> Result<(), GasError> {
    let consumed = ambient.consumed();
    if consumed < intrinsic {
        ambient.consume(intrinsic - consumed, INTRINSIC_MATCH_DESCRIPTOR)?;
    }
    Ok(())
}
