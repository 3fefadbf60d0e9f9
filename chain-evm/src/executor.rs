//! VM executor capability
//!
//! The interpreter itself lives outside this crate. The orchestrator drives
//! it through [`VmExecutor`], handing over an immutable [`ExecutionContext`]
//! and an [`ExecutionScope`] that owns the VM-scope gas meter.

use crate::context::ExecutionContext;
use crate::gas::{GasMeter, GasSchedule, StorageOp, VmGasReport};
use crate::state::LedgerView;
use crate::{GasError, VmError};
use chain_core::{Address, BlockNumber, Gas, Hash, Nonce, Wei};
use tracing::trace;

/// Address of a contract created by `sender` at `nonce`
pub fn contract_address(sender: &Address, nonce: Nonce) -> Address {
    let mut stream = rlp::RlpStream::new_list(2);
    stream.append(&sender.as_bytes().to_vec());
    stream.append(&nonce);
    Address::from_hash(&Hash::keccak(&stream.out()))
}

/// Result of a contract creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub output: Vec<u8>,
    pub address: Address,
    pub leftover_gas: Gas,
    pub error: Option<VmError>,
}

impl CreateOutcome {
    /// Gas report for an execution that was given `gas_limit`
    pub fn gas_report(&self, gas_limit: Gas) -> VmGasReport {
        VmGasReport {
            gas_limit,
            leftover: self.leftover_gas,
            failed: self.error.is_some(),
        }
    }
}

/// Result of a message call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub output: Vec<u8>,
    pub leftover_gas: Gas,
    pub error: Option<VmError>,
}

impl CallOutcome {
    pub fn success(output: Vec<u8>, leftover_gas: Gas) -> Self {
        Self {
            output,
            leftover_gas,
            error: None,
        }
    }

    pub fn failure(error: VmError, leftover_gas: Gas) -> Self {
        Self {
            output: Vec::new(),
            leftover_gas,
            error: Some(error),
        }
    }

    /// Gas report for an execution that was given `gas_limit`
    pub fn gas_report(&self, gas_limit: Gas) -> VmGasReport {
        VmGasReport {
            gas_limit,
            leftover: self.leftover_gas,
            failed: self.error.is_some(),
        }
    }
}

/// Ledger access for one VM execution.
///
/// Storage accesses made through the scope are charged to its own infinite
/// meter. The caller's ambient meter never sees them.
pub struct ExecutionScope<'a> {
    ledger: &'a mut dyn LedgerView,
    gas_meter: GasMeter,
    schedule: &'a GasSchedule,
}

impl<'a> ExecutionScope<'a> {
    pub fn new(ledger: &'a mut dyn LedgerView, schedule: &'a GasSchedule) -> Self {
        Self {
            ledger,
            gas_meter: GasMeter::infinite(),
            schedule,
        }
    }

    pub fn ledger(&self) -> &dyn LedgerView {
        &*self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut dyn LedgerView {
        &mut *self.ledger
    }

    /// VM-scope meter
    pub fn gas_meter(&self) -> &GasMeter {
        &self.gas_meter
    }

    /// Read a storage slot, charging the key-value read cost
    pub fn read_storage(&mut self, address: &Address, key: &Hash) -> Result<Hash, GasError> {
        let value = self.ledger.storage(address, key);
        self.gas_meter
            .consume_storage(StorageOp::Read, value.as_bytes().len(), self.schedule)?;
        trace!(%address, consumed = self.gas_meter.consumed(), "vm scope storage read");
        Ok(value)
    }

    /// Write a storage slot, charging the key-value write cost
    pub fn write_storage(&mut self, address: Address, key: Hash, value: Hash) -> Result<(), GasError> {
        self.gas_meter.consume_storage(
            StorageOp::Write,
            key.as_bytes().len() + value.as_bytes().len(),
            self.schedule,
        )?;
        self.ledger.set_storage(address, key, value);
        trace!(%address, consumed = self.gas_meter.consumed(), "vm scope storage write");
        Ok(())
    }

    /// Whether an account exists, charging the key-value lookup cost
    pub fn account_exists(&mut self, address: &Address) -> Result<bool, GasError> {
        self.gas_meter.consume_storage(StorageOp::Has, 0, self.schedule)?;
        Ok(self.ledger.exists(address))
    }

    /// Ancestor block hash as seen from `ctx`
    pub fn block_hash(&self, ctx: &ExecutionContext, height: BlockNumber) -> Hash {
        ctx.block_hash(self.ledger(), height)
    }
}

/// The interpreter driven by the orchestrator.
///
/// Implementations report every execution failure, reverts included, in the
/// outcome's `error` field together with the leftover gas.
pub trait VmExecutor {
    /// Deploy `payload` as init code on behalf of `sender`
    fn create(
        &self,
        ctx: &ExecutionContext,
        scope: &mut ExecutionScope<'_>,
        sender: Address,
        payload: &[u8],
        gas_limit: Gas,
        value: Wei,
    ) -> CreateOutcome;

    /// Call `recipient` with `payload`
    fn call(
        &self,
        ctx: &ExecutionContext,
        scope: &mut ExecutionScope<'_>,
        sender: Address,
        recipient: Address,
        payload: &[u8],
        gas_limit: Gas,
        value: Wei,
    ) -> CallOutcome;

    /// Call `recipient` without allowing state modification
    fn static_call(
        &self,
        ctx: &ExecutionContext,
        scope: &mut ExecutionScope<'_>,
        sender: Address,
        recipient: Address,
        payload: &[u8],
        gas_limit: Gas,
    ) -> CallOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;

    #[test]
    fn test_contract_address_derivation() {
        let sender = Address::from_hex("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap();
        assert_eq!(
            contract_address(&sender, 0),
            Address::from_hex("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d").unwrap()
        );
        assert_eq!(
            contract_address(&sender, 1),
            Address::from_hex("343c43a37d37dff08ae8c4a11544c718abb4fcf8").unwrap()
        );
    }

    #[test]
    fn test_scope_charges_its_own_meter() {
        let mut ledger = MemoryLedger::default();
        let schedule = GasSchedule::default();
        let contract = Address::new([9u8; 20]);
        let key = Hash::from_low_u64_be(1);

        let mut scope = ExecutionScope::new(&mut ledger, &schedule);
        scope.write_storage(contract, key, Hash::from_low_u64_be(5)).unwrap();
        assert_eq!(scope.read_storage(&contract, &key).unwrap(), Hash::from_low_u64_be(5));
        assert!(scope.account_exists(&contract).unwrap());

        let expected = (2000 + 30 * 64) + (1000 + 3 * 32) + 1000;
        assert_eq!(scope.gas_meter().consumed(), expected);
        assert!(scope.gas_meter().is_infinite());

        drop(scope);
        assert_eq!(ledger.storage(&contract, &key), Hash::from_low_u64_be(5));
    }

    #[test]
    fn test_outcome_reports() {
        let ok = CallOutcome::success(vec![1], 400);
        assert_eq!(
            ok.gas_report(1000),
            VmGasReport {
                gas_limit: 1000,
                leftover: 400,
                failed: false
            }
        );

        let reverted = CallOutcome::failure(VmError::Reverted, 100);
        assert!(reverted.gas_report(1000).failed);
        assert!(reverted.output.is_empty());
    }
}
