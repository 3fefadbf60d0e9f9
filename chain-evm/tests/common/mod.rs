//! Shared helpers for the state transition integration tests

#![allow(dead_code)]

use chain_core::{Address, BlockHeader, BlockNumber, Gas, Hash, Log, Nonce, Transaction, Wei};
use chain_evm::{
    contract_address, intrinsic_gas, Account, AccountChanges, AmbientContext, CallOutcome,
    ChainConfig, CreateOutcome, ExecutionContext, ExecutionResult, ExecutionScope, GasMeter,
    GasPrices, LedgerError, LedgerResult, LedgerView, MemoryLedger, Params, StateTransition,
    TransitionConfig, TransitionRequest, TransitionResult, VmError, VmExecutor,
};
use parking_lot::Mutex;

pub const CHAIN_ID: u64 = 9000;
pub const GAS_PRICE: Wei = 2;
pub const MIN_GAS_PRICE: Wei = 1;
pub const TX_GAS_LIMIT: Gas = 200_000;
pub const CURRENT_HEIGHT: BlockNumber = 10;
pub const HEADER_TIME_MS: u64 = 1_700_000_000_500;

pub const COUNTER_CODE: &[u8] = b"\x60counter";
pub const COUNTER_SLOT: Hash = Hash::new([0u8; 32]);

pub const SELECTOR_INCREMENT: u8 = 0x01;
pub const SELECTOR_DECREMENT: u8 = 0x02;
pub const SELECTOR_GET: u8 = 0x03;
pub const SELECTOR_BLOCKHASH: u8 = 0x04;

pub const CREATE_GAS: Gas = 32_000;
pub const CODE_DEPOSIT_GAS: Gas = 200;
pub const CALL_GAS: Gas = 700;
pub const SLOAD_GAS: Gas = 800;
pub const SSTORE_GAS: Gas = 5_000;
pub const LOG_GAS: Gas = 750;
pub const BLOCKHASH_GAS: Gas = 20;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn address(byte: u8) -> Address {
    Address::new([byte; 20])
}

pub fn changed_topic() -> Hash {
    Hash::keccak(b"Changed(uint256)")
}

pub fn created_topic() -> Hash {
    Hash::keccak(b"Created(address)")
}

pub fn word(value: u64) -> Vec<u8> {
    Hash::from_low_u64_be(value).as_bytes().to_vec()
}

pub fn read_word(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[24..32]);
    u64::from_be_bytes(buf)
}

pub fn blockhash_payload(height: BlockNumber) -> Vec<u8> {
    let mut payload = vec![SELECTOR_BLOCKHASH];
    payload.extend_from_slice(&height.to_be_bytes());
    payload
}

/// What the counter VM saw when it was dispatched
#[derive(Debug, Clone)]
pub struct Observation {
    pub ctx: ExecutionContext,
    pub sender_nonce: Nonce,
}

struct Budget {
    limit: Gas,
    used: Gas,
}

impl Budget {
    fn new(limit: Gas) -> Self {
        Self { limit, used: 0 }
    }

    fn charge(&mut self, amount: Gas) -> Result<(), VmError> {
        let used = self.used.checked_add(amount).ok_or(VmError::OutOfGas)?;
        if used > self.limit {
            return Err(VmError::OutOfGas);
        }
        self.used = used;
        Ok(())
    }

    fn leftover(&self) -> Gas {
        self.limit - self.used
    }
}

/// Deterministic stand-in for an EVM that only knows one contract: a
/// counter in slot zero. Reverts keep their leftover gas; every other
/// failure burns the whole budget.
#[derive(Default)]
pub struct CounterVm {
    observations: Mutex<Vec<Observation>>,
}

impl CounterVm {
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().clone()
    }

    pub fn last_observation(&self) -> Option<Observation> {
        self.observations.lock().last().cloned()
    }

    fn observe(&self, ctx: &ExecutionContext, scope: &ExecutionScope<'_>, sender: &Address) {
        self.observations.lock().push(Observation {
            ctx: ctx.clone(),
            sender_nonce: scope.ledger().nonce(sender),
        });
    }

    fn transfer(
        scope: &mut ExecutionScope<'_>,
        from: Address,
        to: Address,
        value: Wei,
    ) -> Result<(), VmError> {
        if value == 0 {
            return Ok(());
        }
        let ledger = scope.ledger_mut();
        ledger
            .sub_balance(from, value)
            .map_err(|_| VmError::InsufficientBalance)?;
        ledger
            .add_balance(to, value)
            .map_err(|e| VmError::Other(e.to_string()))
    }

    fn run(
        ctx: &ExecutionContext,
        scope: &mut ExecutionScope<'_>,
        contract: Address,
        payload: &[u8],
        gas_limit: Gas,
        read_only: bool,
    ) -> CallOutcome {
        let mut gas = Budget::new(gas_limit);
        if gas.charge(CALL_GAS).is_err() {
            return CallOutcome::failure(VmError::OutOfGas, 0);
        }

        match payload.first().copied() {
            None => CallOutcome::success(Vec::new(), gas.leftover()),
            Some(SELECTOR_GET) => {
                if gas.charge(SLOAD_GAS).is_err() {
                    return CallOutcome::failure(VmError::OutOfGas, 0);
                }
                match scope.read_storage(&contract, &COUNTER_SLOT) {
                    Ok(value) => CallOutcome::success(value.as_bytes().to_vec(), gas.leftover()),
                    Err(e) => CallOutcome::failure(VmError::Other(e.to_string()), 0),
                }
            }
            Some(selector @ (SELECTOR_INCREMENT | SELECTOR_DECREMENT)) => {
                if read_only {
                    return CallOutcome::failure(VmError::WriteProtection, 0);
                }
                if gas.charge(SLOAD_GAS).is_err() {
                    return CallOutcome::failure(VmError::OutOfGas, 0);
                }
                let current = match scope.read_storage(&contract, &COUNTER_SLOT) {
                    Ok(value) => read_word(value.as_bytes()),
                    Err(e) => return CallOutcome::failure(VmError::Other(e.to_string()), 0),
                };
                let next = if selector == SELECTOR_INCREMENT {
                    current + 1
                } else if current == 0 {
                    return CallOutcome::failure(VmError::Reverted, gas.leftover());
                } else {
                    current - 1
                };

                if gas.charge(SSTORE_GAS + LOG_GAS).is_err() {
                    return CallOutcome::failure(VmError::OutOfGas, 0);
                }
                if let Err(e) =
                    scope.write_storage(contract, COUNTER_SLOT, Hash::from_low_u64_be(next))
                {
                    return CallOutcome::failure(VmError::Other(e.to_string()), 0);
                }
                scope
                    .ledger_mut()
                    .add_log(Log::new(contract, vec![changed_topic()], word(next)));
                CallOutcome::success(word(next), gas.leftover())
            }
            Some(SELECTOR_BLOCKHASH) if payload.len() >= 9 => {
                if gas.charge(BLOCKHASH_GAS).is_err() {
                    return CallOutcome::failure(VmError::OutOfGas, 0);
                }
                let mut height = [0u8; 8];
                height.copy_from_slice(&payload[1..9]);
                let hash = scope.block_hash(ctx, u64::from_be_bytes(height));
                CallOutcome::success(hash.as_bytes().to_vec(), gas.leftover())
            }
            Some(op) => CallOutcome::failure(VmError::InvalidOpcode(op), 0),
        }
    }
}

impl VmExecutor for CounterVm {
    fn create(
        &self,
        ctx: &ExecutionContext,
        scope: &mut ExecutionScope<'_>,
        sender: Address,
        payload: &[u8],
        gas_limit: Gas,
        value: Wei,
    ) -> CreateOutcome {
        self.observe(ctx, scope, &sender);

        let nonce = scope.ledger().nonce(&sender);
        let address = contract_address(&sender, nonce);
        let failed = |error, leftover_gas| CreateOutcome {
            output: Vec::new(),
            address,
            leftover_gas,
            error: Some(error),
        };

        if scope.ledger().code(&address).is_some() {
            return failed(VmError::ContractAddressCollision, 0);
        }
        scope.ledger_mut().set_nonce(sender, nonce + 1);

        let snapshot = scope.ledger_mut().snapshot();
        let mut gas = Budget::new(gas_limit);
        let cost = CREATE_GAS + CODE_DEPOSIT_GAS * COUNTER_CODE.len() as Gas;
        if gas.charge(cost).is_err() {
            scope.ledger_mut().revert_to_snapshot(snapshot).expect("snapshot");
            return failed(VmError::OutOfGas, 0);
        }
        if let Err(e) = Self::transfer(scope, sender, address, value) {
            scope.ledger_mut().revert_to_snapshot(snapshot).expect("snapshot");
            return failed(e, gas.leftover());
        }

        let initial = payload.last().copied().unwrap_or(0) as u64;
        scope.ledger_mut().set_code(address, COUNTER_CODE.to_vec());
        if let Err(e) = scope.write_storage(address, COUNTER_SLOT, Hash::from_low_u64_be(initial)) {
            scope.ledger_mut().revert_to_snapshot(snapshot).expect("snapshot");
            return failed(VmError::Other(e.to_string()), 0);
        }
        let mut address_word = vec![0u8; 12];
        address_word.extend_from_slice(address.as_bytes());
        scope
            .ledger_mut()
            .add_log(Log::new(address, vec![created_topic()], address_word));

        CreateOutcome {
            output: COUNTER_CODE.to_vec(),
            address,
            leftover_gas: gas.leftover(),
            error: None,
        }
    }

    fn call(
        &self,
        ctx: &ExecutionContext,
        scope: &mut ExecutionScope<'_>,
        sender: Address,
        recipient: Address,
        payload: &[u8],
        gas_limit: Gas,
        value: Wei,
    ) -> CallOutcome {
        self.observe(ctx, scope, &sender);

        let snapshot = scope.ledger_mut().snapshot();
        if let Err(e) = Self::transfer(scope, sender, recipient, value) {
            scope.ledger_mut().revert_to_snapshot(snapshot).expect("snapshot");
            return CallOutcome::failure(e, gas_limit);
        }
        if scope.ledger().code(&recipient).is_none() {
            return CallOutcome::success(Vec::new(), gas_limit);
        }

        let outcome = Self::run(ctx, scope, recipient, payload, gas_limit, false);
        if outcome.error.is_some() {
            scope.ledger_mut().revert_to_snapshot(snapshot).expect("snapshot");
        }
        outcome
    }

    fn static_call(
        &self,
        ctx: &ExecutionContext,
        scope: &mut ExecutionScope<'_>,
        sender: Address,
        recipient: Address,
        payload: &[u8],
        gas_limit: Gas,
    ) -> CallOutcome {
        self.observe(ctx, scope, &sender);
        if scope.ledger().code(&recipient).is_none() {
            return CallOutcome::success(Vec::new(), gas_limit);
        }
        Self::run(ctx, scope, recipient, payload, gas_limit, true)
    }
}

/// Ledger wrapper that fails selected operations on demand
#[derive(Debug, Clone, Default)]
pub struct FaultyLedger {
    pub inner: MemoryLedger,
    pub fail_logs: bool,
    pub fail_finalize: bool,
    pub fail_params: bool,
}

impl FaultyLedger {
    pub fn new(inner: MemoryLedger) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }
}

impl LedgerView for FaultyLedger {
    fn copy(&self) -> Self {
        self.clone()
    }

    fn nonce(&self, address: &Address) -> Nonce {
        self.inner.nonce(address)
    }

    fn set_nonce(&mut self, address: Address, nonce: Nonce) {
        self.inner.set_nonce(address, nonce)
    }

    fn balance(&self, address: &Address) -> Wei {
        self.inner.balance(address)
    }

    fn add_balance(&mut self, address: Address, amount: Wei) -> LedgerResult<()> {
        self.inner.add_balance(address, amount)
    }

    fn sub_balance(&mut self, address: Address, amount: Wei) -> LedgerResult<()> {
        self.inner.sub_balance(address, amount)
    }

    fn code(&self, address: &Address) -> Option<Vec<u8>> {
        self.inner.code(address)
    }

    fn set_code(&mut self, address: Address, code: Vec<u8>) {
        self.inner.set_code(address, code)
    }

    fn storage(&self, address: &Address, key: &Hash) -> Hash {
        self.inner.storage(address, key)
    }

    fn set_storage(&mut self, address: Address, key: Hash, value: Hash) {
        self.inner.set_storage(address, key, value)
    }

    fn exists(&self, address: &Address) -> bool {
        self.inner.exists(address)
    }

    fn snapshot(&mut self) -> usize {
        self.inner.snapshot()
    }

    fn revert_to_snapshot(&mut self, id: usize) -> LedgerResult<()> {
        self.inner.revert_to_snapshot(id)
    }

    fn prepare(&mut self, tx_hash: Hash, tx_index: u32) {
        self.inner.prepare(tx_hash, tx_index)
    }

    fn add_log(&mut self, log: Log) {
        self.inner.add_log(log)
    }

    fn params(&self) -> LedgerResult<Params> {
        if self.fail_params {
            return Err(LedgerError::Params("params not found".to_string()));
        }
        self.inner.params()
    }

    fn update_pending_accounts(&mut self) -> LedgerResult<()> {
        self.inner.update_pending_accounts()
    }

    fn logs(&self, tx_hash: &Hash) -> LedgerResult<Vec<Log>> {
        if self.fail_logs {
            return Err(LedgerError::Storage("log store unavailable".to_string()));
        }
        self.inner.logs(tx_hash)
    }

    fn height_hash(&self, height: BlockNumber) -> Option<Hash> {
        self.inner.height_hash(height)
    }

    fn finalize(&mut self, delete_empty: bool) -> LedgerResult<()> {
        if self.fail_finalize {
            return Err(LedgerError::Storage("commit failed".to_string()));
        }
        self.inner.finalize(delete_empty)
    }
}

pub fn current_header() -> BlockHeader {
    BlockHeader::new(
        Hash::from_low_u64_be(CURRENT_HEIGHT - 1),
        CURRENT_HEIGHT,
        HEADER_TIME_MS,
        10_000_000,
    )
}

/// Ledger at `CURRENT_HEIGHT` with the hashes of every earlier block
pub fn new_ledger() -> MemoryLedger {
    let mut ledger = MemoryLedger::default();
    for height in 1..CURRENT_HEIGHT {
        ledger.commit_block(height, Hash::from_low_u64_be(height));
    }
    ledger.begin_block(CURRENT_HEIGHT);
    ledger
}

pub fn new_engine() -> StateTransition<CounterVm> {
    StateTransition::new(CounterVm::default(), TransitionConfig::default()).expect("engine")
}

pub fn ambient(gas_limit: Gas) -> AmbientContext {
    AmbientContext::new(current_header(), GasMeter::new(gas_limit))
        .with_min_gas_prices(GasPrices::new().with("aphoton", MIN_GAS_PRICE))
}

/// Credit `amount` to `address` outside the VM
pub fn fund(ledger: &mut MemoryLedger, address: Address, amount: Wei) {
    let mut account = ledger.committed_account(&address).unwrap_or_default();
    account.balance += amount;
    let mut changes = AccountChanges::new();
    changes.update_account(address, account);
    ledger.apply_external(changes);
}

/// Transaction from `sender` carrying its next committed nonce
pub fn next_tx(ledger: &MemoryLedger, sender: Address, to: Option<Address>, data: Vec<u8>) -> Transaction {
    let nonce = ledger.committed_account(&sender).map_or(0, |a| a.nonce);
    Transaction::new(nonce, GAS_PRICE, TX_GAS_LIMIT, to, 0, data)
}

/// Ante handler: charge the fee, bump the nonce and meter the intrinsic
/// cost, all outside the VM, then bind the ledger to the transaction.
pub fn ante(
    ledger: &mut MemoryLedger,
    ambient: &mut AmbientContext,
    tx: &Transaction,
    sender: Address,
    tx_index: u32,
) -> TransitionRequest {
    let config = TransitionConfig::default();
    let intrinsic = intrinsic_gas(&tx.data, tx.is_create(), &config.gas_schedule, config.intrinsic_rules)
        .expect("intrinsic gas");
    ambient.gas_meter.consume(intrinsic, "ante").expect("ante gas");

    let mut account: Account = ledger.committed_account(&sender).unwrap_or_default();
    account.balance -= tx.max_fee().expect("fee");
    account.increment_nonce();
    let mut changes = AccountChanges::new();
    changes.update_account(sender, account);
    ledger.apply_external(changes);

    let request = TransitionRequest::from_transaction(tx, sender, CHAIN_ID, false).expect("request");
    if let Some(tx_hash) = request.tx_hash {
        ledger.prepare(tx_hash, tx_index);
    }
    request
}

/// Full commit path for one transaction
pub fn submit(
    engine: &StateTransition<CounterVm>,
    ledger: &mut MemoryLedger,
    sender: Address,
    to: Option<Address>,
    data: Vec<u8>,
) -> (TransitionResult<ExecutionResult>, AmbientContext) {
    let tx = next_tx(ledger, sender, to, data);
    let mut ambient = ambient(tx.gas_limit);
    let request = ante(ledger, &mut ambient, &tx, sender, 0);
    let result = engine.transition(&mut ambient, ledger, &request, &ChainConfig::default());
    (result, ambient)
}

/// Deploy a counter starting at `initial`
pub fn deploy(
    engine: &StateTransition<CounterVm>,
    ledger: &mut MemoryLedger,
    deployer: Address,
    initial: u8,
) -> Address {
    let (result, _) = submit(engine, ledger, deployer, None, vec![0x60, initial]);
    let result = result.expect("deploy");
    assert!(result.is_success(), "deploy failed: {:?}", result.vm_error);
    result.contract_address.expect("contract address")
}

/// Read-only request against `contract`
pub fn query(sender: Address, contract: Address, data: Vec<u8>) -> TransitionRequest {
    TransitionRequest {
        sender,
        recipient: Some(contract),
        value: 0,
        payload: data,
        nonce: 0,
        gas_limit: TX_GAS_LIMIT,
        gas_price: GAS_PRICE,
        chain_id: CHAIN_ID,
        tx_hash: None,
        simulate: true,
        debug: false,
    }
}

/// Current counter value through a static call
pub fn counter_value(
    engine: &StateTransition<CounterVm>,
    ledger: &mut MemoryLedger,
    contract: Address,
) -> u64 {
    let ambient = ambient(TX_GAS_LIMIT);
    let output = engine
        .static_call(&ambient, ledger, &query(address(0xee), contract, vec![SELECTOR_GET]), &ChainConfig::default())
        .expect("static call");
    read_word(&output)
}
