//! State transition orchestration
//!
//! [`StateTransition::transition`] applies one request against a ledger
//! view in commit or simulate mode; [`StateTransition::static_call`] runs a
//! read-only call against the live view.

use crate::config::{ChainConfig, Params, TransitionConfig};
use crate::context::{AmbientContext, BlockContext, ExecutionContext, TxContext, VmConfig};
use crate::executor::{ExecutionScope, VmExecutor};
use crate::gas::{
    available_gas, intrinsic_gas, match_intrinsic, reconcile, simulated_available_gas, GasInfo,
    VmGasReport,
};
use crate::metrics::{MetricTags, Metrics};
use crate::nonce::NonceGuard;
use crate::state::LedgerView;
use crate::{TransitionError, TransitionResult, VmError};
use chain_core::{
    logs_bloom, Address, Bloom, CoreResult, Gas, Hash, Log, Nonce, Transaction, Wei,
};
use tracing::{debug, debug_span, warn};

/// One transaction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub sender: Address,
    /// `None` for a contract creation
    pub recipient: Option<Address>,
    pub value: Wei,
    pub payload: Vec<u8>,
    /// Sender nonce the created contract address is derived from
    pub nonce: Nonce,
    pub gas_limit: Gas,
    pub gas_price: Wei,
    pub chain_id: u64,
    /// Transaction identity logs are recorded under; absent for simulations
    pub tx_hash: Option<Hash>,
    /// Execute on a copy and never persist
    pub simulate: bool,
    /// Trace the execution
    pub debug: bool,
}

impl TransitionRequest {
    /// Request for `tx` signed by `sender`
    pub fn from_transaction(
        tx: &Transaction,
        sender: Address,
        chain_id: u64,
        simulate: bool,
    ) -> CoreResult<Self> {
        let tx_hash = if simulate { None } else { Some(tx.hash()?) };
        Ok(Self {
            sender,
            recipient: tx.to,
            value: tx.value,
            payload: tx.data.clone(),
            nonce: tx.nonce,
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price,
            chain_id,
            tx_hash,
            simulate,
            debug: false,
        })
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn is_create(&self) -> bool {
        self.recipient.is_none()
    }
}

/// Outcome of a transition that was not aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output: Vec<u8>,
    /// Set for successful creations
    pub contract_address: Option<Address>,
    pub gas_info: GasInfo,
    pub logs: Vec<Log>,
    pub bloom: Bloom,
    /// Error reported by the VM; gas was still charged
    pub vm_error: Option<VmError>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.vm_error.is_none()
    }

    pub fn is_reverted(&self) -> bool {
        self.vm_error.as_ref().map_or(false, VmError::is_revert)
    }

    fn failed(output: Vec<u8>, gas_info: GasInfo, error: VmError) -> Self {
        Self {
            output,
            contract_address: None,
            gas_info,
            logs: Vec::new(),
            bloom: Bloom::zero(),
            vm_error: Some(error),
        }
    }
}

/// What a dispatched execution produced, before reconciliation
struct Dispatch {
    output: Vec<u8>,
    contract_address: Option<Address>,
    report: VmGasReport,
    error: Option<VmError>,
}

/// Drives a [`VmExecutor`] through the transition protocol
pub struct StateTransition<E> {
    executor: E,
    config: TransitionConfig,
    tags: MetricTags,
    metrics: Metrics,
}

impl<E: VmExecutor> StateTransition<E> {
    /// Create an orchestrator with unregistered metrics
    pub fn new(executor: E, config: TransitionConfig) -> TransitionResult<Self> {
        Ok(Self::with_metrics(executor, config, Metrics::new()?))
    }

    pub fn with_metrics(executor: E, config: TransitionConfig, metrics: Metrics) -> Self {
        Self {
            executor,
            config,
            tags: MetricTags::default(),
            metrics,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn tags(&self) -> &MetricTags {
        &self.tags
    }

    /// Apply `request` to `ledger`.
    ///
    /// The caller prepares the ledger with the transaction identity before
    /// committing transitions. A VM failure is returned inside the result
    /// with its gas charged to `ambient`; an `Err` means nothing in the
    /// result would have been valid.
    pub fn transition<L: LedgerView>(
        &self,
        ambient: &mut AmbientContext,
        ledger: &mut L,
        request: &TransitionRequest,
        chain_config: &ChainConfig,
    ) -> TransitionResult<ExecutionResult> {
        self.metrics.report_func_call(&self.tags);
        let _timer = self.metrics.start_timer(&self.tags);

        let result = if request.simulate {
            let mut copy = ledger.copy();
            self.apply(ambient, &mut copy, request, chain_config)
        } else {
            self.apply(ambient, ledger, request, chain_config)
        };

        if result.is_err() {
            self.metrics.report_func_error(&self.tags);
        }
        result
    }

    /// Run a read-only call against the live view and return its output
    pub fn static_call<L: LedgerView>(
        &self,
        ambient: &AmbientContext,
        ledger: &mut L,
        request: &TransitionRequest,
        chain_config: &ChainConfig,
    ) -> TransitionResult<Vec<u8>> {
        let recipient = request
            .recipient
            .ok_or(TransitionError::StaticCallRequiresRecipient)?;
        let gas_limit = available_gas(request.gas_limit, ambient.gas_meter.consumed())?;

        let params = ledger.params()?;
        let gas_price = min_gas_price(ambient, &params)?;
        ledger.update_pending_accounts()?;

        let ctx = self.execution_context(ambient, request, gas_limit, gas_price, &params, chain_config);
        let _span = request
            .debug
            .then(|| debug_span!("evm_static_call", sender = %request.sender, %recipient).entered());

        let mut scope = ExecutionScope::new(ledger, &self.config.gas_schedule);
        let outcome = self.executor.static_call(
            &ctx,
            &mut scope,
            request.sender,
            recipient,
            &request.payload,
            gas_limit,
        );

        match outcome.error {
            Some(err) => {
                debug!(%recipient, error = %err, "evm static call failed");
                Err(err.into())
            }
            None => Ok(outcome.output),
        }
    }

    fn apply<L: LedgerView>(
        &self,
        ambient: &mut AmbientContext,
        ledger: &mut L,
        request: &TransitionRequest,
        chain_config: &ChainConfig,
    ) -> TransitionResult<ExecutionResult> {
        let is_create = request.is_create();
        let intrinsic = intrinsic_gas(
            &request.payload,
            is_create,
            &self.config.gas_schedule,
            self.config.intrinsic_rules,
        )
        .map_err(TransitionError::InvalidIntrinsicGas)?;

        let gas_limit = if request.simulate {
            simulated_available_gas(request.gas_limit, intrinsic)?
        } else {
            available_gas(request.gas_limit, ambient.gas_meter.consumed())?
        };
        debug!(
            gas_limit,
            intrinsic,
            simulate = request.simulate,
            "resolved execution gas limit"
        );

        let params = ledger.params()?;
        let gas_price = min_gas_price(ambient, &params)?;
        if is_create && !params.enable_create {
            return Err(TransitionError::CreateDisabled);
        }
        if !is_create && !params.enable_call {
            return Err(TransitionError::CallDisabled);
        }

        if request.simulate {
            match_intrinsic(&mut ambient.gas_meter, intrinsic)?;
        }

        ledger.update_pending_accounts()?;

        let ctx = self.execution_context(ambient, request, gas_limit, gas_price, &params, chain_config);
        let dispatch = self.dispatch(&ctx, ledger, request, gas_limit)?;

        let gas_info = reconcile(&mut ambient.gas_meter, &dispatch.report)?;
        if let Some(error) = dispatch.error {
            self.metrics.report_reverted_tx(&self.tags);
            self.metrics.report_gas_consumed(gas_info.gas_consumed);
            return Ok(ExecutionResult::failed(dispatch.output, gas_info, error));
        }

        let logs = match request.tx_hash {
            Some(tx_hash) if !request.simulate => ledger
                .logs(&tx_hash)
                .map_err(TransitionError::LogRetrievalFailed)?,
            _ => Vec::new(),
        };
        let bloom = logs_bloom(&logs);

        if !request.simulate {
            ledger
                .finalize(self.config.delete_empty_objects)
                .map_err(TransitionError::FinalizeFailed)?;
        }

        self.metrics.report_gas_consumed(gas_info.gas_consumed);
        debug!(
            gas_consumed = gas_info.gas_consumed,
            gas_refunded = gas_info.gas_refunded,
            logs = logs.len(),
            "state transition applied"
        );

        Ok(ExecutionResult {
            output: dispatch.output,
            contract_address: dispatch.contract_address,
            gas_info,
            logs,
            bloom,
            vm_error: None,
        })
    }

    /// Run the VM with the sender nonce overridden; the ledger nonce is
    /// back to its prior value when this returns
    fn dispatch<L: LedgerView>(
        &self,
        ctx: &ExecutionContext,
        ledger: &mut L,
        request: &TransitionRequest,
        gas_limit: Gas,
    ) -> TransitionResult<Dispatch> {
        let mut guard = NonceGuard::set(ledger, request.sender, request.nonce);
        let _span = request
            .debug
            .then(|| debug_span!("evm_dispatch", sender = %request.sender, nonce = request.nonce).entered());

        match request.recipient {
            None => {
                let mut scope = ExecutionScope::new(&mut *guard, &self.config.gas_schedule);
                let outcome = self.executor.create(
                    ctx,
                    &mut scope,
                    request.sender,
                    &request.payload,
                    gas_limit,
                    request.value,
                );

                if let Some(err) = &outcome.error {
                    warn!(
                        simulate = request.simulate,
                        nonce = request.nonce,
                        contract = %outcome.address,
                        error = %err,
                        "evm contract creation failed"
                    );
                }

                Ok(Dispatch {
                    report: outcome.gas_report(gas_limit),
                    contract_address: outcome.error.is_none().then_some(outcome.address),
                    output: outcome.output,
                    error: outcome.error,
                })
            }
            Some(recipient) => {
                guard.increment()?;
                let mut scope = ExecutionScope::new(&mut *guard, &self.config.gas_schedule);
                let outcome = self.executor.call(
                    ctx,
                    &mut scope,
                    request.sender,
                    recipient,
                    &request.payload,
                    gas_limit,
                    request.value,
                );

                if let Some(err) = &outcome.error {
                    debug!(%recipient, error = %err, "evm call failed");
                }

                Ok(Dispatch {
                    report: outcome.gas_report(gas_limit),
                    contract_address: None,
                    output: outcome.output,
                    error: outcome.error,
                })
            }
        }
    }

    fn execution_context(
        &self,
        ambient: &AmbientContext,
        request: &TransitionRequest,
        gas_limit: Gas,
        gas_price: Wei,
        params: &Params,
        chain_config: &ChainConfig,
    ) -> ExecutionContext {
        ExecutionContext::new(
            BlockContext::from_header(&ambient.header, gas_limit),
            TxContext {
                origin: request.sender,
                gas_price,
            },
            VmConfig {
                extra_eips: params.extra_eips.clone(),
                debug: request.debug,
            },
            chain_config.rules(request.chain_id, ambient.block_height()),
        )
    }
}

fn min_gas_price(ambient: &AmbientContext, params: &Params) -> TransitionResult<Wei> {
    ambient
        .min_gas_prices
        .amount_of(&params.evm_denom)
        .ok_or_else(|| TransitionError::MissingGasPrice(params.evm_denom.clone()))
}
