//! Execution context handed to the VM

use crate::config::ChainRules;
use crate::gas::GasMeter;
use crate::state::LedgerView;
use chain_core::{Address, BlockHeader, BlockNumber, Gas, Hash, Wei};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum gas prices by fee denomination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPrices(BTreeMap<String, Wei>);

impl GasPrices {
    /// Create an empty price list
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`
    pub fn with(mut self, denom: impl Into<String>, amount: Wei) -> Self {
        self.set(denom, amount);
        self
    }

    /// Set the price for a denomination
    pub fn set(&mut self, denom: impl Into<String>, amount: Wei) {
        self.0.insert(denom.into(), amount);
    }

    /// Price for `denom`, `None` if it was never set
    pub fn amount_of(&self, denom: &str) -> Option<Wei> {
        self.0.get(denom).copied()
    }
}

/// What the caller brings to a transition: the block being built, its own
/// gas meter and the node's minimum gas prices.
#[derive(Debug, Clone)]
pub struct AmbientContext {
    pub header: BlockHeader,
    pub gas_meter: GasMeter,
    pub min_gas_prices: GasPrices,
}

impl AmbientContext {
    /// Create a context without any minimum gas price
    pub fn new(header: BlockHeader, gas_meter: GasMeter) -> Self {
        Self {
            header,
            gas_meter,
            min_gas_prices: GasPrices::new(),
        }
    }

    pub fn with_min_gas_prices(mut self, prices: GasPrices) -> Self {
        self.min_gas_prices = prices;
        self
    }

    /// Height of the block being built
    pub fn block_height(&self) -> BlockNumber {
        self.header.number
    }
}

/// Hash of the current block header; zero if the header cannot be encoded
pub fn hash_from_header(header: &BlockHeader) -> Hash {
    header.hash().unwrap_or_else(|_| Hash::zero())
}

/// Answers the VM's ancestor block hash lookups.
///
/// Only the current height is answered from the header; earlier heights
/// come from the ledger's retained history and later ones are unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightHashResolver {
    current_height: BlockNumber,
    current_hash: Hash,
}

impl HeightHashResolver {
    pub fn new(current_height: BlockNumber, current_hash: Hash) -> Self {
        Self {
            current_height,
            current_hash,
        }
    }

    /// Resolver for the block described by `header`
    pub fn from_header(header: &BlockHeader) -> Self {
        Self::new(header.number, hash_from_header(header))
    }

    pub fn current_height(&self) -> BlockNumber {
        self.current_height
    }

    /// Hash of block `height`
    pub fn resolve<L: LedgerView + ?Sized>(&self, ledger: &L, height: BlockNumber) -> Hash {
        if height == self.current_height {
            self.current_hash
        } else if height < self.current_height {
            ledger.height_hash(height).unwrap_or_else(Hash::zero)
        } else {
            Hash::zero()
        }
    }
}

/// Block-level execution environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    /// Always zero; there is no mining beneficiary
    pub coinbase: Address,
    pub number: BlockNumber,
    /// Block time in seconds
    pub time: u64,
    /// Always zero
    pub difficulty: u64,
    /// Gas budget of this execution
    pub gas_limit: Gas,
    pub hashes: HeightHashResolver,
}

impl BlockContext {
    pub fn from_header(header: &BlockHeader, gas_limit: Gas) -> Self {
        Self {
            coinbase: Address::zero(),
            number: header.number,
            time: header.unix_seconds(),
            difficulty: 0,
            gas_limit,
            hashes: HeightHashResolver::from_header(header),
        }
    }
}

/// Transaction-level execution environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxContext {
    pub origin: Address,
    pub gas_price: Wei,
}

/// VM switches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmConfig {
    /// EIPs enabled on top of the fork rules
    pub extra_eips: Vec<i64>,
    /// Emit execution traces
    pub debug: bool,
}

/// Immutable context of one VM execution, built fresh for every transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub block: BlockContext,
    pub tx: TxContext,
    pub config: VmConfig,
    pub rules: ChainRules,
}

impl ExecutionContext {
    pub fn new(block: BlockContext, tx: TxContext, config: VmConfig, rules: ChainRules) -> Self {
        Self {
            block,
            tx,
            config,
            rules,
        }
    }

    /// Ancestor hash lookup against `ledger`
    pub fn block_hash<L: LedgerView + ?Sized>(&self, ledger: &L, height: BlockNumber) -> Hash {
        self.block.hashes.resolve(ledger, height)
    }
}
