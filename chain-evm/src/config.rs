//! Chain, module and engine configuration

use crate::gas::{GasSchedule, IntrinsicRules};
use crate::{LedgerError, LedgerResult, TransitionError, TransitionResult};
use chain_core::BlockNumber;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// EIPs that can be activated on top of the configured fork rules
pub const ACTIVATEABLE_EIPS: &[i64] = &[1344, 1884, 2200, 2315, 2929];

/// Default fee denomination
pub const DEFAULT_EVM_DENOM: &str = "aphoton";

/// Module parameters stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Denomination gas prices are quoted in
    pub evm_denom: String,
    /// Whether contract creation is allowed
    pub enable_create: bool,
    /// Whether message calls are allowed
    pub enable_call: bool,
    /// Extra EIPs activated for the VM
    pub extra_eips: Vec<i64>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            evm_denom: DEFAULT_EVM_DENOM.to_string(),
            enable_create: true,
            enable_call: true,
            extra_eips: Vec::new(),
        }
    }
}

impl Params {
    /// Validate the parameters
    pub fn validate(&self) -> LedgerResult<()> {
        if self.evm_denom.trim().is_empty() {
            return Err(LedgerError::Params("evm denom cannot be empty".to_string()));
        }

        for (i, eip) in self.extra_eips.iter().enumerate() {
            if !ACTIVATEABLE_EIPS.contains(eip) {
                return Err(LedgerError::Params(format!("EIP {} is not activateable", eip)));
            }
            if self.extra_eips[..i].contains(eip) {
                return Err(LedgerError::Params(format!("duplicate EIP {}", eip)));
            }
        }

        Ok(())
    }
}

/// Fork activation heights; `None` means never activated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub homestead_block: Option<BlockNumber>,
    pub dao_fork_block: Option<BlockNumber>,
    pub dao_fork_support: bool,
    pub eip150_block: Option<BlockNumber>,
    pub eip155_block: Option<BlockNumber>,
    pub eip158_block: Option<BlockNumber>,
    pub byzantium_block: Option<BlockNumber>,
    pub constantinople_block: Option<BlockNumber>,
    pub petersburg_block: Option<BlockNumber>,
    pub istanbul_block: Option<BlockNumber>,
    pub muir_glacier_block: Option<BlockNumber>,
    pub berlin_block: Option<BlockNumber>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            homestead_block: Some(0),
            dao_fork_block: Some(0),
            dao_fork_support: true,
            eip150_block: Some(0),
            eip155_block: Some(0),
            eip158_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            petersburg_block: Some(0),
            istanbul_block: Some(0),
            muir_glacier_block: Some(0),
            berlin_block: None,
        }
    }
}

/// Fork flags in effect at one height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainRules {
    pub chain_id: u64,
    pub is_homestead: bool,
    pub is_eip150: bool,
    pub is_eip155: bool,
    pub is_eip158: bool,
    pub is_byzantium: bool,
    pub is_constantinople: bool,
    pub is_petersburg: bool,
    pub is_istanbul: bool,
    pub is_berlin: bool,
}

fn is_active(fork: Option<BlockNumber>, height: BlockNumber) -> bool {
    fork.map_or(false, |at| at <= height)
}

impl ChainConfig {
    /// Parse from JSON
    pub fn from_json(json: &str) -> TransitionResult<Self> {
        let config: ChainConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML
    pub fn from_toml(toml_str: &str) -> TransitionResult<Self> {
        let config: ChainConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.json` or `.toml` file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> TransitionResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| TransitionError::Config(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_json(&content),
        }
    }

    /// Fork rules in effect at `height`
    pub fn rules(&self, chain_id: u64, height: BlockNumber) -> ChainRules {
        ChainRules {
            chain_id,
            is_homestead: is_active(self.homestead_block, height),
            is_eip150: is_active(self.eip150_block, height),
            is_eip155: is_active(self.eip155_block, height),
            is_eip158: is_active(self.eip158_block, height),
            is_byzantium: is_active(self.byzantium_block, height),
            is_constantinople: is_active(self.constantinople_block, height),
            is_petersburg: is_active(self.petersburg_block, height),
            is_istanbul: is_active(self.istanbul_block, height),
            is_berlin: is_active(self.berlin_block, height),
        }
    }

    /// Check that forks activate in order and none is skipped
    pub fn validate(&self) -> TransitionResult<()> {
        // The DAO fork is optional and not part of the ordering.
        let ordered = [
            ("homestead", self.homestead_block),
            ("eip150", self.eip150_block),
            ("eip155", self.eip155_block),
            ("eip158", self.eip158_block),
            ("byzantium", self.byzantium_block),
            ("constantinople", self.constantinople_block),
            ("petersburg", self.petersburg_block),
            ("istanbul", self.istanbul_block),
            ("muir_glacier", self.muir_glacier_block),
            ("berlin", self.berlin_block),
        ];

        for pair in ordered.windows(2) {
            let (prev_name, prev) = pair[0];
            let (next_name, next) = pair[1];
            match (prev, next) {
                (None, Some(at)) => {
                    return Err(TransitionError::Config(format!(
                        "unsupported fork ordering: {} not enabled, but {} enabled at {}",
                        prev_name, next_name, at
                    )));
                }
                (Some(a), Some(b)) if a > b => {
                    return Err(TransitionError::Config(format!(
                        "unsupported fork ordering: {} enabled at {}, but {} enabled at {}",
                        prev_name, a, next_name, b
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Engine-level settings shared by every node of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Intrinsic and key-value gas costs
    pub gas_schedule: GasSchedule,
    /// Rules selecting the intrinsic gas formula
    pub intrinsic_rules: IntrinsicRules,
    /// Whether finalize removes empty accounts
    pub delete_empty_objects: bool,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            gas_schedule: GasSchedule::default(),
            intrinsic_rules: IntrinsicRules::default(),
            delete_empty_objects: true,
        }
    }
}

impl TransitionConfig {
    /// Parse from TOML
    pub fn from_toml(toml_str: &str) -> TransitionResult<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> TransitionResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| TransitionError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }
}
