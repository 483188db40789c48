//! # Genesis State Builder
//!
//! Deploys the native contracts and funds the initial accounts directly in
//! the store, bypassing the scheduler.

use std::sync::Arc;

use qc_04_state_management::MemoryStore;
use shared_types::protocol::{creator_key, CONTRACT_MANAGE, SYSTEM_CONTRACT_STATE};
use shared_types::{BlockchainStore, Contract, StoreError};
use thiserror::Error;
use tracing::info;

use crate::adapters::{account_key, BANK_CONTRACT, CONFIG_CONTRACT, KV_CONTRACT};

/// Genesis creation errors.
#[derive(Debug, Error)]
pub enum GenesisError {
    /// A contract descriptor could not be encoded.
    #[error("Failed to encode contract {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: bincode::Error,
    },

    /// The store already holds a deployed contract.
    #[error("Contract {0} is already deployed")]
    AlreadyDeployed(String),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

/// Genesis state configuration.
#[derive(Debug, Clone)]
pub struct GenesisConfig {
    /// Identity recorded as creator of every native contract.
    pub creator: Vec<u8>,
    /// Funded accounts, `acct-000000` onwards.
    pub accounts: usize,
    pub initial_balance: u64,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            creator: b"genesis".to_vec(),
            accounts: 0,
            initial_balance: 0,
        }
    }
}

/// Summary of what genesis wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisState {
    pub contracts: Vec<String>,
    pub accounts: usize,
    pub total_supply: u64,
}

/// Builder for genesis state.
pub struct GenesisBuilder {
    config: GenesisConfig,
}

impl GenesisBuilder {
    pub fn new(config: GenesisConfig) -> Self {
        Self { config }
    }

    /// Write genesis state into `store`.
    pub fn build(&self, store: &Arc<MemoryStore>) -> Result<GenesisState, GenesisError> {
        let contracts = [BANK_CONTRACT, KV_CONTRACT, CONFIG_CONTRACT];

        for name in contracts {
            if store.read_object(CONTRACT_MANAGE, name.as_bytes())?.is_some() {
                return Err(GenesisError::AlreadyDeployed(name.to_string()));
            }
            let mut contract = Contract::native(name);
            contract.creator = self.config.creator.clone();
            let descriptor = bincode::serialize(&contract).map_err(|source| GenesisError::Encode {
                name: name.to_string(),
                source,
            })?;
            store.put(CONTRACT_MANAGE, name.as_bytes(), descriptor);
            store.put(SYSTEM_CONTRACT_STATE, &creator_key(name), self.config.creator.clone());
        }

        let balance = self.config.initial_balance.to_string().into_bytes();
        for index in 0..self.config.accounts {
            store.put(BANK_CONTRACT, account_key(index).as_bytes(), balance.clone());
        }

        let state = GenesisState {
            contracts: contracts.iter().map(|c| c.to_string()).collect(),
            accounts: self.config.accounts,
            total_supply: self
                .config
                .initial_balance
                .saturating_mul(self.config.accounts as u64),
        };
        info!(
            contracts = state.contracts.len(),
            accounts = state.accounts,
            total_supply = state.total_supply,
            creator = %hex::encode(&self.config.creator),
            "Genesis state written"
        );
        Ok(state)
    }
}
