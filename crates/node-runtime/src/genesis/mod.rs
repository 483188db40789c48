//! # Genesis Module
//!
//! Chain initialization: the native contracts are deployed and the initial
//! accounts funded before the first block is scheduled.
//!
//! ## Initialization Sequence
//!
//! 1. Write a descriptor for every native contract under `CONTRACT_MANAGE`
//! 2. Record the contract creator in the system state contract
//! 3. Fund `accounts` bank accounts with `initial_balance` each

pub mod builder;

pub use builder::{GenesisBuilder, GenesisConfig, GenesisError, GenesisState};
