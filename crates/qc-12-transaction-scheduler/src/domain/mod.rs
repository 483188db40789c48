//! Domain module for the Transaction Scheduler
//!
//! Contains errors, value objects, and parameter invariants.

pub mod errors;
pub mod invariants;
pub mod value_objects;

pub use errors::*;
pub use value_objects::*;
