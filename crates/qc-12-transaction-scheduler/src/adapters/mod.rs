//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the `TxSimContext` port contracts execute against, and the
//! range iterators it hands out.

mod iterator;
mod sim_context;

pub use iterator::{MergeIterator, WsetIterator};
pub use sim_context::TxSimContextImpl;
