//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `BlockHeader`, `Transaction`, `TxPayload`
//! - **Execution**: `TxResult`, `ContractResult`, `ContractEvent`, `TxStatusCode`
//! - **State**: `TxRead`, `TxWrite`, `TxRwSet`, `KvEntry`
//! - **Ordering**: `Dag`, `DagNeighbors`, `SpecialTxKind`
//! - **Contracts**: `Contract`, `RuntimeType`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// Validated contract invocation parameters, ordered by key.
pub type Parameters = BTreeMap<String, Vec<u8>>;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// Transaction kinds accepted by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TxType {
    /// State-changing contract invocation.
    #[default]
    InvokeContract,
    /// Read-only contract query.
    QueryContract,
}

/// A single named invocation argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: Vec<u8>,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The signed body of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxPayload {
    /// Chain the transaction targets.
    pub chain_id: String,
    /// Invocation kind.
    pub tx_type: TxType,
    /// Unique transaction identifier.
    pub tx_id: String,
    /// Client-side creation time (unix seconds).
    pub timestamp: i64,
    /// Target contract.
    pub contract_name: String,
    /// Target method.
    pub method: String,
    /// Raw invocation arguments, validated before execution.
    pub parameters: Vec<KeyValuePair>,
    /// Config sequence for system contract updates.
    pub sequence: u64,
}

/// A transaction as carried in a block.
///
/// The payload is immutable. `result` is attached exactly once, when the
/// conflict snapshot admits an execution of this transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Transaction {
    pub payload: TxPayload,
    /// Serialized sender identity.
    pub sender: Vec<u8>,
    /// Settled execution outcome.
    pub result: Option<TxResult>,
}

impl Transaction {
    /// Create an invoke transaction with no parameters.
    pub fn new(tx_id: impl Into<String>, contract_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            payload: TxPayload {
                tx_id: tx_id.into(),
                contract_name: contract_name.into(),
                method: method.into(),
                ..TxPayload::default()
            },
            sender: Vec::new(),
            result: None,
        }
    }

    /// Append an invocation argument.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.payload.parameters.push(KeyValuePair::new(key, value));
        self
    }

    pub fn with_tx_type(mut self, tx_type: TxType) -> Self {
        self.payload.tx_type = tx_type;
        self
    }

    pub fn tx_id(&self) -> &str {
        &self.payload.tx_id
    }
}

/// Block header fields the scheduler reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    pub chain_id: String,
    pub block_height: u64,
    pub block_hash: Hash,
    pub pre_block_hash: Hash,
    /// Serialized proposer identity.
    pub proposer: Vec<u8>,
    pub block_timestamp: i64,
    pub block_version: u32,
}

/// A block: its transactions, ordered to match the DAG vertex indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
    pub dag: Dag,
}

impl Block {
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            txs: Vec::new(),
            dag: Dag::default(),
        }
    }
}

// =============================================================================
// CLUSTER B: EXECUTION RESULTS
// =============================================================================

/// Final status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TxStatusCode {
    #[default]
    Success,
    /// Parameters failed validation; the contract never ran.
    InvalidParameter,
    /// The contract ran and reported failure, or could not be loaded.
    ContractFail,
    /// Nested calls exceeded the call-depth ceiling.
    ContractTooDeepFailed,
    /// Nested calls exceeded the gas ceiling.
    InsufficientGas,
    /// The runtime failed for reasons outside the contract.
    InternalError,
}

impl TxStatusCode {
    pub fn is_success(self) -> bool {
        self == TxStatusCode::Success
    }
}

/// Contract result code for a successful call.
pub const CONTRACT_RESULT_OK: u32 = 0;
/// Contract result code for a failed call.
pub const CONTRACT_RESULT_FAIL: u32 = 1;

/// An event emitted by a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractEvent {
    pub topic: String,
    pub tx_id: String,
    pub contract_name: String,
    pub contract_version: String,
    pub event_data: Vec<String>,
}

/// What the contract itself returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractResult {
    pub code: u32,
    pub result: Vec<u8>,
    pub message: String,
    pub gas_used: u64,
    pub contract_events: Vec<ContractEvent>,
}

impl ContractResult {
    pub fn ok(result: impl Into<Vec<u8>>) -> Self {
        Self {
            code: CONTRACT_RESULT_OK,
            result: result.into(),
            ..Self::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            code: CONTRACT_RESULT_FAIL,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_gas_used(mut self, gas_used: u64) -> Self {
        self.gas_used = gas_used;
        self
    }

    pub fn with_event(mut self, event: ContractEvent) -> Self {
        self.contract_events.push(event);
        self
    }
}

/// The settled outcome of one admitted execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxResult {
    pub code: TxStatusCode,
    pub contract_result: ContractResult,
    /// SHA-256 of the admitted RW set.
    pub rw_set_hash: Option<Hash>,
}

impl TxResult {
    pub fn success() -> Self {
        Self::default()
    }
}

// =============================================================================
// CLUSTER C: STATE ACCESS
// =============================================================================

/// Build the key that identifies `key` inside `contract_name`'s namespace.
///
/// A zero byte separates the two parts, so `("ab", "c")` and `("a", "bc")`
/// never collide.
pub fn composite_key(contract_name: &str, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(contract_name.len() + 1 + key.len());
    out.extend_from_slice(contract_name.as_bytes());
    out.push(0);
    out.extend_from_slice(key);
    out
}

/// A value observed by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRead {
    pub contract_name: String,
    pub key: Vec<u8>,
    /// `None` when the key was absent or deleted.
    pub value: Option<Vec<u8>>,
}

impl TxRead {
    pub fn composite_key(&self) -> Vec<u8> {
        composite_key(&self.contract_name, &self.key)
    }
}

/// A value produced by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxWrite {
    pub contract_name: String,
    /// Empty for SQL records.
    pub key: Vec<u8>,
    /// `None` is a tombstone.
    pub value: Option<Vec<u8>>,
}

impl TxWrite {
    pub fn composite_key(&self) -> Vec<u8> {
        composite_key(&self.contract_name, &self.key)
    }
}

/// The sorted reads and writes of one admitted execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxRwSet {
    pub tx_id: String,
    pub tx_reads: Vec<TxRead>,
    pub tx_writes: Vec<TxWrite>,
}

impl TxRwSet {
    pub fn new(tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            ..Self::default()
        }
    }

    /// SHA-256 over the canonical bincode encoding.
    pub fn hash(&self) -> Hash {
        // Encoding plain owned data into a Vec cannot fail.
        let bytes = bincode::serialize(self).unwrap_or_default();
        Sha256::digest(&bytes).into()
    }
}

/// One entry yielded by a range scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    pub contract_name: String,
    pub key: Vec<u8>,
    /// `None` marks a pending delete that shadows the persisted value.
    pub value: Option<Vec<u8>>,
}

impl KvEntry {
    pub fn new(contract_name: impl Into<String>, key: impl Into<Vec<u8>>, value: Option<Vec<u8>>) -> Self {
        Self {
            contract_name: contract_name.into(),
            key: key.into(),
            value,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// SQL statement classes recorded by `put_record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    /// Schema changes. Kept in the RW set even when the contract fails.
    Ddl,
    Dml,
    Dql,
}

// =============================================================================
// CLUSTER D: ORDERING
// =============================================================================

/// How the VM classifies an execution for ordering purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SpecialTxKind {
    /// Ordered only by its read/write conflicts.
    #[default]
    Normal,
    /// Range scans cannot be conflict-checked key by key.
    RangeScan,
    /// Configuration changes must observe the whole block.
    ConfigChange,
}

impl SpecialTxKind {
    /// Whether the transaction must run in the sequential post-pass.
    pub fn is_special(self) -> bool {
        self != SpecialTxKind::Normal
    }
}

/// Predecessors of one DAG vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DagNeighbors {
    pub neighbors: Vec<u32>,
}

/// Execution-order dependencies for a block.
///
/// Vertex `i` corresponds to `block.txs[i]`; its neighbors are the vertex
/// indices that must be admitted before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Dag {
    pub vertexes: Vec<DagNeighbors>,
}

impl Dag {
    pub fn len(&self) -> usize {
        self.vertexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertexes.is_empty()
    }

    pub fn push(&mut self, neighbors: Vec<u32>) {
        self.vertexes.push(DagNeighbors { neighbors });
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.vertexes.iter().map(|v| v.neighbors.len()).sum()
    }
}

// =============================================================================
// CLUSTER E: CONTRACTS
// =============================================================================

/// Execution engine a contract is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RuntimeType {
    /// Built into the node; no bytecode.
    #[default]
    Native,
    Wasm,
    Evm,
    DockerGo,
}

/// Deployment status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContractStatus {
    #[default]
    Normal,
    Frozen,
    Revoked,
}

/// A deployed contract descriptor, stored under the contract-manage namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Contract {
    pub name: String,
    pub version: String,
    pub runtime_type: RuntimeType,
    pub status: ContractStatus,
    /// Serialized creator identity.
    pub creator: Vec<u8>,
}

impl Contract {
    pub fn native(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0".to_string(),
            ..Self::default()
        }
    }

    pub fn with_runtime(mut self, runtime_type: RuntimeType) -> Self {
        self.runtime_type = runtime_type;
        self
    }
}
