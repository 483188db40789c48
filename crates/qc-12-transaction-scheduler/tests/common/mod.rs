//! Shared fixtures for scheduler integration tests.
//!
//! `MockVm` dispatches on the method name:
//!
//! | Method | Effect |
//! |--------|--------|
//! | `put` | writes `value` under `key` |
//! | `rmw` | adds `delta` to the decimal counter under `key` |
//! | `delete` | deletes `key` |
//! | `scan` | range scan of `[start, limit)`, reported as a special tx |
//! | `config` | copies `key` into the chain config, reported as a special tx |
//! | `nested` | calls `put` on `callee` through the context |
//! | `recurse` | calls itself until the context refuses |
//! | `burn` | calls `put` on itself claiming `gas` already used |
//! | `slow` | sleeps `ms` milliseconds, then behaves like `put` |
//! | `fail` | writes `key`, then reports failure |
//! | `sql` | records `value` as a SQL statement (`ddl` marks it DDL) |
//! | `emit` | writes `key` and emits an event |
//! | `peek` | reads `key`, sleeps `ms`, then copies what it read to `out` |
//! | `panic` | writes `key`, then panics |

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use qc_04_state_management::{MemoryStore, SnapshotImpl};
use qc_12_transaction_scheduler::{SchedulerConfig, TxScheduler};
use shared_types::protocol::{CHAIN_CONFIG, CONTRACT_MANAGE};
use shared_types::{
    AccessControlProvider, Block, BlockHeader, Contract, ContractEvent, ContractResult, Parameters,
    Snapshot, SpecialTxKind, SqlType, Transaction, TxSimContext, TxStatusCode, TxType, VmManager,
};

pub const CONTRACTS: [&str; 3] = ["kv", "acct", "sql"];

#[derive(Default)]
pub struct MockVm {
    runs: AtomicUsize,
}

impl MockVm {
    /// Top-level and nested runs so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

fn param<'a>(parameters: &'a Parameters, name: &str) -> &'a [u8] {
    parameters.get(name).map(Vec::as_slice).unwrap_or_default()
}

fn param_u64(parameters: &Parameters, name: &str) -> u64 {
    std::str::from_utf8(param(parameters, name))
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn ok(result: impl Into<Vec<u8>>) -> (ContractResult, SpecialTxKind, TxStatusCode) {
    (ContractResult::ok(result), SpecialTxKind::Normal, TxStatusCode::Success)
}

fn store_failed(e: impl std::fmt::Display) -> (ContractResult, SpecialTxKind, TxStatusCode) {
    (
        ContractResult::fail(e.to_string()),
        SpecialTxKind::Normal,
        TxStatusCode::InternalError,
    )
}

impl VmManager for MockVm {
    fn run_contract(
        &self,
        contract: &Contract,
        method: &str,
        _bytecode: &[u8],
        parameters: &Parameters,
        ctx: &mut dyn TxSimContext,
        gas_used: u64,
        tx_type: TxType,
    ) -> (ContractResult, SpecialTxKind, TxStatusCode) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let name = contract.name.as_str();
        let key = param(parameters, "key");

        match method {
            "put" => match ctx.put(name, key, param(parameters, "value").to_vec()) {
                Ok(()) => ok(Vec::new()),
                Err(e) => store_failed(e),
            },
            "rmw" => {
                let current = match ctx.get(name, key) {
                    Ok(value) => value
                        .and_then(|v| String::from_utf8(v).ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(0),
                    Err(e) => return store_failed(e),
                };
                let next = (current + param_u64(parameters, "delta")).to_string();
                match ctx.put(name, key, next.clone().into_bytes()) {
                    Ok(()) => ok(next),
                    Err(e) => store_failed(e),
                }
            }
            "delete" => match ctx.del(name, key) {
                Ok(()) => ok(Vec::new()),
                Err(e) => store_failed(e),
            },
            "scan" => {
                let entries = ctx
                    .select(name, param(parameters, "start"), param(parameters, "limit"))
                    .and_then(|mut iter| iter.collect_remaining());
                match entries {
                    Ok(entries) => {
                        let live = entries.iter().filter(|e| !e.is_tombstone()).count();
                        (
                            ContractResult::ok(live.to_string()),
                            SpecialTxKind::RangeScan,
                            TxStatusCode::Success,
                        )
                    }
                    Err(e) => store_failed(e),
                }
            }
            "config" => {
                let observed = match ctx.get(name, key) {
                    Ok(value) => value.unwrap_or_default(),
                    Err(e) => return store_failed(e),
                };
                if let Err(e) = ctx.put(CHAIN_CONFIG, b"observed", observed.clone()) {
                    return store_failed(e);
                }
                (
                    ContractResult::ok(observed),
                    SpecialTxKind::ConfigChange,
                    TxStatusCode::Success,
                )
            }
            "nested" => {
                let callee = String::from_utf8_lossy(param(parameters, "callee")).to_string();
                let (result, code) = ctx.call_contract(
                    &Contract::native(callee),
                    "put",
                    &[],
                    parameters,
                    gas_used + 1,
                    tx_type,
                );
                (result, SpecialTxKind::Normal, code)
            }
            "recurse" => {
                let (result, code) =
                    ctx.call_contract(contract, "recurse", &[], parameters, gas_used + 1, tx_type);
                (result, SpecialTxKind::Normal, code)
            }
            "burn" => {
                let (result, code) = ctx.call_contract(
                    contract,
                    "put",
                    &[],
                    parameters,
                    param_u64(parameters, "gas"),
                    tx_type,
                );
                (result, SpecialTxKind::Normal, code)
            }
            "slow" => {
                std::thread::sleep(Duration::from_millis(param_u64(parameters, "ms")));
                match ctx.put(name, key, param(parameters, "value").to_vec()) {
                    Ok(()) => ok(Vec::new()),
                    Err(e) => store_failed(e),
                }
            }
            "fail" => {
                let _ = ctx.put(name, key, b"lost".to_vec());
                (
                    ContractResult::fail("contract reported failure"),
                    SpecialTxKind::Normal,
                    TxStatusCode::ContractFail,
                )
            }
            "sql" => {
                let sql_type = if parameters.contains_key("ddl") {
                    SqlType::Ddl
                } else {
                    SqlType::Dml
                };
                ctx.put_record(name, param(parameters, "value").to_vec(), sql_type);
                if parameters.contains_key("fail") {
                    return (
                        ContractResult::fail("statement rejected"),
                        SpecialTxKind::Normal,
                        TxStatusCode::ContractFail,
                    );
                }
                ok(Vec::new())
            }
            "emit" => {
                if let Err(e) = ctx.put(name, key, b"1".to_vec()) {
                    return store_failed(e);
                }
                let event = ContractEvent {
                    topic: "touched".to_string(),
                    tx_id: ctx.tx().tx_id().to_string(),
                    contract_name: name.to_string(),
                    contract_version: contract.version.clone(),
                    event_data: vec![String::from_utf8_lossy(key).to_string()],
                };
                (
                    ContractResult::ok(Vec::new()).with_event(event),
                    SpecialTxKind::Normal,
                    TxStatusCode::Success,
                )
            }
            "peek" => {
                let observed = match ctx.get(name, key) {
                    Ok(value) => value.unwrap_or_default(),
                    Err(e) => return store_failed(e),
                };
                std::thread::sleep(Duration::from_millis(param_u64(parameters, "ms")));
                match ctx.put(name, param(parameters, "out"), observed.clone()) {
                    Ok(()) => ok(observed),
                    Err(e) => store_failed(e),
                }
            }
            "panic" => {
                let _ = ctx.put(name, key, b"lost".to_vec());
                panic!("mock vm panicked on {}", String::from_utf8_lossy(key));
            }
            other => (
                ContractResult::fail(format!("unknown method {other}")),
                SpecialTxKind::Normal,
                TxStatusCode::ContractFail,
            ),
        }
    }

    fn access_control(&self) -> Option<Arc<dyn AccessControlProvider>> {
        None
    }
}

/// A store with every test contract deployed.
pub fn make_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for name in CONTRACTS {
        let descriptor = bincode::serialize(&Contract::native(name)).expect("encode contract");
        store.put(CONTRACT_MANAGE, name.as_bytes(), descriptor);
    }
    store
}

pub fn make_snapshot(store: &Arc<MemoryStore>, height: u64) -> Arc<dyn Snapshot> {
    let store: Arc<MemoryStore> = Arc::clone(store);
    Arc::new(SnapshotImpl::new(store, &make_header(height)))
}

pub fn make_header(height: u64) -> BlockHeader {
    BlockHeader {
        chain_id: "chain1".to_string(),
        block_height: height,
        proposer: b"node1".to_vec(),
        block_timestamp: 1_700_000_000 + height as i64,
        ..BlockHeader::default()
    }
}

pub fn make_block(height: u64) -> Block {
    Block::new(make_header(height))
}

pub fn make_scheduler(config: SchedulerConfig) -> (TxScheduler, Arc<MockVm>) {
    let vm = Arc::new(MockVm::default());
    let vm_dyn: Arc<dyn VmManager> = vm.clone();
    (TxScheduler::new(vm_dyn, config), vm)
}

pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_pool_capacity(8)
        .with_schedule_timeout(Duration::from_secs(10))
        .with_replay_timeout(Duration::from_secs(10))
}

pub fn put_tx(id: &str, key: &str, value: &str) -> Transaction {
    Transaction::new(id, "kv", "put")
        .with_parameter("key", key.as_bytes().to_vec())
        .with_parameter("value", value.as_bytes().to_vec())
}

pub fn rmw_tx(id: &str, key: &str, delta: u64) -> Transaction {
    Transaction::new(id, "kv", "rmw")
        .with_parameter("key", key.as_bytes().to_vec())
        .with_parameter("delta", delta.to_string().into_bytes())
}

pub fn slow_tx(id: &str, key: &str, ms: u64) -> Transaction {
    Transaction::new(id, "kv", "slow")
        .with_parameter("key", key.as_bytes().to_vec())
        .with_parameter("value", b"v".to_vec())
        .with_parameter("ms", ms.to_string().into_bytes())
}

pub fn peek_tx(id: &str, key: &str, out: &str, ms: u64) -> Transaction {
    Transaction::new(id, "kv", "peek")
        .with_parameter("key", key.as_bytes().to_vec())
        .with_parameter("out", out.as_bytes().to_vec())
        .with_parameter("ms", ms.to_string().into_bytes())
}

pub fn panic_tx(id: &str, key: &str) -> Transaction {
    Transaction::new(id, "kv", "panic").with_parameter("key", key.as_bytes().to_vec())
}

pub fn config_tx(id: &str, key: &str) -> Transaction {
    Transaction::new(id, "kv", "config").with_parameter("key", key.as_bytes().to_vec())
}

pub fn scan_tx(id: &str, start: &str, limit: &str) -> Transaction {
    Transaction::new(id, "kv", "scan")
        .with_parameter("start", start.as_bytes().to_vec())
        .with_parameter("limit", limit.as_bytes().to_vec())
}

pub fn sql_tx(id: &str, statement: &str, ddl: bool, fail: bool) -> Transaction {
    let mut tx = Transaction::new(id, "sql", "sql").with_parameter("value", statement.as_bytes().to_vec());
    if ddl {
        tx = tx.with_parameter("ddl", b"1".to_vec());
    }
    if fail {
        tx = tx.with_parameter("fail", b"1".to_vec());
    }
    tx
}

/// Whether `to` is reachable from `from` by following DAG neighbor edges.
pub fn reaches(block: &Block, from: usize, to: usize) -> bool {
    let mut stack = vec![from];
    let mut seen = vec![false; block.dag.len()];
    while let Some(v) = stack.pop() {
        if v == to {
            return true;
        }
        if std::mem::replace(&mut seen[v], true) {
            continue;
        }
        stack.extend(block.dag.vertexes[v].neighbors.iter().map(|n| *n as usize));
    }
    false
}
