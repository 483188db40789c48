//! Runs one transaction through the VM against an execution context.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use shared_types::protocol::{bytecode_key, CONTRACT_MANAGE, SYSTEM_CONTRACT_STATE};
use shared_types::{
    Contract, ContractResult, RuntimeType, SpecialTxKind, TxResult, TxSimContext, TxStatusCode,
    VmManager,
};
use tracing::{debug, error, warn};

use crate::adapters::TxSimContextImpl;
use crate::domain::invariants::parse_parameters;
use crate::domain::value_objects::ExecutionOutcome;

fn failed(code: TxStatusCode, message: String) -> ExecutionOutcome {
    ExecutionOutcome {
        result: TxResult {
            code,
            contract_result: ContractResult::fail(message),
            rw_set_hash: None,
        },
        special_kind: SpecialTxKind::Normal,
        vm_succeeded: false,
    }
}

/// Load the descriptor of `contract_name` through the context, so the read
/// lands in the transaction's read set.
fn load_contract(ctx: &mut TxSimContextImpl, contract_name: &str) -> Result<Contract, String> {
    let bytes = ctx
        .get(CONTRACT_MANAGE, contract_name.as_bytes())
        .map_err(|e| format!("failed to load contract {contract_name}: {e}"))?
        .ok_or_else(|| format!("contract {contract_name} not found"))?;
    bincode::deserialize(&bytes).map_err(|e| format!("failed to decode contract {contract_name}: {e}"))
}

fn load_bytecode(ctx: &mut TxSimContextImpl, contract: &Contract) -> Result<Vec<u8>, String> {
    if contract.runtime_type == RuntimeType::Native {
        return Ok(Vec::new());
    }
    ctx.get(SYSTEM_CONTRACT_STATE, &bytecode_key(&contract.name))
        .map_err(|e| format!("failed to load bytecode of {}: {e}", contract.name))?
        .ok_or_else(|| format!("bytecode of {} not found", contract.name))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Execute the transaction held by `ctx`.
///
/// Never fails: every problem settles into the returned `TxResult`, and
/// `vm_succeeded` is false whenever the status is not `Success`. A panic
/// inside the VM settles as `InternalError`.
pub fn run_vm(ctx: &mut TxSimContextImpl, vm: &dyn VmManager) -> ExecutionOutcome {
    let payload = ctx.tx().payload.clone();

    let parameters = match parse_parameters(&payload.parameters) {
        Ok(parameters) => parameters,
        Err(e) => {
            debug!(tx_id = %payload.tx_id, error = %e, "Invalid parameters");
            return failed(TxStatusCode::InvalidParameter, e.to_string());
        }
    };

    let contract = match load_contract(ctx, &payload.contract_name) {
        Ok(contract) => contract,
        Err(message) => {
            error!(tx_id = %payload.tx_id, %message, "Contract unavailable");
            return failed(TxStatusCode::ContractFail, message);
        }
    };
    let bytecode = match load_bytecode(ctx, &contract) {
        Ok(bytecode) => bytecode,
        Err(message) => {
            error!(tx_id = %payload.tx_id, %message, "Bytecode unavailable");
            return failed(TxStatusCode::ContractFail, message);
        }
    };

    let call = panic::catch_unwind(AssertUnwindSafe(|| {
        vm.run_contract(
            &contract,
            &payload.method,
            &bytecode,
            &parameters,
            &mut *ctx,
            0,
            payload.tx_type,
        )
    }));
    let (contract_result, kind, code) = match call {
        Ok(output) => output,
        Err(panicked) => {
            let message = panic_message(panicked.as_ref());
            error!(tx_id = %payload.tx_id, %message, "Contract execution panicked");
            return failed(TxStatusCode::InternalError, format!("contract panicked: {message}"));
        }
    };

    let special_kind = if kind.is_special() {
        kind
    } else {
        ctx.nested_special_kind()
    };
    let vm_succeeded = code.is_success();
    if !vm_succeeded {
        error!(
            tx_id = %payload.tx_id,
            ?code,
            message = %contract_result.message,
            "Contract execution failed"
        );
    }

    ExecutionOutcome {
        result: TxResult {
            code,
            contract_result,
            rw_set_hash: None,
        },
        special_kind,
        vm_succeeded,
    }
}

/// Run the transaction and settle its result on the context, ready for
/// admission. SQL-backed state gets a savepoint around the run that is
/// rolled back when the contract fails.
pub fn execute(ctx: &mut TxSimContextImpl, vm: &dyn VmManager, enable_sql: bool) -> ExecutionOutcome {
    let tx_id = ctx.tx().tx_id().to_string();
    let store = ctx.blockchain_store();
    if enable_sql {
        if let Err(e) = store.begin_savepoint(&tx_id) {
            warn!(tx_id = %tx_id, error = %e, "Failed to open savepoint");
        }
    }

    let mut outcome = run_vm(ctx, vm);

    if enable_sql && !outcome.vm_succeeded {
        if let Err(e) = store.rollback_savepoint(&tx_id) {
            warn!(tx_id = %tx_id, error = %e, "Failed to roll back savepoint");
        }
    }

    outcome.result.rw_set_hash = Some(ctx.tx_rwset(outcome.vm_succeeded).hash());
    ctx.set_tx_result(outcome.result.clone());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_04_state_management::{MemoryStore, SnapshotImpl};
    use shared_types::{
        AccessControlProvider, BlockHeader, Parameters, Snapshot, Transaction, TxType,
    };
    use std::sync::Arc;

    /// Writes `value` under `key`, or fails when `fail` is set. The
    /// `panic` method panics after writing.
    struct EchoVm;

    impl VmManager for EchoVm {
        fn run_contract(
            &self,
            contract: &Contract,
            method: &str,
            bytecode: &[u8],
            parameters: &Parameters,
            ctx: &mut dyn TxSimContext,
            _gas_used: u64,
            _tx_type: TxType,
        ) -> (ContractResult, SpecialTxKind, TxStatusCode) {
            if parameters.contains_key("fail") {
                return (ContractResult::fail("asked to fail"), SpecialTxKind::Normal, TxStatusCode::ContractFail);
            }
            if let (Some(k), Some(v)) = (parameters.get("key"), parameters.get("value")) {
                let _ = ctx.put(&contract.name, k, v.clone());
            }
            if method == "panic" {
                panic!("vm exploded");
            }
            let kind = if method == "config" {
                SpecialTxKind::ConfigChange
            } else {
                SpecialTxKind::Normal
            };
            (ContractResult::ok(bytecode.to_vec()), kind, TxStatusCode::Success)
        }

        fn access_control(&self) -> Option<Arc<dyn AccessControlProvider>> {
            None
        }
    }

    fn make_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let native = bincode::serialize(&Contract::native("kv")).unwrap();
        store.put(CONTRACT_MANAGE, b"kv", native);
        let wasm = bincode::serialize(&Contract::native("wasm").with_runtime(RuntimeType::Wasm)).unwrap();
        store.put(CONTRACT_MANAGE, b"wasm", wasm);
        store.put(SYSTEM_CONTRACT_STATE, &bytecode_key("wasm"), b"\0asm".to_vec());
        store.put(CONTRACT_MANAGE, b"broken", b"\xff".to_vec());
        store
    }

    fn run(tx: Transaction) -> (ExecutionOutcome, TxSimContextImpl) {
        let snapshot: Arc<dyn Snapshot> =
            Arc::new(SnapshotImpl::new(make_store(), &BlockHeader::default()));
        let vm = Arc::new(EchoVm);
        let mut ctx = TxSimContextImpl::new(tx, snapshot, vm.clone(), 0);
        let outcome = run_vm(&mut ctx, vm.as_ref());
        (outcome, ctx)
    }

    #[test]
    fn test_successful_run_writes_state() {
        let tx = Transaction::new("tx1", "kv", "put")
            .with_parameter("key", b"k".to_vec())
            .with_parameter("value", b"v".to_vec());
        let (outcome, mut ctx) = run(tx);

        assert!(outcome.vm_succeeded);
        assert_eq!(outcome.result.code, TxStatusCode::Success);
        assert_eq!(outcome.special_kind, SpecialTxKind::Normal);
        let rwset = ctx.tx_rwset(true);
        assert_eq!(rwset.tx_writes.len(), 1);
        // The contract descriptor read is tracked like any other read.
        assert_eq!(rwset.tx_reads[0].contract_name, CONTRACT_MANAGE);
    }

    #[test]
    fn test_invalid_parameters_never_reach_the_vm() {
        let tx = Transaction::new("tx1", "kv", "put").with_parameter("bad key!", b"v".to_vec());
        let (outcome, mut ctx) = run(tx);

        assert!(!outcome.vm_succeeded);
        assert_eq!(outcome.result.code, TxStatusCode::InvalidParameter);
        assert_eq!(outcome.result.contract_result.code, shared_types::CONTRACT_RESULT_FAIL);
        assert!(outcome.result.contract_result.message.contains("bad key!"));
        assert!(ctx.tx_rwset(true).tx_reads.is_empty());
    }

    #[test]
    fn test_missing_and_corrupt_contracts_fail() {
        let (outcome, _) = run(Transaction::new("tx1", "nope", "put"));
        assert_eq!(outcome.result.code, TxStatusCode::ContractFail);
        assert!(outcome.result.contract_result.message.contains("not found"));

        let (outcome, _) = run(Transaction::new("tx2", "broken", "put"));
        assert_eq!(outcome.result.code, TxStatusCode::ContractFail);
        assert!(outcome.result.contract_result.message.contains("decode"));
    }

    #[test]
    fn test_non_native_contract_gets_bytecode() {
        let (outcome, _) = run(Transaction::new("tx1", "wasm", "get"));
        assert!(outcome.vm_succeeded);
        assert_eq!(outcome.result.contract_result.result, b"\0asm".to_vec());
    }

    #[test]
    fn test_execute_settles_hash_and_savepoints() {
        let store = make_store();
        let snapshot: Arc<dyn Snapshot> =
            Arc::new(SnapshotImpl::new(store.clone(), &BlockHeader::default()));
        let vm = Arc::new(EchoVm);

        let tx = Transaction::new("tx1", "kv", "put").with_parameter("fail", b"1".to_vec());
        let mut ctx = TxSimContextImpl::new(tx, Arc::clone(&snapshot), vm.clone(), 0);
        let outcome = execute(&mut ctx, vm.as_ref(), true);

        assert!(!outcome.vm_succeeded);
        assert_eq!(store.savepoints_begun(), 1);
        assert_eq!(store.savepoints_rolled_back(), 1);
        assert_eq!(outcome.result.rw_set_hash, Some(ctx.tx_rwset(false).hash()));
        assert_eq!(ctx.tx_result(), Some(&outcome.result));

        let tx = Transaction::new("tx2", "kv", "put");
        let mut ctx = TxSimContextImpl::new(tx, snapshot, vm.clone(), 0);
        assert!(execute(&mut ctx, vm.as_ref(), false).vm_succeeded);
        assert_eq!(store.savepoints_begun(), 1);
    }

    #[test]
    fn test_contract_failure_and_special_kind() {
        let (outcome, _) = run(Transaction::new("tx1", "kv", "put").with_parameter("fail", b"1".to_vec()));
        assert!(!outcome.vm_succeeded);
        assert_eq!(outcome.result.code, TxStatusCode::ContractFail);

        let (outcome, _) = run(Transaction::new("tx2", "kv", "config"));
        assert_eq!(outcome.special_kind, SpecialTxKind::ConfigChange);
    }

    #[test]
    fn test_vm_panic_settles_as_internal_error() {
        let tx = Transaction::new("tx1", "kv", "panic")
            .with_parameter("key", b"k".to_vec())
            .with_parameter("value", b"v".to_vec());
        let (outcome, mut ctx) = run(tx);

        assert!(!outcome.vm_succeeded);
        assert_eq!(outcome.result.code, TxStatusCode::InternalError);
        assert!(outcome.result.contract_result.message.contains("vm exploded"));
        // The write made before the panic is not kept.
        assert!(ctx.tx_rwset(false).tx_writes.is_empty());
    }
}
