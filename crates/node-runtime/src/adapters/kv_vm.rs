//! # Native Contract Runtime
//!
//! A `VmManager` for the contracts deployed at genesis. All state goes
//! through the execution context, so every access is tracked in the
//! transaction's RW set.
//!
//! | Contract | Method | Parameters | Effect |
//! |----------|--------|------------|--------|
//! | `bank` | `mint` | `account`, `amount` | credit an account |
//! | `bank` | `transfer` | `from`, `to`, `amount` | move funds, fails on overdraft |
//! | `bank` | `balance` | `account` | read a balance |
//! | `bank` | `total_supply` | - | range scan over every account (special) |
//! | `kv` | `put` / `get` / `delete` | `key`, `value` | plain key/value access |
//! | `config` | `set` | `key`, `value` | update chain config (special) |

use std::sync::Arc;

use shared_types::protocol::CHAIN_CONFIG;
use shared_types::{
    AccessControlProvider, Contract, ContractEvent, ContractResult, Parameters, SpecialTxKind,
    StoreError, TxSimContext, TxStatusCode, TxType, VmManager,
};

pub const BANK_CONTRACT: &str = "bank";
pub const KV_CONTRACT: &str = "kv";
pub const CONFIG_CONTRACT: &str = "config";

/// Every account key starts with this prefix.
pub const ACCOUNT_PREFIX: &str = "acct-";

/// Key of the `index`-th account.
pub fn account_key(index: usize) -> String {
    format!("{ACCOUNT_PREFIX}{index:06}")
}

type VmOutput = (ContractResult, SpecialTxKind, TxStatusCode);

#[derive(Debug, thiserror::Error)]
enum CallError {
    #[error("missing parameter {0}")]
    MissingParameter(&'static str),

    #[error("parameter {0} is not a valid amount")]
    InvalidAmount(&'static str),

    #[error("stored balance of {0} is corrupt")]
    CorruptBalance(String),

    #[error("insufficient balance: {account} holds {balance}, needs {amount}")]
    Overdraft {
        account: String,
        balance: u64,
        amount: u64,
    },

    #[error("unknown method {contract}.{method}")]
    UnknownMethod { contract: String, method: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CallError {
    fn status(&self) -> TxStatusCode {
        match self {
            CallError::Store(_) => TxStatusCode::InternalError,
            _ => TxStatusCode::ContractFail,
        }
    }
}

/// Contracts compiled into the node.
#[derive(Debug, Default)]
pub struct KvVm;

impl KvVm {
    pub fn new() -> Self {
        Self
    }

    fn dispatch(
        &self,
        contract: &Contract,
        method: &str,
        params: &Parameters,
        ctx: &mut dyn TxSimContext,
    ) -> Result<(ContractResult, SpecialTxKind), CallError> {
        let name = contract.name.as_str();
        match (name, method) {
            (BANK_CONTRACT, "mint") => {
                let account = param(params, "account")?;
                let amount = amount(params, "amount")?;
                let balance = read_balance(ctx, account)?;
                let next = balance.saturating_add(amount);
                ctx.put(BANK_CONTRACT, account.as_bytes(), next.to_string().into_bytes())?;
                Ok((ContractResult::ok(next.to_string()), SpecialTxKind::Normal))
            }
            (BANK_CONTRACT, "transfer") => {
                let from = param(params, "from")?;
                let to = param(params, "to")?;
                let amount = amount(params, "amount")?;
                let from_balance = read_balance(ctx, from)?;
                if from_balance < amount {
                    return Err(CallError::Overdraft {
                        account: from.to_string(),
                        balance: from_balance,
                        amount,
                    });
                }
                ctx.put(
                    BANK_CONTRACT,
                    from.as_bytes(),
                    (from_balance - amount).to_string().into_bytes(),
                )?;
                let to_balance = read_balance(ctx, to)?;
                ctx.put(
                    BANK_CONTRACT,
                    to.as_bytes(),
                    to_balance.saturating_add(amount).to_string().into_bytes(),
                )?;

                let event = ContractEvent {
                    topic: "transfer".to_string(),
                    tx_id: ctx.tx().tx_id().to_string(),
                    contract_name: name.to_string(),
                    contract_version: contract.version.clone(),
                    event_data: vec![from.to_string(), to.to_string(), amount.to_string()],
                };
                Ok((ContractResult::ok(Vec::new()).with_event(event), SpecialTxKind::Normal))
            }
            (BANK_CONTRACT, "balance") => {
                let balance = read_balance(ctx, param(params, "account")?)?;
                Ok((ContractResult::ok(balance.to_string()), SpecialTxKind::Normal))
            }
            (BANK_CONTRACT, "total_supply") => {
                // Every key starting with the account prefix: "acct-" up to "acct."
                let start = ACCOUNT_PREFIX.as_bytes();
                let mut limit = start.to_vec();
                if let Some(last) = limit.last_mut() {
                    *last += 1;
                }
                let mut iter = ctx.select(BANK_CONTRACT, start, &limit)?;
                let mut total: u64 = 0;
                while let Some(entry) = iter.next_entry()? {
                    if let Some(value) = entry.value {
                        let key = String::from_utf8_lossy(&entry.key).to_string();
                        total = total.saturating_add(parse_balance(&key, &value)?);
                    }
                }
                iter.release();
                Ok((ContractResult::ok(total.to_string()), SpecialTxKind::RangeScan))
            }
            (KV_CONTRACT, "put") => {
                let key = param(params, "key")?;
                let value = params.get("value").cloned().unwrap_or_default();
                ctx.put(KV_CONTRACT, key.as_bytes(), value)?;
                Ok((ContractResult::ok(Vec::new()), SpecialTxKind::Normal))
            }
            (KV_CONTRACT, "get") => {
                let value = ctx.get(KV_CONTRACT, param(params, "key")?.as_bytes())?;
                Ok((ContractResult::ok(value.unwrap_or_default()), SpecialTxKind::Normal))
            }
            (KV_CONTRACT, "delete") => {
                ctx.del(KV_CONTRACT, param(params, "key")?.as_bytes())?;
                Ok((ContractResult::ok(Vec::new()), SpecialTxKind::Normal))
            }
            (CONFIG_CONTRACT, "set") => {
                let key = param(params, "key")?;
                let value = params.get("value").cloned().unwrap_or_default();
                let previous = ctx.get(CHAIN_CONFIG, key.as_bytes())?;
                ctx.put(CHAIN_CONFIG, key.as_bytes(), value)?;
                Ok((
                    ContractResult::ok(previous.unwrap_or_default()),
                    SpecialTxKind::ConfigChange,
                ))
            }
            _ => Err(CallError::UnknownMethod {
                contract: name.to_string(),
                method: method.to_string(),
            }),
        }
    }
}

impl VmManager for KvVm {
    fn run_contract(
        &self,
        contract: &Contract,
        method: &str,
        _bytecode: &[u8],
        parameters: &Parameters,
        ctx: &mut dyn TxSimContext,
        _gas_used: u64,
        _tx_type: TxType,
    ) -> VmOutput {
        match self.dispatch(contract, method, parameters, ctx) {
            Ok((result, kind)) => (result, kind, TxStatusCode::Success),
            Err(e) => (ContractResult::fail(e.to_string()), SpecialTxKind::Normal, e.status()),
        }
    }

    fn access_control(&self) -> Option<Arc<dyn AccessControlProvider>> {
        None
    }
}

fn param<'a>(params: &'a Parameters, name: &'static str) -> Result<&'a str, CallError> {
    params
        .get(name)
        .and_then(|v| std::str::from_utf8(v).ok())
        .ok_or(CallError::MissingParameter(name))
}

fn amount(params: &Parameters, name: &'static str) -> Result<u64, CallError> {
    param(params, name)?
        .parse()
        .map_err(|_| CallError::InvalidAmount(name))
}

fn parse_balance(account: &str, value: &[u8]) -> Result<u64, CallError> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CallError::CorruptBalance(account.to_string()))
}

fn read_balance(ctx: &mut dyn TxSimContext, account: &str) -> Result<u64, CallError> {
    match ctx.get(BANK_CONTRACT, account.as_bytes())? {
        Some(value) => parse_balance(account, &value),
        None => Ok(0),
    }
}
