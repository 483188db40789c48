//! Protocol limits and well-known state locations.

/// Maximum number of invocation parameters per transaction.
pub const PARAMETERS_KEY_MAX_COUNT: usize = 20;

/// Maximum byte length of a parameter key or state name.
pub const DEFAULT_STATE_LEN: usize = 64;

/// Maximum byte length of a parameter value (1 MiB).
pub const PARAMETERS_VALUE_MAX_LENGTH: usize = 1024 * 1024;

/// Maximum nesting of cross-contract calls.
pub const CALL_CONTRACT_DEPTH: usize = 5;

/// Gas ceiling across all nested calls of one transaction.
pub const GAS_LIMIT: u64 = 10_000_000_000;

/// State-key prefix for contract bytecode.
pub const CONTRACT_BYTE_CODE: &str = ":B:";

/// State-key prefix for the contract creator.
pub const CONTRACT_CREATOR: &str = ":C:";

/// System contract holding contract descriptors, keyed by contract name.
pub const CONTRACT_MANAGE: &str = "CONTRACT_MANAGE";

/// System contract holding contract metadata (bytecode, creator).
pub const SYSTEM_CONTRACT_STATE: &str = "STATE";

/// System contract holding chain configuration.
pub const CHAIN_CONFIG: &str = "CHAIN_CONFIG";

/// Parameters the runtime injects itself. Client-supplied values are dropped.
pub const RESERVED_PARAMETER_KEYS: [&str; 8] = [
    "__creator_org_id__",
    "__creator_role__",
    "__creator_pk__",
    "__sender_org_id__",
    "__sender_role__",
    "__sender_pk__",
    "__block_height__",
    "__tx_id__",
];

/// Whether `key` only uses letters, digits, `.`, `_` and `-`.
pub fn is_valid_state_name(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// State key under which a contract's bytecode is stored.
pub fn bytecode_key(contract_name: &str) -> Vec<u8> {
    format!("{CONTRACT_BYTE_CODE}{contract_name}").into_bytes()
}

/// State key under which a contract's creator is stored.
pub fn creator_key(contract_name: &str) -> Vec<u8> {
    format!("{CONTRACT_CREATOR}{contract_name}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_name_charset() {
        assert!(is_valid_state_name("balance.of_user-1"));
        assert!(is_valid_state_name("__tx_id__"));
        assert!(!is_valid_state_name(""));
        assert!(!is_valid_state_name("a b"));
        assert!(!is_valid_state_name("key/1"));
        assert!(!is_valid_state_name("ключ"));
    }

    #[test]
    fn test_metadata_keys() {
        assert_eq!(bytecode_key("kv"), b":B:kv".to_vec());
        assert_eq!(creator_key("kv"), b":C:kv".to_vec());
    }
}
