//! Domain invariants for transaction parameters
//!
//! A transaction whose parameters break any of these never reaches the VM.

use shared_types::protocol::{
    is_valid_state_name, DEFAULT_STATE_LEN, PARAMETERS_KEY_MAX_COUNT, PARAMETERS_VALUE_MAX_LENGTH,
    RESERVED_PARAMETER_KEYS,
};
use shared_types::{KeyValuePair, Parameters};

use super::errors::ParameterError;

/// Validate raw parameter pairs and collect them into `Parameters`.
///
/// Rules, in order:
/// 1. At most `PARAMETERS_KEY_MAX_COUNT` pairs.
/// 2. Keys at most `DEFAULT_STATE_LEN` bytes, letters, digits, `.`, `_`, `-`.
/// 3. Values at most `PARAMETERS_VALUE_MAX_LENGTH` bytes.
///
/// Reserved keys are validated like any other, then dropped: the runtime
/// injects its own values for them.
pub fn parse_parameters(pairs: &[KeyValuePair]) -> Result<Parameters, ParameterError> {
    if pairs.len() > PARAMETERS_KEY_MAX_COUNT {
        return Err(ParameterError::TooMany {
            max: PARAMETERS_KEY_MAX_COUNT,
            actual: pairs.len(),
        });
    }

    let mut parameters = Parameters::new();
    for pair in pairs {
        if pair.key.len() > DEFAULT_STATE_LEN {
            return Err(ParameterError::KeyTooLong {
                max: DEFAULT_STATE_LEN,
                actual: pair.key.len(),
            });
        }
        if !is_valid_state_name(&pair.key) {
            return Err(ParameterError::IllegalKey {
                key: pair.key.clone(),
            });
        }
        if pair.value.len() > PARAMETERS_VALUE_MAX_LENGTH {
            return Err(ParameterError::ValueTooLong {
                max: PARAMETERS_VALUE_MAX_LENGTH,
                actual: pair.value.len(),
            });
        }
        if RESERVED_PARAMETER_KEYS.contains(&pair.key.as_str()) {
            continue;
        }
        parameters.insert(pair.key.clone(), pair.value.clone());
    }
    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pairs(n: usize) -> Vec<KeyValuePair> {
        (0..n).map(|i| KeyValuePair::new(format!("k{i}"), b"v".to_vec())).collect()
    }

    #[test]
    fn test_accepts_limits_exactly() {
        let mut pairs = make_pairs(PARAMETERS_KEY_MAX_COUNT - 1);
        pairs.push(KeyValuePair::new(
            "k".repeat(DEFAULT_STATE_LEN),
            vec![0u8; PARAMETERS_VALUE_MAX_LENGTH],
        ));
        let params = parse_parameters(&pairs).unwrap();
        assert_eq!(params.len(), PARAMETERS_KEY_MAX_COUNT);
    }

    #[test]
    fn test_rejects_too_many() {
        let err = parse_parameters(&make_pairs(PARAMETERS_KEY_MAX_COUNT + 1)).unwrap_err();
        assert_eq!(err, ParameterError::TooMany { max: 20, actual: 21 });
    }

    #[test]
    fn test_rejects_long_key() {
        let pairs = vec![KeyValuePair::new("k".repeat(DEFAULT_STATE_LEN + 1), b"v".to_vec())];
        assert!(matches!(
            parse_parameters(&pairs),
            Err(ParameterError::KeyTooLong { actual: 65, .. })
        ));
    }

    #[test]
    fn test_rejects_illegal_characters() {
        let pairs = vec![KeyValuePair::new("drop table;", b"v".to_vec())];
        assert!(matches!(
            parse_parameters(&pairs),
            Err(ParameterError::IllegalKey { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_value() {
        let pairs = vec![KeyValuePair::new("k", vec![0u8; PARAMETERS_VALUE_MAX_LENGTH + 1])];
        assert!(matches!(
            parse_parameters(&pairs),
            Err(ParameterError::ValueTooLong { .. })
        ));
    }

    #[test]
    fn test_reserved_keys_are_dropped() {
        let pairs = vec![
            KeyValuePair::new("__tx_id__", b"forged".to_vec()),
            KeyValuePair::new("amount", b"10".to_vec()),
        ];
        let params = parse_parameters(&pairs).unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("amount"), Some(&b"10".to_vec()));
    }
}
