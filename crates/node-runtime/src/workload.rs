//! # Workload Generation
//!
//! Deterministic transaction batches with a tunable share of transfers that
//! hit a small set of hot accounts. Hot accounts are what make optimistic
//! execution retry, so the ratio directly controls contention.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_types::Transaction;

use crate::adapters::{account_key, BANK_CONTRACT, CONFIG_CONTRACT};
use crate::container::WorkloadConfig;

/// Every `SCAN_EVERY`-th transaction audits the total supply.
const SCAN_EVERY: usize = 97;

/// The batch for block `height`. Same config and height, same batch.
pub fn generate_batch(config: &WorkloadConfig, height: u64) -> Vec<Transaction> {
    let mut rng = StdRng::seed_from_u64(config.seed ^ height.rotate_left(32));

    (0..config.tx_count)
        .map(|i| {
            let tx_id = hex::encode(rng.gen::<[u8; 16]>());
            if config.config_every > 0 && i % config.config_every == config.config_every - 1 {
                Transaction::new(tx_id, CONFIG_CONTRACT, "set")
                    .with_parameter("key", b"block.tx_limit".to_vec())
                    .with_parameter("value", (config.tx_count + i).to_string().into_bytes())
            } else if i % SCAN_EVERY == SCAN_EVERY - 1 {
                Transaction::new(tx_id, BANK_CONTRACT, "total_supply")
            } else {
                let (from, to) = pick_pair(&mut rng, config);
                Transaction::new(tx_id, BANK_CONTRACT, "transfer")
                    .with_parameter("from", account_key(from).into_bytes())
                    .with_parameter("to", account_key(to).into_bytes())
                    .with_parameter("amount", rng.gen_range(1..=10u64).to_string().into_bytes())
            }
        })
        .collect()
}

/// Two distinct account indices, from the hot set with the configured odds.
fn pick_pair(rng: &mut StdRng, config: &WorkloadConfig) -> (usize, usize) {
    let hot = config.hot_accounts >= 2 && rng.gen_range(0..100u8) < config.hot_key_percent;
    let range = if hot {
        config.hot_accounts
    } else {
        config.accounts
    };
    let from = rng.gen_range(0..range);
    // Skip `from` by shifting everything at or above it.
    let mut to = rng.gen_range(0..range - 1);
    if to >= from {
        to += 1;
    }
    (from, to)
}
