//! # Scheduler Node
//!
//! Runs `rounds` blocks through the optimistic scheduler: each block is
//! proposed in discover mode, replayed along its DAG by a verifier and
//! committed once both agree.
//!
//! ## Startup Sequence
//!
//! 1. Install the tracing subscriber (`RUST_LOG`, default `info`)
//! 2. Load configuration from `QC_*` environment variables
//! 3. Write genesis state
//! 4. Run the rounds; Ctrl+C halts the round in progress

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use node_runtime::{NodeConfig, NodeRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let config = NodeConfig::from_env().context("Failed to load configuration")?;
    info!(
        chain_id = %config.chain_id,
        rounds = config.rounds,
        tx_count = config.workload.tx_count,
        hot_key_percent = config.workload.hot_key_percent,
        "Starting scheduler node"
    );

    let runtime = NodeRuntime::new(config)?;
    let rounds = runtime.config().rounds;

    let run = async {
        let mut admitted = 0;
        for height in 1..=rounds {
            if runtime.is_stopping() {
                break;
            }
            admitted += runtime.run_round(height).await?.admitted;
        }
        Ok::<_, anyhow::Error>(admitted)
    };
    tokio::pin!(run);

    let admitted = tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, halting the scheduler");
            runtime.halt();
            run.await?
        }
    };

    info!(rounds, admitted, "Node finished");
    Ok(())
}
