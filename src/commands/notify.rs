use anyhow::Result;
use ical_relay_core::{CycleOutcome, RelayConfig};

use crate::state::AppState;

/// Run a single notifier cycle.
pub async fn run(config: RelayConfig, id: &str) -> Result<()> {
    let state = AppState::new(config).await?;

    match state.notifier.run_cycle(id).await? {
        CycleOutcome::Bootstrapped => println!("{id}: saved initial snapshot"),
        CycleOutcome::Unchanged => println!("{id}: no changes"),
        CycleOutcome::Notified { recipients } => {
            println!("{id}: notified {recipients} recipient(s)")
        }
    }
    Ok(())
}
