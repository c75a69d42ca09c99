use anyhow::Result;
use ical_relay_core::notifier::digest;
use ical_relay_core::{CalendarDiff, RelayConfig};

use crate::commands::source_descriptor;
use crate::state::AppState;

/// Print the change digest between two calendars.
pub async fn run(config: RelayConfig, old: &str, new: &str) -> Result<()> {
    let state = AppState::new(config).await?;
    let old = state.relay.resolve(&source_descriptor(old)).await?;
    let new = state.relay.resolve(&source_descriptor(new)).await?;

    let diff = CalendarDiff::compare(&old, &new);
    if diff.is_empty() {
        println!("No changes");
    } else {
        print!("{}", digest(&diff));
    }
    Ok(())
}
