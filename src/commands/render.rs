use anyhow::Result;
use ical_relay_core::ics::generate_calendar;
use ical_relay_core::{RelayConfig, Rule};

use crate::state::AppState;

/// Print a rendered profile to stdout.
pub async fn run(config: RelayConfig, profile: &str, reminder: Option<&str>) -> Result<()> {
    let state = AppState::new(config).await?;
    let extra: Vec<Rule> = reminder.map(Rule::reminder).into_iter().collect();

    let calendar = state.relay.render_with_rules(profile, &extra).await?;
    print!("{}", generate_calendar(&calendar));
    Ok(())
}
