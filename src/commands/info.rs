use std::collections::BTreeMap;

use anyhow::Result;
use ical_relay_core::{Calendar, RelayConfig};

use crate::commands::source_descriptor;
use crate::state::AppState;

/// Print what a calendar contains.
pub async fn run(config: RelayConfig, source: &str) -> Result<()> {
    let state = AppState::new(config).await?;
    let calendar = state.relay.resolve(&source_descriptor(source)).await?;
    print!("{}", summarize(&calendar));
    Ok(())
}

fn summarize(calendar: &Calendar) -> String {
    let mut out = String::new();
    for prop in &calendar.properties {
        out.push_str(&format!("{}: {}\n", prop.name, prop.text()));
    }

    let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
    for component in &calendar.components {
        *kinds.entry(component.name()).or_default() += 1;
    }
    out.push_str(&format!("Components: {}\n", calendar.components.len()));
    for (kind, count) in kinds {
        out.push_str(&format!("  {kind}: {count}\n"));
    }
    out.push_str(&format!("Events: {}\n", calendar.event_count()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ical_relay_core::ics::parse_calendar;

    #[test]
    fn test_summarize() {
        let calendar = parse_calendar(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n\
             BEGIN:VTODO\r\nUID:t1\r\nEND:VTODO\r\n\
             BEGIN:VEVENT\r\nUID:e1\r\nDTSTART:20240110T100000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:e2\r\nDTSTART:20240111T100000Z\r\nEND:VEVENT\r\n\
             END:VCALENDAR\r\n",
        )
        .unwrap();

        assert_eq!(
            summarize(&calendar),
            "VERSION: 2.0\nPRODID: TEST\nComponents: 3\n  VEVENT: 2\n  VTODO: 1\nEvents: 2\n"
        );
    }
}
