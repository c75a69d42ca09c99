use anyhow::{Context, Result};
use ical_relay_core::ics::{generate_calendar, parse_calendar};
use ical_relay_core::{Calendar, RelayConfig};
use tokio::io::AsyncReadExt;

use crate::commands::source_descriptor;
use crate::state::AppState;

/// Print `base` with the events of `events` appended. `-` reads the events from stdin.
pub async fn run(config: RelayConfig, events: &str, base: &str) -> Result<()> {
    let state = AppState::new(config).await?;
    let events = if events == "-" {
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("Failed to read events from stdin")?;
        parse_calendar(&input).context("Failed to parse events from stdin")?
    } else {
        state.relay.resolve(&source_descriptor(events)).await?
    };
    let base = state.relay.resolve(&source_descriptor(base)).await?;

    print!("{}", generate_calendar(&add(base, events)));
    Ok(())
}

fn add(mut base: Calendar, events: Calendar) -> Calendar {
    let added = base.merge_events(events);
    tracing::debug!(added, "added events");
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_appends_events_and_keeps_base_metadata() {
        let base = parse_calendar(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:BASE\r\nX-WR-CALNAME:Team\r\n\
             BEGIN:VTIMEZONE\r\nTZID:Europe/Berlin\r\nEND:VTIMEZONE\r\n\
             BEGIN:VEVENT\r\nUID:b1\r\nEND:VEVENT\r\n\
             END:VCALENDAR\r\n",
        )
        .unwrap();
        let events = parse_calendar(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:EXTRA\r\nX-WR-CALNAME:Extra\r\n\
             BEGIN:VTODO\r\nUID:t1\r\nEND:VTODO\r\n\
             BEGIN:VEVENT\r\nUID:e1\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:e2\r\nEND:VEVENT\r\n\
             END:VCALENDAR\r\n",
        )
        .unwrap();

        let merged = add(base, events);

        let uids: Vec<_> = merged.events().filter_map(|(_, e)| e.uid()).collect();
        assert_eq!(uids, ["b1", "e1", "e2"]);
        assert_eq!(merged.property("PRODID").unwrap().value, "BASE");
        assert_eq!(merged.property("X-WR-CALNAME").unwrap().text(), "Team");
        assert!(merged.components.iter().all(|c| c.name() != "VTODO"));
        assert_eq!(merged.components.len(), 4);
    }
}
