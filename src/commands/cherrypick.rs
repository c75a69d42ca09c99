use anyhow::{Result, bail};
use chrono::Utc;
use ical_relay_core::ics::generate_calendar;
use ical_relay_core::modules::Filter as _;
use ical_relay_core::{Calendar, ModuleSpec, RelayConfig, Registry};

use crate::commands::source_descriptor;
use crate::state::AppState;

/// Print the events with the given UID as a calendar of their own.
pub async fn run(config: RelayConfig, source: &str, id: &str) -> Result<()> {
    let state = AppState::new(config).await?;
    let calendar = state.relay.resolve(&source_descriptor(source)).await?;
    tracing::debug!(source, id, "cherrypicking event");

    let picked = pick(&calendar, state.relay.registry(), id)?;
    print!("{}", generate_calendar(&picked));
    Ok(())
}

fn pick(calendar: &Calendar, registry: &Registry, id: &str) -> Result<Calendar> {
    let filter = registry.filter(&ModuleSpec::new("id").with("id", id))?;
    let selected = filter.select(calendar, Utc::now());
    if selected.is_empty() {
        bail!("no event with id '{id}'");
    }

    let mut picked = Calendar::new();
    for index in selected {
        if let Some(event) = calendar.components[index].as_event() {
            picked.push_event(event.clone());
        }
    }
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ical_relay_core::ics::parse_calendar;

    const SOURCE: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n\
        BEGIN:VEVENT\r\nUID:keep\r\nSUMMARY:Standup\r\nEND:VEVENT\r\n\
        BEGIN:VEVENT\r\nUID:other\r\nSUMMARY:Review\r\nEND:VEVENT\r\n\
        BEGIN:VEVENT\r\nUID:keep\r\nSUMMARY:Standup moved\r\nEND:VEVENT\r\n\
        END:VCALENDAR\r\n";

    #[test]
    fn test_pick_keeps_only_matching_events() {
        let calendar = parse_calendar(SOURCE).unwrap();

        let picked = pick(&calendar, &Registry::builtin(), "keep").unwrap();

        let summaries: Vec<_> = picked.events().filter_map(|(_, e)| e.summary()).collect();
        assert_eq!(summaries, ["Standup", "Standup moved"]);
        assert!(picked.property("PRODID").is_some());
    }

    #[test]
    fn test_pick_unknown_id_fails() {
        let calendar = parse_calendar(SOURCE).unwrap();

        let err = pick(&calendar, &Registry::builtin(), "missing").unwrap_err();

        assert!(err.to_string().contains("missing"));
    }
}
