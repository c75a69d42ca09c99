//! ICS generation through the icalendar crate's builders.
//!
//! Output is deterministic: the same [`Calendar`] always yields the same bytes.

use icalendar::parser;
use icalendar::{Alarm, Component as _, EventLike as _, Trigger};

use crate::calendar::{Calendar, Component, Event, Property, RawComponent};
use crate::calendar::{DTSTAMP, UID};

/// DTSTAMP for events that carry none, so repeated renders stay byte-identical.
const FALLBACK_DTSTAMP: &str = "19700101T000000Z";

/// Properties the icalendar crate sets on a new alarm that we overwrite from the event.
const ALARM_BUILDER_PROPERTIES: [&str; 3] = ["ACTION", "TRIGGER", "DESCRIPTION"];

/// Components that never carry their own DTSTAMP or UID.
const STAMPLESS_COMPONENTS: [&str; 4] = ["VALARM", "VTIMEZONE", "STANDARD", "DAYLIGHT"];

/// Serialize a calendar to ICS text.
pub fn generate_calendar(calendar: &Calendar) -> String {
    let mut cal = icalendar::Calendar::new();
    for prop in &calendar.properties {
        cal.append_property(to_ics_property(prop));
    }

    for component in &calendar.components {
        match component {
            Component::Event(event) => {
                cal.push(to_ics_event(event));
            }
            Component::Timezone(raw) | Component::Other(raw) => {
                cal.push(icalendar::CalendarComponent::from(to_parsed(raw)));
            }
        }
    }

    strip_ics_bloat(&cal.done().to_string())
}

fn to_ics_event(event: &Event) -> icalendar::Event {
    let mut ics_event = icalendar::Event::new();

    // UID and DTSTAMP go in as single properties so the crate doesn't invent them
    let dtstamp = event
        .property(DTSTAMP)
        .or_else(|| event.property("LAST-MODIFIED"))
        .map(|p| p.value.as_str())
        .unwrap_or(FALLBACK_DTSTAMP);
    ics_event.append_property(icalendar::Property::new(DTSTAMP, dtstamp));
    if let Some(uid) = event.property(UID) {
        ics_event.append_property(to_ics_property(uid));
    }

    for prop in &event.properties {
        if prop.is(UID) || prop.is(DTSTAMP) {
            continue;
        }
        ics_event.append_multi_property(to_ics_property(prop));
    }

    for nested in &event.components {
        if nested.name == "VALARM" {
            ics_event.alarm(to_ics_alarm(nested));
        } else {
            tracing::debug!(component = %nested.name, "dropping non-alarm component nested in VEVENT");
        }
    }

    ics_event.done()
}

fn to_ics_alarm(raw: &RawComponent) -> Alarm {
    let mut alarm = Alarm::display("Reminder", Trigger::before_start(chrono::Duration::zero()));
    for prop in &raw.properties {
        if ALARM_BUILDER_PROPERTIES.iter().any(|name| prop.is(name)) {
            alarm.append_property(to_ics_property(prop));
        } else {
            alarm.append_multi_property(to_ics_property(prop));
        }
    }
    alarm
}

fn to_ics_property(prop: &Property) -> icalendar::Property {
    let mut ics_prop = icalendar::Property::new(prop.name.as_str(), prop.value.as_str());
    for (key, value) in &prop.params {
        ics_prop.add_parameter(key, value);
    }
    ics_prop
}

/// Borrow a raw component as the crate's parsed form, which converts into [`icalendar::Other`].
fn to_parsed(raw: &RawComponent) -> parser::Component<'_> {
    parser::Component {
        name: raw.name.as_str().into(),
        properties: raw
            .properties
            .iter()
            .map(|prop| parser::Property {
                name: prop.name.as_str().into(),
                val: prop.value.as_str().into(),
                params: prop
                    .params
                    .iter()
                    .map(|(key, value)| parser::Parameter {
                        key: key.as_str().into(),
                        val: Some(value.as_str().into()),
                    })
                    .collect(),
            })
            .collect(),
        components: raw.components.iter().map(to_parsed).collect(),
    }
}

/// Clean up the icalendar crate's output
/// - Drop its PRODID and CALSCALE:GREGORIAN (the default)
/// - Keep a single VERSION line
/// - Remove the DTSTAMP and UID it adds to alarms and timezones
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    let mut nesting: Vec<&str> = Vec::new();
    let mut seen_version = false;

    for line in ics.lines() {
        if line == "PRODID:ICALENDAR-RS" || line == "CALSCALE:GREGORIAN" {
            continue;
        }

        if let Some(name) = line.strip_prefix("BEGIN:") {
            nesting.push(name);
        } else if line.starts_with("END:") {
            nesting.pop();
        } else if nesting.len() == 1 && line.starts_with("VERSION:") {
            if seen_version {
                continue;
            }
            seen_version = true;
        } else if nesting
            .last()
            .is_some_and(|name| STAMPLESS_COMPONENTS.contains(name))
            && (line.starts_with("DTSTAMP:") || line.starts_with("UID:"))
        {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}
