//! ICS parsing using the icalendar crate's parser.

use icalendar::parser::{self, read_calendar, unfold};

use crate::calendar::{Calendar, Component, Event, Property, RawComponent};
use crate::error::{RelayError, RelayResult};

/// Parse ICS content into a [`Calendar`].
pub fn parse_calendar(content: &str) -> RelayResult<Calendar> {
    let unfolded = unfold(content);
    if !unfolded.trim_start().starts_with("BEGIN:VCALENDAR") {
        return Err(RelayError::IcsParse("content is not a VCALENDAR".into()));
    }

    let parsed = read_calendar(&unfolded).map_err(|e| RelayError::IcsParse(e.to_string()))?;

    let properties = parsed.properties.iter().map(to_property).collect();
    let components = parsed.components.iter().map(to_component).collect();

    Ok(Calendar {
        properties,
        components,
    })
}

/// Parse raw bytes, tolerating a UTF-8 BOM.
pub fn parse_calendar_bytes(bytes: &[u8]) -> RelayResult<Calendar> {
    let content = std::str::from_utf8(bytes)
        .map_err(|e| RelayError::IcsParse(format!("calendar is not valid UTF-8: {e}")))?;
    parse_calendar(content.trim_start_matches('\u{feff}'))
}

fn to_component(component: &parser::Component) -> Component {
    let raw = to_raw(component);
    match raw.name.as_str() {
        "VEVENT" => Component::Event(Event {
            properties: raw.properties,
            components: raw.components,
        }),
        "VTIMEZONE" => Component::Timezone(raw),
        _ => Component::Other(raw),
    }
}

fn to_raw(component: &parser::Component) -> RawComponent {
    RawComponent {
        name: component.name.to_string().to_ascii_uppercase(),
        properties: component.properties.iter().map(to_property).collect(),
        components: component.components.iter().map(to_raw).collect(),
    }
}

fn to_property(prop: &parser::Property) -> Property {
    Property {
        name: prop.name.to_string().to_ascii_uppercase(),
        params: prop
            .params
            .iter()
            .map(|p| {
                (
                    p.key.to_string().to_ascii_uppercase(),
                    p.val.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                )
            })
            .collect(),
        value: prop.val.to_string(),
    }
}
