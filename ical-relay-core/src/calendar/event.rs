//! VEVENT components.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};

use crate::calendar::{EventTime, Property, RawComponent};

pub const SUMMARY: &str = "SUMMARY";
pub const DESCRIPTION: &str = "DESCRIPTION";
pub const LOCATION: &str = "LOCATION";
pub const UID: &str = "UID";
pub const DTSTART: &str = "DTSTART";
pub const DTEND: &str = "DTEND";
pub const DTSTAMP: &str = "DTSTAMP";
pub const DURATION: &str = "DURATION";
pub const RRULE: &str = "RRULE";
pub const FREEBUSY: &str = "FREEBUSY";
pub const MS_BUSYSTATUS: &str = "X-MICROSOFT-CDO-BUSYSTATUS";

/// A calendar event: its properties in source order plus nested components (alarms).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub properties: Vec<Property>,
    pub components: Vec<RawComponent>,
}

impl Event {
    pub fn new(uid: &str) -> Self {
        Event {
            properties: vec![Property::new(UID, uid)],
            components: Vec::new(),
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.property(UID).map(|p| p.value.as_str())
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.is(name))
    }

    /// Unescaped text of a property, if present.
    pub fn text(&self, name: &str) -> Option<String> {
        self.property(name).map(Property::text)
    }

    pub fn summary(&self) -> Option<String> {
        self.text(SUMMARY)
    }

    /// Replace the first property with the same name, or append it.
    pub fn set_property(&mut self, prop: Property) {
        match self.properties.iter_mut().find(|p| p.is(&prop.name)) {
            Some(existing) => *existing = prop,
            None => self.properties.push(prop),
        }
    }

    pub fn set_text(&mut self, name: &str, text: &str) {
        self.set_property(Property::from_text(name, text));
    }

    pub fn remove_property(&mut self, name: &str) {
        self.properties.retain(|p| !p.is(name));
    }

    pub fn start(&self) -> Option<EventTime> {
        self.property(DTSTART).and_then(EventTime::from_property)
    }

    /// DTEND, or DTSTART + DURATION when only a duration is given.
    pub fn end(&self) -> Option<EventTime> {
        if let Some(end) = self.property(DTEND) {
            return EventTime::from_property(end);
        }
        let duration = self.property(DURATION).and_then(|p| parse_ics_duration(&p.value))?;
        self.start().map(|start| start.shifted(duration))
    }

    pub fn start_utc(&self) -> Option<DateTime<Utc>> {
        self.start().and_then(|t| t.to_utc())
    }

    pub fn end_utc(&self) -> Option<DateTime<Utc>> {
        self.end().and_then(|t| t.to_utc())
    }

    pub fn set_start(&mut self, time: &EventTime) {
        self.set_property(time.to_property(DTSTART));
    }

    /// Set DTEND. A DURATION property would contradict it, so it's dropped.
    pub fn set_end(&mut self, time: &EventTime) {
        self.remove_property(DURATION);
        self.set_property(time.to_property(DTEND));
    }

    pub fn is_recurring(&self) -> bool {
        self.property(RRULE).is_some()
    }

    pub fn alarms(&self) -> impl Iterator<Item = &RawComponent> {
        self.components.iter().filter(|c| c.name == "VALARM")
    }

    /// Append a DISPLAY alarm with the given TRIGGER value.
    pub fn add_display_alarm(&mut self, trigger: &str) {
        let description = self.summary().unwrap_or_else(|| "Reminder".to_string());
        self.components.push(RawComponent {
            name: "VALARM".to_string(),
            properties: vec![
                Property::new("ACTION", "DISPLAY"),
                Property::new("TRIGGER", trigger),
                Property::from_text(DESCRIPTION, &description),
            ],
            components: Vec::new(),
        });
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summary().unwrap_or_else(|| "(No title)".to_string());
        write!(f, "{}", summary)
    }
}

/// Parse an ISO 8601 duration (`PT1H30M`, `-P1D`) as used by DURATION.
fn parse_ics_duration(value: &str) -> Option<TimeDelta> {
    let negative = value.starts_with('-');
    let unsigned = value.trim_start_matches(['-', '+']);
    let duration = iso8601::duration(unsigned).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let delta = TimeDelta::from_std(std_duration).ok()?;
    Some(if negative { -delta } else { delta })
}
