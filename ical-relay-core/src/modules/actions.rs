//! Built-in actions.

use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};

use crate::calendar::{
    Calendar, Component, DESCRIPTION, DTEND, DTSTAMP, DTSTART, DURATION, Event, EventTime,
    FREEBUSY, IndexSet, LOCATION, MS_BUSYSTATUS, Property, SUMMARY, UID,
};
use crate::duration::parse_duration;
use crate::error::{RelayError, RelayResult};
use crate::modules::{Action, ModuleSpec};

/// The time part of an ISO 8601 duration: `15M`, `1H`, `1H30M`, `90S`.
static REMINDER_TIME_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^(?:[0-9]+H)?(?:[0-9]+M)?(?:[0-9]+S)?$")
        .expect("REMINDER_TIME_REGEX pattern is valid")
});

/// Removes the selected components in one compaction pass.
#[derive(Debug)]
pub struct DeleteAction;

impl DeleteAction {
    pub fn build(_spec: &ModuleSpec) -> RelayResult<Box<dyn Action>> {
        Ok(Box::new(DeleteAction))
    }
}

impl Action for DeleteAction {
    fn apply(&self, calendar: &mut Calendar, indices: &IndexSet) -> RelayResult<()> {
        let removed = calendar.remove_indices(indices);
        tracing::debug!(removed, "deleted events");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overwrite {
    Replace,
    Append,
    FillEmpty,
}

#[derive(Debug)]
enum TimeEdit {
    Set {
        start: Option<EventTime>,
        end: Option<EventTime>,
    },
    Move(TimeDelta),
}

/// Rewrites text fields and times of the selected events.
#[derive(Debug)]
pub struct EditAction {
    overwrite: Overwrite,
    texts: Vec<(&'static str, String)>,
    time: TimeEdit,
}

impl EditAction {
    pub fn build(spec: &ModuleSpec) -> RelayResult<Box<dyn Action>> {
        let overwrite = match spec.get("overwrite").unwrap_or("true") {
            "true" => Overwrite::Replace,
            "false" => Overwrite::Append,
            "fillempty" => Overwrite::FillEmpty,
            other => {
                return Err(RelayError::invalid_param(
                    "overwrite",
                    format!("expected true, false or fillempty, got '{other}'"),
                ));
            }
        };

        let texts = [
            ("new-summary", SUMMARY),
            ("new-description", DESCRIPTION),
            ("new-location", LOCATION),
        ]
        .into_iter()
        .filter_map(|(key, property)| spec.get(key).map(|value| (property, value.to_string())))
        .collect();

        let time = match spec.get("move-time") {
            Some(_) if spec.get("new-start").is_some() || spec.get("new-end").is_some() => {
                return Err(RelayError::InvalidRule(
                    "'move-time' can't be combined with 'new-start' or 'new-end'".into(),
                ));
            }
            Some(value) => TimeEdit::Move(
                parse_duration(value).map_err(|e| RelayError::invalid_param("move-time", e))?,
            ),
            None => TimeEdit::Set {
                start: parse_timestamp(spec, "new-start")?,
                end: parse_timestamp(spec, "new-end")?,
            },
        };

        Ok(Box::new(EditAction {
            overwrite,
            texts,
            time,
        }))
    }

    fn edit_text(&self, event: &mut Event, property: &str, value: &str) {
        // A missing property is always created, whatever the mode.
        let Some(current) = event.text(property) else {
            event.set_text(property, value);
            return;
        };
        match self.overwrite {
            Overwrite::Replace => event.set_text(property, value),
            Overwrite::Append => event.set_text(property, &format!("{current}; {value}")),
            Overwrite::FillEmpty if current.is_empty() => event.set_text(property, value),
            Overwrite::FillEmpty => {}
        }
    }

    fn edit_time(&self, event: &mut Event) {
        match &self.time {
            TimeEdit::Set { start, end } => {
                if let Some(start) = start {
                    event.set_start(start);
                }
                if let Some(end) = end {
                    event.set_end(end);
                }
            }
            TimeEdit::Move(delta) => {
                // An end given as DURATION moves along with the start.
                let end = event.property(DTEND).and_then(EventTime::from_property);
                if let Some(start) = event.start() {
                    event.set_start(&start.shifted(*delta));
                }
                if let Some(end) = end {
                    event.set_end(&end.shifted(*delta));
                }
            }
        }
    }
}

fn parse_timestamp(spec: &ModuleSpec, name: &str) -> RelayResult<Option<EventTime>> {
    spec.get(name)
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| EventTime::from(dt.with_timezone(&Utc)))
                .map_err(|e| RelayError::invalid_param(name, e))
        })
        .transpose()
}

impl Action for EditAction {
    fn apply(&self, calendar: &mut Calendar, indices: &IndexSet) -> RelayResult<()> {
        for &index in indices {
            let Some(event) = calendar.event_mut(index) else {
                tracing::debug!(index, "skipping non-event component");
                continue;
            };
            tracing::debug!(uid = ?event.uid(), "editing event");
            for (property, value) in &self.texts {
                self.edit_text(event, property, value);
            }
            self.edit_time(event);
        }
        Ok(())
    }
}

/// Adds a DISPLAY alarm `time` before the start of each selected event.
#[derive(Debug)]
pub struct AddReminderAction {
    trigger: String,
}

impl AddReminderAction {
    pub fn build(spec: &ModuleSpec) -> RelayResult<Box<dyn Action>> {
        let time = spec.require("time")?.to_ascii_uppercase();
        if time.is_empty() || !REMINDER_TIME_REGEX.is_match(&time) {
            return Err(RelayError::invalid_param(
                "time",
                format!("'{time}' is not a duration like 15M, 1H or 1H30M"),
            ));
        }
        Ok(Box::new(AddReminderAction {
            trigger: format!("-PT{time}"),
        }))
    }
}

impl Action for AddReminderAction {
    fn apply(&self, calendar: &mut Calendar, indices: &IndexSet) -> RelayResult<()> {
        for &index in indices {
            if let Some(event) = calendar.event_mut(index) {
                event.add_display_alarm(&self.trigger);
                tracing::debug!(uid = ?event.uid(), trigger = %self.trigger, "added reminder");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StripMode {
    Availability,
    Limited,
}

/// Replaces events by a minimal copy: UID, start, end and busy status.
#[derive(Debug)]
pub struct StripInfoAction {
    mode: StripMode,
}

impl StripInfoAction {
    pub fn build(spec: &ModuleSpec) -> RelayResult<Box<dyn Action>> {
        let mode = match spec.require("mode")? {
            "availability" | "availibility" => StripMode::Availability,
            "limited" => StripMode::Limited,
            other => {
                return Err(RelayError::invalid_param("mode", format!("invalid mode '{other}'")));
            }
        };
        Ok(Box::new(StripInfoAction { mode }))
    }

    fn strip(&self, event: &Event) -> Event {
        let mut stripped = Event::default();
        let copy = |stripped: &mut Event, name: &str| {
            if let Some(prop) = event.property(name) {
                stripped.properties.push(prop.clone());
            }
        };

        copy(&mut stripped, UID);
        copy(&mut stripped, DTSTAMP);
        if self.mode == StripMode::Limited {
            copy(&mut stripped, SUMMARY);
        }
        copy(&mut stripped, DTSTART);
        if event.property(DTEND).is_some() {
            copy(&mut stripped, DTEND);
        } else {
            copy(&mut stripped, DURATION);
        }

        let status = event
            .property(MS_BUSYSTATUS)
            .or_else(|| event.property(FREEBUSY));
        match (status, self.mode) {
            (Some(status), StripMode::Availability) => {
                stripped.properties.push(status.clone());
                stripped
                    .properties
                    .push(Property::new(SUMMARY, status.value.clone()));
            }
            (Some(status), StripMode::Limited) => stripped.properties.push(status.clone()),
            (None, StripMode::Availability) => {
                stripped.properties.push(Property::new(SUMMARY, "Busy"))
            }
            (None, StripMode::Limited) => {}
        }
        stripped
    }
}

impl Action for StripInfoAction {
    fn apply(&self, calendar: &mut Calendar, indices: &IndexSet) -> RelayResult<()> {
        for &index in indices {
            if let Some(Component::Event(event)) = calendar.components.get_mut(index) {
                *event = self.strip(event);
                tracing::debug!(uid = ?event.uid(), mode = ?self.mode, "stripped event");
            }
        }
        Ok(())
    }
}
