//! Built-in filters.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use regex::{Regex, RegexBuilder};

use crate::calendar::{Calendar, DESCRIPTION, Event, IndexSet, LOCATION, SUMMARY};
use crate::duration::parse_duration;
use crate::error::{RelayError, RelayResult};
use crate::modules::{Filter, ModuleSpec};

/// Events with their component index, logging every other component skipped.
fn scan(calendar: &Calendar) -> impl Iterator<Item = (usize, &Event)> {
    calendar
        .components
        .iter()
        .enumerate()
        .filter_map(|(i, component)| match component.as_event() {
            Some(event) => Some((i, event)),
            None => {
                tracing::trace!(component = component.name(), "ignoring non-event component");
                None
            }
        })
}

/// Case-insensitive match against SUMMARY, DESCRIPTION or LOCATION.
#[derive(Debug)]
pub struct RegexFilter {
    regex: Regex,
    target: &'static str,
}

impl RegexFilter {
    pub fn build(spec: &ModuleSpec) -> RelayResult<Box<dyn Filter>> {
        let pattern = spec.require("regex")?;
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| RelayError::invalid_param("regex", e))?;

        let target = match spec.get("target").unwrap_or("summary") {
            "summary" => SUMMARY,
            "description" => DESCRIPTION,
            "location" => LOCATION,
            other => return Err(RelayError::invalid_param("target", format!("unknown target '{other}'"))),
        };

        Ok(Box::new(RegexFilter { regex, target }))
    }
}

impl Filter for RegexFilter {
    fn select(&self, calendar: &Calendar, _now: DateTime<Utc>) -> IndexSet {
        scan(calendar)
            .filter(|(_, event)| {
                event
                    .text(self.target)
                    .is_some_and(|value| self.regex.is_match(&value))
            })
            .inspect(|(_, event)| tracing::debug!(uid = ?event.uid(), "regex matched"))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Exact UID match. UIDs aren't unique, so several events may match.
#[derive(Debug)]
pub struct IdFilter {
    id: String,
}

impl IdFilter {
    pub fn build(spec: &ModuleSpec) -> RelayResult<Box<dyn Filter>> {
        Ok(Box::new(IdFilter {
            id: spec.require("id")?.to_string(),
        }))
    }
}

impl Filter for IdFilter {
    fn select(&self, calendar: &Calendar, _now: DateTime<Utc>) -> IndexSet {
        scan(calendar)
            .filter(|(_, event)| event.uid() == Some(self.id.as_str()))
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Now,
    At(DateTime<Utc>),
}

impl Bound {
    fn parse(spec: &ModuleSpec, name: &str, default: DateTime<Utc>) -> RelayResult<Bound> {
        match spec.get(name) {
            None => Ok(Bound::At(default)),
            Some("now") => Ok(Bound::Now),
            Some(value) => DateTime::parse_from_rfc3339(value)
                .map(|dt| Bound::At(dt.with_timezone(&Utc)))
                .map_err(|e| RelayError::invalid_param(name, e)),
        }
    }

    fn resolve(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Bound::Now => now,
            Bound::At(dt) => dt,
        }
    }
}

/// Events starting strictly between `after` and `before`.
///
/// Recurring events are tested against their first occurrence only.
#[derive(Debug)]
pub struct TimeframeFilter {
    after: Bound,
    before: Bound,
}

impl TimeframeFilter {
    pub fn build(spec: &ModuleSpec) -> RelayResult<Box<dyn Filter>> {
        if spec.get("after").is_none() && spec.get("before").is_none() {
            return Err(RelayError::InvalidRule(
                "timeframe needs at least one of 'after' or 'before'".into(),
            ));
        }
        Ok(Box::new(TimeframeFilter {
            after: Bound::parse(spec, "after", DateTime::<Utc>::MIN_UTC)?,
            before: Bound::parse(spec, "before", DateTime::<Utc>::MAX_UTC)?,
        }))
    }
}

impl Filter for TimeframeFilter {
    fn select(&self, calendar: &Calendar, now: DateTime<Utc>) -> IndexSet {
        let after = self.after.resolve(now);
        let before = self.before.resolve(now);
        tracing::debug!(%after, %before, "filtering events by start time");

        scan(calendar)
            .filter(|(_, event)| {
                event
                    .start_utc()
                    .is_some_and(|start| start > after && start < before)
            })
            .map(|(i, _)| i)
            .collect()
    }
}

/// Every repeat of an already seen (start, end, summary) triple.
#[derive(Debug)]
pub struct DuplicatesFilter;

impl DuplicatesFilter {
    pub fn build(_spec: &ModuleSpec) -> RelayResult<Box<dyn Filter>> {
        Ok(Box::new(DuplicatesFilter))
    }
}

impl Filter for DuplicatesFilter {
    fn select(&self, calendar: &Calendar, _now: DateTime<Utc>) -> IndexSet {
        let mut seen = HashSet::new();
        scan(calendar)
            .filter(|(_, event)| !seen.insert((event.start_utc(), event.end_utc(), event.summary())))
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug)]
pub struct AllFilter;

impl AllFilter {
    pub fn build(_spec: &ModuleSpec) -> RelayResult<Box<dyn Filter>> {
        Ok(Box::new(AllFilter))
    }
}

impl Filter for AllFilter {
    fn select(&self, calendar: &Calendar, _now: DateTime<Utc>) -> IndexSet {
        scan(calendar).map(|(i, _)| i).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Longer,
    Shorter,
}

/// Events whose length is at least (`longer`) or at most (`shorter`) a duration.
#[derive(Debug)]
pub struct DurationFilter {
    duration: TimeDelta,
    comparison: Comparison,
}

impl DurationFilter {
    pub fn build(spec: &ModuleSpec) -> RelayResult<Box<dyn Filter>> {
        let duration =
            parse_duration(spec.require("duration")?).map_err(|e| RelayError::invalid_param("duration", e))?;
        let comparison = match spec.get("operator").unwrap_or("longer") {
            "longer" => Comparison::Longer,
            "shorter" => Comparison::Shorter,
            other => {
                return Err(RelayError::invalid_param("operator", format!("invalid operator '{other}'")));
            }
        };
        Ok(Box::new(DurationFilter {
            duration,
            comparison,
        }))
    }
}

impl Filter for DurationFilter {
    fn select(&self, calendar: &Calendar, _now: DateTime<Utc>) -> IndexSet {
        scan(calendar)
            .filter(|(_, event)| {
                let (Some(start), Some(end)) = (event.start_utc(), event.end_utc()) else {
                    return false;
                };
                let length = end - start;
                match self.comparison {
                    Comparison::Longer => length >= self.duration,
                    Comparison::Shorter => length <= self.duration,
                }
            })
            .map(|(i, _)| i)
            .collect()
    }
}
