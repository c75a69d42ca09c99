//! Calendar diff computation.

use std::collections::HashMap;

use crate::calendar::{Calendar, Event};
use crate::diff::{DiffKind, EventDiff};

/// Differences between an old and a new state of the same calendar.
#[derive(Debug, Clone, Default)]
pub struct CalendarDiff {
    pub diffs: Vec<EventDiff>,
}

impl CalendarDiff {
    /// Compare two calendars by UID.
    ///
    /// If a UID repeats within one calendar, the last event with it wins.
    /// Events without a UID all share the empty UID.
    pub fn compare(old: &Calendar, new: &Calendar) -> Self {
        let old_by_uid = by_uid(old);
        let new_by_uid = by_uid(new);

        let mut diffs = Vec::new();

        for (uid, old_event) in &old_by_uid {
            let new_event = new_by_uid.get(uid).map(|e| (*e).clone());
            if let Some(diff) = EventDiff::get_diff(Some((*old_event).clone()), new_event) {
                diffs.push(diff);
            }
        }

        for (uid, new_event) in &new_by_uid {
            if old_by_uid.contains_key(uid) {
                continue;
            }
            if let Some(diff) = EventDiff::get_diff(None, Some((*new_event).clone())) {
                diffs.push(diff);
            }
        }

        // Sort by event start time (ascending), undated events last
        diffs.sort_by(|a, b| {
            let a_start = a.event.start_utc();
            let b_start = b.event.start_utc();
            a_start
                .is_none()
                .cmp(&b_start.is_none())
                .then(a_start.cmp(&b_start))
                .then_with(|| a.event.uid().cmp(&b.event.uid()))
        });

        CalendarDiff { diffs }
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn of_kind(&self, kind: DiffKind) -> impl Iterator<Item = &Event> {
        self.diffs
            .iter()
            .filter(move |d| d.kind == kind)
            .map(|d| &d.event)
    }

    pub fn added(&self) -> impl Iterator<Item = &Event> {
        self.of_kind(DiffKind::Added)
    }

    pub fn deleted(&self) -> impl Iterator<Item = &Event> {
        self.of_kind(DiffKind::Deleted)
    }

    /// New versions of changed events.
    pub fn changed(&self) -> impl Iterator<Item = &Event> {
        self.of_kind(DiffKind::Changed)
    }
}

fn by_uid(calendar: &Calendar) -> HashMap<&str, &Event> {
    calendar
        .events()
        .map(|(_, event)| (event.uid().unwrap_or(""), event))
        .collect()
}
