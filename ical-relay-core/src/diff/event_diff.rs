use std::fmt;

use crate::calendar::{DESCRIPTION, Event, LOCATION};
use crate::diff::DiffKind;

#[derive(Debug, Clone, PartialEq)]
pub struct EventDiff {
    pub kind: DiffKind,
    /// The version to report: the new one, or the old one for deletions.
    pub event: Event,
    /// The replaced version of a changed event.
    pub previous: Option<Event>,
}

impl fmt::Display for EventDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.event)
    }
}

impl EventDiff {
    pub fn get_diff(old_event: Option<Event>, new_event: Option<Event>) -> Option<EventDiff> {
        match (old_event, new_event) {
            (None, Some(new)) => Some(EventDiff {
                kind: DiffKind::Added,
                event: new,
                previous: None,
            }),
            (Some(old), None) => Some(EventDiff {
                kind: DiffKind::Deleted,
                event: old,
                previous: None,
            }),
            (Some(old), Some(new)) => {
                if same_content(&old, &new) {
                    None
                } else {
                    Some(EventDiff {
                        kind: DiffKind::Changed,
                        event: new,
                        previous: Some(old),
                    })
                }
            }
            (None, None) => None,
        }
    }
}

/// Only the fields shown in a notification count as a change.
fn same_content(a: &Event, b: &Event) -> bool {
    a.summary() == b.summary()
        && a.start() == b.start()
        && a.end() == b.end()
        && a.text(DESCRIPTION) == b.text(DESCRIPTION)
        && a.text(LOCATION) == b.text(LOCATION)
}
