//! Calendar object model.
//!
//! A [`Calendar`] is an ordered list of components. Events are the only
//! component kind the rule pipeline touches; timezones and anything else are
//! carried through untouched.

mod event;
mod property;
mod time;

use std::collections::BTreeSet;

pub use event::*;
pub use property::Property;
pub use time::EventTime;

/// Positions into [`Calendar::components`] produced by filters and consumed by actions.
pub type IndexSet = BTreeSet<usize>;

const PRODID: &str = "-//ical-relay//EN";

/// Any component kept as-is (VTIMEZONE, VTODO, VALARM, X- components).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawComponent {
    pub name: String,
    pub properties: Vec<Property>,
    pub components: Vec<RawComponent>,
}

impl RawComponent {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.is(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Event(Event),
    Timezone(RawComponent),
    Other(RawComponent),
}

impl Component {
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Component::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_event_mut(&mut self) -> Option<&mut Event> {
        match self {
            Component::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Component::Event(_) => "VEVENT",
            Component::Timezone(raw) | Component::Other(raw) => &raw.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    pub properties: Vec<Property>,
    pub components: Vec<Component>,
}

impl Default for Calendar {
    fn default() -> Self {
        Calendar::new()
    }
}

impl Calendar {
    /// An empty calendar with the mandatory VERSION and PRODID properties.
    pub fn new() -> Self {
        Calendar {
            properties: vec![Property::new("VERSION", "2.0"), Property::new("PRODID", PRODID)],
            components: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.is(name))
    }

    /// Events with their component index.
    pub fn events(&self) -> impl Iterator<Item = (usize, &Event)> {
        self.components
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_event().map(|e| (i, e)))
    }

    pub fn event_count(&self) -> usize {
        self.events().count()
    }

    pub fn event_mut(&mut self, index: usize) -> Option<&mut Event> {
        self.components.get_mut(index).and_then(Component::as_event_mut)
    }

    pub fn push_event(&mut self, event: Event) {
        self.components.push(Component::Event(event));
    }

    /// Append all events of `other`; its metadata and other components are dropped.
    pub fn merge_events(&mut self, other: Calendar) -> usize {
        let mut count = 0;
        for component in other.components {
            if let Component::Event(event) = component {
                self.push_event(event);
                count += 1;
            }
        }
        count
    }

    /// Remove the components at `indices` in a single compaction pass.
    ///
    /// Out-of-range indices are ignored.
    pub fn remove_indices(&mut self, indices: &IndexSet) -> usize {
        if indices.is_empty() {
            return 0;
        }
        let before = self.components.len();
        let mut position = 0;
        self.components.retain(|_| {
            let keep = !indices.contains(&position);
            position += 1;
            keep
        });
        before - self.components.len()
    }

    /// Keep only the events for which `keep` returns true; other components stay.
    pub fn retain_events(&mut self, mut keep: impl FnMut(&Event) -> bool) {
        self.components.retain(|c| match c {
            Component::Event(event) => keep(event),
            _ => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar_with_uids(uids: &[&str]) -> Calendar {
        let mut calendar = Calendar::new();
        calendar.components.push(Component::Timezone(RawComponent {
            name: "VTIMEZONE".to_string(),
            ..Default::default()
        }));
        for uid in uids {
            calendar.push_event(Event::new(uid));
        }
        calendar
    }

    fn uids(calendar: &Calendar) -> Vec<String> {
        calendar
            .events()
            .filter_map(|(_, e)| e.uid().map(String::from))
            .collect()
    }

    #[test]
    fn test_remove_indices_is_order_independent() {
        let mut calendar = calendar_with_uids(&["a", "b", "c", "d", "e"]);
        // Component 0 is the timezone, so events sit at 1..=5.
        let indices: IndexSet = [5, 2, 3].into_iter().collect();

        assert_eq!(calendar.remove_indices(&indices), 3);
        assert_eq!(uids(&calendar), vec!["a", "d"]);
        assert_eq!(calendar.components[0].name(), "VTIMEZONE");
    }

    #[test]
    fn test_merge_events_drops_foreign_metadata() {
        let mut base = calendar_with_uids(&["a"]);
        let other = calendar_with_uids(&["b", "c"]);

        assert_eq!(base.merge_events(other), 2);
        assert_eq!(uids(&base), vec!["a", "b", "c"]);
        assert_eq!(
            base.components.iter().filter(|c| c.name() == "VTIMEZONE").count(),
            1
        );
    }
}
