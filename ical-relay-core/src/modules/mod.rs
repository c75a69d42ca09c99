//! Filter and action modules.
//!
//! A rule names its modules by string (`{"type": "regex", "regex": "..."}`).
//! The [`Registry`] turns such a [`ModuleSpec`] into a typed module, validating
//! its parameters once, before anything touches a calendar.

pub mod actions;
pub mod filters;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{Calendar, IndexSet};
use crate::error::{RelayError, RelayResult};

/// Wire form of a filter or action: a `type` plus string parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, String>,
}

impl ModuleSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        ModuleSpec {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// A parameter value; empty strings count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> RelayResult<&str> {
        self.get(key)
            .ok_or_else(|| RelayError::MissingParameter(key.to_string()))
    }
}

/// Selects events. Must not depend on anything but its inputs.
pub trait Filter: fmt::Debug + Send + Sync {
    fn select(&self, calendar: &Calendar, now: DateTime<Utc>) -> IndexSet;
}

/// Mutates the events at the given indices. Empty input is a no-op.
pub trait Action: fmt::Debug + Send + Sync {
    fn apply(&self, calendar: &mut Calendar, indices: &IndexSet) -> RelayResult<()>;
}

pub type FilterFactory = fn(&ModuleSpec) -> RelayResult<Box<dyn Filter>>;
pub type ActionFactory = fn(&ModuleSpec) -> RelayResult<Box<dyn Action>>;

/// Name to constructor tables for filters and actions.
#[derive(Clone)]
pub struct Registry {
    filters: BTreeMap<String, FilterFactory>,
    actions: BTreeMap<String, ActionFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::builtin()
    }
}

impl Registry {
    pub fn empty() -> Self {
        Registry {
            filters: BTreeMap::new(),
            actions: BTreeMap::new(),
        }
    }

    /// Registry with every built-in filter and action.
    pub fn builtin() -> Self {
        let mut registry = Registry::empty();

        registry.register_filter("regex", filters::RegexFilter::build);
        registry.register_filter("id", filters::IdFilter::build);
        registry.register_filter("timeframe", filters::TimeframeFilter::build);
        registry.register_filter("duplicates", filters::DuplicatesFilter::build);
        registry.register_filter("all", filters::AllFilter::build);
        registry.register_filter("duration", filters::DurationFilter::build);

        registry.register_action("delete", actions::DeleteAction::build);
        registry.register_action("edit", actions::EditAction::build);
        registry.register_action("add-reminder", actions::AddReminderAction::build);
        registry.register_action("strip-info", actions::StripInfoAction::build);

        registry
    }

    pub fn register_filter(&mut self, name: &str, factory: FilterFactory) {
        self.filters.insert(name.to_string(), factory);
    }

    pub fn register_action(&mut self, name: &str, factory: ActionFactory) {
        self.actions.insert(name.to_string(), factory);
    }

    pub fn filter(&self, spec: &ModuleSpec) -> RelayResult<Box<dyn Filter>> {
        let factory = self
            .filters
            .get(&spec.kind)
            .ok_or_else(|| RelayError::UnknownFilter(spec.kind.clone()))?;
        factory(spec)
    }

    pub fn action(&self, spec: &ModuleSpec) -> RelayResult<Box<dyn Action>> {
        let factory = self
            .actions
            .get(&spec.kind)
            .ok_or_else(|| RelayError::UnknownAction(spec.kind.clone()))?;
        factory(spec)
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}
