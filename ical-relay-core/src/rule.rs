//! Rules: filters combined by an operator, feeding one action.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{Calendar, IndexSet};
use crate::error::{RelayError, RelayResult};
use crate::modules::{Action, Filter, ModuleSpec, Registry};

/// A rule as stored and transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub filters: Vec<ModuleSpec>,
    #[serde(default)]
    pub operator: String,
    pub action: ModuleSpec,
    #[serde(default, with = "expiry_format", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Rule {
    pub fn new(filters: Vec<ModuleSpec>, action: ModuleSpec) -> Self {
        Rule {
            filters,
            operator: String::new(),
            action,
            expiry: None,
        }
    }

    /// Adds a display alarm `time` before every event (`?reminder=15M`).
    pub fn reminder(time: &str) -> Self {
        Rule::new(
            vec![ModuleSpec::new("all")],
            ModuleSpec::new("add-reminder").with("time", time),
        )
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry < now)
    }

    /// Validate every module and the operator.
    pub fn compile(&self, registry: &Registry) -> RelayResult<CompiledRule> {
        let operator = Operator::parse(&self.operator)?;
        let filters = self
            .filters
            .iter()
            .map(|spec| registry.filter(spec))
            .collect::<RelayResult<Vec<_>>>()?;
        let action = registry.action(&self.action)?;

        Ok(CompiledRule {
            filters,
            operator,
            action,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    pub fn parse(value: &str) -> RelayResult<Operator> {
        match value {
            "and" => Ok(Operator::And),
            "or" | "" => Ok(Operator::Or),
            other => Err(RelayError::InvalidRule(format!("unknown operator '{other}'"))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => write!(f, "and"),
            Operator::Or => write!(f, "or"),
        }
    }
}

/// A validated rule, ready to run.
#[derive(Debug)]
pub struct CompiledRule {
    filters: Vec<Box<dyn Filter>>,
    operator: Operator,
    action: Box<dyn Action>,
}

impl CompiledRule {
    /// Combined selection of all filters. No filters select nothing.
    pub fn select(&self, calendar: &Calendar, now: DateTime<Utc>) -> IndexSet {
        let mut selections = self.filters.iter().map(|f| f.select(calendar, now));
        let Some(first) = selections.next() else {
            return IndexSet::new();
        };
        selections.fold(first, |acc, local| match self.operator {
            Operator::And => acc.intersection(&local).copied().collect(),
            Operator::Or => acc.union(&local).copied().collect(),
        })
    }

    pub fn apply(&self, calendar: &mut Calendar, now: DateTime<Utc>) -> RelayResult<()> {
        let indices = self.select(calendar, now);
        tracing::trace!(?indices, operator = %self.operator, "rule selection");
        self.action.apply(calendar, &indices)
    }
}

/// Run `rules` over `calendar` in order, skipping expired ones.
///
/// All rules are compiled before the first one runs, so an invalid rule
/// leaves the calendar untouched.
pub fn run_rules(
    calendar: &mut Calendar,
    rules: &[Rule],
    registry: &Registry,
    now: DateTime<Utc>,
) -> RelayResult<()> {
    let compiled = rules
        .iter()
        .enumerate()
        .filter(|(i, rule)| {
            let expired = rule.is_expired(now);
            if expired {
                tracing::debug!(rule = i, "skipping expired rule");
            }
            !expired
        })
        .map(|(_, rule)| rule.compile(registry))
        .collect::<RelayResult<Vec<_>>>()?;

    for (i, rule) in compiled.iter().enumerate() {
        tracing::debug!(rule = i, "executing rule");
        rule.apply(calendar, now)?;
    }
    Ok(())
}

/// RFC 3339 on the wire; an empty string means no expiry.
mod expiry_format {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(de::Error::custom)
    }
}
