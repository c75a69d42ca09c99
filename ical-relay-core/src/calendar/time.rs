//! DTSTART/DTEND values.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::calendar::Property;

const DATE_FORMAT: &str = "%Y%m%d";
const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// A date or date-time as it appears on an event, preserving timezone info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    /// Parse a DTSTART/DTEND style property.
    ///
    /// Handles:
    /// - VALUE=DATE: `DTSTART;VALUE=DATE:20240108`
    /// - TZID parameter: `DTSTART;TZID=Europe/Berlin:20240108T100000`
    /// - UTC: `DTSTART:20240108T100000Z`
    /// - Floating: `DTSTART:20240108T100000`
    pub fn from_property(prop: &Property) -> Option<EventTime> {
        let value = prop.value.trim();
        let is_date = prop
            .param("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
            || value.len() == 8;

        if is_date {
            return NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .map(EventTime::Date);
        }

        if let Some(utc) = value.strip_suffix('Z') {
            return NaiveDateTime::parse_from_str(utc, DATETIME_FORMAT)
                .ok()
                .map(|dt| EventTime::DateTimeUtc(dt.and_utc()));
        }

        let datetime = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).ok()?;
        Some(match prop.param("TZID") {
            Some(tzid) => EventTime::DateTimeZoned {
                datetime,
                tzid: tzid.to_string(),
            },
            None => EventTime::DateTimeFloating(datetime),
        })
    }

    /// Render as a property with the right VALUE/TZID parameters.
    pub fn to_property(&self, name: &str) -> Property {
        match self {
            EventTime::Date(d) => {
                Property::new(name, d.format(DATE_FORMAT).to_string()).with_param("VALUE", "DATE")
            }
            EventTime::DateTimeUtc(dt) => {
                Property::new(name, dt.format("%Y%m%dT%H%M%SZ").to_string())
            }
            EventTime::DateTimeFloating(dt) => {
                Property::new(name, dt.format(DATETIME_FORMAT).to_string())
            }
            EventTime::DateTimeZoned { datetime, tzid } => {
                Property::new(name, datetime.format(DATETIME_FORMAT).to_string())
                    .with_param("TZID", tzid)
            }
        }
    }

    /// The instant this time refers to.
    ///
    /// All-day dates start at midnight UTC and floating times are read as UTC.
    /// TZIDs that aren't IANA names are treated like floating times. Returns
    /// `None` for local times that don't exist (DST gaps).
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            EventTime::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            EventTime::DateTimeUtc(dt) => Some(*dt),
            EventTime::DateTimeFloating(dt) => Some(dt.and_utc()),
            EventTime::DateTimeZoned { datetime, tzid } => match tzid.parse::<Tz>() {
                Ok(tz) => tz
                    .from_local_datetime(datetime)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc)),
                Err(_) => {
                    tracing::debug!(tzid = %tzid, "unknown timezone, reading as UTC");
                    Some(datetime.and_utc())
                }
            },
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Shift by `delta`, keeping the representation where possible.
    ///
    /// All-day dates stay dates when shifted by whole days and become UTC
    /// date-times otherwise.
    pub fn shifted(&self, delta: TimeDelta) -> EventTime {
        match self {
            EventTime::Date(d) if delta.num_seconds() % 86_400 == 0 => d
                .checked_add_signed(delta)
                .map(EventTime::Date)
                .unwrap_or_else(|| self.clone()),
            EventTime::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .and_then(|dt| dt.checked_add_signed(delta))
                .map(|dt| EventTime::DateTimeUtc(dt.and_utc()))
                .unwrap_or_else(|| self.clone()),
            EventTime::DateTimeUtc(dt) => dt
                .checked_add_signed(delta)
                .map(EventTime::DateTimeUtc)
                .unwrap_or_else(|| self.clone()),
            EventTime::DateTimeFloating(dt) => dt
                .checked_add_signed(delta)
                .map(EventTime::DateTimeFloating)
                .unwrap_or_else(|| self.clone()),
            EventTime::DateTimeZoned { datetime, tzid } => datetime
                .checked_add_signed(delta)
                .map(|datetime| EventTime::DateTimeZoned {
                    datetime,
                    tzid: tzid.clone(),
                })
                .unwrap_or_else(|| self.clone()),
        }
    }
}

impl From<DateTime<Utc>> for EventTime {
    fn from(dt: DateTime<Utc>) -> Self {
        EventTime::DateTimeUtc(dt)
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%d. %b %Y")),
            EventTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%a %d. %b %Y, %H:%M")),
            EventTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%a %d. %b %Y, %H:%M")),
            EventTime::DateTimeZoned { datetime, .. } => {
                write!(f, "{}", datetime.format("%a %d. %b %Y, %H:%M"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zoned_time_converts_through_tz_database() {
        let prop = Property::new("DTSTART", "20240110T100000").with_param("TZID", "Europe/Berlin");
        let time = EventTime::from_property(&prop).expect("Should parse");

        assert!(matches!(time, EventTime::DateTimeZoned { .. }));
        assert_eq!(
            time.to_utc(),
            Some(Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_date_without_value_parameter() {
        let prop = Property::new("DTSTART", "20240110");
        assert_eq!(
            EventTime::from_property(&prop),
            Some(EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()))
        );
    }

    #[test]
    fn test_unknown_tzid_reads_as_utc() {
        let prop = Property::new("DTSTART", "20240110T100000")
            .with_param("TZID", "W. Europe Standard Time");
        let time = EventTime::from_property(&prop).unwrap();
        assert_eq!(
            time.to_utc(),
            Some(Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_shift_keeps_all_day_dates_for_whole_days() {
        let date = EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert_eq!(
            date.shifted(TimeDelta::days(2)),
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 12).unwrap())
        );
        assert_eq!(
            date.shifted(TimeDelta::hours(3)),
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 10, 3, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_to_property_roundtrip_preserves_tzid() {
        let time = EventTime::DateTimeZoned {
            datetime: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
            tzid: "America/New_York".to_string(),
        };
        let prop = time.to_property("DTEND");
        assert_eq!(prop.value, "20240301T083000");
        assert_eq!(prop.param("TZID"), Some("America/New_York"));
        assert_eq!(EventTime::from_property(&prop), Some(time));
    }
}
