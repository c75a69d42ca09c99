//! ICS parsing and generation.
//!
//! This module handles reading and writing .ics data according to RFC 5545.

mod generate;
mod parse;

pub use generate::generate_calendar;
pub use parse::{parse_calendar, parse_calendar_bytes};

use std::path::Path;

use crate::calendar::Calendar;
use crate::error::RelayResult;

/// Read and parse a .ics file. `Ok(None)` if it doesn't exist.
pub async fn load_calendar_file(path: &Path) -> RelayResult<Option<Calendar>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => parse_calendar_bytes(&bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a calendar atomically (temp file + rename).
pub async fn write_calendar_file(calendar: &Calendar, path: &Path) -> RelayResult<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let temp = path.with_extension("ics.tmp");
    tokio::fs::write(&temp, generate_calendar(calendar)).await?;
    tokio::fs::rename(&temp, path).await?;
    Ok(())
}
