//! Core of ical-relay.
//!
//! - [`calendar`] and [`ics`]: the calendar model and its .ics codec
//! - [`modules`] and [`rule`]: filters, actions and the rules combining them
//! - [`pipeline`]: renders profiles from their sources
//! - [`diff`] and [`notifier`]: change detection and mail digests
//! - [`store`] and [`config`]: persisted profiles and server settings

pub mod calendar;
pub mod config;
pub mod diff;
pub mod duration;
pub mod error;
pub mod ics;
pub mod mailer;
pub mod modules;
pub mod notifier;
pub mod pipeline;
pub mod rule;
pub mod source;
pub mod store;

pub use calendar::{Calendar, Event, EventTime};
pub use config::RelayConfig;
pub use diff::{CalendarDiff, DiffKind};
pub use error::{RelayError, RelayResult};
pub use mailer::{Mail, Mailer, OutboxMailer};
pub use modules::{ModuleSpec, Registry};
pub use notifier::{CycleOutcome, Notifier};
pub use pipeline::Relay;
pub use rule::Rule;
pub use source::{Fetcher, Source};
pub use store::{FileStore, NotifierConfig, Profile, ProfileStore, RelayData, Token};
