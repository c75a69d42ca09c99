//! Change notifications: diff a calendar against its last snapshot and mail
//! the result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::task::JoinHandle;

use crate::calendar::{DESCRIPTION, Event, EventTime, LOCATION};
use crate::config::NOTIFYSTORE_DIR;
use crate::diff::CalendarDiff;
use crate::duration::parse_duration;
use crate::error::{RelayError, RelayResult};
use crate::ics::{load_calendar_file, write_calendar_file};
use crate::mailer::{Mail, Mailer};
use crate::pipeline::Relay;
use crate::store::NotifierConfig;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// What a notifier cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No snapshot existed; the current state was saved.
    Bootstrapped,
    Unchanged,
    Notified { recipients: usize },
}

pub struct Notifier {
    relay: Arc<Relay>,
    mailer: Arc<dyn Mailer>,
    sender: String,
    public_url: String,
}

impl Notifier {
    pub fn new(
        relay: Arc<Relay>,
        mailer: Arc<dyn Mailer>,
        sender: impl Into<String>,
        public_url: impl Into<String>,
    ) -> Self {
        Notifier {
            relay,
            mailer,
            sender: sender.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        self.relay
            .storage_path()
            .join(NOTIFYSTORE_DIR)
            .join(format!("{id}.ics"))
    }

    pub fn unsubscribe_url(&self, id: &str, recipient: &str) -> String {
        format!(
            "{}/notifier/{}/unsubscribe?mail={}",
            self.public_url,
            encode(id),
            encode(recipient)
        )
    }

    /// Run one cycle for notifier `id`.
    ///
    /// Every recipient is tried even if an earlier one fails; failures are
    /// reported together afterwards. The snapshot is updated whenever a diff
    /// was computed.
    pub async fn run_cycle(&self, id: &str) -> RelayResult<CycleOutcome> {
        let config = self.relay.store().notifier(id).await?;
        let current = self.relay.resolve(&config.source).await?;
        let path = self.snapshot_path(id);

        let Some(previous) = load_calendar_file(&path).await? else {
            tracing::info!(notifier = %id, "no snapshot yet, saving current state");
            write_calendar_file(&current, &path).await?;
            return Ok(CycleOutcome::Bootstrapped);
        };

        let diff = CalendarDiff::compare(&previous, &current);
        if diff.is_empty() {
            tracing::info!(notifier = %id, "no changes detected");
            return Ok(CycleOutcome::Unchanged);
        }
        tracing::debug!(
            notifier = %id,
            added = diff.added().count(),
            deleted = diff.deleted().count(),
            changed = diff.changed().count(),
            "changes detected"
        );

        let body = digest(&diff);
        let mut failures = Vec::new();
        for recipient in &config.recipients {
            let mail = self.compose(id, recipient, &body);
            tracing::info!(notifier = %id, recipient = %recipient, "sending notification");
            if let Err(e) = self.mailer.send(&mail).await {
                tracing::error!(notifier = %id, recipient = %recipient, error = %e, "failed to send notification");
                failures.push(format!("{recipient}: {e}"));
            }
        }

        write_calendar_file(&current, &path).await?;

        if !failures.is_empty() {
            return Err(RelayError::Mail(failures.join("; ")));
        }
        Ok(CycleOutcome::Notified {
            recipients: config.recipients.len(),
        })
    }

    fn compose(&self, id: &str, recipient: &str, body: &str) -> Mail {
        let unsubscribe = self.unsubscribe_url(id, recipient);
        Mail {
            from: self.sender.clone(),
            to: recipient.to_string(),
            subject: format!("Calendar Notification for {id}"),
            headers: vec![("List-Unsubscribe".to_string(), format!("<{unsubscribe}>"))],
            body: format!("{body}\n\nUnsubscribe: {unsubscribe}"),
        }
    }

    /// Run `id` every `interval` until the task is aborted.
    pub fn spawn(self: &Arc<Self>, id: String, interval: Duration) -> JoinHandle<()> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            tracing::debug!(notifier = %id, ?interval, "notifier started");
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = notifier.run_cycle(&id).await {
                    tracing::error!(notifier = %id, error = %e, "notifier cycle failed");
                }
            }
        })
    }

    /// Start a loop for every configured notifier.
    pub async fn spawn_all(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        tracing::info!("starting notifiers");
        let store = self.relay.store();
        let mut handles = Vec::new();
        for id in store.notifier_names().await {
            let interval = match store.notifier(&id).await.and_then(|c| interval(&c)) {
                Ok(interval) => interval,
                Err(e) => {
                    tracing::warn!(notifier = %id, error = %e, "not starting notifier");
                    continue;
                }
            };
            handles.push(self.spawn(id, interval));
        }
        handles
    }
}

/// The configured interval, at least one second.
pub fn interval(config: &NotifierConfig) -> RelayResult<Duration> {
    let parsed = parse_duration(&config.interval)
        .and_then(|d| d.to_std().map_err(|e| e.to_string()))
        .map_err(|e| RelayError::invalid_param("interval", e))?;
    Ok(parsed.max(MIN_INTERVAL))
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Plain-text digest with one section per kind of change.
pub fn digest(diff: &CalendarDiff) -> String {
    let sections = [
        ("Added:\n\n", diff.added().collect::<Vec<_>>()),
        ("Deleted:\n\n", diff.deleted().collect()),
        ("Changed (displaying new version):\n\n", diff.changed().collect()),
    ];

    let mut body = String::new();
    for (header, events) in sections {
        if events.is_empty() {
            continue;
        }
        body.push_str(header);
        for event in events {
            body.push_str(&pretty_print(event));
            body.push('\n');
        }
    }
    body
}

/// Human-readable summary of an event.
///
/// ```text
/// Team Sync
/// Wed 10. Jan 2024, 10:00 - 11:00
/// Location: Room 1
/// ```
pub fn pretty_print(event: &Event) -> String {
    let mut out = format!("{}\n", event);

    match (event.start(), event.end()) {
        (Some(start), Some(end)) if start.is_all_day() || end.is_all_day() => {
            out.push_str(&format!("{start} - {end}\n"));
        }
        (Some(start), Some(end)) => {
            let end = wall_clock(&end)
                .map(|dt| dt.format("%H:%M").to_string())
                .unwrap_or_else(|| end.to_string());
            out.push_str(&format!("{start} - {end}\n"));
        }
        (Some(start), None) => out.push_str(&format!("{start}\n")),
        (None, _) => {}
    }

    if let Some(location) = event.text(LOCATION) {
        out.push_str(&format!("Location: {location}\n"));
    }
    if let Some(description) = event.text(DESCRIPTION) {
        out.push_str(&format!("Description: {description}\n"));
    }
    out
}

fn wall_clock(time: &EventTime) -> Option<NaiveDateTime> {
    match time {
        EventTime::Date(_) => None,
        EventTime::DateTimeUtc(dt) => Some(dt.naive_utc()),
        EventTime::DateTimeFloating(dt) => Some(*dt),
        EventTime::DateTimeZoned { datetime, .. } => Some(*datetime),
    }
}
