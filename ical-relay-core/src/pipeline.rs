//! Profile rendering: sources, rules, immutable past.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::calendar::Calendar;
use crate::config::{CALSTORE_DIR, RelayConfig};
use crate::error::{RelayError, RelayResult};
use crate::ics::{load_calendar_file, write_calendar_file};
use crate::modules::Registry;
use crate::rule::{Rule, run_rules};
use crate::source::{Fetcher, Source};
use crate::store::ProfileStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Renders profiles into calendars.
pub struct Relay {
    store: Arc<dyn ProfileStore>,
    registry: Registry,
    fetcher: Fetcher,
    storage_path: PathBuf,
    history_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Relay {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        registry: Registry,
        fetcher: Fetcher,
        storage_path: PathBuf,
    ) -> Self {
        Relay {
            store,
            registry,
            fetcher,
            storage_path,
            history_locks: Mutex::new(HashMap::new()),
        }
    }

    /// A relay with the built-in modules and the configured fetch timeout.
    pub fn from_config(config: &RelayConfig, store: Arc<dyn ProfileStore>) -> RelayResult<Self> {
        let fetcher = Fetcher::new(config.fetch_timeout()?)?;
        Ok(Relay::new(
            store,
            Registry::builtin(),
            fetcher,
            config.storage_path(),
        ))
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub async fn render(&self, name: &str) -> RelayResult<Calendar> {
        self.render_at(name, &[], Utc::now()).await
    }

    /// Render a profile, then run `extra` rules on the result.
    ///
    /// The extra rules only shape this response; they never reach the
    /// profile's history file.
    pub async fn render_with_rules(&self, name: &str, extra: &[Rule]) -> RelayResult<Calendar> {
        self.render_at(name, extra, Utc::now()).await
    }

    pub async fn render_at(
        &self,
        name: &str,
        extra: &[Rule],
        now: DateTime<Utc>,
    ) -> RelayResult<Calendar> {
        let mut calendar = self.render_chain(name, &[], now).await?;
        run_rules(&mut calendar, extra, &self.registry, now)?;
        Ok(calendar)
    }

    /// Render several profiles into one calendar. The first is the base,
    /// the others only contribute events.
    pub async fn render_combined(&self, names: &[&str]) -> RelayResult<Calendar> {
        let now = Utc::now();
        let mut combined: Option<Calendar> = None;
        for name in names {
            let calendar = self.render_chain(name, &[], now).await?;
            match combined.as_mut() {
                Some(base) => {
                    base.merge_events(calendar);
                }
                None => combined = Some(calendar),
            }
        }
        Ok(combined.unwrap_or_default())
    }

    /// Resolve a source descriptor, rendering it if it names a profile.
    pub async fn resolve(&self, descriptor: &str) -> RelayResult<Calendar> {
        let source: Source = descriptor.parse()?;
        self.resolve_source(&source, &[], Utc::now()).await
    }

    fn render_chain<'a>(
        &'a self,
        name: &'a str,
        chain: &'a [String],
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, RelayResult<Calendar>> {
        Box::pin(async move {
            let mut path = chain.to_vec();
            path.push(name.to_string());
            if chain.iter().any(|n| n == name) {
                return Err(RelayError::CyclicSource(path.join(" -> ")));
            }

            let profile = self.store.profile(name).await?;
            let mut calendar = self.merge_sources(&profile.sources, &path, now).await?;

            run_rules(&mut calendar, &profile.rules, &self.registry, now)?;

            if profile.immutable_past {
                calendar = self.apply_immutable_past(name, calendar, now).await?;
            }

            tracing::debug!(
                profile = %name,
                events = calendar.event_count(),
                "rendered profile"
            );
            Ok(calendar)
        })
    }

    async fn merge_sources(
        &self,
        sources: &[String],
        chain: &[String],
        now: DateTime<Utc>,
    ) -> RelayResult<Calendar> {
        let mut base: Option<Calendar> = None;
        for descriptor in sources {
            let source: Source = descriptor.parse()?;
            let calendar = self.resolve_source(&source, chain, now).await?;
            match base.as_mut() {
                Some(base) => {
                    let added = base.merge_events(calendar);
                    tracing::debug!(source = %source, added, "merged additional source");
                }
                None => {
                    tracing::debug!(source = %source, "loaded base calendar");
                    base = Some(calendar);
                }
            }
        }
        Ok(base.unwrap_or_default())
    }

    fn resolve_source<'a>(
        &'a self,
        source: &'a Source,
        chain: &'a [String],
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, RelayResult<Calendar>> {
        Box::pin(async move {
            match source {
                Source::Profile(name) => self.render_chain(name, chain, now).await,
                other => self.fetcher.fetch(other).await,
            }
        })
    }

    fn history_path(&self, name: &str) -> PathBuf {
        self.storage_path
            .join(CALSTORE_DIR)
            .join(format!("{name}-past.ics"))
    }

    async fn history_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.history_locks.lock().await;
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Replace past events of `live` by the ones recorded in the history file,
    /// then record the result as the new history.
    async fn apply_immutable_past(
        &self,
        name: &str,
        live: Calendar,
        now: DateTime<Utc>,
    ) -> RelayResult<Calendar> {
        let lock = self.history_lock(name).await;
        let _guard = lock.lock().await;

        let path = self.history_path(name);
        let mut history = match load_calendar_file(&path).await? {
            Some(history) => history,
            None => {
                tracing::info!(profile = %name, "history file does not exist, saving for the first time");
                live.clone()
            }
        };

        history.retain_events(|e| e.start_utc().is_some_and(|start| start < now));

        let mut merged = live;
        merged.retain_events(|e| e.start_utc().is_none_or(|start| start >= now));
        let restored = merged.merge_events(history);
        tracing::debug!(profile = %name, restored, "restored past events from history");

        write_calendar_file(&merged, &path).await?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Event, SUMMARY};
    use crate::ics::generate_calendar;
    use crate::modules::ModuleSpec;
    use crate::store::{FileStore, Profile, RelayData};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SOURCE_A: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VTIMEZONE\r\n\
TZID:Europe/Berlin\r\n\
END:VTIMEZONE\r\n\
BEGIN:VEVENT\r\n\
UID:uid1\r\n\
SUMMARY:Team Sync\r\n\
DTSTART:20240110T100000Z\r\n\
DTEND:20240110T110000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:uid2\r\n\
SUMMARY:Lunch\r\n\
DTSTART:20240110T120000Z\r\n\
DTEND:20240110T130000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    const SOURCE_B: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:OTHER\r\n\
X-WR-CALNAME:Other\r\n\
BEGIN:VEVENT\r\n\
UID:uid3\r\n\
SUMMARY:Review\r\n\
DTSTART:20240111T090000Z\r\n\
DTEND:20240111T100000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn base64_source(ics: &str) -> String {
        format!("base64://{}", STANDARD.encode(ics))
    }

    fn profile(sources: Vec<String>, rules: Vec<Rule>) -> Profile {
        Profile {
            sources,
            rules,
            ..Default::default()
        }
    }

    fn relay(profiles: Vec<(&str, Profile)>, storage: &Path) -> Relay {
        let data = RelayData {
            profiles: profiles
                .into_iter()
                .map(|(name, p)| (name.to_string(), p))
                .collect(),
            ..Default::default()
        };
        Relay::new(
            Arc::new(FileStore::in_memory(data)),
            Registry::builtin(),
            Fetcher::new(Duration::from_secs(5)).unwrap(),
            storage.to_path_buf(),
        )
    }

    fn uids(calendar: &Calendar) -> Vec<String> {
        calendar
            .events()
            .filter_map(|(_, e)| e.uid().map(String::from))
            .collect()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_regex_delete_scenario() {
        let dir = TempDir::new().unwrap();
        let rule = Rule::new(
            vec![ModuleSpec::new("regex").with("regex", "Lunch")],
            ModuleSpec::new("delete"),
        );
        let relay = relay(
            vec![("team", profile(vec![base64_source(SOURCE_A)], vec![rule]))],
            dir.path(),
        );

        let calendar = relay.render("team").await.unwrap();
        assert_eq!(uids(&calendar), vec!["uid1"]);
    }

    #[tokio::test]
    async fn test_reminder_scenario() {
        let dir = TempDir::new().unwrap();
        let rule = Rule::new(
            vec![ModuleSpec::new("all")],
            ModuleSpec::new("add-reminder").with("time", "15M"),
        );
        let relay = relay(
            vec![("team", profile(vec![base64_source(SOURCE_A)], vec![rule]))],
            dir.path(),
        );

        let calendar = relay.render("team").await.unwrap();
        for (_, event) in calendar.events() {
            let alarms: Vec<_> = event.alarms().collect();
            assert_eq!(alarms.len(), 1);
            assert_eq!(
                alarms[0].property("TRIGGER").map(|p| p.value.as_str()),
                Some("-PT15M")
            );
            assert_eq!(
                alarms[0].property("ACTION").map(|p| p.value.as_str()),
                Some("DISPLAY")
            );
        }
    }

    #[tokio::test]
    async fn test_sources_merge_in_order_keeping_base_metadata() {
        let dir = TempDir::new().unwrap();
        let relay = relay(
            vec![(
                "team",
                profile(vec![base64_source(SOURCE_A), base64_source(SOURCE_B)], vec![]),
            )],
            dir.path(),
        );

        let calendar = relay.render("team").await.unwrap();
        assert_eq!(uids(&calendar), vec!["uid1", "uid2", "uid3"]);
        assert_eq!(calendar.property("PRODID").map(|p| p.value.as_str()), Some("TEST"));
        assert!(calendar.property("X-WR-CALNAME").is_none());
        assert_eq!(calendar.components[0].name(), "VTIMEZONE");
    }

    #[tokio::test]
    async fn test_profile_without_sources_is_empty() {
        let dir = TempDir::new().unwrap();
        let relay = relay(vec![("empty", profile(vec![], vec![]))], dir.path());

        let calendar = relay.render("empty").await.unwrap();
        assert_eq!(calendar.event_count(), 0);
        assert!(calendar.property("VERSION").is_some());
    }

    #[tokio::test]
    async fn test_profile_source_and_missing_profile() {
        let dir = TempDir::new().unwrap();
        let relay = relay(
            vec![
                ("base", profile(vec![base64_source(SOURCE_A)], vec![])),
                ("derived", profile(vec!["profile://base".into()], vec![])),
                ("broken", profile(vec!["profile://nope".into()], vec![])),
            ],
            dir.path(),
        );

        assert_eq!(uids(&relay.render("derived").await.unwrap()), vec!["uid1", "uid2"]);
        assert!(matches!(
            relay.render("broken").await,
            Err(RelayError::ProfileNotFound(name)) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn test_cyclic_profiles_are_detected() {
        let dir = TempDir::new().unwrap();
        let relay = relay(
            vec![
                ("a", profile(vec!["profile://b".into()], vec![])),
                ("b", profile(vec!["profile://a".into()], vec![])),
                ("self", profile(vec!["profile://self".into()], vec![])),
            ],
            dir.path(),
        );

        match relay.render("a").await {
            Err(RelayError::CyclicSource(path)) => assert_eq!(path, "a -> b -> a"),
            other => panic!("expected a cycle error, got {other:?}"),
        }
        assert!(matches!(
            relay.render("self").await,
            Err(RelayError::CyclicSource(_))
        ));
    }

    #[tokio::test]
    async fn test_rule_error_fails_the_render() {
        let dir = TempDir::new().unwrap();
        let rule = Rule::new(vec![ModuleSpec::new("nope")], ModuleSpec::new("delete"));
        let relay = relay(
            vec![("team", profile(vec![base64_source(SOURCE_A)], vec![rule]))],
            dir.path(),
        );

        assert!(matches!(
            relay.render("team").await,
            Err(RelayError::UnknownFilter(_))
        ));
    }

    #[tokio::test]
    async fn test_http_failure_fails_the_render() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let relay = relay(
            vec![("team", profile(vec![format!("{}/cal.ics", server.uri())], vec![]))],
            dir.path(),
        );

        assert!(matches!(
            relay.render("team").await,
            Err(RelayError::HttpStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_extra_rules_apply_after_profile_rules() {
        let dir = TempDir::new().unwrap();
        let relay = relay(
            vec![("team", profile(vec![base64_source(SOURCE_A)], vec![]))],
            dir.path(),
        );
        let reminder = Rule::new(
            vec![ModuleSpec::new("all")],
            ModuleSpec::new("add-reminder").with("time", "1H"),
        );

        let calendar = relay.render_with_rules("team", &[reminder]).await.unwrap();
        assert!(calendar.events().all(|(_, e)| e.alarms().count() == 1));
    }

    #[tokio::test]
    async fn test_render_combined() {
        let dir = TempDir::new().unwrap();
        let relay = relay(
            vec![
                ("a", profile(vec![base64_source(SOURCE_A)], vec![])),
                ("b", profile(vec![base64_source(SOURCE_B)], vec![])),
            ],
            dir.path(),
        );

        let calendar = relay.render_combined(&["b", "a"]).await.unwrap();
        assert_eq!(uids(&calendar), vec!["uid3", "uid1", "uid2"]);
        assert_eq!(calendar.property("PRODID").map(|p| p.value.as_str()), Some("OTHER"));
    }

    fn file_profile(path: &Path) -> Profile {
        Profile {
            sources: vec![format!("file://{}", path.display())],
            immutable_past: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_immutable_past_keeps_removed_past_events() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.ics");
        std::fs::write(&source, SOURCE_A).unwrap();
        let relay = relay(vec![("team", file_profile(&source))], dir.path());

        // Between the two events: uid1 is past, uid2 is upcoming.
        let now = at(10, 11);
        let first = relay.render_at("team", &[], now).await.unwrap();
        assert_eq!(uids(&first), vec!["uid2", "uid1"]);
        assert!(dir.path().join("calstore/team-past.ics").exists());

        // Upstream drops the past event and renames it; the history wins.
        let rewritten = SOURCE_A
            .replace("UID:uid1\r\nSUMMARY:Team Sync", "UID:uid1\r\nSUMMARY:Renamed")
            .replace("UID:uid2", "UID:uid2b");
        std::fs::write(&source, rewritten).unwrap();

        let second = relay.render_at("team", &[], now).await.unwrap();
        assert_eq!(uids(&second), vec!["uid2b", "uid1"]);
        let (_, past) = second.events().find(|(_, e)| e.uid() == Some("uid1")).unwrap();
        assert_eq!(past.summary().as_deref(), Some("Team Sync"));
    }

    #[tokio::test]
    async fn test_immutable_past_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.ics");
        std::fs::write(&source, SOURCE_A).unwrap();
        let relay = relay(vec![("team", file_profile(&source))], dir.path());

        let now = at(10, 11);
        let first = generate_calendar(&relay.render_at("team", &[], now).await.unwrap());
        let second = generate_calendar(&relay.render_at("team", &[], now).await.unwrap());
        let third = generate_calendar(&relay.render_at("team", &[], now).await.unwrap());

        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[tokio::test]
    async fn test_immutable_past_history_follows_now() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.ics");
        std::fs::write(&source, SOURCE_A).unwrap();
        let relay = relay(vec![("team", file_profile(&source))], dir.path());

        relay.render_at("team", &[], at(10, 11)).await.unwrap();

        // Upstream drops uid2 and adds a later event.
        let mut upstream = crate::ics::parse_calendar(SOURCE_A).unwrap();
        upstream.retain_events(|e| e.uid() == Some("uid1"));
        let mut late = Event::new("uid9");
        late.set_text(SUMMARY, "Later");
        late.properties.push(crate::calendar::Property::new(
            crate::calendar::DTSTART,
            "20240112T100000Z",
        ));
        upstream.push_event(late);
        std::fs::write(&source, generate_calendar(&upstream)).unwrap();

        let calendar = relay.render_at("team", &[], at(11, 0)).await.unwrap();
        let mut ids = uids(&calendar);
        ids.sort();
        // uid2 was recorded while upcoming and has started since.
        assert_eq!(ids, vec!["uid1", "uid2", "uid9"]);
    }

    #[tokio::test]
    async fn test_concurrent_renders_of_same_profile() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.ics");
        std::fs::write(&source, SOURCE_A).unwrap();
        let relay = Arc::new(relay(vec![("team", file_profile(&source))], dir.path()));

        let now = at(10, 11);
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let relay = relay.clone();
                tokio::spawn(async move { relay.render_at("team", &[], now).await })
            })
            .collect();
        for task in tasks {
            let calendar = task.await.unwrap().unwrap();
            assert_eq!(calendar.event_count(), 2);
        }

        let history = load_calendar_file(&dir.path().join("calstore/team-past.ics"))
            .await
            .unwrap()
            .expect("Should have written history");
        assert_eq!(uids(&history), vec!["uid2", "uid1"]);
    }
}
