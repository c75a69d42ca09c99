//! Management API

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use ical_relay_core::calendar::{DESCRIPTION, DTSTAMP, LOCATION, SUMMARY};
use ical_relay_core::mailer::is_valid_address;
use ical_relay_core::{Calendar, Event, EventTime, ModuleSpec, RelayError, Rule, Source, Token};
use serde::{Deserialize, Serialize};

use crate::routes::{AppError, require_profile_token, require_super};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/calendars", get(list_calendars))
        .route(
            "/api/profiles/{name}/rules",
            get(list_rules).post(add_rule).delete(remove_rule),
        )
        .route(
            "/api/profiles/{name}/calendar-entry",
            post(edit_entry).delete(delete_entry),
        )
        .route("/api/profiles/{name}/newentryjson", post(new_entry))
        .route("/api/profiles/{name}/sources", post(add_source))
        .route("/api/profiles/{name}/tokens", post(create_token))
        .route("/api/profiles/{name}/check-auth", get(check_auth))
        .route("/api/check-super-auth", get(check_super_auth))
        .route(
            "/api/notifier/{id}/recipient",
            post(add_recipient).delete(remove_recipient),
        )
}

/// Public calendar info returned by API
#[derive(Serialize)]
pub struct CalendarInfo {
    pub name: String,
    pub ical: String,
}

/// GET /api/calendars - List public profiles
async fn list_calendars(State(state): State<AppState>) -> Json<Vec<CalendarInfo>> {
    let calendars = state
        .store()
        .public_profile_names()
        .await
        .into_iter()
        .map(|name| CalendarInfo {
            ical: state.profile_url(&name),
            name,
        })
        .collect();
    Json(calendars)
}

/// GET /api/profiles/{name}/rules
async fn list_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Vec<Rule>>, AppError> {
    require_profile_token(&state, &headers, &name).await?;
    Ok(Json(state.store().profile(&name).await?.rules))
}

/// POST /api/profiles/{name}/rules - Validate and append a rule
async fn add_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(rule): Json<Rule>,
) -> Result<StatusCode, AppError> {
    require_profile_token(&state, &headers, &name).await?;
    rule.compile(state.relay.registry())?;

    state.store().add_rule(&name, rule).await?;
    tracing::info!(profile = %name, "rule added");
    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
pub struct RuleIndex {
    pub id: usize,
}

/// DELETE /api/profiles/{name}/rules?id=<index>
async fn remove_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(index): Query<RuleIndex>,
) -> Result<Json<Rule>, AppError> {
    require_profile_token(&state, &headers, &name).await?;

    let rule = state.store().remove_rule(&name, index.id).await?;
    tracing::info!(profile = %name, index = index.id, "rule removed");
    Ok(Json(rule))
}

#[derive(Deserialize)]
pub struct EntryQuery {
    pub id: String,
}

/// Replacement values for a single event; absent fields stay as they are.
#[derive(Deserialize)]
pub struct EntryEdit {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Validate `rule` and append it to the profile's rules.
async fn append_rule(state: &AppState, name: &str, rule: Rule) -> Result<Rule, AppError> {
    rule.compile(state.relay.registry())?;
    state.store().add_rule(name, rule.clone()).await?;
    Ok(rule)
}

/// POST /api/profiles/{name}/calendar-entry?id=<uid> - Edit one event by UID
async fn edit_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(entry): Query<EntryQuery>,
    Json(edit): Json<EntryEdit>,
) -> Result<(StatusCode, Json<Rule>), AppError> {
    require_profile_token(&state, &headers, &name).await?;

    let mut action = ModuleSpec::new("edit").with("overwrite", "true");
    for (param, value) in [
        ("new-summary", edit.summary),
        ("new-description", edit.description),
        ("new-location", edit.location),
        ("new-start", edit.start),
        ("new-end", edit.end),
    ] {
        if let Some(value) = value {
            action = action.with(param, &value);
        }
    }
    let rule = Rule::new(vec![ModuleSpec::new("id").with("id", &entry.id)], action);

    let rule = append_rule(&state, &name, rule).await?;
    tracing::info!(profile = %name, uid = %entry.id, "entry edit rule added");
    Ok((StatusCode::CREATED, Json(rule)))
}

/// DELETE /api/profiles/{name}/calendar-entry?id=<uid> - Hide one event by UID
async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(entry): Query<EntryQuery>,
) -> Result<Json<Rule>, AppError> {
    require_profile_token(&state, &headers, &name).await?;

    let rule = Rule::new(
        vec![ModuleSpec::new("id").with("id", &entry.id)],
        ModuleSpec::new("delete"),
    );
    let rule = append_rule(&state, &name, rule).await?;
    tracing::info!(profile = %name, uid = %entry.id, "entry delete rule added");
    Ok(Json(rule))
}

/// A new event, added to a profile as an inline source.
#[derive(Deserialize)]
pub struct NewEntry {
    #[serde(default)]
    pub uid: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct NewEntryResponse {
    pub uid: String,
}

impl NewEntry {
    fn into_calendar(self, now: DateTime<Utc>) -> Result<(String, Calendar), RelayError> {
        if self.end < self.start {
            return Err(RelayError::InvalidParameter {
                name: "end".into(),
                reason: "the event ends before it starts".into(),
            });
        }

        let uid = self
            .uid
            .filter(|uid| !uid.is_empty())
            .unwrap_or_else(|| format!("{}@ical-relay", uuid::Uuid::new_v4()));
        let mut event = Event::new(&uid);
        event.set_property(EventTime::DateTimeUtc(now).to_property(DTSTAMP));
        event.set_text(SUMMARY, &self.summary);
        if let Some(description) = &self.description {
            event.set_text(DESCRIPTION, description);
        }
        if let Some(location) = &self.location {
            event.set_text(LOCATION, location);
        }
        event.set_start(&EventTime::DateTimeUtc(self.start));
        event.set_end(&EventTime::DateTimeUtc(self.end));

        let mut calendar = Calendar::new();
        calendar.push_event(event);
        Ok((uid, calendar))
    }
}

/// POST /api/profiles/{name}/newentryjson - Add an event as a `base64://` source
async fn new_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(entry): Json<NewEntry>,
) -> Result<(StatusCode, Json<NewEntryResponse>), AppError> {
    require_profile_token(&state, &headers, &name).await?;

    let (uid, calendar) = entry.into_calendar(Utc::now())?;
    state
        .store()
        .add_source(&name, &Source::inline_descriptor(&calendar))
        .await?;
    tracing::info!(profile = %name, uid = %uid, "entry added");
    Ok((StatusCode::CREATED, Json(NewEntryResponse { uid })))
}

/// GET /api/profiles/{name}/check-auth
async fn check_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<&'static str, AppError> {
    require_profile_token(&state, &headers, &name).await?;
    Ok("Authorized\n")
}

/// GET /api/check-super-auth
async fn check_super_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<&'static str, AppError> {
    require_super(&state, &headers)?;
    Ok("Authorized\n")
}

#[derive(Deserialize)]
pub struct SourceRequest {
    pub source: String,
}

/// POST /api/profiles/{name}/sources
async fn add_source(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<SourceRequest>,
) -> Result<StatusCode, AppError> {
    require_profile_token(&state, &headers, &name).await?;
    req.source.parse::<Source>()?;

    state.store().add_source(&name, &req.source).await?;
    tracing::info!(profile = %name, "source added");
    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/profiles/{name}/tokens - Create a profile token
async fn create_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<TokenRequest>,
) -> Result<(StatusCode, Json<Token>), AppError> {
    require_super(&state, &headers)?;

    let token = state.store().create_token(&name, req.note).await?;
    tracing::info!(profile = %name, "token created");
    Ok((StatusCode::CREATED, Json(token)))
}

#[derive(Deserialize)]
pub struct RecipientRequest {
    pub mail: String,
}

fn check_mail(mail: &str) -> Result<(), AppError> {
    if is_valid_address(mail) {
        Ok(())
    } else {
        Err(RelayError::InvalidParameter {
            name: "mail".into(),
            reason: format!("'{}' is not a mail address", mail.escape_debug()),
        }
        .into())
    }
}

/// POST /api/notifier/{id}/recipient
async fn add_recipient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RecipientRequest>,
) -> Result<StatusCode, AppError> {
    require_super(&state, &headers)?;
    check_mail(&req.mail)?;

    state.store().add_recipient(&id, &req.mail).await?;
    tracing::info!(notifier = %id, recipient = %req.mail, "recipient added");
    Ok(StatusCode::OK)
}

/// DELETE /api/notifier/{id}/recipient
async fn remove_recipient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RecipientRequest>,
) -> Result<StatusCode, AppError> {
    require_super(&state, &headers)?;

    state.store().remove_recipient(&id, &req.mail).await?;
    tracing::info!(notifier = %id, recipient = %req.mail, "recipient removed");
    Ok(StatusCode::OK)
}
