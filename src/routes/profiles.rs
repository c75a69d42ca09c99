//! Calendar feeds

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use ical_relay_core::ics::generate_calendar;
use ical_relay_core::{Calendar, RelayError, RelayResult, Rule};
use serde_json::{Value, json};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/profiles/{name}", get(profile_feed))
        .route("/profiles-combi/{names}", get(combined_feed))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /profiles/{name}?reminder=15M
async fn profile_feed(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    tracing::info!(profile = %name, "feed requested");
    let extra: Vec<Rule> = query
        .get("reminder")
        .filter(|time| !time.is_empty())
        .map(|time| Rule::reminder(time))
        .into_iter()
        .collect();
    for rule in &extra {
        rule.compile(state.relay.registry())?;
    }

    let result = state.relay.render_with_rules(&name, &extra).await;
    feed_response(&name, result)
}

/// GET /profiles-combi/{a+b+c}
async fn combined_feed(
    State(state): State<AppState>,
    Path(names): Path<String>,
) -> Result<Response, AppError> {
    tracing::info!(profiles = %names, "combined feed requested");
    let parts: Vec<&str> = names.split('+').filter(|n| !n.is_empty()).collect();

    let result = state.relay.render_combined(&parts).await;
    feed_response(&parts.join("+"), result)
}

/// Serve a rendered calendar. Unknown profiles are 404; any other failure is
/// a 500 with the error text, never a partial calendar.
fn feed_response(name: &str, result: RelayResult<Calendar>) -> Result<Response, AppError> {
    let calendar = match result {
        Ok(calendar) => calendar,
        Err(e @ RelayError::ProfileNotFound(_)) => return Err(e.into()),
        Err(e) => {
            tracing::error!(profile = %name, error = %e, "failed to render feed");
            return Ok((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response());
        }
    };

    let headers = [
        (
            header::CONTENT_TYPE,
            "text/calendar; charset=utf-8".to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={name}.ics"),
        ),
    ];
    Ok((headers, generate_calendar(&calendar)).into_response())
}
