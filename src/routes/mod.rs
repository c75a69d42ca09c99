pub mod api;
pub mod notifier;
pub mod profiles;

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use ical_relay_core::RelayError;
use serde::Serialize;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(profiles::router())
        .merge(api::router())
        .merge(notifier::router())
        .with_state(state)
}

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Convert anyhow errors to HTTP responses
pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<RelayError>() {
            Some(RelayError::ProfileNotFound(_) | RelayError::NotifierNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Some(RelayError::Unauthorized) => StatusCode::UNAUTHORIZED,
            Some(e) if e.is_configuration() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// The token in the Authorization header, with or without a `Bearer` prefix.
pub fn token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// Require a super token.
pub fn require_super(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    match token(headers) {
        Some(t) if state.is_super_token(t) => Ok(()),
        _ => {
            tracing::warn!("authorization not successful");
            Err(RelayError::Unauthorized.into())
        }
    }
}

/// Require a token of profile `name` or a super token.
pub async fn require_profile_token(
    state: &AppState,
    headers: &HeaderMap,
    name: &str,
) -> Result<(), AppError> {
    let profile = state.store().profile(name).await?;
    match token(headers) {
        Some(t) if profile.accepts_token(t) || state.is_super_token(t) => Ok(()),
        _ => {
            tracing::warn!(profile = %name, "authorization not successful");
            Err(RelayError::Unauthorized.into())
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use axum::response::Response;
    use ical_relay_core::modules::Registry;
    use ical_relay_core::{Fetcher, FileStore, Relay, RelayConfig, RelayData};
    use tempfile::TempDir;

    use crate::state::AppState;

    pub const SUPER: &str = "root-token";

    pub const DATA: &str = r#"
[profiles.team]
sources = ["base64://QkVHSU46VkNBTEVOREFSDQpWRVJTSU9OOjIuMA0KUFJPRElEOlRFU1QNCkJFR0lOOlZFVkVOVA0KVUlEOnVpZDENClNVTU1BUlk6VGVhbSBTeW5jDQpEVFNUQVJUOjIwMjQwMTEwVDEwMDAwMFoNCkRURU5EOjIwMjQwMTEwVDExMDAwMFoNCkVORDpWRVZFTlQNCkJFR0lOOlZFVkVOVA0KVUlEOnVpZDINClNVTU1BUlk6Q2FuY2VsbGVkOiBSZXRybw0KRFRTVEFSVDoyMDI0MDExMVQxMDAwMDBaDQpEVEVORDoyMDI0MDExMVQxMTAwMDBaDQpFTkQ6VkVWRU5UDQpFTkQ6VkNBTEVOREFSDQo="]
public = true
admin-tokens = [{ token = "team-token" }]

[profiles.hidden]
sources = ["profile://team"]

[notifiers.team]
source = "profile://team"
recipients = ["a@example.com"]
"#;

    pub fn state() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let data: RelayData = toml::from_str(DATA).unwrap();
        let relay = Arc::new(Relay::new(
            Arc::new(FileStore::in_memory(data)),
            Registry::builtin(),
            Fetcher::new(Duration::from_secs(5)).unwrap(),
            dir.path().to_path_buf(),
        ));
        let mut config = RelayConfig::default();
        config.server.url = "https://cal.example.com".into();
        config.server.super_tokens = vec![SUPER.into()];
        (dir, AppState::with_relay(config, relay))
    }

    pub async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    pub fn json(builder: axum::http::request::Builder, body: &str) -> Request<Body> {
        builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}
