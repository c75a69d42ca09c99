//! Unsubscribe links from notification mails

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/notifier/{id}/unsubscribe", get(unsubscribe))
}

#[derive(Deserialize)]
pub struct UnsubscribeQuery {
    pub mail: String,
}

/// GET /notifier/{id}/unsubscribe?mail=<address>
async fn unsubscribe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UnsubscribeQuery>,
) -> Result<String, AppError> {
    state.store().remove_recipient(&id, &query.mail).await?;
    tracing::info!(notifier = %id, recipient = %query.mail, "unsubscribed");
    Ok(format!("Unsubscribed {} from {}\n", query.mail, id))
}
