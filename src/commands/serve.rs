use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use ical_relay_core::{ProfileStore, RelayConfig};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::routes;
use crate::state::AppState;

/// Serve feeds and the API, run notifiers and the expiry sweep.
pub async fn run(config: RelayConfig) -> Result<()> {
    let cleanup_interval = config.cleanup_interval()?;
    let state = AppState::new(config).await?;

    let mut tasks = state.notifier.spawn_all().await;
    tasks.push(spawn_expiry_sweep(state.store().clone(), cleanup_interval));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::router(state.clone()).layer(cors);

    let addr = &state.config.server.addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, url = %state.config.server.url, "ical-relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    for task in tasks {
        task.abort();
    }
    Ok(())
}

/// Periodically drop rules whose expiry has passed.
fn spawn_expiry_sweep(store: Arc<dyn ProfileStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.remove_expired_rules(Utc::now()).await {
                Ok(0) => tracing::debug!("no expired rules"),
                Ok(removed) => tracing::info!(removed, "removed expired rules"),
                Err(e) => tracing::error!(error = %e, "failed to remove expired rules"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ical_relay_core::{FileStore, RelayData};

    #[tokio::test]
    async fn test_expiry_sweep_removes_expired_rules() {
        let data: RelayData = toml::from_str(
            r#"
[[profiles.team.rules]]
filters = [{ type = "all" }]
action = { type = "delete" }
expiry = "2020-01-01T00:00:00Z"

[[profiles.team.rules]]
filters = [{ type = "all" }]
action = { type = "delete" }
"#,
        )
        .unwrap();
        let store: Arc<dyn ProfileStore> = Arc::new(FileStore::in_memory(data));

        let sweep = spawn_expiry_sweep(store.clone(), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweep.abort();

        assert_eq!(store.profile("team").await.unwrap().rules.len(), 1);
    }
}
