use std::sync::Arc;

use anyhow::Result;
use ical_relay_core::config::OUTBOX_DIR;
use ical_relay_core::{FileStore, Notifier, OutboxMailer, ProfileStore, Relay, RelayConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub notifier: Arc<Notifier>,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    /// Open the data file and wire up the relay and the outbox notifier.
    pub async fn new(config: RelayConfig) -> Result<Self> {
        config.prepare_storage()?;
        let store = Arc::new(FileStore::open(&config.data_file())?);
        let relay = Arc::new(Relay::from_config(&config, store)?);
        warn_invalid_rules(&relay).await;
        Ok(Self::with_relay(config, relay))
    }

    pub fn with_relay(config: RelayConfig, relay: Arc<Relay>) -> Self {
        let mailer = Arc::new(OutboxMailer::new(relay.storage_path().join(OUTBOX_DIR)));
        let notifier = Arc::new(Notifier::new(
            relay.clone(),
            mailer,
            config.mail.sender.clone(),
            config.server.url.clone(),
        ));
        AppState {
            relay,
            notifier,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        self.relay.store()
    }

    pub fn is_super_token(&self, token: &str) -> bool {
        self.config.server.super_tokens.iter().any(|t| t == token)
    }

    /// Public URL of a profile feed.
    pub fn profile_url(&self, name: &str) -> String {
        format!(
            "{}/profiles/{}",
            self.config.server.url.trim_end_matches('/'),
            name
        )
    }
}

/// Stored rules that no longer compile make their profile fail to render.
async fn warn_invalid_rules(relay: &Relay) {
    let store = relay.store();
    for name in store.profile_names().await {
        let Ok(profile) = store.profile(&name).await else {
            continue;
        };
        for (index, rule) in profile.rules.iter().enumerate() {
            if let Err(e) = rule.compile(relay.registry()) {
                tracing::warn!(profile = %name, rule = index, error = %e, "invalid rule");
            }
        }
    }
}
