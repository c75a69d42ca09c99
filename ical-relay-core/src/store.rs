//! Profile and notifier definitions, and where they're kept.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{RelayError, RelayResult};
use crate::rule::Rule;

/// A named relay endpoint: sources, rules and access settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Profile {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub immutable_past: bool,
    #[serde(default)]
    pub admin_tokens: Vec<Token>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Profile {
    pub fn accepts_token(&self, token: &str) -> bool {
        self.admin_tokens.iter().any(|t| t.token == token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_interval() -> String {
    "15m".to_string()
}

/// A calendar watched for changes, and who to tell about them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub source: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Contents of the data file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayData {
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub notifiers: BTreeMap<String, NotifierConfig>,
}

/// Storage for profiles and notifiers.
///
/// Reads return owned copies, so a render works on a consistent view even
/// while the store is modified.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile_names(&self) -> Vec<String>;
    async fn public_profile_names(&self) -> Vec<String>;
    async fn profile_exists(&self, name: &str) -> bool;
    async fn profile(&self, name: &str) -> RelayResult<Profile>;
    async fn add_rule(&self, name: &str, rule: Rule) -> RelayResult<()>;
    /// Remove the rule at `index`, returning it.
    async fn remove_rule(&self, name: &str, index: usize) -> RelayResult<Rule>;
    async fn add_source(&self, name: &str, source: &str) -> RelayResult<()>;
    async fn create_token(&self, name: &str, note: Option<String>) -> RelayResult<Token>;
    /// Drop every rule whose expiry lies before `now`; returns how many went.
    async fn remove_expired_rules(&self, now: DateTime<Utc>) -> RelayResult<usize>;
    async fn notifier_names(&self) -> Vec<String>;
    async fn notifier(&self, id: &str) -> RelayResult<NotifierConfig>;
    async fn add_recipient(&self, id: &str, mail: &str) -> RelayResult<()>;
    async fn remove_recipient(&self, id: &str, mail: &str) -> RelayResult<()>;
}

/// [`ProfileStore`] backed by a TOML file, rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: Option<PathBuf>,
    data: RwLock<RelayData>,
}

impl FileStore {
    /// Open the data file, starting empty if it doesn't exist yet.
    pub fn open(path: &Path) -> RelayResult<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| {
                RelayError::Config(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            tracing::info!(path = %path.display(), "data file not found, starting empty");
            RelayData::default()
        };

        Ok(FileStore {
            path: Some(path.to_path_buf()),
            data: RwLock::new(data),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory(data: RelayData) -> Self {
        FileStore {
            path: None,
            data: RwLock::new(data),
        }
    }

    pub async fn snapshot(&self) -> RelayData {
        self.data.read().await.clone()
    }

    async fn persist(&self, data: &RelayData) -> RelayResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content =
            toml::to_string_pretty(data).map_err(|e| RelayError::Serialization(e.to_string()))?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let temp = path.with_extension("toml.tmp");
        tokio::fs::write(&temp, content).await?;
        tokio::fs::rename(&temp, path).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the data, persist it, then publish it.
    async fn modify<T: Send>(
        &self,
        change: impl FnOnce(&mut RelayData) -> RelayResult<T> + Send,
    ) -> RelayResult<T> {
        let mut data = self.data.write().await;
        let mut updated = data.clone();
        let result = change(&mut updated)?;
        self.persist(&updated).await?;
        *data = updated;
        Ok(result)
    }
}

fn profile_mut<'a>(data: &'a mut RelayData, name: &str) -> RelayResult<&'a mut Profile> {
    data.profiles
        .get_mut(name)
        .ok_or_else(|| RelayError::ProfileNotFound(name.to_string()))
}

fn notifier_mut<'a>(data: &'a mut RelayData, id: &str) -> RelayResult<&'a mut NotifierConfig> {
    data.notifiers
        .get_mut(id)
        .ok_or_else(|| RelayError::NotifierNotFound(id.to_string()))
}

#[async_trait]
impl ProfileStore for FileStore {
    async fn profile_names(&self) -> Vec<String> {
        self.data.read().await.profiles.keys().cloned().collect()
    }

    async fn public_profile_names(&self) -> Vec<String> {
        self.data
            .read()
            .await
            .profiles
            .iter()
            .filter(|(_, p)| p.public)
            .map(|(name, _)| name.clone())
            .collect()
    }

    async fn profile_exists(&self, name: &str) -> bool {
        self.data.read().await.profiles.contains_key(name)
    }

    async fn profile(&self, name: &str) -> RelayResult<Profile> {
        self.data
            .read()
            .await
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| RelayError::ProfileNotFound(name.to_string()))
    }

    async fn add_rule(&self, name: &str, rule: Rule) -> RelayResult<()> {
        self.modify(|data| {
            profile_mut(data, name)?.rules.push(rule);
            Ok(())
        })
        .await
    }

    async fn remove_rule(&self, name: &str, index: usize) -> RelayResult<Rule> {
        self.modify(|data| {
            let profile = profile_mut(data, name)?;
            if index >= profile.rules.len() {
                return Err(RelayError::invalid_param(
                    "id",
                    format!("profile has {} rules", profile.rules.len()),
                ));
            }
            Ok(profile.rules.remove(index))
        })
        .await
    }

    async fn add_source(&self, name: &str, source: &str) -> RelayResult<()> {
        self.modify(|data| {
            profile_mut(data, name)?.sources.push(source.to_string());
            Ok(())
        })
        .await
    }

    async fn create_token(&self, name: &str, note: Option<String>) -> RelayResult<Token> {
        let token = Token {
            token: uuid::Uuid::new_v4().to_string(),
            note,
        };
        self.modify(|data| {
            profile_mut(data, name)?.admin_tokens.push(token.clone());
            Ok(())
        })
        .await?;
        Ok(token)
    }

    async fn remove_expired_rules(&self, now: DateTime<Utc>) -> RelayResult<usize> {
        let expired = {
            let data = self.data.read().await;
            data.profiles
                .values()
                .flat_map(|p| &p.rules)
                .filter(|r| r.is_expired(now))
                .count()
        };
        if expired == 0 {
            return Ok(0);
        }

        self.modify(|data| {
            let mut removed = 0;
            for (name, profile) in data.profiles.iter_mut() {
                let before = profile.rules.len();
                profile.rules.retain(|r| !r.is_expired(now));
                let gone = before - profile.rules.len();
                if gone > 0 {
                    tracing::info!(profile = %name, removed = gone, "removed expired rules");
                }
                removed += gone;
            }
            Ok(removed)
        })
        .await
    }

    async fn notifier_names(&self) -> Vec<String> {
        self.data.read().await.notifiers.keys().cloned().collect()
    }

    async fn notifier(&self, id: &str) -> RelayResult<NotifierConfig> {
        self.data
            .read()
            .await
            .notifiers
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::NotifierNotFound(id.to_string()))
    }

    async fn add_recipient(&self, id: &str, mail: &str) -> RelayResult<()> {
        self.modify(|data| {
            let notifier = notifier_mut(data, id)?;
            if !notifier.recipients.iter().any(|r| r == mail) {
                notifier.recipients.push(mail.to_string());
            }
            Ok(())
        })
        .await
    }

    async fn remove_recipient(&self, id: &str, mail: &str) -> RelayResult<()> {
        self.modify(|data| {
            notifier_mut(data, id)?.recipients.retain(|r| r != mail);
            Ok(())
        })
        .await
    }
}
