//! In-memory store of per-connection dynamic secrets configuration, gated
//! by a monotonically increasing `config_version`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DbType {
    Postgresql,
    Mysql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub role: String,
    pub username_template: String,
    pub creation_statement: String,
    pub renew_statement: Option<String>,
    pub revocation_statement: String,
    pub default_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicSecretsConfig {
    pub connection_id: String,
    pub db_type: DbType,
    pub dsn: String,
    pub max_pool_size: u32,
    pub config_version: u64,
    pub roles: Vec<RoleConfig>,
}

impl DynamicSecretsConfig {
    pub fn role(&self, role_id: &str) -> Option<&RoleConfig> {
        self.roles.iter().find(|r| r.role == role_id)
    }
}

/// Holds the latest config per connection, rejecting any push whose
/// `config_version` does not strictly exceed the one already stored.
#[derive(Default)]
pub struct ConfigStore {
    configs: RwLock<HashMap<String, DynamicSecretsConfig>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored config for `connection_id` if `config` is newer.
    /// Returns `true` if the push was accepted, `false` if it was a stale
    /// or duplicate version and was silently discarded.
    pub async fn push(&self, config: DynamicSecretsConfig) -> bool {
        let mut guard = self.configs.write().await;
        match guard.get(&config.connection_id) {
            Some(existing) if config.config_version <= existing.config_version => false,
            _ => {
                guard.insert(config.connection_id.clone(), config);
                true
            }
        }
    }

    pub async fn revoke(&self, connection_id: &str) -> bool {
        self.configs.write().await.remove(connection_id).is_some()
    }

    pub async fn get(&self, connection_id: &str) -> Option<DynamicSecretsConfig> {
        self.configs.read().await.get(connection_id).cloned()
    }

    pub async fn connection_ids(&self) -> Vec<String> {
        self.configs.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(connection_id: &str, version: u64) -> DynamicSecretsConfig {
        DynamicSecretsConfig {
            connection_id: connection_id.to_string(),
            db_type: DbType::Postgresql,
            dsn: "postgres://localhost/app".to_string(),
            max_pool_size: 5,
            config_version: version,
            roles: vec![],
        }
    }

    #[tokio::test]
    async fn a_newer_version_replaces_the_stored_config() {
        let store = ConfigStore::new();
        assert!(store.push(config("conn-1", 1)).await);
        assert!(store.push(config("conn-1", 2)).await);
        assert_eq!(store.get("conn-1").await.unwrap().config_version, 2);
    }

    #[tokio::test]
    async fn a_stale_version_is_silently_discarded() {
        let store = ConfigStore::new();
        assert!(store.push(config("conn-1", 5)).await);
        assert!(!store.push(config("conn-1", 3)).await);
        assert_eq!(store.get("conn-1").await.unwrap().config_version, 5);
    }

    #[tokio::test]
    async fn an_equal_version_is_treated_as_stale() {
        let store = ConfigStore::new();
        assert!(store.push(config("conn-1", 5)).await);
        assert!(!store.push(config("conn-1", 5)).await);
    }

    #[tokio::test]
    async fn revoke_removes_the_connection() {
        let store = ConfigStore::new();
        store.push(config("conn-1", 1)).await;
        assert!(store.revoke("conn-1").await);
        assert!(store.get("conn-1").await.is_none());
    }
}
