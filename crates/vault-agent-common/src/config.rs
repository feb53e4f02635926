//! Configuration shape for the vault sync agent.
//!
//! This module defines the data an external loader (CLI + config file +
//! environment — out of scope per spec §1) is expected to produce. The
//! layered `figment` loader mirrors the teacher's `load_config` helper so a
//! host binary can use it directly, but the on-disk format itself is not
//! part of this workspace's contract.

use serde::{Deserialize, Serialize};

use crate::targets::{CertificateTarget, SecretTarget};

/// How the agent authenticates its own requests to the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuthConfig {
    ApiKey { api_key: String },
    UsernamePassword { username: String, password: String },
}

/// Rotation trigger mode reported by the vault on bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    Scheduled,
    OnUse,
    OnBind,
}

/// Managed-key configuration: present only when the agent runs in
/// managed-key mode (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedKeyConfig {
    pub name: String,
    pub next_rotation_at: Option<chrono::DateTime<chrono::Utc>>,
    pub grace_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub rotation_mode: RotationMode,
}

fn default_vault_url() -> String {
    "https://vault.internal".to_string()
}

fn default_poll_interval_secs() -> u64 {
    3600
}

fn default_insecure() -> bool {
    false
}

/// Complete agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_vault_url")]
    pub vault_url: String,

    pub tenant_id: String,

    #[serde(default = "default_insecure")]
    pub insecure: bool,

    pub auth: AuthConfig,

    pub managed_key: Option<ManagedKeyConfig>,

    #[serde(default)]
    pub targets: Vec<CertificateTarget>,

    #[serde(default)]
    pub secret_targets: Vec<SecretTarget>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            vault_url: default_vault_url(),
            tenant_id: String::new(),
            insecure: default_insecure(),
            auth: AuthConfig::ApiKey {
                api_key: String::new(),
            },
            managed_key: None,
            targets: Vec::new(),
            secret_targets: Vec::new(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[cfg(feature = "config")]
mod loader {
    use super::AgentConfig;
    use figment::{
        providers::{Env, Format, Serialized, Toml},
        Figment,
    };

    /// Load configuration from layered sources: defaults, then an optional
    /// TOML file, then environment variables (highest precedence).
    ///
    /// Environment variables follow spec §6: `_URL`, `_TENANT_ID`,
    /// `_API_KEY`, `_USERNAME`, `_PASSWORD`, `_INSECURE`, all prefixed by
    /// the uppercased `prefix`.
    pub fn load_agent_config(
        prefix: &str,
        config_file: Option<&str>,
    ) -> Result<AgentConfig, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(AgentConfig::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(&format!("{}_", prefix.to_uppercase())).split("_"));

        figment.extract()
    }
}

#[cfg(feature = "config")]
pub use loader::load_agent_config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_poll_interval() {
        let config = AgentConfig::default();
        assert_eq!(config.poll_interval_secs, 3600);
        assert!(!config.insecure);
    }
}
