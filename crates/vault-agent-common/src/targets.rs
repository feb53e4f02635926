//! Target declarations: the binding between a remote identity (certificate
//! or secret) and its local materialization.
//!
//! Targets are owned by the configuration layer (an external collaborator,
//! see spec §6); this module only defines their shape plus the
//! synchronization metadata the deployer is allowed to mutate.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};
use crate::identity::{RemoteCertId, RemoteSecretId, TargetName};

/// Octal file mode, stored as the literal string an operator would write
/// (e.g. `"0600"`), parsed lazily only where an actual `chmod` happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMode(String);

impl FileMode {
    pub fn new(mode: impl Into<String>) -> Self {
        Self(mode.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse to the numeric mode `std::fs::Permissions` expects.
    pub fn to_u32(&self) -> AgentResult<u32> {
        u32::from_str_radix(self.0.trim_start_matches("0o"), 8)
            .map_err(|_| AgentError::Configuration(format!("invalid file mode: {}", self.0)))
    }
}

impl Default for FileMode {
    fn default() -> Self {
        Self("0600".to_string())
    }
}

/// Which component of a certificate bundle an output path is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertComponent {
    Combined,
    Cert,
    Key,
    Chain,
    Fullchain,
}

/// Output path set for a certificate target, keyed by component.
///
/// Invariant: at least one path must be set (enforced by `validate`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertOutputPaths {
    pub combined: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,
    pub chain: Option<String>,
    pub fullchain: Option<String>,
}

impl CertOutputPaths {
    pub fn is_empty(&self) -> bool {
        self.combined.is_none()
            && self.cert.is_none()
            && self.key.is_none()
            && self.chain.is_none()
            && self.fullchain.is_none()
    }

    /// Iterate over the configured (component, path) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (CertComponent, &str)> {
        [
            (CertComponent::Combined, &self.combined),
            (CertComponent::Cert, &self.cert),
            (CertComponent::Key, &self.key),
            (CertComponent::Chain, &self.chain),
            (CertComponent::Fullchain, &self.fullchain),
        ]
        .into_iter()
        .filter_map(|(c, p)| p.as_deref().map(|p| (c, p)))
    }
}

/// Optional shell health check run after a reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub command: String,
    pub timeout_secs: u64,
}

/// A persistent declaration binding a remote certificate identity to one or
/// more local destinations with reload semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateTarget {
    pub name: TargetName,
    pub remote_id: RemoteCertId,
    /// SHA-256 fingerprint of the last successfully deployed content.
    pub fingerprint: Option<String>,
    /// Monotonically non-decreasing version number.
    pub version: u64,
    pub outputs: CertOutputPaths,
    pub mode: FileMode,
    pub owner: Option<String>,
    pub reload_command: Option<String>,
    pub health_check: Option<HealthCheckSpec>,
}

impl CertificateTarget {
    pub fn new(name: TargetName, remote_id: RemoteCertId, outputs: CertOutputPaths) -> AgentResult<Self> {
        if outputs.is_empty() {
            return Err(AgentError::Configuration(format!(
                "certificate target {name} must declare at least one output path"
            )));
        }

        Ok(Self {
            name,
            remote_id,
            fingerprint: None,
            version: 0,
            outputs,
            mode: FileMode::default(),
            owner: None,
            reload_command: None,
            health_check: None,
        })
    }

    /// Whether a successful deploy has ever occurred (fingerprint set).
    pub fn has_deployed(&self) -> bool {
        self.fingerprint.is_some()
    }

    /// Record a successful deploy, enforcing monotone versions.
    pub fn record_deploy(&mut self, fingerprint: String, version: u64) -> AgentResult<()> {
        if version < self.version {
            return Err(AgentError::Internal(format!(
                "target {} received version {version} older than stored {}",
                self.name, self.version
            )));
        }
        self.fingerprint = Some(fingerprint);
        self.version = version;
        Ok(())
    }
}

/// Output format for a secret target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretFormat {
    Env,
    Json,
    Yaml,
    Raw,
    Template,
    /// Subscribe-only: notification without materialization.
    None,
}

/// Format-specific rendering options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretFormatOptions {
    pub env_prefix: Option<String>,
    pub raw_key: Option<String>,
    pub template_path: Option<String>,
}

/// A persistent declaration binding a remote secret identity to a local
/// destination with format/reload semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretTarget {
    pub name: TargetName,
    pub remote_id: RemoteSecretId,
    pub format: SecretFormat,
    pub path: Option<String>,
    pub options: SecretFormatOptions,
    pub mode: FileMode,
    pub owner: Option<String>,
    pub reload_command: Option<String>,
    pub last_synced_version: Option<u64>,
}

impl SecretTarget {
    pub fn new(
        name: TargetName,
        remote_id: RemoteSecretId,
        format: SecretFormat,
        path: Option<String>,
    ) -> AgentResult<Self> {
        if format != SecretFormat::None && path.is_none() {
            return Err(AgentError::Configuration(format!(
                "secret target {name} requires a destination path unless format is none"
            )));
        }

        Ok(Self {
            name,
            remote_id,
            format,
            path,
            options: SecretFormatOptions::default(),
            mode: FileMode::default(),
            owner: None,
            reload_command: None,
            last_synced_version: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cert_target_requires_an_output_path() {
        let err = CertificateTarget::new(
            TargetName::new("web"),
            RemoteCertId::from_uuid(uuid::Uuid::now_v7()),
            CertOutputPaths::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[test]
    fn cert_target_record_deploy_rejects_older_version() {
        let mut target = CertificateTarget::new(
            TargetName::new("web"),
            RemoteCertId::from_uuid(uuid::Uuid::now_v7()),
            CertOutputPaths {
                combined: Some("/etc/ssl/web.pem".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        target.record_deploy("abc".to_string(), 5).unwrap();
        assert!(target.record_deploy("def".to_string(), 3).is_err());
        assert_eq!(target.version, 5);
    }

    #[test]
    fn secret_target_requires_path_unless_none() {
        let err = SecretTarget::new(
            TargetName::new("db"),
            RemoteSecretId::parse("prod:db/creds"),
            SecretFormat::Env,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));

        let ok = SecretTarget::new(
            TargetName::new("db"),
            RemoteSecretId::parse("prod:db/creds"),
            SecretFormat::None,
            None,
        );
        assert!(ok.is_ok());
    }
}
