//! Fetch → format/split → write → reload → health-check → rollback
//! orchestration (component C4).

use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use vault_agent_common::{
    AgentError, AgentResult, AgentEvent, CertComponent, CertificateTarget, PluginSink,
    SecretTarget,
};
use vault_agent_fsio::AtomicWriter;
use vault_agent_format::SecretData;

use crate::pem::split_pem_bundle;
use crate::reload::{run_health_check, run_reload_command, CommandOutput};
use crate::source::{CertificateSource, SecretSource};

/// Outcome of a single `deploy` call, mirroring spec §4.4's return shape.
#[derive(Debug, Clone)]
pub struct DeployResult {
    pub success: bool,
    pub message: String,
    pub files_written: Vec<PathBuf>,
    pub fingerprint_or_version: Option<String>,
    pub reload_output: Option<CommandOutput>,
    pub rolled_back: bool,
    pub health_check_passed: Option<bool>,
}

impl DeployResult {
    fn unchanged() -> Self {
        Self {
            success: true,
            message: "unchanged".to_string(),
            files_written: Vec::new(),
            fingerprint_or_version: None,
            reload_output: None,
            rolled_back: false,
            health_check_passed: None,
        }
    }

    fn failure(message: impl Into<String>, files_written: Vec<PathBuf>, rolled_back: bool) -> Self {
        Self {
            success: false,
            message: message.into(),
            files_written,
            fingerprint_or_version: None,
            reload_output: None,
            rolled_back,
            health_check_passed: None,
        }
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    format!("{digest:x}")
}

/// Orchestrates deploys for both certificate and secret targets, sharing
/// the write/reload/rollback machinery.
pub struct Deployer {
    cert_source: Arc<dyn CertificateSource>,
    secret_source: Arc<dyn SecretSource>,
    hostname: String,
    sink: Arc<dyn PluginSink>,
}

impl Deployer {
    pub fn new(
        cert_source: Arc<dyn CertificateSource>,
        secret_source: Arc<dyn SecretSource>,
        hostname: impl Into<String>,
        sink: Arc<dyn PluginSink>,
    ) -> Self {
        Self {
            cert_source,
            secret_source,
            hostname: hostname.into(),
            sink,
        }
    }

    #[instrument(skip(self, target), fields(target = %target.name))]
    pub async fn deploy_certificate(&self, target: &mut CertificateTarget, force: bool) -> AgentResult<DeployResult> {
        let decrypted = self
            .cert_source
            .decrypt_certificate(target.remote_id, "deploy")
            .await?;

        let fingerprint = sha256_hex(decrypted.pem_bundle.as_bytes());
        if !force && target.fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return Ok(DeployResult::unchanged());
        }

        let components = split_pem_bundle(&decrypted.pem_bundle);
        let mut files_written = Vec::new();
        let mut backups = Vec::new();

        for (component, path) in target.outputs.iter() {
            let bytes = match component {
                CertComponent::Combined => Some(components.combined.as_str()),
                CertComponent::Cert => components.cert.as_deref(),
                CertComponent::Key => components.key.as_deref(),
                CertComponent::Chain => components.chain.as_deref(),
                CertComponent::Fullchain => components.fullchain.as_deref(),
            };

            let Some(bytes) = bytes else {
                warn!(target = %target.name, ?component, "certificate bundle has no content for this component");
                continue;
            };

            let path_buf = PathBuf::from(path);
            match AtomicWriter::write_with_backup(&path_buf, bytes.as_bytes(), &target.mode, target.owner.as_deref()) {
                Ok(backup) => {
                    files_written.push(path_buf.clone());
                    if let Some(backup) = backup {
                        backups.push((path_buf, backup));
                    }
                }
                Err(err) => {
                    return Ok(DeployResult::failure(
                        format!("write failed for {}: {err}", path_buf.display()),
                        files_written,
                        false,
                    ));
                }
            }
        }

        if let Some(outcome) = self
            .reload_and_check(target.reload_command.as_deref(), target.health_check.as_ref(), &backups, files_written.clone())
            .await
        {
            return Ok(outcome);
        }

        target.record_deploy(fingerprint.clone(), decrypted.version)?;
        self.cert_source
            .ack_certificate_delivery(target.remote_id, &self.hostname, decrypted.version)
            .await;

        self.sink.emit(&AgentEvent::CertificateDeployed {
            target: target.name.clone(),
            remote_id: target.remote_id,
            fingerprint: fingerprint.clone(),
            version: decrypted.version,
        });

        info!(target = %target.name, version = decrypted.version, "certificate deployed");

        Ok(DeployResult {
            success: true,
            message: "deployed".to_string(),
            files_written,
            fingerprint_or_version: Some(fingerprint),
            reload_output: None,
            rolled_back: false,
            health_check_passed: target.health_check.as_ref().map(|_| true),
        })
    }

    #[instrument(skip(self, target), fields(target = %target.name))]
    pub async fn deploy_secret(&self, target: &mut SecretTarget, force: bool) -> AgentResult<DeployResult> {
        let secret = self.secret_source.get_secret(&target.remote_id).await?;

        if !force && target.last_synced_version == Some(secret.version) {
            return Ok(DeployResult::unchanged());
        }

        let data: SecretData = secret.data.into_iter().collect();
        let rendered = vault_agent_format::render(&data, target.format, &target.options)?;

        let mut files_written = Vec::new();
        let mut backups = Vec::new();

        if let Some(bytes) = rendered {
            let path = target.path.as_deref().ok_or_else(|| {
                AgentError::Configuration(format!("secret target {} has no destination path", target.name))
            })?;
            let path_buf = PathBuf::from(path);

            match AtomicWriter::write_with_backup(&path_buf, &bytes, &target.mode, target.owner.as_deref()) {
                Ok(backup) => {
                    files_written.push(path_buf.clone());
                    if let Some(backup) = backup {
                        backups.push((path_buf, backup));
                    }
                }
                Err(err) => {
                    return Ok(DeployResult::failure(
                        format!("write failed for {}: {err}", path_buf.display()),
                        files_written,
                        false,
                    ));
                }
            }
        }

        if let Some(outcome) = self
            .reload_and_check(target.reload_command.as_deref(), None, &backups, files_written.clone())
            .await
        {
            return Ok(outcome);
        }

        target.last_synced_version = Some(secret.version);

        self.sink.emit(&AgentEvent::SecretDeployed {
            target: target.name.clone(),
            version: secret.version,
        });

        info!(target = %target.name, version = secret.version, "secret deployed");

        Ok(DeployResult {
            success: true,
            message: "deployed".to_string(),
            files_written,
            fingerprint_or_version: Some(secret.version.to_string()),
            reload_output: None,
            rolled_back: false,
            health_check_passed: None,
        })
    }

    /// Runs the shared reload-then-healthcheck-then-rollback tail. Returns
    /// `Some(result)` on failure (caller should return it as-is); `None`
    /// means the caller should proceed to record success.
    async fn reload_and_check(
        &self,
        reload_command: Option<&str>,
        health_check: Option<&vault_agent_common::HealthCheckSpec>,
        backups: &[(PathBuf, PathBuf)],
        files_written: Vec<PathBuf>,
    ) -> Option<DeployResult> {
        let reload_output = if let Some(command) = reload_command {
            match run_reload_command(command).await {
                Ok(output) => Some(output),
                Err(err) => {
                    self.rollback(backups);
                    return Some(DeployResult {
                        success: false,
                        message: format!("reload failed: {err}"),
                        files_written,
                        fingerprint_or_version: None,
                        reload_output: None,
                        rolled_back: true,
                        health_check_passed: None,
                    });
                }
            }
        } else {
            None
        };

        if let Some(spec) = health_check {
            let passed = run_health_check(&spec.command, spec.timeout_secs).await;
            if !passed {
                self.rollback(backups);
                return Some(DeployResult {
                    success: false,
                    message: "health check failed after deploy".to_string(),
                    files_written,
                    fingerprint_or_version: None,
                    reload_output,
                    rolled_back: true,
                    health_check_passed: Some(false),
                });
            }
        }

        None
    }

    fn rollback(&self, backups: &[(PathBuf, PathBuf)]) {
        for (path, _backup) in backups {
            if let Err(err) = AtomicWriter::restore_backup(path) {
                warn!(path = %path.display(), %err, "rollback restore failed");
            }
        }
    }

    /// Iterates targets sequentially to preserve predictable reload
    /// ordering (spec §4.4 `deployAll`).
    pub async fn deploy_all_certificates(&self, targets: &mut [CertificateTarget], force: bool) -> Vec<AgentResult<DeployResult>> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            results.push(self.deploy_certificate(target, force).await);
        }
        results
    }

    pub async fn deploy_all_secrets(&self, targets: &mut [SecretTarget], force: bool) -> Vec<AgentResult<DeployResult>> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            results.push(self.deploy_secret(target, force).await);
        }
        results
    }
}
