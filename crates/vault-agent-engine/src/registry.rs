//! Holds the certificate and secret targets the engine deploys, and
//! resolves an incoming event's cert/secret ID or alias to a target.

use tokio::sync::RwLock;

use vault_agent_common::{AgentResult, CertificateTarget, RemoteCertId, RemoteSecretId, SecretTarget};
use vault_agent_deploy::{DeployResult, Deployer};

#[derive(Default)]
pub struct TargetRegistry {
    certificates: RwLock<Vec<CertificateTarget>>,
    secrets: RwLock<Vec<SecretTarget>>,
}

impl TargetRegistry {
    pub fn new(certificates: Vec<CertificateTarget>, secrets: Vec<SecretTarget>) -> Self {
        Self {
            certificates: RwLock::new(certificates),
            secrets: RwLock::new(secrets),
        }
    }

    pub async fn certificate_ids(&self) -> Vec<String> {
        self.certificates
            .read()
            .await
            .iter()
            .map(|t| t.remote_id.to_string())
            .collect()
    }

    pub async fn secret_ids(&self) -> Vec<String> {
        self.secrets
            .read()
            .await
            .iter()
            .filter(|t| !t.remote_id.is_alias())
            .map(|t| t.remote_id.to_string())
            .collect()
    }

    pub async fn certificate_index_for(&self, remote_id: &str) -> Option<usize> {
        let remote: RemoteCertId = remote_id.parse().ok()?;
        self.certificates.read().await.iter().position(|t| t.remote_id == remote)
    }

    pub async fn secret_index_for(&self, remote_id_or_alias: &str) -> Option<usize> {
        let target = RemoteSecretId::parse(remote_id_or_alias);
        self.secrets.read().await.iter().position(|t| t.remote_id == target)
    }

    /// Deploys a single certificate target by index, `None` if it no
    /// longer exists (e.g. reconfigured out from under an in-flight event).
    pub async fn deploy_certificate_at(
        &self,
        index: usize,
        deployer: &Deployer,
        force: bool,
    ) -> Option<AgentResult<DeployResult>> {
        let mut guard = self.certificates.write().await;
        let target = guard.get_mut(index)?;
        Some(deployer.deploy_certificate(target, force).await)
    }

    pub async fn deploy_secret_at(
        &self,
        index: usize,
        deployer: &Deployer,
        force: bool,
    ) -> Option<AgentResult<DeployResult>> {
        let mut guard = self.secrets.write().await;
        let target = guard.get_mut(index)?;
        Some(deployer.deploy_secret(target, force).await)
    }

    pub async fn deploy_all_certificates(
        &self,
        deployer: &Deployer,
        force: bool,
    ) -> Vec<AgentResult<DeployResult>> {
        let mut guard = self.certificates.write().await;
        deployer.deploy_all_certificates(&mut guard, force).await
    }

    pub async fn deploy_all_secrets(
        &self,
        deployer: &Deployer,
        force: bool,
    ) -> Vec<AgentResult<DeployResult>> {
        let mut guard = self.secrets.write().await;
        deployer.deploy_all_secrets(&mut guard, force).await
    }

    pub async fn certificate_count(&self) -> usize {
        self.certificates.read().await.len()
    }

    pub async fn secret_count(&self) -> usize {
        self.secrets.read().await.len()
    }
}
