//! Collaborator traits the deployer pulls content through — kept separate
//! from `VaultClient` so tests can substitute fakes (spec §8 scenarios).

use async_trait::async_trait;
use vault_agent_client::{DecryptedCertificate, SecretResponse, VaultClient};
use vault_agent_common::{AgentResult, RemoteCertId, RemoteSecretId};

#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn decrypt_certificate(&self, id: RemoteCertId, purpose: &str) -> AgentResult<DecryptedCertificate>;
    async fn ack_certificate_delivery(&self, id: RemoteCertId, host: &str, version: u64);
}

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn get_secret(&self, id: &RemoteSecretId) -> AgentResult<SecretResponse>;
}

#[async_trait]
impl CertificateSource for VaultClient {
    async fn decrypt_certificate(&self, id: RemoteCertId, purpose: &str) -> AgentResult<DecryptedCertificate> {
        VaultClient::decrypt_certificate(self, id, purpose).await
    }

    async fn ack_certificate_delivery(&self, id: RemoteCertId, host: &str, version: u64) {
        VaultClient::ack_delivery(self, id, host, version).await
    }
}

#[async_trait]
impl SecretSource for VaultClient {
    async fn get_secret(&self, id: &RemoteSecretId) -> AgentResult<SecretResponse> {
        VaultClient::get_secret(self, id).await
    }
}
