//! Shared test infrastructure for the end-to-end scenario tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use vault_agent_client::{DecryptedCertificate, SecretResponse};
use vault_agent_common::{AgentResult, RemoteCertId, RemoteSecretId};
use vault_agent_deploy::{CertificateSource, SecretSource};

pub fn random_cert_id() -> RemoteCertId {
    RemoteCertId::from_uuid(Uuid::now_v7())
}

/// A certificate source backed by a single fixed PEM bundle and version,
/// recording every delivery acknowledgement it receives.
pub struct FixedCertSource {
    pub bundle: String,
    pub version: u64,
    pub acked: Mutex<Vec<(String, u64)>>,
}

impl FixedCertSource {
    pub fn new(bundle: impl Into<String>, version: u64) -> Self {
        Self {
            bundle: bundle.into(),
            version,
            acked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CertificateSource for FixedCertSource {
    async fn decrypt_certificate(&self, _id: RemoteCertId, _purpose: &str) -> AgentResult<DecryptedCertificate> {
        Ok(DecryptedCertificate {
            pem_bundle: self.bundle.clone(),
            fingerprint: "ignored".to_string(),
            version: self.version,
            purpose: "deploy".to_string(),
        })
    }

    async fn ack_certificate_delivery(&self, _id: RemoteCertId, host: &str, version: u64) {
        self.acked.lock().unwrap().push((host.to_string(), version));
    }
}

/// A secret source backed by a single fixed key→value map.
pub struct FixedSecretSource {
    pub data: BTreeMap<String, serde_json::Value>,
    pub version: u64,
}

#[async_trait]
impl SecretSource for FixedSecretSource {
    async fn get_secret(&self, _id: &RemoteSecretId) -> AgentResult<SecretResponse> {
        Ok(SecretResponse {
            data: self.data.clone(),
            version: self.version,
            type_tag: "kv".to_string(),
            alias: None,
        })
    }
}
