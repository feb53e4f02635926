//! Wire DTOs for the vault control-plane HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vault_agent_common::{RemoteCertId, RotationMode};

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub tenant_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CertificateSummary {
    pub id: RemoteCertId,
    pub name: String,
    pub fingerprint: String,
    pub version: u64,
}

/// Response to `decryptCertificate`: the decrypted PEM bundle plus the
/// version it corresponds to. The deployer splits `pem_bundle` by
/// component.
#[derive(Debug, Deserialize)]
pub struct DecryptedCertificate {
    pub pem_bundle: String,
    pub fingerprint: String,
    pub version: u64,
    pub purpose: String,
}

#[derive(Debug, Serialize)]
pub struct AckDeliveryRequest<'a> {
    pub host: &'a str,
    pub version: u64,
}

#[derive(Debug, Deserialize)]
pub struct SecretSummary {
    pub id: uuid::Uuid,
    pub alias: Option<String>,
    pub version: u64,
}

/// Response to `getSecret`: the decrypted key→value map plus metadata.
#[derive(Debug, Deserialize)]
pub struct SecretResponse {
    pub data: std::collections::BTreeMap<String, Value>,
    pub version: u64,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub alias: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SecretMetadata {
    pub id: uuid::Uuid,
    pub alias: Option<String>,
    pub version: u64,
}

#[derive(Debug, Serialize)]
pub struct BindManagedApiKeyRequest<'a> {
    pub name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct BindManagedApiKeyResponse {
    pub key: String,
    pub next_rotation_at: chrono::DateTime<chrono::Utc>,
    pub grace_expires_at: chrono::DateTime<chrono::Utc>,
    pub rotation_mode: RotationMode,
}

#[derive(Debug, Deserialize)]
pub struct VaultHealthResponse {
    pub status: String,
}
