//! HTTP client for the vault control-plane (component C1).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{instrument, warn};
use vault_agent_common::{
    AgentError, AgentResult, AuthConfig, ErrorClass, RemoteCertId, RemoteSecretId,
};

use crate::dto::{
    AckDeliveryRequest, BindManagedApiKeyRequest, BindManagedApiKeyResponse, CertificateSummary,
    DecryptedCertificate, LoginRequest, LoginResponse, SecretMetadata, SecretResponse,
    SecretSummary, VaultHealthResponse,
};
use crate::retry::{classify_network_error, classify_status, RetryPolicy};
use crate::token::CachedToken;

/// Client for the vault's HTTP control-plane API.
///
/// Holds one cached bearer token (refreshed via username/password login)
/// and a reachability flag the health endpoint reads, per spec §4.1.
pub struct VaultClient {
    http: reqwest::Client,
    base_url: String,
    tenant_id: String,
    auth: AuthConfig,
    cached_token: RwLock<Option<CachedToken>>,
    reachable: Arc<AtomicBool>,
}

enum AuthHeader {
    Bearer(String),
    ApiKey(String),
}

impl VaultClient {
    pub fn new(base_url: impl Into<String>, tenant_id: impl Into<String>, auth: AuthConfig, insecure: bool) -> AgentResult<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| AgentError::Internal(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            tenant_id: tenant_id.into(),
            auth,
            cached_token: RwLock::new(None),
            reachable: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Whether the last network attempt to the vault succeeded. Read by the
    /// agent's health endpoint.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    pub async fn has_valid_token(&self) -> bool {
        match self.cached_token.read().await.as_ref() {
            Some(token) => token.is_valid(chrono::Utc::now()),
            None => false,
        }
    }

    pub async fn clear_token(&self) {
        *self.cached_token.write().await = None;
    }

    // ── Authentication ──────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn login(&self) -> AgentResult<()> {
        let AuthConfig::UsernamePassword { username, password } = &self.auth else {
            return Err(AgentError::Configuration(
                "login requires username/password auth".to_string(),
            ));
        };

        let body = LoginRequest {
            tenant_id: &self.tenant_id,
            username,
            password,
        };

        let response: LoginResponse = self
            .execute(
                reqwest::Method::POST,
                "/v1/auth/login",
                Some(&body),
                None,
                RetryPolicy::NO_RETRY,
            )
            .await?;

        *self.cached_token.write().await = Some(CachedToken::new(response.token, response.expires_at));
        Ok(())
    }

    async fn resolve_auth(&self, explicit_token: Option<&str>) -> AgentResult<AuthHeader> {
        if let Some(token) = explicit_token {
            return Ok(AuthHeader::Bearer(token.to_string()));
        }

        if let AuthConfig::ApiKey { api_key } = &self.auth {
            return Ok(AuthHeader::ApiKey(api_key.clone()));
        }

        if let Some(token) = self.cached_token.read().await.as_ref() {
            if token.is_valid(chrono::Utc::now()) {
                return Ok(AuthHeader::Bearer(token.value().to_string()));
            }
        }

        self.login().await?;
        let token = self.cached_token.read().await;
        let token = token.as_ref().ok_or(AgentError::NoCredentials)?;
        Ok(AuthHeader::Bearer(token.value().to_string()))
    }

    // ── Certificates ────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn list_certificates(&self) -> AgentResult<Vec<CertificateSummary>> {
        self.execute(reqwest::Method::GET, "/v1/certificates", None::<&()>, None, RetryPolicy::DEFAULT)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_certificate(&self, id: RemoteCertId) -> AgentResult<CertificateSummary> {
        let path = format!("/v1/certificates/{}", id.as_uuid());
        self.execute(reqwest::Method::GET, &path, None::<&()>, None, RetryPolicy::DEFAULT)
            .await
    }

    #[instrument(skip(self))]
    pub async fn decrypt_certificate(&self, id: RemoteCertId, purpose: &str) -> AgentResult<DecryptedCertificate> {
        let path = format!("/v1/certificates/{}/decrypt?purpose={purpose}", id.as_uuid());
        self.execute(reqwest::Method::POST, &path, None::<&()>, None, RetryPolicy::DEFAULT)
            .await
    }

    /// Best-effort: failures are logged, never propagated (spec §4.4 step 8).
    #[instrument(skip(self))]
    pub async fn ack_delivery(&self, id: RemoteCertId, host: &str, version: u64) {
        let path = format!("/v1/certificates/{}/ack", id.as_uuid());
        let body = AckDeliveryRequest { host, version };
        let result: AgentResult<serde_json::Value> = self
            .execute(reqwest::Method::POST, &path, Some(&body), None, RetryPolicy::NO_RETRY)
            .await;
        if let Err(err) = result {
            warn!(target = %id, %err, "ack_delivery failed (best-effort, not retried)");
        }
    }

    // ── Secrets ─────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn list_secrets(&self) -> AgentResult<Vec<SecretSummary>> {
        self.execute(reqwest::Method::GET, "/v1/secrets", None::<&()>, None, RetryPolicy::DEFAULT)
            .await
    }

    /// Alias-addressed secrets are resolved to a UUID via metadata before
    /// the decrypt call, per spec §4.1.
    #[instrument(skip(self))]
    pub async fn get_secret(&self, id: &RemoteSecretId) -> AgentResult<SecretResponse> {
        let uuid = match id {
            RemoteSecretId::Uuid(u) => *u,
            RemoteSecretId::Alias(alias) => self.get_secret_metadata(alias).await?.id,
        };
        let path = format!("/v1/secrets/{uuid}/decrypt");
        self.execute(reqwest::Method::POST, &path, None::<&()>, None, RetryPolicy::DEFAULT)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_secret_metadata(&self, alias: &str) -> AgentResult<SecretMetadata> {
        let path = format!("/v1/secrets/metadata?alias={alias}");
        self.execute(reqwest::Method::GET, &path, None::<&()>, None, RetryPolicy::DEFAULT)
            .await
    }

    // ── Managed-key rotation ────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn bind_managed_api_key(&self, name: &str) -> AgentResult<BindManagedApiKeyResponse> {
        let body = BindManagedApiKeyRequest { name };
        self.execute(
            reqwest::Method::POST,
            "/v1/managed-keys/bind",
            Some(&body),
            None,
            RetryPolicy::DEFAULT,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn check_health(&self) -> AgentResult<VaultHealthResponse> {
        self.execute(reqwest::Method::GET, "/v1/health", None::<&()>, None, RetryPolicy::DEFAULT)
            .await
    }

    // ── Request execution ───────────────────────────────────────────

    async fn execute<B, R>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
        explicit_token: Option<&str>,
        policy: RetryPolicy,
    ) -> AgentResult<R>
    where
        B: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;

        loop {
            let started = std::time::Instant::now();
            let outcome = self.try_once(&method, &url, body, explicit_token).await;
            let duration = started.elapsed();

            match outcome {
                Ok((status, value)) => {
                    self.reachable.store(true, Ordering::Relaxed);
                    metrics::counter!("vault_client_requests_total", "method" => method.as_str().to_string(), "status" => status.to_string()).increment(1);
                    metrics::histogram!("vault_client_request_duration_seconds").record(duration.as_secs_f64());
                    return Ok(value);
                }
                Err(err) => {
                    let class = classify_error(&err);
                    if class == ErrorClass::Transient {
                        self.reachable.store(false, Ordering::Relaxed);
                    }

                    attempt += 1;
                    let exhausted = attempt >= policy.max_attempts;
                    let retryable = class == ErrorClass::Transient;

                    if !retryable || exhausted {
                        return Err(err);
                    }

                    let delay = policy.backoff(attempt - 1);
                    warn!(path, attempt, ?delay, %err, "retrying vault request");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_once<B, R>(
        &self,
        method: &reqwest::Method,
        url: &str,
        body: Option<&B>,
        explicit_token: Option<&str>,
    ) -> AgentResult<(StatusCode, R)>
    where
        B: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let auth = self.resolve_auth(explicit_token).await?;
        let mut request = self.http.request(method.clone(), url);
        request = match auth {
            AuthHeader::Bearer(token) => request.bearer_auth(token),
            AuthHeader::ApiKey(key) => request.header("X-Api-Key", key),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| AgentError::Network {
            endpoint: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(AgentError::AuthRejected {
                    status: status.as_u16(),
                });
            }
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::VaultRequestFailed {
                endpoint: url.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let value = response.json::<R>().await.map_err(|e| AgentError::Network {
            endpoint: url.to_string(),
            message: e.to_string(),
        })?;

        Ok((status, value))
    }
}

fn classify_error(err: &AgentError) -> ErrorClass {
    match err {
        AgentError::Network { message, .. } => classify_network_error(message),
        AgentError::VaultRequestFailed { status, .. } => classify_status(*status),
        AgentError::AuthRejected { .. } => ErrorClass::Auth,
        AgentError::NoCredentials => ErrorClass::Fatal,
        _ => ErrorClass::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_error_maps_auth_rejection_to_auth_class() {
        let err = AgentError::VaultRequestFailed {
            endpoint: "/v1/secrets".to_string(),
            status: 401,
            message: String::new(),
        };
        assert_eq!(classify_error(&err), ErrorClass::Auth);
    }

    #[tokio::test]
    async fn has_valid_token_is_false_before_login() {
        let client = VaultClient::new(
            "https://vault.example",
            "tenant-a",
            AuthConfig::ApiKey { api_key: "k".to_string() },
            false,
        )
        .unwrap();
        assert!(!client.has_valid_token().await);
    }

    #[tokio::test]
    async fn clear_token_removes_cached_token() {
        let client = VaultClient::new(
            "https://vault.example",
            "tenant-a",
            AuthConfig::ApiKey { api_key: "k".to_string() },
            false,
        )
        .unwrap();
        *client.cached_token.write().await = Some(CachedToken::new(
            "abc".to_string(),
            chrono::Utc::now() + chrono::Duration::seconds(300),
        ));
        assert!(client.has_valid_token().await);
        client.clear_token().await;
        assert!(!client.has_valid_token().await);
    }
}
