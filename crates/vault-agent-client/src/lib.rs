//! # vault-agent-client
//!
//! HTTP client for the vault control-plane API (component C1): retry with
//! backoff+jitter, bearer-token caching, and auth-precedence resolution.

mod client;
mod dto;
mod retry;
mod token;

pub use client::VaultClient;
pub use dto::{
    AckDeliveryRequest, BindManagedApiKeyResponse, CertificateSummary, DecryptedCertificate,
    LoginResponse, SecretMetadata, SecretResponse, SecretSummary, VaultHealthResponse,
};
pub use retry::RetryPolicy;
pub use token::CachedToken;
