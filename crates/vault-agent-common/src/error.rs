//! Error types shared across the vault sync agent workspace.

use thiserror::Error;

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Unified error type for vault sync agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    // ─────────────────────────────────────────────────────────────────
    // Vault client (C1)
    // ─────────────────────────────────────────────────────────────────
    #[error("network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("authentication rejected by vault ({status})")]
    AuthRejected { status: u16 },

    #[error("vault returned {status} for {endpoint}: {message}")]
    VaultRequestFailed {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("no credentials available to authenticate request")]
    NoCredentials,

    // ─────────────────────────────────────────────────────────────────
    // Atomic writer (C2)
    // ─────────────────────────────────────────────────────────────────
    #[error("destination path is not safe: {0}")]
    UnsafePath(String),

    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────
    // Output formatter (C3)
    // ─────────────────────────────────────────────────────────────────
    #[error("unknown output format: {0}")]
    UnknownFormat(String),

    #[error("missing required format option: {0}")]
    MissingOption(String),

    #[error("key not found for raw format: {0}")]
    MissingKey(String),

    #[error("template file not found: {0}")]
    TemplateNotFound(String),

    // ─────────────────────────────────────────────────────────────────
    // Deployer (C4)
    // ─────────────────────────────────────────────────────────────────
    #[error("deploy failed for target {target}: {reason}")]
    DeployFailed { target: String, reason: String },

    #[error("reload command exited with status {code}")]
    ReloadFailed { code: i32 },

    #[error("health check failed for target {target}")]
    HealthCheckFailed { target: String },

    // ─────────────────────────────────────────────────────────────────
    // Event channel (C5)
    // ─────────────────────────────────────────────────────────────────
    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("connection is stale")]
    StaleConnection,

    // ─────────────────────────────────────────────────────────────────
    // Sync engine (C6)
    // ─────────────────────────────────────────────────────────────────
    #[error("invalid engine state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // ─────────────────────────────────────────────────────────────────
    // Managed-key controller (C7)
    // ─────────────────────────────────────────────────────────────────
    #[error("managed key refresh failed (source={source_label}): {message}")]
    RefreshFailed {
        source_label: String,
        message: String,
    },

    #[error("managed key is stale and cannot be automatically recovered")]
    StaleKey,

    // ─────────────────────────────────────────────────────────────────
    // Dynamic credentials (C8)
    // ─────────────────────────────────────────────────────────────────
    #[error("database connection failed: {0}")]
    DbConnectionFailed(String),

    #[error("sql execution failed: {0}")]
    SqlExecutionFailed(String),

    #[error("dynamic config not found for connection {0}")]
    ConfigNotFound(String),

    #[error("envelope decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("operation timed out")]
    Timeout,

    #[error("unknown database driver: {0}")]
    UnknownDriver(String),

    // ─────────────────────────────────────────────────────────────────
    // Supervisor (C9)
    // ─────────────────────────────────────────────────────────────────
    #[error("child process exited: {0}")]
    ChildExited(String),

    #[error("maximum restart attempts reached")]
    MaxRestartsReached,

    // ─────────────────────────────────────────────────────────────────
    // Generic
    // ─────────────────────────────────────────────────────────────────
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

/// Classification of a vault HTTP/network outcome, used by the retry loop in
/// `vault-agent-client` to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient network/5xx/429 — retry with backoff.
    Transient,
    /// 401/403 — surface immediately, never retry.
    Auth,
    /// 4xx other than 401/403/429 — terminal, report verbatim.
    Validation,
    /// Anything else — terminal.
    Fatal,
}
