//! Wire messages exchanged with the vault over the dynamic-secrets topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vault_agent_common::AgentError;

use crate::crypto::EncryptedConfigEnvelope;

/// Messages the vault sends to the agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DynamicServerMessage {
    ConfigPush {
        connection_id: String,
        config_version: u64,
        encrypted_config: EncryptedConfigEnvelope,
        role_ids: Vec<String>,
    },
    ConfigRevoke {
        connection_id: String,
    },
    Generate {
        request_id: String,
        connection_id: String,
        role_id: String,
        ttl: u64,
        expires_at: DateTime<Utc>,
        username_template: String,
        vault_public_key: String,
    },
    Revoke {
        request_id: String,
        lease_id: String,
        username: String,
    },
    Renew {
        request_id: String,
        lease_id: String,
        username: String,
        new_expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigAckStatus {
    Loaded,
    Failed,
}

/// Messages the agent sends back to the vault.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DynamicClientMessage {
    ConfigAck {
        connection_id: String,
        status: ConfigAckStatus,
    },
    Generated {
        request_id: String,
        lease_id: String,
        username: String,
        encrypted_password: EncryptedConfigEnvelope,
        expires_at: DateTime<Utc>,
    },
    Revoked {
        request_id: String,
    },
    Renewed {
        request_id: String,
        new_expires_at: DateTime<Utc>,
    },
    Error {
        request_id: Option<String>,
        code: ErrorCode,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DbConnectionFailed,
    SqlExecutionFailed,
    ConfigNotFound,
    DecryptionFailed,
    Timeout,
    Unknown,
}

impl ErrorCode {
    /// Maps an `AgentError` to the protocol's error code, falling back to
    /// `Unknown` for anything this topic doesn't have a specific code for.
    pub fn from_error(err: &AgentError) -> Self {
        match err {
            AgentError::DbConnectionFailed(_) => ErrorCode::DbConnectionFailed,
            AgentError::SqlExecutionFailed(_) => ErrorCode::SqlExecutionFailed,
            AgentError::ConfigNotFound(_) => ErrorCode::ConfigNotFound,
            AgentError::DecryptionFailed(_) => ErrorCode::DecryptionFailed,
            AgentError::Timeout => ErrorCode::Timeout,
            _ => ErrorCode::Unknown,
        }
    }
}
