//! # vault-agent-common
//!
//! Shared types and utilities for the vault sync agent workspace:
//!
//! - `vault-agent-client`: vault HTTP/token client
//! - `vault-agent-fsio`: atomic file materialization
//! - `vault-agent-format`: output rendering
//! - `vault-agent-deploy`: certificate/secret deployment
//! - `vault-agent-channel`: persistent event channel
//! - `vault-agent-keyctl`: managed-key rotation
//! - `vault-agent-dynamic`: dynamic database credentials
//! - `vault-agent-supervisor`: child-process lifecycle

pub mod error;
pub mod events;
pub mod health;
pub mod identity;
pub mod targets;
pub mod types;

#[cfg(feature = "config")]
pub mod config;

pub use error::{AgentError, AgentResult, ErrorClass};
pub use events::{AgentEvent, CompositeSink, NullSink, PluginSink};
pub use health::{HealthResponse, HealthStatus};
pub use identity::{ConnectionId, LeaseId, RemoteCertId, RemoteSecretId, TargetName};
pub use targets::{
    CertComponent, CertOutputPaths, CertificateTarget, FileMode, HealthCheckSpec, SecretFormat,
    SecretFormatOptions, SecretTarget,
};
pub use types::Timestamp;

#[cfg(feature = "config")]
pub use config::{load_agent_config, AgentConfig, AuthConfig, ManagedKeyConfig, RotationMode};
