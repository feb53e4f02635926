//! Identity types for targets, hosts, and connections.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local name of a certificate or secret target (operator-assigned, not a UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetName(String);

impl TargetName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote certificate identity as held by the vault service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteCertId(Uuid);

impl RemoteCertId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for RemoteCertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cert:{}", self.0)
    }
}

impl std::str::FromStr for RemoteCertId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid_str = s.strip_prefix("cert:").unwrap_or(s);
        Ok(Self(Uuid::parse_str(uuid_str)?))
    }
}

/// Remote secret identity: either a UUID or an `alias:path` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteSecretId {
    Uuid(Uuid),
    Alias(String),
}

impl RemoteSecretId {
    /// Parse either a bare UUID or an `alias:path` string.
    pub fn parse(s: &str) -> Self {
        match Uuid::parse_str(s) {
            Ok(uuid) => Self::Uuid(uuid),
            Err(_) => Self::Alias(s.to_string()),
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, Self::Alias(_))
    }
}

impl std::fmt::Display for RemoteSecretId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Alias(a) => write!(f, "{a}"),
        }
    }
}

/// A connection identity for the dynamic-credential subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// A server-issued dynamic credential lease identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(Uuid);

impl LeaseId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lease:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_secret_id_parses_uuid() {
        let id = RemoteSecretId::parse("550e8400-e29b-41d4-a716-446655440000");
        assert!(matches!(id, RemoteSecretId::Uuid(_)));
    }

    #[test]
    fn remote_secret_id_parses_alias() {
        let id = RemoteSecretId::parse("prod:db/creds");
        assert!(id.is_alias());
    }

    #[test]
    fn cert_id_roundtrip() {
        let uuid = Uuid::now_v7();
        let id = RemoteCertId::from_uuid(uuid);
        let s = id.to_string();
        let parsed: RemoteCertId = s.parse().unwrap();
        assert_eq!(parsed.as_uuid(), &uuid);
    }
}
