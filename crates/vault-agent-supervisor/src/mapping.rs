//! Parses and resolves `NAME=spec` environment mappings for the child process.

use std::collections::HashMap;

use vault_agent_common::{AgentError, AgentResult, RemoteSecretId};

/// How a single environment variable's value is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvMapping {
    /// `literal:VALUE` — a constant, never treated as sensitive material.
    Literal(String),
    /// `api-key:NAME` — bind a managed API key and use the returned value.
    ApiKey(String),
    /// `alias:path[.key]` or a bare UUID `[.key]` — fetch a secret and
    /// project a single key, or stringify the whole map if no key given.
    Secret {
        id: RemoteSecretId,
        key: Option<String>,
    },
}

/// Parse the `spec` half of a `NAME=spec` mapping.
pub fn parse_mapping(spec: &str) -> AgentResult<EnvMapping> {
    if let Some(value) = spec.strip_prefix("literal:") {
        return Ok(EnvMapping::Literal(value.to_string()));
    }
    if let Some(name) = spec.strip_prefix("api-key:") {
        return Ok(EnvMapping::ApiKey(name.to_string()));
    }
    if let Some(rest) = spec.strip_prefix("alias:") {
        let (path, key) = split_key_suffix(rest);
        return Ok(EnvMapping::Secret {
            id: RemoteSecretId::Alias(path.to_string()),
            key,
        });
    }

    // Bare UUID, optionally with a `.key` suffix.
    let (uuid_part, key) = split_key_suffix(spec);
    match uuid::Uuid::parse_str(uuid_part) {
        Ok(uuid) => Ok(EnvMapping::Secret {
            id: RemoteSecretId::Uuid(uuid),
            key,
        }),
        Err(_) => Err(AgentError::UnsafePath(format!(
            "unrecognised secret mapping: {spec}"
        ))),
    }
}

/// Splits `path.key` into `(path, Some(key))`, or `(path, None)` when there's
/// no `.` separator. Only the *last* dot splits, so alias paths containing
/// dots (`prod.db/creds`) still work when no explicit key is appended.
fn split_key_suffix(s: &str) -> (&str, Option<String>) {
    match s.rsplit_once('.') {
        Some((path, key)) => (path, Some(key.to_string())),
        None => (s, None),
    }
}

/// Heuristic for whether an env var name carries sensitive material and
/// should be materialized to a file instead of the process environment.
pub fn is_sensitive_name(name: &str) -> bool {
    const MARKERS: [&str; 5] = ["password", "secret", "apikey", "token", "credential"];
    let lower = name.to_lowercase();
    MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Renders a resolved secret's data map to a single string value, either by
/// projecting `key` or by stringifying the whole map as JSON.
pub fn project_secret_value(
    data: &std::collections::BTreeMap<String, serde_json::Value>,
    key: Option<&str>,
) -> AgentResult<String> {
    match key {
        Some(key) => {
            let value = data
                .get(key)
                .ok_or_else(|| AgentError::MissingKey(key.to_string()))?;
            Ok(stringify(value))
        }
        None => {
            let map: HashMap<_, _> = data.iter().collect();
            serde_json::to_string(&map)
                .map_err(|e| AgentError::UnsafePath(format!("failed to render secret: {e}")))
        }
    }
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_mapping_is_a_constant() {
        assert_eq!(
            parse_mapping("literal:foo").unwrap(),
            EnvMapping::Literal("foo".to_string())
        );
    }

    #[test]
    fn api_key_mapping_carries_the_key_name() {
        assert_eq!(
            parse_mapping("api-key:primary").unwrap(),
            EnvMapping::ApiKey("primary".to_string())
        );
    }

    #[test]
    fn alias_mapping_with_key_suffix_splits_on_last_dot() {
        let mapping = parse_mapping("alias:prod/db.password").unwrap();
        assert_eq!(
            mapping,
            EnvMapping::Secret {
                id: RemoteSecretId::Alias("prod/db".to_string()),
                key: Some("password".to_string()),
            }
        );
    }

    #[test]
    fn bare_uuid_mapping_without_key_projects_whole_map() {
        let uuid = uuid::Uuid::now_v7();
        let mapping = parse_mapping(&uuid.to_string()).unwrap();
        assert_eq!(
            mapping,
            EnvMapping::Secret {
                id: RemoteSecretId::Uuid(uuid),
                key: None,
            }
        );
    }

    #[test]
    fn unrecognised_mapping_is_an_error() {
        assert!(parse_mapping("not-a-mapping").is_err());
    }

    #[test]
    fn sensitive_name_heuristic_matches_common_markers() {
        assert!(is_sensitive_name("DB_PASSWORD"));
        assert!(is_sensitive_name("STRIPE_APIKEY"));
        assert!(!is_sensitive_name("LOG_LEVEL"));
    }
}
