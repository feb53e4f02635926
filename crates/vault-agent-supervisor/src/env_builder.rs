//! Resolves secret mappings into the child process's environment, splitting
//! sensitive values out to files rather than the process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use vault_agent_common::{AgentResult, RemoteSecretId};

use crate::mapping::{self, EnvMapping};

/// The subset of `VaultClient` the env builder needs; narrowed to a trait so
/// tests can substitute a fake rather than a real HTTP client.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn bind_managed_api_key(&self, name: &str) -> AgentResult<String>;
    async fn get_secret(
        &self,
        id: &RemoteSecretId,
    ) -> AgentResult<std::collections::BTreeMap<String, serde_json::Value>>;
}

#[async_trait]
impl CredentialSource for vault_agent_client::VaultClient {
    async fn bind_managed_api_key(&self, name: &str) -> AgentResult<String> {
        Ok(vault_agent_client::VaultClient::bind_managed_api_key(self, name)
            .await?
            .key)
    }

    async fn get_secret(
        &self,
        id: &RemoteSecretId,
    ) -> AgentResult<std::collections::BTreeMap<String, serde_json::Value>> {
        Ok(vault_agent_client::VaultClient::get_secret(self, id).await?.data)
    }
}

/// One resolved environment variable: either a plain value or a path to a
/// file holding the value (for sensitive names).
pub enum ResolvedVar {
    Value(String),
    File(PathBuf),
}

/// Builds a child process's environment from `NAME=spec` mappings.
pub struct EnvBuilder<'a> {
    source: &'a dyn CredentialSource,
    secrets_dir: PathBuf,
}

impl<'a> EnvBuilder<'a> {
    pub fn new(source: &'a dyn CredentialSource, secrets_dir: PathBuf) -> Self {
        Self {
            source,
            secrets_dir,
        }
    }

    /// Resolves every mapping, caching `api-key:NAME` binds by name within
    /// this single build so the same key isn't bound twice.
    pub async fn build(
        &self,
        mappings: &[(String, String)],
    ) -> AgentResult<HashMap<String, ResolvedVar>> {
        let mut api_key_cache: HashMap<String, String> = HashMap::new();
        let mut result = HashMap::new();

        for (name, spec) in mappings {
            let mapping = mapping::parse_mapping(spec)?;
            let value = match mapping {
                EnvMapping::Literal(value) => value,
                EnvMapping::ApiKey(key_name) => {
                    if let Some(cached) = api_key_cache.get(&key_name) {
                        cached.clone()
                    } else {
                        let bound = self.source.bind_managed_api_key(&key_name).await?;
                        api_key_cache.insert(key_name, bound.clone());
                        bound
                    }
                }
                EnvMapping::Secret { id, key } => {
                    let data = self.source.get_secret(&id).await?;
                    mapping::project_secret_value(&data, key.as_deref())?
                }
            };

            if mapping::is_sensitive_name(name) {
                let path = crate::secrets_dir::materialize(&self.secrets_dir, name, &value)?;
                result.insert(name.clone(), ResolvedVar::File(path));
            } else {
                result.insert(name.clone(), ResolvedVar::Value(value));
            }
        }

        Ok(result)
    }
}

/// Flattens resolved variables into the actual `KEY=value` pairs to pass to
/// the child, rewriting sensitive names to `NAME_FILE=<path>`.
pub fn to_process_env(resolved: &HashMap<String, ResolvedVar>) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for (name, var) in resolved {
        match var {
            ResolvedVar::Value(value) => {
                env.insert(name.clone(), value.clone());
            }
            ResolvedVar::File(path) => {
                env.insert(format!("{name}_FILE"), path.display().to_string());
            }
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSource {
        keys: Mutex<HashMap<String, String>>,
        bind_count: Mutex<HashMap<String, u32>>,
        secrets: HashMap<String, std::collections::BTreeMap<String, serde_json::Value>>,
    }

    #[async_trait]
    impl CredentialSource for FakeSource {
        async fn bind_managed_api_key(&self, name: &str) -> AgentResult<String> {
            *self
                .bind_count
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_insert(0) += 1;
            Ok(self.keys.lock().unwrap().get(name).unwrap().clone())
        }

        async fn get_secret(
            &self,
            id: &RemoteSecretId,
        ) -> AgentResult<std::collections::BTreeMap<String, serde_json::Value>> {
            Ok(self.secrets.get(&id.to_string()).cloned().unwrap_or_default())
        }
    }

    fn fake_source() -> FakeSource {
        let mut keys = HashMap::new();
        keys.insert("primary".to_string(), "bound-key-value".to_string());

        let mut secrets = HashMap::new();
        let mut db = std::collections::BTreeMap::new();
        db.insert(
            "password".to_string(),
            serde_json::Value::String("s3cret".to_string()),
        );
        secrets.insert("prod/db".to_string(), db);

        FakeSource {
            keys: Mutex::new(keys),
            bind_count: Mutex::new(HashMap::new()),
            secrets,
        }
    }

    #[tokio::test]
    async fn api_key_binds_are_cached_within_one_build() {
        let source = fake_source();
        let dir = tempfile::tempdir().unwrap();
        let builder = EnvBuilder::new(&source, dir.path().to_path_buf());

        let mappings = vec![
            ("ONE".to_string(), "api-key:primary".to_string()),
            ("TWO".to_string(), "api-key:primary".to_string()),
        ];
        builder.build(&mappings).await.unwrap();

        assert_eq!(*source.bind_count.lock().unwrap().get("primary").unwrap(), 1);
    }

    #[tokio::test]
    async fn sensitive_names_are_materialized_to_a_file() {
        let source = fake_source();
        let dir = tempfile::tempdir().unwrap();
        let builder = EnvBuilder::new(&source, dir.path().to_path_buf());

        let mappings = vec![("DB_PASSWORD".to_string(), "alias:prod/db.password".to_string())];
        let resolved = builder.build(&mappings).await.unwrap();
        let env = to_process_env(&resolved);

        assert!(env.contains_key("DB_PASSWORD_FILE"));
        assert!(!env.contains_key("DB_PASSWORD"));
    }

    #[tokio::test]
    async fn non_sensitive_literal_is_passed_as_a_plain_value() {
        let source = fake_source();
        let dir = tempfile::tempdir().unwrap();
        let builder = EnvBuilder::new(&source, dir.path().to_path_buf());

        let mappings = vec![("LOG_LEVEL".to_string(), "literal:debug".to_string())];
        let resolved = builder.build(&mappings).await.unwrap();
        let env = to_process_env(&resolved);

        assert_eq!(env.get("LOG_LEVEL").unwrap(), "debug");
    }
}
