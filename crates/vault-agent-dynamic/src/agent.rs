//! Dispatches inbound dynamic-secrets messages to the config store, the
//! pool cache, and the database, and builds the matching reply.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use x25519_dalek::{PublicKey, StaticSecret};

use vault_agent_common::{AgentError, AgentResult};

use crate::config_store::{ConfigStore, DbType};
use crate::crypto;
use crate::db;
use crate::dto::{ConfigAckStatus, DynamicClientMessage, DynamicServerMessage, ErrorCode};
use crate::pool_cache::PoolCache;
use crate::username::{render_statement, render_username};

const GENERATED_PASSWORD_BYTES: usize = 32;

/// Which connection and role issued a lease, recorded so `revoke`/`renew`
/// can address the statement that minted it instead of guessing.
struct LeaseInfo {
    connection_id: String,
    role_id: String,
}

/// Ties together the config store, pool cache, and database execution for
/// the dynamic-secrets topic. One instance serves every connection this
/// agent manages.
pub struct DynamicCredentialAgent {
    config_store: Arc<ConfigStore>,
    pools: Arc<PoolCache>,
    agent_secret: StaticSecret,
    leases: RwLock<HashMap<String, LeaseInfo>>,
}

impl DynamicCredentialAgent {
    pub fn new(agent_secret: StaticSecret) -> Self {
        Self {
            config_store: Arc::new(ConfigStore::new()),
            pools: Arc::new(PoolCache::new()),
            agent_secret,
            leases: RwLock::new(HashMap::new()),
        }
    }

    pub fn config_store(&self) -> Arc<ConfigStore> {
        self.config_store.clone()
    }

    pub fn pools(&self) -> Arc<PoolCache> {
        self.pools.clone()
    }

    pub async fn shutdown(&self) {
        self.pools.close_all().await;
    }

    /// Handles one inbound message, returning the reply to send back.
    #[instrument(skip(self, message))]
    pub async fn handle(&self, message: DynamicServerMessage) -> DynamicClientMessage {
        match message {
            DynamicServerMessage::ConfigPush {
                connection_id,
                config_version,
                encrypted_config,
                role_ids,
            } => self.handle_config_push(connection_id, config_version, encrypted_config, role_ids).await,
            DynamicServerMessage::ConfigRevoke { connection_id } => {
                self.handle_config_revoke(connection_id).await
            }
            DynamicServerMessage::Generate {
                request_id,
                connection_id,
                role_id,
                ttl,
                expires_at,
                username_template,
                vault_public_key,
            } => {
                self.handle_generate(
                    request_id,
                    connection_id,
                    role_id,
                    ttl,
                    expires_at,
                    username_template,
                    vault_public_key,
                )
                .await
            }
            DynamicServerMessage::Revoke {
                request_id,
                lease_id,
                username,
            } => self.handle_revoke(request_id, lease_id, username).await,
            DynamicServerMessage::Renew {
                request_id,
                lease_id,
                username,
                new_expires_at,
            } => self.handle_renew(request_id, lease_id, username, new_expires_at).await,
        }
    }

    async fn handle_config_push(
        &self,
        connection_id: String,
        config_version: u64,
        encrypted_config: crypto::EncryptedConfigEnvelope,
        role_ids: Vec<String>,
    ) -> DynamicClientMessage {
        match self.load_config(&connection_id, config_version, &encrypted_config, role_ids) {
            Ok(config) => {
                self.config_store.push(config).await;
                info!(connection_id, config_version, "dynamic secrets config loaded");
                DynamicClientMessage::ConfigAck {
                    connection_id,
                    status: ConfigAckStatus::Loaded,
                }
            }
            Err(err) => {
                warn!(connection_id, error = %err, "dynamic secrets config rejected");
                DynamicClientMessage::ConfigAck {
                    connection_id,
                    status: ConfigAckStatus::Failed,
                }
            }
        }
    }

    fn load_config(
        &self,
        connection_id: &str,
        config_version: u64,
        encrypted_config: &crypto::EncryptedConfigEnvelope,
        _role_ids: Vec<String>,
    ) -> AgentResult<crate::config_store::DynamicSecretsConfig> {
        let plaintext = crypto::decrypt(encrypted_config, &self.agent_secret)?;
        let mut config: crate::config_store::DynamicSecretsConfig =
            serde_json::from_slice(&plaintext)?;
        config.connection_id = connection_id.to_string();
        config.config_version = config_version;
        Ok(config)
    }

    async fn handle_config_revoke(&self, connection_id: String) -> DynamicClientMessage {
        self.config_store.revoke(&connection_id).await;
        self.pools.remove(&connection_id).await;
        info!(connection_id, "dynamic secrets config revoked");
        DynamicClientMessage::ConfigAck {
            connection_id,
            status: ConfigAckStatus::Loaded,
        }
    }

    async fn handle_generate(
        &self,
        request_id: String,
        connection_id: String,
        role_id: String,
        ttl: u64,
        expires_at: chrono::DateTime<Utc>,
        username_template: String,
        vault_public_key: String,
    ) -> DynamicClientMessage {
        match self.generate(&connection_id, &role_id, ttl, expires_at, &username_template, &vault_public_key).await {
            Ok((lease_id, username, encrypted_password)) => DynamicClientMessage::Generated {
                request_id,
                lease_id,
                username,
                encrypted_password,
                expires_at,
            },
            Err(err) => self.error_reply(Some(request_id), &err),
        }
    }

    async fn generate(
        &self,
        connection_id: &str,
        role_id: &str,
        _ttl: u64,
        expires_at: chrono::DateTime<Utc>,
        username_template: &str,
        vault_public_key: &str,
    ) -> AgentResult<(String, String, crypto::EncryptedConfigEnvelope)> {
        let config = self
            .config_store
            .get(connection_id)
            .await
            .ok_or_else(|| AgentError::ConfigNotFound(connection_id.to_string()))?;
        let role = config
            .role(role_id)
            .ok_or_else(|| AgentError::ConfigNotFound(format!("{connection_id}/{role_id}")))?
            .clone();

        let client = self.pool_for(&config).await?;

        let username = render_username(username_template, &role.role);
        let password = generate_password();

        let statement = render_statement(&role.creation_statement, &username, &password, expires_at);
        client.execute_create(&statement).await?;

        let recipient_public = parse_public_key(vault_public_key)?;
        let encrypted_password = crypto::encrypt(password.as_bytes(), &recipient_public)?;

        let lease_id = uuid::Uuid::new_v4().to_string();
        self.leases.write().await.insert(
            lease_id.clone(),
            LeaseInfo {
                connection_id: connection_id.to_string(),
                role_id: role_id.to_string(),
            },
        );
        Ok((lease_id, username, encrypted_password))
    }

    async fn handle_revoke(&self, request_id: String, lease_id: String, username: String) -> DynamicClientMessage {
        match self.revoke(&lease_id, &username).await {
            Ok(()) => DynamicClientMessage::Revoked { request_id },
            Err(err) => self.error_reply(Some(request_id), &err),
        }
    }

    /// Looks up the connection/role that issued `lease_id` and returns the
    /// config, role, and a DB client scoped to that connection.
    async fn lease_target(
        &self,
        lease_id: &str,
    ) -> AgentResult<(crate::config_store::DynamicSecretsConfig, crate::config_store::RoleConfig, Arc<dyn db::DbClient>)> {
        let info = self
            .leases
            .read()
            .await
            .get(lease_id)
            .map(|info| (info.connection_id.clone(), info.role_id.clone()))
            .ok_or_else(|| AgentError::ConfigNotFound(lease_id.to_string()))?;
        let (connection_id, role_id) = info;

        let config = self
            .config_store
            .get(&connection_id)
            .await
            .ok_or_else(|| AgentError::ConfigNotFound(connection_id.clone()))?;
        let role = config
            .role(&role_id)
            .ok_or_else(|| AgentError::ConfigNotFound(format!("{connection_id}/{role_id}")))?
            .clone();
        let client = self.pool_for(&config).await?;
        Ok((config, role, client))
    }

    async fn revoke(&self, lease_id: &str, username: &str) -> AgentResult<()> {
        let (_config, role, client) = self.lease_target(lease_id).await?;
        let statement = render_statement(&role.revocation_statement, username, "", Utc::now());
        client.execute_revoke(&statement).await?;
        self.leases.write().await.remove(lease_id);
        Ok(())
    }

    async fn handle_renew(
        &self,
        request_id: String,
        lease_id: String,
        username: String,
        new_expires_at: chrono::DateTime<Utc>,
    ) -> DynamicClientMessage {
        match self.renew(&lease_id, &username, new_expires_at).await {
            Ok(()) => DynamicClientMessage::Renewed {
                request_id,
                new_expires_at,
            },
            Err(err) => self.error_reply(Some(request_id), &err),
        }
    }

    /// Renews the lease's credential. A no-op success when the issuing
    /// role has no renewal statement configured — renewal is optional per
    /// role, not every database engine's grant model supports it.
    async fn renew(
        &self,
        lease_id: &str,
        username: &str,
        new_expires_at: chrono::DateTime<Utc>,
    ) -> AgentResult<()> {
        let (_config, role, client) = self.lease_target(lease_id).await?;
        let Some(renew_statement) = &role.renew_statement else {
            return Ok(());
        };
        let statement = render_statement(renew_statement, username, "", new_expires_at);
        client.execute_renew(&statement).await
    }

    async fn pool_for(
        &self,
        config: &crate::config_store::DynamicSecretsConfig,
    ) -> AgentResult<Arc<dyn db::DbClient>> {
        if let Some(client) = self.pools.get(&config.connection_id).await {
            return Ok(client);
        }
        let client: Arc<dyn db::DbClient> =
            Arc::from(db::connect(config.db_type, &config.dsn, config.max_pool_size).await?);
        self.pools.put(config.connection_id.clone(), client.clone()).await;
        Ok(client)
    }

    fn error_reply(&self, request_id: Option<String>, err: &AgentError) -> DynamicClientMessage {
        DynamicClientMessage::Error {
            request_id,
            code: ErrorCode::from_error(err),
            message: err.to_string(),
        }
    }
}

fn generate_password() -> String {
    let mut bytes = [0u8; GENERATED_PASSWORD_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

fn parse_public_key(encoded: &str) -> AgentResult<PublicKey> {
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
        .map_err(|e| AgentError::DecryptionFailed(format!("malformed vault public key: {e}")))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AgentError::DecryptionFailed("vault public key is not 32 bytes".to_string()))?;
    Ok(PublicKey::from(array))
}
