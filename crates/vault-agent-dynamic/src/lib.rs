mod agent;
mod config_store;
mod crypto;
mod db;
mod dto;
mod pool_cache;
mod username;

pub use agent::DynamicCredentialAgent;
pub use config_store::{ConfigStore, DbType, DynamicSecretsConfig, RoleConfig};
pub use crypto::{decrypt, encrypt, EncryptedConfigEnvelope};
pub use db::{connect, DbClient, MysqlClient, PostgresClient};
pub use dto::{ConfigAckStatus, DynamicClientMessage, DynamicServerMessage, ErrorCode};
pub use pool_cache::{PoolCache, IDLE_TTL};
pub use username::{render_statement, render_username};
