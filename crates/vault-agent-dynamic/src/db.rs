//! Database connectivity for dynamic credential issuance: one `DbClient`
//! implementation per supported engine, selected by `DynamicSecretsConfig::db_type`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{MySqlPool, PgPool};
use tokio::sync::Semaphore;

use vault_agent_common::{AgentError, AgentResult};

use crate::config_store::DbType;

/// Executes the three statement kinds a role config carries: create a
/// credential, renew its expiry, and revoke it. Implementations own a
/// connection pool for a single database and translate driver errors into
/// the agent's error taxonomy.
#[async_trait]
pub trait DbClient: Send + Sync {
    async fn execute_create(&self, statement: &str) -> AgentResult<()>;
    async fn execute_renew(&self, statement: &str) -> AgentResult<()>;
    async fn execute_revoke(&self, statement: &str) -> AgentResult<()>;
    async fn ping(&self) -> AgentResult<()>;
    async fn close(&self);
}

pub struct PostgresClient {
    pool: PgPool,
    // Bounds application-level concurrent statement execution independently
    // of sqlx's own pool backpressure, so a burst of generate/revoke calls
    // for one connection can't starve every other connection's pool.
    limiter: Arc<Semaphore>,
}

impl PostgresClient {
    pub async fn connect(dsn: &str, max_connections: u32) -> AgentResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await
            .map_err(|e| AgentError::DbConnectionFailed(e.to_string()))?;
        Ok(Self {
            pool,
            limiter: Arc::new(Semaphore::new(max_connections.max(1) as usize)),
        })
    }
}

#[async_trait]
impl DbClient for PostgresClient {
    async fn execute_create(&self, statement: &str) -> AgentResult<()> {
        let _permit = self.limiter.acquire().await.expect("limiter semaphore is never closed");
        run(&self.pool, statement).await
    }

    async fn execute_renew(&self, statement: &str) -> AgentResult<()> {
        let _permit = self.limiter.acquire().await.expect("limiter semaphore is never closed");
        run(&self.pool, statement).await
    }

    async fn execute_revoke(&self, statement: &str) -> AgentResult<()> {
        let _permit = self.limiter.acquire().await.expect("limiter semaphore is never closed");
        run(&self.pool, statement).await
    }

    async fn ping(&self) -> AgentResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AgentError::DbConnectionFailed(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

async fn run(pool: &PgPool, statement: &str) -> AgentResult<()> {
    sqlx::query(statement)
        .execute(pool)
        .await
        .map_err(|e| AgentError::SqlExecutionFailed(e.to_string()))?;
    Ok(())
}

pub struct MysqlClient {
    pool: MySqlPool,
    limiter: Arc<Semaphore>,
}

impl MysqlClient {
    pub async fn connect(dsn: &str, max_connections: u32) -> AgentResult<Self> {
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await
            .map_err(|e| AgentError::DbConnectionFailed(e.to_string()))?;
        Ok(Self {
            pool,
            limiter: Arc::new(Semaphore::new(max_connections.max(1) as usize)),
        })
    }
}

#[async_trait]
impl DbClient for MysqlClient {
    async fn execute_create(&self, statement: &str) -> AgentResult<()> {
        let _permit = self.limiter.acquire().await.expect("limiter semaphore is never closed");
        run_mysql(&self.pool, statement).await
    }

    async fn execute_renew(&self, statement: &str) -> AgentResult<()> {
        let _permit = self.limiter.acquire().await.expect("limiter semaphore is never closed");
        run_mysql(&self.pool, statement).await
    }

    async fn execute_revoke(&self, statement: &str) -> AgentResult<()> {
        let _permit = self.limiter.acquire().await.expect("limiter semaphore is never closed");
        run_mysql(&self.pool, statement).await
    }

    async fn ping(&self) -> AgentResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AgentError::DbConnectionFailed(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

async fn run_mysql(pool: &MySqlPool, statement: &str) -> AgentResult<()> {
    sqlx::query(statement)
        .execute(pool)
        .await
        .map_err(|e| AgentError::SqlExecutionFailed(e.to_string()))?;
    Ok(())
}

/// Connects to the database named by `db_type`, dispatching to the matching
/// driver.
pub async fn connect(
    db_type: DbType,
    dsn: &str,
    max_connections: u32,
) -> AgentResult<Box<dyn DbClient>> {
    match db_type {
        DbType::Postgresql => Ok(Box::new(PostgresClient::connect(dsn, max_connections).await?)),
        DbType::Mysql => Ok(Box::new(MysqlClient::connect(dsn, max_connections).await?)),
    }
}
