//! The optional health HTTP surface. Answers liveness/readiness and serves
//! the same `HealthResponse` snapshot other crates report into; Prometheus
//! text export is an external exporter's job (spec §6), so `/metrics` is a
//! stub here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use vault_agent_common::{HealthResponse, HealthStatus};

use crate::engine::SyncEngine;
use crate::state::EngineState;

/// Shared state the health handlers read from; updated by the engine and
/// the event channel as connectivity changes.
pub struct HealthState {
    started_at: Instant,
    vault_reachable: AtomicBool,
    websocket_state: RwLock<String>,
    last_sync_at: RwLock<Option<DateTime<Utc>>>,
    engine: Arc<SyncEngine>,
}

impl HealthState {
    pub fn new(engine: Arc<SyncEngine>) -> Arc<Self> {
        Arc::new(Self {
            started_at: Instant::now(),
            vault_reachable: AtomicBool::new(false),
            websocket_state: RwLock::new("connecting".to_string()),
            last_sync_at: RwLock::new(None),
            engine,
        })
    }

    pub fn set_vault_reachable(&self, reachable: bool) {
        self.vault_reachable.store(reachable, Ordering::SeqCst);
    }

    pub async fn set_websocket_state(&self, state: impl Into<String>) {
        *self.websocket_state.write().await = state.into();
    }

    pub async fn record_sync(&self) {
        *self.last_sync_at.write().await = Some(Utc::now());
    }

    async fn snapshot(&self) -> HealthResponse {
        let uptime_secs = self.started_at.elapsed().as_secs();
        let ws_state = self.websocket_state.read().await.clone();
        let mut response = HealthResponse::new(
            self.vault_reachable.load(Ordering::SeqCst),
            ws_state,
            uptime_secs,
        );
        if let Some(ts) = *self.last_sync_at.read().await {
            response = response.with_last_sync(ts.to_rfc3339());
        }
        response
    }
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/metrics", get(metrics_stub))
        .with_state(state)
}

async fn health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(state.snapshot().await)
}

async fn ready(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let snapshot = state.snapshot().await;
    let engine_running = matches!(state.engine.state().await, EngineState::Running);
    if engine_running && snapshot.status != HealthStatus::Unhealthy {
        (StatusCode::OK, Json(snapshot)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(snapshot)).into_response()
    }
}

async fn live() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_stub() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        "prometheus text export renders via an external exporter",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use vault_agent_client::{DecryptedCertificate, SecretResponse};
    use vault_agent_common::{AgentResult, NullSink, RemoteCertId, RemoteSecretId};
    use vault_agent_deploy::{CertificateSource, Deployer, SecretSource};

    struct NoCertSource;

    #[async_trait]
    impl CertificateSource for NoCertSource {
        async fn decrypt_certificate(&self, _id: RemoteCertId, _purpose: &str) -> AgentResult<DecryptedCertificate> {
            unreachable!("no targets are registered in these tests")
        }
        async fn ack_certificate_delivery(&self, _id: RemoteCertId, _host: &str, _version: u64) {}
    }

    struct NoSecretSource;

    #[async_trait]
    impl SecretSource for NoSecretSource {
        async fn get_secret(&self, _id: &RemoteSecretId) -> AgentResult<SecretResponse> {
            Ok(SecretResponse {
                data: BTreeMap::new(),
                version: 1,
                type_tag: "kv".to_string(),
                alias: None,
            })
        }
    }

    fn idle_engine() -> Arc<SyncEngine> {
        Arc::new(SyncEngine::new(
            Arc::new(crate::registry::TargetRegistry::new(vec![], vec![])),
            Arc::new(Deployer::new(
                Arc::new(NoCertSource),
                Arc::new(NoSecretSource),
                "host-1",
                Arc::new(NullSink),
            )),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicBool::new(false)),
            Duration::from_secs(3600),
        ))
    }

    #[tokio::test]
    async fn live_always_reports_ok() {
        let response = live().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_reports_unavailable_before_the_engine_is_running() {
        let state = HealthState::new(idle_engine());
        let response = ready(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_endpoint_is_a_documented_stub() {
        let response = metrics_stub().await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
