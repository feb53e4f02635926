//! End-to-end scenarios 3, 4, and 5: managed-key rotation over the
//! WebSocket event path, grace-poll fallback when that event is missed,
//! and stale-key recovery after a rebind.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vault_agent_channel::{ChannelConfig, ChannelState, ChannelHooks, Topic};
use vault_agent_client::VaultClient;
use vault_agent_common::{AgentEvent, AuthConfig, PluginSink, RotationMode};
use vault_agent_keyctl::{ManagedKeyController, RefreshSource};

fn channel_state() -> std::sync::Arc<ChannelState> {
    std::sync::Arc::new(ChannelState::new(
        ChannelConfig {
            base_url: "wss://vault.internal".to_string(),
            update_channel: "stable".to_string(),
            platform: "linux".to_string(),
            hostname: "host-a".to_string(),
            agent_version: "1.0.0".to_string(),
        },
        "k0".to_string(),
    ))
}

fn client(server: &MockServer) -> std::sync::Arc<VaultClient> {
    std::sync::Arc::new(
        VaultClient::new(
            server.uri(),
            "tenant-a".to_string(),
            AuthConfig::ApiKey {
                api_key: "ignored".to_string(),
            },
            false,
        )
        .unwrap(),
    )
}

fn bind_response_body(key: &str) -> serde_json::Value {
    serde_json::json!({
        "key": key,
        "next_rotation_at": (Utc::now() + chrono::Duration::seconds(3600)).to_rfc3339(),
        "grace_expires_at": (Utc::now() + chrono::Duration::seconds(60)).to_rfc3339(),
        "rotation_mode": "scheduled",
    })
}

#[tokio::test]
async fn ws_rotation_event_triggers_a_refresh_and_counts_as_ws_event_source() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/managed-keys/bind"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bind_response_body("k1")))
        .expect(1)
        .mount(&server)
        .await;

    let (_tx, rx) = watch::channel(false);
    let controller = ManagedKeyController::new(
        client(&server),
        channel_state(),
        "primary".to_string(),
        "k0".to_string(),
        None,
        None,
        RotationMode::Scheduled,
        rx,
    );

    controller
        .on_event(
            Topic::Updates,
            serde_json::json!({"type": "key.rotated", "name": "primary"}),
        )
        .await;

    server.verify().await;
}

#[tokio::test]
async fn missed_ws_event_is_caught_by_a_direct_grace_poll_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/managed-keys/bind"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bind_response_body("k1")))
        .expect(1)
        .mount(&server)
        .await;

    let (_tx, rx) = watch::channel(false);
    let controller = ManagedKeyController::new(
        client(&server),
        channel_state(),
        "primary".to_string(),
        "k0".to_string(),
        None,
        None,
        RotationMode::Scheduled,
        rx,
    );

    // No WS event arrives; the grace-period safety poll drives the same
    // refresh critical section directly.
    controller.refresh(RefreshSource::GracePoll).await.unwrap();

    server.verify().await;
}

#[tokio::test]
async fn a_rebind_after_an_auth_rejection_clears_the_stale_flag() {
    let server = MockServer::start().await;
    // Explicit priorities make the fallthrough deterministic: the 401 mock
    // is tried first and, once its single expected hit is spent, wiremock
    // skips it and falls through to the lower-priority 200 mock.
    Mock::given(method("POST"))
        .and(path("/v1/managed-keys/bind"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/managed-keys/bind"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bind_response_body("k1")))
        .with_priority(2)
        .mount(&server)
        .await;

    let (_tx, rx) = watch::channel(false);
    let controller = ManagedKeyController::new(
        client(&server),
        channel_state(),
        "primary".to_string(),
        "k0".to_string(),
        None,
        None,
        RotationMode::Scheduled,
        rx,
    );

    assert!(controller.refresh(RefreshSource::Reconnect).await.is_err());
    assert!(controller.is_stale());

    assert!(controller.refresh(RefreshSource::Reconnect).await.is_ok());
    assert!(!controller.is_stale());
}

#[tokio::test]
async fn repeated_auth_rejection_leaves_the_key_permanently_stale() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/managed-keys/bind"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (_tx, rx) = watch::channel(false);
    let controller = ManagedKeyController::new(
        client(&server),
        channel_state(),
        "primary".to_string(),
        "k0".to_string(),
        None,
        None,
        RotationMode::Scheduled,
        rx,
    );

    assert!(controller.refresh(RefreshSource::Reconnect).await.is_err());
    assert!(controller.is_stale());
    assert!(controller.refresh(RefreshSource::Reconnect).await.is_err());
    assert!(controller.is_stale());
}

struct CountingSink {
    key_rotated: AtomicUsize,
}

impl PluginSink for CountingSink {
    fn emit(&self, event: &AgentEvent) {
        if matches!(event, AgentEvent::KeyRotated { .. }) {
            self.key_rotated.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn a_rotation_that_changes_the_key_notifies_the_plugin_sink_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/managed-keys/bind"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bind_response_body("k1")))
        .mount(&server)
        .await;

    let (_tx, rx) = watch::channel(false);
    let sink = std::sync::Arc::new(CountingSink {
        key_rotated: AtomicUsize::new(0),
    });
    let controller = ManagedKeyController::new_with_sink(
        client(&server),
        channel_state(),
        "primary".to_string(),
        "k0".to_string(),
        None,
        None,
        RotationMode::Scheduled,
        rx,
        sink.clone(),
    );

    controller.refresh(RefreshSource::GracePoll).await.unwrap();
    assert_eq!(sink.key_rotated.load(Ordering::SeqCst), 1);

    // Binding the same key again is not a rotation.
    controller.refresh(RefreshSource::GracePoll).await.unwrap();
    assert_eq!(sink.key_rotated.load(Ordering::SeqCst), 1);
}
