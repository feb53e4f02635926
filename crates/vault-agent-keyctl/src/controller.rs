//! Managed-key refresh controller: the serialization point for the agent's
//! own credential. Nothing else in the process writes the stored API key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};

use vault_agent_channel::{ChannelHooks, ChannelState, Topic};
use vault_agent_client::VaultClient;
use vault_agent_common::{AgentError, AgentEvent, AgentResult, NullSink, PluginSink, RotationMode};

use crate::schedule::{self, MAX_RETRY_ATTEMPTS};
use crate::state::{RefreshSource, RotationState, StateMachine};

/// Bookkeeping for deciding whether a rotation was observed over WS before
/// a poll fallback needs to kick in.
#[derive(Debug, Clone, Default)]
pub struct RotationTracking {
    pub last_ws_event_at: Option<DateTime<Utc>>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub expected_rotation_at: Option<DateTime<Utc>>,
    pub ws_event_received: bool,
    pub missed_rotations_count: u32,
}

struct Inner {
    current_key: String,
    next_rotation_at: Option<DateTime<Utc>>,
    grace_expires_at: Option<DateTime<Utc>>,
    rotation_mode: RotationMode,
    tracking: RotationTracking,
    machine: StateMachine,
}

/// Drives the refresh scheduler, grace-period safety poll, and heartbeat
/// freshness monitor for a single managed key.
pub struct ManagedKeyController {
    client: Arc<VaultClient>,
    channel_state: Arc<ChannelState>,
    key_name: String,
    inner: Mutex<Inner>,
    stale: AtomicBool,
    shutdown: watch::Receiver<bool>,
    sink: Arc<dyn PluginSink>,
}

impl ManagedKeyController {
    pub fn new(
        client: Arc<VaultClient>,
        channel_state: Arc<ChannelState>,
        key_name: String,
        initial_key: String,
        next_rotation_at: Option<DateTime<Utc>>,
        grace_expires_at: Option<DateTime<Utc>>,
        rotation_mode: RotationMode,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Self::new_with_sink(
            client,
            channel_state,
            key_name,
            initial_key,
            next_rotation_at,
            grace_expires_at,
            rotation_mode,
            shutdown,
            Arc::new(NullSink),
        )
    }

    /// Like `new`, but also wires a `PluginSink` that gets `AgentEvent::KeyRotated`
    /// on every rotation this controller observes — e.g. a supervisor's
    /// `restart_trigger()`, to restart a wrapped child on a key rotation.
    pub fn new_with_sink(
        client: Arc<VaultClient>,
        channel_state: Arc<ChannelState>,
        key_name: String,
        initial_key: String,
        next_rotation_at: Option<DateTime<Utc>>,
        grace_expires_at: Option<DateTime<Utc>>,
        rotation_mode: RotationMode,
        shutdown: watch::Receiver<bool>,
        sink: Arc<dyn PluginSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            channel_state,
            key_name,
            inner: Mutex::new(Inner {
                current_key: initial_key,
                next_rotation_at,
                grace_expires_at,
                rotation_mode,
                tracking: RotationTracking::default(),
                machine: StateMachine::new(),
            }),
            stale: AtomicBool::new(false),
            shutdown,
            sink,
        })
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// The refresh critical section: bind, compare, persist, notify.
    #[instrument(skip(self), fields(source = source.as_label()))]
    pub async fn refresh(&self, source: RefreshSource) -> AgentResult<()> {
        let mut guard = self.inner.lock().await;

        if guard.machine.current() == RotationState::Idle {
            guard
                .machine
                .transition(RotationState::Refreshing, Some(source.as_label().to_string()))
                .ok();
        }

        let result = self.client.bind_managed_api_key(&self.key_name).await;

        match result {
            Ok(response) => {
                let rotated = response.key != guard.current_key;
                if rotated {
                    info!(key_name = %self.key_name, source = source.as_label(), "managed key rotated");
                    guard.current_key = response.key.clone();
                    self.channel_state.set_api_key(response.key).await;
                    self.sink.emit(&AgentEvent::KeyRotated {
                        name: self.key_name.clone(),
                    });
                }
                guard.next_rotation_at = Some(response.next_rotation_at);
                guard.grace_expires_at = Some(response.grace_expires_at);
                guard.rotation_mode = response.rotation_mode;
                guard.tracking.ws_event_received = false;
                guard.tracking.expected_rotation_at = Some(response.next_rotation_at);

                if guard.machine.current() == RotationState::Refreshing {
                    guard.machine.transition(RotationState::Idle, None).ok();
                }
                self.stale.store(false, Ordering::SeqCst);

                metrics::counter!("rotations_total", "source" => source.as_label()).increment(1);
                metrics::gauge!("last_rotation_timestamp").set(Utc::now().timestamp() as f64);
                metrics::gauge!("stale").set(0.0);

                Ok(())
            }
            Err(err) => {
                warn!(key_name = %self.key_name, source = source.as_label(), error = %err, "managed key refresh failed");
                metrics::counter!("refresh_failures_total", "source" => source.as_label())
                    .increment(1);

                let is_auth_rejection = matches!(err, AgentError::AuthRejected { .. });

                if is_auth_rejection && matches!(source, RefreshSource::Reconnect) {
                    self.stale.store(true, Ordering::SeqCst);
                    metrics::gauge!("stale").set(1.0);
                    if guard.machine.current() != RotationState::Stale {
                        guard
                            .machine
                            .transition(RotationState::Stale, Some("second auth rejection".to_string()))
                            .ok();
                    }
                    warn!(
                        key_name = %self.key_name,
                        "managed key is stale — operator must rebind this host's credential manually"
                    );
                } else if guard.machine.current() == RotationState::Refreshing {
                    guard.machine.transition(RotationState::Retrying, None).ok();
                }

                Err(err)
            }
        }
    }

    /// Refresh with the bounded retry documented for WS-triggered rotations.
    async fn refresh_with_retry(&self, source: RefreshSource) {
        let mut attempt = 0;
        loop {
            if self.refresh(source).await.is_ok() {
                let mut guard = self.inner.lock().await;
                if guard.machine.current() == RotationState::Retrying {
                    guard.machine.transition(RotationState::Idle, None).ok();
                }
                return;
            }
            if self.is_stale() || attempt >= MAX_RETRY_ATTEMPTS {
                return;
            }
            tokio::time::sleep(schedule::retry_delay(attempt)).await;
            attempt += 1;
        }
    }

    /// Spawns the scheduler, grace-poll, and heartbeat loops; runs until shutdown.
    pub async fn run(self: Arc<Self>) {
        let scheduler = {
            let this = self.clone();
            let mut shutdown = this.shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let delay = {
                        let guard = this.inner.lock().await;
                        schedule::next_refresh_delay(
                            Utc::now(),
                            guard.next_rotation_at,
                            guard.grace_expires_at,
                        )
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            let _ = this.refresh(RefreshSource::Heartbeat).await;
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() { return; }
                        }
                    }
                }
            })
        };

        let grace_poll = {
            let this = self.clone();
            let mut shutdown = this.shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let grace_expires_at = { this.inner.lock().await.grace_expires_at };
                    let Some(grace_at) = grace_expires_at else {
                        tokio::select! {
                            _ = tokio::time::sleep(std::time::Duration::from_secs(60)) => continue,
                            _ = shutdown.changed() => { if *shutdown.borrow() { return; } continue; }
                        }
                    };
                    let delay = schedule::grace_poll_delay(Utc::now(), grace_at);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            let observed = { this.inner.lock().await.tracking.ws_event_received };
                            if !observed {
                                metrics::counter!("grace_polls_total").increment(1);
                                let _ = this.refresh(RefreshSource::GracePoll).await;
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() { return; }
                        }
                    }
                }
            })
        };

        let heartbeat = {
            let this = self.clone();
            let mut shutdown = this.shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            metrics::counter!("heartbeat_checks_total").increment(1);
                            let (expected, observed, grace_expires_at) = {
                                let guard = this.inner.lock().await;
                                (guard.tracking.expected_rotation_at, guard.tracking.ws_event_received, guard.grace_expires_at)
                            };
                            if let Some(remaining_grace) = grace_expires_at {
                                let remaining = (remaining_grace - Utc::now()).num_seconds().max(0);
                                metrics::gauge!("grace_remaining_seconds").set(remaining as f64);
                            }
                            if let Some(expected_at) = expected {
                                let overdue = Utc::now() > expected_at + chrono::Duration::seconds(60);
                                if overdue && !observed {
                                    let mut guard = this.inner.lock().await;
                                    guard.tracking.missed_rotations_count += 1;
                                    drop(guard);
                                    let _ = this.refresh(RefreshSource::Heartbeat).await;
                                }
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() { return; }
                        }
                    }
                }
            })
        };

        let mut shutdown = self.shutdown.clone();
        let _ = shutdown.changed().await;
        scheduler.abort();
        grace_poll.abort();
        heartbeat.abort();
    }
}

#[async_trait]
impl ChannelHooks for ManagedKeyController {
    async fn on_reconnected(&self) {
        tokio::time::sleep(vault_agent_channel::RECONNECT_SETTLE).await;
        let _ = self.refresh(RefreshSource::Reconnect).await;
    }

    async fn on_auth_failure(&self) {
        let _ = self.refresh(RefreshSource::Reconnect).await;
    }

    async fn on_event(&self, topic: Topic, data: serde_json::Value) {
        if !matches!(topic, Topic::Updates) {
            return;
        }
        let Some(event_type) = data.get("type").and_then(|v| v.as_str()) else {
            return;
        };
        if event_type != "key.rotated" {
            return;
        }
        let matches_key = data
            .get("name")
            .and_then(|v| v.as_str())
            .map(|name| name == self.key_name)
            .unwrap_or(false);
        if !matches_key {
            return;
        }

        metrics::counter!("ws_events_total").increment(1);
        {
            let mut guard = self.inner.lock().await;
            guard.tracking.ws_event_received = true;
            guard.tracking.last_ws_event_at = Some(Utc::now());
        }
        self.refresh_with_retry(RefreshSource::WsEvent).await;
    }
}
