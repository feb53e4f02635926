//! Persistent WebSocket connection to the vault control-plane.
//!
//! The reader loop, heartbeat ticker, and pong-staleness monitor run as
//! independent tasks so a stuck reader can't starve the heartbeat and a
//! slow heartbeat can't block delivery of events (spec §4.5, §5).

use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, instrument, warn};

use crate::backoff::{
    self, HEARTBEAT_INTERVAL, PONG_TIMEOUT, STALENESS_POLL_INTERVAL, STALE_THRESHOLD,
};
use crate::dto::{ClientMessage, ServerMessage, Topic};
use crate::hooks::ChannelHooks;
use crate::subscription::{build_ws_url, ConnectParams};

/// How the channel currently wants its subscriptions and credentials
/// described; read fresh on every (re)connect attempt so C6 and C7 can
/// mutate it in place between attempts.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub base_url: String,
    pub update_channel: String,
    pub platform: String,
    pub hostname: String,
    pub agent_version: String,
}

/// Live, mutable connection parameters shared with the rest of the agent.
pub struct ChannelState {
    pub config: RwLock<ChannelConfig>,
    pub api_key: RwLock<String>,
    pub cert_ids: RwLock<Vec<String>>,
    pub secret_ids: RwLock<Vec<String>>,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ChannelState {
    pub fn new(config: ChannelConfig, api_key: String) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            config: RwLock::new(config),
            api_key: RwLock::new(api_key),
            cert_ids: RwLock::new(Vec::new()),
            secret_ids: RwLock::new(Vec::new()),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    /// Queues a pre-serialized JSON text frame to be sent on the next
    /// active connection. Used by collaborators (the sync engine, the
    /// dynamic-credential agent) that reply to server-sent events with
    /// their own typed message enums rather than `ClientMessage`.
    pub fn send_raw(&self, text: String) {
        let _ = self.outbound_tx.send(text);
    }

    async fn connect_params(&self) -> (String, ConnectParams) {
        let config = self.config.read().await.clone();
        let params = ConnectParams {
            api_key: self.api_key.read().await.clone(),
            hostname: config.hostname.clone(),
            version: config.agent_version.clone(),
            platform: config.platform.clone(),
            cert_ids: self.cert_ids.read().await.clone(),
            secret_ids: self.secret_ids.read().await.clone(),
            update_channel: config.update_channel.clone(),
        };
        (config.base_url, params)
    }

    pub async fn set_subscriptions(&self, cert_ids: Vec<String>, secret_ids: Vec<String>) {
        *self.cert_ids.write().await = cert_ids;
        *self.secret_ids.write().await = secret_ids;
    }

    pub async fn set_api_key(&self, api_key: String) {
        *self.api_key.write().await = api_key;
    }
}

enum ConnectOutcome {
    Disconnected,
    AuthFailure,
}

/// Drives the reconnect loop for the lifetime of the agent.
pub struct EventChannel {
    state: Arc<ChannelState>,
    hooks: Arc<dyn ChannelHooks>,
    shutdown: watch::Receiver<bool>,
}

impl EventChannel {
    pub fn new(
        state: Arc<ChannelState>,
        hooks: Arc<dyn ChannelHooks>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            state,
            hooks,
            shutdown,
        }
    }

    /// Runs until `shutdown` fires. Authentication failures at handshake
    /// skip the normal exponential backoff entirely — they call out to
    /// `on_auth_failure` and wait for the controller to mint a fresh key
    /// before trying again.
    #[instrument(skip_all)]
    pub async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            if *self.shutdown.borrow() {
                return;
            }

            match self.connect_and_serve().await {
                ConnectOutcome::AuthFailure => {
                    warn!("websocket handshake rejected (401), notifying managed-key controller");
                    self.hooks.on_auth_failure().await;
                    tokio::time::sleep(backoff::RECONNECT_SETTLE).await;
                }
                ConnectOutcome::Disconnected => {
                    let delay = backoff::reconnect_delay(attempt);
                    attempt = attempt.saturating_add(1);
                    warn!(attempt, delay_ms = %delay.as_millis(), "websocket disconnected, reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => {
                            if *self.shutdown.borrow() {
                                return;
                            }
                        }
                    }
                    continue;
                }
            }

            attempt = 0;
        }
    }

    async fn connect_and_serve(&self) -> ConnectOutcome {
        let (base_url, params) = self.state.connect_params().await;
        let url = match build_ws_url(&base_url, &params) {
            Ok(url) => url,
            Err(err) => {
                warn!(%err, "invalid websocket base url");
                return ConnectOutcome::Disconnected;
            }
        };

        let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(tokio_tungstenite::tungstenite::Error::Http(response))
                if response.status() == StatusCode::UNAUTHORIZED =>
            {
                return ConnectOutcome::AuthFailure;
            }
            Err(err) => {
                warn!(%err, "websocket connect failed");
                return ConnectOutcome::Disconnected;
            }
        };

        info!("websocket connected");
        self.hooks.on_reconnected().await;
        self.serve(stream).await
    }

    async fn serve(
        &self,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> ConnectOutcome {
        let (write, mut read) = stream.split();
        let write = Arc::new(Mutex::new(write));
        let last_pong_at = Arc::new(RwLock::new(Instant::now()));
        let last_ping_at = Arc::new(RwLock::new(Instant::now()));
        let (stale_tx, mut stale_rx) = watch::channel(false);

        let heartbeat_write = write.clone();
        let heartbeat_last_ping = last_ping_at.clone();
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                let payload = match serde_json::to_string(&ClientMessage::Ping) {
                    Ok(payload) => payload,
                    Err(_) => continue,
                };
                let mut sink = heartbeat_write.lock().await;
                if sink.send(Message::Text(payload)).await.is_err() {
                    return;
                }
                *heartbeat_last_ping.write().await = Instant::now();
            }
        });

        let outbound_write = write.clone();
        let outbound_state = self.state.clone();
        let outbound = tokio::spawn(async move {
            let mut rx = outbound_state.outbound_rx.lock().await;
            while let Some(text) = rx.recv().await {
                let mut sink = outbound_write.lock().await;
                if sink.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
        });

        let monitor_last_pong = last_pong_at.clone();
        let monitor_last_ping = last_ping_at.clone();
        let monitor = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STALENESS_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let since_pong = monitor_last_pong.read().await.elapsed();
                let since_ping = monitor_last_ping.read().await.elapsed();
                let pong_overdue = since_ping >= PONG_TIMEOUT && since_pong >= PONG_TIMEOUT;
                if since_pong >= STALE_THRESHOLD || pong_overdue {
                    let _ = stale_tx.send(true);
                    return;
                }
            }
        });

        let outcome = loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text, &last_pong_at).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            *last_pong_at.write().await = Instant::now();
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(%err, "websocket read error");
                            break ConnectOutcome::Disconnected;
                        }
                        None => break ConnectOutcome::Disconnected,
                    }
                }
                changed = stale_rx.changed() => {
                    if changed.is_ok() && *stale_rx.borrow() {
                        warn!("websocket connection stale, forcing reconnect");
                        break ConnectOutcome::Disconnected;
                    }
                }
            }
        };

        heartbeat.abort();
        monitor.abort();
        outbound.abort();
        outcome
    }

    async fn handle_text(&self, text: &str, last_pong_at: &Arc<RwLock<Instant>>) {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "unparseable websocket message");
                return;
            }
        };

        match message {
            ServerMessage::Pong => {
                *last_pong_at.write().await = Instant::now();
            }
            ServerMessage::Event { topic, data } => {
                self.hooks.on_event(topic, data).await;
            }
            ServerMessage::Registered { agent_id } => {
                info!(agent_id, "registered with vault control-plane");
            }
            ServerMessage::Subscribed { .. } => {}
            ServerMessage::Error { message } => {
                warn!(message, "server reported websocket error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_state_connect_params_reflect_live_subscriptions() {
        let state = ChannelState::new(
            ChannelConfig {
                base_url: "wss://vault.internal".to_string(),
                update_channel: "stable".to_string(),
                platform: "linux".to_string(),
                hostname: "host-a".to_string(),
                agent_version: "1.0.0".to_string(),
            },
            "key-1".to_string(),
        );

        state
            .set_subscriptions(vec!["c1".to_string()], vec!["s1".to_string()])
            .await;

        let (base_url, params) = state.connect_params().await;
        assert_eq!(base_url, "wss://vault.internal");
        assert_eq!(params.cert_ids, vec!["c1".to_string()]);
        assert_eq!(params.secret_ids, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn set_api_key_is_visible_to_the_next_connect_params_read() {
        let state = ChannelState::new(
            ChannelConfig {
                base_url: "wss://vault.internal".to_string(),
                update_channel: "stable".to_string(),
                platform: "linux".to_string(),
                hostname: "host-a".to_string(),
                agent_version: "1.0.0".to_string(),
            },
            "old-key".to_string(),
        );

        state.set_api_key("new-key".to_string()).await;
        let (_, params) = state.connect_params().await;
        assert_eq!(params.api_key, "new-key");
    }
}
