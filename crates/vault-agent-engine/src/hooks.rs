//! Fans channel events out to the sync engine's own target-routing logic,
//! the managed-key controller, and the dynamic-credential agent — the one
//! slot `EventChannel::new` accepts, generalized the way `CompositeSink`
//! fans `PluginSink` out to multiple plugin handlers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use vault_agent_channel::{ChannelHooks, ChannelState, Topic};
use vault_agent_deploy::Deployer;
use vault_agent_dynamic::{DynamicCredentialAgent, DynamicServerMessage};

use crate::registry::TargetRegistry;

/// Fanned out to every registered sub-hook for `on_reconnected`/`on_auth_failure`.
/// Only the managed-key controller (C7) needs these today, but the slot is
/// open to more than one without changing `EventChannel`.
pub struct CompositeHooks {
    sub_hooks: Vec<Arc<dyn ChannelHooks>>,
    registry: Arc<TargetRegistry>,
    deployer: Arc<Deployer>,
    dynamic_agent: Option<Arc<DynamicCredentialAgent>>,
    channel_state: Arc<ChannelState>,
    active_deployments: Arc<AtomicUsize>,
    draining: Arc<AtomicBool>,
}

impl CompositeHooks {
    pub fn new(
        registry: Arc<TargetRegistry>,
        deployer: Arc<Deployer>,
        channel_state: Arc<ChannelState>,
        active_deployments: Arc<AtomicUsize>,
        draining: Arc<AtomicBool>,
    ) -> Self {
        Self {
            sub_hooks: Vec::new(),
            registry,
            deployer,
            dynamic_agent: None,
            channel_state,
            active_deployments,
            draining,
        }
    }

    pub fn register(&mut self, hook: Arc<dyn ChannelHooks>) {
        self.sub_hooks.push(hook);
    }

    pub fn set_dynamic_agent(&mut self, agent: Arc<DynamicCredentialAgent>) {
        self.dynamic_agent = Some(agent);
    }

    async fn route_certificate_event(&self, data: &serde_json::Value) {
        let Some(id) = data.get("id").and_then(|v| v.as_str()) else {
            warn!("certificate event missing id field");
            return;
        };
        let Some(index) = self.registry.certificate_index_for(id).await else {
            warn!(id, "certificate event does not match any configured target");
            return;
        };

        self.active_deployments.fetch_add(1, Ordering::SeqCst);
        let deployer = self.deployer.clone();
        let registry = self.registry.clone();
        let counter = self.active_deployments.clone();
        tokio::spawn(async move {
            if let Some(Err(err)) = registry.deploy_certificate_at(index, &deployer, true).await {
                warn!(%err, "certificate deploy failed");
            }
            counter.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn route_secret_event(&self, data: &serde_json::Value) {
        let Some(id) = data.get("id").and_then(|v| v.as_str()) else {
            warn!("secret event missing id field");
            return;
        };
        let Some(index) = self.registry.secret_index_for(id).await else {
            warn!(id, "secret event does not match any configured target");
            return;
        };

        self.active_deployments.fetch_add(1, Ordering::SeqCst);
        let deployer = self.deployer.clone();
        let registry = self.registry.clone();
        let counter = self.active_deployments.clone();
        tokio::spawn(async move {
            if let Some(Err(err)) = registry.deploy_secret_at(index, &deployer, true).await {
                warn!(%err, "secret deploy failed");
            }
            counter.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn route_dynamic_secrets_event(&self, data: serde_json::Value) {
        let Some(agent) = self.dynamic_agent.as_ref() else {
            return;
        };
        let message: DynamicServerMessage = match serde_json::from_value(data) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "unparseable dynamic-secrets message");
                return;
            }
        };
        let reply = agent.handle(message).await;
        match serde_json::to_string(&reply) {
            Ok(text) => self.channel_state.send_raw(text),
            Err(err) => warn!(%err, "failed to serialize dynamic-secrets reply"),
        }
    }
}

#[async_trait]
impl ChannelHooks for CompositeHooks {
    async fn on_reconnected(&self) {
        for hook in &self.sub_hooks {
            hook.on_reconnected().await;
        }
    }

    async fn on_auth_failure(&self) {
        for hook in &self.sub_hooks {
            hook.on_auth_failure().await;
        }
    }

    #[instrument(skip(self, data))]
    async fn on_event(&self, topic: Topic, data: serde_json::Value) {
        if self.draining.load(Ordering::SeqCst) {
            info!(?topic, "dropping event received while draining");
            return;
        }

        match topic {
            Topic::Certificates => self.route_certificate_event(&data).await,
            Topic::Secrets => self.route_secret_event(&data).await,
            Topic::DynamicSecrets => self.route_dynamic_secrets_event(data).await,
            Topic::Updates => {
                for hook in &self.sub_hooks {
                    hook.on_event(topic, data.clone()).await;
                }
            }
        }
    }
}
