//! Orchestrates initial sync, the periodic poll-fallback timer, and the
//! `running -> draining -> stopped` shutdown sequence.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};

use vault_agent_deploy::Deployer;

use crate::registry::TargetRegistry;
use crate::state::{EngineState, StateMachine};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3600);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct SyncEngine {
    machine: Mutex<StateMachine>,
    registry: Arc<TargetRegistry>,
    deployer: Arc<Deployer>,
    active_deployments: Arc<AtomicUsize>,
    draining: Arc<AtomicBool>,
    poll_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SyncEngine {
    pub fn new(
        registry: Arc<TargetRegistry>,
        deployer: Arc<Deployer>,
        active_deployments: Arc<AtomicUsize>,
        draining: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            machine: Mutex::new(StateMachine::new()),
            registry,
            deployer,
            active_deployments,
            draining,
            poll_interval,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// A fresh receiver for collaborators (the event channel) that also
    /// need to stop when the engine does.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub async fn state(&self) -> EngineState {
        self.machine.lock().await.current()
    }

    pub fn active_deployments(&self) -> usize {
        self.active_deployments.load(Ordering::SeqCst)
    }

    /// Transitions to `running`, performs the initial sync, then runs the
    /// poll-fallback loop until `shutdown` is called from elsewhere.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        {
            let mut guard = self.machine.lock().await;
            if let Err(err) = guard.transition(EngineState::Running, None) {
                warn!(%err, "engine run() called from a non-starting state");
                return;
            }
        }

        self.initial_sync().await;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.tick().await; // first tick fires immediately; initial_sync already covered it
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_fallback().await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn initial_sync(&self) {
        info!("performing initial sync after channel open");
        self.deploy_all(false).await;
    }

    async fn poll_fallback(&self) {
        info!("running periodic poll-fallback sync");
        self.deploy_all(false).await;
    }

    async fn deploy_all(&self, force: bool) {
        self.active_deployments.fetch_add(1, Ordering::SeqCst);

        let cert_results = self.registry.deploy_all_certificates(&self.deployer, force).await;
        for result in &cert_results {
            if let Err(err) = result {
                warn!(%err, "certificate deploy failed during sync");
            }
        }

        let secret_results = self.registry.deploy_all_secrets(&self.deployer, force).await;
        for result in &secret_results {
            if let Err(err) = result {
                warn!(%err, "secret deploy failed during sync");
            }
        }

        self.active_deployments.fetch_sub(1, Ordering::SeqCst);
    }

    /// Drives `running -> draining -> stopped`: stops accepting new events
    /// (the caller's `draining` flag is what `CompositeHooks` checks),
    /// signals the poll loop and channel to stop, then waits up to 30s for
    /// in-flight deployments to finish.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, reason: impl Into<String> + std::fmt::Debug) {
        info!(?reason, "engine shutting down");
        self.draining.store(true, Ordering::SeqCst);

        {
            let mut guard = self.machine.lock().await;
            if let Err(err) = guard.transition(EngineState::Draining, Some(format!("{reason:?}"))) {
                warn!(%err, "shutdown requested from a non-running state");
                return;
            }
        }

        let _ = self.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while self.active_deployments.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        if self.active_deployments.load(Ordering::SeqCst) > 0 {
            warn!("drain timeout elapsed with deployments still in flight");
        }

        let mut guard = self.machine.lock().await;
        if let Err(err) = guard.transition(EngineState::Stopped, None) {
            warn!(%err, "failed to record final stopped transition");
        }
    }
}
