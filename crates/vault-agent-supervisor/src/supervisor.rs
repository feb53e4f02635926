//! Launches and supervises the wrapped child process in exec mode.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

use vault_agent_common::{AgentError, AgentEvent, AgentResult, PluginSink};

use crate::env_builder::{to_process_env, CredentialSource, EnvBuilder, ResolvedVar};
use crate::restart::RestartPolicy;

/// A reason the supervisor decides a restart is warranted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    SecretDeployed,
    KeyRotated,
    ChildExited,
}

impl RestartReason {
    fn as_label(&self) -> &'static str {
        match self {
            RestartReason::SecretDeployed => "secret_deployed",
            RestartReason::KeyRotated => "key_rotated",
            RestartReason::ChildExited => "child_exited",
        }
    }
}

/// Shared handle a plugin-event fan-out can hold onto and push
/// `SecretDeployed`/`KeyRotated` notifications through, independent of the
/// `Supervisor`'s own `&mut self` run loop. `Supervisor::restart_trigger`
/// hands out clones of this as a `PluginSink`.
#[derive(Default)]
struct RestartSignal {
    notify: Notify,
    reason: Mutex<Option<RestartReason>>,
}

impl RestartSignal {
    fn request(&self, reason: RestartReason) {
        *self.reason.lock().unwrap() = Some(reason);
        self.notify.notify_one();
    }

    async fn requested(&self) -> RestartReason {
        self.notify.notified().await;
        self.reason.lock().unwrap().take().unwrap_or(RestartReason::ChildExited)
    }
}

impl PluginSink for RestartSignal {
    fn emit(&self, event: &AgentEvent) {
        let reason = match event {
            AgentEvent::SecretDeployed { .. } => RestartReason::SecretDeployed,
            AgentEvent::KeyRotated { .. } => RestartReason::KeyRotated,
            _ => return,
        };
        self.request(reason);
    }
}

/// Outcome of one child-process run: either it exited on its own, or an
/// external event asked the supervisor to restart it while it was healthy.
enum SpawnOutcome {
    Exited(std::process::ExitStatus),
    RestartRequested(RestartReason),
}

/// Configuration for the wrapped child process.
pub struct ExecConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env_mappings: Vec<(String, String)>,
    pub secrets_dir: PathBuf,
    pub max_restarts: u32,
}

/// Supervises a single wrapped child process across its lifetime.
pub struct Supervisor<'a> {
    config: ExecConfig,
    source: &'a dyn CredentialSource,
    sink: Arc<dyn PluginSink>,
    restart_policy: RestartPolicy,
    materialized_files: Vec<PathBuf>,
    restart_signal: Arc<RestartSignal>,
}

impl<'a> Supervisor<'a> {
    pub fn new(config: ExecConfig, source: &'a dyn CredentialSource, sink: Arc<dyn PluginSink>) -> Self {
        let max_restarts = config.max_restarts;
        Self {
            config,
            source,
            sink,
            restart_policy: RestartPolicy::new(max_restarts),
            materialized_files: Vec::new(),
            restart_signal: Arc::new(RestartSignal::default()),
        }
    }

    /// A `PluginSink` handle that requests a restart of the wrapped child
    /// when it observes `AgentEvent::SecretDeployed` or `KeyRotated`.
    /// Register this with the process's `CompositeSink` to let a
    /// secret-deploy or key-rotation event trigger a restart per spec.
    pub fn restart_trigger(&self) -> Arc<dyn PluginSink> {
        self.restart_signal.clone()
    }

    async fn build_env(&mut self) -> AgentResult<HashMap<String, String>> {
        self.cleanup_materialized_files();

        let builder = EnvBuilder::new(self.source, self.config.secrets_dir.clone());
        let resolved = builder.build(&self.config.env_mappings).await?;

        for var in resolved.values() {
            if let ResolvedVar::File(path) = var {
                self.materialized_files.push(path.clone());
            }
        }

        Ok(to_process_env(&resolved))
    }

    fn cleanup_materialized_files(&mut self) {
        for path in self.materialized_files.drain(..) {
            crate::secrets_dir::zero_and_unlink(&path);
        }
    }

    /// Spawns the child process and waits for it to either exit on its own
    /// or be asked to restart by `restart_trigger`, killing it in the
    /// latter case. Callers drive the restart loop around this.
    #[instrument(skip(self), fields(command = %self.config.command))]
    async fn spawn_once(&mut self) -> AgentResult<SpawnOutcome> {
        let env = self.build_env().await?;

        let mut command = Command::new(&self.config.command);
        command.args(&self.config.args);
        command.envs(&env);

        let mut child = command.spawn().map_err(|source| AgentError::Io {
            path: self.config.command.clone(),
            source,
        })?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|source| AgentError::Io {
                    path: self.config.command.clone(),
                    source,
                })?;
                Ok(SpawnOutcome::Exited(status))
            }
            reason = self.restart_signal.requested() => {
                if let Err(err) = child.start_kill() {
                    warn!(error = %err, "failed to signal wrapped process for restart");
                }
                let _ = child.wait().await;
                Ok(SpawnOutcome::RestartRequested(reason))
            }
        }
    }

    /// Runs the child once, applying restart policy when it exits.
    /// Returns when the policy gives up or `shutdown` fires.
    pub async fn run(&mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                self.cleanup_materialized_files();
                return;
            }

            let mut skip_backoff = false;

            match self.spawn_once().await {
                Ok(SpawnOutcome::Exited(status)) if status.success() => {
                    info!("wrapped process exited cleanly");
                    self.restart_policy.reset();
                }
                Ok(SpawnOutcome::Exited(status)) => {
                    warn!(?status, "wrapped process exited with failure");
                    self.request_restart(RestartReason::ChildExited).await;
                }
                Ok(SpawnOutcome::RestartRequested(reason)) => {
                    info!(reason = reason.as_label(), "restarting wrapped process for event");
                    self.request_restart(reason).await;
                    skip_backoff = true;
                }
                Err(err) => {
                    warn!(error = %err, "failed to spawn wrapped process");
                    self.request_restart(RestartReason::ChildExited).await;
                }
            }

            if skip_backoff {
                continue;
            }

            if self.restart_policy.is_terminal() {
                warn!("maximum restart attempts exceeded, giving up");
                metrics::counter!("max_restarts_total").increment(1);
                self.cleanup_materialized_files();
                return;
            }

            let delay = self
                .restart_policy
                .next_delay()
                .unwrap_or(std::time::Duration::from_secs(1));

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.cleanup_materialized_files();
                        return;
                    }
                }
            }
        }
    }

    async fn request_restart(&self, reason: RestartReason) {
        metrics::counter!("restarts_total", "reason" => reason.as_label()).increment(1);
        self.sink.emit(&AgentEvent::ChildRestarted {
            reason: reason.as_label().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_agent_common::NullSink;

    struct NoopSource;

    #[async_trait::async_trait]
    impl CredentialSource for NoopSource {
        async fn bind_managed_api_key(&self, _name: &str) -> AgentResult<String> {
            Ok("unused".to_string())
        }

        async fn get_secret(
            &self,
            _id: &vault_agent_common::RemoteSecretId,
        ) -> AgentResult<std::collections::BTreeMap<String, serde_json::Value>> {
            Ok(Default::default())
        }
    }

    #[tokio::test]
    async fn successful_exit_resets_the_restart_policy() {
        let source = NoopSource;
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig {
            command: "true".to_string(),
            args: vec![],
            env_mappings: vec![],
            secrets_dir: dir.path().to_path_buf(),
            max_restarts: 3,
        };
        let mut supervisor = Supervisor::new(config, &source, std::sync::Arc::new(NullSink));

        let outcome = supervisor.spawn_once().await.unwrap();
        match outcome {
            SpawnOutcome::Exited(status) => assert!(status.success()),
            SpawnOutcome::RestartRequested(_) => panic!("expected a clean exit"),
        }
    }

    #[tokio::test]
    async fn failing_child_triggers_a_restart_request() {
        let source = NoopSource;
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig {
            command: "false".to_string(),
            args: vec![],
            env_mappings: vec![],
            secrets_dir: dir.path().to_path_buf(),
            max_restarts: 1,
        };
        let mut supervisor = Supervisor::new(config, &source, std::sync::Arc::new(NullSink));

        let (_tx, rx) = tokio::sync::watch::channel(false);
        supervisor.run(rx).await;

        assert!(supervisor.restart_policy.is_terminal());
    }

    #[tokio::test]
    async fn a_secret_deployed_event_on_the_restart_trigger_kills_and_restarts_the_child() {
        let source = NoopSource;
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig {
            command: "sleep".to_string(),
            args: vec!["30".to_string()],
            env_mappings: vec![],
            secrets_dir: dir.path().to_path_buf(),
            max_restarts: 3,
        };
        let mut supervisor = Supervisor::new(config, &source, std::sync::Arc::new(NullSink));
        let trigger = supervisor.restart_trigger();

        trigger.emit(&AgentEvent::SecretDeployed {
            target: vault_agent_common::TargetName::new("app"),
            version: 1,
        });

        let outcome = supervisor.spawn_once().await.unwrap();
        match outcome {
            SpawnOutcome::RestartRequested(reason) => assert_eq!(reason, RestartReason::SecretDeployed),
            SpawnOutcome::Exited(_) => panic!("expected a restart request, not a natural exit"),
        }
    }

    #[test]
    fn the_restart_trigger_ignores_unrelated_events() {
        let source = NoopSource;
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig {
            command: "true".to_string(),
            args: vec![],
            env_mappings: vec![],
            secrets_dir: dir.path().to_path_buf(),
            max_restarts: 1,
        };
        let supervisor = Supervisor::new(config, &source, std::sync::Arc::new(NullSink));
        let trigger = supervisor.restart_trigger();

        trigger.emit(&AgentEvent::Reconnected);

        assert!(supervisor.restart_signal.reason.lock().unwrap().is_none());
    }
}
