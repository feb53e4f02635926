//! The plugin event sink: a fire-and-forget notification surface for the
//! external plugin-loading subsystem (out of scope per spec §1).

use std::sync::Arc;

use tracing::warn;

use crate::identity::{ConnectionId, LeaseId, RemoteCertId, TargetName};

/// Notifications emitted by C4/C5/C7/C8/C9 toward the plugin sink.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    CertificateDeployed {
        target: TargetName,
        remote_id: RemoteCertId,
        fingerprint: String,
        version: u64,
    },
    SecretDeployed {
        target: TargetName,
        version: u64,
    },
    Reconnected,
    KeyRotated {
        name: String,
    },
    DynamicCredentialIssued {
        connection: ConnectionId,
        lease: LeaseId,
    },
    DynamicCredentialRevoked {
        connection: ConnectionId,
        lease: LeaseId,
    },
    ChildRestarted {
        reason: String,
    },
}

/// A single plugin handler. Implementations must not block for long —
/// `emit` runs on the caller's task.
pub trait PluginSink: Send + Sync {
    fn emit(&self, event: &AgentEvent);
}

/// Fans an event out to every registered handler. A handler that panics is
/// caught and logged; it never prevents the remaining handlers from running
/// (spec §5 shared-resources note).
#[derive(Default, Clone)]
pub struct CompositeSink {
    handlers: Vec<Arc<dyn PluginSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn PluginSink>) {
        self.handlers.push(handler);
    }
}

impl PluginSink for CompositeSink {
    fn emit(&self, event: &AgentEvent) {
        for handler in &self.handlers {
            let handler = handler.clone();
            let event = event.clone();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler.emit(&event);
            }));
            if outcome.is_err() {
                warn!("plugin sink handler panicked while emitting {event:?}");
            }
        }
    }
}

/// No-op sink used where no plugin subsystem is configured.
pub struct NullSink;

impl PluginSink for NullSink {
    fn emit(&self, _event: &AgentEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(Arc<AtomicUsize>);

    impl PluginSink for CountingSink {
        fn emit(&self, _event: &AgentEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingSink;

    impl PluginSink for PanickingSink {
        fn emit(&self, _event: &AgentEvent) {
            panic!("boom");
        }
    }

    #[test]
    fn a_panicking_handler_does_not_prevent_others_from_running() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sink = CompositeSink::new();
        sink.register(Arc::new(PanickingSink));
        sink.register(Arc::new(CountingSink(counter.clone())));

        sink.emit(&AgentEvent::Reconnected);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
