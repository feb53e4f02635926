//! State machine for the managed-key refresh lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of the managed-key refresh operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    Idle,
    Refreshing,
    Retrying,
    Stale,
}

/// Why a refresh was triggered (spec §4.7's `source` label, carried into
/// the metrics contract as `rotations_total{source}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshSource {
    WsEvent,
    GracePoll,
    Heartbeat,
    Reconnect,
    Startup,
}

impl RefreshSource {
    pub fn as_label(&self) -> &'static str {
        match self {
            RefreshSource::WsEvent => "ws_event",
            RefreshSource::GracePoll => "grace_poll",
            RefreshSource::Heartbeat => "heartbeat",
            RefreshSource::Reconnect => "reconnect",
            RefreshSource::Startup => "startup",
        }
    }
}

/// State machine managing the managed-key refresh lifecycle.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: RotationState,
    transitions: Vec<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: RotationState::Idle,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> RotationState {
        self.current
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn transition(
        &mut self,
        to: RotationState,
        reason: Option<String>,
    ) -> Result<(), vault_agent_common::AgentError> {
        if !self.can_transition_to(to) {
            return Err(vault_agent_common::AgentError::InvalidStateTransition {
                from: format!("{:?}", self.current),
                to: format!("{:?}", to),
            });
        }

        self.transitions.push(StateTransition {
            id: Uuid::now_v7(),
            from: self.current,
            to,
            reason,
            timestamp: Utc::now(),
        });
        self.current = to;
        Ok(())
    }

    pub fn can_transition_to(&self, to: RotationState) -> bool {
        use RotationState::*;
        matches!(
            (self.current, to),
            (Idle, Refreshing)
                | (Refreshing, Idle)
                | (Refreshing, Retrying)
                | (Refreshing, Stale)
                | (Retrying, Refreshing)
                | (Retrying, Stale)
                | (Stale, Refreshing)
        )
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// A recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub id: Uuid,
    pub from: RotationState,
    pub to: RotationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}
