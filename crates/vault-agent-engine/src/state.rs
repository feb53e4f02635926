//! Lifecycle state machine for the sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Starting,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: EngineState,
    pub to: EngineState,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Tracks the engine's lifecycle, rejecting any transition outside
/// `starting -> running -> draining -> stopped`.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: EngineState,
    transitions: Vec<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: EngineState::Starting,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> EngineState {
        self.current
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn can_transition_to(&self, to: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self.current, to),
            (Starting, Running) | (Running, Draining) | (Draining, Stopped)
        )
    }

    pub fn transition(&mut self, to: EngineState, reason: Option<String>) -> Result<(), String> {
        if !self.can_transition_to(to) {
            return Err(format!("invalid engine state transition: {:?} -> {:?}", self.current, to));
        }
        self.transitions.push(StateTransition {
            from: self.current,
            to,
            reason,
            timestamp: Utc::now(),
        });
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.current, EngineState::Stopped)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions_follow_the_documented_lifecycle() {
        let mut machine = StateMachine::new();
        assert!(machine.transition(EngineState::Running, None).is_ok());
        assert!(machine.transition(EngineState::Draining, Some("sigterm".to_string())).is_ok());
        assert!(machine.transition(EngineState::Stopped, None).is_ok());
        assert!(machine.is_terminal());
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut machine = StateMachine::new();
        assert!(machine.transition(EngineState::Draining, None).is_err());
    }

    #[test]
    fn transitions_are_recorded_in_history() {
        let mut machine = StateMachine::new();
        machine.transition(EngineState::Running, None).unwrap();
        assert_eq!(machine.history().len(), 1);
    }
}
