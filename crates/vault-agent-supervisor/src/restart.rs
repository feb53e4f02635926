//! Bounded exponential backoff bookkeeping for child-process restarts.

/// Tracks restart attempts for one supervised child, refusing further
/// restarts once `max_restarts` is exceeded.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    max_restarts: u32,
    attempts: u32,
    gave_up: bool,
}

impl RestartPolicy {
    pub fn new(max_restarts: u32) -> Self {
        Self {
            max_restarts,
            attempts: 0,
            gave_up: false,
        }
    }

    /// `true` once the terminal "gave up" state has been reached.
    pub fn is_terminal(&self) -> bool {
        self.gave_up
    }

    /// Records a restart attempt and returns the backoff delay to apply
    /// before it, or `None` if the policy has already given up.
    pub fn next_delay(&mut self) -> Option<std::time::Duration> {
        if self.gave_up {
            return None;
        }
        if self.attempts >= self.max_restarts {
            self.gave_up = true;
            return None;
        }
        let delay = std::time::Duration::from_secs(1)
            .saturating_mul(1u32.checked_shl(self.attempts.min(6)).unwrap_or(u32::MAX))
            .min(std::time::Duration::from_secs(60));
        self.attempts += 1;
        Some(delay)
    }

    /// Resets the attempt counter after a sustained clean run.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.gave_up = false;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
