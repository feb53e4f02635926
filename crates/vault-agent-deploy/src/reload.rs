//! Post-write reload/health-check command execution.

use vault_agent_common::{AgentError, AgentResult};

/// Fixed timeout applied to both the reload command and the health-check
/// command (spec §9 open question, resolved at 10s — see DESIGN.md).
pub const COMMAND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Run `command` through `sh -c`, synchronously from the caller's point of
/// view (the deployer awaits this before moving to the next step). A
/// non-zero exit or a timeout is reported as `AgentError::ReloadFailed`.
pub async fn run_reload_command(command: &str) -> AgentResult<CommandOutput> {
    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output();

    let output = tokio::time::timeout(COMMAND_TIMEOUT, child)
        .await
        .map_err(|_| AgentError::ReloadFailed { code: -1 })?
        .map_err(|e| AgentError::Internal(format!("failed to spawn reload command: {e}")))?;

    let exit_code = output.status.code().unwrap_or(-1);
    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code,
    };

    if exit_code != 0 {
        return Err(AgentError::ReloadFailed { code: exit_code });
    }
    Ok(result)
}

/// Run a health-check command with its own configured timeout. Any nonzero
/// exit or timeout is treated as "failed", never surfaced as an error —
/// the caller decides whether to roll back.
pub async fn run_health_check(command: &str, timeout_secs: u64) -> bool {
    let timeout = std::time::Duration::from_secs(timeout_secs);
    let child = tokio::process::Command::new("sh").arg("-c").arg(command).status();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(status)) => status.success(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reload_command_success_captures_stdout() {
        let output = run_reload_command("echo hello").await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn reload_command_nonzero_exit_is_an_error() {
        let err = run_reload_command("exit 3").await.unwrap_err();
        assert!(matches!(err, AgentError::ReloadFailed { code: 3 }));
    }

    #[tokio::test]
    async fn health_check_failure_does_not_panic() {
        assert!(!run_health_check("exit 1", 5).await);
        assert!(run_health_check("exit 0", 5).await);
    }
}
