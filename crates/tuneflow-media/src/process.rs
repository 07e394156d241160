//! Subprocess execution with a hard timeout.

use std::time::Duration;

use tokio::process::Command;

use tuneflow_core::{Error, Result};

/// Run a command with a timeout, returning stdout as a string.
///
/// A non-zero exit is an error carrying the trimmed stderr.
pub async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    // A timed-out child must not outlive its job directory.
    cmd.kill_on_drop(true);

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| Error::Tool(format!("External command timed out after {}s", timeout_secs)))?
        .map_err(|e| Error::Tool(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Tool(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_tool_error() {
        let err = run_cmd_with_timeout(&mut Command::new("tuneflow-no-such-binary"), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let err = run_cmd_with_timeout(
            Command::new("sh").arg("-c").arg("echo broken >&2; exit 3"),
            5,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_returned() {
        let out = run_cmd_with_timeout(Command::new("sh").arg("-c").arg("echo hi"), 5)
            .await
            .unwrap();
        assert_eq!(out.trim(), "hi");
    }
}
