// SPDX-License-Identifier: GPL-3.0-only

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Result, SysError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Exit status, -1 when the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Run `program` and capture its output.
///
/// The child is killed when `cancel` fires or `timeout` elapses; a non-zero
/// exit status is not an error.
pub async fn run_capture(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<CapturedOutput> {
    debug!(program, ?args, "running external tool");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SysError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let expiry = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
        output = child.wait_with_output() => output?,
        _ = cancel.cancelled() => {
            return Err(SysError::Cancelled(format!("{program} cancelled")));
        }
        _ = expiry => {
            return Err(SysError::Cancelled(format!("{program} timed out")));
        }
    };

    let captured = CapturedOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(program, exit_code = captured.exit_code, "external tool finished");
    Ok(captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let cancel = CancellationToken::new();
        let output = run_capture(
            "sh",
            &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
            &cancel,
            None,
        )
        .await
        .expect("run sh");
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let cancel = CancellationToken::new();
        let result = run_capture(
            "sleep",
            &["30".to_string()],
            &cancel,
            Some(Duration::from_millis(50)),
        )
        .await;
        assert!(matches!(result, Err(SysError::Cancelled(_))));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let cancel = CancellationToken::new();
        let result = run_capture("definitely-not-a-real-tool-xyz", &[], &cancel, None).await;
        assert!(matches!(result, Err(SysError::Spawn { .. })));
        assert!(!command_exists("definitely-not-a-real-tool-xyz"));
    }
}
