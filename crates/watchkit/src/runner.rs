use std::process::Stdio;

use tokio::process::Command;

use crate::error::ProbeError;
use crate::vars::VarStore;

/// Executes command lines on behalf of the engine: condition actions,
/// precondition value sources and watchdog restarts. Keeping this behind a
/// trait keeps the rule engine testable without spawning anything.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command line and capture its stdout.
    async fn output(&self, command: &str, vars: &VarStore) -> Result<String, ProbeError>;

    /// Fire a side-effecting command, discarding its output.
    async fn dispatch(&self, command: &str, vars: &VarStore) -> Result<(), ProbeError> {
        self.output(command, vars).await.map(|_| ())
    }
}

/// Build a platform shell invocation for a command line. The child is killed
/// if the future is dropped, so module timeouts cancel it.
pub(crate) fn shell_command(command_line: &str) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command_line]);
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command_line]);
        cmd
    };
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    cmd
}

/// Runs commands through the platform shell with saved values as
/// environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait::async_trait]
impl CommandRunner for ShellRunner {
    async fn output(&self, command: &str, vars: &VarStore) -> Result<String, ProbeError> {
        let mut cmd = shell_command(command);
        for (name, value) in vars.iter() {
            cmd.env(name, value);
        }
        let out = cmd
            .output()
            .await
            .map_err(|e| ProbeError::Output(format!("failed to spawn `{command}`: {e}")))?;
        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        if !out.status.success() && stdout.trim().is_empty() {
            return Err(ProbeError::Output(format!("`{command}` exited with {}", out.status)));
        }
        Ok(stdout)
    }
}
