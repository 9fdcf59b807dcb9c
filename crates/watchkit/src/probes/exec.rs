use crate::probes::{Probe, ProbeContext, ProbeOutcome};
use crate::runner::{CommandRunner, ShellRunner};

/// Runs a configured command line and reports its stdout. Backs both the
/// exec and the plugin kinds; plugins hand back preformatted output that
/// must not be trimmed.
pub struct ExecProbe {
    command: String,
    raw: bool,
}

impl ExecProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), raw: false }
    }

    pub fn plugin(command: impl Into<String>) -> Self {
        Self { command: command.into(), raw: true }
    }
}

#[async_trait::async_trait]
impl Probe for ExecProbe {
    async fn collect(&mut self, ctx: &ProbeContext<'_>) -> ProbeOutcome {
        let stdout = ShellRunner.output(&self.command, ctx.vars).await?;
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        let text = if self.raw { stdout } else { stdout.trim_end().to_string() };
        Ok(Some(text))
    }
}
