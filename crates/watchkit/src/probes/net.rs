use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;

use crate::error::ProbeError;
use crate::probes::{Probe, ProbeContext, ProbeOutcome};

/// Leave headroom so a refused or filtered port reports "0" instead of
/// tripping the module deadline.
fn probe_wait(timeout: Duration) -> Duration {
    timeout
        .checked_sub(Duration::from_millis(50))
        .unwrap_or(Duration::from_millis(50))
        .max(Duration::from_millis(50))
}

/// Reports "1" when a TCP connection to host:port succeeds, else "0".
pub struct TcpProbe {
    host: String,
    port: u16,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

#[async_trait::async_trait]
impl Probe for TcpProbe {
    async fn collect(&mut self, ctx: &ProbeContext<'_>) -> ProbeOutcome {
        let addr = format!("{}:{}", self.host, self.port);
        let up = matches!(
            tokio::time::timeout(probe_wait(ctx.timeout), TcpStream::connect(&addr)).await,
            Ok(Ok(_))
        );
        Ok(Some(if up { "1" } else { "0" }.to_string()))
    }
}

/// Reports "1" when the host answers ICMP echo, else "0". Shells out to the
/// system ping utility rather than opening raw sockets.
pub struct PingProbe {
    host: String,
    count: u32,
}

impl PingProbe {
    pub fn new(host: impl Into<String>, count: u32) -> Self {
        Self { host: host.into(), count: count.max(1) }
    }
}

#[async_trait::async_trait]
impl Probe for PingProbe {
    async fn collect(&mut self, ctx: &ProbeContext<'_>) -> ProbeOutcome {
        let mut cmd = Command::new("ping");
        #[cfg(windows)]
        cmd.args([
            "-n",
            &self.count.to_string(),
            "-w",
            &ctx.timeout.as_millis().to_string(),
        ]);
        #[cfg(not(windows))]
        cmd.args([
            "-c",
            &self.count.to_string(),
            "-W",
            &ctx.timeout.as_secs().max(1).to_string(),
        ]);
        cmd.arg(&self.host);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::null());
        cmd.kill_on_drop(true);
        let status = cmd
            .status()
            .await
            .map_err(|e| ProbeError::Output(format!("cannot spawn ping: {e}")))?;
        Ok(Some(if status.success() { "1" } else { "0" }.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::VarStore;

    fn ctx(vars: &VarStore) -> ProbeContext<'_> {
        ProbeContext { timeout: Duration::from_secs(2), vars }
    }

    #[tokio::test]
    async fn test_tcp_open_port_reports_one() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let vars = VarStore::new();
        let mut probe = TcpProbe::new("127.0.0.1", port);
        assert_eq!(probe.collect(&ctx(&vars)).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_tcp_closed_port_reports_zero() {
        // bind and drop to find a port that is very likely closed
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let vars = VarStore::new();
        let mut probe = TcpProbe::new("127.0.0.1", port);
        assert_eq!(probe.collect(&ctx(&vars)).await.unwrap().as_deref(), Some("0"));
    }

    #[test]
    fn test_probe_wait_keeps_floor() {
        assert_eq!(probe_wait(Duration::from_millis(10)), Duration::from_millis(50));
        assert_eq!(probe_wait(Duration::from_secs(2)), Duration::from_millis(1950));
    }
}
