//! Probe backends: one data source per module kind, all behind the same
//! one-value-per-run contract. How a value is judged is the module's
//! business, not the probe's.

use std::time::Duration;

use crate::error::ProbeError;
use crate::vars::VarStore;

mod exec;
mod net;
mod system;
mod text;

pub use exec::ExecProbe;
pub use net::{PingProbe, TcpProbe};
pub use system::{CpuProbe, DiskProbe, MemoryProbe, ProcProbe, ServiceProbe};
pub use text::RegexpProbe;

pub(crate) use system::process_instances;

/// What one probe run may yield: a raw value, nothing to report, or a fault.
pub type ProbeOutcome = Result<Option<String>, ProbeError>;

/// Context the engine passes into a probe run.
pub struct ProbeContext<'a> {
    /// Module timeout. The engine enforces it around the whole run; probes
    /// that wait on external resources also bound themselves with it so they
    /// can answer instead of being abandoned.
    pub timeout: Duration,
    /// Saved sibling values, surfaced to subprocesses as environment vars.
    pub vars: &'a VarStore,
}

/// A module's data source.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn collect(&mut self, ctx: &ProbeContext<'_>) -> ProbeOutcome;
}
