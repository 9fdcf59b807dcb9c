use std::path::PathBuf;
use std::sync::Arc;

use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind,
    System,
};

use crate::error::ProbeError;
use crate::probes::{Probe, ProbeContext, ProbeOutcome};
use crate::watchdog::WatchdogState;

fn process_system() -> System {
    System::new_with_specifics(RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing()))
}

/// Count running instances of a process by name, case-insensitively. Kernel
/// process tables truncate names, so long targets also match on their
/// truncated prefix.
pub(crate) fn process_instances(sys: &System, name: &str) -> usize {
    let truncated = name.get(..15);
    sys.processes()
        .values()
        .filter(|p| {
            let pname = p.name().to_string_lossy();
            pname.eq_ignore_ascii_case(name)
                || (name.len() > 15 && truncated.is_some_and(|t| pname.eq_ignore_ascii_case(t)))
        })
        .count()
}

/// Reports how many instances of a process are running.
pub struct ProcProbe {
    process: String,
    sys: System,
    watchdog: Option<Arc<WatchdogState>>,
}

impl ProcProbe {
    pub fn new(process: impl Into<String>) -> Self {
        Self { process: process.into(), sys: process_system(), watchdog: None }
    }

    /// Share liveness with the module's watchdog task.
    pub fn with_watchdog(mut self, state: Arc<WatchdogState>) -> Self {
        self.watchdog = Some(state);
        self
    }
}

#[async_trait::async_trait]
impl Probe for ProcProbe {
    async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
        self.sys.refresh_processes(ProcessesToUpdate::All, true);
        let count = process_instances(&self.sys, &self.process);
        if let Some(state) = &self.watchdog {
            state.record_liveness(count > 0);
        }
        Ok(Some(count.to_string()))
    }
}

/// Reports "1" while a named service process is running, else "0".
pub struct ServiceProbe {
    service: String,
    sys: System,
}

impl ServiceProbe {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into(), sys: process_system() }
    }
}

#[async_trait::async_trait]
impl Probe for ServiceProbe {
    async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
        self.sys.refresh_processes(ProcessesToUpdate::All, true);
        let up = process_instances(&self.sys, &self.service) > 0;
        Ok(Some(if up { "1" } else { "0" }.to_string()))
    }
}

pub(crate) fn percent_of(part: u64, total: u64) -> Option<u64> {
    if total == 0 {
        return None;
    }
    Some((part as f64 / total as f64 * 100.0).round() as u64)
}

/// Free space of the volume holding a path, in MB or as a percentage.
pub struct DiskProbe {
    path: PathBuf,
    percent: bool,
    disks: Disks,
}

impl DiskProbe {
    pub fn new(path: impl Into<PathBuf>, percent: bool) -> Self {
        Self { path: path.into(), percent, disks: Disks::new_with_refreshed_list() }
    }

    /// The disk with the longest mount point containing the path.
    fn best_mount(&self) -> Option<&sysinfo::Disk> {
        let mut best: Option<(&sysinfo::Disk, usize)> = None;
        for disk in self.disks.list() {
            let mount = disk.mount_point();
            if self.path.starts_with(mount) {
                let mount_len = mount.as_os_str().len();
                if best.is_none_or(|(_, len)| mount_len > len) {
                    best = Some((disk, mount_len));
                }
            }
        }
        best.map(|(disk, _)| disk)
    }
}

#[async_trait::async_trait]
impl Probe for DiskProbe {
    async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
        self.disks.refresh(true);
        let Some(disk) = self.best_mount() else {
            return Err(ProbeError::Output(format!(
                "no volume mounted for {}",
                self.path.display()
            )));
        };
        if self.percent {
            let pct = percent_of(disk.available_space(), disk.total_space()).ok_or_else(|| {
                ProbeError::Output(format!("volume for {} reports zero size", self.path.display()))
            })?;
            Ok(Some(pct.to_string()))
        } else {
            Ok(Some((disk.available_space() / 1024 / 1024).to_string()))
        }
    }
}

/// Available system memory, in MB or as a percentage of total.
pub struct MemoryProbe {
    percent: bool,
    sys: System,
}

impl MemoryProbe {
    pub fn new(percent: bool) -> Self {
        Self {
            percent,
            sys: System::new_with_specifics(
                RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
            ),
        }
    }
}

#[async_trait::async_trait]
impl Probe for MemoryProbe {
    async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
        self.sys.refresh_memory();
        let available = self.sys.available_memory();
        if self.percent {
            let pct = percent_of(available, self.sys.total_memory())
                .ok_or_else(|| ProbeError::Output("total memory reads as zero".into()))?;
            Ok(Some(pct.to_string()))
        } else {
            Ok(Some((available / 1024 / 1024).to_string()))
        }
    }
}

/// CPU usage percentage, globally or for one CPU by index.
pub struct CpuProbe {
    cpu: Option<usize>,
    sys: System,
    primed: bool,
}

impl CpuProbe {
    pub fn new(cpu: Option<usize>) -> Self {
        Self {
            cpu,
            sys: System::new_with_specifics(
                RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
            ),
            primed: false,
        }
    }
}

#[async_trait::async_trait]
impl Probe for CpuProbe {
    async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
        self.sys.refresh_cpu_all();
        if !self.primed {
            // usage needs two samples; later runs reuse the previous cycle's
            tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
            self.sys.refresh_cpu_all();
            self.primed = true;
        }
        let usage = match self.cpu {
            None => self.sys.global_cpu_usage(),
            Some(idx) => self
                .sys
                .cpus()
                .get(idx)
                .ok_or_else(|| ProbeError::Output(format!("no cpu with index {idx}")))?
                .cpu_usage(),
        };
        Ok(Some((usage.round() as i64).to_string()))
    }
}
