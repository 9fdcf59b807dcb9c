use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::time::interval;
use tracing::{info, warn};

use crate::probes::process_instances;
use crate::runner::CommandRunner;
use crate::vars::VarStore;

/// Floor for watchdog start and retry delays, in milliseconds. Restarting a
/// service faster than this tends to race its own shutdown.
pub const MIN_WATCHDOG_DELAY_MS: u64 = 2000;

/// How a supervised process is kept alive.
#[derive(Debug, Clone)]
pub struct WatchdogPolicy {
    pub process: String,
    pub start_command: Option<String>,
    pub retries: u32,
    pub start_delay: Duration,
    pub retry_delay: Duration,
}

impl WatchdogPolicy {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            start_command: None,
            retries: 1,
            start_delay: Duration::from_millis(MIN_WATCHDOG_DELAY_MS),
            retry_delay: Duration::from_millis(MIN_WATCHDOG_DELAY_MS),
        }
    }

    /// Poll cadence between liveness checks.
    pub fn cadence(&self) -> Duration {
        self.retry_delay.max(Duration::from_millis(MIN_WATCHDOG_DELAY_MS))
    }
}

/// Shared view of a watchdog's progress. The probe for the same process reads
/// liveness from here instead of scanning twice.
#[derive(Debug, Default)]
pub struct WatchdogState {
    alive: AtomicBool,
    restarts: AtomicU32,
    exhausted: AtomicBool,
}

impl WatchdogState {
    pub fn record_liveness(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    fn note_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    fn reset_budget(&self) {
        self.restarts.store(0, Ordering::Relaxed);
        self.exhausted.store(false, Ordering::Relaxed);
    }

    /// Returns true the first time the budget runs out.
    fn mark_exhausted(&self) -> bool {
        !self.exhausted.swap(true, Ordering::Relaxed)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }
}

/// One liveness pass: check the process, restart it if the retry budget
/// allows, and note the result in the shared state.
pub(crate) async fn tick(
    policy: &WatchdogPolicy,
    state: &WatchdogState,
    sys: &mut System,
    runner: &dyn CommandRunner,
    vars: &VarStore,
) {
    sys.refresh_processes(ProcessesToUpdate::All, true);
    let alive = process_instances(sys, &policy.process) > 0;
    state.record_liveness(alive);

    if alive {
        state.reset_budget();
        return;
    }

    if state.restarts() >= policy.retries {
        if state.mark_exhausted() {
            warn!(
                process = %policy.process,
                retries = policy.retries,
                "watchdog gave up restarting process"
            );
        }
        return;
    }

    let Some(start) = &policy.start_command else {
        return;
    };
    state.note_restart();
    info!(
        process = %policy.process,
        attempt = state.restarts(),
        "watchdog restarting process"
    );
    if let Err(e) = runner.dispatch(start, vars).await {
        warn!(process = %policy.process, error = %e, "watchdog start command failed");
    }
    tokio::time::sleep(policy.start_delay).await;
}

/// Supervises one process, restarting it when it dies.
pub struct Watchdog {
    policy: WatchdogPolicy,
    state: Arc<WatchdogState>,
}

impl Watchdog {
    pub fn new(policy: WatchdogPolicy) -> Self {
        Self::with_state(policy, Arc::new(WatchdogState::default()))
    }

    /// Reuse state already shared with the module watching the same process.
    pub fn with_state(policy: WatchdogPolicy, state: Arc<WatchdogState>) -> Self {
        Self { policy, state }
    }

    pub fn state(&self) -> Arc<WatchdogState> {
        Arc::clone(&self.state)
    }

    /// Watch the process until the returned handle is aborted.
    pub fn spawn(self, runner: Arc<dyn CommandRunner>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sys = System::new_with_specifics(
                RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing()),
            );
            let vars = VarStore::new();
            let mut timer = interval(self.policy.cadence());

            loop {
                timer.tick().await;
                tick(&self.policy, &self.state, &mut sys, runner.as_ref(), &vars).await;
            }
        })
    }
}
