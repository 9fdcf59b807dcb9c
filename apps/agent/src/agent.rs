use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use sysinfo::System;
use tokio::time::interval;
use tracing::{debug, info, trace, warn};
use watchkit::{AgentReport, CommandRunner, ModuleRegistry, ShellRunner, VarStore, Watchdog};

use crate::config::AgentConfig;
use crate::exporter::SpoolWriter;

/// The agent loop: one registry of modules visited sequentially every base
/// tick, with per-process watchdogs running as their own tasks.
pub struct Agent {
    config: AgentConfig,
    registry: ModuleRegistry,
    runner: Arc<ShellRunner>,
    vars: VarStore,
    spool: SpoolWriter,
    os_name: String,
    os_version: String,
    watchdogs: Vec<tokio::task::JoinHandle<()>>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        let registry = ModuleRegistry::from_file(&config.agent.modules);
        info!(
            modules = registry.len(),
            definitions = %config.agent.modules.display(),
            "module registry loaded"
        );
        let spool = SpoolWriter::new(config.spool.dir.clone(), config.spool.format);
        Self {
            config,
            registry,
            runner: Arc::new(ShellRunner),
            vars: VarStore::new(),
            spool,
            os_name: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::os_version().unwrap_or_default(),
            watchdogs: Vec::new(),
        }
    }

    pub async fn run(mut self, oneshot: bool) -> anyhow::Result<()> {
        self.spawn_watchdogs();

        if oneshot {
            self.cycle().await;
            self.shutdown();
            return Ok(());
        }

        let mut timer = interval(Duration::from_secs(self.config.agent.interval.max(1)));
        loop {
            tokio::select! {
                _ = timer.tick() => self.cycle().await,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Watchdog-enabled modules get their own restart monitor so a hanging
    /// restart never blocks the scheduling tick.
    fn spawn_watchdogs(&mut self) {
        self.registry.go_first();
        loop {
            let Some(module) = self.registry.current() else {
                break;
            };
            if let Some((policy, state)) = module.watchdog() {
                info!(module = module.name(), process = %policy.process, "starting watchdog");
                let watchdog = Watchdog::with_state(policy.clone(), Arc::clone(state));
                self.watchdogs.push(watchdog.spawn(self.runner.clone()));
            }
            self.registry.go_next();
        }
    }

    /// Visit every module once: run the due ones, fire their condition
    /// commands, store saved values, then spool the cycle report.
    async fn cycle(&mut self) {
        let now = Local::now();
        let base = self.config.agent.interval.max(1);

        self.registry.go_first();
        loop {
            let Some(module) = self.registry.current_mut() else {
                break;
            };
            if module.is_disabled() {
                self.registry.go_next();
                continue;
            }
            if !module.is_due(&now, base) {
                trace!(module = module.name(), "not due yet");
                self.registry.go_next();
                continue;
            }

            let action = module.cycle(now, &self.vars, self.runner.as_ref(), base).await;
            // saved values become visible to siblings later in this same pass
            let saved = module
                .save_var()
                .zip(module.latest_output())
                .map(|(var, value)| (var.to_string(), value.to_string()));

            if let Some((var, value)) = saved {
                self.vars.set(var, value);
            }
            if let Some(action) = action {
                info!(module = %action.module, command = %action.command, "condition matched");
                if let Err(e) = self.runner.dispatch(&action.command, &self.vars).await {
                    warn!(module = %action.module, error = %e, "condition command failed");
                }
            }
            self.registry.go_next();
        }

        self.export_cycle(now);
    }

    /// Drain every module's queued records into one report and write it to
    /// the spool. Cycles where nothing produced data write nothing.
    fn export_cycle(&mut self, now: chrono::DateTime<Local>) {
        let mut modules = Vec::new();
        self.registry.go_first();
        loop {
            let Some(module) = self.registry.current_mut() else {
                break;
            };
            let mut report = module.render_report();
            module.export_data_output(&mut report);
            if !report.data.is_empty() {
                modules.push(report);
            }
            self.registry.go_next();
        }

        if modules.is_empty() {
            debug!("no module produced data, skipping spool write");
            return;
        }

        let report = AgentReport {
            agent_name: self.config.agent.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            os_name: self.os_name.clone(),
            os_version: self.os_version.clone(),
            interval: self.config.agent.interval,
            timestamp: now,
            modules,
        };
        match self.spool.write(&report) {
            Ok(path) => {
                info!(path = %path.display(), modules = report.modules.len(), "report spooled");
            }
            Err(e) => warn!(error = %e, "cannot write spool file"),
        }
    }

    /// Stop the watchdogs and flush anything still queued.
    fn shutdown(&mut self) {
        for handle in self.watchdogs.drain(..) {
            handle.abort();
        }
        self.export_cycle(Local::now());
    }
}
