use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use regex::Regex;
use tracing::{debug, warn};

use crate::condition::{Condition, TriggeredAction, first_match};
use crate::error::ProbeError;
use crate::probes::{Probe, ProbeContext};
use crate::report::{Exporter, ModuleReport};
use crate::runner::CommandRunner;
use crate::schedule::{Cron, interval_elapsed};
use crate::types::{Data, ModuleKind, ModuleType, Severity};
use crate::vars::VarStore;
use crate::watchdog::{WatchdogPolicy, WatchdogState};

/// Render a measurement without a trailing `.0` when it is whole.
fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn parse_band(min: Option<&str>, max: Option<&str>) -> (Option<f64>, Option<f64>) {
    let mut lo = None;
    let mut hi = None;
    if let Some(raw) = min {
        if let Some((a, b)) = raw.split_once(',') {
            lo = a.trim().parse().ok();
            hi = b.trim().parse().ok();
        } else {
            lo = raw.trim().parse().ok();
        }
    }
    if hi.is_none() {
        hi = max.and_then(|raw| raw.trim().parse().ok());
    }
    (lo, hi)
}

/// Whether a value sits inside the inclusive band described by a threshold
/// pair. `min` may carry both bounds as "low,high". With `inverse` set the
/// band matches outside instead of inside. No parseable bound, no match.
pub fn band_matches(min: Option<&str>, max: Option<&str>, inverse: bool, value: f64) -> bool {
    let inside = match parse_band(min, max) {
        (None, None) => return false,
        (Some(lo), Some(hi)) => value >= lo && value <= hi,
        (Some(lo), None) => value >= lo,
        (None, Some(hi)) => value <= hi,
    };
    inside != inverse
}

/// String thresholds are regexes when they compile, exact matches otherwise.
fn string_threshold_matches(threshold: &str, value: &str) -> bool {
    match Regex::new(threshold) {
        Ok(re) => re.is_match(value),
        Err(_) => threshold == value,
    }
}

/// One monitored unit: a probe plus the schedule, thresholds and rules that
/// govern when it runs and what its value means. Mutated only while its
/// definition block is parsed and during its own cycle.
pub struct Module {
    name: String,
    description: Option<String>,
    module_type: ModuleType,
    kind: ModuleKind,
    probe: Box<dyn Probe>,

    interval: u32,
    intensive_interval: Option<u32>,
    timeout: Duration,
    cron: Option<Cron>,

    min: Option<f64>,
    max: Option<f64>,
    min_warning: Option<String>,
    max_warning: Option<String>,
    min_critical: Option<String>,
    max_critical: Option<String>,
    str_warning: Option<String>,
    str_critical: Option<String>,
    warning_inverse: bool,
    critical_inverse: bool,
    post_process: Option<f64>,

    disabled: bool,
    quiet: bool,
    async_mode: bool,
    min_ff_event: u32,
    ff_interval: Option<u32>,
    save: Option<String>,

    unit: Option<String>,
    group: Option<String>,
    custom_id: Option<String>,
    tags: Option<String>,
    critical_instructions: Option<String>,
    warning_instructions: Option<String>,
    unknown_instructions: Option<String>,

    preconditions: Vec<Condition>,
    conditions: Vec<Condition>,
    intensive_conditions: Vec<Condition>,

    timestamp: i64,
    intensive: bool,
    intensive_match: usize,
    intensive_misses: u8,
    reported_severity: Severity,
    pending_severity: Option<(Severity, u32)>,

    data: Vec<Data>,
    has_output: bool,
    latest_output: Option<String>,

    watchdog: Option<(WatchdogPolicy, Arc<WatchdogState>)>,
}

impl Module {
    pub fn new(
        name: impl Into<String>,
        module_type: ModuleType,
        kind: ModuleKind,
        probe: Box<dyn Probe>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            module_type,
            kind,
            probe,
            interval: 1,
            intensive_interval: None,
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECS),
            cron: None,
            min: None,
            max: None,
            min_warning: None,
            max_warning: None,
            min_critical: None,
            max_critical: None,
            str_warning: None,
            str_critical: None,
            warning_inverse: false,
            critical_inverse: false,
            post_process: None,
            disabled: false,
            quiet: false,
            async_mode: module_type.is_async(),
            min_ff_event: 1,
            ff_interval: None,
            save: None,
            unit: None,
            group: None,
            custom_id: None,
            tags: None,
            critical_instructions: None,
            warning_instructions: None,
            unknown_instructions: None,
            preconditions: Vec::new(),
            conditions: Vec::new(),
            intensive_conditions: Vec::new(),
            timestamp: 0,
            intensive: false,
            intensive_match: 0,
            intensive_misses: 0,
            reported_severity: Severity::Normal,
            pending_severity: None,
            data: Vec::new(),
            has_output: false,
            latest_output: None,
            watchdog: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn save_var(&self) -> Option<&str> {
        self.save.as_deref()
    }

    pub fn latest_output(&self) -> Option<&str> {
        self.latest_output.as_deref()
    }

    pub fn has_output(&self) -> bool {
        self.has_output
    }

    pub fn is_intensive(&self) -> bool {
        self.intensive
    }

    /// 1-based index of the intensive rule that matched last, 0 when none.
    pub fn intensive_match(&self) -> usize {
        self.intensive_match
    }

    pub fn reported_severity(&self) -> Severity {
        self.reported_severity
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn watchdog(&self) -> Option<(&WatchdogPolicy, &Arc<WatchdogState>)> {
        self.watchdog.as_ref().map(|(policy, state)| (policy, state))
    }

    pub fn set_description(&mut self, text: impl Into<String>) {
        self.description = Some(text.into());
    }

    pub fn set_interval(&mut self, ticks: u32) {
        if ticks == 0 {
            warn!(module = %self.name, "interval 0 raised to 1");
            self.interval = 1;
        } else {
            self.interval = ticks;
        }
    }

    pub fn set_intensive_interval(&mut self, ticks: u32) {
        self.intensive_interval = Some(ticks.max(1));
    }

    pub fn set_timeout(&mut self, secs: u64) {
        self.timeout = Duration::from_secs(secs.max(1));
    }

    pub fn set_min(&mut self, v: f64) {
        self.min = Some(v);
    }

    pub fn set_max(&mut self, v: f64) {
        self.max = Some(v);
    }

    /// Called after parsing: reversed bounds are swapped rather than rejected.
    pub fn normalize_limits(&mut self) {
        if let (Some(lo), Some(hi)) = (self.min, self.max)
            && lo > hi
        {
            warn!(module = %self.name, "min/max limits reversed, swapping");
            self.min = Some(hi);
            self.max = Some(lo);
        }
    }

    pub fn set_min_warning(&mut self, raw: impl Into<String>) {
        self.min_warning = Some(raw.into());
    }

    pub fn set_max_warning(&mut self, raw: impl Into<String>) {
        self.max_warning = Some(raw.into());
    }

    pub fn set_min_critical(&mut self, raw: impl Into<String>) {
        self.min_critical = Some(raw.into());
    }

    pub fn set_max_critical(&mut self, raw: impl Into<String>) {
        self.max_critical = Some(raw.into());
    }

    pub fn set_str_warning(&mut self, raw: impl Into<String>) {
        self.str_warning = Some(raw.into());
    }

    pub fn set_str_critical(&mut self, raw: impl Into<String>) {
        self.str_critical = Some(raw.into());
    }

    pub fn set_warning_inverse(&mut self, on: bool) {
        self.warning_inverse = on;
    }

    pub fn set_critical_inverse(&mut self, on: bool) {
        self.critical_inverse = on;
    }

    pub fn set_post_process(&mut self, scale: f64) {
        self.post_process = Some(scale);
    }

    pub fn set_disabled(&mut self, on: bool) {
        self.disabled = on;
    }

    pub fn set_quiet(&mut self, on: bool) {
        self.quiet = on;
    }

    pub fn set_async(&mut self, on: bool) {
        self.async_mode = on;
    }

    pub fn set_min_ff_event(&mut self, count: u32) {
        self.min_ff_event = count.max(1);
    }

    pub fn set_ff_interval(&mut self, ticks: u32) {
        self.ff_interval = Some(ticks.max(1));
    }

    pub fn set_save(&mut self, var: impl Into<String>) {
        self.save = Some(var.into());
    }

    pub fn set_unit(&mut self, text: impl Into<String>) {
        self.unit = Some(text.into());
    }

    pub fn set_group(&mut self, text: impl Into<String>) {
        self.group = Some(text.into());
    }

    pub fn set_custom_id(&mut self, text: impl Into<String>) {
        self.custom_id = Some(text.into());
    }

    pub fn set_tags(&mut self, text: impl Into<String>) {
        self.tags = Some(text.into());
    }

    pub fn set_critical_instructions(&mut self, text: impl Into<String>) {
        self.critical_instructions = Some(text.into());
    }

    pub fn set_warning_instructions(&mut self, text: impl Into<String>) {
        self.warning_instructions = Some(text.into());
    }

    pub fn set_unknown_instructions(&mut self, text: impl Into<String>) {
        self.unknown_instructions = Some(text.into());
    }

    pub fn set_timestamp(&mut self, ts: i64) {
        self.timestamp = ts;
    }

    pub fn set_cron(&mut self, cron: Cron) {
        self.cron = Some(cron);
    }

    /// Give a parsed cron the module's own interval as its hold-down span.
    pub fn sync_cron_interval(&mut self) {
        if let Some(cron) = &mut self.cron {
            cron.interval = self.interval;
        }
    }

    pub fn set_watchdog(&mut self, policy: WatchdogPolicy, state: Arc<WatchdogState>) {
        self.watchdog = Some((policy, state));
    }

    pub fn add_precondition(&mut self, rule: Condition) {
        self.preconditions.push(rule);
    }

    pub fn add_condition(&mut self, rule: Condition) {
        self.conditions.push(rule);
    }

    pub fn add_intensive_condition(&mut self, rule: Condition) {
        self.intensive_conditions.push(rule);
    }

    /// Ticks between runs right now: the intensive interval while intensive,
    /// the anti-flap interval while a state change is pending confirmation,
    /// the plain interval otherwise.
    pub fn effective_ticks(&self) -> u32 {
        if self.intensive {
            return self.intensive_interval.unwrap_or(self.interval);
        }
        if self.pending_severity.is_some()
            && let Some(ticks) = self.ff_interval
        {
            return ticks;
        }
        self.interval
    }

    /// Whether the module should run now. Cron replaces interval timing when
    /// present. Not being due is the normal case, never an error.
    pub fn is_due(&self, now: &DateTime<Local>, base: u64) -> bool {
        if let Some(cron) = &self.cron {
            return cron.is_due(now, now.timestamp());
        }
        let span = i64::from(self.effective_ticks()) * base as i64;
        interval_elapsed(self.timestamp, now.timestamp(), span)
    }

    /// Stamp an attempted run. Called for vetoed runs too, so a failing
    /// precondition does not turn into a busy loop.
    pub fn mark_ran(&mut self, now: &DateTime<Local>, base: u64) {
        self.timestamp = now.timestamp();
        if let Some(cron) = &mut self.cron {
            cron.mark_run(now.timestamp(), base);
        }
    }

    /// Whether to attempt the probe at all. Each rule runs its own command
    /// and tests the rule against that output; the first match clears the
    /// module to proceed. An empty list always proceeds.
    pub async fn evaluate_preconditions(
        &self,
        runner: &dyn CommandRunner,
        vars: &VarStore,
    ) -> bool {
        if self.preconditions.is_empty() {
            return true;
        }
        for rule in &self.preconditions {
            let Some(command) = &rule.command else {
                continue;
            };
            let output = match runner.output(command, vars).await {
                Ok(out) => out,
                Err(e) => {
                    debug!(module = %self.name, error = %e, "precondition command failed");
                    continue;
                }
            };
            let trimmed = output.trim();
            if rule.matches(trimmed, trimmed.parse().ok()) {
                return true;
            }
        }
        false
    }

    /// Execute the probe under the module timeout. Ends in output or
    /// no-output; probe failures are logged and absorbed here.
    pub async fn run(&mut self, now: DateTime<Local>, vars: &VarStore) {
        let ctx = ProbeContext { timeout: self.timeout, vars };
        match tokio::time::timeout(self.timeout, self.probe.collect(&ctx)).await {
            Err(_) => {
                warn!(module = %self.name, timeout = ?self.timeout, "probe timed out");
                self.set_no_output();
            }
            Ok(Err(e)) => {
                warn!(module = %self.name, error = %e, "probe failed");
                self.set_no_output();
            }
            Ok(Ok(None)) => self.set_no_output(),
            Ok(Ok(Some(raw))) => {
                if let Err(e) = self.set_output(&raw, now) {
                    warn!(module = %self.name, error = %e, "discarding probe output");
                    self.set_no_output();
                }
            }
        }
    }

    fn coerce_output(&self, raw: &str) -> Result<String, ProbeError> {
        if self.module_type.is_string() {
            return Ok(raw.to_string());
        }
        let trimmed = raw.trim();
        let parsed: f64 = trimmed
            .parse()
            .map_err(|_| ProbeError::Value(format!("`{trimmed}` is not numeric")))?;
        if self.module_type.is_proc() {
            return Ok(if parsed != 0.0 { "1" } else { "0" }.to_string());
        }
        let value = match self.post_process {
            Some(scale) => parsed * scale,
            None => parsed,
        };
        if self.min.is_some_and(|lo| value < lo) || self.max.is_some_and(|hi| value > hi) {
            return Err(ProbeError::Value(format!("{value} outside configured limits")));
        }
        Ok(format_value(value))
    }

    /// Accept a probe reading: coerce it to the module's value shape, queue a
    /// record and reclassify severity. Asynchronous modules only queue when
    /// the value changed.
    pub fn set_output(
        &mut self,
        raw: &str,
        at: DateTime<Local>,
    ) -> Result<(), ProbeError> {
        let value = self.coerce_output(raw)?;
        let changed = self.latest_output.as_deref() != Some(value.as_str());
        let numeric = value.parse().ok();
        let candidate = self.classify(&value, numeric);

        self.latest_output = Some(value.clone());
        self.has_output = true;
        self.update_reported_severity(candidate);

        if self.async_mode && !changed {
            return Ok(());
        }
        self.data.push(Data::new(value, self.module_type, at));
        Ok(())
    }

    /// The cycle produced nothing usable. No record is queued and conditions
    /// are not evaluated.
    pub fn set_no_output(&mut self) {
        self.has_output = false;
    }

    fn classify(&self, value: &str, numeric: Option<f64>) -> Severity {
        if self.module_type.is_string() {
            if self.str_critical.as_deref().is_some_and(|t| string_threshold_matches(t, value)) {
                return Severity::Critical;
            }
            if self.str_warning.as_deref().is_some_and(|t| string_threshold_matches(t, value)) {
                return Severity::Warning;
            }
            return Severity::Normal;
        }
        let Some(v) = numeric else {
            return Severity::Normal;
        };
        if band_matches(
            self.min_critical.as_deref(),
            self.max_critical.as_deref(),
            self.critical_inverse,
            v,
        ) {
            Severity::Critical
        } else if band_matches(
            self.min_warning.as_deref(),
            self.max_warning.as_deref(),
            self.warning_inverse,
            v,
        ) {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    /// Anti-flap: a severity change is only reported after `min_ff_event`
    /// consecutive observations agree on it.
    fn update_reported_severity(&mut self, candidate: Severity) {
        if candidate == self.reported_severity {
            self.pending_severity = None;
            return;
        }
        let streak = match self.pending_severity {
            Some((sev, n)) if sev == candidate => n + 1,
            _ => 1,
        };
        if streak >= self.min_ff_event {
            self.reported_severity = candidate;
            self.pending_severity = None;
        } else {
            self.pending_severity = Some((candidate, streak));
        }
    }

    /// Walk the condition list against the latest value; the first matching
    /// rule governs. Returns its command for the caller to fire.
    pub fn evaluate_conditions(&self) -> Option<TriggeredAction> {
        let value = self.latest_output.as_deref()?;
        let hit = first_match(&self.conditions, value, value.parse().ok())?;
        let command = self.conditions[hit].command.clone()?;
        Some(TriggeredAction { module: self.name.clone(), command })
    }

    /// First-match walk of the intensive list. A hit switches the module to
    /// its intensive interval from the next due check; two consecutive
    /// misses switch it back.
    pub fn evaluate_intensive_conditions(&mut self) -> bool {
        if self.intensive_conditions.is_empty() {
            return false;
        }
        let value = self.latest_output.as_deref().unwrap_or_default();
        match first_match(&self.intensive_conditions, value, value.parse().ok()) {
            Some(hit) => {
                self.intensive_match = hit + 1;
                self.intensive_misses = 0;
                self.intensive = true;
            }
            None => {
                self.intensive_match = 0;
                self.intensive_misses = self.intensive_misses.saturating_add(1);
                if self.intensive_misses >= 2 {
                    self.intensive = false;
                }
            }
        }
        self.intensive
    }

    /// One full due cycle: stamp the attempt, gate on preconditions, run the
    /// probe, then evaluate rule lists. Returns the condition action to
    /// fire, if any. Quiet modules keep measuring but never alert.
    pub async fn cycle(
        &mut self,
        now: DateTime<Local>,
        vars: &VarStore,
        runner: &dyn CommandRunner,
        base: u64,
    ) -> Option<TriggeredAction> {
        self.mark_ran(&now, base);
        if !self.evaluate_preconditions(runner, vars).await {
            debug!(module = %self.name, "preconditions vetoed this run");
            self.set_no_output();
            return None;
        }
        self.run(now, vars).await;
        if !self.has_output {
            return None;
        }
        let action = if self.quiet { None } else { self.evaluate_conditions() };
        self.evaluate_intensive_conditions();
        action
    }

    /// Hand every queued record to the exporter and clear the queue.
    pub fn export_data_output(&mut self, exporter: &mut dyn Exporter) {
        for record in self.data.drain(..) {
            exporter.consume(record);
        }
    }

    /// Identity and threshold metadata for the export record. Data records
    /// are drained into it separately.
    pub fn render_report(&self) -> ModuleReport {
        ModuleReport {
            name: self.name.clone(),
            module_type: self.module_type,
            description: self.description.clone(),
            interval: self.interval,
            status: self.reported_severity,
            min_warning: self.min_warning.clone(),
            max_warning: self.max_warning.clone(),
            min_critical: self.min_critical.clone(),
            max_critical: self.max_critical.clone(),
            str_warning: self.str_warning.clone(),
            str_critical: self.str_critical.clone(),
            warning_inverse: self.warning_inverse,
            critical_inverse: self.critical_inverse,
            unit: self.unit.clone(),
            group: self.group.clone(),
            custom_id: self.custom_id.clone(),
            tags: self.tags.clone(),
            critical_instructions: self.critical_instructions.clone(),
            warning_instructions: self.warning_instructions.clone(),
            unknown_instructions: self.unknown_instructions.clone(),
            data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::ProbeOutcome;
    use std::sync::Mutex;

    struct StaticProbe(&'static str);

    #[async_trait::async_trait]
    impl Probe for StaticProbe {
        async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
            Ok(Some(self.0.to_string()))
        }
    }

    struct SeqProbe(std::vec::IntoIter<&'static str>);

    impl SeqProbe {
        fn new(values: Vec<&'static str>) -> Self {
            Self(values.into_iter())
        }
    }

    #[async_trait::async_trait]
    impl Probe for SeqProbe {
        async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
            Ok(self.0.next().map(str::to_string))
        }
    }

    struct FailProbe;

    #[async_trait::async_trait]
    impl Probe for FailProbe {
        async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
            Err(ProbeError::Output("nothing to read".into()))
        }
    }

    struct SlowProbe;

    #[async_trait::async_trait]
    impl Probe for SlowProbe {
        async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Some("too late".to_string()))
        }
    }

    struct FakeRunner {
        reply: &'static str,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn replying(reply: &'static str) -> Self {
            Self { reply, calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl CommandRunner for FakeRunner {
        async fn output(&self, command: &str, _vars: &VarStore) -> Result<String, ProbeError> {
            self.calls.lock().unwrap().push(command.to_string());
            Ok(self.reply.to_string())
        }
    }

    struct VecExporter(Vec<Data>);

    impl Exporter for VecExporter {
        fn consume(&mut self, record: Data) {
            self.0.push(record);
        }
    }

    fn numeric_module(probe: impl Probe + 'static) -> Module {
        Module::new("m", ModuleType::GenericData, ModuleKind::Exec, Box::new(probe))
    }

    fn now() -> DateTime<Local> {
        Local::now()
    }

    #[test]
    fn test_due_at_exact_interval_boundary() {
        let mut m = numeric_module(StaticProbe("1"));
        m.set_interval(2);
        let t = now();
        m.set_timestamp(t.timestamp() - 2);
        assert!(m.is_due(&t, 1));
        m.set_timestamp(t.timestamp() - 1);
        assert!(!m.is_due(&t, 1));
    }

    #[test]
    fn test_band_thresholds_with_inverse() {
        assert!(band_matches(Some("10,20"), None, false, 15.0));
        assert!(!band_matches(Some("10,20"), None, true, 15.0));
        assert!(!band_matches(Some("10,20"), None, false, 25.0));
        assert!(band_matches(Some("10,20"), None, true, 25.0));
        assert!(band_matches(Some("10"), Some("20"), false, 10.0));
        assert!(band_matches(Some("10"), None, false, 99.0));
        assert!(!band_matches(None, None, false, 1.0));
    }

    #[test]
    fn test_severity_classification_prefers_critical() {
        let mut m = numeric_module(StaticProbe("1"));
        m.set_min_warning("10,100");
        m.set_min_critical("90,100");
        m.set_output("95", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Critical);
        m.set_output("50", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Warning);
        m.set_output("5", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Normal);
    }

    #[test]
    fn test_string_thresholds_match_text() {
        let mut m = Module::new(
            "s",
            ModuleType::GenericDataString,
            ModuleKind::Exec,
            Box::new(StaticProbe("x")),
        );
        m.set_str_critical("FATAL|panic");
        m.set_str_warning("degraded");
        m.set_output("service degraded", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Warning);
        m.set_output("panic: out of disk", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Critical);
    }

    #[test]
    fn test_flap_guard_needs_consecutive_agreement() {
        let mut m = numeric_module(StaticProbe("1"));
        m.set_min_warning("10,20");
        m.set_min_ff_event(2);

        m.set_output("15", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Normal);
        m.set_output("15", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Warning);

        // one normal reading is not enough to drop back
        m.set_output("5", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Warning);
        m.set_output("5", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Normal);
    }

    #[test]
    fn test_flap_guard_interrupted_streak_starts_over() {
        let mut m = numeric_module(StaticProbe("1"));
        m.set_min_warning("10,20");
        m.set_min_ff_event(2);

        m.set_output("15", now()).unwrap();
        m.set_output("5", now()).unwrap();
        m.set_output("15", now()).unwrap();
        assert_eq!(m.reported_severity(), Severity::Normal);
    }

    #[test]
    fn test_pending_flap_uses_ff_interval() {
        let mut m = numeric_module(StaticProbe("1"));
        m.set_interval(10);
        m.set_ff_interval(2);
        m.set_min_ff_event(3);
        m.set_min_warning("10,20");
        assert_eq!(m.effective_ticks(), 10);
        m.set_output("15", now()).unwrap();
        assert_eq!(m.effective_ticks(), 2);
    }

    #[test]
    fn test_async_module_queues_only_changes() {
        let mut m = Module::new(
            "a",
            ModuleType::AsyncData,
            ModuleKind::Exec,
            Box::new(StaticProbe("1")),
        );
        m.set_output("1", now()).unwrap();
        m.set_output("1", now()).unwrap();
        m.set_output("2", now()).unwrap();

        let mut sink = VecExporter(Vec::new());
        m.export_data_output(&mut sink);
        let values: Vec<&str> = sink.0.iter().map(|d| d.value.as_str()).collect();
        assert_eq!(values, ["1", "2"]);
    }

    #[test]
    fn test_export_drains_queue_once() {
        let mut m = numeric_module(StaticProbe("1"));
        m.set_output("42", now()).unwrap();

        let mut sink = VecExporter(Vec::new());
        m.export_data_output(&mut sink);
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].value, "42");

        let mut again = VecExporter(Vec::new());
        m.export_data_output(&mut again);
        assert!(again.0.is_empty());
    }

    #[test]
    fn test_post_process_scales_value() {
        let mut m = numeric_module(StaticProbe("1"));
        m.set_post_process(0.5);
        m.set_output("10", now()).unwrap();
        assert_eq!(m.latest_output(), Some("5"));
    }

    #[test]
    fn test_limits_reject_out_of_range() {
        let mut m = numeric_module(StaticProbe("1"));
        m.set_min(0.0);
        m.set_max(100.0);
        assert!(m.set_output("150", now()).is_err());
        assert!(m.set_output("99.5", now()).is_ok());
    }

    #[test]
    fn test_reversed_limits_are_swapped() {
        let mut m = numeric_module(StaticProbe("1"));
        m.set_min(100.0);
        m.set_max(0.0);
        m.normalize_limits();
        assert!(m.set_output("50", now()).is_ok());
    }

    #[test]
    fn test_proc_type_collapses_counts() {
        let mut m = Module::new(
            "p",
            ModuleType::GenericProc,
            ModuleKind::Proc,
            Box::new(StaticProbe("3")),
        );
        m.set_output("3", now()).unwrap();
        assert_eq!(m.latest_output(), Some("1"));
        m.set_output("0", now()).unwrap();
        assert_eq!(m.latest_output(), Some("0"));
    }

    #[test]
    fn test_non_numeric_output_is_a_value_error() {
        let mut m = numeric_module(StaticProbe("1"));
        assert!(m.set_output("not a number", now()).is_err());
    }

    #[tokio::test]
    async fn test_cycle_produces_action_from_first_matching_rule() {
        let mut m = numeric_module(StaticProbe("120"));
        m.add_condition(Condition::parse("> 100 cmdA").unwrap());
        m.add_condition(Condition::parse("> 50 cmdB").unwrap());

        let runner = FakeRunner::replying("");
        let vars = VarStore::new();
        let action = m.cycle(now(), &vars, &runner, 1).await;
        assert_eq!(action.unwrap().command, "cmdA");
    }

    #[tokio::test]
    async fn test_quiet_module_measures_without_alerting() {
        let mut m = numeric_module(StaticProbe("120"));
        m.set_quiet(true);
        m.add_condition(Condition::parse("> 100 cmdA").unwrap());

        let runner = FakeRunner::replying("");
        let vars = VarStore::new();
        assert!(m.cycle(now(), &vars, &runner, 1).await.is_none());
        assert_eq!(m.latest_output(), Some("120"));
    }

    #[tokio::test]
    async fn test_matched_rule_without_command_yields_no_action() {
        let mut m = numeric_module(StaticProbe("120"));
        m.add_condition(Condition::parse("> 100").unwrap());

        let runner = FakeRunner::replying("");
        let vars = VarStore::new();
        assert!(m.cycle(now(), &vars, &runner, 1).await.is_none());
    }

    #[tokio::test]
    async fn test_intensive_state_enters_and_decays() {
        let mut m = numeric_module(SeqProbe::new(vec!["90", "10", "10"]));
        m.set_interval(10);
        m.set_intensive_interval(1);
        m.add_intensive_condition(Condition::parse("> 50").unwrap());

        let runner = FakeRunner::replying("");
        let vars = VarStore::new();

        m.cycle(now(), &vars, &runner, 1).await;
        assert!(m.is_intensive());
        assert_eq!(m.intensive_match(), 1);
        assert_eq!(m.effective_ticks(), 1);

        m.cycle(now(), &vars, &runner, 1).await;
        assert!(m.is_intensive(), "one miss keeps intensive state");

        m.cycle(now(), &vars, &runner, 1).await;
        assert!(!m.is_intensive(), "second consecutive miss ends it");
        assert_eq!(m.effective_ticks(), 10);
    }

    #[tokio::test]
    async fn test_precondition_veto_skips_probe_but_stamps_run() {
        let mut m = numeric_module(StaticProbe("1"));
        m.add_precondition(Condition::parse("> 5 check-gate").unwrap());

        let runner = FakeRunner::replying("0");
        let vars = VarStore::new();
        let before = now();
        assert!(m.cycle(before, &vars, &runner, 1).await.is_none());

        assert!(!m.has_output());
        assert_eq!(m.timestamp(), before.timestamp());
        assert_eq!(runner.calls.lock().unwrap().as_slice(), ["check-gate"]);
    }

    #[tokio::test]
    async fn test_precondition_pass_lets_probe_run() {
        let mut m = numeric_module(StaticProbe("7"));
        m.add_precondition(Condition::parse("> 5 check-gate").unwrap());

        let runner = FakeRunner::replying("9");
        let vars = VarStore::new();
        m.cycle(now(), &vars, &runner, 1).await;
        assert_eq!(m.latest_output(), Some("7"));
    }

    #[tokio::test]
    async fn test_probe_failure_is_absorbed() {
        let mut m = numeric_module(FailProbe);
        let runner = FakeRunner::replying("");
        let vars = VarStore::new();
        assert!(m.cycle(now(), &vars, &runner, 1).await.is_none());
        assert!(!m.has_output());
    }

    #[tokio::test]
    async fn test_probe_timeout_is_absorbed() {
        let mut m = numeric_module(SlowProbe);
        m.timeout = Duration::from_millis(50);
        let runner = FakeRunner::replying("");
        let vars = VarStore::new();
        m.cycle(now(), &vars, &runner, 1).await;
        assert!(!m.has_output());
    }

    #[test]
    fn test_format_value_trims_whole_numbers() {
        assert_eq!(format_value(5.0), "5");
        assert_eq!(format_value(5.5), "5.5");
        assert_eq!(format_value(-3.0), "-3");
    }
}
