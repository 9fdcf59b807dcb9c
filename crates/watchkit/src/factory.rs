use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::condition::Condition;
use crate::module::Module;
use crate::probes::{
    CpuProbe, DiskProbe, ExecProbe, MemoryProbe, PingProbe, Probe, ProcProbe, RegexpProbe,
    ServiceProbe, TcpProbe,
};
use crate::schedule::Cron;
use crate::types::{ModuleKind, ModuleType};
use crate::watchdog::{MIN_WATCHDOG_DELAY_MS, WatchdogPolicy, WatchdogState};

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "yes" | "true")
}

fn first_value<'a>(body: &'a [(String, String)], key: &str) -> Option<&'a str> {
    body.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Build a module from the key/value body of one definition block. Returns
/// nothing for blocks this build cannot run; the caller drops those without
/// raising an error.
pub fn module_from_definition(body: &[(String, String)]) -> Option<Module> {
    let Some(name) = first_value(body, "module_name").map(str::trim).filter(|n| !n.is_empty())
    else {
        debug!("module block without module_name");
        return None;
    };

    let module_type = match first_value(body, "module_type") {
        None => ModuleType::GenericData,
        Some(raw) => match ModuleType::parse(raw.trim()) {
            Some(t) => t,
            None => {
                debug!(module = name, raw, "unknown module type");
                return None;
            }
        },
    };

    let Some((kind, kind_value)) =
        body.iter().find_map(|(k, v)| ModuleKind::from_key(k).map(|kind| (kind, v.trim())))
    else {
        debug!(module = name, "module block without a kind key");
        return None;
    };
    if !kind.is_supported() {
        debug!(module = name, %kind, "module kind not supported in this build");
        return None;
    }

    let mut watchdog = None;
    let probe: Box<dyn Probe> = match kind {
        ModuleKind::Exec => {
            if kind_value.is_empty() {
                debug!(module = name, "module_exec without a command");
                return None;
            }
            Box::new(ExecProbe::new(kind_value))
        }
        ModuleKind::Plugin => {
            if kind_value.is_empty() {
                debug!(module = name, "module_plugin without a command");
                return None;
            }
            Box::new(ExecProbe::plugin(kind_value))
        }
        ModuleKind::Proc => {
            if kind_value.is_empty() {
                debug!(module = name, "module_proc without a process name");
                return None;
            }
            let mut probe = ProcProbe::new(kind_value);
            if first_value(body, "module_watchdog").is_some_and(parse_flag) {
                let mut policy = WatchdogPolicy::new(kind_value);
                policy.start_command =
                    first_value(body, "module_start_command").map(str::to_string);
                if let Some(n) = first_value(body, "module_retries").and_then(|v| v.parse().ok())
                {
                    policy.retries = n;
                }
                if let Some(ms) =
                    first_value(body, "module_startdelay").and_then(|v| v.parse::<u64>().ok())
                {
                    policy.start_delay = Duration::from_millis(ms.max(MIN_WATCHDOG_DELAY_MS));
                }
                if let Some(ms) =
                    first_value(body, "module_retrydelay").and_then(|v| v.parse::<u64>().ok())
                {
                    policy.retry_delay = Duration::from_millis(ms.max(MIN_WATCHDOG_DELAY_MS));
                }
                let state = Arc::new(WatchdogState::default());
                probe = probe.with_watchdog(Arc::clone(&state));
                watchdog = Some((policy, state));
            }
            Box::new(probe)
        }
        ModuleKind::Service => {
            if kind_value.is_empty() {
                debug!(module = name, "module_service without a service name");
                return None;
            }
            Box::new(ServiceProbe::new(kind_value))
        }
        ModuleKind::Freedisk => Box::new(DiskProbe::new(kind_value, false)),
        ModuleKind::FreediskPercent => Box::new(DiskProbe::new(kind_value, true)),
        ModuleKind::Freememory => Box::new(MemoryProbe::new(false)),
        ModuleKind::FreememoryPercent => Box::new(MemoryProbe::new(true)),
        ModuleKind::Cpuusage => Box::new(CpuProbe::new(kind_value.parse().ok())),
        ModuleKind::Tcpcheck => {
            let Some(port) = first_value(body, "module_port").and_then(|v| v.trim().parse().ok())
            else {
                debug!(module = name, "module_tcpcheck without a usable module_port");
                return None;
            };
            Box::new(TcpProbe::new(kind_value, port))
        }
        ModuleKind::Regexp => {
            let Some(raw) = first_value(body, "module_pattern") else {
                debug!(module = name, "module_regexp without module_pattern");
                return None;
            };
            let pattern = match Regex::new(raw) {
                Ok(re) => re,
                Err(e) => {
                    debug!(module = name, error = %e, "module_pattern does not compile");
                    return None;
                }
            };
            Box::new(RegexpProbe::new(kind_value, pattern, module_type.is_string()))
        }
        ModuleKind::Ping => {
            let count = first_value(body, "module_ping_count")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(1);
            Box::new(PingProbe::new(kind_value, count))
        }
        // filtered by is_supported above
        ModuleKind::Inventory
        | ModuleKind::Odbc
        | ModuleKind::Logevent
        | ModuleKind::Wmiquery
        | ModuleKind::Perfcounter
        | ModuleKind::Snmpget => return None,
    };

    let mut module = Module::new(name, module_type, kind, probe);
    if let Some((policy, state)) = watchdog {
        module.set_watchdog(policy, state);
    }

    // remaining keys apply in file order so rule lists keep their order
    for (key, value) in body {
        let value = value.as_str();
        match key.as_str() {
            "module_description" => module.set_description(value),
            "module_interval" => {
                if let Ok(ticks) = value.trim().parse() {
                    module.set_interval(ticks);
                }
            }
            "module_intensive_interval" => {
                if let Ok(ticks) = value.trim().parse() {
                    module.set_intensive_interval(ticks);
                }
            }
            "module_timeout" => {
                if let Ok(secs) = value.trim().parse() {
                    module.set_timeout(secs);
                }
            }
            "module_min" => {
                if let Ok(v) = value.trim().parse() {
                    module.set_min(v);
                }
            }
            "module_max" => {
                if let Ok(v) = value.trim().parse() {
                    module.set_max(v);
                }
            }
            "module_min_warning" => module.set_min_warning(value),
            "module_max_warning" => module.set_max_warning(value),
            "module_min_critical" => module.set_min_critical(value),
            "module_max_critical" => module.set_max_critical(value),
            "module_str_warning" => module.set_str_warning(value),
            "module_str_critical" => module.set_str_critical(value),
            "module_warning_inverse" => module.set_warning_inverse(parse_flag(value)),
            "module_critical_inverse" => module.set_critical_inverse(parse_flag(value)),
            "module_precondition" => match Condition::parse(value) {
                Some(rule) => module.add_precondition(rule),
                None => debug!(module = name, value, "unparsable precondition"),
            },
            "module_condition" => match Condition::parse(value) {
                Some(rule) => module.add_condition(rule),
                None => debug!(module = name, value, "unparsable condition"),
            },
            "module_intensive_condition" => match Condition::parse(value) {
                Some(rule) => module.add_intensive_condition(rule),
                None => debug!(module = name, value, "unparsable intensive condition"),
            },
            "module_cron" | "module_crontab" => match Cron::parse(value) {
                Some(cron) => module.set_cron(cron),
                None => debug!(module = name, value, "unparsable cron pattern"),
            },
            "module_ff_event" | "module_min_ff_event" => {
                if let Ok(count) = value.trim().parse() {
                    module.set_min_ff_event(count);
                }
            }
            "module_ff_interval" => {
                if let Ok(ticks) = value.trim().parse() {
                    module.set_ff_interval(ticks);
                }
            }
            "module_postprocess" => {
                if let Ok(scale) = value.trim().parse() {
                    module.set_post_process(scale);
                }
            }
            "module_save" => module.set_save(value.trim()),
            "module_disabled" => module.set_disabled(parse_flag(value)),
            "module_quiet" => module.set_quiet(parse_flag(value)),
            "module_async" => module.set_async(parse_flag(value)),
            "module_unit" => module.set_unit(value),
            "module_group" => module.set_group(value),
            "module_custom_id" => module.set_custom_id(value),
            "module_tags" => module.set_tags(value),
            "module_critical_instructions" => module.set_critical_instructions(value),
            "module_warning_instructions" => module.set_warning_instructions(value),
            "module_unknown_instructions" => module.set_unknown_instructions(value),
            _ => {}
        }
    }

    module.normalize_limits();
    module.sync_cron_interval();
    Some(module)
}
