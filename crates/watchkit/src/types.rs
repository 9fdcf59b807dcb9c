use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Shape of the value a module produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    GenericData,
    GenericDataInc,
    GenericProc,
    GenericDataString,
    AsyncData,
    AsyncProc,
    AsyncString,
    Log,
}

impl ModuleType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generic_data" => Some(Self::GenericData),
            "generic_data_inc" => Some(Self::GenericDataInc),
            "generic_proc" => Some(Self::GenericProc),
            "generic_data_string" => Some(Self::GenericDataString),
            "async_data" => Some(Self::AsyncData),
            "async_proc" => Some(Self::AsyncProc),
            "async_string" => Some(Self::AsyncString),
            "log" => Some(Self::Log),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenericData => "generic_data",
            Self::GenericDataInc => "generic_data_inc",
            Self::GenericProc => "generic_proc",
            Self::GenericDataString => "generic_data_string",
            Self::AsyncData => "async_data",
            Self::AsyncProc => "async_proc",
            Self::AsyncString => "async_string",
            Self::Log => "log",
        }
    }

    /// Values of these types are carried as strings and matched with
    /// `str_warning`/`str_critical` instead of numeric bands.
    pub fn is_string(&self) -> bool {
        matches!(self, Self::GenericDataString | Self::AsyncString | Self::Log)
    }

    /// Boolean-proc shape: the published value collapses to "1" or "0".
    pub fn is_proc(&self) -> bool {
        matches!(self, Self::GenericProc | Self::AsyncProc)
    }

    /// Asynchronous types only queue a record when the value changed.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::AsyncData | Self::AsyncProc | Self::AsyncString)
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What work a module does. Parsed from the `module_<kind>` definition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Exec,
    Proc,
    Service,
    Freedisk,
    FreediskPercent,
    Cpuusage,
    Inventory,
    Freememory,
    FreememoryPercent,
    Odbc,
    Logevent,
    Wmiquery,
    Perfcounter,
    Tcpcheck,
    Regexp,
    Plugin,
    Ping,
    Snmpget,
}

impl ModuleKind {
    /// Parse a definition key such as `module_exec`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "module_exec" => Some(Self::Exec),
            "module_proc" => Some(Self::Proc),
            "module_service" => Some(Self::Service),
            "module_freedisk" => Some(Self::Freedisk),
            "module_freedisk_percent" => Some(Self::FreediskPercent),
            "module_cpuusage" => Some(Self::Cpuusage),
            "module_inventory" => Some(Self::Inventory),
            "module_freememory" => Some(Self::Freememory),
            "module_freememory_percent" => Some(Self::FreememoryPercent),
            "module_odbc" => Some(Self::Odbc),
            "module_logevent" => Some(Self::Logevent),
            "module_wmiquery" => Some(Self::Wmiquery),
            "module_perfcounter" => Some(Self::Perfcounter),
            "module_tcpcheck" => Some(Self::Tcpcheck),
            "module_regexp" => Some(Self::Regexp),
            "module_plugin" => Some(Self::Plugin),
            "module_ping" => Some(Self::Ping),
            "module_snmpget" => Some(Self::Snmpget),
            _ => None,
        }
    }

    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Exec => "module_exec",
            Self::Proc => "module_proc",
            Self::Service => "module_service",
            Self::Freedisk => "module_freedisk",
            Self::FreediskPercent => "module_freedisk_percent",
            Self::Cpuusage => "module_cpuusage",
            Self::Inventory => "module_inventory",
            Self::Freememory => "module_freememory",
            Self::FreememoryPercent => "module_freememory_percent",
            Self::Odbc => "module_odbc",
            Self::Logevent => "module_logevent",
            Self::Wmiquery => "module_wmiquery",
            Self::Perfcounter => "module_perfcounter",
            Self::Tcpcheck => "module_tcpcheck",
            Self::Regexp => "module_regexp",
            Self::Plugin => "module_plugin",
            Self::Ping => "module_ping",
            Self::Snmpget => "module_snmpget",
        }
    }

    /// Kinds with a probe backend in this build. The rest parse into the
    /// taxonomy but their definitions are dropped.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::Exec
                | Self::Proc
                | Self::Service
                | Self::Freedisk
                | Self::FreediskPercent
                | Self::Cpuusage
                | Self::Freememory
                | Self::FreememoryPercent
                | Self::Tcpcheck
                | Self::Regexp
                | Self::Plugin
                | Self::Ping
        )
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // drop the "module_" prefix for log lines
        f.write_str(self.as_key().trim_start_matches("module_"))
    }
}

/// Alert severity a value classifies into under the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Normal => write!(f, "normal"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One emitted measurement, queued on the module until export drains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub value: String,
    pub module_type: ModuleType,
    pub at: DateTime<Local>,
}

impl Data {
    pub fn new(value: impl Into<String>, module_type: ModuleType, at: DateTime<Local>) -> Self {
        Self { value: value.into(), module_type, at }
    }
}
