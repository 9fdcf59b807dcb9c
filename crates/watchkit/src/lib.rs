//! Watchkit - module scheduling and rule engine for the Farwatch host agent
//!
//! This library owns everything between a module definition file and the
//! export record: parsing definitions into a registry, deciding when each
//! module is due, running its probe, classifying the value against
//! thresholds, and evaluating condition rules.

pub mod condition;
pub mod error;
pub mod factory;
pub mod module;
pub mod probes;
pub mod registry;
pub mod report;
pub mod runner;
pub mod schedule;
pub mod types;
pub mod vars;
pub mod watchdog;

// Re-export main types
pub use condition::{Condition, Operator, TriggeredAction};
pub use error::ProbeError;
pub use module::{Module, band_matches};
pub use registry::ModuleRegistry;
pub use report::{AgentReport, Exporter, ModuleReport};
pub use runner::{CommandRunner, ShellRunner};
pub use types::{Data, ModuleKind, ModuleType, Severity};
pub use vars::VarStore;
pub use watchdog::{MIN_WATCHDOG_DELAY_MS, Watchdog, WatchdogPolicy, WatchdogState};

/// Timeout applied to a module run when its definition does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
