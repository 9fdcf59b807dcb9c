use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exporter::SpoolFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Read(#[source] std::io::Error),
    #[error("cannot write config: {0}")]
    Write(#[source] std::io::Error),
    #[error("config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config cannot be rendered as TOML: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("no usable config directory")]
    ConfigPathUnavailable,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: Agent,
    pub spool: Spool,
    pub log: Log,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Agent {
    /// Name reported to the collector. Defaults to the hostname.
    pub name: String,
    /// Base tick in seconds; module intervals count in these ticks.
    pub interval: u64,
    /// Module definition file.
    pub modules: path::PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Spool {
    pub dir: path::PathBuf,
    pub format: SpoolFormat,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Log {
    pub level: String,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/farwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("farwatch/config.toml"))
}

impl Default for AgentConfig {
    fn default() -> Self {
        let name = sysinfo::System::host_name().unwrap_or_else(|| "farwatch".into());
        Self {
            agent: Agent { name, interval: 300, modules: "modules.def".into() },
            spool: Spool { dir: env::temp_dir().join("farwatch"), format: SpoolFormat::Xml },
            log: Log { level: "info".into() },
        }
    }
}

impl fmt::Display for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Agent")?;
        write_1(f, "Name", &self.agent.name)?;
        write_1(f, "Interval", &self.agent.interval)?;
        write_1(f, "Modules", &self.agent.modules.display())?;
        write_title_1(f, "Spool")?;
        write_1(f, "Directory", &self.spool.dir.display())?;
        write_1(f, "Format", &self.spool.format)?;
        write_title_1(f, "Log")?;
        write_1(f, "Level", &self.log.level)?;

        Ok(())
    }
}

impl AgentConfig {
    /// Generate the configuration from a file.
    ///
    /// Creates a default config in ~/.config/farwatch/config.toml or at the
    /// specified path if one does not exist yet.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }

        fs::write(path, config_str).map_err(ConfigError::Write)
    }
}
