use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use watchkit::AgentReport;

/// On-disk rendering of the cycle report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpoolFormat {
    Xml,
    Json,
}

impl fmt::Display for SpoolFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpoolFormat::Xml => write!(f, "xml"),
            SpoolFormat::Json => write!(f, "json"),
        }
    }
}

/// Writes one file per cycle into the spool directory for a transport to
/// pick up later. File names follow `<agent_name>.<utimestamp>.data`.
pub struct SpoolWriter {
    dir: PathBuf,
    format: SpoolFormat,
}

impl SpoolWriter {
    pub fn new(dir: impl Into<PathBuf>, format: SpoolFormat) -> Self {
        Self { dir: dir.into(), format }
    }

    pub fn write(&self, report: &AgentReport) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let file_name = format!("{}.{}.data", report.agent_name, report.timestamp.timestamp());
        let path = self.dir.join(file_name);
        let payload = match self.format {
            SpoolFormat::Xml => report.to_xml(),
            SpoolFormat::Json => serde_json::to_string_pretty(report)?,
        };
        fs::write(&path, payload)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use watchkit::{Data, Exporter, ModuleReport, ModuleType};

    fn sample_report() -> AgentReport {
        let mut module = ModuleReport::new("load", ModuleType::GenericData);
        module.consume(Data::new("42", ModuleType::GenericData, Local::now()));
        AgentReport {
            agent_name: "testhost".to_string(),
            version: "0.1.0".to_string(),
            os_name: "linux".to_string(),
            os_version: "6.1".to_string(),
            interval: 300,
            timestamp: Local::now(),
            modules: vec![module],
        }
    }

    #[test]
    fn test_xml_spool_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();
        let writer = SpoolWriter::new(dir.path(), SpoolFormat::Xml);

        let path = writer.write(&report).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("testhost."));
        assert!(name.ends_with(".data"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("<agent_data"));
        assert!(content.contains("<data><![CDATA[42]]></data>"));
    }

    #[test]
    fn test_json_spool_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();
        let writer = SpoolWriter::new(dir.path(), SpoolFormat::Json);

        let path = writer.write(&report).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["agent_name"], "testhost");
        assert_eq!(json["modules"][0]["name"], "load");
        assert_eq!(json["modules"][0]["data"][0]["value"], "42");
    }

    #[test]
    fn test_spool_directory_is_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/spool");
        let writer = SpoolWriter::new(&nested, SpoolFormat::Xml);
        writer.write(&sample_report()).unwrap();
        assert!(nested.is_dir());
    }
}
