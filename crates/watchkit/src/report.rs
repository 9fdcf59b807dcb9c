use chrono::{DateTime, Local};
use serde::Serialize;

use crate::types::{Data, ModuleType, Severity};

/// Wall-clock format the collector expects in XML timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Sink for drained Data records. Draining transfers ownership; the module's
/// queue is empty afterwards.
pub trait Exporter {
    fn consume(&mut self, record: Data);
}

fn push_cdata(out: &mut String, value: &str) {
    out.push_str("<![CDATA[");
    out.push_str(&value.replace("]]>", "]]]]><![CDATA[>"));
    out.push_str("]]>");
}

fn push_tag(out: &mut String, indent: &str, name: &str, value: &str) {
    out.push_str(indent);
    out.push('<');
    out.push_str(name);
    out.push('>');
    push_cdata(out, value);
    out.push_str("</");
    out.push_str(name);
    out.push_str(">\n");
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// One module's slice of the export record: identity, thresholds and the
/// Data records drained into it this cycle.
#[derive(Debug, Serialize)]
pub struct ModuleReport {
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub interval: u32,
    pub status: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_critical: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_critical: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub str_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub str_critical: Option<String>,
    pub warning_inverse: bool,
    pub critical_inverse: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_instructions: Option<String>,
    pub data: Vec<Data>,
}

impl ModuleReport {
    pub fn new(name: impl Into<String>, module_type: ModuleType) -> Self {
        Self {
            name: name.into(),
            module_type,
            description: None,
            interval: 1,
            status: Severity::Normal,
            min_warning: None,
            max_warning: None,
            min_critical: None,
            max_critical: None,
            str_warning: None,
            str_critical: None,
            warning_inverse: false,
            critical_inverse: false,
            unit: None,
            group: None,
            custom_id: None,
            tags: None,
            critical_instructions: None,
            warning_instructions: None,
            unknown_instructions: None,
            data: Vec::new(),
        }
    }

    /// Collector XML: one value as a plain `<data>` tag, several as a
    /// `<datalist>` with per-record timestamps.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<module>\n");
        push_tag(&mut out, "  ", "name", &self.name);
        push_tag(&mut out, "  ", "type", self.module_type.as_str());
        if let Some(text) = &self.description {
            push_tag(&mut out, "  ", "description", text);
        }
        if self.interval > 1 {
            push_tag(&mut out, "  ", "module_interval", &self.interval.to_string());
        }
        match self.data.as_slice() {
            [] => {}
            [only] => push_tag(&mut out, "  ", "data", &only.value),
            many => {
                out.push_str("  <datalist>\n");
                for record in many {
                    out.push_str("    <data>\n");
                    push_tag(&mut out, "      ", "value", &record.value);
                    push_tag(
                        &mut out,
                        "      ",
                        "timestamp",
                        &record.at.format(TIMESTAMP_FORMAT).to_string(),
                    );
                    out.push_str("    </data>\n");
                }
                out.push_str("  </datalist>\n");
            }
        }
        push_tag(&mut out, "  ", "status", &self.status.to_string());
        for (tag, value) in [
            ("min_warning", &self.min_warning),
            ("max_warning", &self.max_warning),
            ("min_critical", &self.min_critical),
            ("max_critical", &self.max_critical),
            ("str_warning", &self.str_warning),
            ("str_critical", &self.str_critical),
        ] {
            if let Some(v) = value {
                push_tag(&mut out, "  ", tag, v);
            }
        }
        if self.warning_inverse {
            push_tag(&mut out, "  ", "warning_inverse", "1");
        }
        if self.critical_inverse {
            push_tag(&mut out, "  ", "critical_inverse", "1");
        }
        for (tag, value) in [
            ("unit", &self.unit),
            ("module_group", &self.group),
            ("custom_id", &self.custom_id),
            ("tags", &self.tags),
            ("critical_instructions", &self.critical_instructions),
            ("warning_instructions", &self.warning_instructions),
            ("unknown_instructions", &self.unknown_instructions),
        ] {
            if let Some(v) = value {
                push_tag(&mut out, "  ", tag, v);
            }
        }
        out.push_str("</module>\n");
        out
    }
}

impl Exporter for ModuleReport {
    fn consume(&mut self, record: Data) {
        self.data.push(record);
    }
}

/// The full export record for one cycle: agent identity plus every module
/// that produced data.
#[derive(Debug, Serialize)]
pub struct AgentReport {
    pub agent_name: String,
    pub version: String,
    pub os_name: String,
    pub os_version: String,
    pub interval: u64,
    pub timestamp: DateTime<Local>,
    pub modules: Vec<ModuleReport>,
}

impl AgentReport {
    pub fn to_xml(&self) -> String {
        let mut out = format!(
            "<agent_data agent_name='{}' version='{}' os_name='{}' os_version='{}' \
             interval='{}' timestamp='{}'>\n",
            escape_attr(&self.agent_name),
            escape_attr(&self.version),
            escape_attr(&self.os_name),
            escape_attr(&self.os_version),
            self.interval,
            self.timestamp.format(TIMESTAMP_FORMAT),
        );
        for module in &self.modules {
            out.push_str(&module.to_xml());
        }
        out.push_str("</agent_data>\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: &str) -> Data {
        Data::new(value, ModuleType::GenericData, Local::now())
    }

    #[test]
    fn test_single_record_renders_plain_data_tag() {
        let mut report = ModuleReport::new("load", ModuleType::GenericData);
        report.consume(record("42"));
        let xml = report.to_xml();
        assert!(xml.contains("<name><![CDATA[load]]></name>"));
        assert!(xml.contains("<type><![CDATA[generic_data]]></type>"));
        assert!(xml.contains("<data><![CDATA[42]]></data>"));
        assert!(!xml.contains("<datalist>"));
    }

    #[test]
    fn test_multiple_records_render_datalist() {
        let mut report = ModuleReport::new("events", ModuleType::AsyncData);
        report.consume(record("1"));
        report.consume(record("2"));
        let xml = report.to_xml();
        assert!(xml.contains("<datalist>"));
        assert_eq!(xml.matches("<value>").count(), 2);
        assert_eq!(xml.matches("<timestamp>").count(), 2);
    }

    #[test]
    fn test_cdata_terminator_is_split() {
        let mut report = ModuleReport::new("tricky", ModuleType::GenericDataString);
        report.consume(record("a]]>b"));
        let xml = report.to_xml();
        assert!(xml.contains("<![CDATA[a]]]]><![CDATA[>b]]>"));
    }

    #[test]
    fn test_thresholds_render_only_when_set() {
        let mut report = ModuleReport::new("disk", ModuleType::GenericData);
        report.min_warning = Some("10,20".to_string());
        report.warning_inverse = true;
        let xml = report.to_xml();
        assert!(xml.contains("<min_warning><![CDATA[10,20]]></min_warning>"));
        assert!(xml.contains("<warning_inverse><![CDATA[1]]></warning_inverse>"));
        assert!(!xml.contains("<max_critical>"));
        assert!(!xml.contains("<critical_inverse>"));
    }

    #[test]
    fn test_agent_envelope_escapes_attributes() {
        let report = AgentReport {
            agent_name: "web & 'edge'".to_string(),
            version: "1.0".to_string(),
            os_name: "linux".to_string(),
            os_version: "6.1".to_string(),
            interval: 300,
            timestamp: Local::now(),
            modules: Vec::new(),
        };
        let xml = report.to_xml();
        assert!(xml.starts_with("<agent_data agent_name='web &amp; &apos;edge&apos;'"));
        assert!(xml.trim_end().ends_with("</agent_data>"));
        assert!(xml.contains("interval='300'"));
    }

    #[test]
    fn test_json_rendering_keeps_module_fields() {
        let mut report = ModuleReport::new("load", ModuleType::GenericData);
        report.consume(record("42"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["name"], "load");
        assert_eq!(json["type"], "generic_data");
        assert_eq!(json["data"][0]["value"], "42");
        // unset thresholds are omitted entirely
        assert!(json.get("min_warning").is_none());
    }
}
