use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use regex::Regex;

use crate::error::ProbeError;
use crate::probes::{Probe, ProbeContext, ProbeOutcome};

/// Tails a log file and reports lines matching a pattern. Each run picks up
/// where the previous one stopped; a shrunken file is treated as rotated and
/// read from the start again.
pub struct RegexpProbe {
    path: PathBuf,
    pattern: Regex,
    collect_lines: bool,
    offset: u64,
}

impl RegexpProbe {
    pub fn new(path: impl Into<PathBuf>, pattern: Regex, collect_lines: bool) -> Self {
        Self { path: path.into(), pattern, collect_lines, offset: 0 }
    }
}

#[async_trait::async_trait]
impl Probe for RegexpProbe {
    async fn collect(&mut self, _ctx: &ProbeContext<'_>) -> ProbeOutcome {
        let len = std::fs::metadata(&self.path)
            .map_err(|e| ProbeError::Output(format!("cannot stat {}: {e}", self.path.display())))?
            .len();
        if len < self.offset {
            self.offset = 0;
        }

        let mut file = std::fs::File::open(&self.path)
            .map_err(|e| ProbeError::Output(format!("cannot open {}: {e}", self.path.display())))?;
        file.seek(SeekFrom::Start(self.offset))
            .map_err(|e| ProbeError::Output(format!("cannot seek {}: {e}", self.path.display())))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| ProbeError::Output(format!("cannot read {}: {e}", self.path.display())))?;
        self.offset += bytes.len() as u64;

        let text = String::from_utf8_lossy(&bytes);
        let matched: Vec<&str> = text.lines().filter(|l| self.pattern.is_match(l)).collect();

        if self.collect_lines {
            if matched.is_empty() {
                Ok(None)
            } else {
                Ok(Some(matched.join("\n")))
            }
        } else {
            Ok(Some(matched.len().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::VarStore;
    use std::io::Write;
    use std::time::Duration;

    fn ctx(vars: &VarStore) -> ProbeContext<'_> {
        ProbeContext { timeout: Duration::from_secs(5), vars }
    }

    #[tokio::test]
    async fn test_counts_matching_lines() {
        let vars = VarStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "ok\nERROR one\nok\nERROR two\n").unwrap();

        let mut probe = RegexpProbe::new(&path, Regex::new("ERROR").unwrap(), false);
        assert_eq!(probe.collect(&ctx(&vars)).await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_only_new_lines_are_seen() {
        let vars = VarStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "ERROR old\n").unwrap();

        let mut probe = RegexpProbe::new(&path, Regex::new("ERROR").unwrap(), false);
        assert_eq!(probe.collect(&ctx(&vars)).await.unwrap().as_deref(), Some("1"));

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "noise").unwrap();
        writeln!(file, "ERROR fresh").unwrap();
        drop(file);

        assert_eq!(probe.collect(&ctx(&vars)).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_rotation_resets_to_start() {
        let vars = VarStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "ERROR a\nERROR b\nERROR c\n").unwrap();

        let mut probe = RegexpProbe::new(&path, Regex::new("ERROR").unwrap(), false);
        assert_eq!(probe.collect(&ctx(&vars)).await.unwrap().as_deref(), Some("3"));

        // rotated: replaced by a shorter file
        std::fs::write(&path, "ERROR z\n").unwrap();
        assert_eq!(probe.collect(&ctx(&vars)).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_line_mode_returns_text_or_nothing() {
        let vars = VarStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "ERROR one\nok\nERROR two\n").unwrap();

        let mut probe = RegexpProbe::new(&path, Regex::new("ERROR").unwrap(), true);
        assert_eq!(
            probe.collect(&ctx(&vars)).await.unwrap().as_deref(),
            Some("ERROR one\nERROR two")
        );
        // nothing new appended, so nothing to report
        assert_eq!(probe.collect(&ctx(&vars)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let vars = VarStore::new();
        let mut probe =
            RegexpProbe::new("/no/such/file.log", Regex::new("ERROR").unwrap(), false);
        assert!(probe.collect(&ctx(&vars)).await.is_err());
    }
}
