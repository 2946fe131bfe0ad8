//! Line-oriented parsing of the external collector's stdout.
//!
//! The collector binary's output format is the data contract: any line shape
//! we do not recognize is ignored, never an error, so newer collector versions
//! with extra output keep working.

const ELIGIBLE_PREFIX: &str = "blob eligible for deletion: ";
const STAT_SUFFIX: &str = "manifests eligible for deletion";
const TIME_PREFIX: &str = "time=";
const LEVEL_MARKER: &str = "level=";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DryRunReport {
    /// Digests (`algorithm:hex`) of blobs the collector would delete.
    pub blobs: Vec<String>,
    /// Summary lines, e.g. "10 blobs marked, 2 manifests eligible for deletion".
    pub stats: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Collector log lines, trimmed to start at their `level=` marker.
    pub log_lines: Vec<String>,
    pub stats: Vec<String>,
}

pub fn parse_dry_run(stdout: &str) -> DryRunReport {
    let mut report = DryRunReport::default();
    for line in stdout.lines() {
        if let Some(digest) = line.strip_prefix(ELIGIBLE_PREFIX) {
            report.blobs.push(digest.to_string());
        } else if line.ends_with(STAT_SUFFIX) {
            report.stats.push(line.to_string());
        }
    }
    report
}

pub fn parse_removal(stdout: &str) -> RemovalReport {
    let mut report = RemovalReport::default();
    for line in stdout.lines() {
        if line.starts_with(TIME_PREFIX) {
            if let Some(idx) = line.find(LEVEL_MARKER) {
                report.log_lines.push(line[idx..].to_string());
            }
        } else if line.ends_with(STAT_SUFFIX) {
            report.stats.push(line.to_string());
        }
    }
    report
}
