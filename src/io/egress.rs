//! Report egress - appends completed proximity reports to file
//!
//! Reports are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::ProximityReport;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for proximity reports
pub struct ReportEgress {
    file_path: String,
}

impl ReportEgress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a report to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_report(&self, report: &ProximityReport) -> bool {
        match self.append_line(&report.to_json()) {
            Ok(()) => {
                info!(
                    run_id = %report.run_id,
                    feature = %report.feature,
                    records = %report.records.len(),
                    "report_egressed"
                );
                true
            }
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "report_egress_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}
