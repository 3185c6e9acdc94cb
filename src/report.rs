//! Optional file outputs for a finished run: a human-readable HTML log
//! plus per-stage payment and wait-time CSVs. All writers append, so
//! successive runs over one document accumulate in the same files.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use miette::Diagnostic;
use thiserror::Error;

use crate::runtime::report::RunReport;

#[derive(Debug, Error, Diagnostic)]
pub enum ReportError {
    #[error("failed to write run output to {path}: {source}")]
    #[diagnostic(
        code(shortn::report::io),
        help("Check that the output directory exists and is writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

const PAYMENTS_FILE: &str = "payments.csv";
const WAITS_FILE: &str = "waits.csv";
const LOG_FILE: &str = "run-log.html";

pub struct OutputWriters {
    dir: PathBuf,
}

impl OutputWriters {
    /// Create the output directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, ReportError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| ReportError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn write(&self, report: &RunReport) -> Result<(), ReportError> {
        self.write_payments(report)?;
        self.write_waits(report)?;
        self.write_log(report)
    }

    fn write_payments(&self, report: &RunReport) -> Result<(), ReportError> {
        let mut out = self.appender(PAYMENTS_FILE, "paragraph,stage,cost\n")?;
        for row in &report.stage_reports {
            self.emit(
                &mut out,
                PAYMENTS_FILE,
                &format!("{},{},{:.4}\n", row.paragraph, row.stage, row.cost),
            )?;
        }
        Ok(())
    }

    fn write_waits(&self, report: &RunReport) -> Result<(), ReportError> {
        let mut out = self.appender(WAITS_FILE, "paragraph,stage,wait_millis\n")?;
        for row in &report.stage_reports {
            self.emit(
                &mut out,
                WAITS_FILE,
                &format!("{},{},{}\n", row.paragraph, row.stage, row.wait_millis),
            )?;
        }
        Ok(())
    }

    fn write_log(&self, report: &RunReport) -> Result<(), ReportError> {
        let mut out = self.appender(LOG_FILE, "")?;
        let mut html = String::new();
        html.push_str(&format!("<h2>Run at {}</h2>\n", Utc::now().to_rfc3339()));
        html.push_str("<ul>\n");
        for result in &report.paragraphs {
            html.push_str(&format!(
                "<li>paragraph {}: {} patch(es), lengths {:?}</li>\n",
                result.paragraph,
                result.patches.len(),
                result.plan.possible_lengths(),
            ));
        }
        for failure in &report.suspended {
            html.push_str(&format!(
                "<li>paragraph {} suspended: {}</li>\n",
                failure.paragraph,
                escape(&failure.message),
            ));
        }
        html.push_str("</ul>\n");
        if !report.rejected_workers.is_empty() {
            html.push_str("<p>Rejected workers:</p>\n<ul>\n");
            for rejection in &report.rejected_workers {
                html.push_str(&format!(
                    "<li>{} ({}): {}</li>\n",
                    escape(&rejection.worker),
                    rejection.stage,
                    escape(&rejection.reason),
                ));
            }
            html.push_str("</ul>\n");
        }
        self.emit(&mut out, LOG_FILE, &html)
    }

    /// Open a file for append, writing `header` only when creating it.
    fn appender(&self, name: &str, header: &str) -> Result<File, ReportError> {
        let path = self.dir.join(name);
        let fresh = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ReportError::Io {
                path: path.display().to_string(),
                source,
            })?;
        if fresh && !header.is_empty() {
            self.emit(&mut file, name, header)?;
        }
        Ok(file)
    }

    fn emit(&self, file: &mut File, name: &str, content: &str) -> Result<(), ReportError> {
        file.write_all(content.as_bytes())
            .map_err(|source| ReportError::Io {
                path: self.dir.join(name).display().to_string(),
                source,
            })
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
