//! Result file parsing and review comment rendering
//!
//! The runner writes a JSON object with a `test_results` array. Each record
//! becomes one tab separated line, `grade, name, message, elapsed_time`, in
//! execution order. Tabs, newlines, carriage returns and backslashes inside
//! `name` and `message` are escaped so a record never spans two lines or
//! grows an extra column.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use farmgate_core::error::ResultFileError;
use farmgate_core::pipeline::ResultReporting;
use farmgate_core::{Grade, GradeCounts, ResultRecord, RunReport};

const DELIMITER: char = '\t';

#[derive(Debug, Deserialize)]
struct RawResults {
    test_results: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    grade: String,
    name: String,
    #[serde(default)]
    message: Option<String>,
    elapsed_time: f64,
}

/// Read and validate a result file
pub fn load_records(path: &Path) -> Result<Vec<ResultRecord>, ResultFileError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ResultFileError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            ResultFileError::corrupt(path, e.to_string())
        }
    })?;
    parse_results(path, &content)
}

/// Parse result file content; `path` is only used in errors
pub fn parse_results(path: &Path, content: &str) -> Result<Vec<ResultRecord>, ResultFileError> {
    let raw: RawResults =
        serde_json::from_str(content).map_err(|e| ResultFileError::corrupt(path, e.to_string()))?;

    raw.test_results
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let grade: Grade = record.grade.parse().map_err(|_| {
                ResultFileError::corrupt(
                    path,
                    format!("record {}: unknown grade '{}'", index, record.grade),
                )
            })?;
            if !record.elapsed_time.is_finite() || record.elapsed_time < 0.0 {
                return Err(ResultFileError::corrupt(
                    path,
                    format!("record {}: invalid elapsed_time {}", index, record.elapsed_time),
                ));
            }
            Ok(ResultRecord::new(
                grade,
                record.name,
                record.message.unwrap_or_default(),
                record.elapsed_time,
            ))
        })
        .collect()
}

/// Escape a field for the tab separated report
pub fn escape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Reverse [`escape_field`]; unknown escapes are kept verbatim
pub fn unescape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// One report line
pub fn render_line(record: &ResultRecord) -> String {
    format!(
        "{grade}{d}{name}{d}{message}{d}{elapsed}",
        grade = record.grade,
        name = escape_field(&record.name),
        message = escape_field(&record.message),
        elapsed = record.elapsed_time,
        d = DELIMITER,
    )
}

/// Parse rendered report lines back into records
pub fn parse_rendered(text: &str) -> Result<Vec<ResultRecord>, ResultFileError> {
    let source = PathBuf::from("<report>");
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            let fields: Vec<&str> = line.split(DELIMITER).collect();
            let [grade, name, message, elapsed] = fields.as_slice() else {
                return Err(ResultFileError::corrupt(
                    &source,
                    format!("line {}: expected 4 fields, got {}", index + 1, fields.len()),
                ));
            };
            let grade: Grade = grade.parse().map_err(|_| {
                ResultFileError::corrupt(&source, format!("line {}: unknown grade '{}'", index + 1, grade))
            })?;
            let elapsed: f64 = elapsed.parse().map_err(|_| {
                ResultFileError::corrupt(
                    &source,
                    format!("line {}: invalid elapsed time '{}'", index + 1, elapsed),
                )
            })?;
            Ok(ResultRecord::new(
                grade,
                unescape_field(name),
                unescape_field(message),
                elapsed,
            ))
        })
        .collect()
}

/// Tab separated [`ResultReporting`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TsvReporter;

impl TsvReporter {
    pub fn new() -> Self {
        Self
    }
}

impl ResultReporting for TsvReporter {
    fn parse(&self, result_file: &Path) -> Result<Vec<ResultRecord>, ResultFileError> {
        let records = load_records(result_file)?;
        debug!(path = %result_file.display(), records = records.len(), "result file parsed");
        Ok(records)
    }

    fn render(&self, records: &[ResultRecord]) -> RunReport {
        RunReport {
            lines: records.iter().map(render_line).collect(),
            summary: GradeCounts::from_records(records),
            annotations: Vec::new(),
        }
    }
}
