//! JSONL reports: one JSON object per line.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::record::EvaluationRecord;
use crate::error::ReportError;

/// A reply recorded outside the driver, graded by `mecheval score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub task_instance_id: String,
    pub response: String,
    #[serde(default)]
    pub model_name: Option<String>,
}

fn write_lines<T: Serialize>(writer: &mut impl Write, items: &[T]) -> Result<(), ReportError> {
    for item in items {
        let line = serde_json::to_string(item)?;
        writeln!(writer, "{}", line)?;
    }
    Ok(())
}

/// Writes `records` to `path`, replacing any existing file.
pub fn write_records(path: &Path, records: &[EvaluationRecord]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_lines(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}

/// Appends `records` to `path`, creating it if needed.
pub fn append_records(path: &Path, records: &[EvaluationRecord]) -> Result<(), ReportError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    write_lines(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}

/// Parses JSONL content. Blank lines are skipped; line numbers in errors
/// are one-based.
pub fn parse_lines<T: DeserializeOwned>(content: &str) -> Result<Vec<T>, ReportError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| ReportError::MalformedLine {
                line: index + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

pub fn read_records(path: &Path) -> Result<Vec<EvaluationRecord>, ReportError> {
    parse_lines(&fs::read_to_string(path)?)
}

pub fn read_responses(path: &Path) -> Result<Vec<RecordedResponse>, ReportError> {
    parse_lines(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskInstance, TaskKind};

    fn record(id: &str) -> EvaluationRecord {
        let task = TaskInstance::new(id, TaskKind::Calculation, "p");
        EvaluationRecord::failed(&task, "m", "no reply")
    }

    #[test]
    fn test_write_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.jsonl");

        write_records(&path, &[record("b-1"), record("b-2")]).unwrap();
        append_records(&path, &[record("b-3")]).unwrap();

        let back = read_records(&path).unwrap();
        let ids: Vec<&str> = back.iter().map(|r| r.task_instance_id.as_str()).collect();
        assert_eq!(ids, vec!["b-1", "b-2", "b-3"]);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_malformed_line_is_located() {
        let content = "{\"task_instance_id\": \"a\", \"response\": \"x\"}\n\nnot json\n";
        let err = parse_lines::<RecordedResponse>(content).unwrap_err();
        assert!(matches!(err, ReportError::MalformedLine { line: 3, .. }));
    }

    #[test]
    fn test_recorded_responses() {
        let content = "{\"task_instance_id\": \"a-1\", \"response\": \"Option 2\", \"model_name\": \"m\"}\n\
                       {\"task_instance_id\": \"b-1\", \"response\": \"42 N\"}";
        let responses: Vec<RecordedResponse> = parse_lines(content).unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].model_name.as_deref(), Some("m"));
        assert_eq!(responses[1].model_name, None);
    }
}
