//! CSV result sink for benchmark runs.
//!
//! One row per design/criterion case. The header is written when the file is
//! created; later recorders opened on the same path append below it.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use matscout_contracts::error::{HarnessError, HarnessResult};

pub const HEADER: [&str; 5] = ["design", "criterion", "status", "steps", "answer"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub design: String,
    pub criterion: String,
    /// `RunStatus::label` of the run.
    pub status: String,
    pub steps: u32,
    pub answer: String,
}

fn results_error(action: &str, path: &Path, e: impl std::fmt::Display) -> HarnessError {
    HarnessError::Results {
        reason: format!("failed to {} '{}': {}", action, path.display(), e),
    }
}

#[derive(Debug, Clone)]
pub struct ResultRecorder {
    path: PathBuf,
}

impl ResultRecorder {
    /// Open (creating if needed) the result file at `path`, along with any
    /// missing parent directories.
    pub fn open(path: impl Into<PathBuf>) -> HarnessResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| results_error("create directory", parent, e))?;
        }

        if !path.exists() {
            let mut writer = csv::Writer::from_path(&path).map_err(|e| results_error("create", &path, e))?;
            writer
                .write_record(HEADER)
                .and_then(|_| writer.flush().map_err(csv::Error::from))
                .map_err(|e| results_error("write header to", &path, e))?;
            debug!(path = %path.display(), "result file created");
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row and flush it to disk.
    pub fn add(&self, row: &ResultRow) -> HarnessResult<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| results_error("open", &self.path, e))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .serialize(row)
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| results_error("append to", &self.path, e))
    }

    /// Every row recorded so far, in file order.
    pub fn rows(&self) -> HarnessResult<Vec<ResultRow>> {
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| results_error("open", &self.path, e))?;
        reader
            .deserialize()
            .collect::<Result<Vec<ResultRow>, _>>()
            .map_err(|e| results_error("read", &self.path, e))
    }

    /// Delete the result file.
    pub fn remove(self) -> HarnessResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| results_error("remove", &self.path, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(design: &str, answer: &str) -> ResultRow {
        ResultRow {
            design: design.to_string(),
            criterion: "lightweight".to_string(),
            status: "done".to_string(),
            steps: 2,
            answer: answer.to_string(),
        }
    }

    #[test]
    fn header_is_written_once_and_rows_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results").join("results.csv");

        let recorder = ResultRecorder::open(&path).unwrap();
        recorder.add(&row("safety helmet", "Polycarbonate, with foam")).unwrap();

        let reopened = ResultRecorder::open(&path).unwrap();
        reopened.add(&row("spacecraft component", "Aluminum")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "design,criterion,status,steps,answer\n\
             safety helmet,lightweight,done,2,\"Polycarbonate, with foam\"\n\
             spacecraft component,lightweight,done,2,Aluminum\n"
        );

        let rows = reopened.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].answer, "Polycarbonate, with foam", "quoted fields read back intact");
    }

    #[test]
    fn remove_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let recorder = ResultRecorder::open(&path).unwrap();
        assert!(path.exists());

        recorder.remove().unwrap();
        assert!(!path.exists());
    }
}
