//! Preparation log persisted as JSON Lines.
//!
//! Each session appends a `started` record when it opens and a `finished`
//! record when feedback is saved. Records are appended under an exclusive
//! file lock and folded back into [`PrepLog`] entries when read.

use crate::services::{EndLogRequest, PrepLogStore, StartLogRequest};
use crate::{Error, Feedback, LogId, PrepLog, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One line of the log file
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LogRecord {
    Started(PrepLog),
    Finished {
        log_id: LogId,
        end_time: DateTime<Utc>,
        duration_seconds: i64,
        completed_all_steps: bool,
        feedback: Feedback,
    },
}

/// JSONL-backed preparation log with file locking
pub struct JsonlLogStore {
    path: PathBuf,
}

impl JsonlLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn append(&self, record: &LogRecord) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        Ok(())
    }
}

impl PrepLogStore for JsonlLogStore {
    fn start_log(&mut self, request: &StartLogRequest) -> Result<LogId> {
        if request.recipe_id.trim().is_empty() {
            return Err(Error::Session("Missing required data to start log.".into()));
        }

        let entry = PrepLog {
            id: LogId::new(),
            user_id: request.user_id,
            user_name_snapshot: request.user_name.clone(),
            recipe_id: request.recipe_id.clone(),
            recipe_name_snapshot: request.recipe_name.clone(),
            start_time: request.start_time,
            end_time: None,
            duration_seconds: None,
            language_used: request.language.clone(),
            completed_all_steps: false,
            feedback: None,
        };
        let log_id = entry.id;
        self.append(&LogRecord::Started(entry))?;

        tracing::debug!("Started preparation log {}", log_id);
        Ok(log_id)
    }

    fn end_log(&mut self, request: &EndLogRequest) -> Result<()> {
        if request.duration_seconds < 0 {
            return Err(Error::Session("Missing required data to end log.".into()));
        }

        let known = read_logs(&self.path)?
            .iter()
            .any(|log| log.id == request.log_id);
        if !known {
            return Err(Error::LogNotFound(request.log_id.to_string()));
        }

        self.append(&LogRecord::Finished {
            log_id: request.log_id,
            end_time: request.end_time,
            duration_seconds: request.duration_seconds,
            completed_all_steps: request.completed_all_steps,
            feedback: request.feedback.clone(),
        })?;

        tracing::debug!("Finished preparation log {}", request.log_id);
        Ok(())
    }
}

/// Read every preparation log, newest start first
///
/// Unparseable lines and `finished` records without a matching `started`
/// record are skipped with a warning.
pub fn read_logs(path: &Path) -> Result<Vec<PrepLog>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut logs: Vec<PrepLog> = Vec::new();
    let mut positions: HashMap<LogId, usize> = HashMap::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<LogRecord>(&line) {
            Ok(LogRecord::Started(entry)) => {
                positions.insert(entry.id, logs.len());
                logs.push(entry);
            }
            Ok(LogRecord::Finished {
                log_id,
                end_time,
                duration_seconds,
                completed_all_steps,
                feedback,
            }) => match positions.get(&log_id) {
                Some(&pos) => {
                    let entry = &mut logs[pos];
                    entry.end_time = Some(end_time);
                    entry.duration_seconds = Some(duration_seconds);
                    entry.completed_all_steps = completed_all_steps;
                    entry.feedback = Some(feedback);
                }
                None => {
                    tracing::warn!(
                        "Finished record for unknown log {} at line {}",
                        log_id,
                        line_num + 1
                    );
                }
            },
            Err(e) => {
                tracing::warn!("Failed to parse log record at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;

    logs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    tracing::debug!("Read {} preparation logs", logs.len());
    Ok(logs)
}
