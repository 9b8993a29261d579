//! Admin-facing views over the preparation log.
//!
//! Formatting for the log table, CSV export, and per-user preparation
//! summaries.

use crate::{PrepLog, Result};
use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;

/// `"Mm Ss"` for finished logs, `"In Progress"` for open ones, `"N/A"` otherwise
pub fn format_duration(log: &PrepLog) -> String {
    match (log.duration_seconds, log.is_finished()) {
        (Some(seconds), _) => format_seconds(seconds),
        (None, false) => "In Progress".into(),
        (None, true) => "N/A".into(),
    }
}

pub fn format_seconds(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}m {}s", seconds / 60, seconds % 60)
}

/// Wasted column: `Yes`, `No` once finished, `N/A` while in progress
pub fn wasted_label(log: &PrepLog) -> &'static str {
    match (&log.feedback, log.is_finished()) {
        (Some(feedback), _) if feedback.is_wasted => "Yes",
        (_, true) => "No",
        (_, false) => "N/A",
    }
}

/// A row in the CSV export
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    user_id: String,
    user_name: String,
    recipe_id: String,
    recipe_name: String,
    language: String,
    start_time: String,
    end_time: Option<String>,
    duration_seconds: Option<i64>,
    completed_all_steps: bool,
    is_wasted: Option<bool>,
    photo_url: Option<String>,
    product_weight: Option<String>,
    num_preps: Option<u32>,
}

impl From<&PrepLog> for CsvRow {
    fn from(log: &PrepLog) -> Self {
        let feedback = log.feedback.as_ref();
        CsvRow {
            id: log.id.to_string(),
            user_id: log.user_id.to_string(),
            user_name: log.user_name_snapshot.clone(),
            recipe_id: log.recipe_id.clone(),
            recipe_name: log.recipe_name_snapshot.clone(),
            language: log.language_used.clone(),
            start_time: log.start_time.to_rfc3339(),
            end_time: log.end_time.map(|t| t.to_rfc3339()),
            duration_seconds: log.duration_seconds,
            completed_all_steps: log.completed_all_steps,
            is_wasted: feedback.map(|f| f.is_wasted),
            photo_url: feedback.and_then(|f| f.photo_url.clone()),
            product_weight: feedback.and_then(|f| f.product_weight.clone()),
            num_preps: feedback.and_then(|f| f.num_preps),
        }
    }
}

/// Write all logs to a fresh CSV file and return how many rows were written
///
/// The file is synced to disk before returning.
pub fn export_csv(logs: &[PrepLog], csv_path: &Path) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(csv_path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(file);

    for log in logs {
        writer.serialize(CsvRow::from(log))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} preparation logs to {:?}", logs.len(), csv_path);
    Ok(logs.len())
}

/// How often a cook has finished a recipe and how long it usually takes
#[derive(Debug, Clone, PartialEq)]
pub struct PreparationSummary {
    pub user_name: String,
    pub recipe_name: String,
    pub times_prepared: usize,
    pub average_duration_seconds: Option<i64>,
}

impl fmt::Display for PreparationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.times_prepared, self.average_duration_seconds) {
            (0, _) => write!(
                f,
                "{} has not finished {} yet.",
                self.user_name, self.recipe_name
            ),
            (n, Some(avg)) => write!(
                f,
                "{} has prepared {} {} {}, taking {} on average.",
                self.user_name,
                self.recipe_name,
                n,
                if n == 1 { "time" } else { "times" },
                format_seconds(avg)
            ),
            (n, None) => write!(
                f,
                "{} has prepared {} {} {}.",
                self.user_name,
                self.recipe_name,
                n,
                if n == 1 { "time" } else { "times" }
            ),
        }
    }
}

/// Summarize finished preparations of `recipe_id` by the cook named `user_name`
///
/// Names are matched case-insensitively against the snapshot taken at start.
pub fn summarize_preparations(
    logs: &[PrepLog],
    user_name: &str,
    recipe_id: &str,
) -> PreparationSummary {
    let wanted = user_name.trim().to_lowercase();
    let finished: Vec<&PrepLog> = logs
        .iter()
        .filter(|log| log.recipe_id == recipe_id)
        .filter(|log| log.user_name_snapshot.trim().to_lowercase() == wanted)
        .filter(|log| log.is_finished())
        .collect();

    let durations: Vec<i64> = finished
        .iter()
        .filter_map(|log| log.duration_seconds)
        .collect();
    let average_duration_seconds = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<i64>() / durations.len() as i64)
    };

    let recipe_name = logs
        .iter()
        .find(|log| log.recipe_id == recipe_id)
        .map(|log| log.recipe_name_snapshot.clone())
        .unwrap_or_else(|| recipe_id.to_string());

    PreparationSummary {
        user_name: user_name.trim().to_string(),
        recipe_name,
        times_prepared: finished.len(),
        average_duration_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Feedback, LogId};
    use chrono::Utc;
    use uuid::Uuid;

    fn log(user: &str, recipe: &str, duration: Option<i64>, finished: bool) -> PrepLog {
        PrepLog {
            id: LogId::new(),
            user_id: Uuid::new_v4(),
            user_name_snapshot: user.into(),
            recipe_id: recipe.into(),
            recipe_name_snapshot: "Masala Chai".into(),
            start_time: Utc::now(),
            end_time: finished.then(Utc::now),
            duration_seconds: duration,
            language_used: "en".into(),
            completed_all_steps: finished,
            feedback: finished.then(Feedback::default),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(&log("a", "chai", Some(754), true)), "12m 34s");
        assert_eq!(format_duration(&log("a", "chai", None, false)), "In Progress");
        assert_eq!(format_duration(&log("a", "chai", None, true)), "N/A");
    }

    #[test]
    fn test_wasted_label() {
        let mut wasted = log("a", "chai", Some(60), true);
        wasted.feedback = Some(Feedback {
            is_wasted: true,
            ..Feedback::default()
        });
        assert_eq!(wasted_label(&wasted), "Yes");
        assert_eq!(wasted_label(&log("a", "chai", Some(60), true)), "No");
        assert_eq!(wasted_label(&log("a", "chai", None, false)), "N/A");
    }

    #[test]
    fn test_export_csv_writes_rows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("export").join("logs.csv");
        let logs = vec![
            log("a", "chai", Some(60), true),
            log("b", "chai", None, false),
        ];

        assert_eq!(export_csv(&logs, &csv_path).unwrap(), 2);

        let reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.into_records().count(), 2);
    }

    #[test]
    fn test_export_overwrites_previous_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("logs.csv");
        export_csv(&[log("a", "chai", Some(60), true)], &csv_path).unwrap();
        export_csv(&[], &csv_path).unwrap();

        let reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.into_records().count(), 0);
    }

    #[test]
    fn test_summary_counts_finished_sessions_only() {
        let logs = vec![
            log("Asha", "chai", Some(300), true),
            log("asha ", "chai", Some(500), true),
            log("Asha", "chai", None, false),
            log("Ravi", "chai", Some(100), true),
            log("Asha", "dal", Some(900), true),
        ];

        let summary = summarize_preparations(&logs, "Asha", "chai");
        assert_eq!(summary.times_prepared, 2);
        assert_eq!(summary.average_duration_seconds, Some(400));
        assert_eq!(
            summary.to_string(),
            "Asha has prepared Masala Chai 2 times, taking 6m 40s on average."
        );
    }

    #[test]
    fn test_summary_without_history() {
        let summary = summarize_preparations(&[], "Asha", "chai");
        assert_eq!(summary.times_prepared, 0);
        assert_eq!(summary.to_string(), "Asha has not finished chai yet.");
    }
}
