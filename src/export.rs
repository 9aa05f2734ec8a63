use crate::error::Result;
use crate::session::{KeyRecord, Mode};
use crate::telemetry::TelemetryEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedPair {
    pub typed: String,
    pub expected: String,
}

/// Portable end-of-session record, the shape the analysis scripts read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub mode: Mode,
    pub timestamp: String,
    /// Active typing seconds.
    pub duration: f64,
    pub wpm: u32,
    pub accuracy: f64,
    pub total_characters_typed: usize,
    pub correct_characters: usize,
    pub errors: usize,
    pub sentences_completed: usize,
    pub total_sentences: usize,
    pub completed: bool,
    pub sentences_typed: Vec<TypedPair>,
    pub key_log: Vec<KeyRecord>,
}

/// `2024-03-09T07:05:01.000Z` -> `2024-03-09-07-05-01`
pub fn file_stamp(now: DateTime<Utc>) -> String {
    let iso = crate::clock::iso_millis(now);
    iso.chars()
        .take(19)
        .map(|c| if c == ':' || c == 'T' { '-' } else { c })
        .collect()
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, file_name: String, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_vec_pretty(value)?)?;
    Ok(path)
}

/// Writes the log as-is. `None` when there is nothing to write.
pub fn export_events(events: &[TelemetryEvent], dir: &Path, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
    if events.is_empty() {
        return Ok(None);
    }
    let name = format!("typing-events-{}.json", file_stamp(now));
    write_json(dir, name, events).map(Some)
}

pub fn export_summary(summary: &SessionSummary, dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    let name = format!("typing-session-{}-{}.json", summary.mode, file_stamp(now));
    write_json(dir, name, summary)
}

#[derive(Debug, Serialize)]
struct KeyRow<'a> {
    timestamp: f64,
    wall_ms: i64,
    key: &'a str,
    sentence_index: usize,
    value_after: &'a str,
}

pub fn export_key_log_csv(summary: &SessionSummary, dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("typing-keylog-{}-{}.csv", summary.mode, file_stamp(now)));
    let mut writer = csv::Writer::from_path(&path)?;
    for record in &summary.key_log {
        writer.serialize(KeyRow {
            timestamp: record.timestamp,
            wall_ms: record.wall_ms,
            key: &record.key,
            sentence_index: record.sentence_index,
            value_after: &record.value_after,
        })?;
    }
    writer.flush()?;
    Ok(path)
}

pub fn parse_events(text: &str) -> Result<Vec<TelemetryEvent>> {
    Ok(serde_json::from_str(text)?)
}

pub fn parse_summary(text: &str) -> Result<SessionSummary> {
    Ok(serde_json::from_str(text)?)
}
