use crate::app_dirs::AppDirs;
use crate::error::StoreError;
use crate::identity::UserId;
use crate::reconcile::CompletedSession;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Flat CSV row. The JSON wire record skips absent fields, which CSV
/// cannot represent, so the log keeps every column and leaves guest ids
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow {
    session_id: Uuid,
    user_id: Option<UserId>,
    level_id: u32,
    score: i64,
    accuracy: f64,
    wpm: f64,
    max_combo: u32,
    hits_count: u32,
    misses_count: u32,
    duration_seconds: u32,
    is_completed: bool,
}

impl From<&CompletedSession> for HistoryRow {
    fn from(s: &CompletedSession) -> Self {
        Self {
            session_id: s.session_id,
            user_id: s.user_id,
            level_id: s.level_id,
            score: s.final_score,
            accuracy: s.accuracy_percent,
            wpm: s.wpm,
            max_combo: s.max_combo,
            hits_count: s.hits_count,
            misses_count: s.misses_count,
            duration_seconds: s.duration_seconds,
            is_completed: s.is_completed,
        }
    }
}

impl From<HistoryRow> for CompletedSession {
    fn from(r: HistoryRow) -> Self {
        Self {
            session_id: r.session_id,
            user_id: r.user_id,
            level_id: r.level_id,
            final_score: r.score,
            accuracy_percent: r.accuracy,
            wpm: r.wpm,
            max_combo: r.max_combo,
            hits_count: r.hits_count,
            misses_count: r.misses_count,
            duration_seconds: r.duration_seconds,
            is_completed: r.is_completed,
        }
    }
}

/// Append-only CSV log of finished sessions, kept next to the database so
/// results survive even when the SQLite store is disabled or broken.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::history_path().unwrap_or_else(|| PathBuf::from("keywhack_log.csv"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn append(&self, session: &CompletedSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Emit the header only once, when the log is first created.
        let needs_header = !self.path.exists();

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(HistoryRow::from(session))?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<CompletedSession>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new().from_path(&self.path)?;
        let mut sessions = Vec::new();
        for row in reader.deserialize::<HistoryRow>() {
            sessions.push(row?.into());
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(score: i64) -> CompletedSession {
        CompletedSession {
            session_id: Uuid::new_v4(),
            user_id: Some(UserId::new()),
            level_id: 1,
            final_score: score,
            accuracy_percent: 88.0,
            wpm: 30.0,
            max_combo: 4,
            hits_count: 22,
            misses_count: 3,
            duration_seconds: 45,
            is_completed: true,
        }
    }

    #[test]
    fn append_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::with_path(dir.path().join("log.csv"));

        let first = session(100);
        let mut second = session(250);
        second.user_id = None; // guest rows keep the column, empty
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let loaded = log.load().unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn missing_log_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::with_path(dir.path().join("absent.csv"));
        assert!(log.load().unwrap().is_empty());
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let log = HistoryLog::with_path(&path);
        log.append(&session(1)).unwrap();
        log.append(&session(2)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let headers = contents
            .lines()
            .filter(|line| line.starts_with("sessionId"))
            .count();
        assert_eq!(headers, 1);
    }
}
