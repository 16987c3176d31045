use crate::app_dirs::AppDirs;
use crate::error::StoreError;
use crate::identity::UserId;
use crate::reconcile::CompletedSession;
use crate::stats::{LeaderboardEntry, LeaderboardPage, UserStatistics};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A session that was started but has not been reconciled yet. Enough to
/// offer the player a resume after an interruption.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    pub session_id: Uuid,
    pub user_id: Option<UserId>,
    pub level_id: u32,
    pub started_at: DateTime<Utc>,
}

/// Persistence collaborator for game sessions. Implementations must accept
/// concurrent `save` calls from independent sessions.
pub trait SessionStore {
    /// Records that a session began. Best-effort bookkeeping for
    /// `find_active`; losing it never blocks play.
    fn record_start(
        &self,
        session_id: Uuid,
        user: Option<UserId>,
        level_id: u32,
    ) -> Result<(), StoreError>;

    /// Persists the terminal record. Writing a session that is already
    /// completed is a conflict: completed rows are immutable.
    fn save(&self, completed: &CompletedSession) -> Result<(), StoreError>;

    /// Most recent unfinished session for the given user (or for the local
    /// guest when `None`).
    fn find_active(&self, user: Option<UserId>) -> Result<Option<ActiveSession>, StoreError>;

    /// Completed sessions, newest first. Pages start at 1.
    fn history(
        &self,
        user: Option<UserId>,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<CompletedSession>, StoreError>;
}

/// SQLite-backed store, one connection per instance so independent
/// sessions can hold independent stores.
#[derive(Debug)]
pub struct SessionDb {
    conn: Connection,
}

impl SessionDb {
    /// Opens (or creates) the database at the default state path.
    pub fn new() -> Result<Self, StoreError> {
        let db_path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("keywhack_sessions.db"));
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(&db_path)
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open(path.as_ref())
    }

    fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS game_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE,
                user_id TEXT,
                level_id INTEGER NOT NULL,
                score INTEGER NOT NULL DEFAULT 0,
                accuracy REAL NOT NULL DEFAULT 0,
                wpm REAL NOT NULL DEFAULT 0,
                max_combo INTEGER NOT NULL DEFAULT 0,
                hits_count INTEGER NOT NULL DEFAULT 0,
                misses_count INTEGER NOT NULL DEFAULT 0,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                is_completed BOOLEAN NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_game_sessions_user ON game_sessions(user_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_game_sessions_level ON game_sessions(level_id)",
            [],
        )?;
        Ok(SessionDb { conn })
    }

    /// Best score per user on one level, ranked.
    pub fn level_leaderboard(
        &self,
        level_id: u32,
        page: usize,
        page_size: usize,
    ) -> Result<LeaderboardPage, StoreError> {
        self.leaderboard(Some(level_id), page, page_size)
    }

    /// Best score per user across all levels, ranked.
    pub fn global_leaderboard(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<LeaderboardPage, StoreError> {
        self.leaderboard(None, page, page_size)
    }

    fn leaderboard(
        &self,
        level_id: Option<u32>,
        page: usize,
        page_size: usize,
    ) -> Result<LeaderboardPage, StoreError> {
        let page = page.max(1);
        let offset = (page - 1) * page_size;

        let total: usize = self.conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM game_sessions
             WHERE is_completed = 1 AND user_id IS NOT NULL
               AND (?1 IS NULL OR level_id = ?1)",
            params![level_id],
            |row| row.get::<_, i64>(0).map(|n| n as usize),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT user_id, MAX(score) AS best, accuracy, wpm, max_combo
             FROM game_sessions
             WHERE is_completed = 1 AND user_id IS NOT NULL
               AND (?1 IS NULL OR level_id = ?1)
             GROUP BY user_id
             ORDER BY best DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![level_id, page_size as i64, offset as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for (idx, row) in rows.enumerate() {
            let (user, score, accuracy, wpm, max_combo) = row?;
            entries.push(LeaderboardEntry {
                rank: offset + idx + 1,
                user_id: parse_user(&user)?,
                score,
                accuracy,
                wpm,
                max_combo: max_combo as u32,
            });
        }

        Ok(LeaderboardPage {
            page,
            page_size,
            total,
            entries,
        })
    }

    /// Aggregate statistics over a user's completed sessions.
    pub fn user_statistics(&self, user: UserId) -> Result<UserStatistics, StoreError> {
        self.conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(MAX(score), 0),
                        COALESCE(AVG(accuracy), 0),
                        COALESCE(AVG(wpm), 0),
                        COALESCE(MAX(max_combo), 0),
                        COALESCE(SUM(hits_count), 0),
                        COALESCE(SUM(misses_count), 0)
                 FROM game_sessions
                 WHERE is_completed = 1 AND user_id = ?1",
                params![user.to_string()],
                |row| {
                    Ok(UserStatistics {
                        games_played: row.get::<_, i64>(0)? as u64,
                        best_score: row.get(1)?,
                        avg_accuracy: row.get(2)?,
                        avg_wpm: row.get(3)?,
                        best_combo: row.get::<_, i64>(4)? as u32,
                        total_hits: row.get::<_, i64>(5)? as u64,
                        total_misses: row.get::<_, i64>(6)? as u64,
                    })
                },
            )
            .map_err(StoreError::from)
    }

    fn completed_from_row(row: &Row<'_>) -> rusqlite::Result<(String, Option<String>, CompletedSession)> {
        let session_id: String = row.get(0)?;
        let user_id: Option<String> = row.get(1)?;
        let record = CompletedSession {
            session_id: Uuid::nil(), // patched by the caller after parsing
            user_id: None,
            level_id: row.get::<_, i64>(2)? as u32,
            final_score: row.get(3)?,
            accuracy_percent: row.get(4)?,
            wpm: row.get(5)?,
            max_combo: row.get::<_, i64>(6)? as u32,
            hits_count: row.get::<_, i64>(7)? as u32,
            misses_count: row.get::<_, i64>(8)? as u32,
            duration_seconds: row.get::<_, i64>(9)? as u32,
            is_completed: row.get(10)?,
        };
        Ok((session_id, user_id, record))
    }
}

fn parse_user(raw: &str) -> Result<UserId, StoreError> {
    UserId::parse(raw).ok_or_else(|| StoreError::Database(format!("corrupt user id: {raw}")))
}

fn parse_session_id(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|_| StoreError::Database(format!("corrupt session id: {raw}")))
}

impl SessionStore for SessionDb {
    fn record_start(
        &self,
        session_id: Uuid,
        user: Option<UserId>,
        level_id: u32,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO game_sessions (session_id, user_id, level_id, is_completed, started_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![
                session_id.to_string(),
                user.map(|u| u.to_string()),
                level_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn save(&self, completed: &CompletedSession) -> Result<(), StoreError> {
        let already_completed: Option<bool> = self
            .conn
            .query_row(
                "SELECT is_completed FROM game_sessions WHERE session_id = ?1",
                params![completed.session_id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::from(other)),
            })?;

        if already_completed == Some(true) {
            return Err(StoreError::Conflict(format!(
                "session {} is already completed",
                completed.session_id
            )));
        }

        let now = Utc::now().to_rfc3339();
        if already_completed.is_some() {
            self.conn.execute(
                "UPDATE game_sessions
                 SET score = ?2, accuracy = ?3, wpm = ?4, max_combo = ?5,
                     hits_count = ?6, misses_count = ?7, duration_seconds = ?8,
                     is_completed = ?9, completed_at = ?10
                 WHERE session_id = ?1",
                params![
                    completed.session_id.to_string(),
                    completed.final_score,
                    completed.accuracy_percent,
                    completed.wpm,
                    completed.max_combo,
                    completed.hits_count,
                    completed.misses_count,
                    completed.duration_seconds,
                    completed.is_completed,
                    now,
                ],
            )?;
        } else {
            self.conn.execute(
                "INSERT INTO game_sessions
                 (session_id, user_id, level_id, score, accuracy, wpm, max_combo,
                  hits_count, misses_count, duration_seconds, is_completed, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
                params![
                    completed.session_id.to_string(),
                    completed.user_id.map(|u| u.to_string()),
                    completed.level_id,
                    completed.final_score,
                    completed.accuracy_percent,
                    completed.wpm,
                    completed.max_combo,
                    completed.hits_count,
                    completed.misses_count,
                    completed.duration_seconds,
                    completed.is_completed,
                    now,
                ],
            )?;
        }
        Ok(())
    }

    fn find_active(&self, user: Option<UserId>) -> Result<Option<ActiveSession>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, user_id, level_id, started_at
             FROM game_sessions
             WHERE is_completed = 0 AND user_id IS ?1
             ORDER BY started_at DESC
             LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![user.map(|u| u.to_string())], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        match rows.next() {
            None => Ok(None),
            Some(row) => {
                let (session_id, user_id, level_id, started_at) = row?;
                let started_at = DateTime::parse_from_rfc3339(&started_at)
                    .map_err(|_| StoreError::Database("corrupt started_at timestamp".into()))?
                    .with_timezone(&Utc);
                Ok(Some(ActiveSession {
                    session_id: parse_session_id(&session_id)?,
                    user_id: match user_id {
                        Some(raw) => Some(parse_user(&raw)?),
                        None => None,
                    },
                    level_id: level_id as u32,
                    started_at,
                }))
            }
        }
    }

    fn history(
        &self,
        user: Option<UserId>,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<CompletedSession>, StoreError> {
        let page = page.max(1);
        let offset = (page - 1) * page_size;
        let mut stmt = self.conn.prepare(
            "SELECT session_id, user_id, level_id, score, accuracy, wpm, max_combo,
                    hits_count, misses_count, duration_seconds, is_completed
             FROM game_sessions
             WHERE is_completed = 1 AND user_id IS ?1
             ORDER BY completed_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            params![
                user.map(|u| u.to_string()),
                page_size as i64,
                offset as i64
            ],
            Self::completed_from_row,
        )?;

        let mut sessions = Vec::new();
        for row in rows {
            let (session_id, user_id, mut record) = row?;
            record.session_id = parse_session_id(&session_id)?;
            record.user_id = match user_id {
                Some(raw) => Some(parse_user(&raw)?),
                None => None,
            };
            sessions.push(record);
        }
        Ok(sessions)
    }
}
