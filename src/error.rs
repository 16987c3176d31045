use crate::session::SessionPhase;

/// Errors surfaced by the game engine. Rejected commands leave session
/// state untouched; none of these are fatal to the process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GameError {
    #[error("level {0} not found")]
    LevelNotFound(u32),

    #[error("level {level_id} is invalid: {reason}")]
    InvalidLevel { level_id: u32, reason: String },

    #[error("{command} is not valid while {phase}")]
    InvalidTransition {
        phase: SessionPhase,
        command: &'static str,
    },

    #[error("session has already ended")]
    AlreadyEnded,

    #[error("invalid session result: {0}")]
    InvalidResult(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Opaque failures from the persistence collaborator. Stringified at the
/// boundary so the engine error type stays cheap to clone and pass around.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<csv::Error> for StoreError {
    fn from(err: csv::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
