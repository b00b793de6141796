use crate::store::StoreError;
use crate::types::GamePhase;

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;

/// Errors surfaced by the game core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Validation(String),

    #[error("Already voted for this prompt")]
    DuplicateVote,

    #[error("Invalid phase transition from {from} to {to}: {reason}")]
    Conflict {
        from: GamePhase,
        to: GamePhase,
        reason: String,
    },

    /// Only surfaced when the re-read after a schema mismatch also fails
    #[error("Persisted schema does not support this update: {0}")]
    SchemaMismatch(String),

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),
}

impl GameError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(from: GamePhase, to: GamePhase, reason: impl Into<String>) -> Self {
        Self::Conflict {
            from,
            to,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, GameError::StoreUnavailable(_))
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => GameError::NotFound { entity, id },
            // Callers that expect a specific unique key map this themselves
            StoreError::UniqueViolation(key) => {
                GameError::Validation(format!("Duplicate value for {}", key))
            }
            StoreError::SchemaMismatch(msg) => GameError::SchemaMismatch(msg),
            StoreError::Unavailable(msg) => GameError::StoreUnavailable(msg),
        }
    }
}
