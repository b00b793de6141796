//! Persistence contract consumed by the game core.
//!
//! Every method is a single atomic operation against the store. The core
//! never holds store data across calls except for validation.

pub mod memory;
pub mod snapshot;

use async_trait::async_trait;

use crate::types::*;

pub use memory::MemoryStore;
pub use snapshot::StoreExport;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint rejected the write; carries the constraint name
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(&'static str),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Unique constraint names reported in `StoreError::UniqueViolation`
pub const UQ_SESSION_CODE: &str = "uq_session_code";
pub const UQ_PLAYER_HANDLE: &str = "uq_player_handle";
pub const UQ_VOTE_KEY: &str = "uq_vote_session_prompt_voter";

/// Durable record of sessions, players, prompts and votes
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session in LOBBY with `creator_id` as its only member
    async fn create_session(&self, code: &str, creator_id: &str) -> StoreResult<Session>;

    async fn find_session_by_code(&self, code: &str) -> StoreResult<Option<Session>>;

    async fn find_session(&self, session_id: &str) -> StoreResult<Option<Session>>;

    async fn list_active_sessions(&self) -> StoreResult<Vec<Session>>;

    async fn add_player_to_session(
        &self,
        session_id: &str,
        player_id: &str,
    ) -> StoreResult<Session>;

    /// Patch only the fields present in `patch`
    async fn update_session_phase(
        &self,
        session_id: &str,
        patch: &PhasePatch,
    ) -> StoreResult<Session>;

    async fn create_player(&self, name: &str, handle: &str) -> StoreResult<Player>;

    async fn find_player(&self, player_id: &str) -> StoreResult<Option<Player>>;

    /// Players in the order of `ids`; unknown ids are skipped
    async fn find_players(&self, ids: &[PlayerId]) -> StoreResult<Vec<Player>>;

    async fn find_vote(
        &self,
        session_id: &str,
        prompt_id: &str,
        voter_id: &str,
    ) -> StoreResult<Option<Vote>>;

    /// Insert a vote; rejects a second vote for the same (session, prompt, voter)
    async fn create_vote(&self, vote: &NewVote) -> StoreResult<VoteDetail>;

    /// Prompt catalog, newest first
    async fn list_prompts(&self) -> StoreResult<Vec<Prompt>>;

    async fn list_session_votes(&self, session_id: &str) -> StoreResult<Vec<VoteDetail>>;

    async fn export(&self) -> StoreResult<StoreExport>;

    /// Replace all stored data with the export
    async fn import(&self, export: StoreExport) -> StoreResult<()>;
}
