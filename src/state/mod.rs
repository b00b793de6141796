mod export;
mod phase;
mod prompt;
mod session;
mod vote;

pub use phase::{get_valid_transitions, is_valid_phase_transition};
pub use prompt::next_prompt;
pub use session::{generate_session_code, player_handle};
pub use vote::compute_results;

use crate::config::ServerConfig;
use crate::error::{GameError, GameResult};
use crate::store::{MemoryStore, SessionStore};
use crate::types::*;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub config: Arc<ServerConfig>,
    /// Serializes read-validate-write of phase transitions
    transition_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(store: Arc<dyn SessionStore>, config: ServerConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            transition_lock: Arc::new(Mutex::new(())),
        }
    }

    /// State backed by a fresh in-memory store with default config
    pub fn in_memory(prompts: Vec<Prompt>) -> Self {
        Self::new(Arc::new(MemoryStore::new(prompts)), ServerConfig::default())
    }

    /// Look up a session by its join code (case-insensitive)
    pub async fn find_session(&self, code: &str) -> GameResult<Session> {
        let code = normalize_code(code);
        self.store
            .find_session_by_code(&code)
            .await?
            .ok_or_else(|| GameError::not_found("Game session", code))
    }

    /// Read the full snapshot for a session code
    pub async fn read_session(&self, code: &str) -> GameResult<SessionSnapshot> {
        let session = self.find_session(code).await?;
        let snapshot = self.snapshot(session).await?;
        tracing::debug!(
            "Read session {} at version {} ({})",
            snapshot.code,
            snapshot.version,
            snapshot.phase
        );
        Ok(snapshot)
    }

    pub async fn list_active_sessions(&self) -> GameResult<Vec<SessionSnapshot>> {
        let sessions = self.store.list_active_sessions().await?;
        let mut snapshots = Vec::with_capacity(sessions.len());
        for session in sessions {
            snapshots.push(self.snapshot(session).await?);
        }
        Ok(snapshots)
    }

    /// Attach roster, votes and the current prompt to a session record
    pub async fn snapshot(&self, session: Session) -> GameResult<SessionSnapshot> {
        let players = self.store.find_players(&session.player_ids).await?;
        let votes = self.store.list_session_votes(&session.id).await?;
        let current_prompt = match &session.current_prompt_id {
            Some(prompt_id) => self.find_prompt(prompt_id).await?,
            None => None,
        };

        Ok(SessionSnapshot {
            valid_transitions: get_valid_transitions(&session.phase),
            id: session.id,
            code: session.code,
            phase: session.phase,
            current_prompt_id: session.current_prompt_id,
            current_prompt,
            is_active: session.is_active,
            created_at: session.created_at,
            version: session.version,
            players,
            votes,
        })
    }
}

/// Join codes are entered by hand; compare them trimmed and uppercased
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
