//! Store export/import for backup and restoration.
//!
//! The in-memory store loses everything on restart; an export taken from
//! the admin endpoint can be posted back to restore a running party.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Schema version for export format compatibility
/// Version 1: sessions, players, prompts, votes
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// A serializable dump of the whole store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreExport {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    pub sessions: HashMap<SessionId, Session>,
    pub players: HashMap<PlayerId, Player>,
    /// Prompt catalog in stored order
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub votes: Vec<Vote>,
}

impl StoreExport {
    /// Create a new export with current timestamp
    pub fn new(
        sessions: HashMap<SessionId, Session>,
        players: HashMap<PlayerId, Player>,
        prompts: Vec<Prompt>,
        votes: Vec<Vote>,
    ) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            sessions,
            players,
            prompts,
            votes,
        }
    }

    /// Validate the export before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        let prompt_ids: HashSet<&str> = self.prompts.iter().map(|p| p.id.as_str()).collect();
        let mut codes = HashSet::new();

        for (player_id, player) in &self.players {
            if player.id != *player_id {
                return Err(format!(
                    "Player stored under '{}' has id '{}'",
                    player_id, player.id
                ));
            }
        }

        for (session_id, session) in &self.sessions {
            if session.id != *session_id {
                return Err(format!(
                    "Session stored under '{}' has id '{}'",
                    session_id, session.id
                ));
            }
            if !codes.insert(session.code.as_str()) {
                return Err(format!("Duplicate session code '{}'", session.code));
            }
            for player_id in &session.player_ids {
                if !self.players.contains_key(player_id) {
                    return Err(format!(
                        "Session '{}' references player '{}' which doesn't exist",
                        session_id, player_id
                    ));
                }
            }
            match &session.current_prompt_id {
                Some(prompt_id) if !prompt_ids.contains(prompt_id.as_str()) => {
                    return Err(format!(
                        "Session '{}' references prompt '{}' which doesn't exist",
                        session_id, prompt_id
                    ));
                }
                None if session.phase != GamePhase::Lobby => {
                    return Err(format!(
                        "Session '{}' is in {} without a current prompt",
                        session_id, session.phase
                    ));
                }
                _ => {}
            }
        }

        let mut vote_keys = HashSet::new();
        for vote in &self.votes {
            if !self.sessions.contains_key(&vote.session_id) {
                return Err(format!(
                    "Vote '{}' references session '{}' which doesn't exist",
                    vote.id, vote.session_id
                ));
            }
            if !prompt_ids.contains(vote.prompt_id.as_str()) {
                return Err(format!(
                    "Vote '{}' references prompt '{}' which doesn't exist",
                    vote.id, vote.prompt_id
                ));
            }
            for player_id in [&vote.voter_id, &vote.target_id] {
                if !self.players.contains_key(player_id) {
                    return Err(format!(
                        "Vote '{}' references player '{}' which doesn't exist",
                        vote.id, player_id
                    ));
                }
            }
            if !vote_keys.insert((&vote.session_id, &vote.prompt_id, &vote.voter_id)) {
                return Err(format!(
                    "Vote '{}' duplicates an earlier vote by '{}'",
                    vote.id, vote.voter_id
                ));
            }
        }

        Ok(())
    }
}
