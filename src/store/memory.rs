use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{
    SessionStore, StoreError, StoreExport, StoreResult, UQ_PLAYER_HANDLE, UQ_SESSION_CODE,
    UQ_VOTE_KEY,
};
use crate::types::*;

/// In-process session store.
///
/// Uniqueness of session codes, player handles and vote keys is enforced
/// under the write lock of the owning table, so concurrent inserts race
/// on the constraint rather than on application checks. Locks are always
/// taken in the order sessions, players, prompts, votes.
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    players: RwLock<HashMap<PlayerId, Player>>,
    prompts: RwLock<Vec<Prompt>>,
    votes: RwLock<Vec<Vote>>,
    /// Older schema without phase columns: phase patches are rejected
    legacy_schema: bool,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new(prompts: Vec<Prompt>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            players: RwLock::new(HashMap::new()),
            prompts: RwLock::new(prompts),
            votes: RwLock::new(Vec::new()),
            legacy_schema: false,
            available: AtomicBool::new(true),
        }
    }

    /// A store whose persisted schema predates the phase/prompt columns
    pub fn with_legacy_schema(prompts: Vec<Prompt>) -> Self {
        Self {
            legacy_schema: true,
            ..Self::new(prompts)
        }
    }

    /// Simulate the backing database going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn attach(
    vote: &Vote,
    players: &HashMap<PlayerId, Player>,
    prompts: &[Prompt],
) -> StoreResult<VoteDetail> {
    let voter = players
        .get(&vote.voter_id)
        .cloned()
        .ok_or_else(|| StoreError::not_found("Player", &vote.voter_id))?;
    let target = players
        .get(&vote.target_id)
        .cloned()
        .ok_or_else(|| StoreError::not_found("Player", &vote.target_id))?;
    let prompt = prompts
        .iter()
        .find(|p| p.id == vote.prompt_id)
        .cloned()
        .ok_or_else(|| StoreError::not_found("Prompt", &vote.prompt_id))?;
    Ok(VoteDetail {
        vote: vote.clone(),
        voter,
        target,
        prompt,
    })
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, code: &str, creator_id: &str) -> StoreResult<Session> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        if sessions.values().any(|s| s.code == code) {
            return Err(StoreError::UniqueViolation(UQ_SESSION_CODE));
        }
        if !self.players.read().await.contains_key(creator_id) {
            return Err(StoreError::not_found("Player", creator_id));
        }

        let session = Session {
            id: ulid::Ulid::new().to_string(),
            code: code.to_string(),
            phase: GamePhase::Lobby,
            current_prompt_id: None,
            is_active: true,
            created_at: now(),
            version: 1,
            player_ids: vec![creator_id.to_string()],
        };
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn find_session_by_code(&self, code: &str) -> StoreResult<Option<Session>> {
        self.check_available()?;
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.code == code)
            .cloned())
    }

    async fn find_session(&self, session_id: &str) -> StoreResult<Option<Session>> {
        self.check_available()?;
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn list_active_sessions(&self) -> StoreResult<Vec<Session>> {
        self.check_available()?;
        let mut active: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn add_player_to_session(
        &self,
        session_id: &str,
        player_id: &str,
    ) -> StoreResult<Session> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        if !self.players.read().await.contains_key(player_id) {
            return Err(StoreError::not_found("Player", player_id));
        }
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::not_found("Session", session_id))?;

        if !session.has_member(player_id) {
            session.player_ids.push(player_id.to_string());
            session.version += 1;
        }
        Ok(session.clone())
    }

    async fn update_session_phase(
        &self,
        session_id: &str,
        patch: &PhasePatch,
    ) -> StoreResult<Session> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::not_found("Session", session_id))?;

        if patch.is_empty() {
            return Ok(session.clone());
        }
        if self.legacy_schema {
            return Err(StoreError::SchemaMismatch(
                "columns phase/currentPromptId do not exist".to_string(),
            ));
        }

        if let Some(phase) = patch.phase {
            session.phase = phase;
        }
        if let Some(prompt_id) = &patch.current_prompt_id {
            session.current_prompt_id = prompt_id.clone();
        }
        session.version += 1;
        Ok(session.clone())
    }

    async fn create_player(&self, name: &str, handle: &str) -> StoreResult<Player> {
        self.check_available()?;
        let mut players = self.players.write().await;
        if players.values().any(|p| p.handle == handle) {
            return Err(StoreError::UniqueViolation(UQ_PLAYER_HANDLE));
        }

        let player = Player {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            handle: handle.to_string(),
            created_at: now(),
        };
        players.insert(player.id.clone(), player.clone());
        Ok(player)
    }

    async fn find_player(&self, player_id: &str) -> StoreResult<Option<Player>> {
        self.check_available()?;
        Ok(self.players.read().await.get(player_id).cloned())
    }

    async fn find_players(&self, ids: &[PlayerId]) -> StoreResult<Vec<Player>> {
        self.check_available()?;
        let players = self.players.read().await;
        Ok(ids.iter().filter_map(|id| players.get(id).cloned()).collect())
    }

    async fn find_vote(
        &self,
        session_id: &str,
        prompt_id: &str,
        voter_id: &str,
    ) -> StoreResult<Option<Vote>> {
        self.check_available()?;
        Ok(self
            .votes
            .read()
            .await
            .iter()
            .find(|v| {
                v.session_id == session_id && v.prompt_id == prompt_id && v.voter_id == voter_id
            })
            .cloned())
    }

    async fn create_vote(&self, new_vote: &NewVote) -> StoreResult<VoteDetail> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        let players = self.players.read().await;
        let prompts = self.prompts.read().await;
        let mut votes = self.votes.write().await;

        let session = sessions
            .get_mut(&new_vote.session_id)
            .ok_or_else(|| StoreError::not_found("Session", &new_vote.session_id))?;

        if votes.iter().any(|v| {
            v.session_id == new_vote.session_id
                && v.prompt_id == new_vote.prompt_id
                && v.voter_id == new_vote.voter_id
        }) {
            return Err(StoreError::UniqueViolation(UQ_VOTE_KEY));
        }

        let vote = Vote {
            id: ulid::Ulid::new().to_string(),
            session_id: new_vote.session_id.clone(),
            prompt_id: new_vote.prompt_id.clone(),
            voter_id: new_vote.voter_id.clone(),
            target_id: new_vote.target_id.clone(),
            created_at: now(),
        };
        // Foreign keys are checked before anything is written
        let detail = attach(&vote, &players, &prompts)?;

        votes.push(vote);
        session.version += 1;
        Ok(detail)
    }

    async fn list_prompts(&self) -> StoreResult<Vec<Prompt>> {
        self.check_available()?;
        let mut prompts = self.prompts.read().await.clone();
        // Stable: prompts created in the same instant keep catalog order
        prompts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(prompts)
    }

    async fn list_session_votes(&self, session_id: &str) -> StoreResult<Vec<VoteDetail>> {
        self.check_available()?;
        let players = self.players.read().await;
        let prompts = self.prompts.read().await;
        let votes = self.votes.read().await;

        votes
            .iter()
            .filter(|v| v.session_id == session_id)
            .map(|v| attach(v, &players, &prompts))
            .collect()
    }

    async fn export(&self) -> StoreResult<StoreExport> {
        self.check_available()?;
        let sessions = self.sessions.read().await;
        let players = self.players.read().await;
        let prompts = self.prompts.read().await;
        let votes = self.votes.read().await;

        Ok(StoreExport::new(
            sessions.clone(),
            players.clone(),
            prompts.clone(),
            votes.clone(),
        ))
    }

    async fn import(&self, export: StoreExport) -> StoreResult<()> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        let mut players = self.players.write().await;
        let mut prompts = self.prompts.write().await;
        let mut votes = self.votes.write().await;

        // Versions only move forward, so pollers holding a pre-import
        // version see the restored state as newer
        let mut imported = export.sessions;
        for (id, session) in imported.iter_mut() {
            let previous = sessions.get(id).map_or(0, |s| s.version);
            session.version = session.version.max(previous) + 1;
        }

        *sessions = imported;
        *players = export.players;
        *prompts = export.prompts;
        *votes = export.votes;
        Ok(())
    }
}
