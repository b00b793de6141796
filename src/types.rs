use serde::{Deserialize, Deserializer, Serialize};

/// Opaque ID types for type safety
pub type SessionId = String;
pub type PlayerId = String;
pub type PromptId = String;
pub type VoteId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    Lobby,
    Question,
    Voting,
    Results,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Lobby => "LOBBY",
            GamePhase::Question => "QUESTION",
            GamePhase::Voting => "VOTING",
            GamePhase::Results => "RESULTS",
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted game session. Membership order is join order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub code: String,
    pub phase: GamePhase,
    pub current_prompt_id: Option<PromptId>,
    pub is_active: bool,
    pub created_at: String,
    /// Bumped on every mutation (join, phase patch, vote)
    pub version: u64,
    pub player_ids: Vec<PlayerId>,
}

impl Session {
    pub fn has_member(&self, player_id: &str) -> bool {
        self.player_ids.iter().any(|id| id == player_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Synthesized unique contact handle, not a real address
    pub handle: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: PromptId,
    pub text: String,
    pub category: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteId,
    pub session_id: SessionId,
    pub prompt_id: PromptId,
    pub voter_id: PlayerId,
    pub target_id: PlayerId,
    pub created_at: String,
}

/// A vote with its voter, target and prompt attached for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteDetail {
    #[serde(flatten)]
    pub vote: Vote,
    pub voter: Player,
    pub target: Player,
    pub prompt: Prompt,
}

/// Input for recording a vote
#[derive(Debug, Clone, PartialEq)]
pub struct NewVote {
    pub session_id: SessionId,
    pub prompt_id: PromptId,
    pub voter_id: PlayerId,
    pub target_id: PlayerId,
}

/// Partial phase/prompt update. Absent fields are left untouched.
///
/// `current_prompt_id` distinguishes "absent" (`None`) from an explicit
/// `null` (`Some(None)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhasePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<GamePhase>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_prompt_id: Option<Option<PromptId>>,
}

impl PhasePatch {
    pub fn phase(phase: GamePhase) -> Self {
        Self {
            phase: Some(phase),
            current_prompt_id: None,
        }
    }

    pub fn with_prompt(mut self, prompt_id: impl Into<PromptId>) -> Self {
        self.current_prompt_id = Some(Some(prompt_id.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.phase.is_none() && self.current_prompt_id.is_none()
    }
}

/// Maps a present JSON field (including `null`) to `Some`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Server-computed transitions, one per row of the phase table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameAction {
    StartGame,
    StartVoting,
    /// Leave VOTING for RESULTS, after a vote or without one
    #[serde(alias = "skip")]
    ShowResults,
    NextQuestion,
    ReshowQuestion,
}

/// Full session state as seen by clients on every poll and mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub code: String,
    pub phase: GamePhase,
    pub current_prompt_id: Option<PromptId>,
    pub current_prompt: Option<Prompt>,
    pub is_active: bool,
    pub created_at: String,
    pub version: u64,
    pub players: Vec<Player>,
    pub votes: Vec<VoteDetail>,
    pub valid_transitions: Vec<GamePhase>,
}

impl SessionSnapshot {
    /// Votes cast for the current prompt
    pub fn current_votes(&self) -> impl Iterator<Item = &VoteDetail> {
        let current = self.current_prompt_id.as_deref();
        self.votes
            .iter()
            .filter(move |v| Some(v.vote.prompt_id.as_str()) == current)
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }
}

/// Response for create/join: the session and the id of the newly created player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedSession {
    pub game: SessionSnapshot,
    pub user_id: PlayerId,
}

/// One row of the results screen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub player: Player,
    pub count: u32,
    pub pct: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub prompt_id: Option<PromptId>,
    pub results: Vec<PlayerResult>,
    pub total: u32,
}
