use super::AppState;
use crate::error::{GameError, GameResult};
use crate::store::{StoreError, UQ_PLAYER_HANDLE, UQ_SESSION_CODE};
use crate::types::*;
use rand::Rng;

/// Join codes are 6 uppercase alphanumerics (36^6 combinations)
const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 6;

/// Generate a random join code
pub fn generate_session_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Synthesize a unique contact handle from name, session code and time.
/// There is no real identity behind it.
pub fn player_handle(name: &str, code: &str, attempt: u32) -> String {
    let slug = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(".");
    let millis = chrono::Utc::now().timestamp_millis();
    if attempt == 0 {
        format!("{}.{}.{}@game.local", slug, code, millis)
    } else {
        format!("{}.{}.{}.{}@game.local", slug, code, millis, attempt)
    }
}

impl AppState {
    /// Validate a display name, returning it trimmed
    fn validate_player_name(&self, name: &str) -> GameResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::validation("Player name is required"));
        }
        if name.chars().count() > self.config.max_name_chars {
            return Err(GameError::validation(format!(
                "Player name must be at most {} characters",
                self.config.max_name_chars
            )));
        }
        Ok(name.to_string())
    }

    /// Create a player, retrying with a new handle if one collides
    async fn create_player(&self, name: &str, code: &str) -> GameResult<Player> {
        for attempt in 0..self.config.code_retry_limit {
            let handle = player_handle(name, code, attempt);
            match self.store.create_player(name, &handle).await {
                Ok(player) => return Ok(player),
                Err(StoreError::UniqueViolation(UQ_PLAYER_HANDLE)) => {
                    tracing::debug!("Handle {} taken, retrying", handle);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(GameError::StoreUnavailable(
            "could not allocate a unique player handle".to_string(),
        ))
    }

    /// Start a new session in LOBBY with the creator as its only player
    pub async fn create_session(&self, player_name: &str) -> GameResult<JoinedSession> {
        let name = self.validate_player_name(player_name)?;

        let mut code = generate_session_code();
        let player = self.create_player(&name, &code).await?;

        for _ in 0..self.config.code_retry_limit {
            match self.store.create_session(&code, &player.id).await {
                Ok(session) => {
                    tracing::info!("Session {} created by {} ({})", code, name, player.id);
                    return Ok(JoinedSession {
                        game: self.snapshot(session).await?,
                        user_id: player.id,
                    });
                }
                Err(StoreError::UniqueViolation(UQ_SESSION_CODE)) => {
                    tracing::warn!("Session code {} collided, generating another", code);
                    code = generate_session_code();
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(GameError::StoreUnavailable(
            "could not allocate a unique session code".to_string(),
        ))
    }

    /// Add a new player to an existing session
    pub async fn join_session(&self, code: &str, player_name: &str) -> GameResult<JoinedSession> {
        let name = self.validate_player_name(player_name)?;
        let session = self.find_session(code).await?;

        let player = self.create_player(&name, &session.code).await?;
        let session = self
            .store
            .add_player_to_session(&session.id, &player.id)
            .await?;

        tracing::info!(
            "{} ({}) joined session {}, {} players",
            name,
            player.id,
            session.code,
            session.player_ids.len()
        );

        Ok(JoinedSession {
            game: self.snapshot(session).await?,
            user_id: player.id,
        })
    }
}
