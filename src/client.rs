//! HTTP client for the game API, used by the session synchronizer and by
//! anything driving a game from outside the server process.

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::api::etag::session_etag;
use crate::api::{ActionRequest, PlayerNameRequest, VoteRequest};
use crate::error::GameError;
use crate::state::normalize_code;
use crate::sync::SnapshotSource;
use crate::types::*;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Error body returned by the server
    #[error("{message} ({code}, HTTP {status})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Error from an in-process snapshot source
    #[error(transparent)]
    Game(#[from] GameError),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Api { status, .. } => *status == StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            ClientError::Game(e) => e.is_retryable(),
        }
    }

    /// Machine-readable code, if the server sent one
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

pub struct GameClient {
    base_url: String,
    client: reqwest::Client,
}

impl GameClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode a success body, or turn the server's error body into `Api`
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.code, body.error),
            Err(_) => ("UNKNOWN".to_string(), text),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    pub async fn create_session(&self, player_name: &str) -> Result<JoinedSession, ClientError> {
        let response = self
            .client
            .post(self.url("/api/game"))
            .json(&PlayerNameRequest {
                player_name: player_name.to_string(),
            })
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn join_session(
        &self,
        code: &str,
        player_name: &str,
    ) -> Result<JoinedSession, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/api/game/{}", normalize_code(code))))
            .json(&PlayerNameRequest {
                player_name: player_name.to_string(),
            })
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn read_session(&self, code: &str) -> Result<SessionSnapshot, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/game/{}", normalize_code(code))))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn patch_session(
        &self,
        code: &str,
        patch: &PhasePatch,
    ) -> Result<SessionSnapshot, ClientError> {
        let response = self
            .client
            .patch(self.url(&format!("/api/game/{}", normalize_code(code))))
            .json(patch)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn apply_action(
        &self,
        code: &str,
        action: GameAction,
    ) -> Result<SessionSnapshot, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/api/game/{}/actions", normalize_code(code))))
            .json(&ActionRequest { action })
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn results(&self, code: &str) -> Result<Tally, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/game/{}/results", normalize_code(code))))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn submit_vote(&self, vote: &NewVote) -> Result<VoteDetail, ClientError> {
        let response = self
            .client
            .post(self.url("/api/vote"))
            .json(&VoteRequest::from(vote))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, ClientError> {
        let response = self.client.get(self.url("/api/prompts")).send().await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl SnapshotSource for GameClient {
    async fn fetch(
        &self,
        code: &str,
        known_version: Option<u64>,
    ) -> Result<Option<SessionSnapshot>, ClientError> {
        let code = normalize_code(code);
        let mut request = self.client.get(self.url(&format!("/api/game/{}", code)));
        if let Some(version) = known_version {
            request = request.header(header::IF_NONE_MATCH, session_etag(&code, version));
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        Self::decode(response).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = GameClient::with_client("http://localhost:3000/", reqwest::Client::new());
        assert_eq!(client.url("/api/game"), "http://localhost:3000/api/game");
    }

    #[test]
    fn test_retryable_errors() {
        let unavailable = ClientError::Api {
            status: 503,
            code: "STORE_UNAVAILABLE".to_string(),
            message: "down".to_string(),
        };
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.code(), Some("STORE_UNAVAILABLE"));

        let conflict = ClientError::Api {
            status: 409,
            code: "ILLEGAL_TRANSITION".to_string(),
            message: "no".to_string(),
        };
        assert!(!conflict.is_retryable());

        let game: ClientError = GameError::StoreUnavailable("down".into()).into();
        assert!(game.is_retryable());
    }
}
