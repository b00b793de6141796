use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::GameError;

impl GameError {
    /// Status and machine-readable code for the wire
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            GameError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            GameError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            GameError::DuplicateVote => (StatusCode::CONFLICT, "DUPLICATE_VOTE"),
            GameError::Conflict { .. } => (StatusCode::CONFLICT, "ILLEGAL_TRANSITION"),
            GameError::SchemaMismatch(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SCHEMA_MISMATCH"),
            GameError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
        }
    }
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        } else {
            tracing::debug!(error = %self, code, "Request rejected");
        }

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}

/// Unwrap a JSON body, reporting malformed input as a validation error
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, GameError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| GameError::Validation(rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GamePhase;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_not_found_maps_to_404() {
        let response = GameError::not_found("Game session", "ABC123").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["error"], "Game session 'ABC123' not found");
    }

    #[tokio::test]
    async fn test_conflict_maps_to_409() {
        let err = GameError::conflict(GamePhase::Lobby, GamePhase::Results, "not allowed");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["code"], "ILLEGAL_TRANSITION");
    }

    #[test]
    fn test_status_table() {
        assert_eq!(
            GameError::DuplicateVote.status(),
            (StatusCode::CONFLICT, "DUPLICATE_VOTE")
        );
        assert_eq!(
            GameError::validation("x").status().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GameError::StoreUnavailable("down".into()).status().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GameError::SchemaMismatch("x".into()).status().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
