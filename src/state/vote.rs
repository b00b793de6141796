use super::AppState;
use crate::error::{GameError, GameResult};
use crate::store::{StoreError, UQ_VOTE_KEY};
use crate::types::*;
use std::collections::HashMap;

/// Count votes per target for one prompt
fn aggregate_votes<'a>(
    votes: impl IntoIterator<Item = &'a Vote>,
    prompt_id: &str,
) -> HashMap<&'a str, u32> {
    let mut counts = HashMap::new();
    for vote in votes {
        if vote.prompt_id == prompt_id {
            *counts.entry(vote.target_id.as_str()).or_insert(0) += 1;
        }
    }
    counts
}

/// Percentage rounded half up, 0 when nothing was cast
fn percent(count: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let (count, total) = (u64::from(count), u64::from(total));
    ((200 * count + total) / (2 * total)) as u32
}

/// Tally the votes for `prompt_id` over the roster.
///
/// Every player is listed, including those without votes. Results are
/// ordered by descending count; ties keep roster order.
pub fn compute_results(players: &[Player], votes: &[Vote], prompt_id: Option<&str>) -> Tally {
    let counts = match prompt_id {
        Some(id) => aggregate_votes(votes, id),
        None => HashMap::new(),
    };
    let total: u32 = counts.values().sum();

    let mut results: Vec<PlayerResult> = players
        .iter()
        .map(|player| {
            let count = counts.get(player.id.as_str()).copied().unwrap_or(0);
            PlayerResult {
                player: player.clone(),
                count,
                pct: percent(count, total),
            }
        })
        .collect();
    results.sort_by(|a, b| b.count.cmp(&a.count));

    Tally {
        prompt_id: prompt_id.map(str::to_string),
        results,
        total,
    }
}

impl AppState {
    /// Record one vote per (session, prompt, voter). A second vote for the
    /// same key fails with `DuplicateVote` and leaves the first in place.
    pub async fn submit_vote(&self, vote: NewVote) -> GameResult<VoteDetail> {
        if [
            &vote.session_id,
            &vote.prompt_id,
            &vote.voter_id,
            &vote.target_id,
        ]
        .iter()
        .any(|field| field.trim().is_empty())
        {
            return Err(GameError::validation("Missing required fields"));
        }

        let session = self
            .store
            .find_session(&vote.session_id)
            .await?
            .ok_or_else(|| GameError::not_found("Game session", vote.session_id.as_str()))?;
        if self.find_prompt(&vote.prompt_id).await?.is_none() {
            return Err(GameError::not_found("Prompt", vote.prompt_id.as_str()));
        }
        for player_id in [&vote.voter_id, &vote.target_id] {
            if self.store.find_player(player_id).await?.is_none() {
                return Err(GameError::not_found("Player", player_id.as_str()));
            }
            if !session.has_member(player_id) {
                return Err(GameError::validation(format!(
                    "Player '{}' is not a member of session {}",
                    player_id, session.code
                )));
            }
        }

        if self
            .store
            .find_vote(&vote.session_id, &vote.prompt_id, &vote.voter_id)
            .await?
            .is_some()
        {
            tracing::info!(
                "Duplicate vote by {} on prompt {} in {}",
                vote.voter_id,
                vote.prompt_id,
                session.code
            );
            return Err(GameError::DuplicateVote);
        }

        match self.store.create_vote(&vote).await {
            Ok(detail) => {
                tracing::info!(
                    "Vote in {}: {} -> {} on prompt {}",
                    session.code,
                    detail.voter.name,
                    detail.target.name,
                    detail.prompt.id
                );
                Ok(detail)
            }
            // Lost a race with a concurrent vote for the same key
            Err(StoreError::UniqueViolation(UQ_VOTE_KEY)) => Err(GameError::DuplicateVote),
            Err(e) => Err(e.into()),
        }
    }

    /// Results for the session's current prompt
    pub async fn session_results(&self, code: &str) -> GameResult<Tally> {
        let snapshot = self.read_session(code).await?;
        let votes: Vec<Vote> = snapshot.current_votes().map(|v| v.vote.clone()).collect();
        Ok(compute_results(
            &snapshot.players,
            &votes,
            snapshot.current_prompt_id.as_deref(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::state;
    use super::*;

    fn player(id: &str) -> Player {
        Player {
            id: id.to_string(),
            name: id.to_string(),
            handle: format!("{}@game.local", id),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn vote(voter: &str, target: &str, prompt: &str) -> Vote {
        Vote {
            id: ulid::Ulid::new().to_string(),
            session_id: "s1".to_string(),
            prompt_id: prompt.to_string(),
            voter_id: voter.to_string(),
            target_id: target.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_compute_results_ranks_and_rounds() {
        let players = vec![player("Y"), player("X")];
        let votes = vec![vote("A", "X", "q1"), vote("A", "Y", "q1"), vote("B", "X", "q1")];

        let tally = compute_results(&players, &votes, Some("q1"));
        assert_eq!(tally.total, 3);
        assert_eq!(tally.results[0].player.id, "X");
        assert_eq!(tally.results[0].count, 2);
        assert_eq!(tally.results[0].pct, 67);
        assert_eq!(tally.results[1].player.id, "Y");
        assert_eq!(tally.results[1].count, 1);
        assert_eq!(tally.results[1].pct, 33);
    }

    #[test]
    fn test_compute_results_lists_players_without_votes() {
        let players = vec![player("X"), player("Y"), player("Z")];
        let votes = vec![vote("A", "Z", "q1")];

        let tally = compute_results(&players, &votes, Some("q1"));
        let ids: Vec<_> = tally.results.iter().map(|r| r.player.id.as_str()).collect();
        // Z leads, X and Y keep roster order
        assert_eq!(ids, vec!["Z", "X", "Y"]);
        assert_eq!(tally.results[1].count, 0);
        assert_eq!(tally.results[1].pct, 0);
    }

    #[test]
    fn test_compute_results_ignores_other_prompts() {
        let players = vec![player("X"), player("Y")];
        let votes = vec![vote("A", "X", "q1"), vote("A", "Y", "q2")];

        let tally = compute_results(&players, &votes, Some("q2"));
        assert_eq!(tally.total, 1);
        assert_eq!(tally.results[0].player.id, "Y");
        assert_eq!(tally.results[0].pct, 100);
    }

    #[test]
    fn test_compute_results_without_votes_or_prompt() {
        let players = vec![player("X"), player("Y")];
        let tally = compute_results(&players, &[], Some("q1"));
        assert_eq!(tally.total, 0);
        assert!(tally.results.iter().all(|r| r.count == 0 && r.pct == 0));

        let tally = compute_results(&players, &[vote("A", "X", "q1")], None);
        assert_eq!(tally.total, 0);
        assert_eq!(tally.results.len(), 2);
    }

    #[test]
    fn test_percent_rounds_half_up() {
        assert_eq!(percent(1, 2), 50);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(1, 6), 17);
        assert_eq!(percent(0, 5), 0);
        assert_eq!(percent(3, 3), 100);
    }

    #[test]
    fn test_percent_large_counts() {
        assert_eq!(percent(30_000_000, 60_000_000), 50);
        assert_eq!(percent(u32::MAX, u32::MAX), 100);
    }

    async fn voting_session(state: &AppState) -> (SessionSnapshot, PlayerId, PlayerId) {
        let created = state.create_session("Alice").await.unwrap();
        let bob = state
            .join_session(&created.game.code, "Bob")
            .await
            .unwrap();
        let snapshot = state
            .apply_action(&created.game.code, GameAction::StartGame)
            .await
            .unwrap();
        (snapshot, created.user_id, bob.user_id)
    }

    fn new_vote(snapshot: &SessionSnapshot, voter: &str, target: &str) -> NewVote {
        NewVote {
            session_id: snapshot.id.clone(),
            prompt_id: snapshot.current_prompt_id.clone().unwrap(),
            voter_id: voter.to_string(),
            target_id: target.to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_vote_then_duplicate() {
        let state = state(3);
        let (snapshot, alice, bob) = voting_session(&state).await;

        let detail = state
            .submit_vote(new_vote(&snapshot, &alice, &bob))
            .await
            .unwrap();
        assert_eq!(detail.voter.name, "Alice");
        assert_eq!(detail.target.name, "Bob");
        assert_eq!(Some(detail.prompt.id), snapshot.current_prompt_id);

        let again = state.submit_vote(new_vote(&snapshot, &alice, &alice)).await;
        assert_eq!(again.unwrap_err(), GameError::DuplicateVote);

        let votes = state.store.list_session_votes(&snapshot.id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].target.name, "Bob");
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_votes_keep_one() {
        let state = state(3);
        let (snapshot, alice, bob) = voting_session(&state).await;

        let results = futures::future::join_all(
            (0..5).map(|_| state.submit_vote(new_vote(&snapshot, &alice, &bob))),
        )
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == GameError::DuplicateVote));
        assert_eq!(
            state.store.list_session_votes(&snapshot.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_vote_requires_all_fields() {
        let state = state(3);
        let (snapshot, alice, _) = voting_session(&state).await;

        let result = state.submit_vote(new_vote(&snapshot, &alice, "")).await;
        assert_eq!(
            result.unwrap_err(),
            GameError::validation("Missing required fields")
        );
    }

    #[tokio::test]
    async fn test_vote_references_must_exist() {
        let state = state(3);
        let (snapshot, alice, bob) = voting_session(&state).await;

        let mut bad_prompt = new_vote(&snapshot, &alice, &bob);
        bad_prompt.prompt_id = "nope".to_string();
        assert_eq!(
            state.submit_vote(bad_prompt).await.unwrap_err(),
            GameError::not_found("Prompt", "nope")
        );

        let mut bad_session = new_vote(&snapshot, &alice, &bob);
        bad_session.session_id = "nope".to_string();
        assert!(matches!(
            state.submit_vote(bad_session).await,
            Err(GameError::NotFound { .. })
        ));

        assert_eq!(
            state
                .submit_vote(new_vote(&snapshot, &alice, "ghost"))
                .await
                .unwrap_err(),
            GameError::not_found("Player", "ghost")
        );
    }

    #[tokio::test]
    async fn test_voter_must_be_member() {
        let state = state(3);
        let (snapshot, _, bob) = voting_session(&state).await;
        let outsider = state.create_session("Mallory").await.unwrap().user_id;

        let result = state.submit_vote(new_vote(&snapshot, &outsider, &bob)).await;
        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[tokio::test]
    async fn test_vote_does_not_change_phase() {
        let state = state(3);
        let (snapshot, alice, bob) = voting_session(&state).await;
        state
            .submit_vote(new_vote(&snapshot, &alice, &bob))
            .await
            .unwrap();

        let after = state.read_session(&snapshot.code).await.unwrap();
        assert_eq!(after.phase, GamePhase::Question);
        assert_eq!(after.votes.len(), 1);
        assert!(after.version > snapshot.version);
    }

    #[tokio::test]
    async fn test_session_results_for_current_prompt() {
        let state = state(3);
        let (snapshot, alice, bob) = voting_session(&state).await;
        state
            .submit_vote(new_vote(&snapshot, &alice, &bob))
            .await
            .unwrap();
        state
            .submit_vote(new_vote(&snapshot, &bob, &bob))
            .await
            .unwrap();

        let tally = state.session_results(&snapshot.code).await.unwrap();
        assert_eq!(tally.total, 2);
        assert_eq!(tally.results[0].player.name, "Bob");
        assert_eq!(tally.results[0].pct, 100);
        assert_eq!(tally.results[1].player.name, "Alice");
    }

    #[tokio::test]
    async fn test_store_outage_is_retryable() {
        let store = std::sync::Arc::new(crate::store::MemoryStore::new(
            super::super::test_support::prompts(3),
        ));
        let state = AppState::new(store.clone(), crate::config::ServerConfig::default());
        let (snapshot, alice, bob) = voting_session(&state).await;

        store.set_available(false);
        let err = state
            .submit_vote(new_vote(&snapshot, &alice, &bob))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        store.set_available(true);
        assert!(state.submit_vote(new_vote(&snapshot, &alice, &bob)).await.is_ok());
    }
}
