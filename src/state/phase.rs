//! Phase state machine.
//!
//! LOBBY → QUESTION → VOTING → RESULTS, then back to QUESTION for the next
//! (or the same) prompt. Every transition is requested explicitly; nothing
//! advances on a timer.

use super::{next_prompt, AppState};
use crate::config::PhasePolicy;
use crate::error::{GameError, GameResult};
use crate::store::StoreError;
use crate::types::*;

/// Check if a phase transition is in the table
pub fn is_valid_phase_transition(from: &GamePhase, to: &GamePhase) -> bool {
    use GamePhase::*;

    matches!(
        (from, to),
        (Lobby, Question) | (Question, Voting) | (Voting, Results) | (Results, Question)
    )
}

/// Phases reachable from `phase`
pub fn get_valid_transitions(phase: &GamePhase) -> Vec<GamePhase> {
    use GamePhase::*;

    [Lobby, Question, Voting, Results]
        .into_iter()
        .filter(|to| is_valid_phase_transition(phase, to))
        .collect()
}

/// Resolve a requested patch against the transition table.
///
/// Returns `None` when the patch would leave the session as it is, so that
/// retried or duplicated requests converge instead of failing.
fn validate_patch(
    session: &Session,
    patch: &PhasePatch,
    prompts: &[Prompt],
) -> GameResult<Option<PhasePatch>> {
    let from = session.phase;
    let to = patch.phase.unwrap_or(from);
    let current = session.current_prompt_id.as_deref();

    let requested = match &patch.current_prompt_id {
        Some(Some(prompt_id)) => {
            if !prompts.iter().any(|p| p.id == *prompt_id) {
                return Err(GameError::not_found("Prompt", prompt_id.as_str()));
            }
            Some(Some(prompt_id.as_str()))
        }
        Some(None) if to != GamePhase::Lobby => {
            return Err(GameError::validation(
                "Current prompt can only be cleared in LOBBY",
            ));
        }
        other => other.as_ref().map(|_| None),
    };
    let target = requested.unwrap_or(current);

    if from == to {
        if target == current {
            return Ok(None);
        }
        return Err(GameError::conflict(
            from,
            to,
            "the prompt only changes when moving to QUESTION",
        ));
    }

    if !is_valid_phase_transition(&from, &to) {
        return Err(GameError::conflict(from, to, "transition not allowed"));
    }

    let prompt = match (from, to) {
        (GamePhase::Lobby, GamePhase::Question) => {
            let first = prompts
                .first()
                .ok_or_else(|| GameError::validation("No prompts available"))?;
            target.unwrap_or(first.id.as_str())
        }
        (GamePhase::Results, GamePhase::Question) => {
            let next = next_prompt(prompts, current).map(|p| p.id.as_str());
            match target {
                Some(id) if Some(id) == current || Some(id) == next => id,
                _ => {
                    return Err(GameError::conflict(
                        from,
                        to,
                        "expected the current or the next prompt",
                    ))
                }
            }
        }
        _ => match target {
            Some(id) if Some(id) == current => id,
            _ => {
                return Err(GameError::conflict(
                    from,
                    to,
                    "the prompt cannot change during a prompt cycle",
                ))
            }
        },
    };

    Ok(Some(PhasePatch::phase(to).with_prompt(prompt)))
}

/// Permissive patches skip the transition table but must still leave a
/// known prompt on every phase outside LOBBY
fn check_permissive(
    session: &Session,
    patch: &PhasePatch,
    prompts: &[Prompt],
) -> GameResult<()> {
    if let Some(Some(prompt_id)) = &patch.current_prompt_id {
        if !prompts.iter().any(|p| p.id == *prompt_id) {
            return Err(GameError::not_found("Prompt", prompt_id.as_str()));
        }
    }

    let to = patch.phase.unwrap_or(session.phase);
    let prompt = match &patch.current_prompt_id {
        Some(requested) => requested.as_ref(),
        None => session.current_prompt_id.as_ref(),
    };
    if to != GamePhase::Lobby && prompt.is_none() {
        return Err(GameError::validation(format!("{} requires a current prompt", to)));
    }
    Ok(())
}

/// The patch a server-side action resolves to
fn plan_action(
    session: &Session,
    action: GameAction,
    prompts: &[Prompt],
) -> GameResult<PhasePatch> {
    let (expected, to) = match action {
        GameAction::StartGame => (GamePhase::Lobby, GamePhase::Question),
        GameAction::StartVoting => (GamePhase::Question, GamePhase::Voting),
        GameAction::ShowResults => (GamePhase::Voting, GamePhase::Results),
        GameAction::NextQuestion | GameAction::ReshowQuestion => {
            (GamePhase::Results, GamePhase::Question)
        }
    };
    if session.phase != expected {
        return Err(GameError::conflict(
            session.phase,
            to,
            format!("{:?} requires {}", action, expected),
        ));
    }

    let patch = PhasePatch::phase(to);
    Ok(match action {
        GameAction::StartGame => {
            let first = prompts
                .first()
                .ok_or_else(|| GameError::validation("No prompts available"))?;
            patch.with_prompt(first.id.as_str())
        }
        GameAction::NextQuestion => {
            let next = next_prompt(prompts, session.current_prompt_id.as_deref())
                .ok_or_else(|| GameError::validation("No prompts available"))?;
            patch.with_prompt(next.id.as_str())
        }
        _ => patch,
    })
}

impl AppState {
    /// Apply a partial phase/prompt update requested by a client.
    ///
    /// Under `PhasePolicy::Strict` the patch is checked against the
    /// transition table first; under `Permissive` present fields are written
    /// as-is.
    pub async fn patch_session(
        &self,
        code: &str,
        patch: PhasePatch,
    ) -> GameResult<SessionSnapshot> {
        let _guard = self.transition_lock.lock().await;
        let session = self.find_session(code).await?;

        let resolved = match self.config.phase_policy {
            PhasePolicy::Strict => {
                let prompts = self.store.list_prompts().await?;
                match validate_patch(&session, &patch, &prompts) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        tracing::warn!("Rejected patch {:?} on {}: {}", patch, session.code, e);
                        return Err(e);
                    }
                }
            }
            PhasePolicy::Permissive => {
                let prompts = self.store.list_prompts().await?;
                check_permissive(&session, &patch, &prompts)?;
                Some(patch).filter(|p| !p.is_empty())
            }
        };

        match resolved {
            Some(patch) => self.commit_phase(session, &patch).await,
            None => self.snapshot(session).await,
        }
    }

    /// Perform a transition computed on the server, including prompt sequencing
    pub async fn apply_action(
        &self,
        code: &str,
        action: GameAction,
    ) -> GameResult<SessionSnapshot> {
        let _guard = self.transition_lock.lock().await;
        let session = self.find_session(code).await?;
        let prompts = self.store.list_prompts().await?;

        let patch = plan_action(&session, action, &prompts).inspect_err(|e| {
            tracing::warn!("Rejected {:?} on {}: {}", action, session.code, e);
        })?;
        self.commit_phase(session, &patch).await
    }

    /// Write the patch. A schema mismatch is not an error for the caller:
    /// the current persisted state is re-read and returned unchanged.
    async fn commit_phase(
        &self,
        session: Session,
        patch: &PhasePatch,
    ) -> GameResult<SessionSnapshot> {
        match self.store.update_session_phase(&session.id, patch).await {
            Ok(updated) => {
                tracing::info!(
                    "Session {}: {} -> {} (prompt {:?}, version {})",
                    updated.code,
                    session.phase,
                    updated.phase,
                    updated.current_prompt_id,
                    updated.version
                );
                self.snapshot(updated).await
            }
            Err(StoreError::SchemaMismatch(msg)) => {
                tracing::warn!(
                    "Phase update on {} hit a schema mismatch ({}), returning stored state",
                    session.code,
                    msg
                );
                let current = self
                    .store
                    .find_session(&session.id)
                    .await?
                    .ok_or_else(|| GameError::not_found("Game session", session.code.as_str()))?;
                self.snapshot(current).await
            }
            Err(e) => Err(e.into()),
        }
    }
}
