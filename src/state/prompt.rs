use super::AppState;
use crate::error::GameResult;
use crate::types::*;

/// The prompt after `current` in catalog order, wrapping to the first after
/// the last. With no (or an unknown) current prompt this is the first one.
pub fn next_prompt<'a>(prompts: &'a [Prompt], current: Option<&str>) -> Option<&'a Prompt> {
    let position = current.and_then(|id| prompts.iter().position(|p| p.id == id));
    match position {
        Some(i) => prompts.get((i + 1) % prompts.len()),
        None => prompts.first(),
    }
}

impl AppState {
    /// Prompt catalog in play order (newest first)
    pub async fn list_prompts(&self) -> GameResult<Vec<Prompt>> {
        Ok(self.store.list_prompts().await?)
    }

    pub async fn find_prompt(&self, prompt_id: &str) -> GameResult<Option<Prompt>> {
        Ok(self
            .list_prompts()
            .await?
            .into_iter()
            .find(|p| p.id == prompt_id))
    }
}
