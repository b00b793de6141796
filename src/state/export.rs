use super::AppState;
use crate::error::{GameError, GameResult};
use crate::store::StoreExport;

impl AppState {
    /// Dump the whole store
    pub async fn export_state(&self) -> GameResult<StoreExport> {
        let export = self.store.export().await?;
        tracing::info!(
            "Exported {} sessions, {} players, {} votes",
            export.sessions.len(),
            export.players.len(),
            export.votes.len()
        );
        Ok(export)
    }

    /// Replace the whole store. Invalid exports are rejected before
    /// anything is touched.
    pub async fn import_state(&self, export: StoreExport) -> GameResult<()> {
        export.validate().map_err(GameError::Validation)?;

        // No transition may interleave with the swap
        let _guard = self.transition_lock.lock().await;
        let (sessions, players) = (export.sessions.len(), export.players.len());
        self.store.import(export).await?;

        tracing::info!("Imported {} sessions, {} players", sessions, players);
        Ok(())
    }
}
