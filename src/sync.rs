//! Session synchronizer: keeps a client's view of a session in step with the
//! server by polling.
//!
//! The server is the only source of truth. The client keeps a `LastKnown`
//! copy that may be stale between polls and is replaced wholesale by every
//! newer snapshot, whether it came from a poll or from a mutation response.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::client::ClientError;
use crate::state::AppState;
use crate::types::*;

/// Anything that can hand out session snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the snapshot for `code`. Returns `None` when the session is
    /// still at `known_version`.
    async fn fetch(
        &self,
        code: &str,
        known_version: Option<u64>,
    ) -> Result<Option<SessionSnapshot>, ClientError>;
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    async fn fetch(
        &self,
        code: &str,
        known_version: Option<u64>,
    ) -> Result<Option<SessionSnapshot>, ClientError> {
        (**self).fetch(code, known_version).await
    }
}

#[async_trait]
impl SnapshotSource for AppState {
    async fn fetch(
        &self,
        code: &str,
        known_version: Option<u64>,
    ) -> Result<Option<SessionSnapshot>, ClientError> {
        let snapshot = self.read_session(code).await?;
        if known_version == Some(snapshot.version) {
            return Ok(None);
        }
        Ok(Some(snapshot))
    }
}

/// What changed between two snapshots
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// First snapshot received
    Joined { phase: GamePhase, version: u64 },
    PhaseChanged { from: GamePhase, to: GamePhase },
    PromptChanged {
        from: Option<PromptId>,
        to: Option<PromptId>,
    },
    RosterChanged { joined: Vec<Player> },
    VotesChanged { total: usize },
    /// The view is kept but marked stale until the next successful poll
    PollFailed { message: String, retryable: bool },
}

/// Diff two snapshots into events
pub fn reconcile(prev: Option<&SessionSnapshot>, next: &SessionSnapshot) -> Vec<SyncEvent> {
    let Some(prev) = prev else {
        return vec![SyncEvent::Joined {
            phase: next.phase,
            version: next.version,
        }];
    };

    let mut events = Vec::new();
    if prev.phase != next.phase {
        events.push(SyncEvent::PhaseChanged {
            from: prev.phase,
            to: next.phase,
        });
    }
    if prev.current_prompt_id != next.current_prompt_id {
        events.push(SyncEvent::PromptChanged {
            from: prev.current_prompt_id.clone(),
            to: next.current_prompt_id.clone(),
        });
    }

    let joined: Vec<Player> = next
        .players
        .iter()
        .filter(|p| prev.player(&p.id).is_none())
        .cloned()
        .collect();
    if !joined.is_empty() {
        events.push(SyncEvent::RosterChanged { joined });
    }

    if prev.votes.len() != next.votes.len() {
        events.push(SyncEvent::VotesChanged {
            total: next.votes.len(),
        });
    }
    events
}

/// Last snapshot the client has seen. Possibly stale, never authoritative.
#[derive(Debug, Default)]
pub struct LastKnown {
    snapshot: Option<SessionSnapshot>,
    fetched_at: Option<Instant>,
    stale: bool,
}

impl LastKnown {
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn version(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.version)
    }

    pub fn phase(&self) -> Option<GamePhase> {
        self.snapshot.as_ref().map(|s| s.phase)
    }

    /// Stale after a failed poll, or when not confirmed within `max_age`
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.stale
            || self
                .fetched_at
                .map_or(true, |fetched| fetched.elapsed() > max_age)
    }

    fn replace(&mut self, snapshot: SessionSnapshot) {
        self.snapshot = Some(snapshot);
        self.confirm();
    }

    fn confirm(&mut self) {
        self.fetched_at = Some(Instant::now());
        self.stale = false;
    }

    fn mark_stale(&mut self) {
        self.stale = true;
    }
}

pub struct SessionSynchronizer<S> {
    source: S,
    code: String,
    interval: Duration,
    view: LastKnown,
}

impl<S: SnapshotSource> SessionSynchronizer<S> {
    pub fn new(source: S, code: impl Into<String>, interval: Duration) -> Self {
        Self {
            source,
            code: code.into(),
            interval,
            view: LastKnown::default(),
        }
    }

    pub fn view(&self) -> &LastKnown {
        &self.view
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Fold in a snapshot from any source. Snapshots older than the
    /// current view are dropped (late responses). A snapshot of a different
    /// session under the same code starts the view over.
    pub fn accept(&mut self, snapshot: SessionSnapshot) -> Vec<SyncEvent> {
        if let Some(known) = self.view.snapshot() {
            if known.id != snapshot.id {
                tracing::info!(
                    "Session behind {} changed from {} to {}",
                    self.code,
                    known.id,
                    snapshot.id
                );
                self.view = LastKnown::default();
            }
        }

        if let Some(known) = self.view.version() {
            if snapshot.version < known {
                tracing::debug!(
                    "Dropping snapshot v{} for {}, already at v{}",
                    snapshot.version,
                    self.code,
                    known
                );
                return Vec::new();
            }
        }

        let events = reconcile(self.view.snapshot(), &snapshot);
        self.view.replace(snapshot);
        events
    }

    /// One poll round trip
    pub async fn poll_once(&mut self) -> Vec<SyncEvent> {
        match self.source.fetch(&self.code, self.view.version()).await {
            Ok(Some(snapshot)) => self.accept(snapshot),
            Ok(None) => {
                self.view.confirm();
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("Poll for {} failed: {}", self.code, e);
                self.view.mark_stale();
                vec![SyncEvent::PollFailed {
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }]
            }
        }
    }

    /// Poll on the interval until `shutdown` flips to true or the event
    /// receiver is dropped
    pub async fn run(
        mut self,
        events: mpsc::Sender<SyncEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for event in self.poll_once().await {
                        if events.send(event).await.is_err() {
                            return self;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return self;
                    }
                }
            }
        }
    }
}

impl<S: SnapshotSource + 'static> SessionSynchronizer<S> {
    /// Spawn a background task polling for this session
    pub fn spawn(
        self,
        events: mpsc::Sender<SyncEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<Self> {
        tokio::spawn(self.run(events, shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GameError;
    use crate::state::test_support::state;

    async fn synced(state: &Arc<AppState>) -> (SessionSynchronizer<Arc<AppState>>, String) {
        let code = state.create_session("Alice").await.unwrap().game.code;
        let mut sync =
            SessionSynchronizer::new(state.clone(), code.clone(), Duration::from_millis(10));
        let events = sync.poll_once().await;
        assert!(matches!(events.as_slice(), [SyncEvent::Joined { phase: GamePhase::Lobby, .. }]));
        (sync, code)
    }

    #[tokio::test]
    async fn test_poll_detects_phase_and_prompt_change() {
        let state = Arc::new(state(3));
        let (mut sync, code) = synced(&state).await;

        state.apply_action(&code, GameAction::StartGame).await.unwrap();
        let events = sync.poll_once().await;
        assert_eq!(
            events,
            vec![
                SyncEvent::PhaseChanged {
                    from: GamePhase::Lobby,
                    to: GamePhase::Question
                },
                SyncEvent::PromptChanged {
                    from: None,
                    to: Some("prompt-0".to_string())
                },
            ]
        );
        assert_eq!(sync.view().phase(), Some(GamePhase::Question));
    }

    #[tokio::test]
    async fn test_unchanged_poll_emits_nothing() {
        let state = Arc::new(state(3));
        let (mut sync, _) = synced(&state).await;

        assert!(sync.poll_once().await.is_empty());
        assert!(!sync.view().is_stale(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_poll_detects_roster_and_votes() {
        let state = Arc::new(state(3));
        let (mut sync, code) = synced(&state).await;

        let bob = state.join_session(&code, "Bob").await.unwrap();
        let events = sync.poll_once().await;
        assert!(matches!(
            events.as_slice(),
            [SyncEvent::RosterChanged { joined }] if joined[0].name == "Bob"
        ));

        let snapshot = state.apply_action(&code, GameAction::StartGame).await.unwrap();
        sync.accept(snapshot.clone());
        state
            .submit_vote(NewVote {
                session_id: snapshot.id.clone(),
                prompt_id: snapshot.current_prompt_id.clone().unwrap(),
                voter_id: bob.user_id.clone(),
                target_id: bob.user_id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(sync.poll_once().await, vec![SyncEvent::VotesChanged { total: 1 }]);
    }

    #[tokio::test]
    async fn test_older_snapshot_is_dropped() {
        let state = Arc::new(state(3));
        let (mut sync, code) = synced(&state).await;
        let old = state.read_session(&code).await.unwrap();

        let newer = state.apply_action(&code, GameAction::StartGame).await.unwrap();
        assert_eq!(sync.accept(newer).len(), 2);

        assert!(sync.accept(old).is_empty());
        assert_eq!(sync.view().phase(), Some(GamePhase::Question));
    }

    struct FailingSource;

    #[async_trait]
    impl SnapshotSource for FailingSource {
        async fn fetch(
            &self,
            _code: &str,
            _known_version: Option<u64>,
        ) -> Result<Option<SessionSnapshot>, ClientError> {
            Err(GameError::StoreUnavailable("down".to_string()).into())
        }
    }

    #[tokio::test]
    async fn test_failed_poll_marks_view_stale() {
        let mut sync = SessionSynchronizer::new(FailingSource, "ABC123", Duration::from_millis(10));
        let events = sync.poll_once().await;

        assert!(matches!(
            events.as_slice(),
            [SyncEvent::PollFailed { retryable: true, .. }]
        ));
        assert!(sync.view().is_stale(Duration::from_secs(60)));
        assert!(sync.view().snapshot().is_none());
    }

    #[tokio::test]
    async fn test_run_forwards_events_until_shutdown() {
        let state = Arc::new(state(3));
        let code = state.create_session("Alice").await.unwrap().game.code;

        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = SessionSynchronizer::new(state.clone(), code.clone(), Duration::from_millis(5))
            .spawn(tx, stop_rx);

        assert!(matches!(rx.recv().await, Some(SyncEvent::Joined { .. })));

        state.apply_action(&code, GameAction::StartGame).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(SyncEvent::PhaseChanged {
                to: GamePhase::Question,
                ..
            })
        ));

        stop_tx.send(true).unwrap();
        let sync = handle.await.unwrap();
        assert_eq!(sync.view().phase(), Some(GamePhase::Question));
    }

    #[tokio::test]
    async fn test_poll_converges_after_backup_restore() {
        let state = Arc::new(state(3));
        let created = state.create_session("Alice").await.unwrap();
        let code = created.game.code.clone();
        state.join_session(&code, "Bob").await.unwrap();
        let backup = state.export_state().await.unwrap();

        state.join_session(&code, "Carol").await.unwrap();
        state.join_session(&code, "Dave").await.unwrap();
        state.apply_action(&code, GameAction::StartGame).await.unwrap();

        let mut sync =
            SessionSynchronizer::new(state.clone(), code.clone(), Duration::from_millis(10));
        sync.poll_once().await;
        assert_eq!(sync.view().phase(), Some(GamePhase::Question));

        state.import_state(backup).await.unwrap();
        state.join_session(&code, "Erin").await.unwrap();

        let events = sync.poll_once().await;
        assert!(events.contains(&SyncEvent::PhaseChanged {
            from: GamePhase::Question,
            to: GamePhase::Lobby
        }));
        let server = state.read_session(&code).await.unwrap();
        assert_eq!(sync.view().snapshot(), Some(&server));
        assert_eq!(server.players.len(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_of_another_session_resets_view() {
        let state = Arc::new(state(3));
        let (mut sync, code) = synced(&state).await;
        let mut other = state.read_session(&code).await.unwrap();
        other.id = "replacement".to_string();
        other.version = 1;

        let events = sync.accept(other);
        assert!(matches!(events.as_slice(), [SyncEvent::Joined { version: 1, .. }]));
        assert_eq!(sync.view().snapshot().map(|s| s.id.as_str()), Some("replacement"));
    }
}
