//! Queue Poller: point-in-time queue snapshots and the auto-refresh task.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::MatchmakingApi;
use crate::config::effective_interval;
use crate::credential::CredentialReader;
use crate::error::{Result, SessionError};
use crate::event::{EventSink, SessionEvent};
use crate::protocol::QueueSnapshot;
use crate::view::SessionView;

/// Owned handle to the running auto-refresh task.
///
/// Cancelling stops the pending tick, it does not merely skip the next one.
/// Dropping the handle cancels as well.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    interval: Duration,
}

impl RefreshHandle {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `false` once the task stopped itself or was cancelled.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Fetches snapshots and renders them into the queue region.
#[derive(Clone)]
struct Refresher {
    api: Arc<dyn MatchmakingApi>,
    credentials: CredentialReader,
    view: Arc<SessionView>,
    events: EventSink,
}

impl Refresher {
    async fn refresh(&self) -> Result<QueueSnapshot> {
        let Some(credential) = self.credentials.get() else {
            return Err(SessionError::AuthenticationRequired);
        };

        let status = match self.api.queue_status(&credential.token).await {
            Ok(status) => status,
            Err(e) => {
                // Previous rendering stays as it was.
                warn!("queue refresh failed: {e}");
                return Err(e);
            }
        };

        let snapshot = QueueSnapshot::from(status);
        debug!(queue_size = snapshot.queue_size, "queue snapshot received");
        self.view.replace_queue(snapshot.clone());
        self.events.emit(SessionEvent::QueueRefreshed(snapshot.clone()));
        Ok(snapshot)
    }
}

/// Refreshes the queue table on demand or on a timer.
///
/// At most one auto-refresh task exists; arming a new one cancels the old.
pub struct QueuePoller {
    refresher: Refresher,
    auto: Mutex<Option<RefreshHandle>>,
    rejected_tx: mpsc::UnboundedSender<()>,
}

impl QueuePoller {
    /// `rejected_tx` is signalled when the auto-refresh task stops because
    /// the server refused the credential.
    pub fn new(
        api: Arc<dyn MatchmakingApi>,
        credentials: CredentialReader,
        view: Arc<SessionView>,
        events: EventSink,
        rejected_tx: mpsc::UnboundedSender<()>,
    ) -> Self {
        Self {
            refresher: Refresher {
                api,
                credentials,
                view,
                events,
            },
            auto: Mutex::new(None),
            rejected_tx,
        }
    }

    /// Fetch one snapshot and replace the rendered queue table with it.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AuthenticationRequired`] without a credential; no
    ///   request is made
    /// - the request or decode error otherwise; the table is left untouched
    pub async fn refresh(&self) -> Result<QueueSnapshot> {
        self.refresher.refresh().await
    }

    /// Arm the recurring refresh, replacing any running timer.
    ///
    /// Returns the effective interval (zero falls back to 3000 ms). The first
    /// refresh runs one interval from now.
    pub fn start_auto_refresh(&self, interval: Duration) -> Duration {
        let interval = effective_interval(interval);
        let mut auto = self.auto.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = auto.take() {
            debug!("replacing running auto-refresh timer");
            previous.cancel();
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(auto_refresh_loop(
            self.refresher.clone(),
            interval,
            cancel.clone(),
            self.rejected_tx.clone(),
        ));
        *auto = Some(RefreshHandle {
            cancel,
            task,
            interval,
        });
        info!(interval_ms = interval.as_millis() as u64, "auto-refresh started");
        interval
    }

    /// Cancel the running timer. Returns `false` if none was active.
    pub fn stop_auto_refresh(&self) -> bool {
        let handle = self
            .auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                let was_active = handle.is_active();
                handle.cancel();
                if was_active {
                    info!("auto-refresh stopped");
                }
                was_active
            }
            None => false,
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(RefreshHandle::is_active)
    }

    /// Interval of the running timer, if any.
    pub fn auto_refresh_interval(&self) -> Option<Duration> {
        self.auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|h| h.is_active())
            .map(RefreshHandle::interval)
    }
}

impl std::fmt::Debug for QueuePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuePoller")
            .field("auto_refreshing", &self.is_auto_refreshing())
            .finish_non_exhaustive()
    }
}

async fn auto_refresh_loop(
    refresher: Refresher,
    interval: Duration,
    cancel: CancellationToken,
    rejected_tx: mpsc::UnboundedSender<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match refresher.refresh().await {
            Ok(_) => {}
            Err(SessionError::AuthenticationRequired) => {
                info!("auto-refresh stopped: no credential held");
                refresher.events.emit(SessionEvent::AuthenticationRequired);
                break;
            }
            Err(e) if e.is_credential_rejection() => {
                warn!("auto-refresh stopped: credential rejected");
                refresher.events.emit(SessionEvent::AuthenticationRequired);
                let _ = rejected_tx.send(());
                break;
            }
            // Logged by `refresh`; keep polling.
            Err(_) => {}
        }
    }

    debug!("auto-refresh task exited");
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::credential::{CredentialStore, MemoryStore};
    use crate::event::{event_channel, SessionEvents};
    use crate::protocol::{
        AuthResponse, JoinRequest, Leaderboard, LoginRequest, MatchResults, MatchmakingStatus,
        PlayerLookup, QueueActionResponse, QueuePlayer, QueueStatus, RegisterRequest,
        ValidateResponse,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a one-player queue; `status` selects the failure mode.
    #[derive(Default)]
    struct StatusApi {
        calls: AtomicUsize,
        status: Mutex<Option<u16>>,
    }

    impl StatusApi {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn fail_with(&self, status: u16) {
            *self.status.lock().unwrap() = Some(status);
        }
    }

    #[async_trait]
    impl MatchmakingApi for StatusApi {
        async fn login(&self, _: &LoginRequest) -> Result<AuthResponse> {
            unimplemented!()
        }
        async fn register(&self, _: &RegisterRequest) -> Result<AuthResponse> {
            unimplemented!()
        }
        async fn validate(&self, _: &str) -> Result<ValidateResponse> {
            unimplemented!()
        }
        async fn queue_status(&self, _: &str) -> Result<QueueStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match *self.status.lock().unwrap() {
                Some(401) => Err(SessionError::InvalidCredential),
                Some(status) => Err(SessionError::Status {
                    status,
                    path: "/api/match/status".into(),
                }),
                None => Ok(QueueStatus {
                    queue_size: None,
                    queue_players: vec![QueuePlayer {
                        player_id: "alice".into(),
                        display_name: Some("alice".into()),
                        rating: Some(1200),
                        online: true,
                        last_active: None,
                    }],
                    timestamp: None,
                }),
            }
        }
        async fn join(&self, _: &str, _: &JoinRequest) -> Result<QueueActionResponse> {
            unimplemented!()
        }
        async fn leave(&self, _: &str, _: &str) -> Result<QueueActionResponse> {
            unimplemented!()
        }
        async fn resume(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn pause(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn player(&self, _: &str, _: &str) -> Result<PlayerLookup> {
            unimplemented!()
        }
        async fn recent_results(&self, _: &str, _: u32) -> Result<MatchResults> {
            unimplemented!()
        }
        async fn history(&self, _: &str, _: Option<&str>, _: u32) -> Result<MatchResults> {
            unimplemented!()
        }
        async fn leaderboard(&self, _: &str, _: u32) -> Result<Leaderboard> {
            unimplemented!()
        }
        async fn matchmaking_enabled(&self, _: &str) -> Result<MatchmakingStatus> {
            unimplemented!()
        }
    }

    struct Fixture {
        api: Arc<StatusApi>,
        store: Arc<CredentialStore>,
        view: Arc<SessionView>,
        poller: QueuePoller,
        events: SessionEvents,
        rejected: mpsc::UnboundedReceiver<()>,
    }

    fn fixture(signed_in: bool) -> Fixture {
        let api = Arc::new(StatusApi::default());
        let store = Arc::new(CredentialStore::load(MemoryStore::new()));
        if signed_in {
            store.set("t1", "alice").unwrap();
        }
        let view = Arc::new(SessionView::default());
        let (tx, events) = event_channel(64);
        let (rejected_tx, rejected) = mpsc::unbounded_channel();
        let poller = QueuePoller::new(
            Arc::clone(&api) as Arc<dyn MatchmakingApi>,
            store.reader(),
            Arc::clone(&view),
            tx,
            rejected_tx,
        );
        Fixture {
            api,
            store,
            view,
            poller,
            events,
            rejected,
        }
    }

    #[tokio::test]
    async fn refresh_without_credential_makes_no_request() {
        let f = fixture(false);
        let err = f.poller.refresh().await.unwrap_err();
        assert!(matches!(err, SessionError::AuthenticationRequired));
        assert_eq!(f.api.calls(), 0);
        assert!(f.view.queue().is_none());
    }

    #[tokio::test]
    async fn refresh_replaces_the_table() {
        let f = fixture(true);
        let snapshot = f.poller.refresh().await.unwrap();
        assert_eq!(snapshot.queue_size, 1);
        assert!(f.view.queue().unwrap().contains("alice"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_rendering() {
        let f = fixture(true);
        f.poller.refresh().await.unwrap();
        f.api.fail_with(500);

        let err = f.poller.refresh().await.unwrap_err();
        assert!(matches!(err, SessionError::Status { status: 500, .. }));
        assert!(f.view.queue().unwrap().contains("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_leaves_exactly_one_timer() {
        let f = fixture(true);
        f.poller.start_auto_refresh(Duration::from_millis(3000));
        f.poller.start_auto_refresh(Duration::from_millis(3000));
        assert!(f.poller.is_auto_refreshing());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(f.api.calls(), 1);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(f.api.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_pending_tick() {
        let f = fixture(true);
        f.poller.start_auto_refresh(Duration::from_millis(1000));
        assert!(f.poller.stop_auto_refresh());
        assert!(!f.poller.is_auto_refreshing());

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(f.api.calls(), 0);

        // Inactive: a no-op.
        assert!(!f.poller.stop_auto_refresh());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_uses_default() {
        let f = fixture(true);
        let interval = f.poller.start_auto_refresh(Duration::ZERO);
        assert_eq!(interval, Duration::from_millis(3000));
        assert_eq!(
            f.poller.auto_refresh_interval(),
            Some(Duration::from_millis(3000))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credential_stops_timer_once() {
        let mut f = fixture(true);
        f.poller.start_auto_refresh(Duration::from_millis(1000));
        f.store.clear().unwrap();

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert!(!f.poller.is_auto_refreshing());
        assert_eq!(f.api.calls(), 0);

        let mut required = 0;
        while let Ok(event) = f.events.try_recv() {
            if event == SessionEvent::AuthenticationRequired {
                required += 1;
            }
        }
        assert_eq!(required, 1);
        assert!(f.rejected.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_credential_is_reported() {
        let mut f = fixture(true);
        f.api.fail_with(401);
        f.poller.start_auto_refresh(Duration::from_millis(1000));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(!f.poller.is_auto_refreshing());
        assert_eq!(f.api.calls(), 1);
        assert!(f.rejected.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_keep_polling() {
        let f = fixture(true);
        f.api.fail_with(503);
        f.poller.start_auto_refresh(Duration::from_millis(1000));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(f.poller.is_auto_refreshing());
        assert_eq!(f.api.calls(), 3);
    }
}
