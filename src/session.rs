//! Session Controller: the state machine tying the pieces together.
//!
//! ```text
//! Unauthenticated ──start()──▶ Validating ──valid──▶ AuthenticatedDisconnected
//!        ▲                         │                     │          ▲
//!        │                      invalid              connect()  disconnect()
//!        │                         ▼                     ▼          │
//!        └──────────────── (redirect) ◀──logout()── AuthenticatedConnected
//! ```
//!
//! The reported [`SessionState`] is derived from the authentication phase and
//! the live link state, so a connection the server drops shows up as
//! `AuthenticatedDisconnected` without any bookkeeping.
//!
//! The controller is the only writer of the [`CredentialStore`]. Any request
//! the server answers with 401/403 expires the session the same way a failed
//! validation does.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::MatchmakingApi;
use crate::auth::{AuthGate, AuthOutcome};
use crate::config::SessionConfig;
use crate::credential::CredentialStore;
use crate::error::{Result, SessionError};
use crate::event::{event_channel, EventSink, SessionEvent, SessionEvents, SessionState};
use crate::poller::QueuePoller;
use crate::protocol::{
    Credential, JoinRequest, Leaderboard, MatchResults, MatchmakingStatus, PlayerLookup,
    QueueActionResponse, QueueSnapshot,
};
use crate::realtime::{LinkEvent, LinkStatus, RealtimeLink};
use crate::transport::Connector;
use crate::view::{format_match, SessionView};

/// Rating used when joining without one.
pub const DEFAULT_RATING: u32 = 1200;

/// Number of results fetched by [`SessionController::recent_results`] by default.
pub const DEFAULT_RESULTS_LIMIT: u32 = 10;

/// Rows fetched by [`SessionController::leaderboard`] by default.
pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 50;

/// Matches fetched by [`SessionController::history`] by default.
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;

const EXPIRED_REASON: &str = "Your session has expired. Please log in again.";

/// Authentication half of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthPhase {
    SignedOut,
    Validating,
    SignedIn,
}

/// State reachable from both the controller and its event pump.
struct Shared {
    gate: AuthGate,
    api: Arc<dyn MatchmakingApi>,
    credentials: Arc<CredentialStore>,
    view: Arc<SessionView>,
    link: AsyncMutex<RealtimeLink>,
    link_status: LinkStatus,
    poller: QueuePoller,
    phase: Mutex<AuthPhase>,
    reported: Mutex<SessionState>,
    events: EventSink,
}

impl Shared {
    fn phase(&self) -> AuthPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: AuthPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn state(&self) -> SessionState {
        match self.phase() {
            AuthPhase::SignedOut => SessionState::Unauthenticated,
            AuthPhase::Validating => SessionState::Validating,
            AuthPhase::SignedIn if self.link_status.is_connected() => {
                SessionState::AuthenticatedConnected
            }
            AuthPhase::SignedIn => SessionState::AuthenticatedDisconnected,
        }
    }

    /// Emit `StateChanged` if the state moved since the last report.
    fn report_state(&self) {
        let state = self.state();
        let mut reported = self.reported.lock().unwrap_or_else(PoisonError::into_inner);
        if *reported != state {
            debug!(from = ?*reported, to = ?state, "session state changed");
            *reported = state;
            drop(reported);
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.events.emit(event);
    }

    fn redirect(&self, reason: &str) {
        self.view.log(reason);
        self.emit(SessionEvent::RedirectToLogin {
            reason: reason.to_string(),
        });
    }

    /// The credential, but only once it has been validated.
    fn authenticated_credential(&self) -> Option<Credential> {
        if self.phase() == AuthPhase::SignedIn {
            self.credentials.get()
        } else {
            None
        }
    }

    /// Tear everything down and return to the login screen.
    ///
    /// Pause is sent with the outgoing credential when `pause` is set.
    async fn end_session(&self, reason: &str, pause: bool) {
        let credential = self.credentials.get();
        self.set_phase(AuthPhase::SignedOut);
        {
            let mut link = self.link.lock().await;
            let pause_with = if pause { credential.as_ref() } else { None };
            link.disconnect(pause_with).await;
        }
        self.poller.stop_auto_refresh();
        if let Err(e) = self.credentials.clear() {
            warn!("failed to clear stored credential: {e}");
            self.view.log(format!("Could not remove stored credential: {e}"));
        }
        self.report_state();
        self.redirect(reason);
    }

    /// Fail closed after the server refused the credential.
    async fn expire(&self) {
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase == AuthPhase::SignedOut {
                return;
            }
            *phase = AuthPhase::SignedOut;
        }
        warn!("credential rejected by server, ending session");
        self.end_session(EXPIRED_REASON, false).await;
    }

    /// Log a failed operation, expiring the session on an authentication
    /// failure.
    async fn fail<T>(&self, action: &str, error: SessionError) -> Result<T> {
        let category = error.category();
        warn!(action, ?category, "operation failed: {error}");
        self.view.log(format!("{action} failed: {error}"));
        if category.is_fatal_to_session() {
            self.expire().await;
        }
        Err(error)
    }

    fn on_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::Match(event) => {
                debug!(match_id = ?event.match_id, "match result received");
                self.view.log(format!("Match: {}", format_match(&event)));
                self.view.push_match(event.clone());
                self.emit(SessionEvent::Match(event));
            }
            LinkEvent::Closed { reason } => {
                match &reason {
                    Some(reason) => self.view.log(format!("Connection lost: {reason}")),
                    None => self.view.log("Connection closed by server"),
                }
                self.report_state();
                self.emit(SessionEvent::LinkClosed { reason });
            }
        }
    }
}

/// Routes link events and poller rejections while the controller is idle.
async fn event_pump(
    shared: Arc<Shared>,
    mut link_rx: mpsc::Receiver<LinkEvent>,
    mut rejected_rx: mpsc::UnboundedReceiver<()>,
) {
    loop {
        tokio::select! {
            Some(event) = link_rx.recv() => shared.on_link_event(event),
            Some(()) = rejected_rx.recv() => shared.expire().await,
            else => break,
        }
    }
    debug!("session event pump exited");
}

/// Orchestrates authentication, the realtime link and the queue poller.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use matchmaking_session::{
///     CredentialStore, HttpApi, MemoryStore, SessionConfig, SessionController,
///     WebSocketConnector,
/// };
///
/// # async fn run() -> matchmaking_session::Result<()> {
/// let config = SessionConfig::new("http://localhost:8080");
/// let api = Arc::new(HttpApi::new(&config.base_url, config.request_timeout)?);
/// let connector = Arc::new(WebSocketConnector::new(&config.ws_url, config.handshake_timeout));
/// let store = CredentialStore::load(MemoryStore::new());
///
/// let (mut session, mut events) = SessionController::new(config, api, connector, store);
/// session.login("alice", "secret").await?;
/// session.connect().await?;
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct SessionController {
    shared: Arc<Shared>,
    refresh_interval: Duration,
    last_player_id: Option<String>,
    pump: JoinHandle<()>,
}

impl SessionController {
    /// Build a controller in the `Unauthenticated` state.
    ///
    /// Call [`start`](Self::start) to validate a stored credential. Must be
    /// called from within a Tokio runtime.
    pub fn new(
        config: SessionConfig,
        api: Arc<dyn MatchmakingApi>,
        connector: Arc<dyn Connector>,
        credentials: CredentialStore,
    ) -> (Self, SessionEvents) {
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = event_channel(capacity);
        let (link_tx, link_rx) = mpsc::channel(capacity);
        let (rejected_tx, rejected_rx) = mpsc::unbounded_channel();

        let credentials = Arc::new(credentials);
        let view = Arc::new(SessionView::new(
            config.match_log_capacity,
            config.status_log_capacity,
        ));
        let link = RealtimeLink::new(
            connector,
            Arc::clone(&api),
            config.stomp_host(),
            config.match_topic.clone(),
            link_tx,
        )
        .with_handshake_timeout(config.handshake_timeout)
        .with_shutdown_timeout(config.shutdown_timeout);
        let link_status = link.status();
        let poller = QueuePoller::new(
            Arc::clone(&api),
            credentials.reader(),
            Arc::clone(&view),
            event_tx.clone(),
            rejected_tx,
        );

        let shared = Arc::new(Shared {
            gate: AuthGate::new(Arc::clone(&api)),
            api,
            credentials,
            view,
            link: AsyncMutex::new(link),
            link_status,
            poller,
            phase: Mutex::new(AuthPhase::SignedOut),
            reported: Mutex::new(SessionState::Unauthenticated),
            events: event_tx,
        });
        let pump = tokio::spawn(event_pump(Arc::clone(&shared), link_rx, rejected_rx));

        let controller = Self {
            shared,
            refresh_interval: config.refresh_interval,
            last_player_id: None,
            pump,
        };
        (controller, event_rx)
    }

    // ── Authentication ──────────────────────────────────────────────

    /// Validate the stored credential and settle into the resulting state.
    ///
    /// On success the queue table is loaded once. On failure the store is
    /// cleared and one `RedirectToLogin` is emitted.
    pub async fn start(&mut self) -> SessionState {
        self.shared.set_phase(AuthPhase::Validating);
        self.shared.report_state();

        match self.shared.gate.validate(&self.shared.credentials).await {
            AuthOutcome::Authenticated { display_name } => {
                self.shared.set_phase(AuthPhase::SignedIn);
                self.shared.view.log(format!("Logged in as {display_name}"));
                self.shared.report_state();
                if let Err(e) = self.shared.poller.refresh().await {
                    let _ = self.shared.fail::<()>("Queue refresh", e).await;
                }
            }
            AuthOutcome::RedirectToLogin { reason } => {
                info!("stored credential not accepted");
                self.shared.end_session(&reason, false).await;
            }
        }
        self.state()
    }

    /// Log in, store the credential and validate it.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidInput`] for empty fields or when already
    ///   logged in
    /// - [`SessionError::Rejected`] with the server's message
    pub async fn login(&mut self, username: &str, password: &str) -> Result<SessionState> {
        if self.shared.phase() == AuthPhase::SignedIn {
            let name = self.display_name().unwrap_or_default();
            return Err(self.reject_input(&format!("Already logged in as {name}. Log out first.")));
        }
        match self
            .shared
            .gate
            .login(&self.shared.credentials, username, password)
            .await
        {
            Ok(credential) => {
                self.shared
                    .view
                    .log(format!("Login successful: {}", credential.display_name));
            }
            Err(e) => {
                self.shared.view.log(format!("Login failed: {e}"));
                return Err(e);
            }
        }
        Ok(self.start().await)
    }

    /// Create an account. The session stays logged out.
    ///
    /// # Errors
    ///
    /// See [`AuthGate::register`].
    pub async fn register(&self, username: &str, password: &str, email: &str) -> Result<String> {
        match self.shared.gate.register(username, password, email).await {
            Ok(message) => {
                self.shared.view.log(&message);
                Ok(message)
            }
            Err(e) => {
                self.shared.view.log(format!("Registration failed: {e}"));
                Err(e)
            }
        }
    }

    /// Disconnect (sending pause while the credential is still held), stop
    /// auto-refresh, clear the credential and redirect to login once.
    pub async fn logout(&mut self) {
        info!("logging out");
        self.last_player_id = None;
        self.shared.end_session("Logged out.", true).await;
    }

    // ── Realtime link ───────────────────────────────────────────────

    /// Open the realtime link and subscribe to match results.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AuthenticationRequired`] when not logged in; no
    ///   transport is opened and `RedirectToLogin` is emitted
    /// - the handshake or transport error otherwise; the session stays
    ///   `AuthenticatedDisconnected`
    pub async fn connect(&mut self) -> Result<()> {
        let Some(credential) = self.shared.authenticated_credential() else {
            self.shared.view.log("Connect refused: not logged in");
            self.shared.redirect("Please log in to connect.");
            return Err(SessionError::AuthenticationRequired);
        };
        if self.shared.link_status.is_connected() {
            debug!("connect: already connected");
            return Ok(());
        }

        self.shared.view.log("Connecting...");
        let result = {
            let mut link = self.shared.link.lock().await;
            // The session may have expired while the lock was contended.
            if self.shared.authenticated_credential().as_ref() != Some(&credential) {
                drop(link);
                self.shared.view.log("Connect cancelled: session ended");
                return Err(SessionError::AuthenticationRequired);
            }
            link.connect(Some(&credential)).await
        };
        self.shared.report_state();
        match result {
            Ok(()) => {
                self.shared.view.log("Connected");
                Ok(())
            }
            Err(e) => self.shared.fail("Connect", e).await,
        }
    }

    /// Release the subscription, close the link and notify pause.
    ///
    /// A no-op when already disconnected.
    pub async fn disconnect(&mut self) {
        let credential = self.shared.authenticated_credential();
        {
            let mut link = self.shared.link.lock().await;
            if !link.is_active() {
                debug!("disconnect: link already closed");
                return;
            }
            link.disconnect(credential.as_ref()).await;
        }
        self.shared.view.log("Disconnected");
        self.shared.report_state();
    }

    // ── Queue ───────────────────────────────────────────────────────

    /// Enqueue a player.
    ///
    /// `None` generates a `player-NNNN` id; a missing or zero rating becomes
    /// [`DEFAULT_RATING`]. A non-success answer from the server is returned
    /// as `Ok` with `success == false`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidInput`] for a blank id, before any request
    /// - [`SessionError::AuthenticationRequired`] when not logged in
    pub async fn join_queue(
        &mut self,
        player_id: Option<&str>,
        rating: Option<u32>,
    ) -> Result<QueueActionResponse> {
        let player_id = match player_id.map(str::trim) {
            Some("") => return Err(self.reject_input("Enter a player ID")),
            Some(id) => id.to_string(),
            None => generate_player_id(),
        };
        let credential = self.require_credential("join the queue")?;

        let request = JoinRequest {
            player_id: player_id.clone(),
            elo: rating.filter(|r| *r > 0).unwrap_or(DEFAULT_RATING),
        };
        self.last_player_id = Some(player_id.clone());

        match self.shared.api.join(&credential.token, &request).await {
            Ok(resp) => {
                info!(player_id = %player_id, success = resp.success, "join");
                self.shared.view.log(format!(
                    "Join {} ({player_id}): {}",
                    if resp.success { "ok" } else { "fail" },
                    resp.summary("Joined queue", "Failed")
                ));
                Ok(resp)
            }
            Err(e) => self.shared.fail("Join", e).await,
        }
    }

    /// Remove a player from the queue.
    ///
    /// Without an explicit (non-blank) id the last joined id is used.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidInput`] if there is no id to leave with
    /// - [`SessionError::AuthenticationRequired`] when not logged in
    pub async fn leave_queue(&mut self, player_id: Option<&str>) -> Result<QueueActionResponse> {
        let explicit = player_id.map(str::trim).filter(|id| !id.is_empty());
        let Some(player_id) = explicit
            .map(str::to_string)
            .or_else(|| self.last_player_id.clone())
        else {
            return Err(self.reject_input("Enter a player ID"));
        };
        let credential = self.require_credential("leave the queue")?;

        match self.shared.api.leave(&credential.token, &player_id).await {
            Ok(resp) => {
                info!(player_id = %player_id, success = resp.success, "leave");
                self.shared.view.log(format!(
                    "Leave {} ({player_id}): {}",
                    if resp.success { "ok" } else { "fail" },
                    resp.summary("Left queue", "Not found")
                ));
                Ok(resp)
            }
            Err(e) => self.shared.fail("Leave", e).await,
        }
    }

    /// Fetch a snapshot now and render it.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AuthenticationRequired`] when not logged in
    /// - the request error otherwise; the previous table is kept
    pub async fn refresh_queue(&mut self) -> Result<QueueSnapshot> {
        self.require_credential("refresh the queue")?;
        match self.shared.poller.refresh().await {
            Ok(snapshot) => {
                self.shared
                    .view
                    .log(format!("Queue refreshed: {} player(s)", snapshot.queue_size));
                Ok(snapshot)
            }
            Err(e) => self.shared.fail("Queue refresh", e).await,
        }
    }

    /// Arm auto-refresh, replacing a running timer.
    ///
    /// `None` uses the configured interval. Returns the effective interval.
    ///
    /// # Errors
    ///
    /// [`SessionError::AuthenticationRequired`] when not logged in.
    pub fn start_auto_refresh(&mut self, interval: Option<Duration>) -> Result<Duration> {
        self.require_credential("refresh the queue")?;
        let interval = self
            .shared
            .poller
            .start_auto_refresh(interval.unwrap_or(self.refresh_interval));
        self.shared.view.log(format!(
            "Auto-refresh every {} ms",
            interval.as_millis()
        ));
        Ok(interval)
    }

    /// Cancel auto-refresh. Returns `false` if it was not running.
    pub fn stop_auto_refresh(&mut self) -> bool {
        let stopped = self.shared.poller.stop_auto_refresh();
        if stopped {
            self.shared.view.log("Auto-refresh off");
        }
        stopped
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.shared.poller.is_auto_refreshing()
    }

    /// Interval of the running auto-refresh timer, if any.
    pub fn auto_refresh_interval(&self) -> Option<Duration> {
        self.shared.poller.auto_refresh_interval()
    }

    // ── Lookups ─────────────────────────────────────────────────────

    /// Look up one player. An unknown id is `Ok` with `success == false`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidInput`] for a blank id
    /// - [`SessionError::AuthenticationRequired`] when not logged in
    pub async fn player(&self, player_id: &str) -> Result<PlayerLookup> {
        let player_id = player_id.trim();
        if player_id.is_empty() {
            return Err(self.reject_input("Enter a player ID"));
        }
        let credential = self.require_credential("look up players")?;
        match self.shared.api.player(&credential.token, player_id).await {
            Ok(lookup) => Ok(lookup),
            Err(e) => self.shared.fail("Player lookup", e).await,
        }
    }

    /// Most recent match results, newest first. `None` or zero fetches
    /// [`DEFAULT_RESULTS_LIMIT`].
    ///
    /// # Errors
    ///
    /// [`SessionError::AuthenticationRequired`] when not logged in, or the
    /// request error.
    pub async fn recent_results(&self, limit: Option<u32>) -> Result<MatchResults> {
        let limit = limit.filter(|n| *n > 0).unwrap_or(DEFAULT_RESULTS_LIMIT);
        let credential = self.require_credential("load results")?;
        match self.shared.api.recent_results(&credential.token, limit).await {
            Ok(results) => Ok(results),
            Err(e) => self.shared.fail("Results", e).await,
        }
    }

    /// Stored match history, newest first, optionally for one player.
    ///
    /// A blank `player_id` falls back to the last joined id; with neither,
    /// every player's matches are listed. `None` or zero fetches
    /// [`DEFAULT_HISTORY_LIMIT`].
    ///
    /// # Errors
    ///
    /// [`SessionError::AuthenticationRequired`] when not logged in, or the
    /// request error.
    pub async fn history(
        &self,
        player_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<MatchResults> {
        let limit = limit.filter(|n| *n > 0).unwrap_or(DEFAULT_HISTORY_LIMIT);
        let player_id = player_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or(self.last_player_id.as_deref());
        let credential = self.require_credential("load history")?;
        match self
            .shared
            .api
            .history(&credential.token, player_id, limit)
            .await
        {
            Ok(results) => Ok(results),
            Err(e) => self.shared.fail("History", e).await,
        }
    }

    /// Players ranked by rating. `None` or zero fetches
    /// [`DEFAULT_LEADERBOARD_LIMIT`].
    ///
    /// # Errors
    ///
    /// [`SessionError::AuthenticationRequired`] when not logged in, or the
    /// request error.
    pub async fn leaderboard(&self, limit: Option<u32>) -> Result<Leaderboard> {
        let limit = limit.filter(|n| *n > 0).unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
        let credential = self.require_credential("load the leaderboard")?;
        match self.shared.api.leaderboard(&credential.token, limit).await {
            Ok(board) => Ok(board),
            Err(e) => self.shared.fail("Leaderboard", e).await,
        }
    }

    /// Whether the server is currently pairing players.
    ///
    /// # Errors
    ///
    /// [`SessionError::AuthenticationRequired`] when not logged in, or the
    /// request error.
    pub async fn matchmaking_enabled(&self) -> Result<MatchmakingStatus> {
        let credential = self.require_credential("query matchmaking")?;
        match self.shared.api.matchmaking_enabled(&credential.token).await {
            Ok(status) => Ok(status),
            Err(e) => self.shared.fail("Status", e).await,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Display name of the validated credential.
    pub fn display_name(&self) -> Option<String> {
        self.shared
            .authenticated_credential()
            .map(|c| c.display_name)
    }

    /// The rendered regions.
    pub fn view(&self) -> Arc<SessionView> {
        Arc::clone(&self.shared.view)
    }

    /// Id used by the last join, the fallback for [`leave_queue`](Self::leave_queue).
    pub fn last_player_id(&self) -> Option<&str> {
        self.last_player_id.as_deref()
    }

    /// Disconnect and stop background work. The credential is kept.
    pub async fn shutdown(&mut self) {
        self.shared.poller.stop_auto_refresh();
        let credential = self.shared.authenticated_credential();
        self.shared
            .link
            .lock()
            .await
            .disconnect(credential.as_ref())
            .await;
        self.pump.abort();
        debug!("session controller shut down");
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn require_credential(&self, action: &str) -> Result<Credential> {
        self.shared.authenticated_credential().ok_or_else(|| {
            self.shared.view.log(format!("Cannot {action}: not logged in"));
            self.shared.redirect(&format!("Please log in to {action}."));
            SessionError::AuthenticationRequired
        })
    }

    fn reject_input(&self, message: &str) -> SessionError {
        self.shared.view.log(message);
        SessionError::InvalidInput(message.to_string())
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("auto_refreshing", &self.is_auto_refreshing())
            .finish_non_exhaustive()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// `player-NNNN` with NNNN in 1000..=9999.
fn generate_player_id() -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 9000;
    format!("player-{}", 1000 + n)
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
    use crate::credential::MemoryStore;
    use crate::protocol::{AuthResponse, LoginRequest, QueueStatus, RegisterRequest, ValidateResponse};
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// The link lock test never reaches the server.
    struct OfflineApi;

    #[async_trait]
    impl MatchmakingApi for OfflineApi {
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
            unimplemented!()
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

    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Err(SessionError::TransportClosed)
        }
    }

    #[tokio::test]
    async fn connect_rechecks_the_session_once_it_holds_the_link() {
        let connector = Arc::new(CountingConnector::default());
        let store = CredentialStore::load(MemoryStore::new());
        store.set("t1", "alice").unwrap();
        let (mut session, _events) = SessionController::new(
            SessionConfig::new("http://localhost:8080"),
            Arc::new(OfflineApi),
            Arc::clone(&connector) as Arc<dyn Connector>,
            store,
        );
        session.shared.set_phase(AuthPhase::SignedIn);

        let shared = Arc::clone(&session.shared);
        let guard = shared.link.lock().await;
        let mut connect = Box::pin(session.connect());
        assert!(futures_util::poll!(connect.as_mut()).is_pending());

        // The session expires while connect waits for the link.
        shared.set_phase(AuthPhase::SignedOut);
        drop(guard);

        let err = connect.await.unwrap_err();
        assert!(matches!(err, SessionError::AuthenticationRequired));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert!(!shared.link_status.is_connected());
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn generated_ids_are_in_range() {
        for _ in 0..200 {
            let id = generate_player_id();
            let n: u32 = id.strip_prefix("player-").unwrap().parse().unwrap();
            assert!((1000..=9999).contains(&n), "{id}");
        }
    }

    #[test]
    fn state_labels() {
        assert_eq!(SessionState::AuthenticatedConnected.label(), "Connected");
        assert!(SessionState::AuthenticatedDisconnected.is_authenticated());
        assert!(!SessionState::Validating.is_authenticated());
    }
}
