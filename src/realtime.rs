//! Realtime Link: one STOMP connection carrying match results.
//!
//! [`RealtimeLink`] owns at most one live connection and at most one
//! [`Subscription`]. A connect cycle is:
//!
//! 1. open a transport through the [`Connector`]
//! 2. send `CONNECT` with `Authorization: Bearer <token>` and await `CONNECTED`
//! 3. fire a best-effort `resume` notification
//! 4. `SUBSCRIBE` to the match topic and hand the transport to a background
//!    loop that turns `MESSAGE` frames into [`LinkEvent::Match`]
//!
//! [`disconnect`](RealtimeLink::disconnect) reverses it: the loop sends
//! `UNSUBSCRIBE` and `DISCONNECT`, closes the transport, and a best-effort
//! `pause` notification is fired. Teardown never fails; errors on the way
//! are logged and swallowed.
//!
//! Both mutating operations take `&mut self`, so a connect cannot begin
//! until a disconnect in flight has released the old subscription.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::MatchmakingApi;
use crate::error::{Result, SessionError};
use crate::protocol::{Credential, MatchEvent};
use crate::stomp::{self, Command, Frame};
use crate::transport::{Connector, Transport};

// ── Link state ──────────────────────────────────────────────────────

/// Connection state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
        }
    }
}

/// Cheap, cloneable read-only view of a link's state.
///
/// The link loop flips it to `Disconnected` when the server drops the
/// connection, so observers never see a stale `Connected`.
#[derive(Debug, Clone)]
pub struct LinkStatus {
    state: Arc<AtomicU8>,
}

impl LinkStatus {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LinkState::Disconnected.as_u8())),
        }
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    fn set(&self, state: LinkState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

// ── Events and handles ──────────────────────────────────────────────

/// Events emitted by the link loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A match result arrived on the subscribed topic.
    Match(MatchEvent),
    /// The server ended the connection (clean close, `ERROR` frame or
    /// transport fault). Not emitted for a local disconnect.
    Closed { reason: Option<String> },
}

/// The single live topic subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: String,
    destination: String,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

/// Which best-effort notification to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Resume,
    Pause,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resume => "resume",
            Self::Pause => "pause",
        })
    }
}

/// Fire a resume/pause notification on a detached task.
///
/// The outcome is only logged; callers never await it for correctness.
pub fn spawn_notification(
    api: Arc<dyn MatchmakingApi>,
    token: String,
    kind: Notification,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = match kind {
            Notification::Resume => api.resume(&token).await,
            Notification::Pause => api.pause(&token).await,
        };
        match result {
            Ok(()) => debug!(notification = %kind, "matchmaking notified"),
            Err(e) => warn!(notification = %kind, "matchmaking notification failed: {e}"),
        }
    })
}

/// What the loop should release on teardown.
struct Teardown {
    unsubscribe: Option<String>,
}

/// Handles to the running link loop of the current cycle.
struct ActiveSession {
    subscription: Option<Subscription>,
    teardown_tx: Option<oneshot::Sender<Teardown>>,
    task: Option<JoinHandle<()>>,
}

// ── Link ────────────────────────────────────────────────────────────

/// Owner of the single realtime connection.
pub struct RealtimeLink {
    connector: Arc<dyn Connector>,
    api: Arc<dyn MatchmakingApi>,
    host: String,
    topic: String,
    handshake_timeout: Duration,
    shutdown_timeout: Duration,
    status: LinkStatus,
    session: Option<ActiveSession>,
    event_tx: mpsc::Sender<LinkEvent>,
}

impl RealtimeLink {
    /// `host` goes into the `CONNECT` frame; `topic` is subscribed on connect.
    pub fn new(
        connector: Arc<dyn Connector>,
        api: Arc<dyn MatchmakingApi>,
        host: impl Into<String>,
        topic: impl Into<String>,
        event_tx: mpsc::Sender<LinkEvent>,
    ) -> Self {
        Self {
            connector,
            api,
            host: host.into(),
            topic: topic.into(),
            handshake_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(1),
            status: LinkStatus::new(),
            session: None,
            event_tx,
        }
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn state(&self) -> LinkState {
        self.status.state()
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn status(&self) -> LinkStatus {
        self.status.clone()
    }

    /// `true` while a connect cycle holds resources, including one the
    /// server already ended.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// The live subscription, if any.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.session.as_ref()?.subscription.as_ref()
    }

    /// Open the connection, notify resume and subscribe to the match topic.
    ///
    /// A no-op when already connected.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AuthenticationRequired`] if `credential` is `None`;
    ///   no transport is opened
    /// - a transport-category error if the connection, handshake or
    ///   subscription fails; the link is left `Disconnected` and nothing is
    ///   retried
    pub async fn connect(&mut self, credential: Option<&Credential>) -> Result<()> {
        if self.is_connected() {
            debug!("realtime link already connected");
            return Ok(());
        }
        let Some(credential) = credential else {
            return Err(SessionError::AuthenticationRequired);
        };

        // A cycle the server ended still holds its handles.
        if self.session.is_some() {
            self.release(None).await;
        }

        self.status.set(LinkState::Connecting);
        let mut transport = match self.handshake(credential).await {
            Ok(transport) => transport,
            Err(e) => {
                self.status.set(LinkState::Disconnected);
                warn!("realtime handshake failed: {e}");
                return Err(e);
            }
        };

        self.status.set(LinkState::Connected);
        info!(host = %self.host, "realtime link connected");
        spawn_notification(
            Arc::clone(&self.api),
            credential.token.clone(),
            Notification::Resume,
        );

        let subscription = Subscription {
            id: format!("sub-{}", uuid::Uuid::new_v4()),
            destination: self.topic.clone(),
        };
        let subscribe = Frame::subscribe(&subscription.id, &subscription.destination);
        if let Err(e) = transport.send(subscribe.encode()).await {
            error!("subscribe to {} failed: {e}", subscription.destination);
            let _ = transport.close().await;
            // Resume went out for this cycle; close it with a pause.
            self.session = Some(ActiveSession {
                subscription: None,
                teardown_tx: None,
                task: None,
            });
            self.disconnect(Some(credential)).await;
            return Err(e);
        }
        info!(topic = %subscription.destination, "subscribed");

        let (teardown_tx, teardown_rx) = oneshot::channel();
        let task = tokio::spawn(link_loop(
            transport,
            subscription.id.clone(),
            self.event_tx.clone(),
            self.status.clone(),
            teardown_rx,
        ));

        self.session = Some(ActiveSession {
            subscription: Some(subscription),
            teardown_tx: Some(teardown_tx),
            task: Some(task),
        });
        Ok(())
    }

    /// Release the subscription, close the connection and notify pause.
    ///
    /// Pause is only sent when `credential` is held. Idempotent: without an
    /// active cycle this does nothing, not even the notification.
    pub async fn disconnect(&mut self, credential: Option<&Credential>) {
        if self.session.is_none() {
            debug!("realtime link already disconnected");
            return;
        }
        self.release(credential).await;
        info!("realtime link disconnected");
    }

    /// Tear down the current cycle. Never fails.
    async fn release(&mut self, credential: Option<&Credential>) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.status.set(LinkState::Disconnected);

        let unsubscribe = session.subscription.take().map(|s| s.id);
        if let Some(tx) = session.teardown_tx.take() {
            // Fails only if the loop already exited on its own.
            let _ = tx.send(Teardown { unsubscribe });
        }

        if let Some(mut task) = session.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("link loop terminated with join error: {join_err}"),
                Err(_) => {
                    warn!("link loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("link loop aborted: {join_err}");
                    }
                }
            }
        }

        if let Some(credential) = credential {
            spawn_notification(
                Arc::clone(&self.api),
                credential.token.clone(),
                Notification::Pause,
            );
        }
    }

    /// Open a transport and complete the STOMP handshake.
    async fn handshake(&self, credential: &Credential) -> Result<Box<dyn Transport>> {
        let timeout = self.handshake_timeout;
        let attempt = async {
            let mut transport = self.connector.connect().await?;
            let connect = Frame::connect(&self.host, &credential.token);
            if let Err(e) = transport.send(connect.encode()).await {
                let _ = transport.close().await;
                return Err(e);
            }
            match await_connected(transport.as_mut()).await {
                Ok(()) => Ok(transport),
                Err(e) => {
                    let _ = transport.close().await;
                    Err(e)
                }
            }
        };
        tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| SessionError::Timeout)?
    }
}

impl fmt::Debug for RealtimeLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeLink")
            .field("state", &self.state())
            .field("topic", &self.topic)
            .field("subscription", &self.subscription())
            .finish()
    }
}

impl Drop for RealtimeLink {
    fn drop(&mut self) {
        // No executor to drive a graceful teardown here; abort the loop so
        // the transport is dropped with it.
        if let Some(task) = self.session.as_mut().and_then(|s| s.task.take()) {
            task.abort();
        }
    }
}

/// Wait for `CONNECTED`; `ERROR`, EOF or any other frame fails the handshake.
async fn await_connected(transport: &mut dyn Transport) -> Result<()> {
    loop {
        let text = match transport.recv().await {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(SessionError::Handshake(
                    "connection closed before CONNECTED".into(),
                ))
            }
        };
        let Some(frame) = stomp::decode(&text)? else {
            continue;
        };
        return match frame.command {
            Command::Connected => {
                debug!(version = ?frame.header("version"), "STOMP session established");
                Ok(())
            }
            Command::Error => Err(SessionError::Handshake(frame.error_message())),
            other => Err(SessionError::Handshake(format!(
                "expected CONNECTED, got {other}"
            ))),
        };
    }
}

// ── Link loop ───────────────────────────────────────────────────────

/// Background loop of one connect cycle.
///
/// Exits when:
/// - teardown is requested (local disconnect)
/// - the transport returns `None` (server closed the connection)
/// - a transport error or `ERROR` frame arrives
async fn link_loop(
    mut transport: Box<dyn Transport>,
    subscription_id: String,
    event_tx: mpsc::Sender<LinkEvent>,
    status: LinkStatus,
    mut teardown_rx: oneshot::Receiver<Teardown>,
) {
    debug!("link loop started");

    loop {
        tokio::select! {
            biased;

            teardown = &mut teardown_rx => {
                let unsubscribe = teardown.ok().and_then(|t| t.unsubscribe);
                close_gracefully(transport.as_mut(), unsubscribe).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        if let Some(reason) = handle_text(&text, &subscription_id, &event_tx) {
                            let _ = transport.close().await;
                            status.set(LinkState::Disconnected);
                            emit_closed(&event_tx, Some(reason)).await;
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("realtime receive error: {e}");
                        status.set(LinkState::Disconnected);
                        emit_closed(&event_tx, Some(e.to_string())).await;
                        break;
                    }
                    None => {
                        debug!("realtime connection closed by server");
                        status.set(LinkState::Disconnected);
                        emit_closed(&event_tx, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("link loop exited");
}

/// Dispatch one inbound message. Returns a close reason for `ERROR` frames.
fn handle_text(
    text: &str,
    subscription_id: &str,
    event_tx: &mpsc::Sender<LinkEvent>,
) -> Option<String> {
    let frame = match stomp::decode(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => return None,
        Err(e) => {
            warn!("discarding unreadable realtime frame: {e}");
            return None;
        }
    };

    match frame.command {
        Command::Message => {
            if frame.header("subscription").is_some_and(|id| id != subscription_id) {
                debug!("message for a released subscription, ignoring");
                return None;
            }
            match serde_json::from_str::<MatchEvent>(&frame.body) {
                Ok(event) => emit_event(event_tx, LinkEvent::Match(event)),
                Err(e) => warn!("discarding malformed match payload: {e}"),
            }
            None
        }
        Command::Error => {
            let message = frame.error_message();
            error!("broker error: {message}");
            Some(message)
        }
        other => {
            debug!("ignoring {other} frame");
            None
        }
    }
}

/// Release the subscription and close; every step is best-effort.
async fn close_gracefully(transport: &mut dyn Transport, unsubscribe: Option<String>) {
    if let Some(id) = unsubscribe {
        if let Err(e) = transport.send(Frame::unsubscribe(&id).encode()).await {
            debug!("unsubscribe failed during teardown: {e}");
        }
    }
    let receipt = format!("disconnect-{}", uuid::Uuid::new_v4());
    if let Err(e) = transport.send(Frame::disconnect(&receipt).encode()).await {
        debug!("DISCONNECT failed during teardown: {e}");
    }
    if let Err(e) = transport.close().await {
        debug!("transport close failed during teardown: {e}");
    }
}

/// Drop the event with a warning when the consumer is behind.
fn emit_event(event_tx: &mpsc::Sender<LinkEvent>, event: LinkEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("link event channel full, dropping match event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("link event channel closed, receiver dropped");
        }
    }
}

/// `Closed` is the last event of a cycle and is never dropped.
async fn emit_closed(event_tx: &mpsc::Sender<LinkEvent>, reason: Option<String>) {
    if event_tx.send(LinkEvent::Closed { reason }).await.is_err() {
        debug!("link event channel closed, receiver dropped");
    }
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
    use crate::protocol::{
        AuthResponse, JoinRequest, Leaderboard, LoginRequest, MatchResults, MatchmakingStatus,
        PlayerLookup, QueueActionResponse, QueueStatus, RegisterRequest, ValidateResponse,
    };
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    // ── Mocks ───────────────────────────────────────────────────────

    /// Scripted transport: replies to CONNECT with `reply`, then serves
    /// `pushed`, then hangs. Records every frame sent.
    struct ScriptedTransport {
        reply: Option<String>,
        pushed: Vec<String>,
        sent: Arc<StdMutex<Vec<Frame>>>,
        fail_subscribe: bool,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, frame: String) -> Result<()> {
            let frame = stomp::decode(&frame).unwrap().unwrap();
            if self.fail_subscribe && frame.command == Command::Subscribe {
                return Err(SessionError::TransportSend("broken pipe".into()));
            }
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            if let Some(reply) = self.reply.take() {
                return Some(Ok(reply));
            }
            if !self.pushed.is_empty() {
                return Some(Ok(self.pushed.remove(0)));
            }
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedConnector {
        reply: String,
        pushed: Vec<String>,
        fail_subscribe: bool,
        opened: StdMutex<usize>,
        sent: Arc<StdMutex<Vec<Frame>>>,
    }

    impl ScriptedConnector {
        fn accepting() -> Self {
            Self {
                reply: Frame::new(Command::Connected).encode(),
                ..Default::default()
            }
        }

        fn commands(&self) -> Vec<Command> {
            self.sent.lock().unwrap().iter().map(|f| f.command).collect()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>> {
            *self.opened.lock().unwrap() += 1;
            Ok(Box::new(ScriptedTransport {
                reply: Some(self.reply.clone()),
                pushed: self.pushed.clone(),
                sent: Arc::clone(&self.sent),
                fail_subscribe: self.fail_subscribe,
            }))
        }
    }

    /// Only resume/pause are exercised by the link.
    #[derive(Default)]
    struct NotifyApi {
        calls: StdMutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl MatchmakingApi for NotifyApi {
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
            self.calls.lock().unwrap().push(Notification::Resume);
            if self.fail {
                return Err(SessionError::Status {
                    status: 500,
                    path: "/api/match/resume".into(),
                });
            }
            Ok(())
        }
        async fn pause(&self, _: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Notification::Pause);
            if self.fail {
                return Err(SessionError::TransportClosed);
            }
            Ok(())
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

    fn link_with(
        connector: Arc<ScriptedConnector>,
        api: Arc<NotifyApi>,
    ) -> (RealtimeLink, mpsc::Receiver<LinkEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let link = RealtimeLink::new(connector, api, "localhost", "/topic/matches", tx)
            .with_shutdown_timeout(Duration::from_millis(200));
        (link, rx)
    }

    fn alice() -> Credential {
        Credential::new("t1", "alice")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn connect_subscribes_once_and_resumes() {
        let connector = Arc::new(ScriptedConnector::accepting());
        let api = Arc::new(NotifyApi::default());
        let (mut link, _rx) = link_with(Arc::clone(&connector), Arc::clone(&api));

        link.connect(Some(&alice())).await.unwrap();
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(link.subscription().unwrap().destination(), "/topic/matches");

        // Second connect is a no-op.
        link.connect(Some(&alice())).await.unwrap();
        settle().await;

        assert_eq!(*connector.opened.lock().unwrap(), 1);
        assert_eq!(
            connector.commands(),
            vec![Command::Connect, Command::Subscribe]
        );
        let connect = connector.sent.lock().unwrap()[0].clone();
        assert_eq!(connect.header("Authorization"), Some("Bearer t1"));
        assert_eq!(*api.calls.lock().unwrap(), vec![Notification::Resume]);
    }

    #[tokio::test]
    async fn connect_without_credential_opens_nothing() {
        let connector = Arc::new(ScriptedConnector::accepting());
        let (mut link, _rx) = link_with(Arc::clone(&connector), Arc::new(NotifyApi::default()));

        let err = link.connect(None).await.unwrap_err();
        assert!(matches!(err, SessionError::AuthenticationRequired));
        assert_eq!(*connector.opened.lock().unwrap(), 0);
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn error_frame_fails_handshake() {
        let connector = Arc::new(ScriptedConnector {
            reply: Frame::new(Command::Error)
                .with_header("message", "Invalid token")
                .encode(),
            ..Default::default()
        });
        let api = Arc::new(NotifyApi::default());
        let (mut link, _rx) = link_with(Arc::clone(&connector), Arc::clone(&api));

        let err = link.connect(Some(&alice())).await.unwrap_err();
        assert!(matches!(err, SessionError::Handshake(ref m) if m == "Invalid token"));
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(link.subscription().is_none());
        settle().await;
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_releases_subscription_and_pauses() {
        let connector = Arc::new(ScriptedConnector::accepting());
        let api = Arc::new(NotifyApi::default());
        let (mut link, _rx) = link_with(Arc::clone(&connector), Arc::clone(&api));

        link.connect(Some(&alice())).await.unwrap();
        link.disconnect(Some(&alice())).await;
        settle().await;

        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(link.subscription().is_none());
        assert_eq!(
            connector.commands(),
            vec![
                Command::Connect,
                Command::Subscribe,
                Command::Unsubscribe,
                Command::Disconnect
            ]
        );
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec![Notification::Resume, Notification::Pause]
        );
    }

    #[tokio::test]
    async fn disconnect_when_disconnected_is_noop() {
        let api = Arc::new(NotifyApi::default());
        let (mut link, _rx) = link_with(Arc::new(ScriptedConnector::accepting()), Arc::clone(&api));

        link.disconnect(Some(&alice())).await;
        link.disconnect(None).await;
        settle().await;

        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_without_credential_skips_pause() {
        let api = Arc::new(NotifyApi::default());
        let (mut link, _rx) = link_with(Arc::new(ScriptedConnector::accepting()), Arc::clone(&api));

        link.connect(Some(&alice())).await.unwrap();
        link.disconnect(None).await;
        settle().await;

        assert_eq!(*api.calls.lock().unwrap(), vec![Notification::Resume]);
    }

    #[tokio::test]
    async fn notification_failures_do_not_change_state() {
        let api = Arc::new(NotifyApi {
            fail: true,
            ..Default::default()
        });
        let (mut link, _rx) = link_with(Arc::new(ScriptedConnector::accepting()), Arc::clone(&api));

        link.connect(Some(&alice())).await.unwrap();
        settle().await;
        assert_eq!(link.state(), LinkState::Connected);

        link.disconnect(Some(&alice())).await;
        settle().await;
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(api.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn message_frames_become_match_events() {
        let body = r#"{"matchId":"m-1","playerA":"alice","playerB":"bob","winner":"alice"}"#;
        let connector = Arc::new(ScriptedConnector {
            reply: Frame::new(Command::Connected).encode(),
            pushed: vec![
                "\n".to_string(),
                Frame::new(Command::Message).with_body("not json").encode(),
                Frame::new(Command::Message).with_body(body).encode(),
            ],
            ..Default::default()
        });
        let (mut link, mut rx) = link_with(connector, Arc::new(NotifyApi::default()));

        link.connect(Some(&alice())).await.unwrap();
        let event = rx.recv().await.unwrap();
        let LinkEvent::Match(event) = event else {
            panic!("expected match event, got {event:?}");
        };
        assert_eq!(event.winner.as_deref(), Some("alice"));
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn broker_error_closes_the_link() {
        let connector = Arc::new(ScriptedConnector {
            reply: Frame::new(Command::Connected).encode(),
            pushed: vec![Frame::new(Command::Error)
                .with_header("message", "session expired")
                .encode()],
            ..Default::default()
        });
        let (mut link, mut rx) = link_with(connector, Arc::new(NotifyApi::default()));

        link.connect(Some(&alice())).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            LinkEvent::Closed {
                reason: Some("session expired".into())
            }
        );
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_after_server_close_keeps_one_subscription() {
        let connector = Arc::new(ScriptedConnector {
            reply: Frame::new(Command::Connected).encode(),
            pushed: vec![Frame::new(Command::Error).encode()],
            ..Default::default()
        });
        let (mut link, mut rx) = link_with(Arc::clone(&connector), Arc::new(NotifyApi::default()));

        link.connect(Some(&alice())).await.unwrap();
        let first = link.subscription().unwrap().id().to_string();
        let _ = rx.recv().await; // Closed

        link.connect(Some(&alice())).await.unwrap();
        let second = link.subscription().unwrap().id().to_string();
        assert_ne!(first, second);
        assert_eq!(*connector.opened.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_subscribe_leaves_link_disconnected_and_pauses() {
        let connector = Arc::new(ScriptedConnector {
            reply: Frame::new(Command::Connected).encode(),
            fail_subscribe: true,
            ..Default::default()
        });
        let api = Arc::new(NotifyApi::default());
        let (mut link, _rx) = link_with(connector, Arc::clone(&api));

        let err = link.connect(Some(&alice())).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportSend(_)));
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(link.subscription().is_none());
        settle().await;
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec![Notification::Resume, Notification::Pause]
        );
    }

    #[tokio::test]
    async fn silent_server_times_out_handshake() {
        let connector = Arc::new(ScriptedConnector {
            // A heart-beat only; CONNECTED never comes.
            reply: "\n".into(),
            ..Default::default()
        });
        let (link, _rx) = link_with(connector, Arc::new(NotifyApi::default()));
        let mut link = link.with_handshake_timeout(Duration::from_millis(50));

        let err = link.connect(Some(&alice())).await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout));
        assert_eq!(link.state(), LinkState::Disconnected);
    }
}
