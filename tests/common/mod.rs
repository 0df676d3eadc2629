#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for matchmaking session integration tests.
//!
//! Provides a scripted [`MockConnector`] handing out channel-driven
//! [`MockTransport`]s, an in-memory [`MockApi`] standing in for the REST
//! server, and helpers for building STOMP frames.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use matchmaking_session::protocol::{
    AuthResponse, JoinRequest, Leaderboard, LeaderboardEntry, LoginRequest, MatchResults,
    MatchmakingStatus, PlayerLookup, QueueActionResponse, QueuePlayer, QueueStatus,
    RegisterRequest, ValidateResponse,
};
use matchmaking_session::stomp::{self, Command, Frame};
use matchmaking_session::{
    Connector, CredentialStore, MatchEvent, MemoryStore, SessionConfig, SessionController,
    SessionError, SessionEvent, SessionEvents, Transport,
};

type Incoming = Option<Result<String, SessionError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-driven mock transport.
///
/// Items pushed by the test through [`MockConnector`] are returned by
/// `recv()` in order; `None` items simulate a server close. Once the test
/// stops pushing, `recv()` hangs so the link loop stays alive.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    fail_subscribe: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), SessionError> {
        if self.fail_subscribe && frame.starts_with("SUBSCRIBE") {
            return Err(SessionError::TransportSend("broken pipe".into()));
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// How the mock server answers `CONNECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Accept,
    Reject,
    Refuse,
}

/// Opens [`MockTransport`]s and records everything the client sends.
pub struct MockConnector {
    connects: AtomicUsize,
    sent: Arc<StdMutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    server: StdMutex<Option<mpsc::UnboundedSender<Incoming>>>,
    handshake: StdMutex<Handshake>,
    fail_subscribe: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            sent: Arc::new(StdMutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
            server: StdMutex::new(None),
            handshake: StdMutex::new(Handshake::Accept),
            fail_subscribe: AtomicBool::new(false),
        })
    }

    pub fn set_handshake(&self, handshake: Handshake) {
        *self.handshake.lock().unwrap() = handshake;
    }

    pub fn fail_subscribe(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    /// Number of transport-level connections opened.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Deliver a frame on the most recent connection.
    pub fn push(&self, frame: Frame) {
        let server = self.server.lock().unwrap();
        server
            .as_ref()
            .expect("no connection opened")
            .send(Some(Ok(frame.encode())))
            .unwrap();
    }

    /// Close the most recent connection from the server side.
    pub fn drop_connection(&self) {
        let server = self.server.lock().unwrap();
        server
            .as_ref()
            .expect("no connection opened")
            .send(None)
            .unwrap();
    }

    /// Every frame the client sent, across all connections.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| stomp::decode(text).unwrap().unwrap())
            .collect()
    }

    pub fn sent_commands(&self) -> Vec<Command> {
        self.sent_frames().iter().map(|f| f.command).collect()
    }

    pub fn count(&self, command: Command) -> usize {
        self.sent_commands().iter().filter(|c| **c == command).count()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let handshake = *self.handshake.lock().unwrap();
        let reply = match handshake {
            Handshake::Accept => Frame::new(Command::Connected).with_header("version", "1.2"),
            Handshake::Reject => {
                Frame::new(Command::Error).with_header("message", "Invalid JWT token")
            }
            Handshake::Refuse => {
                return Err(SessionError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )))
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Some(Ok(reply.encode()))).unwrap();
        *self.server.lock().unwrap() = Some(tx);

        Ok(Box::new(MockTransport {
            incoming: rx,
            sent: Arc::clone(&self.sent),
            closes: Arc::clone(&self.closes),
            fail_subscribe: self.fail_subscribe.load(Ordering::SeqCst),
        }))
    }
}

// ── MockApi ─────────────────────────────────────────────────────────

/// One recorded REST call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub endpoint: &'static str,
    pub token: Option<String>,
}

/// In-memory stand-in for the matchmaking server.
///
/// Knows one account (`alice` / `secret`, token `t1`), keeps a real queue so
/// a join shows up in the next status snapshot, and records every call.
pub struct MockApi {
    calls: StdMutex<Vec<Call>>,
    valid_tokens: StdMutex<Vec<String>>,
    accounts: StdMutex<HashMap<String, String>>,
    queue: StdMutex<Vec<QueuePlayer>>,
    results: StdMutex<Vec<MatchEvent>>,
    limits: StdMutex<HashMap<&'static str, u32>>,
    validate_unreachable: AtomicBool,
    notifications_fail: AtomicBool,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        let mut accounts = HashMap::new();
        accounts.insert("alice".to_string(), "secret".to_string());
        Arc::new(Self {
            calls: StdMutex::new(Vec::new()),
            valid_tokens: StdMutex::new(vec!["t1".to_string()]),
            accounts: StdMutex::new(accounts),
            queue: StdMutex::new(Vec::new()),
            results: StdMutex::new(Vec::new()),
            limits: StdMutex::new(HashMap::new()),
            validate_unreachable: AtomicBool::new(false),
            notifications_fail: AtomicBool::new(false),
        })
    }

    /// Make the server forget every token, as after a restart or expiry.
    pub fn revoke_all(&self) {
        self.valid_tokens.lock().unwrap().clear();
    }

    pub fn set_validate_unreachable(&self) {
        self.validate_unreachable.store(true, Ordering::SeqCst);
    }

    pub fn set_notifications_fail(&self) {
        self.notifications_fail.store(true, Ordering::SeqCst);
    }

    pub fn add_result(&self, event: MatchEvent) {
        self.results.lock().unwrap().push(event);
    }

    /// The `limit` sent with the last call to `endpoint`.
    pub fn last_limit(&self, endpoint: &str) -> Option<u32> {
        self.limits.lock().unwrap().get(endpoint).copied()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    fn record(&self, endpoint: &'static str, token: Option<&str>) {
        self.calls.lock().unwrap().push(Call {
            endpoint,
            token: token.map(str::to_string),
        });
    }

    fn authorize(&self, token: &str) -> Result<(), SessionError> {
        if self.valid_tokens.lock().unwrap().iter().any(|t| t == token) {
            Ok(())
        } else {
            Err(SessionError::InvalidCredential)
        }
    }
}

#[async_trait]
impl matchmaking_session::MatchmakingApi for MockApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, SessionError> {
        self.record("login", None);
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(&request.username) {
            Some(password) if *password == request.password => Ok(AuthResponse {
                token: Some("t1".into()),
                username: Some(request.username.clone()),
                role: Some("USER".into()),
                ..AuthResponse::default()
            }),
            _ => Err(SessionError::Rejected {
                message: "Invalid username or password".into(),
            }),
        }
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, SessionError> {
        self.record("register", None);
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&request.username) {
            return Err(SessionError::Rejected {
                message: "Registration failed: Username already exists".into(),
            });
        }
        accounts.insert(request.username.clone(), request.password.clone());
        Ok(AuthResponse {
            message: Some("User registered successfully".into()),
            ..AuthResponse::default()
        })
    }

    async fn validate(&self, token: &str) -> Result<ValidateResponse, SessionError> {
        self.record("validate", Some(token));
        if self.validate_unreachable.load(Ordering::SeqCst) {
            return Err(SessionError::Status {
                status: 503,
                path: "/api/auth/validate".into(),
            });
        }
        let valid = self.authorize(token).is_ok();
        Ok(ValidateResponse {
            valid,
            username: valid.then(|| "alice".to_string()),
            expires_at: None,
        })
    }

    async fn queue_status(&self, token: &str) -> Result<QueueStatus, SessionError> {
        self.record("status", Some(token));
        self.authorize(token)?;
        let players = self.queue.lock().unwrap().clone();
        Ok(QueueStatus {
            queue_size: Some(players.len() as u64),
            queue_players: players,
            timestamp: Some(0),
        })
    }

    async fn join(
        &self,
        token: &str,
        request: &JoinRequest,
    ) -> Result<QueueActionResponse, SessionError> {
        self.record("join", Some(token));
        self.authorize(token)?;
        let mut queue = self.queue.lock().unwrap();
        if queue.iter().any(|p| p.player_id == request.player_id) {
            return Ok(QueueActionResponse {
                success: false,
                message: Some("Player already in queue".into()),
            });
        }
        queue.push(QueuePlayer {
            player_id: request.player_id.clone(),
            display_name: Some(request.player_id.clone()),
            rating: i32::try_from(request.elo).ok(),
            online: true,
            last_active: None,
        });
        Ok(QueueActionResponse {
            success: true,
            message: Some("Player added to queue".into()),
        })
    }

    async fn leave(
        &self,
        token: &str,
        player_id: &str,
    ) -> Result<QueueActionResponse, SessionError> {
        self.record("leave", Some(token));
        self.authorize(token)?;
        let mut queue = self.queue.lock().unwrap();
        let before = queue.len();
        queue.retain(|p| p.player_id != player_id);
        let removed = queue.len() < before;
        Ok(QueueActionResponse {
            success: removed,
            message: Some(if removed {
                "Player removed from queue".into()
            } else {
                "Player not found in queue".into()
            }),
        })
    }

    async fn resume(&self, token: &str) -> Result<(), SessionError> {
        self.record("resume", Some(token));
        if self.notifications_fail.load(Ordering::SeqCst) {
            return Err(SessionError::Status {
                status: 500,
                path: "/api/match/resume".into(),
            });
        }
        Ok(())
    }

    async fn pause(&self, token: &str) -> Result<(), SessionError> {
        self.record("pause", Some(token));
        if self.notifications_fail.load(Ordering::SeqCst) {
            return Err(SessionError::Status {
                status: 500,
                path: "/api/match/pause".into(),
            });
        }
        Ok(())
    }

    async fn player(&self, token: &str, player_id: &str) -> Result<PlayerLookup, SessionError> {
        self.record("player", Some(token));
        self.authorize(token)?;
        let player = self
            .queue
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.player_id == player_id)
            .cloned();
        Ok(PlayerLookup {
            success: player.is_some(),
            message: player.is_none().then(|| "Player not found".to_string()),
            player,
        })
    }

    async fn recent_results(&self, token: &str, limit: u32) -> Result<MatchResults, SessionError> {
        self.record("results", Some(token));
        self.limits.lock().unwrap().insert("results", limit);
        self.authorize(token)?;
        let results: Vec<_> = self
            .results
            .lock()
            .unwrap()
            .iter()
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(MatchResults {
            success: true,
            count: Some(results.len() as u64),
            results,
        })
    }

    async fn history(
        &self,
        token: &str,
        player_id: Option<&str>,
        limit: u32,
    ) -> Result<MatchResults, SessionError> {
        self.record("history", Some(token));
        self.limits.lock().unwrap().insert("history", limit);
        self.authorize(token)?;
        let results: Vec<_> = self
            .results
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                player_id.is_none_or(|id| {
                    m.player_a.as_deref() == Some(id) || m.player_b.as_deref() == Some(id)
                })
            })
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(MatchResults {
            success: true,
            count: Some(results.len() as u64),
            results,
        })
    }

    /// Ranks the queued players by rating.
    async fn leaderboard(&self, token: &str, limit: u32) -> Result<Leaderboard, SessionError> {
        self.record("leaderboard", Some(token));
        self.limits.lock().unwrap().insert("leaderboard", limit);
        self.authorize(token)?;
        let mut players = self.queue.lock().unwrap().clone();
        players.sort_by(|a, b| b.rating.cmp(&a.rating));
        let leaders: Vec<_> = players
            .into_iter()
            .take(limit as usize)
            .zip(1..)
            .map(|(p, rank)| LeaderboardEntry {
                rank: Some(rank),
                player_id: Some(p.player_id),
                display_name: p.display_name,
                rating: p.rating,
                ..LeaderboardEntry::default()
            })
            .collect();
        Ok(Leaderboard {
            success: true,
            count: Some(leaders.len() as u64),
            leaders,
        })
    }

    async fn matchmaking_enabled(&self, token: &str) -> Result<MatchmakingStatus, SessionError> {
        self.record("enabled", Some(token));
        self.authorize(token)?;
        Ok(MatchmakingStatus {
            enabled: true,
            ws_connections: Some(1),
            ws_active: Some(true),
        })
    }
}

// ── Session helpers ─────────────────────────────────────────────────

/// A controller wired to mocks, plus the handles tests inspect.
pub struct Harness {
    pub session: SessionController,
    pub events: SessionEvents,
    pub api: Arc<MockApi>,
    pub connector: Arc<MockConnector>,
}

impl Harness {
    /// Drain every event currently queued.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

/// Build a controller. `stored` pre-populates the credential store as if an
/// earlier process had logged in.
pub fn harness(stored: Option<(&str, &str)>) -> Harness {
    let credentials = CredentialStore::load(MemoryStore::new());
    if let Some((token, name)) = stored {
        credentials.set(token, name).unwrap();
    }
    harness_with(credentials)
}

/// Build a controller over the given store.
pub fn harness_with(credentials: CredentialStore) -> Harness {
    harness_config(credentials, test_config())
}

/// Configuration used by [`harness`]: short timeouts for a mock transport.
pub fn test_config() -> SessionConfig {
    SessionConfig::new("http://localhost:8080")
        .with_shutdown_timeout(Duration::from_millis(200))
        .with_handshake_timeout(Duration::from_secs(2))
}

/// Build a controller over the given store and configuration.
pub fn harness_config(credentials: CredentialStore, config: SessionConfig) -> Harness {
    let api = MockApi::new();
    let connector = MockConnector::new();
    let (session, events) = SessionController::new(
        config,
        Arc::clone(&api) as Arc<dyn matchmaking_session::MatchmakingApi>,
        Arc::clone(&connector) as Arc<dyn Connector>,
        credentials,
    );
    Harness {
        session,
        events,
        api,
        connector,
    }
}

/// Poll `check` until it holds, failing after two seconds.
///
/// For effects of detached tasks (resume/pause notifications, the event
/// pump) that the test cannot await directly.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A `MESSAGE` frame carrying a match result.
pub fn match_frame(match_id: &str, winner: &str) -> Frame {
    let body = serde_json::json!({
        "matchId": match_id,
        "playerA": "alice",
        "playerB": "bob",
        "oldEloA": 1200,
        "oldEloB": 1200,
        "newEloA": 1216,
        "newEloB": 1184,
        "winner": winner,
        "playedAt": "2026-01-01T12:00:00Z"
    });
    Frame::new(Command::Message)
        .with_header("destination", "/topic/matches")
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
}
