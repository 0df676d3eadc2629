//! # Matchmaking Session
//!
//! Client-side session controller for a matchmaking service: bearer-token
//! authentication, a live STOMP match-result feed, and queue polling,
//! reconciled into one session state machine.
//!
//! ## Features
//!
//! - **Fail-closed auth**: a stored credential is validated on start; any
//!   rejection clears it and redirects to login
//! - **Realtime link**: one STOMP connection over any [`Transport`], at most
//!   one live subscription, best-effort resume/pause notifications
//! - **Queue poller**: on-demand snapshots plus a single cancellable
//!   auto-refresh task
//! - **WebSocket built-in**: default `transport-websocket` feature provides
//!   `WebSocketTransport` and `WebSocketConnector`
//! - **Event-driven**: receive typed [`SessionEvent`]s from [`SessionEvents`];
//!   control events are never dropped
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use matchmaking_session::{
//!     CredentialStore, FileStore, HttpApi, SessionConfig, SessionController, SessionState,
//!     WebSocketConnector,
//! };
//!
//! # async fn run() -> matchmaking_session::Result<()> {
//! let config = SessionConfig::new("http://localhost:8080");
//! let api = Arc::new(HttpApi::new(&config.base_url, config.request_timeout)?);
//! let connector = Arc::new(WebSocketConnector::new(&config.ws_url, config.handshake_timeout));
//! let store = CredentialStore::load(FileStore::new("session.json"));
//!
//! let (mut session, _events) = SessionController::new(config, api, connector, store);
//! if session.start().await == SessionState::AuthenticatedDisconnected {
//!     session.connect().await?;
//!     session.join_queue(Some("alice"), Some(1200)).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod credential;
pub mod error;
pub mod error_category;
pub mod event;
pub mod poller;
pub mod protocol;
pub mod realtime;
pub mod session;
pub mod stomp;
pub mod transport;
pub mod transports;
pub mod view;

// Re-export primary types for ergonomic imports.
pub use api::{HttpApi, MatchmakingApi};
pub use auth::{AuthGate, AuthOutcome};
pub use config::SessionConfig;
pub use credential::{CredentialStore, FileStore, KeyValueStore, MemoryStore};
pub use error::{Result, SessionError};
pub use error_category::ErrorCategory;
pub use event::{SessionEvent, SessionEvents, SessionState};
pub use protocol::{Credential, MatchEvent, QueuePlayer, QueueSnapshot};
pub use realtime::{LinkState, RealtimeLink};
pub use session::SessionController;
pub use transport::{Connector, Transport};
pub use view::SessionView;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
