//! Transport abstraction for the realtime match feed.
//!
//! The [`Transport`] trait is a bidirectional text message channel carrying
//! one STOMP frame per message. The [`Connector`] trait opens a fresh
//! transport for each connect cycle of the
//! [`RealtimeLink`](crate::realtime::RealtimeLink), so the link can be torn
//! down and re-established without the caller rebuilding anything.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use matchmaking_session::error::SessionError;
//! use matchmaking_session::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), SessionError> {
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SessionError>> {
//!         // Return None when the connection is closed cleanly
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SessionError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self) -> Result<Box<dyn Transport>, SessionError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SessionError;

/// A bidirectional text transport carrying STOMP frames.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because the
/// link loop polls it inside `tokio::select!` next to the teardown signal.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportSend`] or
    /// [`SessionError::TransportClosed`] if the frame could not be sent.
    async fn send(&mut self, frame: String) -> Result<(), SessionError>;

    /// Receive the next text message.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the server closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, SessionError>>;

    /// Close the connection.
    ///
    /// Implementations must release their resources even when the close
    /// handshake fails. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens a new [`Transport`] to the realtime endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open one transport-level connection.
    ///
    /// # Errors
    ///
    /// Returns a transport-category error if the endpoint is unreachable.
    async fn connect(&self) -> Result<Box<dyn Transport>, SessionError>;
}
