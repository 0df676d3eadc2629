#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for `SessionController`.
//!
//! Drive the controller against the in-memory `MockApi` and the scripted
//! `MockConnector` from `tests/common`, checking state transitions, the
//! frames and notifications sent, and the events delivered.

mod common;

use std::time::Duration;

use matchmaking_session::credential::{FileStore, KeyValueStore, TOKEN_KEY, USERNAME_KEY};
use matchmaking_session::stomp::Command;
use matchmaking_session::{CredentialStore, MatchEvent, SessionError, SessionEvent, SessionState};

use common::{
    eventually, harness, harness_config, harness_with, match_frame, test_config, Handshake,
    Harness,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// A harness with a stored valid credential, already validated.
async fn signed_in() -> Harness {
    let mut h = harness(Some(("t1", "alice")));
    assert_eq!(h.session.start().await, SessionState::AuthenticatedDisconnected);
    h
}

/// Receive events until a match result arrives.
async fn next_match(h: &mut Harness) -> MatchEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match h.events.recv().await {
                Some(SessionEvent::Match(event)) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for a match event")
}

/// Receive events until the link reports a server-side close.
async fn next_link_closed(h: &mut Harness) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match h.events.recv().await {
                Some(SessionEvent::LinkClosed { reason }) => return reason,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for LinkClosed")
}

fn redirects(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::RedirectToLogin { .. }))
        .count()
}

// ════════════════════════════════════════════════════════════════════
// Validation
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn stored_credential_validates_and_join_shows_in_snapshot() {
    let mut h = harness(Some(("t1", "alice")));

    let state = h.session.start().await;
    assert_eq!(state, SessionState::AuthenticatedDisconnected);
    assert_eq!(h.session.display_name().as_deref(), Some("alice"));

    let events = h.drain();
    assert!(events.contains(&SessionEvent::StateChanged(SessionState::Validating)));
    assert!(events.contains(&SessionEvent::StateChanged(
        SessionState::AuthenticatedDisconnected
    )));
    assert_eq!(redirects(&events), 0);

    let resp = h.session.join_queue(Some("alice"), Some(1200)).await.unwrap();
    assert!(resp.success);

    let snapshot = h.session.refresh_queue().await.unwrap();
    assert!(snapshot.contains("alice"));
    assert!(h.session.view().queue().unwrap().contains("alice"));
}

#[tokio::test]
async fn rejected_credential_is_cleared_and_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let store = CredentialStore::load(FileStore::new(&path));
    store.set("stale-token", "alice").unwrap();

    let mut h = harness_with(store);
    assert_eq!(h.session.start().await, SessionState::Unauthenticated);
    assert!(h.session.display_name().is_none());

    // Gone from disk too.
    let file = FileStore::new(&path);
    assert_eq!(file.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(file.get(USERNAME_KEY).unwrap(), None);

    assert_eq!(redirects(&h.drain()), 1);
}

#[tokio::test]
async fn unreachable_validation_fails_closed() {
    let mut h = harness(Some(("t1", "alice")));
    h.api.set_validate_unreachable();

    assert_eq!(h.session.start().await, SessionState::Unauthenticated);
    assert_eq!(redirects(&h.drain()), 1);

    // The cleared credential is not used for anything afterwards.
    let err = h.session.refresh_queue().await.unwrap_err();
    assert!(matches!(err, SessionError::AuthenticationRequired));
    assert_eq!(h.api.count("status"), 0);
}

#[tokio::test]
async fn start_without_credential_makes_no_request() {
    let mut h = harness(None);
    assert_eq!(h.session.start().await, SessionState::Unauthenticated);
    assert!(h.api.calls().is_empty());
    assert_eq!(redirects(&h.drain()), 1);
}

// ════════════════════════════════════════════════════════════════════
// Login / register
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn login_stores_and_validates() {
    let mut h = harness(None);

    let err = h.session.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, SessionError::Rejected { ref message } if message == "Invalid username or password"));
    assert_eq!(h.session.state(), SessionState::Unauthenticated);

    let state = h.session.login("alice", "secret").await.unwrap();
    assert_eq!(state, SessionState::AuthenticatedDisconnected);
    assert_eq!(h.session.display_name().as_deref(), Some("alice"));
    assert_eq!(h.api.count("validate"), 1);

    let err = h.session.login("alice", "secret").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidInput(_)));
}

#[tokio::test]
async fn login_rejects_empty_fields_locally() {
    let mut h = harness(None);
    let err = h.session.login("  ", "secret").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidInput(_)));
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn register_does_not_log_in() {
    let h = harness(None);

    let err = h.session.register("alice", "pw", "a@example.com").await.unwrap_err();
    let SessionError::Rejected { message } = err else {
        panic!("expected rejection, got {err:?}");
    };
    assert_eq!(
        message,
        "Username already exists. Please choose a different username."
    );

    let message = h.session.register("bob", "pw", "b@example.com").await.unwrap();
    assert!(message.contains("Registration successful"));
    assert_eq!(h.session.state(), SessionState::Unauthenticated);

    let err = h.session.register("carol", "pw", "").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidInput(_)));
}

// ════════════════════════════════════════════════════════════════════
// Realtime link
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_without_credential_opens_nothing() {
    let mut h = harness(None);

    let err = h.session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::AuthenticationRequired));
    assert_eq!(h.connector.connects(), 0);
    assert_eq!(h.session.state(), SessionState::Unauthenticated);
    assert_eq!(redirects(&h.drain()), 1);
}

#[tokio::test]
async fn connect_authenticates_resumes_and_subscribes_once() {
    let mut h = signed_in().await;

    h.session.connect().await.unwrap();
    h.session.connect().await.unwrap();
    assert_eq!(h.session.state(), SessionState::AuthenticatedConnected);

    assert_eq!(h.connector.connects(), 1);
    assert_eq!(h.connector.count(Command::Subscribe), 1);

    let frames = h.connector.sent_frames();
    assert_eq!(frames[0].command, Command::Connect);
    assert_eq!(frames[0].header("Authorization"), Some("Bearer t1"));
    assert_eq!(frames[1].header("destination"), Some("/topic/matches"));

    let api = h.api.clone();
    eventually("resume notification", || api.count("resume") == 1).await;
    let resume = api.calls().into_iter().find(|c| c.endpoint == "resume").unwrap();
    assert_eq!(resume.token.as_deref(), Some("t1"));
}

#[tokio::test]
async fn disconnect_releases_subscription_and_pauses() {
    let mut h = signed_in().await;
    h.session.connect().await.unwrap();

    h.session.disconnect().await;
    assert_eq!(h.session.state(), SessionState::AuthenticatedDisconnected);
    assert_eq!(
        h.connector.sent_commands(),
        vec![
            Command::Connect,
            Command::Subscribe,
            Command::Unsubscribe,
            Command::Disconnect
        ]
    );
    assert_eq!(h.connector.closes(), 1);

    let api = h.api.clone();
    eventually("pause notification", || api.count("pause") == 1).await;

    // Second disconnect is a no-op: no frames, no extra pause.
    h.session.disconnect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.connector.sent_commands().len(), 4);
    assert_eq!(api.count("pause"), 1);
}

#[tokio::test]
async fn repeated_cycles_never_hold_two_subscriptions() {
    let mut h = signed_in().await;

    for cycle in 1..=3 {
        h.session.connect().await.unwrap();
        assert_eq!(
            h.connector.count(Command::Subscribe),
            h.connector.count(Command::Unsubscribe) + 1,
            "cycle {cycle}"
        );
        h.session.disconnect().await;
        assert_eq!(
            h.connector.count(Command::Subscribe),
            h.connector.count(Command::Unsubscribe)
        );
    }
    assert_eq!(h.connector.connects(), 3);
}

#[tokio::test]
async fn rejected_handshake_stays_disconnected_without_retry() {
    let mut h = signed_in().await;
    h.connector.set_handshake(Handshake::Reject);

    let err = h.session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Handshake(ref m) if m == "Invalid JWT token"));
    assert_eq!(h.session.state(), SessionState::AuthenticatedDisconnected);
    assert_eq!(h.connector.count(Command::Subscribe), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.connector.connects(), 1);
    assert_eq!(h.api.count("resume"), 0);

    // A manual retry works once the server accepts.
    h.connector.set_handshake(Handshake::Accept);
    h.session.connect().await.unwrap();
    assert_eq!(h.session.state(), SessionState::AuthenticatedConnected);
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let mut h = signed_in().await;
    h.connector.set_handshake(Handshake::Refuse);

    let err = h.session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Io(_)), "{err:?}");
    assert_eq!(h.session.state(), SessionState::AuthenticatedDisconnected);
    assert!(h.session.view().log_lines()[0].contains("Connect failed"));
}

#[tokio::test]
async fn failed_subscribe_tears_the_cycle_down() {
    let mut h = signed_in().await;
    h.connector.fail_subscribe();

    let err = h.session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::TransportSend(_)));
    assert_eq!(h.session.state(), SessionState::AuthenticatedDisconnected);

    let api = h.api.clone();
    eventually("pause after failed subscribe", || api.count("pause") == 1).await;
}

#[tokio::test]
async fn notification_failures_never_change_link_state() {
    let mut h = signed_in().await;
    h.api.set_notifications_fail();

    h.session.connect().await.unwrap();
    let api = h.api.clone();
    eventually("resume attempt", || api.count("resume") == 1).await;
    assert_eq!(h.session.state(), SessionState::AuthenticatedConnected);

    h.session.disconnect().await;
    eventually("pause attempt", || api.count("pause") == 1).await;
    assert_eq!(h.session.state(), SessionState::AuthenticatedDisconnected);
}

#[tokio::test]
async fn server_drop_is_reported_and_reconnect_works() {
    let mut h = signed_in().await;
    h.session.connect().await.unwrap();

    h.connector.drop_connection();
    assert_eq!(next_link_closed(&mut h).await, None);
    assert_eq!(h.session.state(), SessionState::AuthenticatedDisconnected);

    h.session.connect().await.unwrap();
    assert_eq!(h.session.state(), SessionState::AuthenticatedConnected);
    assert_eq!(h.connector.connects(), 2);
    assert_eq!(h.connector.count(Command::Subscribe), 2);
}

#[tokio::test]
async fn malformed_match_payload_is_discarded() {
    let mut h = signed_in().await;
    h.session.connect().await.unwrap();

    h.connector.push(
        matchmaking_session::stomp::Frame::new(Command::Message).with_body("{not json"),
    );
    h.connector.push(match_frame("m-2", "bob"));

    let event = next_match(&mut h).await;
    assert_eq!(event.match_id.as_deref(), Some("m-2"));
    assert_eq!(h.session.view().matches().len(), 1);
    assert_eq!(h.session.state(), SessionState::AuthenticatedConnected);
}

// ════════════════════════════════════════════════════════════════════
// Concurrent regions
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pushed_match_and_poll_do_not_clobber_each_other() {
    let mut h = signed_in().await;
    h.session.join_queue(Some("carol"), None).await.unwrap();
    h.session.connect().await.unwrap();

    h.connector.push(match_frame("m-1", "alice"));
    let snapshot = h.session.refresh_queue().await.unwrap();
    assert!(snapshot.contains("carol"));

    let event = next_match(&mut h).await;
    assert_eq!(event.winner.as_deref(), Some("alice"));

    let view = h.session.view();
    assert_eq!(view.matches()[0].winner.as_deref(), Some("alice"));
    assert!(view.queue().unwrap().contains("carol"));

    // A second snapshot replaces the table but leaves the match log alone.
    h.session.leave_queue(Some("carol")).await.unwrap();
    h.session.refresh_queue().await.unwrap();
    assert!(!view.queue().unwrap().contains("carol"));
    assert_eq!(view.matches().len(), 1);
}

// ════════════════════════════════════════════════════════════════════
// Logout and expiry
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn logout_while_connected_tears_down_and_redirects_once() {
    let mut h = signed_in().await;
    h.session.connect().await.unwrap();
    h.session.start_auto_refresh(None).unwrap();
    h.drain();

    h.session.logout().await;

    assert_eq!(h.session.state(), SessionState::Unauthenticated);
    assert!(h.session.display_name().is_none());
    assert!(!h.session.is_auto_refreshing());
    assert_eq!(h.connector.count(Command::Unsubscribe), 1);

    let api = h.api.clone();
    eventually("pause on logout", || api.count("pause") == 1).await;
    let pause = api.calls().into_iter().find(|c| c.endpoint == "pause").unwrap();
    assert_eq!(pause.token.as_deref(), Some("t1"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = h.drain();
    assert_eq!(redirects(&events), 1);
    assert!(events.contains(&SessionEvent::StateChanged(SessionState::Unauthenticated)));

    // Credential is gone: connect is refused without a transport.
    assert!(h.session.connect().await.is_err());
    assert_eq!(h.connector.connects(), 1);
}

#[tokio::test]
async fn logout_while_disconnected_sends_no_pause() {
    let mut h = signed_in().await;
    h.session.logout().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.api.count("pause"), 0);
    assert_eq!(h.session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn rejected_request_expires_the_session() {
    let mut h = signed_in().await;
    h.session.connect().await.unwrap();
    h.drain();
    h.api.revoke_all();

    let err = h.session.refresh_queue().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidCredential));
    assert_eq!(h.session.state(), SessionState::Unauthenticated);
    assert_eq!(h.connector.count(Command::Unsubscribe), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(redirects(&h.drain()), 1);
}

#[tokio::test(start_paused = true)]
async fn auto_refresh_rejection_expires_the_session() {
    let mut h = signed_in().await;
    h.session
        .start_auto_refresh(Some(Duration::from_millis(1000)))
        .unwrap();
    h.drain();
    h.api.revoke_all();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.session.state(), SessionState::Unauthenticated);
    assert!(!h.session.is_auto_refreshing());

    let events = h.drain();
    assert_eq!(redirects(&events), 1);
    assert!(events.contains(&SessionEvent::AuthenticationRequired));
}

#[tokio::test(start_paused = true)]
async fn logout_redirect_survives_an_undrained_event_channel() {
    let mut h = signed_in().await;
    h.session
        .start_auto_refresh(Some(Duration::from_millis(1000)))
        .unwrap();

    // Five minutes of snapshots nobody reads.
    tokio::time::sleep(Duration::from_secs(300)).await;
    h.session.logout().await;

    let events = h.drain();
    assert_eq!(redirects(&events), 1);
    assert!(events.contains(&SessionEvent::StateChanged(SessionState::Unauthenticated)));
    let snapshots = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::QueueRefreshed(_)))
        .count();
    assert!(snapshots <= 256, "{snapshots}");
}

#[tokio::test(start_paused = true)]
async fn expiry_is_delivered_when_updates_back_up() {
    let store = CredentialStore::load(matchmaking_session::MemoryStore::new());
    store.set("t1", "alice").unwrap();
    let mut h = harness_config(store, test_config().with_event_channel_capacity(2));
    h.session.start().await;
    h.session
        .start_auto_refresh(Some(Duration::from_millis(1000)))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    h.api.revoke_all();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(h.session.state(), SessionState::Unauthenticated);

    let events = h.drain();
    assert_eq!(redirects(&events), 1);
    assert!(events.contains(&SessionEvent::AuthenticationRequired));
    assert!(events.contains(&SessionEvent::StateChanged(SessionState::Unauthenticated)));
    let snapshots = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::QueueRefreshed(_)))
        .count();
    assert_eq!(snapshots, 2);
}

// ════════════════════════════════════════════════════════════════════
// Queue operations
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn blank_player_id_is_rejected_before_any_request() {
    let mut h = signed_in().await;
    let joins_before = h.api.count("join");

    let err = h.session.join_queue(Some("   "), None).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidInput(ref m) if m == "Enter a player ID"));

    let err = h.session.leave_queue(None).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidInput(_)));

    assert_eq!(h.api.count("join"), joins_before);
    assert_eq!(h.api.count("leave"), 0);
}

#[tokio::test]
async fn join_defaults_and_leave_fallback() {
    let mut h = signed_in().await;

    let resp = h.session.join_queue(None, None).await.unwrap();
    assert!(resp.success);
    let generated = h.session.last_player_id().unwrap().to_string();
    assert!(generated.starts_with("player-"));

    let snapshot = h.session.refresh_queue().await.unwrap();
    let player = snapshot
        .players
        .iter()
        .find(|p| p.player_id == generated)
        .unwrap();
    assert_eq!(player.rating, Some(1200));

    let resp = h.session.leave_queue(Some("")).await.unwrap();
    assert!(resp.success);
    assert!(!h.session.refresh_queue().await.unwrap().contains(&generated));
}

#[tokio::test]
async fn unsuccessful_leave_is_returned_not_raised() {
    let mut h = signed_in().await;
    let resp = h.session.leave_queue(Some("ghost")).await.unwrap();
    assert!(!resp.success);
    assert_eq!(resp.message.as_deref(), Some("Player not found in queue"));
}

#[tokio::test]
async fn queue_operations_require_login() {
    let mut h = harness(None);

    let err = h.session.join_queue(Some("alice"), None).await.unwrap_err();
    assert!(matches!(err, SessionError::AuthenticationRequired));
    assert!(h.session.start_auto_refresh(None).is_err());
    assert!(h.api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn auto_refresh_twice_leaves_one_timer() {
    let mut h = signed_in().await;
    let baseline = h.api.count("status");

    h.session
        .start_auto_refresh(Some(Duration::from_millis(3000)))
        .unwrap();
    h.session
        .start_auto_refresh(Some(Duration::from_millis(3000)))
        .unwrap();
    assert_eq!(
        h.session.auto_refresh_interval(),
        Some(Duration::from_millis(3000))
    );

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(h.api.count("status"), baseline + 1);

    assert!(h.session.stop_auto_refresh());
    assert!(!h.session.stop_auto_refresh());
    assert_eq!(h.session.auto_refresh_interval(), None);

    tokio::time::sleep(Duration::from_millis(10_000)).await;
    assert_eq!(h.api.count("status"), baseline + 1);
}

// ════════════════════════════════════════════════════════════════════
// Lookups
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn player_results_and_status_lookups() {
    let mut h = signed_in().await;
    h.session.join_queue(Some("alice"), Some(1350)).await.unwrap();

    let lookup = h.session.player("alice").await.unwrap();
    assert!(lookup.success);
    assert_eq!(lookup.player.unwrap().rating, Some(1350));

    let missing = h.session.player("ghost").await.unwrap();
    assert!(!missing.success);

    h.api.add_result(MatchEvent {
        match_id: Some("m-9".into()),
        player_a: Some("alice".into()),
        player_b: Some("bob".into()),
        old_rating_a: Some(1200),
        old_rating_b: Some(1200),
        new_rating_a: Some(1216),
        new_rating_b: Some(1184),
        winner: Some("alice".into()),
        played_at: None,
    });
    let results = h.session.recent_results(None).await.unwrap();
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.count, Some(1));

    let status = h.session.matchmaking_enabled().await.unwrap();
    assert!(status.enabled);
}

fn played(match_id: &str, a: &str, b: &str) -> MatchEvent {
    MatchEvent {
        match_id: Some(match_id.into()),
        player_a: Some(a.into()),
        player_b: Some(b.into()),
        old_rating_a: Some(1200),
        old_rating_b: Some(1200),
        new_rating_a: Some(1216),
        new_rating_b: Some(1184),
        winner: Some(a.into()),
        played_at: None,
    }
}

#[tokio::test]
async fn history_and_leaderboard_lookups() {
    let mut h = signed_in().await;
    h.session.join_queue(Some("alice"), Some(1350)).await.unwrap();
    h.session.join_queue(Some("bob"), Some(1250)).await.unwrap();

    let board = h.session.leaderboard(None).await.unwrap();
    assert_eq!(h.api.last_limit("leaderboard"), Some(50));
    let ranked: Vec<_> = board
        .leaders
        .iter()
        .map(|row| (row.rank.unwrap(), row.player_id.as_deref().unwrap()))
        .collect();
    assert_eq!(ranked, [(1, "alice"), (2, "bob")]);

    h.session.leaderboard(Some(1)).await.unwrap();
    assert_eq!(h.api.last_limit("leaderboard"), Some(1));

    h.api.add_result(played("m-1", "alice", "bob"));
    h.api.add_result(played("m-2", "carol", "dave"));

    // Falls back to the last joined id.
    let history = h.session.history(None, None).await.unwrap();
    assert_eq!(h.api.last_limit("history"), Some(20));
    assert_eq!(history.results.len(), 1);
    assert_eq!(history.results[0].match_id.as_deref(), Some("m-1"));

    let history = h.session.history(Some("carol"), Some(5)).await.unwrap();
    assert_eq!(h.api.last_limit("history"), Some(5));
    assert_eq!(history.results[0].match_id.as_deref(), Some("m-2"));
}

#[tokio::test]
async fn history_without_any_player_lists_everyone() {
    let h = signed_in().await;
    h.api.add_result(played("m-1", "alice", "bob"));
    h.api.add_result(played("m-2", "carol", "dave"));

    let history = h.session.history(Some("  "), Some(0)).await.unwrap();
    assert_eq!(history.count, Some(2));
    assert_eq!(h.api.last_limit("history"), Some(20));
}

#[tokio::test]
async fn lookups_require_login() {
    let mut h = harness(None);
    assert!(matches!(
        h.session.leaderboard(None).await.unwrap_err(),
        SessionError::AuthenticationRequired
    ));
    assert!(matches!(
        h.session.history(Some("alice"), None).await.unwrap_err(),
        SessionError::AuthenticationRequired
    ));
    assert!(h.api.calls().is_empty());
    assert_eq!(redirects(&h.drain()), 2);
}

#[tokio::test]
async fn rejected_lookup_expires_the_session() {
    let mut h = signed_in().await;
    h.drain();
    h.api.revoke_all();

    let err = h.session.leaderboard(None).await.unwrap_err();
    assert!(err.category().is_fatal_to_session());
    assert_eq!(h.session.state(), SessionState::Unauthenticated);
    assert_eq!(redirects(&h.drain()), 1);
}
