//! Wire-compatible payload types for the matchmaking REST and realtime APIs.
//!
//! Every type in this module produces and accepts the same JSON as the
//! matchmaking server. Key adaptations:
//!
//! - Field names are `camelCase` on the wire (`playerId`, `oldEloA`, ...)
//! - Timestamps stay as strings; numeric epoch seconds are stringified
//! - Nullable server fields are `Option` with `#[serde(default)]`

use serde::{Deserialize, Deserializer, Serialize};

// ── Credential ──────────────────────────────────────────────────────

/// The bearer token and display name of the logged-in operator.
///
/// Exactly one credential is active per session. It is owned by the
/// [`CredentialStore`](crate::credential::CredentialStore); other components
/// receive clones for the duration of a call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Opaque bearer token presented on every authenticated call.
    pub token: String,
    /// Name shown to the operator.
    pub display_name: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            display_name: display_name.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

// ── Auth endpoints ──────────────────────────────────────────────────

/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Body of `POST /api/auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Response of the login and register endpoints.
///
/// On failure only `message` is populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /api/auth/validate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub expires_at: Option<String>,
}

// ── Queue endpoints ─────────────────────────────────────────────────

/// One waiting player as listed by `GET /api/match/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePlayer {
    #[serde(default)]
    pub player_id: String,
    #[serde(rename = "username", default)]
    pub display_name: Option<String>,
    #[serde(rename = "elo", default)]
    pub rating: Option<i32>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub online: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_active: Option<String>,
}

/// Raw response of `GET /api/match/status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    #[serde(default)]
    pub queue_size: Option<u64>,
    #[serde(default)]
    pub queue_players: Vec<QueuePlayer>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// A full point-in-time listing of the players waiting to be matched.
///
/// Each refresh replaces the previous snapshot wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    /// Size reported by the server, falling back to `players.len()`.
    pub queue_size: u64,
    /// Players in queue order.
    pub players: Vec<QueuePlayer>,
}

impl QueueSnapshot {
    /// Returns `true` if a player with the given id is waiting.
    pub fn contains(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.player_id == player_id)
    }
}

impl From<QueueStatus> for QueueSnapshot {
    fn from(status: QueueStatus) -> Self {
        let queue_size = status
            .queue_size
            .unwrap_or(status.queue_players.len() as u64);
        Self {
            queue_size,
            players: status.queue_players,
        }
    }
}

/// Body of `POST /api/match/join`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub player_id: String,
    pub elo: u32,
}

/// Response of the join and leave endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueActionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl QueueActionResponse {
    /// The server message, or a generic one derived from `success`.
    pub fn summary(&self, ok: &str, failed: &str) -> String {
        match &self.message {
            Some(message) if !message.is_empty() => message.clone(),
            _ if self.success => ok.to_string(),
            _ => failed.to_string(),
        }
    }
}

/// Response of `GET /api/match/player/{playerId}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerLookup {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub player: Option<QueuePlayer>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /api/match/results?limit=n` and of
/// `GET /api/match/history?playerId=&limit=n`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResults {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Vec<MatchEvent>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// One row of the leaderboard, ordered by rating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(rename = "username", default)]
    pub display_name: Option<String>,
    #[serde(rename = "elo", default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub wins: Option<u64>,
    #[serde(default)]
    pub losses: Option<u64>,
    #[serde(default)]
    pub games: Option<u64>,
}

/// Response of `GET /api/match/leaderboard?limit=n`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Leaderboard {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub leaders: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// Response of `GET /api/match/enabled`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchmakingStatus {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ws_connections: Option<u64>,
    #[serde(default)]
    pub ws_active: Option<bool>,
}

// ── Realtime payloads ───────────────────────────────────────────────

/// A match result pushed on the match topic.
///
/// Ephemeral: rendered into the match log, never persisted or deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEvent {
    #[serde(default)]
    pub match_id: Option<String>,
    #[serde(default)]
    pub player_a: Option<String>,
    #[serde(default)]
    pub player_b: Option<String>,
    #[serde(rename = "oldEloA", default)]
    pub old_rating_a: Option<i32>,
    #[serde(rename = "oldEloB", default)]
    pub old_rating_b: Option<i32>,
    #[serde(rename = "newEloA", default)]
    pub new_rating_a: Option<i32>,
    #[serde(rename = "newEloB", default)]
    pub new_rating_b: Option<i32>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub played_at: Option<String>,
}

// ── Lenient field decoders ──────────────────────────────────────────

/// Accepts an ISO-8601 string, epoch seconds as a number, or `null`.
///
/// The server's JSON mapper emits `Instant` either way depending on its
/// configuration.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Text(text)) if text.is_empty() => None,
        Some(Raw::Text(text)) => Some(text),
        Some(Raw::Integer(secs)) => Some(secs.to_string()),
        Some(Raw::Float(secs)) => Some(format!("{secs}")),
    })
}

/// Treats `null` as `false`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
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
    use serde_json::json;

    #[test]
    fn credential_debug_redacts_token() {
        let credential = Credential::new("secret-token", "alice");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn queue_status_decodes_server_shape() {
        let status: QueueStatus = serde_json::from_value(json!({
            "queueSize": 2,
            "queuePlayers": [
                {"playerId": "alice", "username": "alice", "elo": 1200, "online": true,
                 "lastActive": "2026-01-01T00:00:00Z"},
                {"playerId": "bob", "username": null, "elo": 1350, "online": null,
                 "lastActive": 1767225600.5}
            ],
            "timestamp": 1767225600000_i64
        }))
        .unwrap();

        let snapshot = QueueSnapshot::from(status);
        assert_eq!(snapshot.queue_size, 2);
        assert!(snapshot.contains("alice"));
        assert_eq!(snapshot.players[0].rating, Some(1200));
        assert!(snapshot.players[0].online);
        assert!(!snapshot.players[1].online);
        assert_eq!(snapshot.players[1].display_name, None);
        assert_eq!(snapshot.players[1].last_active.as_deref(), Some("1767225600.5"));
    }

    #[test]
    fn queue_size_falls_back_to_player_count() {
        let status: QueueStatus = serde_json::from_value(json!({
            "queuePlayers": [{"playerId": "a"}, {"playerId": "b"}, {"playerId": "c"}]
        }))
        .unwrap();
        assert_eq!(QueueSnapshot::from(status).queue_size, 3);
    }

    #[test]
    fn match_event_uses_elo_wire_names() {
        let event: MatchEvent = serde_json::from_value(json!({
            "matchId": "m-1",
            "playerA": "alice",
            "playerB": "bob",
            "oldEloA": 1200,
            "oldEloB": 1210,
            "newEloA": 1216,
            "newEloB": 1194,
            "winner": "alice",
            "playedAt": "2026-01-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(event.winner.as_deref(), Some("alice"));
        assert_eq!(event.new_rating_a, Some(1216));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["oldEloB"], 1210);
        assert_eq!(back["playedAt"], "2026-01-01T12:00:00Z");
    }

    #[test]
    fn join_request_serializes_camel_case() {
        let body = serde_json::to_value(JoinRequest {
            player_id: "alice".into(),
            elo: 1200,
        })
        .unwrap();
        assert_eq!(body, json!({"playerId": "alice", "elo": 1200}));
    }

    #[test]
    fn action_summary_prefers_server_message() {
        let with_message = QueueActionResponse {
            success: false,
            message: Some("Player not found in queue".into()),
        };
        assert_eq!(
            with_message.summary("Left queue", "Not found"),
            "Player not found in queue"
        );

        let bare = QueueActionResponse {
            success: true,
            message: None,
        };
        assert_eq!(bare.summary("Joined queue", "Failed"), "Joined queue");
    }
}
