//! REST collaborator: the matchmaking server's HTTP endpoints.
//!
//! [`MatchmakingApi`] is the seam between the session state machine and the
//! server. [`HttpApi`] is the production implementation over `reqwest`;
//! tests substitute scripted implementations.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::protocol::{
    AuthResponse, JoinRequest, Leaderboard, LoginRequest, MatchResults, MatchmakingStatus,
    PlayerLookup, QueueActionResponse, QueueStatus, RegisterRequest, ValidateResponse,
};

/// The server endpoints the session consumes.
///
/// Every method taking `token` sends it as `Authorization: Bearer <token>`.
/// A 401/403 reply surfaces as [`SessionError::InvalidCredential`].
#[async_trait]
pub trait MatchmakingApi: Send + Sync + 'static {
    /// `POST /api/auth/login`.
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse>;

    /// `POST /api/auth/register`.
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse>;

    /// `GET /api/auth/validate`.
    async fn validate(&self, token: &str) -> Result<ValidateResponse>;

    /// `GET /api/match/status?_t=<cache-buster>`.
    async fn queue_status(&self, token: &str) -> Result<QueueStatus>;

    /// `POST /api/match/join`.
    async fn join(&self, token: &str, request: &JoinRequest) -> Result<QueueActionResponse>;

    /// `DELETE /api/match/leave/{playerId}`.
    async fn leave(&self, token: &str, player_id: &str) -> Result<QueueActionResponse>;

    /// `POST /api/match/resume`.
    async fn resume(&self, token: &str) -> Result<()>;

    /// `POST /api/match/pause`.
    async fn pause(&self, token: &str) -> Result<()>;

    /// `GET /api/match/player/{playerId}`.
    async fn player(&self, token: &str, player_id: &str) -> Result<PlayerLookup>;

    /// `GET /api/match/results?limit=<n>`.
    async fn recent_results(&self, token: &str, limit: u32) -> Result<MatchResults>;

    /// `GET /api/match/history?playerId=<id>&limit=<n>`; all players when
    /// `player_id` is `None`.
    async fn history(
        &self,
        token: &str,
        player_id: Option<&str>,
        limit: u32,
    ) -> Result<MatchResults>;

    /// `GET /api/match/leaderboard?limit=<n>`.
    async fn leaderboard(&self, token: &str, limit: u32) -> Result<Leaderboard>;

    /// `GET /api/match/enabled`.
    async fn matchmaking_enabled(&self, token: &str) -> Result<MatchmakingStatus>;
}

/// [`MatchmakingApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    base: Url,
    client: Client,
}

impl HttpApi {
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidInput`] if `base_url` is not an
    /// absolute http(s) URL, or [`SessionError::Http`] if the client cannot
    /// be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| SessionError::InvalidInput(format!("base URL {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(SessionError::InvalidInput(format!(
                "base URL {base_url:?} must be http(s)"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Join `segments` onto the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| SessionError::InvalidInput("base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let req = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl MatchmakingApi for HttpApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let url = self.url(&["api", "auth", "login"])?;
        let resp = self.request(Method::POST, url, None).json(request).send().await?;
        read_auth_response(resp, "/api/auth/login").await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let url = self.url(&["api", "auth", "register"])?;
        let resp = self.request(Method::POST, url, None).json(request).send().await?;
        read_auth_response(resp, "/api/auth/register").await
    }

    async fn validate(&self, token: &str) -> Result<ValidateResponse> {
        let url = self.url(&["api", "auth", "validate"])?;
        let resp = self.request(Method::GET, url, Some(token)).send().await?;
        read_json(resp, "/api/auth/validate").await
    }

    async fn queue_status(&self, token: &str) -> Result<QueueStatus> {
        let mut url = self.url(&["api", "match", "status"])?;
        url.query_pairs_mut()
            .append_pair("_t", &cache_buster().to_string());
        let resp = self.request(Method::GET, url, Some(token)).send().await?;
        read_json(resp, "/api/match/status").await
    }

    async fn join(&self, token: &str, request: &JoinRequest) -> Result<QueueActionResponse> {
        let url = self.url(&["api", "match", "join"])?;
        let resp = self
            .request(Method::POST, url, Some(token))
            .json(request)
            .send()
            .await?;
        read_action(resp, "/api/match/join").await
    }

    async fn leave(&self, token: &str, player_id: &str) -> Result<QueueActionResponse> {
        let url = self.url(&["api", "match", "leave", player_id])?;
        let resp = self.request(Method::DELETE, url, Some(token)).send().await?;
        read_action(resp, "/api/match/leave").await
    }

    async fn resume(&self, token: &str) -> Result<()> {
        let url = self.url(&["api", "match", "resume"])?;
        let resp = self.request(Method::POST, url, Some(token)).send().await?;
        check_status(&resp, "/api/match/resume")
    }

    async fn pause(&self, token: &str) -> Result<()> {
        let url = self.url(&["api", "match", "pause"])?;
        let resp = self.request(Method::POST, url, Some(token)).send().await?;
        check_status(&resp, "/api/match/pause")
    }

    async fn player(&self, token: &str, player_id: &str) -> Result<PlayerLookup> {
        let url = self.url(&["api", "match", "player", player_id])?;
        let resp = self.request(Method::GET, url, Some(token)).send().await?;
        // 404 carries `{success:false, message}`.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(decode_body(resp).await?.unwrap_or_default());
        }
        read_json(resp, "/api/match/player").await
    }

    async fn recent_results(&self, token: &str, limit: u32) -> Result<MatchResults> {
        let mut url = self.url(&["api", "match", "results"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let resp = self.request(Method::GET, url, Some(token)).send().await?;
        read_json(resp, "/api/match/results").await
    }

    async fn history(
        &self,
        token: &str,
        player_id: Option<&str>,
        limit: u32,
    ) -> Result<MatchResults> {
        let mut url = self.url(&["api", "match", "history"])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(player_id) = player_id {
                query.append_pair("playerId", player_id);
            }
            query.append_pair("limit", &limit.to_string());
        }
        let resp = self.request(Method::GET, url, Some(token)).send().await?;
        read_json(resp, "/api/match/history").await
    }

    async fn leaderboard(&self, token: &str, limit: u32) -> Result<Leaderboard> {
        let mut url = self.url(&["api", "match", "leaderboard"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let resp = self.request(Method::GET, url, Some(token)).send().await?;
        read_json(resp, "/api/match/leaderboard").await
    }

    async fn matchmaking_enabled(&self, token: &str) -> Result<MatchmakingStatus> {
        let url = self.url(&["api", "match", "enabled"])?;
        let resp = self.request(Method::GET, url, Some(token)).send().await?;
        read_json(resp, "/api/match/enabled").await
    }
}

// ── Response helpers ────────────────────────────────────────────────

fn cache_buster() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn check_status(resp: &Response, path: &str) -> Result<()> {
    let status = resp.status();
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(SessionError::InvalidCredential);
    }
    if !status.is_success() {
        return Err(SessionError::Status {
            status: status.as_u16(),
            path: path.to_string(),
        });
    }
    Ok(())
}

async fn read_json<T: DeserializeOwned>(resp: Response, path: &str) -> Result<T> {
    check_status(&resp, path)?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode the body regardless of status; `None` if it is not the expected JSON.
async fn decode_body<T: DeserializeOwned>(resp: Response) -> Result<Option<T>> {
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes).ok())
}

/// Join/leave answer 400/404/500 with the same `{success, message}` body as
/// a 200, and the operator should see that message.
async fn read_action(resp: Response, path: &str) -> Result<QueueActionResponse> {
    let status = resp.status();
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(SessionError::InvalidCredential);
    }
    match decode_body::<QueueActionResponse>(resp).await? {
        Some(body) => {
            debug!(path, status = status.as_u16(), success = body.success, "queue action");
            Ok(body)
        }
        None if status.is_success() => Err(SessionError::Frame(format!(
            "{path} returned an unreadable body"
        ))),
        None => Err(SessionError::Status {
            status: status.as_u16(),
            path: path.to_string(),
        }),
    }
}

/// Login/register answer 400 with `{message}`; surface it as a rejection.
async fn read_auth_response(resp: Response, path: &str) -> Result<AuthResponse> {
    let status = resp.status();
    let body = decode_body::<AuthResponse>(resp).await?;
    match body {
        Some(body) if status.is_success() => Ok(body),
        Some(AuthResponse {
            message: Some(message),
            ..
        }) => Err(SessionError::Rejected { message }),
        _ => Err(SessionError::Status {
            status: status.as_u16(),
            path: path.to_string(),
        }),
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

    #[test]
    fn rejects_non_http_base() {
        assert!(HttpApi::new("ws://localhost:8080", Duration::from_secs(1)).is_err());
        assert!(HttpApi::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        let api = HttpApi::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        let url = api.url(&["api", "match", "leave", "a b/c"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/match/leave/a%20b%2Fc"
        );
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let api = HttpApi::new("http://host/mm", Duration::from_secs(1)).unwrap();
        let url = api.url(&["api", "auth", "validate"]).unwrap();
        assert_eq!(url.as_str(), "http://host/mm/api/auth/validate");
    }
}
