//! Backend port and its HTTP adapter.
//!
//! `Backend` is the seam the session/runner code talks to; `HttpBackend` is the
//! `reqwest` implementation against the REST API. Every response body is read as
//! text first so that a non-JSON body (proxy error page, stack trace) becomes a
//! `ClientError::Network("Server error: ...")` instead of a parse panic.
//!
//! NOTE: passwords and code bodies are never logged, only their lengths.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::domain::{ChallengeRef, Difficulty, Language};
use crate::error::{ClientError, ClientResult};
use crate::protocol::*;
use crate::util::trunc_for_log;

const CLIENT_UA: &str = concat!("bugyou-client/", env!("CARGO_PKG_VERSION"));

/// Leaderboard query. `filter_value` only matters for non-overall filters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeaderboardQuery {
  pub limit: Option<u32>,
  pub filter_type: Option<String>,
  pub filter_value: Option<String>,
}

/// Everything the client needs from the backend.
#[async_trait]
pub trait Backend: Send + Sync {
  async fn fetch_challenge(
    &self,
    language: Language,
    difficulty: Difficulty,
    reference: ChallengeRef,
    username: Option<&str>,
  ) -> ClientResult<ChallengeResponse>;

  async fn list_challenges(&self, language: Language, difficulty: Difficulty) -> ClientResult<ProblemListResponse>;

  async fn execute(&self, req: &ExecuteRequest) -> ClientResult<ExecuteResponse>;

  async fn validate(&self, req: &ValidateRequest) -> ClientResult<ValidateResponse>;

  async fn complete_challenge(&self, req: &CompleteRequest) -> ClientResult<CompleteResponse>;

  async fn user_stats(&self, username: &str) -> ClientResult<UserStatsResponse>;

  async fn user_profile(&self, username: &str) -> ClientResult<ProfileResponse>;

  async fn leaderboard(&self, query: &LeaderboardQuery) -> ClientResult<LeaderboardResponse>;

  async fn leaderboard_position(&self, username: &str) -> ClientResult<UserPositionResponse>;

  async fn login(&self, req: &LoginRequest) -> ClientResult<AuthResponse>;

  async fn signup(&self, req: &SignupRequest) -> ClientResult<AuthResponse>;
}

#[derive(Clone)]
pub struct HttpBackend {
  pub client: reqwest::Client,
  pub base_url: String,
  pub request_timeout: Duration,
}

impl HttpBackend {
  pub fn from_config(cfg: &ClientConfig) -> ClientResult<Self> {
    // Run/Submit carry their own deadline in the runner, so no client-wide timeout here.
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| ClientError::Config(e.to_string()))?;

    // Validate once up front so endpoint() failures can only come from segments.
    Url::parse(&cfg.api_base).map_err(|e| ClientError::Config(format!("api_base {}: {}", cfg.api_base, e)))?;

    Ok(Self {
      client,
      base_url: cfg.api_base.trim_end_matches('/').to_string(),
      request_timeout: cfg.request_timeout(),
    })
  }

  /// `{base_url}/{segments...}` with each segment percent-encoded.
  fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
    let mut url = Url::parse(&self.base_url).map_err(|e| ClientError::Config(e.to_string()))?;
    url
      .path_segments_mut()
      .map_err(|_| ClientError::Config(format!("api_base cannot be a base URL: {}", self.base_url)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  #[instrument(level = "debug", skip_all, fields(url = %url))]
  async fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> ClientResult<T> {
    let res = self.client.get(url.clone())
      .header(USER_AGENT, CLIENT_UA)
      .query(query)
      .timeout(self.request_timeout)
      .send().await
      .map_err(|e| map_transport_error(e, self.request_timeout))?;
    decode_body(res, self.request_timeout).await
  }

  #[instrument(level = "debug", skip_all, fields(url = %url))]
  async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
    &self,
    url: Url,
    body: &B,
    timeout: Option<Duration>,
  ) -> ClientResult<T> {
    let mut req = self.client.post(url.clone())
      .header(USER_AGENT, CLIENT_UA)
      .header(CONTENT_TYPE, "application/json")
      .json(body);
    if let Some(t) = timeout {
      req = req.timeout(t);
    }
    let deadline = timeout.unwrap_or_default();
    let res = req.send().await.map_err(|e| map_transport_error(e, deadline))?;
    decode_body(res, deadline).await
  }
}

fn map_transport_error(e: reqwest::Error, deadline: Duration) -> ClientError {
  if e.is_timeout() {
    ClientError::Timeout(deadline.as_secs())
  } else {
    ClientError::Network(e.to_string())
  }
}

/// Parse the body as JSON regardless of status: the backend answers 400/404/500
/// with `{success:false, error}` and those carry the message we want to show.
async fn decode_body<T: DeserializeOwned>(res: reqwest::Response, deadline: Duration) -> ClientResult<T> {
  let status = res.status();
  let text = res.text().await.map_err(|e| map_transport_error(e, deadline))?;
  match serde_json::from_str::<T>(&text) {
    Ok(v) => {
      debug!(target: "bugyou", %status, body_len = text.len(), "Backend response decoded");
      Ok(v)
    }
    Err(e) => {
      warn!(target: "bugyou", %status, error = %e, body = %trunc_for_log(&text, 120), "Backend returned a non-JSON body");
      Err(server_error(&text))
    }
  }
}

/// User-facing message for an unparseable response body.
pub fn server_error(body: &str) -> ClientError {
  let snippet: String = body.trim().chars().take(200).collect();
  if snippet.is_empty() {
    ClientError::network("Server error: Invalid response from server.")
  } else {
    ClientError::network(format!("Server error: {}", snippet))
  }
}

#[async_trait]
impl Backend for HttpBackend {
  #[instrument(level = "info", skip(self, reference), fields(reference = %reference.path_segment()))]
  async fn fetch_challenge(
    &self,
    language: Language,
    difficulty: Difficulty,
    reference: ChallengeRef,
    username: Option<&str>,
  ) -> ClientResult<ChallengeResponse> {
    let segment = reference.path_segment();
    let url = self.endpoint(&["challenge", language.as_str(), difficulty.as_str(), &segment])?;
    let query: Vec<(&str, String)> = username.map(|u| vec![("username", u.to_string())]).unwrap_or_default();
    self.get_json(url, &query).await
  }

  #[instrument(level = "info", skip(self))]
  async fn list_challenges(&self, language: Language, difficulty: Difficulty) -> ClientResult<ProblemListResponse> {
    let url = self.endpoint(&["challenges", language.as_str(), difficulty.as_str()])?;
    self.get_json(url, &[]).await
  }

  #[instrument(level = "info", skip(self, req), fields(language = %req.language, code_len = req.code.len(), cases = req.test_cases.len()))]
  async fn execute(&self, req: &ExecuteRequest) -> ClientResult<ExecuteResponse> {
    let url = self.endpoint(&["execute"])?;
    self.post_json(url, req, None).await
  }

  #[instrument(level = "info", skip(self, req), fields(language = %req.language, challenge_id = req.challenge_id, code_len = req.code.len(), skip_visible = req.skip_visible_tests))]
  async fn validate(&self, req: &ValidateRequest) -> ClientResult<ValidateResponse> {
    let url = self.endpoint(&["validate"])?;
    self.post_json(url, req, None).await
  }

  #[instrument(level = "info", skip(self, req), fields(username = %req.username, challenge_id = req.challenge_id, time_taken = req.time_taken, score = req.score))]
  async fn complete_challenge(&self, req: &CompleteRequest) -> ClientResult<CompleteResponse> {
    let url = self.endpoint(&["challenge", "complete"])?;
    self.post_json(url, req, Some(self.request_timeout)).await
  }

  #[instrument(level = "info", skip(self))]
  async fn user_stats(&self, username: &str) -> ClientResult<UserStatsResponse> {
    let url = self.endpoint(&["user", "stats", username])?;
    self.get_json(url, &[]).await
  }

  #[instrument(level = "info", skip(self))]
  async fn user_profile(&self, username: &str) -> ClientResult<ProfileResponse> {
    let url = self.endpoint(&["user", username, "profile"])?;
    self.get_json(url, &[]).await
  }

  #[instrument(level = "info", skip(self))]
  async fn leaderboard(&self, query: &LeaderboardQuery) -> ClientResult<LeaderboardResponse> {
    let url = self.endpoint(&["leaderboard"])?;
    let mut params: Vec<(&str, String)> = vec![];
    if let Some(limit) = query.limit {
      params.push(("limit", limit.to_string()));
    }
    if let Some(ft) = &query.filter_type {
      params.push(("filter_type", ft.clone()));
      if let Some(fv) = &query.filter_value {
        params.push(("filter_value", fv.clone()));
      }
    }
    self.get_json(url, &params).await
  }

  #[instrument(level = "info", skip(self))]
  async fn leaderboard_position(&self, username: &str) -> ClientResult<UserPositionResponse> {
    let url = self.endpoint(&["leaderboard", "user", username])?;
    self.get_json(url, &[]).await
  }

  #[instrument(level = "info", skip(self, req), fields(username = %req.username))]
  async fn login(&self, req: &LoginRequest) -> ClientResult<AuthResponse> {
    let url = self.endpoint(&["login"])?;
    self.post_json(url, req, Some(self.request_timeout)).await
  }

  #[instrument(level = "info", skip(self, req), fields(username = %req.username))]
  async fn signup(&self, req: &SignupRequest) -> ClientResult<AuthResponse> {
    let url = self.endpoint(&["signup"])?;
    self.post_json(url, req, Some(self.request_timeout)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn backend(base: &str) -> HttpBackend {
    let cfg = ClientConfig { api_base: base.into(), ..ClientConfig::default() };
    HttpBackend::from_config(&cfg).unwrap()
  }

  #[test]
  fn endpoints_join_and_encode_segments() {
    let b = backend("http://localhost:5000/api/");
    let url = b.endpoint(&["challenge", "python", "basic", "first"]).unwrap();
    assert_eq!(url.as_str(), "http://localhost:5000/api/challenge/python/basic/first");

    let url = b.endpoint(&["leaderboard", "user", "ada lovelace"]).unwrap();
    assert_eq!(url.as_str(), "http://localhost:5000/api/leaderboard/user/ada%20lovelace");
  }

  #[test]
  fn rejects_unparseable_base() {
    let cfg = ClientConfig { api_base: "not a url".into(), ..ClientConfig::default() };
    assert!(matches!(HttpBackend::from_config(&cfg), Err(ClientError::Config(_))));
  }

  #[test]
  fn server_error_truncates_body() {
    let long = "x".repeat(500);
    match server_error(&long) {
      ClientError::Network(msg) => assert_eq!(msg.len(), "Server error: ".len() + 200),
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(server_error("  "), ClientError::network("Server error: Invalid response from server."));
  }
}
