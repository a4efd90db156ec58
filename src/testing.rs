//! In-memory `Backend` for unit tests: scripted replies per endpoint, and a log
//! of every request body it was handed.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::api::{Backend, LeaderboardQuery};
use crate::domain::{ChallengeRef, Difficulty, Language};
use crate::error::{ClientError, ClientResult};
use crate::protocol::*;

pub(crate) enum Reply {
  Json(Value),
  Err(ClientError),
  Delayed(Duration, Value),
}

#[derive(Default)]
pub(crate) struct FakeBackend {
  calls: Mutex<Vec<(&'static str, Value)>>,
  replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
}

impl FakeBackend {
  pub fn reply(&self, endpoint: &'static str, reply: Reply) {
    self.replies.lock().unwrap().entry(endpoint).or_default().push_back(reply);
  }

  pub fn calls(&self, endpoint: &str) -> Vec<Value> {
    self.calls.lock().unwrap().iter().filter(|(e, _)| *e == endpoint).map(|(_, v)| v.clone()).collect()
  }

  async fn answer<T: DeserializeOwned>(&self, endpoint: &'static str, body: Value) -> ClientResult<T> {
    self.calls.lock().unwrap().push((endpoint, body));
    let next = self.replies.lock().unwrap().get_mut(endpoint).and_then(|q| q.pop_front());
    let value = match next {
      Some(Reply::Json(v)) => v,
      Some(Reply::Err(e)) => return Err(e),
      Some(Reply::Delayed(d, v)) => {
        tokio::time::sleep(d).await;
        v
      }
      None => return Err(ClientError::network(format!("no scripted reply for {}", endpoint))),
    };
    serde_json::from_value(value).map_err(|e| ClientError::network(e.to_string()))
  }
}

#[async_trait]
impl Backend for FakeBackend {
  async fn fetch_challenge(
    &self,
    language: Language,
    difficulty: Difficulty,
    reference: ChallengeRef,
    username: Option<&str>,
  ) -> ClientResult<ChallengeResponse> {
    let body = json!({
      "language": language.as_str(),
      "difficulty": difficulty.as_str(),
      "reference": reference.path_segment(),
      "username": username,
    });
    self.answer("challenge", body).await
  }

  async fn list_challenges(&self, language: Language, difficulty: Difficulty) -> ClientResult<ProblemListResponse> {
    self.answer("challenges", json!({"language": language.as_str(), "difficulty": difficulty.as_str()})).await
  }

  async fn execute(&self, req: &ExecuteRequest) -> ClientResult<ExecuteResponse> {
    self.answer("execute", json!(req)).await
  }

  async fn validate(&self, req: &ValidateRequest) -> ClientResult<ValidateResponse> {
    self.answer("validate", json!(req)).await
  }

  async fn complete_challenge(&self, req: &CompleteRequest) -> ClientResult<CompleteResponse> {
    self.answer("complete", json!(req)).await
  }

  async fn user_stats(&self, username: &str) -> ClientResult<UserStatsResponse> {
    self.answer("stats", json!({"username": username})).await
  }

  async fn user_profile(&self, username: &str) -> ClientResult<ProfileResponse> {
    self.answer("profile", json!({"username": username})).await
  }

  async fn leaderboard(&self, query: &LeaderboardQuery) -> ClientResult<LeaderboardResponse> {
    let body = json!({
      "limit": query.limit,
      "filter_type": query.filter_type,
      "filter_value": query.filter_value,
    });
    self.answer("leaderboard", body).await
  }

  async fn leaderboard_position(&self, username: &str) -> ClientResult<UserPositionResponse> {
    self.answer("position", json!({"username": username})).await
  }

  async fn login(&self, req: &LoginRequest) -> ClientResult<AuthResponse> {
    self.answer("login", json!({"username": req.username})).await
  }

  async fn signup(&self, req: &SignupRequest) -> ClientResult<AuthResponse> {
    self.answer("signup", json!({"username": req.username, "email": req.email, "fullname": req.fullname})).await
  }
}

/// `{success, challenge}` body with `visible` + `hidden` cases and `hints` hints.
pub(crate) fn challenge_json(id: u32, visible: usize, hidden: usize, hints: usize) -> Value {
  let mut cases: Vec<Value> = (0..visible)
    .map(|i| json!({"input": format!("[{}]", i), "expected_output": (i * 2).to_string()}))
    .collect();
  cases.extend((0..hidden).map(|i| json!({"input": format!("h{}", i), "expected_output": "?", "hidden": true})));
  json!({
    "success": true,
    "challenge": {
      "challenge_id": id,
      "title": format!("Challenge {}", id),
      "description": "Fix the bug",
      "problem_statement": "Return double the input",
      "buggy_code": "def solve(x):\n    return x + 2\n",
      "difficulty": "basic",
      "test_cases": cases,
      "hints": (1..=hints).map(|i| format!("hint {}", i)).collect::<Vec<_>>(),
      "max_score": 10
    }
  })
}
