//! Leaderboard: filtered ranking plus the logged-in user's own position card.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use tracing::{debug, instrument, warn};

use crate::api::{Backend, LeaderboardQuery};
use crate::domain::{Difficulty, Language};
use crate::error::{ClientError, ClientResult};
use crate::protocol::{LeaderboardEntry, UserPosition};
use crate::util::capitalize_first;

pub const DEFAULT_LIMIT: u32 = 50;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LeaderboardFilter {
  #[default]
  Overall,
  Language(Language),
  Difficulty(Difficulty),
}

impl LeaderboardFilter {
  /// Overall sends no filter parameters at all.
  pub fn to_query(self, limit: u32) -> LeaderboardQuery {
    let (filter_type, filter_value) = match self {
      LeaderboardFilter::Overall => (None, None),
      LeaderboardFilter::Language(l) => (Some("language".to_string()), Some(l.as_str().to_string())),
      LeaderboardFilter::Difficulty(d) => (Some("difficulty".to_string()), Some(d.as_str().to_string())),
    };
    LeaderboardQuery { limit: Some(limit), filter_type, filter_value }
  }
}

impl fmt::Display for LeaderboardFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LeaderboardFilter::Overall => f.write_str("overall"),
      LeaderboardFilter::Language(l) => write!(f, "language:{}", l),
      LeaderboardFilter::Difficulty(d) => write!(f, "difficulty:{}", d),
    }
  }
}

/// `overall`, `language:<lang>`, `difficulty:<level>`; a bare language or difficulty also works.
impl FromStr for LeaderboardFilter {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("overall") {
      return Ok(LeaderboardFilter::Overall);
    }
    match s.split_once(':') {
      Some((kind, value)) if kind.eq_ignore_ascii_case("language") => value.parse().map(LeaderboardFilter::Language),
      Some((kind, value)) if kind.eq_ignore_ascii_case("difficulty") => value.parse().map(LeaderboardFilter::Difficulty),
      Some((kind, _)) => Err(format!("Unknown leaderboard filter: {}", kind)),
      None => s
        .parse()
        .map(LeaderboardFilter::Language)
        .or_else(|_| s.parse().map(LeaderboardFilter::Difficulty))
        .map_err(|_| format!("Unknown leaderboard filter: {}", s)),
    }
  }
}

#[instrument(level = "info", skip(backend), fields(filter = %filter))]
pub async fn fetch_leaderboard(backend: &dyn Backend, filter: LeaderboardFilter, limit: u32) -> ClientResult<Vec<LeaderboardEntry>> {
  let resp = backend.leaderboard(&filter.to_query(limit)).await?;
  if !resp.success {
    return Err(ClientError::Network(
      resp.error.unwrap_or_else(|| "Failed to load leaderboard data".into()),
    ));
  }
  debug!(target: "bugyou", entries = resp.leaderboard.len(), "Leaderboard loaded");
  Ok(resp.leaderboard)
}

/// The position card is optional: any failure hides it.
#[instrument(level = "info", skip(backend))]
pub async fn fetch_position(backend: &dyn Backend, username: &str) -> Option<UserPosition> {
  match backend.leaderboard_position(username).await {
    Ok(resp) if resp.success => resp.position,
    Ok(resp) => {
      debug!(target: "bugyou", error = ?resp.error, "User not on the leaderboard yet");
      None
    }
    Err(e) => {
      warn!(target: "bugyou", error = %e, "Error loading user position");
      None
    }
  }
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(n: i64) -> String {
  let digits = n.unsigned_abs().to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
  if n < 0 {
    out.push('-');
  }
  for (i, ch) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(',');
    }
    out.push(ch);
  }
  out
}

pub fn render_entry(e: &LeaderboardEntry) -> String {
  let rank = e
    .medal
    .clone()
    .filter(|m| !m.is_empty())
    .unwrap_or_else(|| format!("#{}", e.rank_position));
  let language = e.best_language.as_deref().filter(|s| !s.is_empty()).map(str::to_uppercase).unwrap_or_else(|| "N/A".into());
  let difficulty = e.best_difficulty.as_deref().filter(|s| !s.is_empty()).map(capitalize_first).unwrap_or_else(|| "N/A".into());
  format!(
    "{:>4}  {:<20} {:>9} {:>6} {:>5}  {:<10} {:<12} {} days",
    rank,
    e.username,
    group_thousands(e.total_score),
    e.total_solved,
    e.level,
    language,
    difficulty,
    e.streak_days
  )
}

pub fn render_leaderboard(entries: &[LeaderboardEntry]) -> String {
  if entries.is_empty() {
    return "No data available for this filter\n".into();
  }
  let mut out = format!(
    "{:>4}  {:<20} {:>9} {:>6} {:>5}  {:<10} {:<12} {}\n",
    "Rank", "User", "Score", "Solved", "Level", "Language", "Difficulty", "Streak"
  );
  for e in entries {
    let _ = writeln!(out, "{}", render_entry(e));
  }
  out
}

pub fn render_position(p: &UserPosition) -> String {
  format!(
    "Your position: #{}  ·  score {}  ·  solved {}  ·  level {}",
    p.rank_position,
    group_thousands(p.total_score),
    p.total_solved,
    p.level
  )
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use serde_json::json;

  use super::*;
  use crate::testing::{FakeBackend, Reply};

  fn entry(value: serde_json::Value) -> LeaderboardEntry {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn parses_filters() {
    assert_eq!("overall".parse::<LeaderboardFilter>().unwrap(), LeaderboardFilter::Overall);
    assert_eq!("language:cpp".parse::<LeaderboardFilter>().unwrap(), LeaderboardFilter::Language(Language::Cpp));
    assert_eq!("difficulty:Expert".parse::<LeaderboardFilter>().unwrap(), LeaderboardFilter::Difficulty(Difficulty::Expert));
    assert_eq!("java".parse::<LeaderboardFilter>().unwrap(), LeaderboardFilter::Language(Language::Java));
    assert!("streak:3".parse::<LeaderboardFilter>().is_err());
  }

  #[test]
  fn overall_sends_no_filter_params() {
    let q = LeaderboardFilter::Overall.to_query(DEFAULT_LIMIT);
    assert_eq!(q, LeaderboardQuery { limit: Some(50), filter_type: None, filter_value: None });

    let q = LeaderboardFilter::Difficulty(Difficulty::Advanced).to_query(10);
    assert_eq!(q.filter_type.as_deref(), Some("difficulty"));
    assert_eq!(q.filter_value.as_deref(), Some("advanced"));
  }

  #[test]
  fn renders_medals_and_fallbacks() {
    let gold = entry(json!({"rank_position": 1, "username": "ada", "total_score": 12345, "medal": "🥇",
                            "best_language": "python", "best_difficulty": "advanced", "streak_days": 4, "level": 7}));
    let line = render_entry(&gold);
    assert!(line.contains("🥇"));
    assert!(line.contains("12,345"));
    assert!(line.contains("PYTHON"));
    assert!(line.contains("Advanced"));
    assert!(line.ends_with("4 days"));

    let plain = entry(json!({"rank_position": 12, "username": "bob"}));
    let line = render_entry(&plain);
    assert!(line.contains("#12"));
    assert_eq!(line.matches("N/A").count(), 2);
    assert!(line.ends_with("0 days"));

    assert_eq!(render_leaderboard(&[]), "No data available for this filter\n");
  }

  #[test]
  fn thousands_grouping() {
    assert_eq!(group_thousands(0), "0");
    assert_eq!(group_thousands(999), "999");
    assert_eq!(group_thousands(1000), "1,000");
    assert_eq!(group_thousands(-1234567), "-1,234,567");
  }

  #[tokio::test]
  async fn position_card_hidden_on_failure() {
    let fake = Arc::new(FakeBackend::default());
    fake.reply("position", Reply::Json(json!({"success": false, "error": "User not found in leaderboard"})));
    assert!(fetch_position(fake.as_ref(), "ghost").await.is_none());

    fake.reply("position", Reply::Json(json!({"success": true, "position": {"rank_position": 3, "total_score": 900, "total_solved": 9, "level": 4}})));
    let p = fetch_position(fake.as_ref(), "ada").await.unwrap();
    assert_eq!(render_position(&p), "Your position: #3  ·  score 900  ·  solved 9  ·  level 4");
  }

  #[tokio::test]
  async fn leaderboard_failure_is_an_error() {
    let fake = Arc::new(FakeBackend::default());
    fake.reply("leaderboard", Reply::Json(json!({"success": false})));
    let err = fetch_leaderboard(fake.as_ref(), LeaderboardFilter::Overall, 50).await.unwrap_err();
    assert_eq!(err, ClientError::Network("Failed to load leaderboard data".into()));
    assert_eq!(fake.calls("leaderboard")[0]["limit"], 50);
  }
}
