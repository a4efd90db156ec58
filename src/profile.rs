//! Player progression: XP/level stats for the session header and the profile
//! page (per-language counts, achievements, recent activity).

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{info, instrument};

use crate::api::Backend;
use crate::domain::Language;
use crate::error::{ClientError, ClientResult};
use crate::protocol::{ProfileDto, SolvedProblem};
use crate::util::capitalize_first;

pub const XP_PER_LEVEL: u64 = 100;
const RECENT_LIMIT: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerStats {
  pub xp: u64,
  pub level: u32,
}

#[instrument(level = "info", skip(backend))]
pub async fn fetch_stats(backend: &dyn Backend, username: &str) -> ClientResult<PlayerStats> {
  let resp = backend.user_stats(username).await?;
  if !resp.success {
    return Err(ClientError::Network(resp.error.unwrap_or_else(|| "Failed to load user stats".into())));
  }
  Ok(PlayerStats { xp: resp.xp, level: resp.level.max(1) })
}

#[instrument(level = "info", skip(backend))]
pub async fn fetch_profile(backend: &dyn Backend, username: &str) -> ClientResult<ProfileDto> {
  let resp = backend.user_profile(username).await?;
  match (resp.success, resp.profile) {
    (true, Some(mut profile)) => {
      if profile.username.is_empty() {
        profile.username = username.to_string();
      }
      info!(target: "bugyou", username, solved = profile.total_solved, "Profile loaded");
      Ok(profile)
    }
    _ => Err(ClientError::Network(resp.error.unwrap_or_else(|| "Failed to load profile".into()))),
  }
}

/// Position within the current level. Levels are `XP_PER_LEVEL` wide, level 1 starts at 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct XpProgress {
  pub into_level: u64,
  pub level_span: u64,
  pub percent: f64,
}

impl XpProgress {
  pub fn compute(xp: u64, level: u32) -> Self {
    let level_start = u64::from(level.max(1) - 1) * XP_PER_LEVEL;
    let into_level = xp.saturating_sub(level_start);
    let percent = (into_level as f64 / XP_PER_LEVEL as f64 * 100.0).min(100.0);
    Self { into_level, level_span: XP_PER_LEVEL, percent }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Achievement {
  pub id: &'static str,
  pub title: &'static str,
  pub condition: &'static str,
  pub unlocked: bool,
}

pub fn achievements(profile: &ProfileDto) -> Vec<Achievement> {
  let solved_in = |lang: Language| profile.language_stats.get(lang.as_str()).map(|s| s.total).unwrap_or(0);
  let advanced: u32 = profile.language_stats.values().map(|s| s.advanced).sum();
  let level = profile.level.max(1);

  let badge = |id: &'static str, title: &'static str, condition: &'static str, unlocked: bool| Achievement { id, title, condition, unlocked };
  vec![
    badge("first_solve", "First Bug Squashed", "Solve 1 challenge", profile.total_solved >= 1),
    badge("python_master", "Python Master", "Solve 5 Python challenges", solved_in(Language::Python) >= 5),
    badge("javascript_master", "JavaScript Master", "Solve 5 JavaScript challenges", solved_in(Language::Javascript) >= 5),
    badge("java_master", "Java Master", "Solve 5 Java challenges", solved_in(Language::Java) >= 5),
    badge("cpp_master", "C++ Master", "Solve 5 C++ challenges", solved_in(Language::Cpp) >= 5),
    badge("advanced_solver", "Advanced Solver", "Solve 3 advanced challenges", advanced >= 3),
    badge("level_5", "Level 5 Achiever", "Reach level 5", level >= 5),
    badge("level_10", "Level 10 Master", "Reach level 10", level >= 10),
  ]
}

/// The last five solves, newest first.
pub fn recent_activity(profile: &ProfileDto) -> Vec<&SolvedProblem> {
  let skip = profile.recent_solved.len().saturating_sub(RECENT_LIMIT);
  profile.recent_solved.iter().skip(skip).rev().collect()
}

/// `45s` under a minute, `m:ss` above.
pub fn format_time_taken(secs: u64) -> String {
  if secs < 60 {
    format!("{}s", secs)
  } else {
    crate::util::format_mmss(secs)
  }
}

/// Accepts RFC 3339 or the backend's `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn parse_solved_at(raw: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|d| d.with_timezone(&Utc))
    .ok()
    .or_else(|| {
      ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%a, %d %b %Y %H:%M:%S GMT"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|n| n.and_utc())
    })
}

pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let secs = (now - then).num_seconds().max(0);
  let (n, unit) = match secs {
    s if s < 60 => return "Just now".into(),
    s if s < 3_600 => (s / 60, "minute"),
    s if s < 86_400 => (s / 3_600, "hour"),
    s => (s / 86_400, "day"),
  };
  format!("{} {}{} ago", n, unit, if n > 1 { "s" } else { "" })
}

pub fn render_profile(profile: &ProfileDto, now: DateTime<Utc>) -> String {
  let mut out = String::new();
  let progress = XpProgress::compute(profile.xp, profile.level);
  let _ = writeln!(out, "{}  ·  Level {}  ·  {} XP  ·  {} solved", profile.username, profile.level, profile.xp, profile.total_solved);
  let _ = writeln!(
    out,
    "{}/{} XP to next level ({:.0}%)",
    progress.into_level, progress.level_span, progress.percent
  );

  out.push_str("\nLanguages\n");
  if profile.language_stats.is_empty() {
    out.push_str("  No Languages Yet. Start solving challenges to see your language progress here!\n");
  }
  for (lang, s) in &profile.language_stats {
    let _ = writeln!(
      out,
      "  {:<11} total {:>3}  basic {:>3}  intermediate {:>3}  advanced {:>3}",
      capitalize_first(lang), s.total, s.basic, s.intermediate, s.advanced
    );
  }

  out.push_str("\nRecent activity\n");
  let recent = recent_activity(profile);
  if recent.is_empty() {
    out.push_str("  No Recent Activity\n");
  }
  for p in recent {
    let title = p.title.clone().unwrap_or_else(|| format!("Challenge {}", p.challenge_id));
    let when = p.solved_at.as_deref().and_then(parse_solved_at).map(|t| time_ago(t, now)).unwrap_or_default();
    let _ = writeln!(
      out,
      "  ✓ {}  [{}] {}  {}  ⏱ {}",
      title, p.difficulty, capitalize_first(&p.language), when, format_time_taken(p.time_taken)
    );
  }

  out.push_str("\nAchievements\n");
  for a in achievements(profile) {
    if a.unlocked {
      let _ = writeln!(out, "  ★ {}", a.title);
    } else {
      let _ = writeln!(out, "  · {} ({})", a.title, a.condition);
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use chrono::Duration;
  use serde_json::json;

  use super::*;
  use crate::testing::{FakeBackend, Reply};

  fn profile(value: serde_json::Value) -> ProfileDto {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn xp_progress_within_level() {
    let p = XpProgress::compute(250, 3);
    assert_eq!(p.into_level, 50);
    assert_eq!(p.level_span, 100);
    assert!((p.percent - 50.0).abs() < f64::EPSILON);

    // Backend drift past the level boundary caps at 100%.
    assert!((XpProgress::compute(500, 2).percent - 100.0).abs() < f64::EPSILON);
    assert_eq!(XpProgress::compute(0, 0).into_level, 0);
  }

  #[test]
  fn achievements_follow_counts() {
    let p = profile(json!({
      "username": "ada", "level": 5, "xp": 420, "total_solved": 7,
      "language_stats": {
        "python": {"total": 5, "basic": 2, "intermediate": 1, "advanced": 2},
        "cpp": {"total": 2, "advanced": 1}
      }
    }));
    let unlocked: Vec<&str> = achievements(&p).into_iter().filter(|a| a.unlocked).map(|a| a.id).collect();
    assert_eq!(unlocked, vec!["first_solve", "python_master", "advanced_solver", "level_5"]);
  }

  #[test]
  fn recent_activity_is_last_five_newest_first() {
    let solved: Vec<_> = (1..=7).map(|i| json!({"challenge_id": i, "language": "python", "difficulty": "basic"})).collect();
    let p = profile(json!({"recent_solved": solved}));
    let ids: Vec<u32> = recent_activity(&p).iter().map(|s| s.challenge_id).collect();
    assert_eq!(ids, vec![7, 6, 5, 4, 3]);
  }

  #[test]
  fn time_formatting() {
    assert_eq!(format_time_taken(42), "42s");
    assert_eq!(format_time_taken(185), "3:05");

    let now = Utc::now();
    assert_eq!(time_ago(now - Duration::seconds(5), now), "Just now");
    assert_eq!(time_ago(now - Duration::minutes(1), now), "1 minute ago");
    assert_eq!(time_ago(now - Duration::hours(3), now), "3 hours ago");
    assert_eq!(time_ago(now - Duration::days(2), now), "2 days ago");

    assert!(parse_solved_at("2025-03-01T10:00:00Z").is_some());
    assert!(parse_solved_at("2025-03-01 10:00:00").is_some());
    assert!(parse_solved_at("yesterday").is_none());
  }

  #[test]
  fn render_mentions_locked_conditions() {
    let p = profile(json!({"username": "newbie"}));
    let text = render_profile(&p, Utc::now());
    assert!(text.contains("Level 1"));
    assert!(text.contains("No Recent Activity"));
    assert!(text.contains("First Bug Squashed (Solve 1 challenge)"));
  }

  #[tokio::test]
  async fn fetch_profile_surfaces_backend_error() {
    let fake = Arc::new(FakeBackend::default());
    fake.reply("profile", Reply::Json(json!({"success": false, "error": "User not found"})));
    let err = fetch_profile(fake.as_ref(), "ghost").await.unwrap_err();
    assert_eq!(err, ClientError::Network("User not found".into()));

    fake.reply("stats", Reply::Json(json!({"success": true, "xp": 30})));
    assert_eq!(fetch_stats(fake.as_ref(), "ghost").await.unwrap(), PlayerStats { xp: 30, level: 1 });
  }
}
