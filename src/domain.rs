//! Domain models used by the client: languages, difficulties, challenges,
//! test cases and their results, submission attempts and the run cache.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Languages the execution sandbox accepts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  Python,
  Javascript,
  Java,
  Cpp,
}

impl Language {
  pub const ALL: [Language; 4] = [Language::Python, Language::Javascript, Language::Java, Language::Cpp];

  /// Wire/path form, e.g. `cpp`.
  pub fn as_str(&self) -> &'static str {
    match self {
      Language::Python => "python",
      Language::Javascript => "javascript",
      Language::Java => "java",
      Language::Cpp => "cpp",
    }
  }

  /// Extension for the local solution file.
  pub fn file_extension(&self) -> &'static str {
    match self {
      Language::Python => "py",
      Language::Javascript => "js",
      Language::Java => "java",
      Language::Cpp => "cpp",
    }
  }

  pub fn display_name(&self) -> &'static str {
    match self {
      Language::Python => "Python",
      Language::Javascript => "JavaScript",
      Language::Java => "Java",
      Language::Cpp => "C++",
    }
  }
}

impl Default for Language {
  fn default() -> Self { Language::Python }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Language {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "python" | "py" => Ok(Language::Python),
      "javascript" | "js" => Ok(Language::Javascript),
      "java" => Ok(Language::Java),
      "cpp" | "c++" => Ok(Language::Cpp),
      other => Err(format!("Unsupported language: {}", other)),
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Basic,
  Intermediate,
  Advanced,
  Expert,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Basic => "basic",
      Difficulty::Intermediate => "intermediate",
      Difficulty::Advanced => "advanced",
      Difficulty::Expert => "expert",
    }
  }
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::Basic }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Difficulty {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "basic" => Ok(Difficulty::Basic),
      "intermediate" => Ok(Difficulty::Intermediate),
      "advanced" => Ok(Difficulty::Advanced),
      "expert" => Ok(Difficulty::Expert),
      other => Err(format!("Unknown difficulty: {}", other)),
    }
  }
}

/// Which challenge to fetch within a (language, difficulty) bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeRef {
  Id(u32),
  First,
  Random,
}

impl ChallengeRef {
  /// Last path segment of `/api/challenge/{language}/{difficulty}/{..}`.
  pub fn path_segment(&self) -> String {
    match self {
      ChallengeRef::Id(id) => id.to_string(),
      ChallengeRef::First => "first".into(),
      ChallengeRef::Random => "random".into(),
    }
  }
}

impl FromStr for ChallengeRef {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "first" => Ok(ChallengeRef::First),
      "random" => Ok(ChallengeRef::Random),
      n => n.parse::<u32>().map(ChallengeRef::Id).map_err(|_| format!("Invalid challenge id: {}", n)),
    }
  }
}

/// One test case. Hidden cases never show input/expected/actual to the user.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
  #[serde(default, deserialize_with = "stringish")]
  pub input: String,
  #[serde(default, alias = "expected", deserialize_with = "stringish")]
  pub expected_output: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub hidden: bool,
}

/// Challenge as loaded from the backend. Replaced wholesale on the next load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
  pub challenge_id: u32,
  pub language: Language,
  pub difficulty: Difficulty,
  pub title: String,
  pub description: String,
  pub problem_statement: String,
  pub buggy_code: String,
  /// Visible cases first, hidden cases appended after.
  pub test_cases: Vec<TestCase>,
  pub hints: Vec<String>,
  pub max_score: u32,
}

impl Challenge {
  pub fn visible_cases(&self) -> impl Iterator<Item = &TestCase> {
    self.test_cases.iter().filter(|tc| !tc.hidden)
  }

  pub fn visible_count(&self) -> usize {
    self.visible_cases().count()
  }

  pub fn hidden_count(&self) -> usize {
    self.test_cases.len() - self.visible_count()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
  Pending,
  Running,
  Completed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestResult {
  pub status: TestStatus,
  pub passed: bool,
  pub output: String,
  pub error: Option<String>,
}

impl TestResult {
  pub fn pending() -> Self {
    Self { status: TestStatus::Pending, passed: false, output: String::new(), error: None }
  }

  pub fn running() -> Self {
    Self { status: TestStatus::Running, passed: false, output: String::new(), error: None }
  }

  pub fn completed(passed: bool, output: impl Into<String>, error: Option<String>) -> Self {
    Self { status: TestStatus::Completed, passed, output: output.into(), error }
  }

  pub fn is_completed(&self) -> bool {
    self.status == TestStatus::Completed
  }

  pub fn is_failure(&self) -> bool {
    self.is_completed() && !self.passed
  }
}

/// Ephemeral record of one Submit click. The backend stays the system of record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionAttempt {
  pub id: Uuid,
  pub code: String,
  pub timestamp: DateTime<Utc>,
  pub visible_passed: usize,
  pub hidden_passed: usize,
  pub total_passed: usize,
  pub score_awarded: Option<u32>,
}

impl SubmissionAttempt {
  pub fn new(code: &str, visible_passed: usize, hidden_passed: usize, score_awarded: Option<u32>) -> Self {
    Self {
      id: Uuid::new_v4(),
      code: code.to_string(),
      timestamp: Utc::now(),
      visible_passed,
      hidden_passed,
      total_passed: visible_passed + hidden_passed,
      score_awarded,
    }
  }
}

/// Single-slot memo of the last completed visible-test run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunCache {
  pub code: String,
  pub results: Vec<TestResult>,
  pub all_passed: bool,
}

impl RunCache {
  /// Submit may skip the visible phase only for byte-identical code that fully passed.
  pub fn reusable_for(&self, code: &str) -> bool {
    self.all_passed && !self.results.is_empty() && self.code == code
  }
}

/// Accept either a JSON string or any other JSON value (rendered compactly).
pub(crate) fn stringish<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  let v = serde_json::Value::deserialize(deserializer)?;
  Ok(match v {
    serde_json::Value::String(s) => s,
    serde_json::Value::Null => String::new(),
    other => other.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_languages_and_aliases() {
    assert_eq!("PY".parse::<Language>().unwrap(), Language::Python);
    assert_eq!("c++".parse::<Language>().unwrap(), Language::Cpp);
    assert!("cobol".parse::<Language>().is_err());
  }

  #[test]
  fn challenge_ref_path_segments() {
    assert_eq!("7".parse::<ChallengeRef>().unwrap().path_segment(), "7");
    assert_eq!("first".parse::<ChallengeRef>().unwrap(), ChallengeRef::First);
    assert_eq!(ChallengeRef::Random.path_segment(), "random");
    assert!("seven".parse::<ChallengeRef>().is_err());
  }

  #[test]
  fn test_case_accepts_structured_input() {
    let tc: TestCase = serde_json::from_str(r#"{"input":[1,2,3],"expected":6}"#).unwrap();
    assert_eq!(tc.input, "[1,2,3]");
    assert_eq!(tc.expected_output, "6");
    assert!(!tc.hidden);
  }

  #[test]
  fn run_cache_requires_identical_passing_code() {
    let cache = RunCache {
      code: "def f(): return 1".into(),
      results: vec![TestResult::completed(true, "1", None)],
      all_passed: true,
    };
    assert!(cache.reusable_for("def f(): return 1"));
    assert!(!cache.reusable_for("def f(): return 2"));

    let failing = RunCache { all_passed: false, ..cache };
    assert!(!failing.reusable_for("def f(): return 1"));
  }
}
