//! Request/response structs for the backend REST API (serde ready).
//! Field names follow the backend's snake_case JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{stringish, Challenge, Difficulty, Language, TestCase, TestResult};

/// `phase` value the backend uses when code failed before any test ran.
pub const PHASE_COMPILATION: &str = "COMPILATION";

//
// Challenges
//

#[derive(Debug, Deserialize)]
pub struct ChallengeResponse {
    pub success: bool,
    #[serde(default)]
    pub challenge: Option<ChallengeDto>,
    #[serde(default)]
    pub is_solved: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeDto {
    pub challenge_id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub problem_statement: String,
    #[serde(default)]
    pub buggy_code: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    /// Some backend versions ship hidden cases in their own list.
    #[serde(default)]
    pub hidden_test_cases: Vec<TestCase>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default = "default_max_score")]
    pub max_score: u32,
}

fn default_max_score() -> u32 {
    10
}

impl ChallengeDto {
    /// Build the domain challenge; visible cases first, hidden ones appended.
    pub fn into_challenge(self, language: Language, requested: Difficulty) -> Challenge {
        let (mut visible, mut hidden): (Vec<TestCase>, Vec<TestCase>) =
            self.test_cases.into_iter().partition(|tc| !tc.hidden);
        hidden.extend(self.hidden_test_cases.into_iter().map(|mut tc| {
            tc.hidden = true;
            tc
        }));
        visible.append(&mut hidden);

        Challenge {
            challenge_id: self.challenge_id,
            language,
            difficulty: self.difficulty.unwrap_or(requested),
            title: self.title,
            description: self.description,
            problem_statement: self.problem_statement,
            buggy_code: self.buggy_code,
            test_cases: visible,
            hints: self.hints,
            max_score: self.max_score,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProblemListResponse {
    pub success: bool,
    #[serde(default)]
    pub challenges: Vec<ProblemSummary>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProblemSummary {
    pub challenge_id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_max_score")]
    pub max_score: u32,
    #[serde(default)]
    pub success_rate: f64,
}

//
// Execution and validation
//

/// Per-case outcome as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestOutcome {
    #[serde(default)]
    pub passed: bool,
    #[serde(default, deserialize_with = "stringish")]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&TestResult> for TestOutcome {
    fn from(r: &TestResult) -> Self {
        TestOutcome { passed: r.passed, output: r.output.clone(), error: r.error.clone() }
    }
}

impl From<TestOutcome> for TestResult {
    fn from(o: TestOutcome) -> Self {
        TestResult::completed(o.passed, o.output, o.error)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub language: Language,
    pub test_cases: Vec<TestCase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(default)]
    pub test_results: Vec<TestOutcome>,
    #[serde(default)]
    pub tests_passed: Option<usize>,
    #[serde(default)]
    pub total_tests: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateRequest {
    pub code: String,
    pub language: Language,
    pub challenge_id: u32,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub skip_visible_tests: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_visible_results: Option<Vec<TestOutcome>>,
    pub hints_used: usize,
    pub attempts: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct PhaseResults {
    #[serde(default)]
    pub test_results: Vec<TestOutcome>,
    #[serde(default)]
    pub tests_passed: Option<usize>,
    #[serde(default)]
    pub total_tests: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateResponse {
    pub success: bool,
    #[serde(default)]
    pub all_passed: bool,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub visible_results: Option<PhaseResults>,
    #[serde(default)]
    pub hidden_results: Option<PhaseResults>,
    #[serde(default)]
    pub test_results: Vec<TestOutcome>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub already_completed: bool,
    #[serde(default, alias = "xp_reward")]
    pub xp_awarded: Option<u64>,
    #[serde(default)]
    pub new_level: Option<u32>,
    #[serde(default)]
    pub new_xp: Option<u64>,
}

impl ValidateResponse {
    pub fn is_compilation_failure(&self) -> bool {
        self.phase.as_deref() == Some(PHASE_COMPILATION)
    }
}

impl ExecuteResponse {
    pub fn is_compilation_failure(&self) -> bool {
        self.phase.as_deref() == Some(PHASE_COMPILATION)
    }
}

//
// Progress and completion
//

#[derive(Debug, Clone, Serialize)]
pub struct CompleteRequest {
    pub username: String,
    pub language: Language,
    pub difficulty: Difficulty,
    pub challenge_id: u32,
    pub challenge_title: String,
    pub time_taken: u64,
    pub score: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteResponse {
    pub success: bool,
    #[serde(default)]
    pub new_xp: Option<u64>,
    #[serde(default)]
    pub new_level: Option<u32>,
    #[serde(default)]
    pub current_level: Option<u32>,
    #[serde(default)]
    pub xp_awarded: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserStatsResponse {
    pub success: bool,
    #[serde(default)]
    pub xp: u64,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_level() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ProfileResponse {
    pub success: bool,
    #[serde(default)]
    pub profile: Option<ProfileDto>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileDto {
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub xp: u64,
    #[serde(default)]
    pub total_solved: u32,
    #[serde(default)]
    pub language_stats: BTreeMap<String, LanguageStats>,
    #[serde(default)]
    pub recent_solved: Vec<SolvedProblem>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LanguageStats {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub basic: u32,
    #[serde(default)]
    pub intermediate: u32,
    #[serde(default)]
    pub advanced: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolvedProblem {
    #[serde(default)]
    pub challenge_id: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub solved_at: Option<String>,
    #[serde(default)]
    pub time_taken: u64,
}

//
// Leaderboard
//

#[derive(Debug, Deserialize)]
pub struct LeaderboardResponse {
    pub success: bool,
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardEntry {
    pub rank_position: u32,
    pub username: String,
    #[serde(default)]
    pub total_score: i64,
    #[serde(default)]
    pub total_solved: u32,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub best_language: Option<String>,
    #[serde(default)]
    pub best_difficulty: Option<String>,
    #[serde(default)]
    pub streak_days: u32,
    #[serde(default)]
    pub medal: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserPositionResponse {
    pub success: bool,
    #[serde(default)]
    pub position: Option<UserPosition>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPosition {
    pub rank_position: u32,
    #[serde(default)]
    pub total_score: i64,
    #[serde(default)]
    pub total_solved: u32,
    #[serde(default = "default_level")]
    pub level: u32,
}

//
// Accounts
//

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub fullname: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_dto_orders_hidden_cases_last() {
        let raw = r#"{
          "success": true,
          "challenge": {
            "challenge_id": 4,
            "title": "Sum",
            "problem_statement": "Add",
            "buggy_code": "def add(a, b): return a - b",
            "test_cases": [
              {"input": "1 2", "expected_output": "3"},
              {"input": "x", "hidden": true},
              {"input": "2 2", "expected_output": "4"}
            ],
            "hidden_test_cases": [{"input": "9 9", "expected_output": "18"}],
            "hints": ["look at the operator"]
          }
        }"#;
        let resp: ChallengeResponse = serde_json::from_str(raw).unwrap();
        let ch = resp.challenge.unwrap().into_challenge(Language::Python, Difficulty::Basic);

        assert_eq!(ch.visible_count(), 2);
        assert_eq!(ch.hidden_count(), 2);
        assert!(!ch.test_cases[1].hidden);
        assert!(ch.test_cases[2].hidden && ch.test_cases[3].hidden);
        assert_eq!(ch.max_score, 10);
        assert_eq!(ch.difficulty, Difficulty::Basic);
    }

    #[test]
    fn validate_request_omits_cache_when_not_skipping() {
        let req = ValidateRequest {
            code: "x".into(),
            language: Language::Java,
            challenge_id: 1,
            difficulty: Difficulty::Advanced,
            username: None,
            skip_visible_tests: false,
            cached_visible_results: None,
            hints_used: 0,
            attempts: 1,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["language"], "java");
        assert_eq!(v["difficulty"], "advanced");
        assert!(v.get("cached_visible_results").is_none());
        assert!(v.get("username").is_none());
    }

    #[test]
    fn validate_response_detects_compilation_phase() {
        let resp: ValidateResponse =
            serde_json::from_str(r#"{"success":false,"phase":"COMPILATION","error":"bad indent"}"#).unwrap();
        assert!(resp.is_compilation_failure());
        assert!(!resp.all_passed);
    }
}
