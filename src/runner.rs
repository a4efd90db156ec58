//! Challenge workflow: load, Run (visible cases only) and Submit (full
//! validation), reconciled into the `ChallengeSession`.
//!
//! This includes:
//!   - load with id -> `first` fallback
//!   - the visible-run cache that lets Submit skip the visible phase
//!   - the at-most-once completion side effect (XP award)
//!
//! Every operation either updates the session and returns a report, or returns
//! a `ClientError` leaving the session in a well-defined state (never Running).

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::api::Backend;
use crate::config::ClientConfig;
use crate::domain::{Challenge, ChallengeRef, Difficulty, Language, RunCache, SubmissionAttempt, TestCase, TestResult, TestStatus};
use crate::error::{ClientError, ClientResult};
use crate::profile::{fetch_stats, PlayerStats};
use crate::protocol::{ChallengeResponse, CompleteRequest, ExecuteRequest, ProblemSummary, TestOutcome, ValidateRequest, ValidateResponse};
use crate::session::ChallengeSession;

pub const HIDDEN_PASSED_OUTPUT: &str = "[Hidden Test Output]";
pub const HIDDEN_FAILED_OUTPUT: &str = "Test Failed";
const COMPILATION_FALLBACK: &str = "Your code has syntax or indentation errors that prevent compilation.";

/// Pushed to the front end whenever it should re-render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
  Loaded { challenge_id: u32 },
  ResultsChanged { running: usize, completed: usize, total: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadReport {
  pub challenge_id: u32,
  pub title: String,
  /// The requested id was unavailable and `first` was served instead.
  pub fell_back: bool,
  pub is_solved: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunReport {
  pub passed: usize,
  pub total: usize,
  pub all_passed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
  Recorded {
    xp_awarded: Option<u64>,
    new_xp: Option<u64>,
    new_level: Option<u32>,
    leveled_up: bool,
  },
  /// The backend says this user already solved it; no credit.
  AlreadyCompleted,
  /// Recorded earlier in this session.
  AlreadyRecorded,
  /// No logged-in user, nothing was saved.
  NotSaved,
  Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitReport {
  Solved {
    score: u32,
    time_taken: u64,
    visible_passed: usize,
    hidden_passed: usize,
    reused_visible: bool,
    completion: Completion,
  },
  /// Visible cases pass, hidden ones do not.
  HiddenFailed {
    hidden_passed: usize,
    hidden_total: usize,
  },
  Failed {
    visible_passed: usize,
    visible_total: usize,
    message: Option<String>,
  },
}

pub struct TestRunner {
  backend: Arc<dyn Backend>,
  config: ClientConfig,
  session: ChallengeSession,
  username: Option<String>,
  stats: Option<PlayerStats>,
  events: Option<UnboundedSender<SessionEvent>>,
}

impl TestRunner {
  pub fn new(backend: Arc<dyn Backend>, config: ClientConfig, language: Language, difficulty: Difficulty) -> Self {
    let session = ChallengeSession::new(config.scoring, language, difficulty, ChallengeRef::First);
    Self { backend, config, session, username: None, stats: None, events: None }
  }

  pub fn with_events(mut self, tx: UnboundedSender<SessionEvent>) -> Self {
    self.events = Some(tx);
    self
  }

  pub fn session(&self) -> &ChallengeSession { &self.session }
  pub fn config(&self) -> &ClientConfig { &self.config }
  pub fn backend(&self) -> Arc<dyn Backend> { self.backend.clone() }
  pub fn username(&self) -> Option<&str> { self.username.as_deref() }
  pub fn stats(&self) -> Option<PlayerStats> { self.stats }

  pub fn set_username(&mut self, username: Option<String>) {
    if username != self.username {
      self.stats = None;
    }
    self.username = username;
  }

  /// Editor content changed outside of Run/Submit.
  pub fn set_code(&mut self, code: &str) -> bool {
    self.session.set_code(code)
  }

  fn emit(&self, event: SessionEvent) {
    if let Some(tx) = &self.events {
      // A closed receiver just means nobody is rendering anymore.
      let _ = tx.send(event);
    }
  }

  fn emit_results(&self) {
    let results = self.session.results();
    self.emit(SessionEvent::ResultsChanged {
      running: results.iter().filter(|r| r.status == TestStatus::Running).count(),
      completed: results.iter().filter(|r| r.is_completed()).count(),
      total: results.len(),
    });
  }

  // ---------------- Loading ----------------

  /// Fetch and install a challenge. An unavailable id falls back to `first` once.
  /// On failure the current challenge stays loaded and untouched.
  #[instrument(level = "info", skip(self, reference), fields(reference = %reference.path_segment()))]
  pub async fn load(&mut self, language: Language, difficulty: Difficulty, reference: ChallengeRef) -> ClientResult<LoadReport> {
    let user = self.username.clone();
    let mut resp = self.backend.fetch_challenge(language, difficulty, reference, user.as_deref()).await?;
    let mut fell_back = false;

    if !resp.success || resp.challenge.is_none() {
      if let ChallengeRef::Id(id) = reference {
        warn!(target: "challenge", id, error = ?resp.error, "Challenge unavailable; falling back to first");
        resp = self.backend.fetch_challenge(language, difficulty, ChallengeRef::First, user.as_deref()).await?;
        fell_back = true;
      }
    }

    let ChallengeResponse { success, challenge, is_solved, error } = resp;
    let dto = match (success, challenge) {
      (true, Some(dto)) => dto,
      _ => {
        let msg = error.unwrap_or_else(|| "Failed to load challenge".to_string());
        warn!(target: "challenge", error = %msg, "Challenge load failed; keeping current session");
        return Err(ClientError::Network(msg));
      }
    };

    let challenge = dto.into_challenge(language, difficulty);
    let report = LoadReport {
      challenge_id: challenge.challenge_id,
      title: challenge.title.clone(),
      fell_back,
      is_solved,
    };
    self.session.install_challenge(challenge, is_solved);
    info!(target: "challenge", id = report.challenge_id, fell_back, is_solved, "Challenge loaded");
    self.emit(SessionEvent::Loaded { challenge_id: report.challenge_id });
    Ok(report)
  }

  /// Reload whatever the session currently points at.
  pub async fn reload(&mut self) -> ClientResult<LoadReport> {
    let s = &self.session;
    let (language, difficulty, reference) = (s.language(), s.difficulty(), s.reference());
    self.load(language, difficulty, reference).await
  }

  pub async fn load_random(&mut self, difficulty: Option<Difficulty>) -> ClientResult<LoadReport> {
    let difficulty = difficulty.unwrap_or(self.session.difficulty());
    self.load(self.session.language(), difficulty, ChallengeRef::Random).await
  }

  /// Switch language and reload the current challenge reference in it.
  pub async fn change_language(&mut self, language: Language) -> ClientResult<LoadReport> {
    if self.session.challenge().is_none() {
      self.session.change_language(language);
    }
    let (difficulty, reference) = (self.session.difficulty(), self.session.reference());
    self.load(language, difficulty, reference).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn list_problems(&self, difficulty: Difficulty) -> ClientResult<Vec<ProblemSummary>> {
    let resp = self.backend.list_challenges(self.session.language(), difficulty).await?;
    if !resp.success {
      return Err(ClientError::Network(resp.error.unwrap_or_else(|| "Failed to load problems".into())));
    }
    Ok(resp.challenges)
  }

  pub fn reveal_hint(&mut self) -> ClientResult<(usize, String)> {
    self.session.reveal_next_hint()
  }

  /// Refresh XP/level for the logged-in user. No user, no call.
  pub async fn refresh_stats(&mut self) -> ClientResult<Option<PlayerStats>> {
    let Some(username) = self.username.clone() else {
      return Ok(None);
    };
    let stats = fetch_stats(self.backend.as_ref(), &username).await?;
    self.stats = Some(stats);
    Ok(Some(stats))
  }

  fn precheck(&self, code: &str) -> ClientResult<Challenge> {
    let challenge = self.session.require_challenge()?.clone();
    if code.trim().is_empty() {
      return Err(ClientError::validation("Please write some code first"));
    }
    Ok(challenge)
  }

  // ---------------- Run ----------------

  /// Execute the visible cases only. A fully passing run is cached for Submit.
  #[instrument(level = "info", skip(self, code), fields(code_len = code.len()))]
  pub async fn run(&mut self, code: &str) -> ClientResult<RunReport> {
    let challenge = self.precheck(code)?;
    self.session.set_code(code);

    let visible: Vec<TestCase> = challenge.visible_cases().cloned().collect();
    let visible_total = visible.len();
    self.session.begin_run();
    self.emit_results();

    let req = ExecuteRequest {
      code: code.to_string(),
      language: self.session.language(),
      test_cases: visible,
      challenge_id: Some(challenge.challenge_id),
      difficulty: Some(self.session.difficulty()),
    };

    let limit = self.config.run_timeout();
    let resp = match timeout(limit, self.backend.execute(&req)).await {
      Ok(Ok(resp)) => resp,
      Ok(Err(e)) => {
        let e = match e {
          ClientError::Timeout(_) => ClientError::Timeout(limit.as_secs()),
          other => other,
        };
        warn!(target: "challenge", error = %e, "Run failed; results reset");
        self.session.clear_results();
        self.emit_results();
        return Err(e);
      }
      Err(_) => {
        warn!(target: "challenge", secs = limit.as_secs(), "Run timed out; results reset");
        self.session.clear_results();
        self.emit_results();
        return Err(ClientError::Timeout(limit.as_secs()));
      }
    };

    if !resp.success {
      let compile = resp.is_compilation_failure();
      let msg = resp.error.clone().unwrap_or_else(|| {
        if compile { COMPILATION_FALLBACK.to_string() } else { "Test execution failed".to_string() }
      });
      let visible_results = if resp.test_results.is_empty() {
        vec![TestResult::completed(false, "", Some(msg.clone())); visible_total]
      } else {
        fit(resp.test_results.into_iter().map(TestResult::from).collect(), visible_total)
      };
      self.install_results(&challenge, visible_results, Vec::new())?;
      self.emit_results();
      info!(target: "challenge", compile, "Run rejected by backend");
      return Err(if compile { ClientError::Compilation(msg) } else { ClientError::TestFailure(msg) });
    }

    let visible_results = fit(resp.test_results.into_iter().map(TestResult::from).collect(), visible_total);
    let passed = visible_results.iter().filter(|r| r.is_completed() && r.passed).count();
    let all_passed = passed == visible_total && visible_total > 0;

    self.install_results(&challenge, visible_results.clone(), Vec::new())?;
    self.session.store_run_cache(RunCache { code: code.to_string(), results: visible_results, all_passed });
    self.emit_results();

    info!(target: "challenge", passed, total = visible_total, all_passed, "Run completed");
    Ok(RunReport { passed, total: visible_total, all_passed })
  }

  // ---------------- Submit ----------------

  /// Full validation. Identical code that fully passed its last Run only sends the hidden phase.
  #[instrument(level = "info", skip(self, code), fields(code_len = code.len()))]
  pub async fn submit(&mut self, code: &str) -> ClientResult<SubmitReport> {
    let challenge = self.precheck(code)?;
    self.session.set_code(code);

    let cached: Option<Vec<TestResult>> = self
      .session
      .run_cache()
      .filter(|c| c.reusable_for(code))
      .map(|c| c.results.clone());
    let reused_visible = cached.is_some();
    let snapshot = self.session.begin_submit(cached.as_deref());
    self.emit_results();
    self.session.record_attempt();

    let req = ValidateRequest {
      code: code.to_string(),
      language: self.session.language(),
      challenge_id: challenge.challenge_id,
      difficulty: self.session.difficulty(),
      username: self.username.clone(),
      skip_visible_tests: reused_visible,
      cached_visible_results: cached.as_ref().map(|v| v.iter().map(TestOutcome::from).collect()),
      hints_used: self.session.hints_revealed(),
      attempts: self.session.attempts(),
    };
    debug!(target: "challenge", reused_visible, attempts = req.attempts, "Submitting solution");

    let limit = self.config.submit_timeout();
    let resp = match timeout(limit, self.backend.validate(&req)).await {
      Ok(Ok(resp)) => resp,
      Ok(Err(ClientError::Timeout(_))) | Err(_) => {
        warn!(target: "challenge", secs = limit.as_secs(), "Submit timed out; results reset");
        self.session.clear_results();
        self.emit_results();
        return Err(ClientError::Timeout(limit.as_secs()));
      }
      Ok(Err(e)) => {
        // Unusable response: the result list goes back to what it was.
        warn!(target: "challenge", error = %e, "Submit failed; results restored");
        self.session.restore_results(snapshot);
        self.emit_results();
        return Err(e);
      }
    };

    self.reconcile_submit(&challenge, code, cached, snapshot, resp).await
  }

  async fn reconcile_submit(
    &mut self,
    challenge: &Challenge,
    code: &str,
    cached: Option<Vec<TestResult>>,
    snapshot: Vec<TestResult>,
    resp: ValidateResponse,
  ) -> ClientResult<SubmitReport> {
    let visible_total = challenge.visible_count();
    let hidden_total = challenge.hidden_count();
    let reused_visible = cached.is_some();

    if resp.is_compilation_failure() {
      let msg = resp.error.clone().unwrap_or_else(|| COMPILATION_FALLBACK.to_string());
      let visible = vec![TestResult::completed(false, "", Some(msg.clone())); visible_total];
      self.install_results(challenge, visible, Vec::new())?;
      self.session.apply_failure_penalty();
      self.session.note_attempt(SubmissionAttempt::new(code, 0, 0, None));
      self.emit_results();
      info!(target: "challenge", score = self.session.score(), "Submit failed to compile");
      return Err(ClientError::Compilation(msg));
    }

    let ValidateResponse {
      success,
      all_passed,
      visible_results,
      hidden_results,
      test_results,
      error,
      already_completed,
      xp_awarded,
      new_level,
      new_xp,
      ..
    } = resp;

    let judged = success || visible_results.is_some() || hidden_results.is_some() || !test_results.is_empty();
    if !judged {
      let msg = error.unwrap_or_else(|| "Submission failed".to_string());
      warn!(target: "challenge", error = %msg, "Submit rejected without results; results restored");
      self.session.restore_results(snapshot);
      self.emit_results();
      return Err(ClientError::TestFailure(msg));
    }

    let visible: Vec<TestResult> = match cached {
      Some(results) => fit(results, visible_total),
      None => {
        let outcomes = visible_results
          .map(|p| p.test_results)
          .filter(|v| !v.is_empty())
          .unwrap_or_else(|| test_results.iter().take(visible_total).cloned().collect());
        fit(outcomes.into_iter().map(TestResult::from).collect(), visible_total)
      }
    };
    let visible_passed = count_passed(&visible);
    let visible_all_passed = visible_passed == visible_total;
    let overall = success && all_passed;

    let hidden: Vec<TestResult> = match hidden_results.map(|p| p.test_results).filter(|v| !v.is_empty()) {
      Some(outcomes) => outcomes.into_iter().map(|o| masked_hidden(o.passed)).collect(),
      None if overall => vec![masked_hidden(true); hidden_total],
      // The hidden phase only runs once the visible cases pass.
      None if visible_all_passed => vec![masked_hidden(false); hidden_total],
      None => Vec::new(),
    };
    let hidden_passed = count_passed(&hidden);

    self.install_results(challenge, visible, hidden)?;

    if overall {
      let score = self.session.score();
      self.session.mark_solved(SubmissionAttempt::new(code, visible_passed, hidden_passed, Some(score)));
      let time_taken = self.session.elapsed_seconds();
      let mut completion = self.record_completion(challenge, score, time_taken, already_completed).await;
      // Backends that award XP during validation report it there instead.
      if let Completion::Recorded { xp_awarded: xp, new_xp: total, new_level: level, .. } = &mut completion {
        *xp = xp.or(xp_awarded);
        *total = total.or(new_xp);
        *level = level.or(new_level);
      }
      self.emit_results();
      info!(target: "challenge", score, time_taken, ?completion, "Challenge solved");
      return Ok(SubmitReport::Solved { score, time_taken, visible_passed, hidden_passed, reused_visible, completion });
    }

    self.session.apply_failure_penalty();
    self.session.note_attempt(SubmissionAttempt::new(code, visible_passed, hidden_passed, None));
    self.emit_results();
    info!(target: "challenge", visible_passed, hidden_passed, score = self.session.score(), "Submission judged wrong");

    if visible_all_passed && hidden_total > 0 {
      Ok(SubmitReport::HiddenFailed { hidden_passed, hidden_total })
    } else {
      Ok(SubmitReport::Failed { visible_passed, visible_total, message: error })
    }
  }

  /// The XP-awarding side effect. Fires at most once per loaded challenge.
  #[instrument(level = "info", skip(self, challenge), fields(id = challenge.challenge_id))]
  async fn record_completion(&mut self, challenge: &Challenge, score: u32, time_taken: u64, already_completed: bool) -> Completion {
    if already_completed {
      self.session.claim_completion();
      return Completion::AlreadyCompleted;
    }
    let Some(username) = self.username.clone() else {
      return Completion::NotSaved;
    };
    if !self.session.claim_completion() {
      return Completion::AlreadyRecorded;
    }

    let req = CompleteRequest {
      username,
      language: self.session.language(),
      difficulty: self.session.difficulty(),
      challenge_id: challenge.challenge_id,
      challenge_title: challenge.title.clone(),
      time_taken,
      score,
    };
    let previous_level = self.stats.map(|s| s.level);

    let completion = match self.backend.complete_challenge(&req).await {
      Ok(resp) if resp.success => {
        let before = resp.current_level.or(previous_level);
        let leveled_up = matches!((resp.new_level, before), (Some(n), Some(b)) if n > b);
        Completion::Recorded {
          xp_awarded: resp.xp_awarded,
          new_xp: resp.new_xp,
          new_level: resp.new_level,
          leveled_up,
        }
      }
      Ok(resp) => Completion::Failed(resp.error.unwrap_or_else(|| "Failed to record completion".into())),
      Err(e) => Completion::Failed(e.to_string()),
    };

    if let Err(e) = self.refresh_stats().await {
      warn!(target: "bugyou", error = %e, "Could not refresh user stats after completion");
    }
    completion
  }

  fn install_results(&mut self, challenge: &Challenge, visible: Vec<TestResult>, hidden: Vec<TestResult>) -> ClientResult<()> {
    let mut all = fit(visible, challenge.visible_count());
    all.extend(fit(hidden, challenge.hidden_count()));
    self.session.record_results(all)
  }
}

/// Exactly `len` entries; missing ones read as not run.
fn fit(mut results: Vec<TestResult>, len: usize) -> Vec<TestResult> {
  results.truncate(len);
  results.resize(len, TestResult::pending());
  results
}

fn count_passed(results: &[TestResult]) -> usize {
  results.iter().filter(|r| r.is_completed() && r.passed).count()
}

fn masked_hidden(passed: bool) -> TestResult {
  let output = if passed { HIDDEN_PASSED_OUTPUT } else { HIDDEN_FAILED_OUTPUT };
  TestResult::completed(passed, output, None)
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use serde_json::json;

  use super::*;
  use crate::testing::{challenge_json, FakeBackend, Reply};

  fn runner(fake: &Arc<FakeBackend>) -> TestRunner {
    TestRunner::new(fake.clone(), ClientConfig::default(), Language::Python, Difficulty::Basic)
  }

  async fn loaded(fake: &Arc<FakeBackend>) -> TestRunner {
    fake.reply("challenge", Reply::Json(challenge_json(1, 3, 2, 2)));
    let mut r = runner(fake);
    r.load(Language::Python, Difficulty::Basic, ChallengeRef::Id(1)).await.unwrap();
    r
  }

  fn passing(n: usize) -> serde_json::Value {
    json!((0..n).map(|i| json!({"passed": true, "output": i.to_string()})).collect::<Vec<_>>())
  }

  #[tokio::test]
  async fn failed_load_keeps_previous_challenge() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    r.reveal_hint().unwrap();

    fake.reply("challenge", Reply::Json(json!({"success": false, "error": "Challenge not found"})));
    fake.reply("challenge", Reply::Json(json!({"success": false, "error": "Challenge not found"})));
    let err = r.load(Language::Python, Difficulty::Basic, ChallengeRef::Id(99)).await.unwrap_err();

    assert_eq!(err, ClientError::Network("Challenge not found".into()));
    assert_eq!(r.session().challenge().unwrap().challenge_id, 1);
    assert_eq!(r.session().score(), 8);
  }

  #[tokio::test]
  async fn unknown_id_falls_back_to_first() {
    let fake = Arc::new(FakeBackend::default());
    fake.reply("challenge", Reply::Json(json!({"success": false, "error": "nope"})));
    fake.reply("challenge", Reply::Json(challenge_json(5, 1, 0, 0)));
    let mut r = runner(&fake);

    let report = r.load(Language::Java, Difficulty::Basic, ChallengeRef::Id(42)).await.unwrap();
    assert!(report.fell_back);
    assert_eq!(report.challenge_id, 5);
    assert_eq!(r.session().reference(), ChallengeRef::Id(5));

    let refs: Vec<String> = fake.calls("challenge").iter().map(|c| c["reference"].as_str().unwrap_or("").to_string()).collect();
    assert_eq!(refs, vec!["42", "first"]);
  }

  #[tokio::test]
  async fn empty_code_or_missing_challenge_sends_nothing() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = runner(&fake);
    assert_eq!(r.run("print(1)").await.unwrap_err(), ClientError::validation("No challenge loaded"));

    let mut r = loaded(&fake).await;
    assert_eq!(r.run("   \n").await.unwrap_err(), ClientError::validation("Please write some code first"));
    assert!(matches!(r.submit("").await, Err(ClientError::Validation(_))));
    assert!(fake.calls("execute").is_empty());
    assert!(fake.calls("validate").is_empty());
  }

  #[tokio::test]
  async fn run_emits_running_before_results_and_caches_success() {
    let fake = Arc::new(FakeBackend::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut r = loaded(&fake).await.with_events(tx);

    fake.reply("execute", Reply::Json(json!({"success": true, "test_results": passing(3)})));
    let report = r.run("fixed").await.unwrap();

    assert_eq!(report, RunReport { passed: 3, total: 3, all_passed: true });
    assert_eq!(rx.try_recv().unwrap(), SessionEvent::ResultsChanged { running: 3, completed: 0, total: 5 });
    assert_eq!(fake.calls("execute")[0]["test_cases"].as_array().unwrap().len(), 3);
    assert!(r.session().run_cache().unwrap().reusable_for("fixed"));
    assert_eq!(r.session().results()[3].status, TestStatus::Pending);
  }

  #[tokio::test]
  async fn run_compilation_failure_is_distinct() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    fake.reply("execute", Reply::Json(json!({"success": false, "phase": "COMPILATION", "error": "IndentationError"})));

    let err = r.run("def f(:").await.unwrap_err();
    assert_eq!(err, ClientError::Compilation("IndentationError".into()));
    assert!(r.session().run_cache().is_none());
    assert!(r.session().results()[..3].iter().all(|res| res.is_failure()));
    // Run never costs points.
    assert_eq!(r.session().score(), 10);
  }

  #[tokio::test(start_paused = true)]
  async fn run_timeout_resets_results() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    fake.reply("execute", Reply::Delayed(Duration::from_secs(45), json!({"success": true, "test_results": passing(3)})));

    let err = r.run("slow").await.unwrap_err();
    assert_eq!(err, ClientError::Timeout(30));
    assert!(r.session().results().iter().all(|res| res.status == TestStatus::Pending));
  }

  #[tokio::test]
  async fn submit_reuses_cached_visible_results() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    r.set_username(Some("ada".into()));

    fake.reply("execute", Reply::Json(json!({"success": true, "test_results": passing(3)})));
    r.run("fixed").await.unwrap();

    fake.reply("validate", Reply::Json(json!({
      "success": true, "all_passed": true,
      "hidden_results": {"test_results": [{"passed": true, "output": "secret"}, {"passed": true, "output": "secret"}]}
    })));
    fake.reply("complete", Reply::Json(json!({"success": true, "xp_awarded": 10, "new_xp": 110, "new_level": 2, "current_level": 1})));
    fake.reply("stats", Reply::Json(json!({"success": true, "xp": 110, "level": 2})));

    let report = r.submit("fixed").await.unwrap();
    let sent = &fake.calls("validate")[0];
    assert_eq!(sent["skip_visible_tests"], true);
    assert_eq!(sent["cached_visible_results"].as_array().unwrap().len(), 3);

    match report {
      SubmitReport::Solved { reused_visible, completion, hidden_passed, .. } => {
        assert!(reused_visible);
        assert_eq!(hidden_passed, 2);
        assert_eq!(completion, Completion::Recorded { xp_awarded: Some(10), new_xp: Some(110), new_level: Some(2), leveled_up: true });
      }
      other => panic!("unexpected {:?}", other),
    }
    assert!(r.session().clock_stopped());
    assert!(r.session().results()[3..].iter().all(|res| res.output == HIDDEN_PASSED_OUTPUT));
    assert_eq!(r.stats(), Some(PlayerStats { xp: 110, level: 2 }));

    // A second submit with the same code does not award credit again.
    fake.reply("validate", Reply::Json(json!({"success": true, "all_passed": true})));
    let again = r.submit("fixed").await.unwrap();
    assert!(matches!(again, SubmitReport::Solved { completion: Completion::AlreadyRecorded, .. }));
    assert_eq!(fake.calls("complete").len(), 1);
  }

  #[tokio::test]
  async fn edited_code_forces_fresh_visible_phase() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    fake.reply("execute", Reply::Json(json!({"success": true, "test_results": passing(3)})));
    r.run("fixed").await.unwrap();

    fake.reply("validate", Reply::Json(json!({"success": true, "all_passed": true, "test_results": passing(3)})));
    let report = r.submit("fixed!").await.unwrap();

    assert_eq!(fake.calls("validate")[0]["skip_visible_tests"], false);
    assert!(matches!(report, SubmitReport::Solved { reused_visible: false, completion: Completion::NotSaved, .. }));
    assert!(fake.calls("complete").is_empty());
  }

  #[tokio::test]
  async fn hidden_failure_warns_and_penalises() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    fake.reply("validate", Reply::Json(json!({
      "success": false, "all_passed": false, "error": "Hidden test cases failed",
      "visible_results": {"test_results": passing(3)}
    })));

    let report = r.submit("almost").await.unwrap();
    assert_eq!(report, SubmitReport::HiddenFailed { hidden_passed: 0, hidden_total: 2 });
    assert_eq!(r.session().score(), 9);
    assert_eq!(r.session().wrong_submissions(), 1);
    assert!(!r.session().clock_stopped());
    assert!(r.session().results()[3..].iter().all(|res| res.output == HIDDEN_FAILED_OUTPUT && !res.passed));
  }

  #[tokio::test]
  async fn non_json_submit_leaves_results_untouched() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    let before = r.session().results().to_vec();
    fake.reply("validate", Reply::Err(crate::api::server_error("<html>502 Bad Gateway</html>")));

    let err = r.submit("anything").await.unwrap_err();
    assert_eq!(err, ClientError::Network("Server error: <html>502 Bad Gateway</html>".into()));
    assert_eq!(r.session().results(), before.as_slice());
    assert_eq!(r.session().score(), 10);
  }

  #[tokio::test(start_paused = true)]
  async fn submit_timeout_resets_results() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    fake.reply("validate", Reply::Delayed(Duration::from_secs(120), json!({"success": true, "all_passed": true})));

    assert_eq!(r.submit("x").await.unwrap_err(), ClientError::Timeout(60));
    assert!(r.session().results().iter().all(|res| res.status == TestStatus::Pending));
  }

  #[tokio::test]
  async fn already_completed_skips_completion_call() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    r.set_username(Some("ada".into()));
    fake.reply("validate", Reply::Json(json!({"success": true, "all_passed": true, "already_completed": true})));

    let report = r.submit("done before").await.unwrap();
    assert!(matches!(report, SubmitReport::Solved { completion: Completion::AlreadyCompleted, .. }));
    assert!(fake.calls("complete").is_empty());
  }

  #[tokio::test]
  async fn language_change_reloads_and_clears_cache() {
    let fake = Arc::new(FakeBackend::default());
    let mut r = loaded(&fake).await;
    fake.reply("execute", Reply::Json(json!({"success": true, "test_results": passing(3)})));
    r.run("fixed").await.unwrap();

    fake.reply("challenge", Reply::Json(challenge_json(1, 2, 0, 1)));
    r.change_language(Language::Javascript).await.unwrap();

    assert_eq!(r.session().language(), Language::Javascript);
    assert!(r.session().run_cache().is_none());
    assert_eq!(fake.calls("challenge").last().unwrap()["language"], "javascript");
  }
}
