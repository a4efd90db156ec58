//! Challenge session: the single source of truth for "what challenge am I on,
//! and how am I doing".
//!
//! This module owns:
//!   - the loaded challenge and its ordered test cases (visible first)
//!   - the positional result list, one entry per test case
//!   - score, revealed hints, attempt counters and the elapsed-time clock
//!   - the single-slot run cache and the completion guard
//!
//! Nothing here touches the network; `runner` drives the transitions.

use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::config::ScoringRules;
use crate::domain::{Challenge, ChallengeRef, Difficulty, Language, RunCache, SubmissionAttempt, TestResult, TestStatus};
use crate::error::{ClientError, ClientResult};

/// Count-up clock that freezes for good once stopped.
#[derive(Clone, Debug)]
pub struct SessionClock {
    started: Instant,
    frozen: Option<u64>,
}

impl SessionClock {
    pub fn start() -> Self {
        Self { started: Instant::now(), frozen: None }
    }

    pub fn elapsed_seconds_at(&self, now: Instant) -> u64 {
        match self.frozen {
            Some(secs) => secs,
            None => now.saturating_duration_since(self.started).as_secs(),
        }
    }

    /// Freeze at the current value. Stopping twice keeps the first value.
    pub fn stop_at(&mut self, now: Instant) {
        if self.frozen.is_none() {
            self.frozen = Some(self.elapsed_seconds_at(now));
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.frozen.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ChallengeSession {
    rules: ScoringRules,
    language: Language,
    difficulty: Difficulty,
    reference: ChallengeRef,
    challenge: Option<Challenge>,
    is_solved: bool,
    code: String,
    results: Vec<TestResult>,
    score: u32,
    revealed_hints: usize,
    attempts: u32,
    wrong_submissions: u32,
    clock: SessionClock,
    run_cache: Option<RunCache>,
    solved_here: bool,
    completion_recorded: bool,
    last_attempt: Option<SubmissionAttempt>,
}

impl ChallengeSession {
    pub fn new(rules: ScoringRules, language: Language, difficulty: Difficulty, reference: ChallengeRef) -> Self {
        Self {
            rules,
            language,
            difficulty,
            reference,
            challenge: None,
            is_solved: false,
            code: String::new(),
            results: Vec::new(),
            score: rules.starting_score.min(rules.max_score),
            revealed_hints: 0,
            attempts: 0,
            wrong_submissions: 0,
            clock: SessionClock::start(),
            run_cache: None,
            solved_here: false,
            completion_recorded: false,
            last_attempt: None,
        }
    }

    // --- Read access ---

    pub fn challenge(&self) -> Option<&Challenge> { self.challenge.as_ref() }
    pub fn language(&self) -> Language { self.language }
    pub fn difficulty(&self) -> Difficulty { self.difficulty }
    pub fn reference(&self) -> ChallengeRef { self.reference }
    pub fn rules(&self) -> &ScoringRules { &self.rules }
    pub fn code(&self) -> &str { &self.code }
    pub fn results(&self) -> &[TestResult] { &self.results }
    pub fn score(&self) -> u32 { self.score }
    pub fn attempts(&self) -> u32 { self.attempts }
    pub fn wrong_submissions(&self) -> u32 { self.wrong_submissions }
    pub fn run_cache(&self) -> Option<&RunCache> { self.run_cache.as_ref() }
    pub fn is_solved(&self) -> bool { self.is_solved || self.solved_here }
    pub fn completion_recorded(&self) -> bool { self.completion_recorded }
    pub fn last_attempt(&self) -> Option<&SubmissionAttempt> { self.last_attempt.as_ref() }
    pub fn clock_stopped(&self) -> bool { self.clock.is_stopped() }

    pub fn hints_revealed(&self) -> usize { self.revealed_hints }

    pub fn revealed_hints(&self) -> &[String] {
        match &self.challenge {
            Some(ch) => &ch.hints[..self.revealed_hints.min(ch.hints.len())],
            None => &[],
        }
    }

    pub fn hints_remaining(&self) -> usize {
        self.challenge
            .as_ref()
            .map(|ch| ch.hints.len().saturating_sub(self.revealed_hints))
            .unwrap_or(0)
    }

    /// Seconds since the session started; frozen once a submission succeeded.
    pub fn elapsed_seconds(&self) -> u64 {
        self.clock.elapsed_seconds_at(Instant::now())
    }

    /// Fails with `Validation` when there is nothing to run against.
    pub fn require_challenge(&self) -> ClientResult<&Challenge> {
        self.challenge.as_ref().ok_or_else(|| ClientError::validation("No challenge loaded"))
    }

    // --- Lifecycle ---

    /// Replace the current challenge wholesale and reset all per-challenge state.
    #[instrument(level = "info", skip(self, challenge), fields(id = challenge.challenge_id, cases = challenge.test_cases.len()))]
    pub fn install_challenge(&mut self, challenge: Challenge, is_solved: bool) {
        self.reference = ChallengeRef::Id(challenge.challenge_id);
        self.difficulty = challenge.difficulty;
        self.language = challenge.language;
        self.code = challenge.buggy_code.clone();
        self.results = vec![TestResult::pending(); challenge.test_cases.len()];
        self.challenge = Some(challenge);
        self.is_solved = is_solved;
        self.solved_here = false;
        self.completion_recorded = false;
        self.last_attempt = None;
        self.reset_progress();
        info!(target: "challenge", language = %self.language, difficulty = %self.difficulty, "Challenge installed; session reset");
    }

    /// Switch language: progress restarts and the cache is dropped. The caller reloads.
    pub fn change_language(&mut self, language: Language) {
        self.language = language;
        self.reset_progress();
    }

    fn reset_progress(&mut self) {
        self.score = self.rules.starting_score.min(self.rules.max_score);
        self.revealed_hints = 0;
        self.attempts = 0;
        self.wrong_submissions = 0;
        self.clock = SessionClock::start();
        self.run_cache = None;
    }

    /// Editor content changed. Any difference, even one byte, drops the run cache.
    pub fn set_code(&mut self, code: impl Into<String>) -> bool {
        let code = code.into();
        if code == self.code {
            return false;
        }
        self.code = code;
        if self.run_cache.take().is_some() {
            debug!(target: "challenge", "Code changed; run cache invalidated");
        }
        true
    }

    // --- Hints and score ---

    /// Reveal hints in order; each costs `hint_penalty` points (score floors at 0).
    pub fn reveal_next_hint(&mut self) -> ClientResult<(usize, String)> {
        let next = self.revealed_hints;
        let hint = self
            .challenge
            .as_ref()
            .and_then(|ch| ch.hints.get(next))
            .cloned()
            .ok_or(ClientError::NoHintsAvailable)?;

        self.revealed_hints += 1;
        self.score = self.score.saturating_sub(self.rules.hint_penalty).min(self.rules.max_score);
        info!(target: "challenge", hint = next + 1, score = self.score, "Hint revealed");
        Ok((next, hint))
    }

    /// Judged-wrong submission. Never lowers a score already at or below the floor.
    pub fn apply_failure_penalty(&mut self) {
        self.wrong_submissions += 1;
        if self.score > self.rules.failure_floor {
            self.score = self
                .score
                .saturating_sub(self.rules.failure_penalty)
                .max(self.rules.failure_floor);
        }
        self.score = self.score.min(self.rules.max_score);
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    // --- Results ---

    /// Replace the result list. It must cover every test case (visible + hidden).
    pub fn record_results(&mut self, results: Vec<TestResult>) -> ClientResult<()> {
        let needed = self.challenge.as_ref().map(|c| c.test_cases.len()).unwrap_or(0);
        if results.len() < needed {
            return Err(ClientError::validation(format!(
                "Result set covers {} of {} test cases",
                results.len(),
                needed
            )));
        }
        self.results = results;
        Ok(())
    }

    /// Start of a Run: visible entries go Running, hidden ones wait. Returns the previous list.
    pub fn begin_run(&mut self) -> Vec<TestResult> {
        let fresh = match &self.challenge {
            Some(ch) => ch
                .test_cases
                .iter()
                .map(|tc| if tc.hidden { TestResult::pending() } else { TestResult::running() })
                .collect(),
            None => Vec::new(),
        };
        std::mem::replace(&mut self.results, fresh)
    }

    /// Start of a Submit. With `cached` visible results those are prefilled and only
    /// the hidden range runs; otherwise every entry is Running. Returns the previous list.
    pub fn begin_submit(&mut self, cached: Option<&[TestResult]>) -> Vec<TestResult> {
        let total = self.challenge.as_ref().map(|c| c.test_cases.len()).unwrap_or(0);
        let fresh = match cached {
            Some(visible) => {
                let mut v: Vec<TestResult> = visible.to_vec();
                v.resize(total.max(visible.len()), TestResult::running());
                v
            }
            None => vec![TestResult::running(); total],
        };
        std::mem::replace(&mut self.results, fresh)
    }

    /// Back to "not run" for every case.
    pub fn clear_results(&mut self) {
        let total = self.challenge.as_ref().map(|c| c.test_cases.len()).unwrap_or(0);
        self.results = vec![TestResult::pending(); total];
    }

    /// Put back a list taken by `begin_run`/`begin_submit` when the response was unusable.
    pub fn restore_results(&mut self, previous: Vec<TestResult>) {
        self.results = previous;
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status == TestStatus::Completed && r.passed).count()
    }

    // --- Run cache ---

    pub fn store_run_cache(&mut self, cache: RunCache) {
        self.run_cache = Some(cache);
    }

    pub fn clear_run_cache(&mut self) {
        self.run_cache = None;
    }

    // --- Completion ---

    /// Successful submission: freeze the clock and remember the attempt.
    pub fn mark_solved(&mut self, attempt: SubmissionAttempt) {
        self.clock.stop_at(Instant::now());
        self.solved_here = true;
        self.last_attempt = Some(attempt);
    }

    pub fn note_attempt(&mut self, attempt: SubmissionAttempt) {
        self.last_attempt = Some(attempt);
    }

    /// True exactly once per loaded challenge; later calls return false.
    pub fn claim_completion(&mut self) -> bool {
        if self.completion_recorded {
            return false;
        }
        self.completion_recorded = true;
        true
    }
}
