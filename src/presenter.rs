//! Result presentation: a pure projection of session + runner outcomes onto
//! what the screen shows (case tabs, detail panel, notification banner,
//! submission-summary modal). No network access happens here.
//!
//! Time is passed in (`now`) so expiry is deterministic under test.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use crate::config::UiTimings;
use crate::domain::{TestResult, TestStatus};
use crate::error::ClientError;
use crate::runner::{Completion, LoadReport, RunReport, SubmitReport};
use crate::session::ChallengeSession;
use crate::util::{display_output, format_mmss};

const TIMEOUT_MESSAGE: &str =
  "Test execution took longer than expected. This might be due to network issues or complex test cases. Please try again.";
const HIDDEN_FAILED_MESSAGE: &str =
  "Your code passed all visible test cases but failed some hidden test cases. Try to make your solution more robust!";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
  Success,
  Info,
  Warning,
  Error,
  Compilation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub message: String,
  pub kind: NoticeKind,
  shown_at: Instant,
  ttl: Duration,
}

impl Notification {
  pub fn expired(&self, now: Instant) -> bool {
    now.saturating_duration_since(self.shown_at) >= self.ttl
  }
}

/// Submission summary. Stays until dismissed or its (longer) ttl runs out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modal {
  pub title: String,
  pub lines: Vec<String>,
  shown_at: Instant,
  ttl: Duration,
}

impl Modal {
  pub fn expired(&self, now: Instant) -> bool {
    now.saturating_duration_since(self.shown_at) >= self.ttl
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseBadge {
  NotRun,
  Running,
  Passed,
  Failed,
}

impl CaseBadge {
  pub fn of(result: Option<&TestResult>) -> Self {
    match result {
      Some(r) if r.status == TestStatus::Running => CaseBadge::Running,
      Some(r) if r.status == TestStatus::Completed && r.passed => CaseBadge::Passed,
      Some(r) if r.status == TestStatus::Completed => CaseBadge::Failed,
      _ => CaseBadge::NotRun,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      CaseBadge::NotRun => "not run",
      CaseBadge::Running => "running",
      CaseBadge::Passed => "passed",
      CaseBadge::Failed => "failed",
    }
  }

  fn glyph(&self) -> &'static str {
    match self {
      CaseBadge::NotRun => "·",
      CaseBadge::Running => "…",
      CaseBadge::Passed => "✓",
      CaseBadge::Failed => "✗",
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseTab {
  pub index: usize,
  pub label: String,
  pub hidden: bool,
  pub badge: CaseBadge,
  pub selected: bool,
}

/// Detail panel for one case. Hidden cases carry no input/expected/actual text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseDetail {
  pub index: usize,
  pub hidden: bool,
  pub badge: CaseBadge,
  pub description: Option<String>,
  pub input: Option<String>,
  pub expected: Option<String>,
  pub actual: Option<String>,
  pub comparison: Option<String>,
}

#[derive(Debug)]
pub struct ResultPresenter {
  timings: UiTimings,
  selected: usize,
  notification: Option<Notification>,
  modal: Option<Modal>,
}

impl ResultPresenter {
  pub fn new(timings: UiTimings) -> Self {
    Self { timings, selected: 0, notification: None, modal: None }
  }

  pub fn selected(&self) -> usize { self.selected }

  // --- Selection ---

  /// New challenge: nothing from the previous one survives.
  pub fn reset(&mut self) {
    self.selected = 0;
    self.modal = None;
  }

  /// After a result update jump to the first failing case; otherwise keep the selection.
  pub fn on_results(&mut self, session: &ChallengeSession) {
    if let Some(i) = session.results().iter().position(TestResult::is_failure) {
      self.selected = i;
    }
    let len = session.challenge().map(|c| c.test_cases.len()).unwrap_or(0);
    if self.selected >= len {
      self.selected = 0;
    }
  }

  pub fn select(&mut self, session: &ChallengeSession, index: usize) -> Result<(), ClientError> {
    let len = session.challenge().map(|c| c.test_cases.len()).unwrap_or(0);
    if index >= len {
      return Err(ClientError::validation(format!("No test case {} (there are {})", index + 1, len)));
    }
    self.selected = index;
    Ok(())
  }

  pub fn tabs(&self, session: &ChallengeSession) -> Vec<CaseTab> {
    let Some(ch) = session.challenge() else { return Vec::new() };
    let (mut visible_n, mut hidden_n) = (0, 0);
    ch.test_cases
      .iter()
      .enumerate()
      .map(|(i, tc)| {
        let label = if tc.hidden {
          hidden_n += 1;
          format!("Hidden {}", hidden_n)
        } else {
          visible_n += 1;
          format!("Case {}", visible_n)
        };
        CaseTab {
          index: i,
          label,
          hidden: tc.hidden,
          badge: CaseBadge::of(session.results().get(i)),
          selected: i == self.selected,
        }
      })
      .collect()
  }

  pub fn detail(&self, session: &ChallengeSession) -> Option<CaseDetail> {
    let ch = session.challenge()?;
    let tc = ch.test_cases.get(self.selected)?;
    let result = session.results().get(self.selected);
    let badge = CaseBadge::of(result);

    if tc.hidden {
      return Some(CaseDetail {
        index: self.selected,
        hidden: true,
        badge,
        description: None,
        input: None,
        expected: None,
        actual: None,
        comparison: None,
      });
    }

    let actual = result
      .filter(|r| r.status == TestStatus::Completed)
      .map(|r| if r.output.is_empty() && r.error.is_none() { "No output".to_string() } else { display_output(&r.output) });
    let comparison = match (badge, &actual) {
      (CaseBadge::Failed, Some(a)) => Some(format!("Expected: {}\nActual: {}", tc.expected_output, a)),
      _ => None,
    };

    Some(CaseDetail {
      index: self.selected,
      hidden: false,
      badge,
      description: tc.description.clone(),
      input: Some(tc.input.clone()),
      expected: Some(tc.expected_output.clone()),
      actual,
      comparison,
    })
  }

  // --- Transient surfaces ---

  pub fn notify(&mut self, kind: NoticeKind, title: impl Into<String>, message: impl Into<String>, now: Instant) {
    self.notification = Some(Notification {
      title: title.into(),
      message: message.into(),
      kind,
      shown_at: now,
      ttl: self.timings.notification_ttl(),
    });
  }

  pub fn show_modal(&mut self, title: impl Into<String>, lines: Vec<String>, now: Instant) {
    self.modal = Some(Modal { title: title.into(), lines, shown_at: now, ttl: self.timings.modal_ttl() });
  }

  pub fn dismiss_modal(&mut self) -> bool {
    self.modal.take().is_some()
  }

  pub fn dismiss_notification(&mut self) -> bool {
    self.notification.take().is_some()
  }

  /// Drop whatever has outlived its ttl.
  pub fn tick(&mut self, now: Instant) {
    if self.notification.as_ref().is_some_and(|n| n.expired(now)) {
      self.notification = None;
    }
    if self.modal.as_ref().is_some_and(|m| m.expired(now)) {
      self.modal = None;
    }
  }

  pub fn notification(&self) -> Option<&Notification> { self.notification.as_ref() }
  pub fn modal(&self) -> Option<&Modal> { self.modal.as_ref() }

  // --- Outcome mapping ---

  pub fn show_error(&mut self, err: &ClientError, now: Instant) {
    let (kind, title, message) = describe_error(err);
    self.notify(kind, title, message, now);
  }

  pub fn show_loaded(&mut self, report: &LoadReport, now: Instant) {
    self.reset();
    if report.fell_back {
      self.notify(NoticeKind::Warning, "Challenge Unavailable", format!("Loaded \"{}\" instead.", report.title), now);
    } else if report.is_solved {
      self.notify(NoticeKind::Info, "Already Solved", "You have solved this challenge before; no XP will be awarded.", now);
    }
  }

  pub fn show_run(&mut self, session: &ChallengeSession, report: &RunReport, now: Instant) {
    self.on_results(session);
    if report.all_passed {
      self.notify(NoticeKind::Success, "Success", "All test cases passed! Try submitting your solution.", now);
    } else {
      let failed = report.total - report.passed;
      let plural = if failed > 1 { "s" } else { "" };
      self.notify(
        NoticeKind::Warning,
        "Warning",
        format!("{} out of {} test cases passed. {} test{} failed.", report.passed, report.total, failed, plural),
        now,
      );
    }
  }

  pub fn show_submit(&mut self, session: &ChallengeSession, report: &SubmitReport, now: Instant) {
    self.on_results(session);
    match report {
      SubmitReport::Solved { score, .. } => self.notify(
        NoticeKind::Success,
        "Success",
        format!("Congratulations! All test cases passed (including hidden tests). Score: {}", score),
        now,
      ),
      SubmitReport::HiddenFailed { .. } => self.notify(NoticeKind::Warning, "Warning", HIDDEN_FAILED_MESSAGE, now),
      SubmitReport::Failed { message, .. } => self.notify(
        NoticeKind::Error,
        "Error",
        message.clone().unwrap_or_else(|| "Not all test cases passed. Please fix your solution and try again.".into()),
        now,
      ),
    }
    self.show_modal("Submission Results", summary_lines(session, report), now);
  }

  pub fn show_hint(&mut self, index: usize, penalty: u32, now: Instant) {
    self.notify(NoticeKind::Info, "Hint Revealed", format!("Hint {} has been revealed! (-{} points)", index + 1, penalty), now);
  }

  // --- Text rendering ---

  pub fn render(&self, session: &ChallengeSession, now: Instant) -> String {
    let mut out = String::new();
    let Some(ch) = session.challenge() else {
      out.push_str("No challenge loaded. Use `load` or `random`.\n");
      self.render_surfaces(&mut out, now);
      return out;
    };

    let solved = if session.is_solved() { "  ✓ solved" } else { "" };
    let _ = writeln!(out, "── {} #{}: {}{}", ch.language.display_name(), ch.challenge_id, ch.title, solved);
    let _ = writeln!(
      out,
      "   {}  ·  score {}/{}  ·  time {}  ·  hints {}/{}  ·  attempts {}",
      crate::util::capitalize_first(ch.difficulty.as_str()),
      session.score(),
      ch.max_score,
      format_mmss(session.elapsed_seconds()),
      session.hints_revealed(),
      ch.hints.len(),
      session.attempts()
    );
    if !ch.problem_statement.is_empty() {
      let _ = writeln!(out, "\n{}", ch.problem_statement.trim_end());
    }
    for (i, hint) in session.revealed_hints().iter().enumerate() {
      let _ = writeln!(out, "💡 Hint {}: {}", i + 1, hint);
    }

    out.push('\n');
    let tabs: Vec<String> = self
      .tabs(session)
      .iter()
      .map(|t| if t.selected { format!("[{} {}]", t.badge.glyph(), t.label) } else { format!(" {} {} ", t.badge.glyph(), t.label) })
      .collect();
    let _ = writeln!(out, "{}", tabs.join(" "));
    let passed = session.passed_count();
    let _ = writeln!(out, "{}/{} tests passed", passed, ch.test_cases.len());

    if let Some(d) = self.detail(session) {
      out.push('\n');
      if d.hidden {
        let _ = writeln!(out, "Hidden test case ({})", d.badge.label());
      } else {
        if let Some(desc) = &d.description {
          let _ = writeln!(out, "{}", desc);
        }
        let _ = writeln!(out, "Input:    {}", d.input.as_deref().unwrap_or_default());
        let _ = writeln!(out, "Expected: {}", d.expected.as_deref().unwrap_or_default());
        if let Some(actual) = &d.actual {
          let _ = writeln!(out, "Actual:   {}", actual);
        }
        let _ = writeln!(out, "Result:   {}", d.badge.label());
        if let Some(cmp) = &d.comparison {
          let _ = writeln!(out, "{}", cmp);
        }
      }
    }

    self.render_surfaces(&mut out, now);
    out
  }

  fn render_surfaces(&self, out: &mut String, now: Instant) {
    if let Some(n) = self.notification.as_ref().filter(|n| !n.expired(now)) {
      let _ = writeln!(out, "\n[{:?}] {}: {}", n.kind, n.title, n.message);
    }
    if let Some(m) = self.modal.as_ref().filter(|m| !m.expired(now)) {
      let _ = writeln!(out, "\n┌ {}", m.title);
      for line in &m.lines {
        let _ = writeln!(out, "│ {}", line);
      }
      let _ = writeln!(out, "└ (`close` to dismiss)");
    }
  }
}

/// Notification (kind, title, message) for a failed action.
pub fn describe_error(err: &ClientError) -> (NoticeKind, &'static str, String) {
  match err {
    ClientError::Validation(m) => (NoticeKind::Error, "Error", m.clone()),
    ClientError::Network(m) => (NoticeKind::Error, "Error", m.clone()),
    ClientError::Compilation(m) => (NoticeKind::Compilation, "Error In Compilation", m.clone()),
    ClientError::TestFailure(m) => (NoticeKind::Error, "Error", m.clone()),
    ClientError::Timeout(_) => (NoticeKind::Error, "Timeout", TIMEOUT_MESSAGE.to_string()),
    ClientError::NoHintsAvailable => {
      (NoticeKind::Warning, "No More Hints", "You have used all available hints for this challenge.".to_string())
    }
    ClientError::Busy(_) => (NoticeKind::Info, "Please Wait", err.to_string()),
    ClientError::Persistence(m) => (NoticeKind::Error, "Storage Error", m.clone()),
    ClientError::Config(m) => (NoticeKind::Error, "Configuration Error", m.clone()),
  }
}

fn summary_lines(session: &ChallengeSession, report: &SubmitReport) -> Vec<String> {
  let (visible_total, hidden_total, max_score) = session
    .challenge()
    .map(|c| (c.visible_count(), c.hidden_count(), c.max_score))
    .unwrap_or((0, 0, 10));
  let mut lines = vec![
    format!("Score: {}/{}", session.score(), max_score),
    format!("Time: {}", format_mmss(session.elapsed_seconds())),
    format!("Attempts: {}", session.attempts()),
    format!("Hints used: {}", session.hints_revealed()),
  ];

  let (visible_passed, hidden_passed) = match report {
    SubmitReport::Solved { visible_passed, hidden_passed, .. } => (*visible_passed, *hidden_passed),
    SubmitReport::HiddenFailed { hidden_passed, .. } => (visible_total, *hidden_passed),
    SubmitReport::Failed { visible_passed, .. } => (*visible_passed, 0),
  };
  let total = visible_total + hidden_total;
  let total_passed = visible_passed + hidden_passed;

  lines.push(String::new());
  lines.push("🧪 Test Results:".into());
  lines.push(format!("   • Visible Tests: {}/{} passed", visible_passed, visible_total));
  if hidden_total > 0 {
    lines.push(format!("   • Hidden Tests: {}/{} passed", hidden_passed, hidden_total));
  }
  lines.push(format!("   • Overall: {}/{} tests passed", total_passed, total));

  if total > 0 {
    let pct = (total_passed * 100 + total / 2) / total;
    lines.push(String::new());
    lines.push(
      match pct {
        100 => "🎉 Perfect! All tests passed!",
        p if p >= 80 => "✅ Great job! Most tests passed.",
        p if p >= 60 => "⚠️  Good progress, but some tests failed.",
        _ => "❌ Several tests failed.",
      }
      .into(),
    );
  }

  if let SubmitReport::Solved { completion, .. } = report {
    lines.push(String::new());
    lines.push(match completion {
      Completion::Recorded { xp_awarded, new_xp, new_level, leveled_up } => {
        let mut s = format!("+{} XP", xp_awarded.unwrap_or(0));
        if let Some(xp) = new_xp {
          let _ = write!(s, " (total {})", xp);
        }
        if *leveled_up {
          let _ = write!(s, "  🎉 Level Up! You reached level {}", new_level.unwrap_or_default());
        }
        s
      }
      Completion::AlreadyCompleted => "Already completed: no XP awarded this time.".into(),
      Completion::AlreadyRecorded => "Completion already recorded for this challenge.".into(),
      Completion::NotSaved => "Log in to save your progress and earn XP.".into(),
      Completion::Failed(e) => format!("Progress could not be saved: {}", e),
    });
  }
  lines
}
