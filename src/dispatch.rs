//! Command dispatch: a parsed `Action` goes through debounce and per-control
//! in-flight checks, is reduced against the runner/presenter, and comes back
//! as text to render.
//!
//! Every error is caught here and turned into a notification. Nothing below
//! this layer prints.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::account::UserStore;
use crate::domain::{Challenge, ChallengeRef, Difficulty, Language};
use crate::error::{ClientError, ClientResult};
use crate::leaderboard::{self, LeaderboardFilter};
use crate::presenter::{NoticeKind, ResultPresenter};
use crate::profile;
use crate::runner::{LoadReport, TestRunner};

pub const HELP: &str = "\
Commands:
  load [id|first|random] [difficulty]   load a challenge
  random [difficulty]                   load a random challenge
  reload                                fetch the current challenge again
  lang <python|javascript|java|cpp>     switch language (progress restarts)
  run                                   run the visible test cases
  submit                                validate against all test cases
  hint                                  reveal the next hint (costs points)
  case <n>                              show test case n
  reset                                 restore the starter code
  problems [difficulty]                 list challenges
  leaderboard [overall|language:X|difficulty:Y]
  profile                               your progress and achievements
  close                                 dismiss the results panel
  show                                  redraw
  quit
";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
  Load { reference: ChallengeRef, difficulty: Option<Difficulty> },
  Random(Option<Difficulty>),
  Reload,
  Language(Language),
  Run,
  Submit,
  Hint,
  Case(usize),
  Reset,
  Problems(Option<Difficulty>),
  Leaderboard(LeaderboardFilter),
  Profile,
  Close,
  Show,
  Help,
  Quit,
}

/// Controls that are disabled while their own request is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Control {
  Run,
  Submit,
  Language,
  Load,
}

impl Control {
  pub fn label(&self) -> &'static str {
    match self {
      Control::Run => "Run",
      Control::Submit => "Submit",
      Control::Language => "Language change",
      Control::Load => "Loading",
    }
  }
}

impl Action {
  pub fn control(&self) -> Option<Control> {
    match self {
      Action::Run => Some(Control::Run),
      Action::Submit => Some(Control::Submit),
      Action::Language(_) => Some(Control::Language),
      Action::Load { .. } | Action::Random(_) | Action::Reload => Some(Control::Load),
      _ => None,
    }
  }

  /// Repeats of these within the debounce window collapse into the first.
  fn debounced(&self) -> bool {
    matches!(self, Action::Run | Action::Submit | Action::Language(_))
  }
}

fn optional_difficulty(arg: Option<&str>) -> Result<Option<Difficulty>, String> {
  arg.map(Difficulty::from_str).transpose()
}

impl FromStr for Action {
  type Err = String;

  fn from_str(line: &str) -> Result<Self, Self::Err> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else { return Ok(Action::Show) };
    let args: Vec<&str> = words.collect();
    let arg = |i: usize| args.get(i).copied();

    match cmd.to_ascii_lowercase().as_str() {
      "load" | "l" => {
        let reference = arg(0).map(ChallengeRef::from_str).transpose()?.unwrap_or(ChallengeRef::First);
        Ok(Action::Load { reference, difficulty: optional_difficulty(arg(1))? })
      }
      "random" => Ok(Action::Random(optional_difficulty(arg(0))?)),
      "reload" => Ok(Action::Reload),
      "lang" | "language" => {
        let lang = arg(0).ok_or("Usage: lang <python|javascript|java|cpp>")?;
        Ok(Action::Language(lang.parse()?))
      }
      "run" | "r" => Ok(Action::Run),
      "submit" | "s" => Ok(Action::Submit),
      "hint" | "h" => Ok(Action::Hint),
      "case" | "c" => {
        let n = arg(0).and_then(|s| s.parse::<usize>().ok()).filter(|n| *n > 0).ok_or("Usage: case <n>")?;
        Ok(Action::Case(n))
      }
      "reset" => Ok(Action::Reset),
      "problems" | "list" => Ok(Action::Problems(optional_difficulty(arg(0))?)),
      "leaderboard" | "lb" => Ok(Action::Leaderboard(arg(0).unwrap_or("overall").parse()?)),
      "profile" | "me" => Ok(Action::Profile),
      "close" => Ok(Action::Close),
      "show" => Ok(Action::Show),
      "help" | "?" => Ok(Action::Help),
      "quit" | "exit" | "q" => Ok(Action::Quit),
      other => Err(format!("Unknown command: {} (try `help`)", other)),
    }
  }
}

/// Leading-edge debounce: the first trigger fires, repeats inside the window are dropped.
#[derive(Debug)]
pub struct Debouncer {
  window: Duration,
  last: HashMap<Control, Instant>,
}

impl Debouncer {
  pub fn new(window: Duration) -> Self {
    Self { window, last: HashMap::new() }
  }

  pub fn admit(&mut self, key: Control, at: Instant) -> bool {
    match self.last.get(&key) {
      Some(prev) if at.saturating_duration_since(*prev) < self.window => false,
      _ => {
        self.last.insert(key, at);
        true
      }
    }
  }
}

#[derive(Debug, Default, Clone, Copy)]
struct ControlSlot {
  in_flight: bool,
  released_at: Option<Instant>,
}

/// Per-control mutual exclusion. A trigger issued while its control was busy is
/// rejected even if it is only processed after the control came free.
#[derive(Debug, Default)]
pub struct Controls {
  slots: HashMap<Control, ControlSlot>,
}

impl Controls {
  pub fn begin(&mut self, control: Control, issued_at: Instant) -> ClientResult<()> {
    let slot = self.slots.entry(control).or_default();
    let issued_while_busy = slot.released_at.is_some_and(|released| issued_at < released);
    if slot.in_flight || issued_while_busy {
      return Err(ClientError::Busy(control.label()));
    }
    slot.in_flight = true;
    Ok(())
  }

  pub fn end(&mut self, control: Control, at: Instant) {
    let slot = self.slots.entry(control).or_default();
    slot.in_flight = false;
    slot.released_at = Some(at);
  }

  pub fn is_busy(&self, control: Control) -> bool {
    self.slots.get(&control).is_some_and(|s| s.in_flight)
  }
}

/// The local solution file standing in for the code editor.
#[derive(Debug)]
pub struct CodeEditor {
  dir: PathBuf,
  path: Option<PathBuf>,
}

impl CodeEditor {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into(), path: None }
  }

  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  /// Point at the file for `challenge`, seeding it with the starter code when it does not exist yet.
  pub async fn open(&mut self, challenge: &Challenge) -> ClientResult<PathBuf> {
    let name = format!("challenge_{}_{}.{}", challenge.difficulty, challenge.challenge_id, challenge.language.file_extension());
    let path = self.dir.join(name);
    if tokio::fs::metadata(&path).await.is_err() {
      tokio::fs::create_dir_all(&self.dir).await?;
      tokio::fs::write(&path, &challenge.buggy_code).await?;
      debug!(target: "bugyou", path = %path.display(), "Seeded solution file");
    }
    self.path = Some(path.clone());
    Ok(path)
  }

  pub async fn read(&self) -> ClientResult<String> {
    let path = self.path.as_ref().ok_or_else(|| ClientError::validation("No challenge loaded"))?;
    Ok(tokio::fs::read_to_string(path).await?)
  }

  pub async fn overwrite(&self, code: &str) -> ClientResult<()> {
    let path = self.path.as_ref().ok_or_else(|| ClientError::validation("No challenge loaded"))?;
    tokio::fs::write(path, code).await?;
    Ok(())
  }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
  Render(String),
  /// Dropped by the debounce window.
  Ignored,
  Quit,
}

enum View {
  Play,
  Text(String),
}

pub struct App {
  runner: TestRunner,
  presenter: ResultPresenter,
  editor: CodeEditor,
  debouncer: Debouncer,
  controls: Controls,
}

impl App {
  pub fn new(mut runner: TestRunner, editor: CodeEditor, store: &UserStore) -> Self {
    runner.set_username(store.load());
    let ui = runner.config().ui;
    Self {
      runner,
      presenter: ResultPresenter::new(ui),
      editor,
      debouncer: Debouncer::new(ui.debounce()),
      controls: Controls::default(),
    }
  }

  pub fn runner(&self) -> &TestRunner { &self.runner }
  pub fn presenter(&self) -> &ResultPresenter { &self.presenter }
  pub fn editor(&self) -> &CodeEditor { &self.editor }
  pub fn controls(&self) -> &Controls { &self.controls }

  /// Expire transient surfaces.
  pub fn tick(&mut self, now: Instant) {
    self.presenter.tick(now);
  }

  /// `issued_at` is when the user triggered the action, which can be earlier than now.
  #[instrument(level = "debug", skip(self, issued_at))]
  pub async fn dispatch(&mut self, action: Action, issued_at: Instant) -> Flow {
    if action == Action::Quit {
      return Flow::Quit;
    }

    let control = action.control();
    if let Some(c) = control {
      if action.debounced() && !self.debouncer.admit(c, issued_at) {
        debug!(target: "bugyou", control = c.label(), "Debounced repeat trigger");
        return Flow::Ignored;
      }
      if let Err(e) = self.controls.begin(c, issued_at) {
        self.presenter.show_error(&e, Instant::now());
        return Flow::Render(self.play_view());
      }
    }

    let result = self.reduce(action).await;
    if let Some(c) = control {
      self.controls.end(c, Instant::now());
    }

    match result {
      Ok(View::Play) => Flow::Render(self.play_view()),
      Ok(View::Text(text)) => Flow::Render(text),
      Err(e) => {
        self.presenter.on_results(self.runner.session());
        self.presenter.show_error(&e, Instant::now());
        Flow::Render(self.play_view())
      }
    }
  }

  async fn reduce(&mut self, action: Action) -> ClientResult<View> {
    match action {
      Action::Load { reference, difficulty } => {
        let s = self.runner.session();
        let (language, difficulty) = (s.language(), difficulty.unwrap_or(s.difficulty()));
        let report = self.runner.load(language, difficulty, reference).await?;
        self.after_load(&report).await?;
      }
      Action::Random(difficulty) => {
        let report = self.runner.load_random(difficulty).await?;
        self.after_load(&report).await?;
      }
      Action::Reload => {
        let report = self.runner.reload().await?;
        self.after_load(&report).await?;
      }
      Action::Language(language) => {
        let report = self.runner.change_language(language).await?;
        self.after_load(&report).await?;
      }
      Action::Run => {
        let code = self.editor.read().await?;
        let report = self.runner.run(&code).await?;
        self.presenter.show_run(self.runner.session(), &report, Instant::now());
      }
      Action::Submit => {
        let code = self.editor.read().await?;
        let report = self.runner.submit(&code).await?;
        self.presenter.show_submit(self.runner.session(), &report, Instant::now());
      }
      Action::Hint => {
        let (index, _) = self.runner.reveal_hint()?;
        let penalty = self.runner.config().scoring.hint_penalty;
        self.presenter.show_hint(index, penalty, Instant::now());
      }
      Action::Case(n) => self.presenter.select(self.runner.session(), n - 1)?,
      Action::Reset => {
        let starter = self.runner.session().require_challenge()?.buggy_code.clone();
        self.editor.overwrite(&starter).await?;
        self.runner.set_code(&starter);
        self.presenter.notify(NoticeKind::Info, "Code Reset", "Starter code restored.", Instant::now());
      }
      Action::Problems(difficulty) => return self.problems(difficulty).await.map(View::Text),
      Action::Leaderboard(filter) => return self.leaderboard(filter).await.map(View::Text),
      Action::Profile => {
        let username = self.runner.username().ok_or_else(|| ClientError::validation("Log in to see your profile"))?;
        let backend = self.runner.backend();
        let p = profile::fetch_profile(backend.as_ref(), username).await?;
        return Ok(View::Text(profile::render_profile(&p, chrono::Utc::now())));
      }
      Action::Close => {
        self.presenter.dismiss_modal();
      }
      Action::Help => return Ok(View::Text(HELP.to_string())),
      Action::Show | Action::Quit => {}
    }
    Ok(View::Play)
  }

  async fn after_load(&mut self, report: &LoadReport) -> ClientResult<()> {
    self.presenter.show_loaded(report, Instant::now());
    let challenge = self.runner.session().require_challenge()?.clone();
    let path = self.editor.open(&challenge).await?;
    // Keep edits made before a reload of the same challenge.
    let code = self.editor.read().await?;
    self.runner.set_code(&code);
    info!(target: "bugyou", path = %path.display(), "Edit this file, then `run` or `submit`");

    if let Err(e) = self.runner.refresh_stats().await {
      warn!(target: "bugyou", error = %e, "Could not load user stats");
    }
    Ok(())
  }

  async fn problems(&self, difficulty: Option<Difficulty>) -> ClientResult<String> {
    let difficulty = difficulty.unwrap_or(self.runner.session().difficulty());
    let list = self.runner.list_problems(difficulty).await?;
    if list.is_empty() {
      return Ok(format!("No {} challenges for {}\n", difficulty, self.runner.session().language().display_name()));
    }
    let mut out = format!("{} · {}\n", self.runner.session().language().display_name(), difficulty);
    for p in list {
      out.push_str(&format!("  #{:<4} {:<40} max {:>2}  {:>3.0}% solved\n", p.challenge_id, p.title, p.max_score, p.success_rate));
    }
    Ok(out)
  }

  async fn leaderboard(&self, filter: LeaderboardFilter) -> ClientResult<String> {
    let backend = self.runner.backend();
    let entries = leaderboard::fetch_leaderboard(backend.as_ref(), filter, leaderboard::DEFAULT_LIMIT).await?;
    let mut out = format!("Leaderboard ({})\n", filter);
    out.push_str(&leaderboard::render_leaderboard(&entries));
    if let Some(username) = self.runner.username() {
      if let Some(pos) = leaderboard::fetch_position(backend.as_ref(), username).await {
        out.push('\n');
        out.push_str(&leaderboard::render_position(&pos));
        out.push('\n');
      }
    }
    Ok(out)
  }

  pub fn play_view(&self) -> String {
    let mut out = String::new();
    if let (Some(user), Some(stats)) = (self.runner.username(), self.runner.stats()) {
      out.push_str(&format!("{}  ·  Level {}  ·  {} XP\n", user, stats.level, stats.xp));
    }
    if let Some(path) = self.editor.path() {
      out.push_str(&format!("editing {}\n", path.display()));
    }
    out.push_str(&self.presenter.render(self.runner.session(), Instant::now()));
    out
  }
}
