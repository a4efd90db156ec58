//! bugyou · terminal client for the BugYou debugging-challenge backend
//!
//! - `play`: interactive shell (load, run, submit, hints, leaderboard, profile)
//! - `login` / `signup` / `logout`: manage the locally remembered user
//! - `leaderboard` / `profile`: one-shot reports
//!
//! Important env variables:
//!   BUGYOU_API_BASE             : backend base URL (default "http://localhost:5000/api")
//!   BUGYOU_CONFIG_PATH          : path to TOML config (timeouts, scoring, UI timings)
//!   BUGYOU_RUN_TIMEOUT_SECS     : Run deadline override
//!   BUGYOU_SUBMIT_TIMEOUT_SECS  : Submit deadline override
//!   LOG_LEVEL                   : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT                  : "pretty" (default), "compact" or "json"

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use bugyou_client::account::{self, UserStore};
use bugyou_client::api::HttpBackend;
use bugyou_client::config::ClientConfig;
use bugyou_client::dispatch::{Action, App, CodeEditor, Flow, HELP};
use bugyou_client::domain::{ChallengeRef, Difficulty, Language};
use bugyou_client::error::ClientError;
use bugyou_client::leaderboard::{self, LeaderboardFilter};
use bugyou_client::profile;
use bugyou_client::protocol::SignupRequest;
use bugyou_client::runner::{SessionEvent, TestRunner};
use bugyou_client::telemetry;

#[derive(Parser, Debug)]
#[command(name = "bugyou", version, about = "Fix buggy code, pass the tests, climb the leaderboard")]
struct Cli {
  /// Backend base URL, e.g. http://localhost:5000/api
  #[arg(long, global = true)]
  api_base: Option<String>,

  /// TOML config file
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Interactive challenge shell (default)
  Play(PlayArgs),
  Login {
    username: String,
    /// Read from stdin when omitted
    #[arg(long)]
    password: Option<String>,
  },
  Signup {
    #[arg(long)]
    fullname: String,
    #[arg(long)]
    email: String,
    username: String,
    #[arg(long)]
    password: Option<String>,
  },
  Logout,
  Leaderboard {
    /// overall, language:<lang> or difficulty:<level>
    #[arg(default_value = "overall")]
    filter: LeaderboardFilter,
    #[arg(long, default_value_t = leaderboard::DEFAULT_LIMIT)]
    limit: u32,
  },
  Profile,
}

#[derive(Args, Debug, Default)]
struct PlayArgs {
  #[arg(long, default_value = "python")]
  language: Language,
  #[arg(long, default_value = "basic")]
  difficulty: Difficulty,
  /// Challenge id, `first` or `random`
  #[arg(long)]
  challenge: Option<ChallengeRef>,
  /// Where solution files are written
  #[arg(long, default_value = "bugyou-work")]
  workdir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();
  let cli = Cli::parse();

  let mut config = ClientConfig::load(cli.config.as_deref());
  if let Some(base) = cli.api_base {
    config.api_base = base.trim_end_matches('/').to_string();
  }
  let backend = Arc::new(HttpBackend::from_config(&config)?);
  let store = UserStore::default_location();

  match cli.command.unwrap_or(Command::Play(PlayArgs::default_args())) {
    Command::Play(args) => play(backend, config, store, args).await?,
    Command::Login { username, password } => {
      let password = match password {
        Some(p) => p,
        None => prompt("Password: ").await?,
      };
      let user = account::login(backend.as_ref(), &store, &username, &password).await?;
      println!("Logged in as {}", user);
    }
    Command::Signup { fullname, email, username, password } => {
      let password = match password {
        Some(p) => p,
        None => prompt("Password: ").await?,
      };
      let req = SignupRequest { fullname, email, username, password };
      let user = account::signup(backend.as_ref(), &store, req).await?;
      println!("Account created. Logged in as {}", user);
    }
    Command::Logout => {
      store.clear()?;
      println!("Logged out");
    }
    Command::Leaderboard { filter, limit } => {
      let entries = leaderboard::fetch_leaderboard(backend.as_ref(), filter, limit).await?;
      print!("{}", leaderboard::render_leaderboard(&entries));
      if let Some(user) = store.load() {
        if let Some(pos) = leaderboard::fetch_position(backend.as_ref(), &user).await {
          println!("\n{}", leaderboard::render_position(&pos));
        }
      }
    }
    Command::Profile => {
      let user = store.load().ok_or_else(|| ClientError::validation("Not logged in. Run `bugyou login <username>`"))?;
      let p = profile::fetch_profile(backend.as_ref(), &user).await?;
      print!("{}", profile::render_profile(&p, chrono::Utc::now()));
    }
  }
  Ok(())
}

impl PlayArgs {
  fn default_args() -> Self {
    Self { workdir: PathBuf::from("bugyou-work"), ..Default::default() }
  }
}

async fn prompt(label: &str) -> std::io::Result<String> {
  let mut out = tokio::io::stdout();
  out.write_all(label.as_bytes()).await?;
  out.flush().await?;
  let mut line = String::new();
  BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
  Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[instrument(level = "info", skip_all, fields(language = %args.language, difficulty = %args.difficulty))]
async fn play(backend: Arc<HttpBackend>, config: ClientConfig, store: UserStore, args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
  let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
  let runner = TestRunner::new(backend, config, args.language, args.difficulty).with_events(event_tx);
  let mut app = App::new(runner, CodeEditor::new(&args.workdir), &store);
  if let Some(user) = app.runner().username() {
    info!(target: "bugyou", user, "Playing as logged-in user");
  }

  // Progress lines while a request is in flight.
  tokio::spawn(async move {
    while let Some(ev) = event_rx.recv().await {
      if let SessionEvent::ResultsChanged { running, .. } = ev {
        if running > 0 {
          eprintln!("running {} test case(s)…", running);
        }
      }
    }
  });

  // Lines are stamped on arrival so triggers typed during a request can be told apart.
  let (line_tx, mut line_rx) = mpsc::unbounded_channel::<(String, Instant)>();
  tokio::spawn(async move {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
      match lines.next_line().await {
        Ok(Some(line)) => {
          if line_tx.send((line, Instant::now())).is_err() {
            break;
          }
        }
        Ok(None) => break,
        Err(e) => {
          warn!(target: "bugyou", error = %e, "stdin read failed");
          break;
        }
      }
    }
  });

  print!("{}", HELP);
  let first = Action::Load { reference: args.challenge.unwrap_or(ChallengeRef::First), difficulty: None };
  if let Flow::Render(text) = app.dispatch(first, Instant::now()).await {
    println!("{}", text);
  }

  let mut ticker = tokio::time::interval(Duration::from_secs(1));
  loop {
    tokio::select! {
      line = line_rx.recv() => {
        let Some((line, issued_at)) = line else { break };
        let action = match line.parse::<Action>() {
          Ok(a) => a,
          Err(msg) => {
            println!("{}", msg);
            continue;
          }
        };
        match app.dispatch(action, issued_at).await {
          Flow::Render(text) => println!("{}", text),
          Flow::Ignored => {}
          Flow::Quit => break,
        }
      }
      _ = ticker.tick() => app.tick(Instant::now()),
      _ = tokio::signal::ctrl_c() => {
        info!(target: "bugyou", "Interrupted");
        break;
      }
    }
  }
  Ok(())
}
