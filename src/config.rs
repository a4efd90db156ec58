//! Client configuration: backend location, request timeouts, scoring rules and
//! UI timings. Loaded from an optional TOML file, then environment overrides.
//!
//! TOML schema (every key optional):
//!
//! ```toml
//! api_base = "http://localhost:5000/api"
//! run_timeout_secs = 30
//! submit_timeout_secs = 60
//! request_timeout_secs = 20
//!
//! [scoring]
//! starting_score = 10
//! max_score = 10
//! hint_penalty = 2
//! failure_penalty = 1
//! failure_floor = 1
//!
//! [ui]
//! notification_ttl_ms = 3000
//! modal_ttl_ms = 15000
//! debounce_ms = 300
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

pub const DEFAULT_API_BASE: &str = "http://localhost:5000/api";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
  pub api_base: String,
  pub run_timeout_secs: u64,
  pub submit_timeout_secs: u64,
  /// Applies to everything except Run and Submit.
  pub request_timeout_secs: u64,
  pub scoring: ScoringRules,
  pub ui: UiTimings,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      api_base: DEFAULT_API_BASE.into(),
      run_timeout_secs: 30,
      submit_timeout_secs: 60,
      request_timeout_secs: 20,
      scoring: ScoringRules::default(),
      ui: UiTimings::default(),
    }
  }
}

/// Score bookkeeping for one challenge session. Score stays within `[0, max_score]`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoringRules {
  pub starting_score: u32,
  pub max_score: u32,
  pub hint_penalty: u32,
  pub failure_penalty: u32,
  /// Wrong submissions never push the score below this.
  pub failure_floor: u32,
}

impl Default for ScoringRules {
  fn default() -> Self {
    Self { starting_score: 10, max_score: 10, hint_penalty: 2, failure_penalty: 1, failure_floor: 1 }
  }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UiTimings {
  pub notification_ttl_ms: u64,
  pub modal_ttl_ms: u64,
  pub debounce_ms: u64,
}

impl Default for UiTimings {
  fn default() -> Self {
    Self { notification_ttl_ms: 3_000, modal_ttl_ms: 15_000, debounce_ms: 300 }
  }
}

impl UiTimings {
  pub fn notification_ttl(&self) -> Duration { Duration::from_millis(self.notification_ttl_ms) }
  pub fn modal_ttl(&self) -> Duration { Duration::from_millis(self.modal_ttl_ms) }
  pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }
}

impl ClientConfig {
  pub fn run_timeout(&self) -> Duration { Duration::from_secs(self.run_timeout_secs) }
  pub fn submit_timeout(&self) -> Duration { Duration::from_secs(self.submit_timeout_secs) }
  pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

  /// Parse a TOML document; missing keys take their defaults.
  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str::<ClientConfig>(s)
  }

  /// Load from `path` (or BUGYOU_CONFIG_PATH), then apply env overrides.
  /// Read/parse failures are logged and fall back to defaults.
  pub fn load(path: Option<&Path>) -> Self {
    let path = path
      .map(|p| p.to_string_lossy().into_owned())
      .or_else(|| std::env::var("BUGYOU_CONFIG_PATH").ok());

    let mut cfg = match path {
      Some(path) => match std::fs::read_to_string(&path) {
        Ok(s) => match Self::from_toml_str(&s) {
          Ok(cfg) => {
            info!(target: "bugyou", %path, "Loaded client config (TOML)");
            cfg
          }
          Err(e) => {
            error!(target: "bugyou", %path, error = %e, "Failed to parse TOML config; using defaults");
            Self::default()
          }
        },
        Err(e) => {
          error!(target: "bugyou", %path, error = %e, "Failed to read TOML config file; using defaults");
          Self::default()
        }
      },
      None => Self::default(),
    };

    cfg.apply_env(|k| std::env::var(k).ok());
    cfg
  }

  /// Environment overrides, taken through `lookup` so tests need not touch the process env.
  pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(base) = lookup("BUGYOU_API_BASE").filter(|s| !s.trim().is_empty()) {
      self.api_base = base.trim().trim_end_matches('/').to_string();
    }
    for (key, slot) in [
      ("BUGYOU_RUN_TIMEOUT_SECS", &mut self.run_timeout_secs),
      ("BUGYOU_SUBMIT_TIMEOUT_SECS", &mut self.submit_timeout_secs),
    ] {
      if let Some(raw) = lookup(key) {
        match raw.trim().parse::<u64>() {
          Ok(v) if v > 0 => *slot = v,
          _ => warn!(target: "bugyou", key, value = %raw, "Ignoring invalid timeout override"),
        }
      }
    }
  }
}
