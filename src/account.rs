//! Accounts: login/signup form validation, backend error mapping, and the one
//! piece of durable client state (the logged-in username).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::Backend;
use crate::error::{ClientError, ClientResult};
use crate::protocol::{AuthResponse, LoginRequest, SignupRequest};

const RESERVED_USERNAMES: [&str; 8] = ["admin", "administrator", "root", "system", "user", "guest", "test", "demo"];
const COMMON_PASSWORDS: [&str; 6] = ["password", "123456", "qwerty", "admin", "letmein", "welcome"];

fn name_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^[A-Za-z\s]+$").expect("static regex"))
}

fn email_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"))
}

fn username_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex"))
}

fn invalid(msg: &str) -> ClientResult<()> {
  Err(ClientError::validation(msg))
}

pub fn validate_login(username: &str, password: &str) -> ClientResult<()> {
  let (u, p) = (username.trim().chars().count(), password.chars().count());
  if u == 0 && p == 0 {
    return invalid("Enter username and password.");
  }
  match u {
    0 => return invalid("Enter username."),
    n if n > 50 => return invalid("Username too long."),
    _ => {}
  }
  match p {
    0 => invalid("Enter password."),
    n if n > 100 => invalid("Password too long."),
    _ => Ok(()),
  }
}

pub fn validate_signup(req: &SignupRequest) -> ClientResult<()> {
  let fullname = req.fullname.trim();
  let email = req.email.trim();
  let username = req.username.trim();
  let password = req.password.as_str();

  if fullname.is_empty() || email.is_empty() || username.is_empty() || password.is_empty() {
    return invalid("Please fill in all fields.");
  }

  match fullname.chars().count() {
    n if n < 2 => return invalid("Name too short."),
    n if n > 50 => return invalid("Name too long."),
    _ if !name_re().is_match(fullname) => return invalid("Name can only contain letters and spaces."),
    _ => {}
  }

  if !email_re().is_match(email) {
    return invalid("Invalid email format.");
  }
  if email.chars().count() > 100 {
    return invalid("Email too long.");
  }

  match username.chars().count() {
    n if n < 3 => return invalid("Username too short."),
    n if n > 20 => return invalid("Username too long."),
    _ if !username_re().is_match(username) => {
      return invalid("Username can only contain letters, numbers, and underscores.")
    }
    _ => {}
  }

  match password.chars().count() {
    n if n < 6 => return invalid("Password too short."),
    n if n > 50 => return invalid("Password too long."),
    _ => {}
  }
  if !password.chars().any(|c| c.is_ascii_lowercase()) {
    return invalid("Password needs a lowercase letter.");
  }
  if !password.chars().any(|c| c.is_ascii_uppercase()) {
    return invalid("Password needs an uppercase letter.");
  }
  if !password.chars().any(|c| c.is_ascii_digit()) {
    return invalid("Password needs a number.");
  }

  if RESERVED_USERNAMES.contains(&username.to_lowercase().as_str()) {
    return invalid("Username is reserved.");
  }
  if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
    return invalid("Choose a stronger password.");
  }
  Ok(())
}

/// Translate backend login errors into the short messages the form shows.
pub fn login_error_message(resp: &AuthResponse) -> String {
  let raw = resp.error.clone().unwrap_or_default();
  let lower = raw.to_lowercase();
  if lower.contains("no account found") {
    "Username not found.".into()
  } else if lower.contains("incorrect password") {
    "Incorrect password.".into()
  } else if lower.contains("locked") {
    "Account locked.".into()
  } else if lower.contains("account") {
    "Account not found.".into()
  } else if raw.is_empty() {
    "Login failed.".into()
  } else {
    raw
  }
}

pub fn signup_error_message(resp: &AuthResponse) -> String {
  let raw = resp.error.clone().unwrap_or_default();
  let message = resp.message.clone().filter(|m| !m.is_empty());
  match raw.as_str() {
    "username_exists" => message.unwrap_or_else(|| "Username taken.".into()),
    "email_exists" => message.unwrap_or_else(|| "Email already registered.".into()),
    r if r.contains("username") => "Username taken.".into(),
    r if r.contains("email") => "Email already registered.".into(),
    "" => message.unwrap_or_else(|| "Signup failed.".into()),
    _ => message.unwrap_or(raw),
  }
}

/// Validate, log in, persist the username. Returns the stored username.
#[instrument(level = "info", skip(backend, store, password), fields(password_len = password.len()))]
pub async fn login(backend: &dyn Backend, store: &UserStore, username: &str, password: &str) -> ClientResult<String> {
  validate_login(username, password)?;
  let username = username.trim().to_string();
  let req = LoginRequest { username: username.clone(), password: password.to_string() };

  let resp = backend.login(&req).await.map_err(network_hint)?;
  if !resp.success {
    let msg = login_error_message(&resp);
    warn!(target: "bugyou", %username, error = ?resp.error, "Login rejected");
    return Err(ClientError::Validation(msg));
  }
  store.save(&username)?;
  info!(target: "bugyou", %username, "Logged in");
  Ok(username)
}

#[instrument(level = "info", skip(backend, store, req), fields(username = %req.username))]
pub async fn signup(backend: &dyn Backend, store: &UserStore, req: SignupRequest) -> ClientResult<String> {
  validate_signup(&req)?;
  let req = SignupRequest {
    fullname: req.fullname.trim().to_string(),
    email: req.email.trim().to_string(),
    username: req.username.trim().to_string(),
    password: req.password,
  };

  let resp = backend.signup(&req).await.map_err(network_hint)?;
  if !resp.success {
    let msg = signup_error_message(&resp);
    warn!(target: "bugyou", username = %req.username, error = ?resp.error, "Signup rejected");
    return Err(ClientError::Validation(msg));
  }
  store.save(&req.username)?;
  info!(target: "bugyou", username = %req.username, "Signed up");
  Ok(req.username)
}

fn network_hint(e: ClientError) -> ClientError {
  match e {
    ClientError::Network(msg) if !msg.starts_with("Server error") => {
      ClientError::Network(format!("Network error. Check connection. ({})", msg))
    }
    other => other,
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredUser {
  username: String,
}

/// JSON file holding the logged-in username.
#[derive(Clone, Debug)]
pub struct UserStore {
  path: PathBuf,
}

impl UserStore {
  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// `<config_dir>/bugyou/user.json`.
  pub fn default_location() -> Self {
    let mut base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("bugyou");
    base.push("user.json");
    Self { path: base }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Missing or unreadable file means nobody is logged in.
  pub fn load(&self) -> Option<String> {
    let text = fs::read_to_string(&self.path).ok()?;
    match serde_json::from_str::<StoredUser>(&text) {
      Ok(u) if !u.username.trim().is_empty() => Some(u.username),
      Ok(_) => None,
      Err(e) => {
        warn!(target: "bugyou", path = %self.path.display(), error = %e, "Ignoring corrupt user file");
        None
      }
    }
  }

  pub fn save(&self, username: &str) -> ClientResult<()> {
    if let Some(dir) = self.path.parent() {
      fs::create_dir_all(dir)?;
    }
    let text = serde_json::to_string_pretty(&StoredUser { username: username.to_string() })
      .map_err(|e| ClientError::Persistence(e.to_string()))?;
    fs::write(&self.path, text)?;
    Ok(())
  }

  /// Log out. Already logged out is fine.
  pub fn clear(&self) -> ClientResult<()> {
    match fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use serde_json::json;

  use super::*;
  use crate::testing::{FakeBackend, Reply};

  fn form(fullname: &str, email: &str, username: &str, password: &str) -> SignupRequest {
    SignupRequest { fullname: fullname.into(), email: email.into(), username: username.into(), password: password.into() }
  }

  fn err_msg(r: ClientResult<()>) -> String {
    match r {
      Err(ClientError::Validation(m)) => m,
      other => panic!("expected validation error, got {:?}", other),
    }
  }

  #[test]
  fn login_validation_messages() {
    assert_eq!(err_msg(validate_login("", "")), "Enter username and password.");
    assert_eq!(err_msg(validate_login("ada", "")), "Enter password.");
    assert_eq!(err_msg(validate_login(&"u".repeat(51), "pw")), "Username too long.");
    assert!(validate_login("ada", "pw").is_ok());
  }

  #[test]
  fn signup_validation_in_form_order() {
    assert_eq!(err_msg(validate_signup(&form("", "a@b.c", "ada", "Secret1"))), "Please fill in all fields.");
    assert_eq!(err_msg(validate_signup(&form("Ada 2", "a@b.c", "ada", "Secret1"))), "Name can only contain letters and spaces.");
    assert_eq!(err_msg(validate_signup(&form("Ada L", "a@b", "ada", "Secret1"))), "Invalid email format.");
    assert_eq!(err_msg(validate_signup(&form("Ada L", "a@b.c", "ad", "Secret1"))), "Username too short.");
    assert_eq!(err_msg(validate_signup(&form("Ada L", "a@b.c", "ada-l", "Secret1"))), "Username can only contain letters, numbers, and underscores.");
    assert_eq!(err_msg(validate_signup(&form("Ada L", "a@b.c", "ada", "secret1"))), "Password needs an uppercase letter.");
    assert_eq!(err_msg(validate_signup(&form("Ada L", "a@b.c", "ada", "Secretx"))), "Password needs a number.");
    assert_eq!(err_msg(validate_signup(&form("Ada L", "a@b.c", "Admin", "Secret1"))), "Username is reserved.");
    assert!(validate_signup(&form("Ada Lovelace", "ada@example.com", "ada_l", "Secret1")).is_ok());
  }

  #[test]
  fn backend_errors_are_mapped() {
    let resp = |error: &str, message: Option<&str>| AuthResponse {
      success: false,
      error: Some(error.into()),
      message: message.map(String::from),
    };
    assert_eq!(login_error_message(&resp("No account found for user", None)), "Username not found.");
    assert_eq!(login_error_message(&resp("Incorrect password", None)), "Incorrect password.");
    assert_eq!(login_error_message(&resp("Account is locked", None)), "Account locked.");
    assert_eq!(signup_error_message(&resp("username_exists", None)), "Username taken.");
    assert_eq!(signup_error_message(&resp("email_exists", Some("That email is in use"))), "That email is in use");
  }

  #[test]
  fn user_store_round_trip_and_logout() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::at(dir.path().join("nested").join("user.json"));
    assert_eq!(store.load(), None);

    store.save("ada").unwrap();
    assert_eq!(store.load().as_deref(), Some("ada"));

    store.clear().unwrap();
    assert_eq!(store.load(), None);
    store.clear().unwrap();
  }

  #[test]
  fn corrupt_store_reads_as_logged_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user.json");
    std::fs::write(&path, "{not json").unwrap();
    assert_eq!(UserStore::at(path).load(), None);
  }

  #[tokio::test]
  async fn login_persists_only_on_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::at(dir.path().join("user.json"));
    let fake = Arc::new(FakeBackend::default());

    fake.reply("login", Reply::Json(json!({"success": false, "error": "Incorrect password"})));
    let err = login(fake.as_ref(), &store, "ada", "nope").await.unwrap_err();
    assert_eq!(err, ClientError::Validation("Incorrect password.".into()));
    assert_eq!(store.load(), None);

    fake.reply("login", Reply::Json(json!({"success": true})));
    assert_eq!(login(fake.as_ref(), &store, " ada ", "right").await.unwrap(), "ada");
    assert_eq!(store.load().as_deref(), Some("ada"));
  }

  #[tokio::test]
  async fn invalid_signup_makes_no_request() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::at(dir.path().join("user.json"));
    let fake = Arc::new(FakeBackend::default());

    let err = signup(fake.as_ref(), &store, form("Ada L", "a@b.c", "ada", "password")).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(fake.calls("signup").is_empty());
  }
}
