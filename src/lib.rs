//! bugyou client library: challenge session state, the test runner against the
//! BugYou REST backend, result presentation, accounts, leaderboard and profile.
//!
//! The `bugyou` binary wires these into an interactive terminal shell.

pub mod account;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod leaderboard;
pub mod presenter;
pub mod profile;
pub mod protocol;
pub mod runner;
pub mod session;
pub mod telemetry;
pub mod util;

#[cfg(test)]
mod testing;
