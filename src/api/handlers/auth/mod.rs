//! Auth handlers and supporting modules.
//!
//! This module coordinates employee login, cookie sessions, password changes and
//! the role/level permission model.
//!
//! ## Login Throttling
//!
//! - **Attempt Limit:** 5 consecutive failures per account.
//! - **Lockout:** reaching the limit locks the account for 15 minutes and resets
//!   the counter. A locked account answers `ACCOUNT_LOCKED` even for the right
//!   password; unknown usernames are never counted.
//!
//! ## Sessions
//!
//! Sessions expire after 45 minutes without activity. The cookie holds a random
//! token signed with the session secret; the `sessions` table is keyed by the
//! token's SHA-256 so a database dump cannot be replayed as cookies. Expired
//! rows are swept every 2 minutes by [`spawn_session_sweeper`].
//!
//! > **Warning:** Changing `SESSION_SECRET` logs every employee out.

pub(crate) mod login;
pub(crate) mod me;
pub(crate) mod password;
pub mod permissions;
pub(crate) mod principal;
pub(crate) mod session;
mod session_store;
mod state;
mod storage;
pub mod types;
mod utils;
pub mod validation;
mod workflow;

pub use session::{SESSION_COOKIE_NAME, require_session};
pub use session_store::{PgSessionStore, SessionStore, spawn_session_sweeper};
pub use state::{
    AuthConfig, AuthState, DEV_SESSION_SECRET, Environment, PasswordPolicy, UsernamePolicy,
};
pub use storage::{PgOrgDirectory, PgUserRepository};

#[cfg(test)]
pub(crate) mod memory;
#[cfg(test)]
mod pg_tests;
