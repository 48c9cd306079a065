//! # Everglass (CRM API)
//!
//! `everglass` serves the Everglass CRM over HTTP. It owns employee
//! authentication, cookie sessions, and the role/level permission model used by
//! the rest of the API.
//!
//! ## Sessions
//!
//! Sessions live in the `sessions` table and expire after 45 minutes of
//! inactivity. Every authenticated request pushes the expiry forward (rolling
//! sessions) and re-issues the `everglass.sid` cookie. The cookie carries a random
//! token signed with `SESSION_SECRET`; the database only stores the token hash.
//!
//! ## Login Throttling
//!
//! Five consecutive failed logins lock the account for 15 minutes. While locked,
//! even a correct password is answered with `ACCOUNT_LOCKED`. Counters are updated
//! with single atomic statements, so concurrent attempts are arbitrated by the
//! database.
//!
//! ## Permissions
//!
//! Capabilities are never stored: they are derived from the employee role
//! (`ADMIN`, `DIRECTOR`, `MANAGER`, `TECHNICIAN`, `ASSISTANT`), the hierarchical
//! level (`HEADQUARTERS`, `FRANCHISE`, `CENTER`), and the organization tree.
//!
//! ## Errors
//!
//! Every domain failure maps to one HTTP status and one machine code and is
//! returned as `{"success": false, "error": {"code", "message", "details"?}}`.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
