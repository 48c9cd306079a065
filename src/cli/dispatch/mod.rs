//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the server action, resolving the deployment
//! environment and the session secret on the way.

use crate::api::handlers::auth::{DEV_SESSION_SECRET, Environment};
use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result, anyhow, bail};
use secrecy::SecretString;
use tracing::warn;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(3000);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches);
    let environment = auth_opts
        .environment
        .parse::<Environment>()
        .map_err(|err| anyhow!(err))?;
    let session_secret = session_secret(environment, auth_opts.session_secret)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        environment,
        session_secret,
        max_login_attempts: auth_opts.max_login_attempts,
        lockout_minutes: auth_opts.lockout_minutes,
        session_timeout_minutes: auth_opts.session_timeout_minutes,
        bcrypt_cost: auth_opts.bcrypt_cost,
        max_sessions: auth_opts.max_sessions,
        session_sweep_seconds: auth_opts.session_sweep_seconds,
        require_special_chars: auth_opts.require_special_chars,
    }))
}

fn session_secret(environment: Environment, secret: Option<String>) -> Result<SecretString> {
    match secret {
        Some(secret) if environment.is_production() && secret == DEV_SESSION_SECRET => {
            bail!("the development session secret cannot be used in production")
        }
        Some(secret) => Ok(SecretString::from(secret)),
        None if environment.is_production() => {
            bail!("missing required argument: --session-secret (SESSION_SECRET) in production")
        }
        None => {
            warn!("SESSION_SECRET not set, using the development secret");
            Ok(SecretString::from(DEV_SESSION_SECRET))
        }
    }
}
