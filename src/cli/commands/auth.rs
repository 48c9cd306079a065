use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_SESSION_SECRET: &str = "session-secret";
pub const ARG_MAX_LOGIN_ATTEMPTS: &str = "max-login-attempts";
pub const ARG_LOCKOUT_MINUTES: &str = "lockout-minutes";
pub const ARG_SESSION_TIMEOUT_MINUTES: &str = "session-timeout-minutes";
pub const ARG_BCRYPT_COST: &str = "bcrypt-cost";
pub const ARG_MAX_SESSIONS: &str = "max-sessions";
pub const ARG_SESSION_SWEEP_SECONDS: &str = "session-sweep-seconds";
pub const ARG_REQUIRE_SPECIAL_CHARS: &str = "require-special-chars";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_policy_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .short('e')
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment: development, production or test")
                .env("NODE_ENV")
                .default_value("development"),
        )
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long(ARG_SESSION_SECRET)
                .help("Secret used to sign session cookies")
                .long_help(
                    "Secret used to sign session cookies. Required in production; development and test fall back to a fixed secret.",
                )
                .env("SESSION_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TIMEOUT_MINUTES)
                .long(ARG_SESSION_TIMEOUT_MINUTES)
                .help("Minutes of inactivity before a session expires")
                .env("EVERGLASS_SESSION_TIMEOUT_MINUTES")
                .default_value("45")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_MAX_SESSIONS)
                .long(ARG_MAX_SESSIONS)
                .help("Maximum concurrent sessions per employee (unset or 0: unlimited)")
                .env("EVERGLASS_MAX_SESSIONS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_SESSION_SWEEP_SECONDS)
                .long(ARG_SESSION_SWEEP_SECONDS)
                .help("Interval between expired session sweeps, in seconds")
                .env("EVERGLASS_SESSION_SWEEP_SECONDS")
                .default_value("120")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_policy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_LOGIN_ATTEMPTS)
                .long(ARG_MAX_LOGIN_ATTEMPTS)
                .help("Consecutive failed logins before the account is locked")
                .env("EVERGLASS_MAX_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_MINUTES)
                .long(ARG_LOCKOUT_MINUTES)
                .help("Lockout duration in minutes")
                .env("EVERGLASS_LOCKOUT_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_BCRYPT_COST)
                .long(ARG_BCRYPT_COST)
                .help("bcrypt work factor for new password hashes")
                .env("EVERGLASS_BCRYPT_COST")
                .default_value("12")
                .value_parser(clap::value_parser!(u32).range(4..=31)),
        )
        .arg(
            Arg::new(ARG_REQUIRE_SPECIAL_CHARS)
                .long(ARG_REQUIRE_SPECIAL_CHARS)
                .help("Require at least one special character in passwords")
                .env("EVERGLASS_REQUIRE_SPECIAL_CHARS")
                .action(ArgAction::SetTrue),
        )
}

/// Auth tuning values, with the defaults already applied by clap.
#[derive(Debug)]
pub struct Options {
    pub environment: String,
    pub session_secret: Option<String>,
    pub max_login_attempts: u32,
    pub lockout_minutes: u32,
    pub session_timeout_minutes: u32,
    pub bcrypt_cost: u32,
    pub max_sessions: Option<u32>,
    pub session_sweep_seconds: u64,
    pub require_special_chars: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            environment: matches
                .get_one::<String>(ARG_ENVIRONMENT)
                .cloned()
                .unwrap_or_else(|| "development".to_string()),
            session_secret: matches
                .get_one::<String>(ARG_SESSION_SECRET)
                .filter(|secret| !secret.trim().is_empty())
                .cloned(),
            max_login_attempts: matches
                .get_one::<u32>(ARG_MAX_LOGIN_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            lockout_minutes: matches
                .get_one::<u32>(ARG_LOCKOUT_MINUTES)
                .copied()
                .unwrap_or(15),
            session_timeout_minutes: matches
                .get_one::<u32>(ARG_SESSION_TIMEOUT_MINUTES)
                .copied()
                .unwrap_or(45),
            bcrypt_cost: matches.get_one::<u32>(ARG_BCRYPT_COST).copied().unwrap_or(12),
            max_sessions: matches.get_one::<u32>(ARG_MAX_SESSIONS).copied(),
            session_sweep_seconds: matches
                .get_one::<u64>(ARG_SESSION_SWEEP_SECONDS)
                .copied()
                .unwrap_or(120),
            require_special_chars: matches.get_flag(ARG_REQUIRE_SPECIAL_CHARS),
        }
    }
}
