//! Auth state and configuration: session policy, credential policies and the
//! storage collaborators shared by every handler.

use secrecy::SecretString;
use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use super::{
    permissions::OrgDirectory,
    session_store::SessionStore,
    storage::UserRepository,
};

const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_MINUTES: u32 = 15;
const DEFAULT_SESSION_TIMEOUT_MINUTES: u32 = 45;
const DEFAULT_BCRYPT_COST: u32 = 12;
const DEFAULT_SESSION_SWEEP_SECONDS: u64 = 2 * 60;
const DEFAULT_USERNAME_PATTERN: &str = r"^[a-zA-Z0-9_.-]+$";
pub const DEV_SESSION_SECRET: &str = "dev-secret-change-in-production";

/// Deployment environment, read from `NODE_ENV`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_special_chars: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_special_chars: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsernamePolicy {
    pub min_length: usize,
    pub max_length: usize,
    /// Regular expression the whole username must match.
    pub allowed_pattern: String,
}

impl Default for UsernamePolicy {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 30,
            allowed_pattern: DEFAULT_USERNAME_PATTERN.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    environment: Environment,
    session_secret: SecretString,
    max_login_attempts: u32,
    lockout_minutes: u32,
    session_timeout_minutes: u32,
    bcrypt_cost: u32,
    max_sessions: Option<u32>,
    session_sweep_seconds: u64,
    password_policy: PasswordPolicy,
}

impl AuthConfig {
    #[must_use]
    pub fn new(environment: Environment, session_secret: SecretString) -> Self {
        Self {
            environment,
            session_secret,
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_minutes: DEFAULT_LOCKOUT_MINUTES,
            session_timeout_minutes: DEFAULT_SESSION_TIMEOUT_MINUTES,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            max_sessions: None,
            session_sweep_seconds: DEFAULT_SESSION_SWEEP_SECONDS,
            password_policy: PasswordPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_lockout_minutes(mut self, minutes: u32) -> Self {
        self.lockout_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_session_timeout_minutes(mut self, minutes: u32) -> Self {
        self.session_timeout_minutes = minutes.max(1);
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: Option<u32>) -> Self {
        self.max_sessions = max_sessions.filter(|max| *max > 0);
        self
    }

    #[must_use]
    pub fn with_session_sweep_seconds(mut self, seconds: u64) -> Self {
        self.session_sweep_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> u32 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn lockout_minutes(&self) -> u32 {
        self.lockout_minutes
    }

    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.lockout_minutes) * 60)
    }

    #[must_use]
    pub fn session_timeout_minutes(&self) -> u32 {
        self.session_timeout_minutes
    }

    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.session_timeout_minutes) * 60)
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    #[must_use]
    pub fn max_sessions(&self) -> Option<u32> {
        self.max_sessions
    }

    #[must_use]
    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_seconds)
    }

    #[must_use]
    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.password_policy
    }

    pub(super) fn session_secret(&self) -> &SecretString {
        &self.session_secret
    }

    /// Cookies are only marked `Secure` in production, where TLS terminates in front of us.
    pub(super) fn session_cookie_secure(&self) -> bool {
        self.environment.is_production()
    }
}

pub struct AuthState {
    config: AuthConfig,
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionStore>,
    directory: Arc<dyn OrgDirectory>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionStore>,
        directory: Arc<dyn OrgDirectory>,
    ) -> Self {
        Self {
            config,
            users,
            sessions,
            directory,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn users(&self) -> &dyn UserRepository {
        self.users.as_ref()
    }

    pub(super) fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    /// Shared handle for background maintenance (expired-session sweep).
    #[must_use]
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.sessions)
    }

    pub(super) fn directory(&self) -> &dyn OrgDirectory {
        self.directory.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, Environment, PasswordPolicy};
    use secrecy::{ExposeSecret, SecretString};
    use std::time::Duration;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(Environment::Development, SecretString::from("secret"));

        assert_eq!(config.max_login_attempts(), super::DEFAULT_MAX_LOGIN_ATTEMPTS);
        assert_eq!(config.lockout_duration(), Duration::from_secs(15 * 60));
        assert_eq!(config.session_timeout(), Duration::from_secs(45 * 60));
        assert_eq!(config.bcrypt_cost(), 12);
        assert_eq!(config.max_sessions(), None);
        assert_eq!(config.session_sweep_interval(), Duration::from_secs(120));
        assert_eq!(config.password_policy(), &PasswordPolicy::default());
        assert_eq!(config.session_secret().expose_secret(), "secret");
        assert!(!config.session_cookie_secure());

        let config = config
            .with_max_login_attempts(3)
            .with_lockout_minutes(5)
            .with_session_timeout_minutes(10)
            .with_bcrypt_cost(4)
            .with_max_sessions(Some(2))
            .with_session_sweep_seconds(30);

        assert_eq!(config.max_login_attempts(), 3);
        assert_eq!(config.lockout_minutes(), 5);
        assert_eq!(config.session_timeout_minutes(), 10);
        assert_eq!(config.bcrypt_cost(), 4);
        assert_eq!(config.max_sessions(), Some(2));
        assert_eq!(config.session_sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn zero_limits_are_clamped() {
        let config = AuthConfig::new(Environment::Test, SecretString::from("secret"))
            .with_max_login_attempts(0)
            .with_max_sessions(Some(0))
            .with_session_timeout_minutes(0);
        assert_eq!(config.max_login_attempts(), 1);
        assert_eq!(config.max_sessions(), None);
        assert_eq!(config.session_timeout_minutes(), 1);
    }

    #[test]
    fn production_marks_cookie_secure() {
        let config = AuthConfig::new(Environment::Production, SecretString::from("secret"));
        assert!(config.session_cookie_secure());
    }

    #[test]
    fn environment_parses_node_env_values() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("Development".parse::<Environment>(), Ok(Environment::Development));
        assert_eq!("test".parse::<Environment>(), Ok(Environment::Test));
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
