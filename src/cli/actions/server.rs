use crate::api::{
    self,
    handlers::auth::{AuthConfig, Environment, PasswordPolicy},
};
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub environment: Environment,
    pub session_secret: SecretString,
    pub max_login_attempts: u32,
    pub lockout_minutes: u32,
    pub session_timeout_minutes: u32,
    pub bcrypt_cost: u32,
    pub max_sessions: Option<u32>,
    pub session_sweep_seconds: u64,
    pub require_special_chars: bool,
}

impl Args {
    /// Build the auth configuration shared by every request.
    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        let password_policy = PasswordPolicy {
            require_special_chars: self.require_special_chars,
            ..PasswordPolicy::default()
        };

        AuthConfig::new(self.environment, self.session_secret.clone())
            .with_max_login_attempts(self.max_login_attempts)
            .with_lockout_minutes(self.lockout_minutes)
            .with_session_timeout_minutes(self.session_timeout_minutes)
            .with_bcrypt_cost(self.bcrypt_cost)
            .with_max_sessions(self.max_sessions)
            .with_session_sweep_seconds(self.session_sweep_seconds)
            .with_password_policy(password_policy)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = args.auth_config();
    debug!(
        environment = %auth_config.environment(),
        max_login_attempts = auth_config.max_login_attempts(),
        lockout_minutes = auth_config.lockout_minutes(),
        session_timeout_minutes = auth_config.session_timeout_minutes(),
        max_sessions = ?auth_config.max_sessions(),
        "Auth configuration"
    );

    api::new(args.port, args.dsn, auth_config).await
}
