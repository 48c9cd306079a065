//! Credential policy checks and display helpers.
//!
//! Validators never fail fast: each broken rule adds one entry so the caller
//! can report every problem in a single response.

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use super::state::{PasswordPolicy, UsernamePolicy};
use crate::api::error::ValidationError;

const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Check a password against the policy. Empty result means valid.
#[must_use]
pub fn validate_password(password: &str, policy: &PasswordPolicy) -> Vec<ValidationError> {
    let field = "password";
    if password.is_empty() {
        return vec![ValidationError::new(field, "Password is required.")];
    }

    let mut errors = Vec::new();

    if password.chars().count() < policy.min_length {
        errors.push(ValidationError::new(
            field,
            format!(
                "Password must be at least {} characters long.",
                policy.min_length
            ),
        ));
    }

    if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(ValidationError::new(
            field,
            "Password must contain at least one uppercase letter.",
        ));
    }

    if policy.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push(ValidationError::new(
            field,
            "Password must contain at least one lowercase letter.",
        ));
    }

    if policy.require_numbers && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(ValidationError::new(
            field,
            "Password must contain at least one digit.",
        ));
    }

    if policy.require_special_chars && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        errors.push(ValidationError::new(
            field,
            "Password must contain at least one special character (!@#$%^&*...).",
        ));
    }

    errors
}

#[must_use]
pub fn is_password_valid(password: &str, policy: &PasswordPolicy) -> bool {
    validate_password(password, policy).is_empty()
}

/// Human-readable summary of the active password rules.
#[must_use]
pub fn password_requirements_message(policy: &PasswordPolicy) -> String {
    let mut requirements = vec![format!("at least {} characters", policy.min_length)];

    if policy.require_uppercase {
        requirements.push("one uppercase letter".to_string());
    }
    if policy.require_lowercase {
        requirements.push("one lowercase letter".to_string());
    }
    if policy.require_numbers {
        requirements.push("one digit".to_string());
    }
    if policy.require_special_chars {
        requirements.push("one special character (!@#$%^&*...)".to_string());
    }

    format!("Password must contain: {}.", requirements.join(", "))
}

/// Check a username against the policy. Empty result means valid.
#[must_use]
pub fn validate_username(username: &str, policy: &UsernamePolicy) -> Vec<ValidationError> {
    let field = "username";
    if username.is_empty() {
        return vec![ValidationError::new(field, "Username is required.")];
    }

    let mut errors = Vec::new();
    let length = username.chars().count();

    if length < policy.min_length {
        errors.push(ValidationError::new(
            field,
            format!(
                "Username must be at least {} characters long.",
                policy.min_length
            ),
        ));
    }

    if length > policy.max_length {
        errors.push(ValidationError::new(
            field,
            format!(
                "Username cannot be longer than {} characters.",
                policy.max_length
            ),
        ));
    }

    if !Regex::new(&policy.allowed_pattern).is_ok_and(|re| re.is_match(username)) {
        errors.push(ValidationError::new(
            field,
            "Username may only contain letters, digits, hyphens (-), dots (.) and underscores (_).",
        ));
    }

    errors
}

#[must_use]
pub fn is_username_valid(username: &str, policy: &UsernamePolicy) -> bool {
    validate_username(username, policy).is_empty()
}

/// Validate account credentials: username rules, password rules, then confirmation.
#[must_use]
pub fn validate_credentials(
    username: &str,
    password: &str,
    confirm_password: Option<&str>,
    username_policy: &UsernamePolicy,
    password_policy: &PasswordPolicy,
) -> Vec<ValidationError> {
    let mut errors = validate_username(username, username_policy);
    errors.extend(validate_password(password, password_policy));

    if confirm_password.is_some_and(|confirm| confirm != password) {
        errors.push(ValidationError::new(
            "confirmPassword",
            "Passwords do not match.",
        ));
    }

    errors
}

/// Partially hide an email for display: `exemple@test.com` -> `exe***@test.com`.
#[must_use]
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return "***".to_string();
    };
    if local.is_empty() || domain.is_empty() {
        return "***".to_string();
    }

    let visible: String = local.chars().take(3).collect();
    format!("{visible}***@{domain}")
}

#[must_use]
pub fn format_full_name(first_name: &str, last_name: &str) -> String {
    format!("{first_name} {last_name}").trim().to_string()
}

/// Derive a login handle from a person's name: `Jean`, `Dupont` -> `jean.dupont`.
///
/// Not guaranteed unique; the `employees.username` constraint decides.
#[must_use]
pub fn generate_username(first_name: &str, last_name: &str) -> String {
    format!(
        "{}.{}",
        normalize_name(first_name),
        normalize_name(last_name)
    )
}

fn normalize_name(value: &str) -> String {
    // NFD splits accented letters into base letter + combining mark; the filter drops the mark.
    value
        .to_lowercase()
        .nfd()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}
