//! Request payload checks and email canonicalization.

use regex::Regex;

use super::error::AuthError;

pub const MIN_NAME_CHARS: usize = 3;
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Canonical form used for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Validate a registration payload and return the canonical email.
///
/// # Errors
/// Returns a validation error naming the first offending field.
pub fn registration(name: &str, email: &str, password: &str) -> Result<String, AuthError> {
    if name.trim().chars().count() < MIN_NAME_CHARS {
        return Err(AuthError::validation(format!(
            "name must be at least {MIN_NAME_CHARS} characters"
        )));
    }
    let email = checked_email(email)?;
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::validation(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(email)
}

/// Validate a login payload and return the canonical email.
///
/// # Errors
/// Returns a validation error for a malformed email or an empty password.
pub fn login(email: &str, password: &str) -> Result<String, AuthError> {
    let email = checked_email(email)?;
    if password.is_empty() {
        return Err(AuthError::validation("password is required"));
    }
    Ok(email)
}

fn checked_email(email: &str) -> Result<String, AuthError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AuthError::validation("email is required"));
    }
    if !valid_email(&email) {
        return Err(AuthError::validation("invalid email"));
    }
    Ok(email)
}
