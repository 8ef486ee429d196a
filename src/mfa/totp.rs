//! Client-side TOTP helpers.
//!
//! The server is authoritative for every code; these only gate obviously malformed input
//! and format the enrollment secret for display.

use crate::types::FlowError;
use once_cell::sync::Lazy;
use regex::Regex;

pub const TOTP_DIGITS: usize = 6;

/// Minimum length of the code required to disable MFA or regenerate backup codes
pub const MIN_CONFIRMATION_CODE_LENGTH: usize = 6;

static TOTP_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{6}$").expect("TOTP code pattern is valid"));

/// Check that `code` is exactly six ASCII digits
pub fn validate_totp_code(code: &str) -> Result<&str, FlowError> {
    let code = code.trim();
    if TOTP_CODE_RE.is_match(code) {
        Ok(code)
    } else {
        Err(FlowError::Validation(format!(
            "Enter the {TOTP_DIGITS}-digit code from your authenticator app"
        )))
    }
}

/// Check a confirmation code: a current TOTP code or a backup code
pub fn validate_confirmation_code(code: &str) -> Result<&str, FlowError> {
    let code = code.trim();
    if code.chars().count() >= MIN_CONFIRMATION_CODE_LENGTH {
        Ok(code)
    } else {
        Err(FlowError::Validation(format!(
            "The code must be at least {MIN_CONFIRMATION_CODE_LENGTH} characters"
        )))
    }
}

/// Format a base32 secret in groups of four for manual entry
pub fn manual_entry_key(secret: &str) -> String {
    let cleaned: Vec<char> =
        secret.chars().filter(|c| !c.is_whitespace() && *c != '=').collect();

    cleaned.chunks(4).map(|chunk| chunk.iter().collect::<String>()).collect::<Vec<_>>().join(" ")
}
