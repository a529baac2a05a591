//! SQL identifier validation.
//!
//! Policy definitions are composed into DDL text, so every table, column,
//! role and policy name passes through [`checked`] at the point where it is
//! interpolated. Callers never hand around a "pre-validated" identifier type;
//! each interpolation site validates on its own.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// PostgreSQL truncates identifiers longer than this.
pub const MAX_IDENT_LEN: usize = 63;

lazy_static! {
    static ref SAFE_IDENT: Regex = Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap();
    static ref SAFE_SETTING: Regex =
        Regex::new(r"^[a-z_][a-z0-9_]*\.[a-z_][a-z0-9_]*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier '{0}' exceeds 63 characters")]
    TooLong(String),

    #[error("identifier '{0}' contains characters outside [a-z0-9_]")]
    Unsafe(String),

    #[error("setting name '{0}' must look like 'namespace.name'")]
    InvalidSetting(String),
}

/// Validate an identifier and return it unchanged.
pub fn checked(ident: &str) -> Result<&str, IdentError> {
    if ident.is_empty() {
        return Err(IdentError::Empty);
    }
    if ident.len() > MAX_IDENT_LEN {
        return Err(IdentError::TooLong(ident.to_string()));
    }
    if !SAFE_IDENT.is_match(ident) {
        return Err(IdentError::Unsafe(ident.to_string()));
    }
    Ok(ident)
}

/// Validate a custom configuration parameter name such as `app.current_tenant`.
pub fn checked_setting(name: &str) -> Result<&str, IdentError> {
    if name.len() > MAX_IDENT_LEN * 2 + 1 || !SAFE_SETTING.is_match(name) {
        return Err(IdentError::InvalidSetting(name.to_string()));
    }
    Ok(name)
}

pub fn is_safe(ident: &str) -> bool {
    checked(ident).is_ok()
}
