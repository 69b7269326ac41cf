//! crates/mangati_core/src/validation.rs
//!
//! Field rules for user-supplied input, checked at the HTTP boundary before
//! anything reaches a port.

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::ViewerSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: &'static str, min: i64, max: i64 },
    #[error("Email address is not valid")]
    InvalidEmail,
}

pub const USERNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 8;
pub const CHAPTER_TITLE_MAX: usize = 100;
pub const SERIES_TITLE_MAX: usize = 200;
pub const FILTER_NAME_MAX: usize = 50;

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Trims `value` and requires between 1 and `max` characters.
pub fn required_text(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

pub fn email(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field: "Email" });
    }
    match EMAIL.as_ref() {
        Some(re) if re.is_match(trimmed) => Ok(trimmed.to_string()),
        _ => Err(ValidationError::InvalidEmail),
    }
}

pub fn password(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() < PASSWORD_MIN {
        return Err(ValidationError::TooShort {
            field: "Password",
            min: PASSWORD_MIN,
        });
    }
    Ok(())
}

pub fn zoom_level(value: i32) -> Result<(), ValidationError> {
    if !(ViewerSettings::MIN_ZOOM..=ViewerSettings::MAX_ZOOM).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: "Zoom level",
            min: ViewerSettings::MIN_ZOOM.into(),
            max: ViewerSettings::MAX_ZOOM.into(),
        });
    }
    Ok(())
}

pub fn page_number(value: i32) -> Result<(), ValidationError> {
    if value < 1 {
        return Err(ValidationError::OutOfRange {
            field: "Page number",
            min: 1,
            max: i32::MAX.into(),
        });
    }
    Ok(())
}

pub fn file_size(value: i64) -> Result<i64, ValidationError> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: "File size",
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(value)
}
