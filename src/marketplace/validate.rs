use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

fn invalid(msg: impl Into<String>) -> ValidationError {
    ValidationError(msg.into())
}

lazy_static::lazy_static! {
    /// Brazilian postal code, with or without the hyphen
    static ref CEP_REGEX: Regex = Regex::new(r"^(\d{5})-?(\d{3})$").unwrap();
}

/// Largest offer value accepted, in cents (ten integer digits and two decimals).
pub const MAX_VALUE_CENTS: i64 = 9_999_999_999;

pub const TITLE_MAX_LEN: usize = 255;
pub const TERM_MAX_LEN: usize = 50;

/// Returns the eight-digit form of a CEP.
pub fn normalize_cep(raw: &str) -> Result<String, ValidationError> {
    let caps = CEP_REGEX
        .captures(raw.trim())
        .ok_or_else(|| invalid("CEP must have 8 digits"))?;
    Ok(format!("{}{}", &caps[1], &caps[2]))
}

pub fn validate_title(raw: &str) -> Result<String, ValidationError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(invalid("Title is required"));
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(invalid(format!(
            "Title must have at most {} characters",
            TITLE_MAX_LEN
        )));
    }
    Ok(title.to_string())
}

pub fn validate_description(raw: &str) -> Result<String, ValidationError> {
    let description = raw.trim();
    if description.is_empty() {
        return Err(invalid("Description is required"));
    }
    Ok(description.to_string())
}

pub fn validate_term(raw: &str) -> Result<String, ValidationError> {
    let term = raw.trim();
    if term.is_empty() {
        return Err(invalid("Term is required"));
    }
    if term.chars().count() > TERM_MAX_LEN {
        return Err(invalid(format!(
            "Term must have at most {} characters",
            TERM_MAX_LEN
        )));
    }
    Ok(term.to_string())
}

/// Converts a monetary value with up to two decimals into cents.
pub fn value_to_cents(value: f64) -> Result<i64, ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid("Value must be a positive amount"));
    }
    let cents = (value * 100.0).round();
    if (cents - value * 100.0).abs() > 1e-6 {
        return Err(invalid("Value must have at most 2 decimal places"));
    }
    if cents > MAX_VALUE_CENTS as f64 {
        return Err(invalid("Value is too large"));
    }
    Ok(cents as i64)
}

pub fn cents_to_value(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub fn validate_rating(rating: i64) -> Result<i16, ValidationError> {
    if !(1..=5).contains(&rating) {
        return Err(invalid("Rating must be between 1 and 5"));
    }
    Ok(rating as i16)
}

pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(invalid("Email is required"));
    }
    if !email.contains('@') {
        return Err(invalid("Invalid email format"));
    }
    Ok(email.to_string())
}

pub fn validate_password(raw: &str) -> Result<(), ValidationError> {
    if raw.len() < 8 {
        return Err(invalid("Password must be at least 8 characters long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cep_accepts_plain_and_hyphenated() {
        assert_eq!(normalize_cep("01001000").unwrap(), "01001000");
        assert_eq!(normalize_cep(" 01001-000 ").unwrap(), "01001000");
    }

    #[test]
    fn test_cep_rejects_bad_input() {
        assert!(normalize_cep("0100100").is_err());
        assert!(normalize_cep("0100-1000").is_err());
        assert!(normalize_cep("abcdefgh").is_err());
    }

    #[test]
    fn test_value_to_cents() {
        assert_eq!(value_to_cents(150.0).unwrap(), 15_000);
        assert_eq!(value_to_cents(99.99).unwrap(), 9_999);
        assert_eq!(value_to_cents(0.1).unwrap(), 10);
        assert!(value_to_cents(0.0).is_err());
        assert!(value_to_cents(-5.0).is_err());
        assert!(value_to_cents(1.234).is_err());
        assert!(value_to_cents(f64::NAN).is_err());
        assert!(value_to_cents(100_000_000.0).is_err());
    }

    #[test]
    fn test_rating_bounds() {
        assert_eq!(validate_rating(1).unwrap(), 1);
        assert_eq!(validate_rating(5).unwrap(), 5);
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn test_title_and_term() {
        assert_eq!(validate_title("  Pintura  ").unwrap(), "Pintura");
        assert!(validate_title("   ").is_err());
        assert!(validate_term(&"x".repeat(51)).is_err());
        assert_eq!(validate_term("3 dias").unwrap(), "3 dias");
    }

    #[test]
    fn test_credentials() {
        assert!(validate_email("no-at-sign").is_err());
        assert_eq!(validate_email(" a@b.com ").unwrap(), "a@b.com");
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }
}
