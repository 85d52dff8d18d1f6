// Input Validation Module
// Validation for user-supplied fields and money-command shapes

use crate::error::{Result, WalletError};
use crate::models::SUPPORTED_CURRENCY;
use regex::Regex;
use rust_decimal::Decimal;

/// Maximum lengths for various input fields
pub mod limits {
    pub const MAX_EMAIL_LENGTH: usize = 254;
    pub const MAX_NAME_LENGTH: usize = 100;
    pub const MAX_USERNAME_LENGTH: usize = 64;
    pub const MIN_USERNAME_LENGTH: usize = 3;
    pub const MAX_PHONE_LENGTH: usize = 20;
    pub const MIN_PASSWORD_LENGTH: usize = 8;
    pub const MAX_PASSWORD_LENGTH: usize = 128;
    pub const MAX_ADDRESS_LENGTH: usize = 500;
    pub const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 128;
}

/// Email validation (format + length)
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(WalletError::InvalidInput("Email cannot be empty".into()));
    }

    if email.len() > limits::MAX_EMAIL_LENGTH {
        return Err(WalletError::InvalidInput(format!(
            "Email exceeds maximum length of {}",
            limits::MAX_EMAIL_LENGTH
        )));
    }

    let email_regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap();

    if !email_regex.is_match(email) {
        return Err(WalletError::InvalidInput("Invalid email format".into()));
    }

    if email.contains("..") || email.starts_with('.') || email.ends_with('.') {
        return Err(WalletError::InvalidInput("Invalid email format".into()));
    }

    Ok(())
}

/// Username validation: the identity provider accepts lowercase alphanumerics,
/// underscores and dots.
pub fn validate_username(username: &str) -> Result<()> {
    if username.len() < limits::MIN_USERNAME_LENGTH || username.len() > limits::MAX_USERNAME_LENGTH
    {
        return Err(WalletError::InvalidInput(format!(
            "Username must be between {} and {} characters",
            limits::MIN_USERNAME_LENGTH,
            limits::MAX_USERNAME_LENGTH
        )));
    }

    let username_regex = Regex::new(r"^[a-z0-9][a-z0-9._]*$").unwrap();
    if !username_regex.is_match(username) {
        return Err(WalletError::InvalidInput(
            "Username may only contain lowercase letters, digits, dots and underscores".into(),
        ));
    }

    Ok(())
}

/// Name validation (first/last names). Allows letters, spaces, hyphens,
/// apostrophes and periods.
pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WalletError::InvalidInput(format!(
            "{} cannot be empty",
            field_name
        )));
    }

    if name.len() > limits::MAX_NAME_LENGTH {
        return Err(WalletError::InvalidInput(format!(
            "{} exceeds maximum length of {}",
            field_name,
            limits::MAX_NAME_LENGTH
        )));
    }

    let name_regex = Regex::new(r"^[\p{L}\p{M}\s'\-\.]+$").unwrap();
    if !name_regex.is_match(name) {
        return Err(WalletError::InvalidInput(format!(
            "{} contains invalid characters",
            field_name
        )));
    }

    if name.trim() != name {
        return Err(WalletError::InvalidInput(format!(
            "{} cannot start or end with whitespace",
            field_name
        )));
    }

    Ok(())
}

/// Phone validation: E.164-style, optional leading +, 7-15 digits.
pub fn validate_phone(phone: &str) -> Result<()> {
    if phone.is_empty() || phone.len() > limits::MAX_PHONE_LENGTH {
        return Err(WalletError::InvalidInput("Invalid phone number".into()));
    }

    let phone_regex = Regex::new(r"^\+?[0-9]{7,15}$").unwrap();
    if !phone_regex.is_match(phone) {
        return Err(WalletError::InvalidInput(
            "Phone number must contain 7-15 digits with an optional leading +".into(),
        ));
    }

    Ok(())
}

/// Password validation. Strength enforcement beyond length lives in the
/// identity provider; this guards obviously unusable inputs before the call.
pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < limits::MIN_PASSWORD_LENGTH {
        return Err(WalletError::InvalidInput(format!(
            "Password must be at least {} characters",
            limits::MIN_PASSWORD_LENGTH
        )));
    }

    if password.len() > limits::MAX_PASSWORD_LENGTH {
        return Err(WalletError::InvalidInput(format!(
            "Password exceeds maximum length of {}",
            limits::MAX_PASSWORD_LENGTH
        )));
    }

    Ok(())
}

/// Currency validation: 3-letter uppercase code, restricted to the supported
/// currency in the MVP.
pub fn validate_currency(currency: &str) -> Result<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(WalletError::InvalidInput(
            "Currency must be a 3-letter uppercase code".into(),
        ));
    }

    if currency != SUPPORTED_CURRENCY {
        return Err(WalletError::InvalidInput(format!(
            "Currency {} is not supported; only {} is available",
            currency, SUPPORTED_CURRENCY
        )));
    }

    Ok(())
}

/// Monetary amount validation: strictly positive with at most two fractional
/// digits.
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidInput(
            "Amount must be greater than zero".into(),
        ));
    }

    if amount.normalize().scale() > 2 {
        return Err(WalletError::InvalidInput(
            "Amount must have at most two fractional digits".into(),
        ));
    }

    Ok(())
}

/// Idempotency key validation: non-empty, bounded, printable ASCII.
pub fn validate_idempotency_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(WalletError::InvalidInput(
            "Idempotency key cannot be empty".into(),
        ));
    }

    if key.len() > limits::MAX_IDEMPOTENCY_KEY_LENGTH {
        return Err(WalletError::InvalidInput(format!(
            "Idempotency key exceeds maximum length of {}",
            limits::MAX_IDEMPOTENCY_KEY_LENGTH
        )));
    }

    if !key.chars().all(|c| c.is_ascii_graphic()) {
        return Err(WalletError::InvalidInput(
            "Idempotency key must be printable ASCII".into(),
        ));
    }

    Ok(())
}

/// Free-text address validation (length only).
pub fn validate_address(address: &str) -> Result<()> {
    if address.len() > limits::MAX_ADDRESS_LENGTH {
        return Err(WalletError::InvalidInput(format!(
            "Address exceeds maximum length of {}",
            limits::MAX_ADDRESS_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("user.name+tag@sub.domain.co.ke").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("double..dot@example.com").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("testuser").is_ok());
        assert!(validate_username("john_doe").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("Has Spaces").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+254712345678").is_ok());
        assert!(validate_phone("0712345678").is_ok());
        assert!(validate_phone("12ab34").is_err());
        assert!(validate_phone("").is_err());
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("KES").is_ok());
        assert!(validate_currency("USD").is_err());
        assert!(validate_currency("kes").is_err());
        assert!(validate_currency("KESH").is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("100.00".parse().unwrap()).is_ok());
        assert!(validate_amount("0.01".parse().unwrap()).is_ok());
        assert!(validate_amount("0".parse().unwrap()).is_err());
        assert!(validate_amount("-5".parse().unwrap()).is_err());
        assert!(validate_amount("1.001".parse().unwrap()).is_err());
        // trailing zeros beyond two places are fine once normalized
        assert!(validate_amount("1.1000".parse().unwrap()).is_ok());
    }

    #[test]
    fn test_validate_idempotency_key() {
        assert!(validate_idempotency_key("dep-1").is_ok());
        assert!(validate_idempotency_key("").is_err());
        assert!(validate_idempotency_key("   ").is_err());
        assert!(validate_idempotency_key("has space").is_err());
        assert!(validate_idempotency_key(&"k".repeat(200)).is_err());
    }
}
