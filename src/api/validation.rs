//! Input validation helpers shared across handlers.

/// Symbols accepted by the password policy.
const PASSWORD_SYMBOLS: &str = "!@#$%^&*()";

/// Validate password strength.
/// Returns None if valid, or Some(error_message) if invalid.
pub fn validate_password_strength(password: &str) -> Option<String> {
    if password.len() < 8 {
        return Some("Password must be at least 8 characters".to_string());
    }

    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| PASSWORD_SYMBOLS.contains(c));

    if !has_uppercase {
        return Some("Password must contain at least one uppercase letter".to_string());
    }
    if !has_lowercase {
        return Some("Password must contain at least one lowercase letter".to_string());
    }
    if !has_digit {
        return Some("Password must contain at least one digit".to_string());
    }
    if !has_symbol {
        return Some(format!(
            "Password must contain at least one of {}",
            PASSWORD_SYMBOLS
        ));
    }

    None
}

/// Basic shape check for email addresses.
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.contains('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_strong_password() {
        assert!(validate_password_strength("Sup3rSecret!").is_none());
        assert!(validate_password_strength("Aa1(aaaa").is_none());
    }

    #[test]
    fn test_rejects_short_password() {
        assert!(validate_password_strength("Aa1!x").is_some());
    }

    #[test]
    fn test_rejects_missing_classes() {
        // No uppercase
        assert!(validate_password_strength("sup3rsecret!").is_some());
        // No lowercase
        assert!(validate_password_strength("SUP3RSECRET!").is_some());
        // No digit
        assert!(validate_password_strength("SuperSecret!").is_some());
        // No symbol from the accepted set
        assert!(validate_password_strength("Sup3rSecret").is_some());
        // Symbol outside the accepted set does not count
        assert!(validate_password_strength("Sup3rSecret_").is_some());
    }

    #[test]
    fn test_email_shape() {
        assert!(validate_email("user@example.com"));
        assert!(!validate_email(""));
        assert!(!validate_email("not-an-email"));
    }
}
