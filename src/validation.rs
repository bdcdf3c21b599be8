use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern is valid")
});

pub const MIN_PHONE_DIGITS: usize = 10;

/// Trimmed and lower-cased, the form emails are stored and matched in
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

pub fn phone_digit_count(phone: &str) -> usize {
    phone.chars().filter(|c| c.is_ascii_digit()).count()
}

/// Field-level validation failures, keyed by the request field name
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors {
    errors: BTreeMap<String, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_insert(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("jane.doe+advice@example.co"));
        assert!(is_valid_email("  Jane@Example.com "));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("not an email"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
    }

    #[test]
    fn test_phone_digits_ignore_formatting() {
        assert_eq!(phone_digit_count("(555) 010-1234"), 10);
        assert_eq!(phone_digit_count("+1 555 0101"), 8);
    }

    #[test]
    fn test_first_error_per_field_wins() {
        let mut errors = FieldErrors::new();
        errors.add("email", "email is required");
        errors.add("email", "Invalid email format");
        assert!(!errors.is_empty());
        assert_eq!(errors.into_map()["email"], "email is required");
    }
}
