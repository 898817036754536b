//! MSISDN normalisation for `sendText`'s recipient argument.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{GatewayError, GatewayResult};

const DEFAULT_COUNTRY_PREFIX: &str = "62";

static VALID_MSISDN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{8,15}$").expect("static regex"));

/// Strips spaces/dashes/parentheses, drops a leading `+`, rewrites a leading
/// `0` to the default country prefix, and rejects anything that doesn't end
/// up looking like `^\d{8,15}$`.
pub fn normalize_msisdn(raw: &str) -> GatewayResult<String> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if let Some(rest) = cleaned.strip_prefix('+') {
        cleaned = rest.to_owned();
    }

    if let Some(rest) = cleaned.strip_prefix('0') {
        cleaned = format!("{DEFAULT_COUNTRY_PREFIX}{rest}");
    }

    if VALID_MSISDN.is_match(&cleaned) {
        Ok(cleaned)
    } else {
        Err(GatewayError::validation(
            "Invalid 'to' (use digits, 8-15, with country code)",
        ))
    }
}

/// Validates the `text` body of `sendText` (1-1000 chars).
pub fn validate_text(text: &str) -> GatewayResult<()> {
    if text.is_empty() || text.chars().count() > 1000 {
        return Err(GatewayError::validation("Invalid 'text' (1-1000 chars)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators_and_leading_plus() {
        assert_eq!(normalize_msisdn("+62 812-3456789").unwrap(), "628123456789");
    }

    #[test]
    fn rewrites_leading_zero_to_default_country_prefix() {
        assert_eq!(normalize_msisdn("0812-345-6789").unwrap(), "628123456789");
    }

    #[test]
    fn already_normalised_number_passes_through() {
        assert_eq!(normalize_msisdn("628123456789").unwrap(), "628123456789");
    }

    #[test]
    fn rejects_non_digit_payloads() {
        let err = normalize_msisdn("abc").unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert!(normalize_msisdn("123").is_err());
        assert!(normalize_msisdn("1234567890123456").is_err());
    }

    #[test]
    fn text_length_bounds() {
        assert!(validate_text("").is_err());
        assert!(validate_text("hi").is_ok());
        assert!(validate_text(&"x".repeat(1000)).is_ok());
        assert!(validate_text(&"x".repeat(1001)).is_err());
    }
}
