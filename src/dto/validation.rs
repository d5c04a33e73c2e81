//! Validation helpers for DTOs and intents.

use validator::ValidationError;

use crate::state::game::OPTION_COUNT;

/// Longest nickname accepted in a hosted game, in characters.
pub const MAX_NICKNAME_CHARS: usize = 24;

/// Validates that a nickname is 1 to 24 characters once trimmed, without control characters.
///
/// # Examples
///
/// ```ignore
/// validate_nickname("Ana")       // Ok
/// validate_nickname("   ")       // Err - blank
/// validate_nickname("a\u{7}b")   // Err - control character
/// ```
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    let trimmed = nickname.trim();
    let length = trimmed.chars().count();
    if length == 0 || length > MAX_NICKNAME_CHARS {
        let mut err = ValidationError::new("nickname_length");
        err.message = Some(
            format!("Nickname must be 1 to {MAX_NICKNAME_CHARS} characters (got {length})").into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("nickname_format");
        err.message = Some("Nickname must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates the shape of a question supplied over REST.
pub fn validate_question_options(options: &[String]) -> Result<(), ValidationError> {
    if options.len() != OPTION_COUNT {
        let mut err = ValidationError::new("options_count");
        err.message = Some(
            format!(
                "A question needs exactly {OPTION_COUNT} options (got {})",
                options.len()
            )
            .into(),
        );
        return Err(err);
    }

    if options.iter().any(|option| option.trim().is_empty()) {
        let mut err = ValidationError::new("options_blank");
        err.message = Some("Options must not be blank".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_nickname_valid() {
        assert!(validate_nickname("Ana").is_ok());
        assert!(validate_nickname("  Bea  ").is_ok());
        assert!(validate_nickname(&"x".repeat(24)).is_ok());
    }

    #[test]
    fn test_validate_nickname_invalid() {
        assert!(validate_nickname("").is_err());
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname(&"x".repeat(25)).is_err());
        assert!(validate_nickname("a\nb").is_err());
    }

    #[test]
    fn test_validate_question_options() {
        let four = vec!["a".to_string(), "b".into(), "c".into(), "d".into()];
        assert!(validate_question_options(&four).is_ok());
        assert!(validate_question_options(&four[..3]).is_err());
        let blank = vec!["a".to_string(), " ".into(), "c".into(), "d".into()];
        assert!(validate_question_options(&blank).is_err());
    }
}
