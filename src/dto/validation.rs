//! Validation helpers for DTOs.

use validator::ValidationError;

/// Maximum accepted length for participant and room display names.
const MAX_NAME_LEN: usize = 64;

/// Validates that a display name is non-blank and within the length bound.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("display_name_blank");
        err.message = Some("Display name must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > MAX_NAME_LEN {
        let mut err = ValidationError::new("display_name_length");
        err.message =
            Some(format!("Display name must be at most {MAX_NAME_LEN} characters").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_names() {
        assert!(validate_display_name("Ada").is_ok());
        assert!(validate_display_name("table regular 42").is_ok());
    }

    #[test]
    fn rejects_blank_names() {
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name("   ").is_err());
    }

    #[test]
    fn rejects_overlong_names() {
        let long = "x".repeat(65);
        assert!(validate_display_name(&long).is_err());
    }
}
