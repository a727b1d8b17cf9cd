//! Storage key validation

use crate::{ApiscopeError, Result};

/// Longest accepted key
pub const MAX_KEY_LEN: usize = 255;

/// Validate a storage key
///
/// Keys double as file names in [`super::FileStore`], so anything that could
/// escape the store directory is rejected.
///
/// # Errors
///
/// Returns `InvalidKey` describing the first violated rule
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(ApiscopeError::InvalidKey(
            "Key cannot be empty".to_string(),
        ));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(ApiscopeError::InvalidKey(format!(
            "Key too long: {} > {MAX_KEY_LEN}",
            key.len()
        )));
    }

    if key.contains('/') || key.contains('\\') {
        return Err(ApiscopeError::InvalidKey(
            "Key cannot contain path separators".to_string(),
        ));
    }

    if key.starts_with('.') {
        return Err(ApiscopeError::InvalidKey(
            "Key cannot start with dot".to_string(),
        ));
    }

    if key.contains("..") {
        return Err(ApiscopeError::InvalidKey(
            "Key cannot contain '..'".to_string(),
        ));
    }

    if let Some(bad) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(ApiscopeError::InvalidKey(format!(
            "Key contains invalid character {bad:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(validate_key("baseline.session-1").is_ok());
        assert!(validate_key("A_b.c-9").is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key(&"a".repeat(256)).is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("a\\b").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("a..b").is_err());
        assert!(validate_key("a\0b").is_err());
        assert!(validate_key("with space").is_err());
    }
}
