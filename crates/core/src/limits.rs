//! Key naming rules
//!
//! Enforced by the schema registry when a key is registered. Violations
//! surface as `InvalidKey`.

use crate::error::{FreezerError, FreezerResult};

/// Maximum key name length in bytes
pub const MAX_KEY_NAME_BYTES: usize = 256;

/// Prefix reserved for keys the store defines for itself
pub const RESERVED_KEY_PREFIX: &str = "freezer/";

/// Check a key name against the naming rules
///
/// A valid name is non-empty, at most [`MAX_KEY_NAME_BYTES`] long, contains
/// no ASCII control characters, is not only whitespace and does not use the
/// reserved prefix.
pub fn validate_key_name(name: &str) -> FreezerResult<()> {
    if name.is_empty() {
        return Err(FreezerError::invalid_key(name, "key name is empty"));
    }
    if name.len() > MAX_KEY_NAME_BYTES {
        return Err(FreezerError::invalid_key(
            name,
            format!(
                "key name is {} bytes, limit is {}",
                name.len(),
                MAX_KEY_NAME_BYTES
            ),
        ));
    }
    if name.trim().is_empty() {
        return Err(FreezerError::invalid_key(name, "key name is only whitespace"));
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err(FreezerError::invalid_key(
            name,
            "key name contains control characters",
        ));
    }
    if name.starts_with(RESERVED_KEY_PREFIX) {
        return Err(FreezerError::invalid_key(
            name,
            format!("prefix '{}' is reserved", RESERVED_KEY_PREFIX),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn kind_of(name: &str) -> Option<ErrorKind> {
        validate_key_name(name).err().map(|e| e.kind())
    }

    #[test]
    fn test_valid_names() {
        assert!(validate_key_name("name").is_ok());
        assert!(validate_key_name("person/age").is_ok());
        assert!(validate_key_name("with space").is_ok());
        assert!(validate_key_name(&"k".repeat(MAX_KEY_NAME_BYTES)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(kind_of(""), Some(ErrorKind::InvalidKey));
        assert_eq!(kind_of("   "), Some(ErrorKind::InvalidKey));
        assert_eq!(kind_of("tab\there"), Some(ErrorKind::InvalidKey));
        assert_eq!(kind_of("freezer/internal"), Some(ErrorKind::InvalidKey));
        assert_eq!(
            kind_of(&"k".repeat(MAX_KEY_NAME_BYTES + 1)),
            Some(ErrorKind::InvalidKey)
        );
    }
}
