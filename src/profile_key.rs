//! C1 — Profile Key: deterministic identifier for the shared resource.
//!
//! Every coordination file is named `<PK>.<suffix>`, so two processes only
//! ever collide on coordination state when they point at the same
//! `(user_data_dir, profile_name)` pair.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::errors::ProfileKeyError;

pub const DEFAULT_PROFILE_NAME: &str = "Default";

/// Resolve `user_data_dir` to an absolute, canonical path.
///
/// Falls back to the absolute non-canonical form if canonicalization fails
/// (e.g. the directory does not exist yet) — the profile key must still be
/// computable before the directory is created.
fn normalize(user_data_dir: &Path) -> PathBuf {
    match user_data_dir.canonicalize() {
        Ok(p) => p,
        Err(_) => {
            if user_data_dir.is_absolute() {
                user_data_dir.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(user_data_dir))
                    .unwrap_or_else(|_| user_data_dir.to_path_buf())
            }
        }
    }
}

/// Compute the profile key for `(user_data_dir, profile_name)`.
///
/// `profile_name` defaults to [`DEFAULT_PROFILE_NAME`] when `None`.
///
/// # Errors
///
/// Returns [`ProfileKeyError::EmptyUserDataDir`] if `user_data_dir` is
/// empty, and [`ProfileKeyError::MissingProfileDir`] if `strict` is set and
/// the directory does not exist.
pub fn profile_key(
    user_data_dir: &Path,
    profile_name: Option<&str>,
    strict: bool,
) -> Result<String, ProfileKeyError> {
    if user_data_dir.as_os_str().is_empty() {
        return Err(ProfileKeyError::EmptyUserDataDir);
    }

    if strict && !user_data_dir.exists() {
        return Err(ProfileKeyError::MissingProfileDir(
            user_data_dir.display().to_string(),
        ));
    }

    let normalized = normalize(user_data_dir);
    let name = profile_name.unwrap_or(DEFAULT_PROFILE_NAME);

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_os_str().as_encoded_bytes());
    hasher.update(b"|");
    hasher.update(name.as_bytes());

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dir_is_rejected() {
        let err = profile_key(Path::new(""), None, false).unwrap_err();
        assert!(matches!(err, ProfileKeyError::EmptyUserDataDir));
    }

    #[test]
    fn same_inputs_yield_same_key() {
        let dir = std::env::temp_dir();
        let a = profile_key(&dir, Some("Default"), false).unwrap();
        let b = profile_key(&dir, Some("Default"), false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_profile_names_yield_different_keys() {
        let dir = std::env::temp_dir();
        let a = profile_key(&dir, Some("Default"), false).unwrap();
        let b = profile_key(&dir, Some("Work"), false).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn missing_dir_in_strict_mode_errors() {
        let dir = std::env::temp_dir().join("definitely-does-not-exist-12345");
        let err = profile_key(&dir, None, true).unwrap_err();
        assert!(matches!(err, ProfileKeyError::MissingProfileDir(_)));
    }

    #[test]
    fn default_profile_name_is_used_when_unset() {
        let dir = std::env::temp_dir();
        let explicit = profile_key(&dir, Some(DEFAULT_PROFILE_NAME), false).unwrap();
        let implicit = profile_key(&dir, None, false).unwrap();
        assert_eq!(explicit, implicit);
    }

    #[test]
    fn key_is_hex() {
        let dir = std::env::temp_dir();
        let key = profile_key(&dir, None, false).unwrap();
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key.len(), 64);
    }
}
