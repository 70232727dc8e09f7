//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Uploader-supplied file names and storage keys are both attacker-controlled
//! and correlatable; spans only carry these reduced forms.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const MAX_NAME_CHARS: usize = 64;

/// Returns the final component of an uploader-declared file name, with
/// control characters replaced and length capped.
pub fn redact_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or("");
    if base.is_empty() {
        return "<unknown>".to_string();
    }
    base.chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .take(MAX_NAME_CHARS)
        .collect()
}

/// Returns a short deterministic hash of a storage key for correlation
/// without exposing the key (which doubles as the public URL path).
pub fn hash_key(key: &str) -> String {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_file_name_strips_directories() {
        assert_eq!(redact_file_name("/home/alice/plans/floor-1.pdf"), "floor-1.pdf");
        assert_eq!(redact_file_name("C:\\Users\\bob\\plan.png"), "plan.png");
        assert_eq!(redact_file_name("plan.pdf"), "plan.pdf");
    }

    #[test]
    fn test_redact_file_name_handles_degenerate_input() {
        assert_eq!(redact_file_name(""), "<unknown>");
        assert_eq!(redact_file_name("///"), "<unknown>");
        assert_eq!(redact_file_name("dir/"), "dir");
    }

    #[test]
    fn test_redact_file_name_replaces_control_chars_and_caps_length() {
        assert_eq!(redact_file_name("a\nb.pdf"), "a_b.pdf");
        let long = "x".repeat(200);
        assert_eq!(redact_file_name(&long).chars().count(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_hash_key_deterministic() {
        let key = "blueprints/0123456789abcdef01234567.pdf";
        assert_eq!(hash_key(key), hash_key(key));
        assert_eq!(hash_key(key).len(), 16);
        assert!(!hash_key(key).contains("blueprints"));
    }

    #[test]
    fn test_hash_key_different_keys() {
        assert_ne!(hash_key("blueprints/a.pdf"), hash_key("blueprints/b.pdf"));
    }
}
