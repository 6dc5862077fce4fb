//! Stable session identifiers derived from free text
//!
//! A session id scopes cached records to one logical workflow instance.
//! Two derivations are offered:
//!
//! - [`hashed_session_id`]: `prefix-<sha256 hex>`, stable for arbitrarily
//!   long input such as a full game description.
//! - [`slug_session_id`]: `prefix-<lowercased text, spaces → dashes>`,
//!   readable when the input is a short idea or topic.

use sha2::{Digest, Sha256};

/// `prefix-<sha256(text) as lowercase hex>`.
///
/// ```rust
/// use genflow_core::session::hashed_session_id;
///
/// let id = hashed_session_id("game-gen", "A simple snake game");
/// assert!(id.starts_with("game-gen-"));
/// assert_eq!(id.len(), "game-gen-".len() + 64);
/// ```
pub fn hashed_session_id(prefix: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    join(prefix, &format!("{:x}", hasher.finalize()))
}

/// `prefix-<text lowercased with spaces replaced by dashes>`.
///
/// ```rust
/// use genflow_core::session::slug_session_id;
///
/// assert_eq!(
///     slug_session_id("validate-startup-idea", "AI Tutor For Kids"),
///     "validate-startup-idea-ai-tutor-for-kids"
/// );
/// ```
pub fn slug_session_id(prefix: &str, text: &str) -> String {
    let slug = text.trim().to_lowercase().replace(' ', "-");
    join(prefix, &slug)
}

fn join(prefix: &str, tail: &str) -> String {
    if prefix.is_empty() {
        tail.to_string()
    } else {
        format!("{prefix}-{tail}")
    }
}
