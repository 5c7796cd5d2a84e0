//! Literal secret redaction for log output.
//!
//! A [`Redactor`] is built at startup from the credential values of the
//! running adapter, and session keys or bearer tokens obtained later are
//! added as they arrive. Error messages pass through it before they are
//! logged, so a token echoed back in a backend response never reaches the
//! log.

use std::fmt;
use std::sync::{Arc, RwLock};
use zeroize::Zeroizing;

/// Replacement text for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Replaces known secret values in text.
///
/// Clones share one secret set, so a value added through any clone is
/// redacted by all of them.
#[derive(Clone, Default)]
pub struct Redactor {
    // Longest first, so a secret containing another is replaced whole.
    secrets: Arc<RwLock<Vec<Zeroizing<String>>>>,
}

impl Redactor {
    /// Creates a redactor for the given secret values. Empty values are
    /// ignored.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let redactor = Self::default();
        for secret in secrets {
            redactor.add(secret);
        }
        redactor
    }

    /// Adds a secret value.
    pub fn add(&self, secret: impl Into<String>) {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return;
        }
        let mut secrets = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        if secrets.iter().any(|s| **s == *secret) {
            return;
        }
        secrets.push(secret);
        secrets.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    /// Number of registered secrets.
    pub fn len(&self) -> usize {
        self.secrets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if no secrets are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `text` with every occurrence of every secret replaced.
    pub fn redact(&self, text: &str) -> String {
        let secrets = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        let mut out = text.to_string();
        for secret in secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
        out
    }
}

impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_every_occurrence() {
        let redactor = Redactor::new(["tok-123"]);
        assert_eq!(
            redactor.redact("auth tok-123 failed; retry with tok-123"),
            "auth [REDACTED] failed; retry with [REDACTED]"
        );
    }

    #[test]
    fn test_redacts_regardless_of_surrounding_text() {
        let redactor = Redactor::new(["s3cr3t"]);
        assert_eq!(
            redactor.redact("Authorization: Splunks3cr3tkey"),
            "Authorization: Splunk[REDACTED]key"
        );
    }

    #[test]
    fn test_longest_secret_first() {
        let redactor = Redactor::new(["abc", "abcdef"]);
        assert_eq!(redactor.redact("key=abcdef"), "key=[REDACTED]");
    }

    #[test]
    fn test_empty_and_duplicate_secrets_ignored() {
        let redactor = Redactor::new(["", "k", "k"]);
        assert_eq!(redactor.len(), 1);
        assert_eq!(redactor.redact("no secrets here"), "no secrets here");
        assert!(Redactor::default().is_empty());
    }

    #[test]
    fn test_secret_added_through_clone_is_shared() {
        let redactor = Redactor::new(["api-key"]);
        let handle = redactor.clone();
        handle.add("sess-77");
        assert_eq!(
            redactor.redact("key api-key session sess-77"),
            "key [REDACTED] session [REDACTED]"
        );
        assert_eq!(redactor.len(), 2);
    }

    #[test]
    fn test_debug_hides_values() {
        let redactor = Redactor::new(["visible-secret"]);
        assert!(!format!("{:?}", redactor).contains("visible-secret"));
    }
}
