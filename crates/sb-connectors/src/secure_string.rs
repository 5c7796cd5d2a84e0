//! Secret string type for credentials and session keys.
//!
//! Every token, session key, password and API key handled by a connector is
//! wrapped in a [`SecureString`]. The contents are zeroized on drop and never
//! show up in `Debug` or `Display` output.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// Placeholder printed in place of secret values.
pub const REDACTED: &str = "[REDACTED]";

/// A string that is zeroized when dropped and redacted when formatted.
///
/// ```
/// use sb_connectors::SecureString;
///
/// let key = SecureString::new("misp-api-key".to_string());
/// assert_eq!(key.expose_secret(), "misp-api-key");
/// assert_eq!(format!("{key:?}"), "SecureString([REDACTED])");
/// ```
#[derive(Clone, Default)]
pub struct SecureString(Zeroizing<String>);

impl SecureString {
    /// Wraps a secret value.
    pub fn new(s: String) -> Self {
        Self(Zeroizing::new(s))
    }

    /// Returns the secret for use on the wire.
    ///
    /// Do not log or copy the returned slice.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Returns true if no secret is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds a new secret by prefixing this one, e.g. `"Bearer "` + token.
    ///
    /// The intermediate buffer lives inside the returned value, so the
    /// combined header value is zeroized as well.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        let mut combined = String::with_capacity(prefix.len() + self.0.len());
        combined.push_str(prefix);
        combined.push_str(&self.0);
        Self::new(combined)
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString({})", REDACTED)
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for SecureString {}

// Serialization writes the redaction marker so dumping a config never leaks
// credentials. Secrets are only ever read in, never written out.
impl Serialize for SecureString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(REDACTED)
        }
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SecureString::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expose_secret() {
        let secret = SecureString::from("session-key-1");
        assert_eq!(secret.expose_secret(), "session-key-1");
        assert!(!secret.is_empty());
        assert!(SecureString::default().is_empty());
    }

    #[test]
    fn test_formatting_is_redacted() {
        let secret = SecureString::new("super-secret".to_string());
        assert!(!format!("{:?}", secret).contains("super-secret"));
        assert_eq!(format!("{}", secret), REDACTED);
    }

    #[test]
    fn test_with_prefix() {
        let token = SecureString::from("abc123");
        let header = token.with_prefix("Bearer ");
        assert_eq!(header.expose_secret(), "Bearer abc123");
        assert!(!format!("{:?}", header).contains("abc123"));
    }

    #[test]
    fn test_equality() {
        assert_eq!(SecureString::from("same"), SecureString::from("same"));
        assert_ne!(SecureString::from("same"), SecureString::from("other"));
    }

    #[test]
    fn test_serialize_redacts_and_deserialize_reads_value() {
        let secret = SecureString::from("client-secret");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");

        let parsed: SecureString = serde_json::from_str("\"client-secret\"").unwrap();
        assert_eq!(parsed.expose_secret(), "client-secret");
    }
}
