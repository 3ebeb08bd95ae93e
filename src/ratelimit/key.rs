//! Composite key generation.

/// Namespace used when a limiter is built without an explicit prefix.
pub const DEFAULT_PREFIX: &str = "rl";

/// A key that uniquely identifies a quota consumer within one limiter.
///
/// The key is composed of the limiter's namespace prefix and the caller
/// identity, so limiters with different prefixes never share quota.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    /// Namespace of the owning limiter
    pub prefix: String,
    /// Caller identity, e.g. a client address or an API key
    pub identity: String,
}

impl CompositeKey {
    /// Create a new composite key.
    pub fn new(prefix: &str, identity: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            identity: identity.to_string(),
        }
    }

    /// The store lookup string, `prefix:identity`.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.prefix, self.identity)
    }
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.prefix, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_to_string() {
        let key = CompositeKey::new("auth-signin", "1.1.1.1");
        assert_eq!(key.to_string_key(), "auth-signin:1.1.1.1");
        assert_eq!(key.to_string(), "auth-signin:1.1.1.1");
    }

    #[test]
    fn test_prefix_separates_equal_identities() {
        let a = CompositeKey::new("a", "x");
        let b = CompositeKey::new("b", "x");
        assert_ne!(a, b);
        assert_ne!(a.to_string_key(), b.to_string_key());
    }
}
