//! Route-group rate limit rules.
//!
//! A rule binds one independently configured limiter to a path prefix, so a
//! stricter quota can guard authentication endpoints while general API
//! traffic gets a looser one. Rules are loaded from YAML configuration.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::identity::{header_key, KeyFn};
use super::limiter::RateLimiter;
use crate::error::{Result, TurnstileError};

/// A complete set of route rules, evaluated in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRules {
    /// Route rules in evaluation order
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// A limiter bound to a path prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Requests whose path is this prefix or lies below it are counted
    pub path_prefix: String,
    /// Namespace for the limiter's composite keys
    pub prefix: String,
    /// Maximum requests per window per identity
    pub max: u32,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Where the caller identity comes from
    #[serde(default)]
    pub key: KeySource,
}

/// Source of the caller identity for a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeySource {
    /// Client address from proxy headers
    #[default]
    ClientIp,
    /// Value of a named request header
    Header {
        /// Header name, e.g. `x-api-key`
        name: String,
        /// Identity used when the header is absent
        #[serde(default = "default_header_fallback")]
        fallback: String,
    },
}

fn default_header_fallback() -> String {
    "anon".to_string()
}

impl KeySource {
    /// The identity function for this source, `None` for the limiter default.
    pub fn key_fn(&self) -> Option<KeyFn> {
        match self {
            KeySource::ClientIp => None,
            KeySource::Header { name, fallback } => Some(header_key(name.clone(), fallback.clone())),
        }
    }
}

/// A built limiter together with the path prefix it guards.
#[derive(Debug, Clone)]
pub struct ScopedLimiter {
    path_prefix: String,
    limiter: Arc<RateLimiter>,
}

impl ScopedLimiter {
    /// Bind a limiter to a path prefix. `"/"` or `""` guards every path.
    pub fn new(path_prefix: impl Into<String>, limiter: Arc<RateLimiter>) -> Self {
        let path_prefix = path_prefix.into().trim_end_matches('/').to_string();
        Self {
            path_prefix,
            limiter,
        }
    }

    /// Whether a request path falls under this scope.
    ///
    /// Matching is segment-aware: `/api/auth` covers `/api/auth` and
    /// `/api/auth/session` but not `/api/authors`.
    pub fn matches(&self, path: &str) -> bool {
        path_matches(&self.path_prefix, path)
    }

    /// The guarded path prefix, without trailing slash.
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// The limiter for this scope.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// Segment-aware prefix match. Trailing slashes on the prefix are ignored.
fn path_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix.trim_end_matches('/')) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl RouteRule {
    /// Build the limiter described by this rule.
    pub fn build(&self) -> Result<ScopedLimiter> {
        let mut builder = RateLimiter::builder(self.max, self.window_seconds).prefix(&self.prefix);
        if let Some(key_fn) = self.key.key_fn() {
            builder = builder.shared_key_fn(key_fn);
        }
        Ok(ScopedLimiter::new(&self.path_prefix, Arc::new(builder.build()?)))
    }
}

impl RateLimitRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules guarding the authentication routes of the API.
    ///
    /// Sign-in and sign-up get their own tight quotas; every other auth
    /// endpoint shares a general one.
    pub fn auth_defaults() -> Self {
        let rule = |path_prefix: &str, prefix: &str, max| RouteRule {
            path_prefix: path_prefix.to_string(),
            prefix: prefix.to_string(),
            max,
            window_seconds: 60,
            key: KeySource::ClientIp,
        };

        Self {
            routes: vec![
                rule("/api/auth/sign-in", "auth-signin", 10),
                rule("/api/auth/sign-up", "auth-signup", 5),
                rule("/api/auth", "auth-general", 30),
            ],
        }
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            TurnstileError::Config(format!("Failed to parse rate limit rules: {}", e))
        })
    }

    /// Build one limiter per rule. Fails on the first invalid rule.
    pub fn build(&self) -> Result<Vec<ScopedLimiter>> {
        self.routes.iter().map(RouteRule::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
routes:
  - path_prefix: /api/auth/sign-in
    prefix: auth-signin
    max: 10
    window_seconds: 60
  - path_prefix: /api
    prefix: api
    max: 100
    window_seconds: 60
    key:
      type: header
      name: x-api-key
"#;
        let rules = RateLimitRules::from_yaml(yaml).unwrap();

        assert_eq!(rules.routes.len(), 2);
        assert_eq!(rules.routes[0].key, KeySource::ClientIp);
        assert_eq!(
            rules.routes[1].key,
            KeySource::Header {
                name: "x-api-key".to_string(),
                fallback: "anon".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_rules() {
        let yaml = r#"
routes:
  - path_prefix: /api
    max: ten
"#;
        let err = RateLimitRules::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_path_matching_is_segment_aware() {
        assert!(path_matches("/api/auth", "/api/auth"));
        assert!(path_matches("/api/auth", "/api/auth/sign-in/email"));
        assert!(path_matches("/api/auth/", "/api/auth/session"));
        assert!(!path_matches("/api/auth", "/api/authors"));
        assert!(!path_matches("/api/auth", "/api"));
    }

    #[test]
    fn test_root_prefix_matches_everything() {
        assert!(path_matches("/", "/"));
        assert!(path_matches("/", "/api/health"));
        assert!(path_matches("", "/anything"));
    }

    #[test]
    fn test_build_limiters() {
        let scoped = RateLimitRules::auth_defaults().build().unwrap();

        assert_eq!(scoped.len(), 3);
        assert_eq!(scoped[0].path_prefix(), "/api/auth/sign-in");
        assert_eq!(scoped[0].limiter().prefix(), "auth-signin");
        assert_eq!(scoped[1].limiter().max(), 5);
        assert!(scoped[2].matches("/api/auth/session"));
    }

    #[test]
    fn test_build_rejects_invalid_rule() {
        let mut rules = RateLimitRules::new();
        rules.routes.push(RouteRule {
            path_prefix: "/api".to_string(),
            prefix: "api".to_string(),
            max: 0,
            window_seconds: 60,
            key: KeySource::ClientIp,
        });

        assert!(matches!(rules.build(), Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_header_key_source_builds_key_fn() {
        let rule = RouteRule {
            path_prefix: "/api".to_string(),
            prefix: "api".to_string(),
            max: 1,
            window_seconds: 60,
            key: KeySource::Header {
                name: "x-api-key".to_string(),
                fallback: "anon".to_string(),
            },
        };
        let scoped = rule.build().unwrap();
        let request = |key: &str| {
            http::Request::builder()
                .header("x-api-key", key)
                .body(())
                .unwrap()
        };

        assert!(scoped.limiter().admit(&request("key-a")).is_allowed());
        assert!(!scoped.limiter().admit(&request("key-a")).is_allowed());
        assert!(scoped.limiter().admit(&request("key-b")).is_allowed());
    }
}
