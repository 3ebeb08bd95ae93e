//! Configuration management for Turnstile.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::ratelimit::{RateLimitRules, RouteRule};

/// Prefix for environment overrides, e.g. `TURNSTILE__SERVER__HTTP_ADDR`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a separate rate limit rules file
    pub rules_path: Option<PathBuf>,

    /// Inline route rules; take precedence over `rules_path`
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

impl RateLimitingConfig {
    /// The rules to enforce.
    ///
    /// Inline routes win, then the rules file, then the built-in
    /// authentication route defaults.
    pub fn effective_rules(&self) -> Result<RateLimitRules> {
        if !self.routes.is_empty() {
            return Ok(RateLimitRules {
                routes: self.routes.clone(),
            });
        }

        match &self.rules_path {
            Some(path) => RateLimitRules::from_file(path),
            None => {
                info!("No rate limit rules configured, using auth route defaults");
                Ok(RateLimitRules::auth_defaults())
            }
        }
    }
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}
