//! Core fixed-window rate limiter implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::identity::{client_ip, KeyFn, RequestContext};
use super::key::{CompositeKey, DEFAULT_PREFIX};
use super::window::{Decision, Quota, WindowEntry};
use crate::error::{Result, TurnstileError};

/// Expired entries are swept on every this-many-th admission.
pub const SWEEP_INTERVAL: u64 = 100;

/// Window entries plus the call counter driving the lazy sweep.
///
/// Both live behind one lock so a sweep never interleaves with an admission.
#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, WindowEntry>,
    calls: u64,
}

impl Store {
    /// Drop every entry whose window has ended. Returns how many were removed.
    fn sweep(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }
}

/// A fixed-window limiter admitting at most `max` requests per key per window.
///
/// Each instance owns its store; instances with different prefixes never
/// share quota. Windows are fixed rather than sliding: a window opens on the
/// first request after the previous one ended, so a burst straddling a
/// boundary can see up to `2 * max` admissions.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    max: u32,
    window: Duration,
    prefix: String,
    key_fn: KeyFn,
    clock: Arc<dyn Clock>,
    store: Mutex<Store>,
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterBuilder {
    max: u32,
    window_seconds: u64,
    prefix: String,
    key_fn: Option<KeyFn>,
    clock: Option<Arc<dyn Clock>>,
}

impl RateLimiterBuilder {
    /// Namespace for composite keys. Defaults to `"rl"`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replace the default client address identity.
    pub fn key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&dyn RequestContext) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    /// Use an already shared identity function.
    pub fn shared_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    /// Replace the system clock, e.g. with a [`ManualClock`](super::ManualClock).
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Validate the parameters and build the limiter.
    pub fn build(self) -> Result<RateLimiter> {
        if self.max == 0 {
            return Err(TurnstileError::Config(format!(
                "rate limiter '{}': max must be positive",
                self.prefix
            )));
        }
        if self.window_seconds == 0 {
            return Err(TurnstileError::Config(format!(
                "rate limiter '{}': window_seconds must be positive",
                self.prefix
            )));
        }

        debug!(
            prefix = %self.prefix,
            max = self.max,
            window_seconds = self.window_seconds,
            "Creating rate limiter"
        );

        let key_fn: KeyFn = match self.key_fn {
            Some(key_fn) => key_fn,
            None => Arc::new(client_ip),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        Ok(RateLimiter {
            max: self.max,
            window: Duration::from_secs(self.window_seconds),
            prefix: self.prefix,
            key_fn,
            clock,
            store: Mutex::new(Store::default()),
        })
    }
}

impl RateLimiter {
    /// Start building a limiter admitting `max` requests per `window_seconds`.
    pub fn builder(max: u32, window_seconds: u64) -> RateLimiterBuilder {
        RateLimiterBuilder {
            max,
            window_seconds,
            prefix: DEFAULT_PREFIX.to_string(),
            key_fn: None,
            clock: None,
        }
    }

    /// Create a limiter with the default prefix, identity and clock.
    pub fn new(max: u32, window_seconds: u64) -> Result<Self> {
        Self::builder(max, window_seconds).build()
    }

    /// Count a request against its caller's quota.
    pub fn admit(&self, request: &dyn RequestContext) -> Decision {
        let identity = (self.key_fn)(request);
        self.admit_identity(&identity)
    }

    /// Count a request for an already known identity.
    pub fn admit_identity(&self, identity: &str) -> Decision {
        let now = self.clock.now_millis();
        let key = CompositeKey::new(&self.prefix, identity);

        let mut guard = self.store.lock();
        let store = &mut *guard;

        store.calls = store.calls.wrapping_add(1);
        if store.calls % SWEEP_INTERVAL == 0 {
            let removed = store.sweep(now);
            debug!(
                prefix = %self.prefix,
                removed = removed,
                remaining = store.entries.len(),
                "Swept expired rate limit windows"
            );
        }

        let lookup = key.to_string_key();

        if let Some(entry) = store
            .entries
            .get_mut(&lookup)
            .filter(|entry| !entry.is_expired(now))
        {
            let reset_at = entry.reset_at();

            if entry.try_increment(self.max) {
                trace!(key = %key, count = entry.count(), "Request admitted");
                return Decision::Allow(Quota {
                    limit: self.max,
                    remaining: self.max - entry.count(),
                    reset_at,
                });
            }

            let retry_after_secs = entry.seconds_until_reset(now);
            debug!(
                key = %key,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            return Decision::Deny {
                quota: Quota {
                    limit: self.max,
                    remaining: 0,
                    reset_at,
                },
                retry_after_secs,
            };
        }

        let entry = WindowEntry::open(now, self.window);
        trace!(key = %key, reset_at = entry.reset_at(), "Opening rate limit window");
        store.entries.insert(lookup, entry);

        Decision::Allow(Quota {
            limit: self.max,
            remaining: self.max - 1,
            reset_at: entry.reset_at(),
        })
    }

    /// Remove every expired entry now instead of waiting for the lazy sweep.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        self.store.lock().sweep(now)
    }

    /// Maximum admitted requests per window.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Composite key namespace.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of stored entries, expired-but-unswept ones included.
    pub fn entry_count(&self) -> usize {
        self.store.lock().entries.len()
    }

    /// Clear all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.lock().entries.clear();
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max", &self.max)
            .field("window", &self.window)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
