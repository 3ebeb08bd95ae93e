//! Rate limiting logic and state management.

mod clock;
mod identity;
mod key;
mod limiter;
mod rules;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{
    client_ip, header_key, KeyFn, RequestContext, EDGE_CLIENT_IP_HEADER, FORWARDED_FOR_HEADER,
    UNKNOWN_IDENTITY,
};
pub use key::{CompositeKey, DEFAULT_PREFIX};
pub use limiter::{RateLimiter, RateLimiterBuilder, SWEEP_INTERVAL};
pub use rules::{KeySource, RateLimitRules, RouteRule, ScopedLimiter};
pub use window::{Decision, Quota, WindowEntry};
