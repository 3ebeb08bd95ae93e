//! HTTP API: rate limiting middleware, routes and server.

mod layer;
mod routes;
mod server;

pub use layer::{
    apply_headers, RateLimitLayer, RateLimitService, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
    X_RATELIMIT_RESET,
};
pub use routes::router;
pub use server::HttpServer;
