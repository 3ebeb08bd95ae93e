//! Rate limiting middleware for HTTP requests.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    response::{IntoResponse, Json},
};
use http::{
    header::{HeaderName, RETRY_AFTER},
    HeaderMap, HeaderValue, Request, Response, StatusCode,
};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tower::{Layer, Service};
use tracing::debug;

use crate::ratelimit::{Decision, RateLimiter, ScopedLimiter};

/// Window quota header.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Requests left in the current window.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Unix seconds at which the current window resets.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Body of a 429 response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TooManyRequests {
    error: &'static str,
    retry_after: u64,
}

/// Tower layer applying one or more path-scoped limiters.
#[derive(Clone)]
pub struct RateLimitLayer {
    scopes: Arc<[ScopedLimiter]>,
}

impl RateLimitLayer {
    /// Guard every path with a single limiter.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self::scoped(vec![ScopedLimiter::new("/", limiter)])
    }

    /// Guard each scope's path prefix with its own limiter.
    ///
    /// Scopes are evaluated in order; every matching scope counts the request.
    pub fn scoped(scopes: Vec<ScopedLimiter>) -> Self {
        Self {
            scopes: scopes.into(),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, next: S) -> Self::Service {
        RateLimitService {
            next,
            scopes: self.scopes.clone(),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<S> {
    next: S,
    scopes: Arc<[ScopedLimiter]>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RateLimitService<S>
where
    S: Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Encoded spellings of a path must not escape its scope
        let path = percent_decode_str(req.uri().path())
            .decode_utf8_lossy()
            .into_owned();
        let mut admitted = None;

        for scope in self.scopes.iter().filter(|scope| scope.matches(&path)) {
            let decision = scope.limiter().admit(&req);

            if !decision.is_allowed() {
                debug!(
                    method = %req.method(),
                    path = %path,
                    prefix = %scope.limiter().prefix(),
                    retry_after_secs = decision.retry_after_secs().unwrap_or_default(),
                    "Request rejected by rate limit"
                );
                let response = too_many_requests(&decision);
                return Box::pin(async move { Ok(response) });
            }

            // Later scopes overwrite earlier headers
            admitted = Some(decision);
        }

        // Call the instance that was polled ready, leaving a fresh clone behind
        let clone = self.next.clone();
        let mut next = std::mem::replace(&mut self.next, clone);

        Box::pin(async move {
            let mut response = next.call(req).await?;

            if let Some(decision) = admitted {
                apply_headers(response.headers_mut(), &decision);
            }

            Ok(response)
        })
    }
}

/// Write the quota headers for a decision.
pub fn apply_headers(headers: &mut HeaderMap, decision: &Decision) {
    let quota = decision.quota();

    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(quota.reset_epoch_secs()));

    if let Some(retry_after) = decision.retry_after_secs() {
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    }
}

/// The 429 response for a denied request.
fn too_many_requests(decision: &Decision) -> Response<Body> {
    let body = TooManyRequests {
        error: "Too many requests",
        retry_after: decision.retry_after_secs().unwrap_or_default(),
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    apply_headers(response.headers_mut(), decision);
    response
}
