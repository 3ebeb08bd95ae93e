//! API routes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use super::layer::RateLimitLayer;
use crate::ratelimit::ScopedLimiter;

/// Build the API router with the given scoped limiters in front of it.
///
/// Authentication itself is delegated to an external provider; the auth
/// routes here only stand in for it so the limits can be exercised.
pub fn router(scopes: Vec<ScopedLimiter>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/*rest", get(auth).post(auth))
        .fallback(not_found)
        .layer(RateLimitLayer::scoped(scopes))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn auth() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimitRules;
    use axum::body::Body;
    use http::Request;
    use tower::ServiceExt;

    fn get_req(path: &str, ip: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("cf-connecting-ip", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_not_limited() {
        let app = router(RateLimitRules::auth_defaults().build().unwrap());

        for _ in 0..50 {
            let res = app.clone().oneshot(get_req("/api/health", "1.1.1.1")).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().get("x-ratelimit-limit").is_none());
        }
    }

    #[tokio::test]
    async fn test_unknown_api_route_is_json_404() {
        let app = router(Vec::new());

        let res = app.oneshot(get_req("/api/nope", "1.1.1.1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn test_sign_up_limit_is_stricter_than_general() {
        let app = router(RateLimitRules::auth_defaults().build().unwrap());

        for _ in 0..5 {
            let res = app
                .clone()
                .oneshot(get_req("/api/auth/sign-up/email", "9.9.9.9"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = app
            .clone()
            .oneshot(get_req("/api/auth/sign-up/email", "9.9.9.9"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()["x-ratelimit-limit"], "5");

        // The general auth quota still has room
        let res = app
            .clone()
            .oneshot(get_req("/api/auth/session", "9.9.9.9"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-limit"], "30");
        assert_eq!(res.headers()["x-ratelimit-remaining"], "24");
    }

    #[tokio::test]
    async fn test_encoded_sign_in_path_uses_sign_in_limit() {
        let app = router(RateLimitRules::auth_defaults().build().unwrap());

        for _ in 0..10 {
            let res = app
                .clone()
                .oneshot(get_req("/api/auth/sign%2Din/email", "6.6.6.6"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.headers()["x-ratelimit-limit"], "30");
        }

        let res = app
            .clone()
            .oneshot(get_req("/api/auth/sign%2Din/email", "6.6.6.6"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()["x-ratelimit-limit"], "10");

        // The plain spelling shares the same quota
        let res = app
            .clone()
            .oneshot(get_req("/api/auth/sign-in/email", "6.6.6.6"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
