//! Turnstile - Fixed-Window HTTP Rate Limiting
//!
//! This crate implements per-process request limiting for HTTP APIs. Each
//! limiter counts requests per caller identity within fixed time windows,
//! and an axum/tower middleware applies independently configured limiters
//! to route groups, answering exhausted callers with `429 Too Many Requests`.

pub mod api;
pub mod config;
pub mod error;
pub mod ratelimit;
