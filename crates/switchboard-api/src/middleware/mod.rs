//! API Middleware
//!
//! Middleware layers applied in front of handlers.

pub mod ratelimit;

pub use ratelimit::{client_identifier, enforce_rate_limit, rate_limited, RateLimitState};
