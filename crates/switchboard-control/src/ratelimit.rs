//! Sliding-window rate limiting backed by the coordination store
//!
//! Each (operation class, caller) pair owns a sorted set of attempt timestamps
//! under `ratelimit:<namespace>:<caller>`. Every attempt is recorded, accepted
//! or not, so rapid retries keep a rejected caller rejected until the window
//! rolls forward.

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use switchboard_store::{CoordinationStore, WindowInsert};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ControlError;

/// Limit and window applied to one key namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Namespace isolating this policy's keys from every other policy
    pub namespace: String,
    /// Attempts allowed within the window
    pub max_requests: u64,
    /// Trailing window length
    pub window_seconds: u64,
}

impl RateLimitPolicy {
    pub fn new(namespace: impl Into<String>, max_requests: u64, window_seconds: u64) -> Self {
        Self {
            namespace: namespace.into(),
            max_requests,
            window_seconds,
        }
    }
}

/// Externally triggered operation classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// CLI login session creation: 10 per minute
    SessionCreation,
    /// CLI login status polling: 60 per minute (one poll every 5s is fine)
    SessionStatusPoll,
    /// Tunnel authentication: 30 per minute
    TunnelAuth,
    /// Tunnel registration: 20 per minute
    TunnelRegistration,
    /// Token exchange: 20 per minute
    TokenExchange,
    /// Everything else on the API: 100 per minute
    General,
}

impl OperationClass {
    pub const ALL: [OperationClass; 6] = [
        OperationClass::SessionCreation,
        OperationClass::SessionStatusPoll,
        OperationClass::TunnelAuth,
        OperationClass::TunnelRegistration,
        OperationClass::TokenExchange,
        OperationClass::General,
    ];

    /// Key namespace of this class
    pub fn namespace(self) -> &'static str {
        match self {
            OperationClass::SessionCreation => "cli-login",
            OperationClass::SessionStatusPoll => "cli-login-status",
            OperationClass::TunnelAuth => "tunnel-auth",
            OperationClass::TunnelRegistration => "tunnel-register",
            OperationClass::TokenExchange => "token-exchange",
            OperationClass::General => "general",
        }
    }

    /// Configured limit for this class
    pub fn policy(self) -> RateLimitPolicy {
        let max_requests = match self {
            OperationClass::SessionCreation => 10,
            OperationClass::SessionStatusPoll => 60,
            OperationClass::TunnelAuth => 30,
            OperationClass::TunnelRegistration => 20,
            OperationClass::TokenExchange => 20,
            OperationClass::General => 100,
        };
        RateLimitPolicy::new(self.namespace(), max_requests, 60)
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Outcome of one rate-limit check
///
/// A rejection is an ordinary value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Attempts counted in the window, including this one if it was allowed
    pub current: u64,
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the oldest event in the window ages out
    pub reset_in: u64,
}

impl RateLimitDecision {
    /// Evaluate a window given the count observed before this attempt
    fn evaluate(
        policy: &RateLimitPolicy,
        count: u64,
        oldest_score: Option<i64>,
        now_ms: i64,
    ) -> Self {
        let allowed = count < policy.max_requests;
        let window_ms = (policy.window_seconds as i64).saturating_mul(1000);

        // The batch always inserts the current attempt, so the oldest score is
        // at most `now_ms` and a fresh window resets in `window_seconds`.
        let oldest = oldest_score.unwrap_or(now_ms).min(now_ms);
        let until_reset_ms = (oldest + window_ms - now_ms).max(0);
        let reset_in = (until_reset_ms as u64).div_ceil(1000);

        Self {
            allowed,
            current: if allowed { count + 1 } else { count },
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(count).saturating_sub(1),
            reset_in,
        }
    }
}

/// Key holding the event window of one caller under one namespace
pub fn rate_limit_key(namespace: &str, caller: &str) -> String {
    format!("ratelimit:{}:{}", namespace, caller)
}

/// Sliding-window rate limiter shared by every request handler
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn CoordinationStore>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Check `caller` against the limit of an operation class
    pub async fn check(
        &self,
        class: OperationClass,
        caller: &str,
    ) -> Result<RateLimitDecision, ControlError> {
        self.check_policy(&class.policy(), caller).await
    }

    /// Check `caller` against an arbitrary policy
    pub async fn check_policy(
        &self,
        policy: &RateLimitPolicy,
        caller: &str,
    ) -> Result<RateLimitDecision, ControlError> {
        self.check_at(policy, caller, Utc::now().timestamp_millis())
            .await
    }

    /// Check `caller` as of `now_ms` (milliseconds since the Unix epoch)
    pub async fn check_at(
        &self,
        policy: &RateLimitPolicy,
        caller: &str,
        now_ms: i64,
    ) -> Result<RateLimitDecision, ControlError> {
        let window_ms = (policy.window_seconds as i64).saturating_mul(1000);
        let window_start = now_ms - window_ms;

        let insert = WindowInsert {
            key: rate_limit_key(&policy.namespace, caller),
            evict_before: window_start,
            score: now_ms,
            // Suffix keeps same-millisecond attempts distinct
            member: format!("{}-{}", now_ms, Uuid::new_v4().simple()),
            ttl_seconds: policy.window_seconds + 1,
        };

        let state = self.store.window_insert(&insert).await?;
        let decision = RateLimitDecision::evaluate(policy, state.count, state.oldest_score, now_ms);

        if decision.allowed {
            debug!(
                namespace = %policy.namespace,
                caller = %caller,
                current = decision.current,
                remaining = decision.remaining,
                "Rate limit check passed"
            );
        } else {
            warn!(
                namespace = %policy.namespace,
                caller = %caller,
                limit = decision.limit,
                reset_in = decision.reset_in,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }
}
