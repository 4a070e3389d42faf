//! Control plane core for the tunnel fleet
//!
//! - [`identifier`]: canonical tunnel identifiers per protocol
//! - [`presence`]: read-only view of which tunnels are online
//! - [`channel`]: advisory kill broadcasts to the edge fleet
//! - [`ratelimit`]: sliding-window limits for externally triggered operations
pub mod channel;
pub mod identifier;
pub mod presence;
pub mod ratelimit;

use thiserror::Error;

pub use channel::{ControlChannel, ControlMessage, ControlSubscriber, CONTROL_CHANNEL};
pub use identifier::{
    extract_subdomain, resolve, IdentifierPolicy, ResolvedIdentifier, TunnelProtocol,
};
pub use presence::{presence_key, PresenceRegistry, DEFAULT_SCAN_BATCH, PRESENCE_PREFIX};
pub use ratelimit::{
    rate_limit_key, OperationClass, RateLimitDecision, RateLimitPolicy, SlidingWindowLimiter,
};

/// Errors surfaced by control plane operations
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Coordination store error: {0}")]
    Store(#[from] switchboard_store::StoreError),

    #[error("Invalid control message: {0:?}")]
    InvalidControlMessage(String),
}
