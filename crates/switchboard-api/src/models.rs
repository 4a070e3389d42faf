use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tunnel record joined with live presence
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TunnelDetails {
    /// Tunnel ID
    pub id: String,
    /// Public URL as stored at registration
    pub url: String,
    /// Owning user
    pub user_id: String,
    /// Display name
    pub name: Option<String>,
    /// Whether an edge node currently holds the tunnel's session
    pub is_online: bool,
    /// Last time an edge node reported the tunnel
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tunnel status response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TunnelStatusResponse {
    pub tunnel: TunnelDetails,
}

/// Stop tunnel response
///
/// Success means the kill instruction was dispatched, not that the session is
/// gone. Poll the status endpoint to observe the effect.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StopTunnelResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Tunnels with a live presence marker
    pub active_tunnels: u64,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: Some(code.to_string()),
        }
    }
}

/// Body of a 429 response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitedResponse {
    /// Always "Too many requests"
    pub error: String,
    /// Seconds until the caller should retry
    pub retry_after: u64,
}
