use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use switchboard_control::{resolve, ResolvedIdentifier, TunnelProtocol};
use switchboard_db::entities::tunnel;
use tracing::{debug, error, info, warn};

use crate::models::*;
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Load a tunnel record or answer 404
async fn load_tunnel(state: &AppState, id: &str) -> Result<tunnel::Model, ApiError> {
    switchboard_db::find_tunnel(&state.db, id)
        .await
        .map_err(|e| {
            error!("Failed to load tunnel {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    format!("Database error: {}", e),
                    "DATABASE_ERROR",
                )),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Tunnel not found", "NOT_FOUND")),
            )
        })
}

/// Fleet identifier of a tunnel record
fn identifier_for(record: &tunnel::Model) -> ResolvedIdentifier {
    let identifier = resolve(&record.url, TunnelProtocol::from_tag(&record.protocol));
    if identifier.is_fallback() {
        warn!(
            tunnel_id = %record.id,
            url = %record.url,
            "Stored URL did not parse, using it verbatim as identifier"
        );
    }
    identifier
}

fn store_unavailable(e: impl std::fmt::Display) -> ApiError {
    error!("Coordination store error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(
            format!("Coordination store error: {}", e),
            "STORE_UNAVAILABLE",
        )),
    )
}

/// Get a tunnel's record and live status
#[utoipa::path(
    get,
    path = "/api/tunnels/{id}",
    params(
        ("id" = String, Path, description = "Tunnel ID")
    ),
    responses(
        (status = 200, description = "Tunnel status", body = TunnelStatusResponse),
        (status = 404, description = "Tunnel not found", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitedResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "tunnels"
)]
pub async fn get_tunnel_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TunnelStatusResponse>, ApiError> {
    debug!("Getting tunnel status: {}", id);

    let record = load_tunnel(&state, &id).await?;
    let identifier = identifier_for(&record);

    let is_online = state
        .registry
        .is_online(identifier.as_str())
        .await
        .map_err(store_unavailable)?;

    Ok(Json(TunnelStatusResponse {
        tunnel: TunnelDetails {
            id: record.id,
            url: record.url,
            user_id: record.user_id,
            name: record.name,
            is_online,
            // Record timestamps are naive UTC
            last_seen_at: record.last_seen_at.map(|ts| ts.and_utc()),
            created_at: record.created_at.and_utc(),
            updated_at: record.updated_at.and_utc(),
        },
    }))
}

/// Stop a tunnel
///
/// Broadcasts a kill instruction to every edge node. The node holding the
/// session tears it down; the others ignore it.
#[utoipa::path(
    post,
    path = "/api/tunnels/{id}/stop",
    params(
        ("id" = String, Path, description = "Tunnel ID")
    ),
    responses(
        (status = 200, description = "Kill instruction dispatched", body = StopTunnelResponse),
        (status = 404, description = "Tunnel not found", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitedResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "tunnels"
)]
pub async fn stop_tunnel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StopTunnelResponse>, ApiError> {
    let record = load_tunnel(&state, &id).await?;
    let identifier = identifier_for(&record);

    state
        .channel
        .broadcast_kill(identifier.as_str())
        .await
        .map_err(store_unavailable)?;

    info!(tunnel_id = %id, identifier = %identifier, "Stop requested");

    Ok(Json(StopTunnelResponse {
        message: "Tunnel stopped".to_string(),
    }))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitedResponse),
        (status = 500, description = "Coordination store unreachable", body = ErrorResponse)
    ),
    tag = "system"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let active_tunnels = state
        .registry
        .count_online()
        .await
        .map_err(store_unavailable)?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_tunnels,
    }))
}
