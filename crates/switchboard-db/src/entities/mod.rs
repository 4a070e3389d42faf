//! Database entities

pub mod active_tunnel_snapshot;
pub mod tunnel;

pub use active_tunnel_snapshot::Entity as ActiveTunnelSnapshot;
pub use tunnel::Entity as Tunnel;

pub mod prelude {
    pub use super::active_tunnel_snapshot::Entity as ActiveTunnelSnapshot;
    pub use super::tunnel::Entity as Tunnel;
}
