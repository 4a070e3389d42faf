//! Presence registry
//!
//! Edge nodes keep a `tunnel:online:<identifier>` key alive while a tunnel is
//! connected and let it expire when heartbeats stop. The control plane only
//! reads these markers; it never writes or deletes them.

use std::sync::Arc;
use switchboard_store::CoordinationStore;
use tracing::{debug, trace};

use crate::ControlError;

/// Key prefix of presence markers
pub const PRESENCE_PREFIX: &str = "tunnel:online:";

/// Keys walked per `SCAN` round trip
pub const DEFAULT_SCAN_BATCH: usize = 1000;

/// Presence marker key for an identifier
pub fn presence_key(identifier: &str) -> String {
    format!("{}{}", PRESENCE_PREFIX, identifier)
}

/// Read-only view over the fleet's presence markers
#[derive(Clone)]
pub struct PresenceRegistry {
    store: Arc<dyn CoordinationStore>,
    scan_batch: usize,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            scan_batch: DEFAULT_SCAN_BATCH,
        }
    }

    /// Override the per-round-trip scan batch
    pub fn with_scan_batch(mut self, scan_batch: usize) -> Self {
        self.scan_batch = scan_batch.max(1);
        self
    }

    /// Whether a tunnel with this identifier is connected anywhere in the fleet
    pub async fn is_online(&self, identifier: &str) -> Result<bool, ControlError> {
        let online = self.store.exists(&presence_key(identifier)).await?;
        trace!(identifier = %identifier, online, "Checked presence marker");
        Ok(online)
    }

    /// Count presence markers with a cursor-based scan
    ///
    /// The result is a point-in-time approximation: markers created or expiring
    /// while the scan runs may or may not be counted. Store errors abort the
    /// count and are returned to the caller without retry.
    pub async fn count_online(&self) -> Result<u64, ControlError> {
        let pattern = format!("{}*", PRESENCE_PREFIX);
        let mut cursor = 0;
        let mut total: u64 = 0;
        let mut rounds = 0;

        loop {
            let page = self.store.scan(cursor, &pattern, self.scan_batch).await?;
            total += page.keys.len() as u64;
            rounds += 1;

            if page.is_done() {
                break;
            }
            cursor = page.cursor;
        }

        debug!(total, rounds, "Counted presence markers");
        Ok(total)
    }
}
