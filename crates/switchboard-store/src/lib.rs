//! Coordination store shared by the control plane and the edge fleet
//!
//! Every control-plane component talks to one key-value store with a
//! publish/subscribe channel. This crate defines the narrow set of operations
//! the components need and provides two backends:
//! - **Redis** (`RedisStore`) for production deployments
//! - **In-memory** (`MemoryStore`) for development and tests
//!
//! The trait has no blocking "list every key" operation. Key
//! enumeration is only possible through the cursor-based [`CoordinationStore::scan`].

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Errors raised by a coordination store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Key {0} holds a value of the wrong type")]
    WrongType(String),
}

/// One page of a cursor-based key scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next call; `0` means the scan is complete
    pub cursor: u64,
    /// Keys returned by this round trip (may be empty even when not done)
    pub keys: Vec<String>,
}

impl ScanPage {
    /// Whether the server signalled the end of the iteration
    pub fn is_done(&self) -> bool {
        self.cursor == 0
    }
}

/// A sliding-window insert executed as one atomic batch
///
/// Evicts members scored strictly below `evict_before`, reads the remaining
/// cardinality, inserts `member` at `score`, refreshes the key's TTL and reads
/// the oldest remaining score.
#[derive(Debug, Clone)]
pub struct WindowInsert {
    pub key: String,
    pub evict_before: i64,
    pub score: i64,
    pub member: String,
    pub ttl_seconds: u64,
}

/// Window state observed by a [`WindowInsert`] batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Members left after eviction, before the new member was added
    pub count: u64,
    /// Lowest score left in the window, including the new member
    pub oldest_score: Option<i64>,
}

/// Operations the control plane performs against the shared store
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Whether `key` currently exists
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Non-blocking, cursor-based enumeration of keys matching a glob pattern
    ///
    /// `count` is a hint for how much of the keyspace to walk per call.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
        -> Result<ScanPage, StoreError>;

    /// Publish `payload` on `channel`, returning how many subscribers received it
    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, StoreError>;

    /// Subscribe to `channel` and stream its payloads
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, StoreError>;

    /// Run the sliding-window batch atomically
    async fn window_insert(&self, insert: &WindowInsert) -> Result<WindowState, StoreError>;
}
