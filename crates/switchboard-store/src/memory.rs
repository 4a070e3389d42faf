//! In-memory coordination store
//!
//! Mirrors the subset of Redis semantics the control plane relies on: key TTLs,
//! cursor-based `SCAN` with glob patterns, sorted-set sliding windows and
//! fan-out pub/sub. Expiry follows the tokio clock, so tests can drive it with
//! paused time.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::warn;

use crate::{CoordinationStore, ScanPage, StoreError, WindowInsert, WindowState};

const CHANNEL_CAPACITY: usize = 256;

/// Default `SCAN` count when the caller passes zero (same as Redis)
const DEFAULT_SCAN_COUNT: usize = 10;

#[derive(Debug)]
enum Value {
    /// Existence-only key
    Marker,
    /// Sorted set of (score, member)
    Window(BTreeSet<(i64, String)>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local coordination store
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    operations: AtomicU64,
    scan_rounds: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            channels: Mutex::new(HashMap::new()),
            operations: AtomicU64::new(0),
            scan_rounds: AtomicU64::new(0),
        }
    }

    /// Create or refresh an existence-only key, the way an edge node writes
    /// its presence marker
    pub fn set_with_ttl(&self, key: impl Into<String>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries().insert(
            key.into(),
            Entry {
                value: Value::Marker,
                expires_at,
            },
        );
    }

    /// Delete a key, returning whether it existed
    pub fn remove(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries()
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remaining time to live of a key, `None` if it is missing or persistent
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries();
        let entry = entries.get(key).filter(|e| !e.is_expired(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Cardinality of a sliding-window key
    pub fn window_len(&self, key: &str) -> Option<usize> {
        let now = Instant::now();
        let entries = self.entries();
        match entries.get(key).filter(|e| !e.is_expired(now)) {
            Some(Entry {
                value: Value::Window(set),
                ..
            }) => Some(set.len()),
            _ => None,
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total trait operations served so far
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Number of `SCAN` round trips served so far
    pub fn scan_rounds(&self) -> u64 {
        self.scan_rounds.load(Ordering::SeqCst)
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<String>>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.record_operation();
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<ScanPage, StoreError> {
        self.record_operation();
        self.scan_rounds.fetch_add(1, Ordering::SeqCst);

        let count = if count == 0 { DEFAULT_SCAN_COUNT } else { count };
        let now = Instant::now();
        let mut entries = self.entries();

        // Expired keys are evicted when an iteration starts, so later pages
        // never walk dead entries and the map does not grow without bound
        if cursor == 0 {
            entries.retain(|_, entry| !entry.is_expired(now));
        }

        // The cursor is a position in key order. Keys inserted or removed
        // mid-scan may be missed or seen twice, as with Redis.
        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let keys = entries
            .iter()
            .skip(start)
            .take(count)
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();

        let next = start.saturating_add(count);
        let cursor = if next >= entries.len() { 0 } else { next as u64 };

        Ok(ScanPage { cursor, keys })
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, StoreError> {
        self.record_operation();
        let receivers = match self.channels().get(channel) {
            Some(sender) => sender.send(payload.to_string()).unwrap_or(0),
            None => 0,
        };
        Ok(receivers as u64)
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, StoreError> {
        self.record_operation();
        let receiver = self
            .channels()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => return Some((payload, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber lagged, {} messages dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed();

        Ok(stream)
    }

    async fn window_insert(&self, insert: &WindowInsert) -> Result<WindowState, StoreError> {
        self.record_operation();
        let now = Instant::now();

        // One lock for the whole batch gives the same all-or-nothing
        // visibility as MULTI/EXEC.
        let mut entries = self.entries();
        if entries.get(&insert.key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(&insert.key);
        }

        let entry = entries.entry(insert.key.clone()).or_insert_with(|| Entry {
            value: Value::Window(BTreeSet::new()),
            expires_at: None,
        });

        let Value::Window(set) = &mut entry.value else {
            return Err(StoreError::WrongType(insert.key.clone()));
        };

        set.retain(|(score, _)| *score >= insert.evict_before);
        let count = set.len() as u64;
        set.insert((insert.score, insert.member.clone()));
        entry.expires_at = Some(now + Duration::from_secs(insert.ttl_seconds));

        Ok(WindowState {
            count,
            oldest_score: set.first().map(|(score, _)| *score),
        })
    }
}

/// Redis-style glob matching supporting `*` and `?`
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}
