//! Board snapshot cache.
//!
//! One [`SnapshotCache`] holds the last fetched [`BoardSnapshot`] and decides
//! whether a read can reuse it. At most one fetch runs at a time; concurrent
//! readers wait on the in-flight fetch instead of starting their own.
//!
//! | Call                    | Behaviour                                                   |
//! |-------------------------|-------------------------------------------------------------|
//! | `get_snapshot(false)`   | reuse a valid entry, otherwise join/start a fetch           |
//! | `get_snapshot(true)`    | always fetch, unless a fetch completed while waiting        |
//! | `invalidate()`          | drop the entry; the next read fetches                      |
//! | `try_refresh()`         | fetch now unless a fetch is in flight (background poller)   |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};
use tracing::{debug, info, warn};

use super::client::BoardApi;
use super::types::{BoardKind, BoardSnapshot, SubBoard};
use crate::errors::{BoardApiError, ErrorKind};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

// ── Seams ────────────────────────────────────────────────────────────

/// Produces a full snapshot across all configured boards.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<BoardSnapshot, BoardApiError>;
}

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Board ids to fetch. Design/UX and development are optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardIds {
    pub account_management: String,
    pub design_ux: Option<String>,
    pub development: Option<String>,
}

/// The production source: three concurrent board fetches through `BoardApi`.
pub struct BoardFetcher {
    api: Arc<dyn BoardApi>,
    boards: BoardIds,
}

impl BoardFetcher {
    pub fn new(api: Arc<dyn BoardApi>, boards: BoardIds) -> Self {
        Self { api, boards }
    }

    async fn fetch_optional(
        &self,
        kind: BoardKind,
        board_id: Option<&str>,
    ) -> Result<Option<SubBoard>, BoardApiError> {
        match board_id {
            Some(id) => {
                let data = self.api.fetch_board(id).await?;
                Ok(Some(SubBoard::from_data(kind, id, data)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SnapshotSource for BoardFetcher {
    async fn fetch(&self) -> Result<BoardSnapshot, BoardApiError> {
        if self.boards.account_management.is_empty() {
            return Err(BoardApiError::NotFound(
                "no account management board configured".into(),
            ));
        }
        let account = async {
            let id = self.boards.account_management.as_str();
            let data = self.api.fetch_board(id).await?;
            Ok::<_, BoardApiError>(SubBoard::from_data(BoardKind::AccountManagement, id, data))
        };
        let (account_management, design_ux, development) = tokio::try_join!(
            account,
            self.fetch_optional(BoardKind::DesignUx, self.boards.design_ux.as_deref()),
            self.fetch_optional(BoardKind::Development, self.boards.development.as_deref()),
        )?;
        Ok(BoardSnapshot {
            account_management,
            design_ux,
            development,
        })
    }
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Refreshed {
        fetched_at_millis: i64,
        card_count: usize,
    },
    Invalidated,
    RefreshFailed {
        kind: ErrorKind,
        message: String,
    },
}

// ── Cache ────────────────────────────────────────────────────────────

#[derive(Default)]
struct CacheEntry {
    snapshot: Option<Arc<BoardSnapshot>>,
    fetched_at_millis: Option<i64>,
    /// Invalidation generation the entry was fetched under.
    generation: u64,
    /// Completion number of the fetch that produced the entry.
    completion: u64,
    last_failure: Option<(u64, BoardApiError)>,
}

struct CacheInner {
    source: Arc<dyn SnapshotSource>,
    clock: Arc<dyn Clock>,
    ttl_millis: i64,
    entry: RwLock<CacheEntry>,
    generation: AtomicU64,
    completions: AtomicU64,
    gate: Arc<Mutex<()>>,
    events: broadcast::Sender<CacheEvent>,
}

impl CacheInner {
    fn read_entry(&self) -> RwLockReadGuard<'_, CacheEntry> {
        self.entry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entry(&self) -> RwLockWriteGuard<'_, CacheEntry> {
        self.entry.write().unwrap_or_else(|e| e.into_inner())
    }

    fn valid_snapshot(&self, entry: &CacheEntry) -> Option<Arc<BoardSnapshot>> {
        let snapshot = entry.snapshot.as_ref()?;
        let fetched_at = entry.fetched_at_millis?;
        let fresh = self.clock.now_millis() - fetched_at < self.ttl_millis;
        let current = entry.generation == self.generation.load(Ordering::SeqCst);
        (fresh && current).then(|| snapshot.clone())
    }
}

#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<CacheInner>,
}

impl SnapshotCache {
    pub fn new(source: Arc<dyn SnapshotSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(CacheInner {
                source,
                clock,
                ttl_millis: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
                entry: RwLock::new(CacheEntry::default()),
                generation: AtomicU64::new(0),
                completions: AtomicU64::new(0),
                gate: Arc::new(Mutex::new(())),
                events,
            }),
        }
    }

    pub fn with_system_clock(source: Arc<dyn SnapshotSource>, ttl: Duration) -> Self {
        Self::new(source, Arc::new(SystemClock), ttl)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Return a snapshot, fetching only when needed.
    pub async fn get_snapshot(&self, force: bool) -> Result<Arc<BoardSnapshot>, BoardApiError> {
        if !force && let Some(snapshot) = self.fresh() {
            debug!("board snapshot cache hit");
            return Ok(snapshot);
        }

        let seen = self.inner.completions.load(Ordering::SeqCst);
        let guard = self.inner.gate.clone().lock_owned().await;

        {
            let entry = self.inner.read_entry();
            if let Some(snapshot) = self.inner.valid_snapshot(&entry)
                && (!force || entry.completion > seen)
            {
                debug!("board snapshot filled while waiting");
                return Ok(snapshot);
            }
            if let Some((seq, err)) = &entry.last_failure
                && *seq > seen
            {
                return Err(err.clone());
            }
        }

        self.fetch_with(guard).await
    }

    /// Fetch unless a fetch is already running. Returns `None` when skipped.
    pub async fn try_refresh(&self) -> Option<Result<Arc<BoardSnapshot>, BoardApiError>> {
        match self.inner.gate.clone().try_lock_owned() {
            Ok(guard) => Some(self.fetch_with(guard).await),
            Err(_) => {
                debug!("snapshot fetch in flight, skipping refresh");
                None
            }
        }
    }

    /// Drop the cached entry. A fetch running now will not repopulate it.
    pub fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut entry = self.inner.write_entry();
            entry.snapshot = None;
            entry.fetched_at_millis = None;
        }
        debug!("board snapshot cache invalidated");
        let _ = self.inner.events.send(CacheEvent::Invalidated);
    }

    /// Replace the entry with a snapshot obtained elsewhere.
    pub fn set(&self, snapshot: BoardSnapshot) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let now = self.inner.clock.now_millis();
        let mut entry = self.inner.write_entry();
        entry.snapshot = Some(Arc::new(snapshot));
        entry.fetched_at_millis = Some(now);
        entry.generation = generation;
    }

    /// The current entry regardless of freshness.
    pub fn peek(&self) -> Option<Arc<BoardSnapshot>> {
        self.inner.read_entry().snapshot.clone()
    }

    pub fn fetched_at_millis(&self) -> Option<i64> {
        self.inner.read_entry().fetched_at_millis
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh().is_some()
    }

    fn fresh(&self) -> Option<Arc<BoardSnapshot>> {
        let entry = self.inner.read_entry();
        self.inner.valid_snapshot(&entry)
    }

    /// Run the fetch on its own task so a dropped caller cannot cancel it.
    /// The gate guard moves into the task and is released when it finishes.
    async fn fetch_with(
        &self,
        guard: OwnedMutexGuard<()>,
    ) -> Result<Arc<BoardSnapshot>, BoardApiError> {
        let inner = self.inner.clone();
        let generation = inner.generation.load(Ordering::SeqCst);
        let task = tokio::spawn(async move {
            let _guard = guard;
            info!("fetching board snapshot");
            let result = inner.source.fetch().await;
            let seq = inner.completions.fetch_add(1, Ordering::SeqCst) + 1;

            match result {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    let fetched_at = inner.clock.now_millis();
                    {
                        let mut entry = inner.write_entry();
                        entry.snapshot = Some(snapshot.clone());
                        entry.fetched_at_millis = Some(fetched_at);
                        entry.generation = generation;
                        entry.completion = seq;
                        entry.last_failure = None;
                    }
                    info!(seq, cards = snapshot.card_count(), "board snapshot cached");
                    let _ = inner.events.send(CacheEvent::Refreshed {
                        fetched_at_millis: fetched_at,
                        card_count: snapshot.card_count(),
                    });
                    Ok(snapshot)
                }
                Err(err) => {
                    warn!(seq, error = %err, "board snapshot fetch failed");
                    inner.write_entry().last_failure = Some((seq, err.clone()));
                    let _ = inner.events.send(CacheEvent::RefreshFailed {
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                    Err(err)
                }
            }
        });

        task.await
            .map_err(|e| BoardApiError::Network(format!("snapshot fetch task failed: {}", e)))?
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicI64, AtomicUsize};

    use super::*;

    pub struct ManualClock(AtomicI64);

    impl ManualClock {
        pub fn new(start: i64) -> Self {
            Self(AtomicI64::new(start))
        }

        pub fn set(&self, millis: i64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Returns a fixed snapshot after an optional delay, counting calls.
    pub struct StaticSource {
        pub snapshot: BoardSnapshot,
        pub delay: Option<Duration>,
        pub fetches: AtomicUsize,
        pub fail_with: std::sync::Mutex<Option<BoardApiError>>,
    }

    impl StaticSource {
        pub fn new(snapshot: BoardSnapshot) -> Self {
            Self {
                snapshot,
                delay: None,
                fetches: AtomicUsize::new(0),
                fail_with: std::sync::Mutex::new(None),
            }
        }

        pub fn count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotSource for StaticSource {
        async fn fetch(&self) -> Result<BoardSnapshot, BoardApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.fail_with.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(self.snapshot.clone())
        }
    }
}
