//! Cache entry storage.
//!
//! One entry per fingerprint, holding the last good value, fetch status,
//! subscriber count and the tags the value provides. Every write to an entry
//! happens under a single acquisition of the store lock, and the tag index is
//! updated inside that same critical section.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use metrics::{counter, gauge};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::debug;

use crate::transport::FetchError;

use super::keys::{Fingerprint, Tag};
use super::lock::{rw_read, rw_write};
use super::registry::TagIndex;

const SOURCE: &str = "cache::store";
const METRIC_CACHE_ENTRIES: &str = "lexquery_cache_entries";
const METRIC_CACHE_EVICT: &str = "lexquery_cache_evict_total";

/// Type-erased cached value. Typed access goes through
/// [`EntrySnapshot::value_as`].
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Monotonic fetch sequence number.
pub type Epoch = u64;

/// Re-issues the query that produced an entry, bypassing the cache.
pub(crate) type Refetch = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Idle => "idle",
            FetchStatus::Loading => "loading",
            FetchStatus::Succeeded => "succeeded",
            FetchStatus::Failed => "failed",
        }
    }
}

struct CacheEntry {
    value: Option<CachedValue>,
    status: FetchStatus,
    /// Last terminal status; `status` reads `Loading` while a refetch runs.
    settled: FetchStatus,
    updated_at: Option<OffsetDateTime>,
    fetched_at: Option<Instant>,
    tags: HashSet<Tag>,
    subscribers: usize,
    error: Option<FetchError>,
    stale: bool,
    applied_seq: Epoch,
    last_args: Option<Value>,
    generation: u64,
    refetch: Option<Refetch>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            value: None,
            status: FetchStatus::Idle,
            settled: FetchStatus::Idle,
            updated_at: None,
            fetched_at: None,
            tags: HashSet::new(),
            subscribers: 0,
            error: None,
            stale: false,
            applied_seq: 0,
            last_args: None,
            generation: 0,
            refetch: None,
        }
    }

    fn snapshot(&self, fingerprint: &Fingerprint) -> EntrySnapshot {
        EntrySnapshot {
            fingerprint: fingerprint.clone(),
            value: self.value.clone(),
            status: self.status,
            updated_at: self.updated_at,
            fetched_at: self.fetched_at,
            tags: self.tags.clone(),
            subscribers: self.subscribers,
            error: self.error.clone(),
            stale: self.stale,
            last_args: self.last_args.clone(),
            seq: self.applied_seq,
        }
    }
}

/// Point-in-time copy of a cache entry.
#[derive(Clone)]
pub struct EntrySnapshot {
    pub fingerprint: Fingerprint,
    pub value: Option<CachedValue>,
    pub status: FetchStatus,
    pub updated_at: Option<OffsetDateTime>,
    pub fetched_at: Option<Instant>,
    pub tags: HashSet<Tag>,
    pub subscribers: usize,
    pub error: Option<FetchError>,
    pub stale: bool,
    pub last_args: Option<Value>,
    /// Sequence number of the fetch whose result this state reflects.
    pub seq: Epoch,
}

impl EntrySnapshot {
    /// State of a fingerprint nothing has been stored for.
    pub(crate) fn idle(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            value: None,
            status: FetchStatus::Idle,
            updated_at: None,
            fetched_at: None,
            tags: HashSet::new(),
            subscribers: 0,
            error: None,
            stale: false,
            last_args: None,
            seq: 0,
        }
    }

    /// Typed view of the cached value; `None` when absent or of another type.
    pub fn value_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone()?.downcast::<T>().ok()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

impl fmt::Debug for EntrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntrySnapshot")
            .field("fingerprint", &self.fingerprint)
            .field("has_value", &self.value.is_some())
            .field("status", &self.status)
            .field("updated_at", &self.updated_at)
            .field("tags", &self.tags)
            .field("subscribers", &self.subscribers)
            .field("error", &self.error)
            .field("stale", &self.stale)
            .field("seq", &self.seq)
            .finish()
    }
}

/// What a fetch result resolves to once merged with the previous value.
pub(crate) struct Resolved {
    pub value: CachedValue,
    pub tags: HashSet<Tag>,
    /// The merged value equals the previously cached one.
    pub unchanged: bool,
}

/// Outcome of applying a sequenced fetch result.
pub(crate) enum Applied {
    Written {
        snapshot: EntrySnapshot,
        changed: bool,
    },
    /// A newer fetch was already applied, or the entry was evicted while a
    /// superseded fetch was out; nothing was written.
    Discarded,
}

/// In-memory cache table keyed by fingerprint.
///
/// Only the coordinators write to the store; outside the crate it is
/// read-only:
///
/// ```compile_fail
/// fn drop_entry(client: &lexquery::ApiClient, fingerprint: &lexquery::cache::Fingerprint) {
///     client.store().evict(fingerprint);
/// }
/// ```
pub struct CacheStore {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    tags: Arc<TagIndex>,
}

impl CacheStore {
    pub fn new(tags: Arc<TagIndex>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            tags,
        }
    }

    pub fn tag_index(&self) -> &TagIndex {
        &self.tags
    }

    /// Look up an entry. Absence is not an error.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<EntrySnapshot> {
        rw_read(&self.entries, SOURCE, "get")
            .get(fingerprint)
            .map(|entry| entry.snapshot(fingerprint))
    }

    /// Flag an entry so the next query or subscription refetches it.
    ///
    /// Returns false when the fingerprint is not cached.
    pub(crate) fn mark_stale(&self, fingerprint: &Fingerprint) -> bool {
        match rw_write(&self.entries, SOURCE, "mark_stale").get_mut(fingerprint) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    /// Remove an entry and its tag links.
    ///
    /// Only entries without subscribers can be evicted; returns whether the
    /// entry was removed.
    pub(crate) fn evict(&self, fingerprint: &Fingerprint) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "evict");
        match entries.get(fingerprint) {
            Some(entry) if entry.subscribers == 0 => {}
            _ => return false,
        }
        self.remove_locked(&mut entries, fingerprint);
        true
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All cached fingerprints, in sorted order.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        let mut keys: Vec<Fingerprint> = rw_read(&self.entries, SOURCE, "fingerprints")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn subscriber_count(&self, fingerprint: &Fingerprint) -> usize {
        rw_read(&self.entries, SOURCE, "subscriber_count")
            .get(fingerprint)
            .map_or(0, |entry| entry.subscribers)
    }

    // ========================================================================
    // Coordinator operations
    // ========================================================================

    /// Mark loading and remember how to re-issue this query.
    ///
    /// A pending eviction is cancelled; it is re-armed when the fetch lands.
    pub(crate) fn begin_fetch(&self, fingerprint: &Fingerprint, refetch: Refetch) {
        let mut entries = rw_write(&self.entries, SOURCE, "begin_fetch");
        let entry = upsert(&mut entries, fingerprint);
        entry.status = FetchStatus::Loading;
        entry.generation += 1;
        entry.refetch = Some(refetch);
    }

    /// Apply a successful fetch unless a newer one was already applied.
    ///
    /// `resolve` receives the previous value and returns the value to store
    /// (merged or replaced) together with its tags.
    ///
    /// `tracked` says whether `seq` is still the fetch callers wait on. An
    /// untracked result for an evicted entry is dropped rather than
    /// recreating the entry without its sequence watermark.
    pub(crate) fn apply_success<F>(
        &self,
        fingerprint: &Fingerprint,
        seq: Epoch,
        tracked: bool,
        args: Value,
        resolve: F,
    ) -> Applied
    where
        F: FnOnce(Option<&CachedValue>) -> Resolved,
    {
        let mut entries = rw_write(&self.entries, SOURCE, "apply_success");
        if !tracked && !entries.contains_key(fingerprint) {
            return Applied::Discarded;
        }
        let entry = upsert(&mut entries, fingerprint);
        if seq < entry.applied_seq {
            return Applied::Discarded;
        }

        let resolved = resolve(entry.value.as_ref());
        let changed =
            !resolved.unchanged || entry.settled != FetchStatus::Succeeded || entry.stale;
        entry.applied_seq = seq;
        entry.last_args = Some(args);
        self.write_success(fingerprint, entry, resolved.value, resolved.tags);

        Applied::Written {
            snapshot: entry.snapshot(fingerprint),
            changed,
        }
    }

    /// Apply a failed fetch unless a newer one was already applied.
    pub(crate) fn apply_failure(
        &self,
        fingerprint: &Fingerprint,
        seq: Epoch,
        tracked: bool,
        error: FetchError,
    ) -> Applied {
        let mut entries = rw_write(&self.entries, SOURCE, "apply_failure");
        if !tracked && !entries.contains_key(fingerprint) {
            return Applied::Discarded;
        }
        let entry = upsert(&mut entries, fingerprint);
        if seq < entry.applied_seq {
            return Applied::Discarded;
        }

        let changed = entry.settled != FetchStatus::Failed || entry.error.as_ref() != Some(&error);
        entry.applied_seq = seq;
        write_failure(entry, error);

        Applied::Written {
            snapshot: entry.snapshot(fingerprint),
            changed,
        }
    }

    /// Count a new subscriber, cancelling any pending eviction.
    pub(crate) fn retain(&self, fingerprint: &Fingerprint) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "retain");
        let entry = upsert(&mut entries, fingerprint);
        entry.subscribers += 1;
        entry.generation += 1;
        entry.subscribers
    }

    /// Drop a subscriber; returns how many remain.
    pub(crate) fn release(&self, fingerprint: &Fingerprint) -> usize {
        match rw_write(&self.entries, SOURCE, "release").get_mut(fingerprint) {
            Some(entry) => {
                entry.subscribers = entry.subscribers.saturating_sub(1);
                entry.subscribers
            }
            None => 0,
        }
    }

    /// Start a new eviction window for an unsubscribed entry.
    ///
    /// Returns the generation an eviction timer must observe to proceed, or
    /// `None` when the entry is absent or still subscribed.
    pub(crate) fn arm_eviction(&self, fingerprint: &Fingerprint) -> Option<u64> {
        let mut entries = rw_write(&self.entries, SOURCE, "arm_eviction");
        let entry = entries.get_mut(fingerprint)?;
        if entry.subscribers > 0 {
            return None;
        }
        entry.generation += 1;
        Some(entry.generation)
    }

    /// Evict if nothing subscribed or re-armed since `generation` was issued.
    pub(crate) fn evict_if_idle(&self, fingerprint: &Fingerprint, generation: u64) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "evict_if_idle");
        match entries.get(fingerprint) {
            Some(entry) if entry.subscribers == 0 && entry.generation == generation => {}
            _ => return false,
        }
        self.remove_locked(&mut entries, fingerprint);
        true
    }

    pub(crate) fn refetcher(&self, fingerprint: &Fingerprint) -> Option<Refetch> {
        rw_read(&self.entries, SOURCE, "refetcher")
            .get(fingerprint)
            .and_then(|entry| entry.refetch.clone())
    }

    /// The refetch of an entry flagged stale, if it has one.
    pub(crate) fn stale_refetcher(&self, fingerprint: &Fingerprint) -> Option<Refetch> {
        rw_read(&self.entries, SOURCE, "stale_refetcher")
            .get(fingerprint)
            .filter(|entry| entry.stale)
            .and_then(|entry| entry.refetch.clone())
    }

    fn write_success(
        &self,
        fingerprint: &Fingerprint,
        entry: &mut CacheEntry,
        value: CachedValue,
        tags: HashSet<Tag>,
    ) {
        self.tags.register(fingerprint, &tags);
        entry.value = Some(value);
        entry.tags = tags;
        entry.status = FetchStatus::Succeeded;
        entry.settled = FetchStatus::Succeeded;
        entry.error = None;
        entry.stale = false;
        entry.updated_at = Some(OffsetDateTime::now_utc());
        entry.fetched_at = Some(Instant::now());
    }

    fn remove_locked(
        &self,
        entries: &mut HashMap<Fingerprint, CacheEntry>,
        fingerprint: &Fingerprint,
    ) {
        entries.remove(fingerprint);
        self.tags.unregister(fingerprint);
        counter!(METRIC_CACHE_EVICT).increment(1);
        gauge!(METRIC_CACHE_ENTRIES).set(entries.len() as f64);
        debug!(fingerprint = %fingerprint, "Cache entry evicted");
    }
}

/// Unsequenced writes used to set up store and planner tests.
#[cfg(test)]
impl CacheStore {
    /// Store a successful value and replace the entry's tag links.
    pub(crate) fn put(
        &self,
        fingerprint: &Fingerprint,
        value: CachedValue,
        tags: HashSet<Tag>,
    ) -> EntrySnapshot {
        let mut entries = rw_write(&self.entries, SOURCE, "put");
        let entry = upsert(&mut entries, fingerprint);
        self.write_success(fingerprint, entry, value, tags);
        entry.snapshot(fingerprint)
    }

    /// Flag a fetch as outstanding. The current value stays visible.
    pub(crate) fn mark_loading(&self, fingerprint: &Fingerprint) -> EntrySnapshot {
        let mut entries = rw_write(&self.entries, SOURCE, "mark_loading");
        let entry = upsert(&mut entries, fingerprint);
        entry.status = FetchStatus::Loading;
        entry.snapshot(fingerprint)
    }

    /// Record a failed fetch, keeping the last good value.
    pub(crate) fn mark_failed(&self, fingerprint: &Fingerprint, error: FetchError) -> EntrySnapshot {
        let mut entries = rw_write(&self.entries, SOURCE, "mark_failed");
        let entry = upsert(&mut entries, fingerprint);
        write_failure(entry, error);
        entry.snapshot(fingerprint)
    }
}

fn upsert<'a>(
    entries: &'a mut HashMap<Fingerprint, CacheEntry>,
    fingerprint: &Fingerprint,
) -> &'a mut CacheEntry {
    if !entries.contains_key(fingerprint) {
        gauge!(METRIC_CACHE_ENTRIES).set((entries.len() + 1) as f64);
    }
    entries
        .entry(fingerprint.clone())
        .or_insert_with(CacheEntry::new)
}

fn write_failure(entry: &mut CacheEntry, error: FetchError) {
    entry.status = FetchStatus::Failed;
    entry.settled = FetchStatus::Failed;
    entry.error = Some(error);
}
