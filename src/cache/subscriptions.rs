//! Listener registry and subscription handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use dashmap::DashMap;
use tracing::debug;

use super::CacheContext;
use super::keys::Fingerprint;
use super::lock::{mutex_lock, rw_read, rw_write};
use super::store::{EntrySnapshot, Epoch};

const SOURCE: &str = "cache::subscriptions";

/// Callback invoked with the entry state after it changes.
pub type Listener = Arc<dyn Fn(&EntrySnapshot) + Send + Sync>;

#[derive(Clone)]
struct ListenerSlot {
    id: u64,
    active: Arc<AtomicBool>,
    listener: Listener,
}

/// Listeners per fingerprint.
///
/// Notification copies the listener list out of the lock before invoking
/// anything, so a listener may subscribe or unsubscribe from inside its
/// callback.
pub struct SubscriptionRegistry {
    listeners: RwLock<HashMap<Fingerprint, Vec<ListenerSlot>>>,
    /// Sequence number last delivered per fingerprint. Held while listeners
    /// run so deliveries for one fingerprint never interleave.
    delivered: DashMap<Fingerprint, Arc<Mutex<Epoch>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            delivered: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn add(&self, fingerprint: &Fingerprint, listener: Listener) -> (u64, Arc<AtomicBool>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        rw_write(&self.listeners, SOURCE, "add")
            .entry(fingerprint.clone())
            .or_default()
            .push(ListenerSlot {
                id,
                active: Arc::clone(&active),
                listener,
            });
        (id, active)
    }

    pub(crate) fn remove(&self, fingerprint: &Fingerprint, id: u64) -> bool {
        let mut listeners = rw_write(&self.listeners, SOURCE, "remove");
        let Some(slots) = listeners.get_mut(fingerprint) else {
            return false;
        };
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        let removed = slots.len() != before;
        if slots.is_empty() {
            listeners.remove(fingerprint);
        }
        removed
    }

    /// Invoke every active listener of the snapshot's fingerprint.
    pub fn notify(&self, snapshot: &EntrySnapshot) -> usize {
        let slots: Vec<ListenerSlot> = rw_read(&self.listeners, SOURCE, "notify")
            .get(&snapshot.fingerprint)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for slot in slots {
            if slot.active.load(Ordering::Acquire) {
                (slot.listener)(snapshot);
                delivered += 1;
            }
        }
        if delivered > 0 {
            debug!(
                fingerprint = %snapshot.fingerprint,
                status = snapshot.status.as_str(),
                delivered,
                "Listeners notified"
            );
        }
        delivered
    }

    /// Notify with the state a fetch left behind, unless listeners already
    /// saw the state of a later fetch.
    pub(crate) fn publish(&self, snapshot: &EntrySnapshot) -> usize {
        let gate = Arc::clone(
            self.delivered
                .entry(snapshot.fingerprint.clone())
                .or_default()
                .value(),
        );
        let mut last = mutex_lock(&gate, SOURCE, "publish");
        if snapshot.seq < *last {
            debug!(
                fingerprint = %snapshot.fingerprint,
                seq = snapshot.seq,
                delivered_seq = *last,
                "Skipped notification older than the last delivered"
            );
            return 0;
        }
        *last = snapshot.seq;
        self.notify(snapshot)
    }

    /// Drop delivery ordering state for an evicted entry.
    pub(crate) fn forget(&self, fingerprint: &Fingerprint) {
        self.delivered.remove(fingerprint);
    }

    pub fn listener_count(&self) -> usize {
        rw_read(&self.listeners, SOURCE, "listener_count")
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn listeners_for(&self, fingerprint: &Fingerprint) -> usize {
        rw_read(&self.listeners, SOURCE, "listeners_for")
            .get(fingerprint)
            .map_or(0, Vec::len)
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a cache entry alive and its listener registered.
///
/// Dropping the handle unsubscribes. When the last subscriber of an entry
/// leaves, the entry is evicted after the configured grace period unless a
/// new subscriber arrives first.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    ctx: Weak<CacheContext>,
    fingerprint: Fingerprint,
    id: u64,
    active: Arc<AtomicBool>,
    released: bool,
}

impl Subscription {
    pub(crate) fn open(ctx: &Arc<CacheContext>, fingerprint: Fingerprint, listener: Listener) -> Self {
        let (id, active) = ctx.subscriptions.add(&fingerprint, listener);
        let subscribers = ctx.store.retain(&fingerprint);
        debug!(fingerprint = %fingerprint, subscribers, "Subscribed");
        Self {
            ctx: Arc::downgrade(ctx),
            fingerprint,
            id,
            active,
            released: false,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn is_active(&self) -> bool {
        !self.released
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // Blocks any notification already copied out of the registry.
        self.active.store(false, Ordering::Release);

        let Some(ctx) = self.ctx.upgrade() else {
            return;
        };
        ctx.subscriptions.remove(&self.fingerprint, self.id);
        let remaining = ctx.store.release(&self.fingerprint);
        debug!(fingerprint = %self.fingerprint, remaining, "Unsubscribed");
        if remaining == 0 {
            ctx.schedule_eviction(&self.fingerprint);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("fingerprint", &self.fingerprint)
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}
