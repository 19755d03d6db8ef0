//! Request cache for the site's API slices.
//!
//! - **Store**: one entry per query fingerprint, value kept across failures
//! - **Tag index**: which entries provide which tags
//! - **Coordinators**: queries coalesce and are sequence-gated; mutations
//!   invalidate by tag
//! - **Subscriptions**: listeners drive notifications and entry lifetime
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! grace_period_ms = 60000
//! # refresh_after_ms = 30000
//! ```

mod config;
mod inflight;
mod keys;
mod lock;
mod merge;
mod mutation;
mod planner;
mod query;
mod registry;
mod store;
mod subscriptions;

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use crate::transport::Transport;

pub use config::CacheConfig;
pub use keys::{Fingerprint, FingerprintError, Tag, args_value, canonical_json};
pub use merge::{AppendUnique, MergePolicy, Paginated, Replace};
pub use planner::InvalidationPlan;
pub use registry::TagIndex;
pub use store::{CacheStore, CachedValue, EntrySnapshot, Epoch, FetchStatus};
pub use subscriptions::{Listener, Subscription, SubscriptionRegistry};

pub(crate) use inflight::InFlightTable;
pub(crate) use mutation::MutationCoordinator;
pub(crate) use query::QueryCoordinator;

/// Shared state behind one client instance.
pub(crate) struct CacheContext {
    pub store: CacheStore,
    pub subscriptions: SubscriptionRegistry,
    pub inflight: InFlightTable,
    pub transport: Arc<dyn Transport>,
    pub config: CacheConfig,
}

impl CacheContext {
    pub fn new(transport: Arc<dyn Transport>, config: CacheConfig) -> Arc<Self> {
        Arc::new(Self {
            store: CacheStore::new(Arc::new(TagIndex::new())),
            subscriptions: SubscriptionRegistry::new(),
            inflight: InFlightTable::new(),
            transport,
            config,
        })
    }

    /// Evict an unsubscribed entry once the grace period passes, unless it
    /// is subscribed or refetched in the meantime.
    pub fn schedule_eviction(self: &Arc<Self>, fingerprint: &Fingerprint) {
        let Some(generation) = self.store.arm_eviction(fingerprint) else {
            return;
        };

        let Ok(handle) = Handle::try_current() else {
            // Outside a runtime there is nothing to run a timer on.
            if self.store.evict(fingerprint) {
                self.subscriptions.forget(fingerprint);
            }
            return;
        };

        let ctx = Arc::downgrade(self);
        let fingerprint = fingerprint.clone();
        let grace = self.config.grace_period;
        debug!(fingerprint = %fingerprint, grace_ms = grace.as_millis() as u64, "Eviction scheduled");
        handle.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(ctx) = ctx.upgrade()
                && ctx.store.evict_if_idle(&fingerprint, generation)
            {
                ctx.subscriptions.forget(&fingerprint);
            }
        });
    }

    /// Re-issue the query behind an entry a mutation flagged stale.
    ///
    /// Runs on its own task; the new subscriber hears the result through its
    /// listener.
    pub fn refetch_if_stale(&self, fingerprint: &Fingerprint) {
        let Some(refetch) = self.store.stale_refetcher(fingerprint) else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            debug!(fingerprint = %fingerprint, "No runtime to refetch stale entry; next query will");
            return;
        };
        debug!(fingerprint = %fingerprint, "Refetching stale entry for new subscriber");
        handle.spawn(refetch());
    }
}
