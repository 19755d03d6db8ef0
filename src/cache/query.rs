//! Query coordination.
//!
//! Serves a query from the cache, joins a fetch already in flight for the
//! same arguments, or starts a sequenced fetch. Fetches run on their own task
//! so a caller that goes away never strands the callers that joined it.

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, instrument, warn};

use crate::api::QueryEndpoint;

use super::CacheContext;
use super::inflight::Admission;
use super::keys::{Fingerprint, FingerprintError, args_value};
use super::store::{Applied, EntrySnapshot, Epoch, FetchStatus, Refetch, Resolved};

const METRIC_CACHE_HIT: &str = "lexquery_cache_hit_total";
const METRIC_CACHE_MISS: &str = "lexquery_cache_miss_total";
const METRIC_INFLIGHT_JOIN: &str = "lexquery_inflight_join_total";
const METRIC_FETCH_DISCARDED: &str = "lexquery_fetch_discarded_total";
const METRIC_FETCH_MS: &str = "lexquery_fetch_ms";

#[derive(Clone)]
pub(crate) struct QueryCoordinator {
    ctx: Arc<CacheContext>,
}

impl QueryCoordinator {
    pub fn new(ctx: Arc<CacheContext>) -> Self {
        Self { ctx }
    }

    /// Resolve a query to the entry state it settles on.
    ///
    /// With `force` the cache and any in-flight fetch are bypassed; callers
    /// already waiting on the superseded fetch receive this one's outcome.
    #[instrument(skip_all, fields(endpoint = E::NAME, force = force))]
    pub async fn query<E: QueryEndpoint>(
        &self,
        endpoint: &E,
        args: E::Args,
        force: bool,
    ) -> Result<EntrySnapshot, FingerprintError> {
        let (fingerprint, full_args) = match identify(endpoint, &args) {
            Ok(keys) => keys,
            Err(err) => {
                error!(endpoint = E::NAME, error = %err, "Query arguments cannot be fingerprinted");
                return Err(err);
            }
        };

        let store = &self.ctx.store;
        let admission = self.ctx.inflight.admit(&fingerprint, &full_args, force, || {
            store
                .get(&fingerprint)
                .filter(|snapshot| servable(snapshot, &full_args))
        });

        match admission {
            Admission::Cached(snapshot) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                debug!(fingerprint = %fingerprint, "Cache hit");
                if let Some(fetched_at) = snapshot.fetched_at
                    && self.ctx.config.needs_refresh(fetched_at.elapsed())
                {
                    self.refresh(endpoint, args, full_args, fingerprint);
                }
                Ok(snapshot)
            }
            Admission::Joined(receiver) => {
                counter!(METRIC_INFLIGHT_JOIN).increment(1);
                debug!(fingerprint = %fingerprint, "Joined in-flight request");
                Ok(self.wait(&fingerprint, receiver).await)
            }
            Admission::Started { seq, receiver } => {
                counter!(METRIC_CACHE_MISS).increment(1);
                debug!(fingerprint = %fingerprint, seq, "Starting fetch");
                self.start(endpoint, args, full_args, fingerprint.clone(), seq);
                Ok(self.wait(&fingerprint, receiver).await)
            }
        }
    }

    /// Refresh an aged entry in the background unless a fetch is running.
    fn refresh<E: QueryEndpoint>(
        &self,
        endpoint: &E,
        args: E::Args,
        full_args: Value,
        fingerprint: Fingerprint,
    ) {
        let admission = self
            .ctx
            .inflight
            .admit(&fingerprint, &full_args, false, || None);
        if let Admission::Started { seq, .. } = admission {
            debug!(fingerprint = %fingerprint, seq, "Background refresh");
            self.start(endpoint, args, full_args, fingerprint, seq);
        }
    }

    fn start<E: QueryEndpoint>(
        &self,
        endpoint: &E,
        args: E::Args,
        full_args: Value,
        fingerprint: Fingerprint,
        seq: Epoch,
    ) {
        self.ctx.store.begin_fetch(
            &fingerprint,
            refetcher(&self.ctx, endpoint.clone(), args.clone()),
        );
        tokio::spawn(run_fetch(
            Arc::clone(&self.ctx),
            endpoint.clone(),
            args,
            full_args,
            fingerprint,
            seq,
        ));
    }

    async fn wait(
        &self,
        fingerprint: &Fingerprint,
        receiver: oneshot::Receiver<EntrySnapshot>,
    ) -> EntrySnapshot {
        match receiver.await {
            Ok(snapshot) => snapshot,
            Err(_) => self
                .ctx
                .store
                .get(fingerprint)
                .unwrap_or_else(|| EntrySnapshot::idle(fingerprint.clone())),
        }
    }
}

fn identify<E: QueryEndpoint>(
    endpoint: &E,
    args: &E::Args,
) -> Result<(Fingerprint, Value), FingerprintError> {
    Ok((endpoint.fingerprint(args)?, args_value(E::NAME, args)?))
}

/// A cached entry answers a query when it holds a fresh success for the
/// same full arguments.
fn servable(snapshot: &EntrySnapshot, args: &Value) -> bool {
    snapshot.status == FetchStatus::Succeeded
        && !snapshot.stale
        && snapshot.last_args.as_ref().is_none_or(|last| last == args)
}

/// Closure stored on the entry so invalidation can re-issue this query.
fn refetcher<E: QueryEndpoint>(ctx: &Arc<CacheContext>, endpoint: E, args: E::Args) -> Refetch {
    let ctx = Arc::downgrade(ctx);
    Arc::new(move || {
        let ctx = ctx.clone();
        let endpoint = endpoint.clone();
        let args = args.clone();
        async move {
            let Some(ctx) = ctx.upgrade() else {
                return;
            };
            if let Err(err) = QueryCoordinator::new(ctx).query(&endpoint, args, true).await {
                warn!(endpoint = E::NAME, error = %err, "Refetch skipped");
            }
        }
        .boxed()
    })
}

#[instrument(skip_all, fields(endpoint = E::NAME, fingerprint = %fingerprint, seq = seq))]
async fn run_fetch<E: QueryEndpoint>(
    ctx: Arc<CacheContext>,
    endpoint: E,
    args: E::Args,
    full_args: Value,
    fingerprint: Fingerprint,
    seq: Epoch,
) {
    let started_at = Instant::now();
    let result = match endpoint.request(&args) {
        Ok(request) => match ctx.transport.send(request).await {
            Ok(payload) => endpoint.decode(payload),
            Err(err) => Err(err),
        },
        Err(err) => Err(err),
    };
    let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_FETCH_MS).record(elapsed_ms);

    let tracked = ctx.inflight.is_tracked(&fingerprint, seq);
    let applied = match result {
        Ok(output) => ctx
            .store
            .apply_success(&fingerprint, seq, tracked, full_args, |previous| {
                let previous =
                    previous.and_then(|value| Arc::clone(value).downcast::<E::Output>().ok());
                let merged = endpoint.merge(previous.as_deref(), output);
                let unchanged = previous.as_deref() == Some(&merged);
                let tags = endpoint.provides(&args, &merged).into_iter().collect();
                Resolved {
                    value: Arc::new(merged),
                    tags,
                    unchanged,
                }
            }),
        Err(err) => {
            warn!(error = %err, kind = err.kind(), elapsed_ms, "Fetch failed");
            ctx.store.apply_failure(&fingerprint, seq, tracked, err)
        }
    };

    match applied {
        Applied::Written { snapshot, changed } => {
            debug!(
                status = snapshot.status.as_str(),
                changed,
                elapsed_ms,
                "Fetch applied"
            );
            if changed {
                ctx.subscriptions.publish(&snapshot);
            }
            ctx.inflight.settle(&fingerprint, seq, &snapshot);
            if snapshot.subscribers == 0 {
                ctx.schedule_eviction(&fingerprint);
            }
        }
        Applied::Discarded => {
            counter!(METRIC_FETCH_DISCARDED).increment(1);
            debug!("Discarded out-of-order response");
        }
    }
}
