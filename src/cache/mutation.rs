//! Mutation coordination and tag invalidation.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::MutationEndpoint;
use crate::transport::FetchError;

use super::CacheContext;
use super::planner::InvalidationPlan;

const METRIC_INVALIDATION_REFETCH: &str = "lexquery_invalidation_refetch_total";

#[derive(Clone)]
pub(crate) struct MutationCoordinator {
    ctx: Arc<CacheContext>,
}

impl MutationCoordinator {
    pub fn new(ctx: Arc<CacheContext>) -> Self {
        Self { ctx }
    }

    /// Send a write and invalidate what it declares once it succeeded.
    ///
    /// Failed writes invalidate nothing and are never retried. Invalidation
    /// runs before the response is decoded: a reply that fails to decode still
    /// means the backend applied the write.
    #[instrument(skip_all, fields(endpoint = M::NAME))]
    pub async fn mutate<M: MutationEndpoint>(
        &self,
        endpoint: &M,
        args: &M::Args,
    ) -> Result<M::Output, FetchError> {
        let mutation_id = Uuid::new_v4();
        let request = endpoint.request(args)?;

        let payload = match self.ctx.transport.send(request).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    %mutation_id,
                    error = %err,
                    kind = err.kind(),
                    "Mutation failed; nothing invalidated"
                );
                return Err(err);
            }
        };

        let tags = endpoint.invalidates(args);
        if !tags.is_empty() {
            let plan = InvalidationPlan::build(&self.ctx.store, &tags);
            info!(%mutation_id, plan = %plan, "Invalidating after mutation");
            self.execute(plan).await;
        }

        endpoint.decode(payload)
    }

    /// Mark unwatched entries stale and wait for watched ones to refetch.
    async fn execute(&self, plan: InvalidationPlan) {
        let store = &self.ctx.store;
        for fingerprint in &plan.mark_stale {
            store.mark_stale(fingerprint);
        }

        let mut refetches = Vec::with_capacity(plan.refetch.len());
        for fingerprint in &plan.refetch {
            match store.refetcher(fingerprint) {
                Some(refetch) => {
                    counter!(METRIC_INVALIDATION_REFETCH).increment(1);
                    refetches.push(refetch());
                }
                // Subscribed but never queried: the first query fetches.
                None => {
                    store.mark_stale(fingerprint);
                }
            }
        }
        join_all(refetches).await;
    }
}
