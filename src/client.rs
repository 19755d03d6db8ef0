//! The injectable client UI code talks to.
//!
//! One `ApiClient` owns one cache, tag index, subscription registry and
//! in-flight table. Clones share them; separate instances share nothing.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::api::{MutationEndpoint, QueryEndpoint};
use crate::cache::{
    CacheConfig, CacheContext, CacheStore, EntrySnapshot, FetchStatus, Fingerprint,
    FingerprintError, MutationCoordinator, QueryCoordinator, Subscription,
};
use crate::config::Settings;
use crate::transport::{FetchError, HttpTransport, Transport, TransportError};

/// Typed view of a cache entry: status, last good data, last error.
#[derive(Debug)]
pub struct QueryState<T> {
    pub status: FetchStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<FetchError>,
    pub stale: bool,
    pub updated_at: Option<OffsetDateTime>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            stale: self.stale,
            updated_at: self.updated_at,
        }
    }
}

impl<T: Any + Send + Sync> QueryState<T> {
    pub fn from_snapshot(snapshot: &EntrySnapshot) -> Self {
        Self {
            status: snapshot.status,
            data: snapshot.value_as::<T>(),
            error: snapshot.error.clone(),
            stale: snapshot.stale,
            updated_at: snapshot.updated_at,
        }
    }
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Succeeded
    }

    pub fn is_error(&self) -> bool {
        self.status == FetchStatus::Failed
    }

    /// The data when the last fetch succeeded, otherwise its error.
    ///
    /// Use the fields directly to show stale data next to an error.
    pub fn into_result(self) -> Result<Arc<T>, FetchError> {
        if self.status == FetchStatus::Failed
            && let Some(error) = self.error
        {
            return Err(error);
        }
        self.data
            .ok_or_else(|| FetchError::network("request ended without a response"))
    }
}

/// Counts for inspection and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub tags: usize,
    pub in_flight: usize,
    pub listeners: usize,
}

#[derive(Clone)]
pub struct ApiClient {
    ctx: Arc<CacheContext>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, config: CacheConfig) -> Self {
        Self {
            ctx: CacheContext::new(transport, config),
        }
    }

    /// Client over HTTP with the configured base URL and cache settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, TransportError> {
        let transport = HttpTransport::from_settings(&settings.api)?;
        Ok(Self::new(
            Arc::new(transport),
            CacheConfig::from(&settings.cache),
        ))
    }

    /// Read-only view of the cache. Writes go through queries and mutations.
    pub fn store(&self) -> &CacheStore {
        &self.ctx.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.ctx.config
    }

    pub fn fingerprint<E: QueryEndpoint>(
        &self,
        endpoint: &E,
        args: &E::Args,
    ) -> Result<Fingerprint, FingerprintError> {
        endpoint.fingerprint(args)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<EntrySnapshot> {
        self.ctx.store.get(fingerprint)
    }

    /// Cached state for a query without fetching anything.
    pub fn peek<E: QueryEndpoint>(
        &self,
        endpoint: &E,
        args: &E::Args,
    ) -> Result<QueryState<E::Output>, FingerprintError> {
        let fingerprint = endpoint.fingerprint(args)?;
        Ok(self.state_of(&fingerprint))
    }

    /// Serve from cache, join an in-flight request, or fetch.
    pub async fn query<E: QueryEndpoint>(
        &self,
        endpoint: &E,
        args: E::Args,
    ) -> Result<QueryState<E::Output>, FingerprintError> {
        let snapshot = self.queries().query(endpoint, args, false).await?;
        Ok(QueryState::from_snapshot(&snapshot))
    }

    /// Fetch regardless of what is cached.
    pub async fn refetch<E: QueryEndpoint>(
        &self,
        endpoint: &E,
        args: E::Args,
    ) -> Result<QueryState<E::Output>, FingerprintError> {
        let snapshot = self.queries().query(endpoint, args, true).await?;
        Ok(QueryState::from_snapshot(&snapshot))
    }

    /// Register a listener.
    ///
    /// Nothing is fetched unless a mutation left the entry stale, in which
    /// case its query is re-issued and the listener hears the result.
    pub fn subscribe<E, F>(
        &self,
        endpoint: &E,
        args: &E::Args,
        listener: F,
    ) -> Result<Subscription, FingerprintError>
    where
        E: QueryEndpoint,
        F: Fn(&QueryState<E::Output>) + Send + Sync + 'static,
    {
        let subscription = self.listen(endpoint, args, listener)?;
        self.ctx.refetch_if_stale(subscription.fingerprint());
        Ok(subscription)
    }

    /// Subscribe, then query. The listener sees the query's outcome.
    pub async fn watch<E, F>(
        &self,
        endpoint: E,
        args: E::Args,
        listener: F,
    ) -> Result<Watch<E>, FingerprintError>
    where
        E: QueryEndpoint,
        F: Fn(&QueryState<E::Output>) + Send + Sync + 'static,
    {
        // The query below refetches a stale entry itself.
        let subscription = self.listen(&endpoint, &args, listener)?;
        self.query(&endpoint, args.clone()).await?;
        Ok(Watch {
            client: self.clone(),
            endpoint,
            args,
            subscription,
        })
    }

    pub async fn mutate<M: MutationEndpoint>(
        &self,
        endpoint: &M,
        args: M::Args,
    ) -> Result<M::Output, FetchError> {
        MutationCoordinator::new(Arc::clone(&self.ctx))
            .mutate(endpoint, &args)
            .await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.ctx.store.len(),
            tags: self.ctx.store.tag_index().tag_count(),
            in_flight: self.ctx.inflight.len(),
            listeners: self.ctx.subscriptions.listener_count(),
        }
    }

    fn listen<E, F>(
        &self,
        endpoint: &E,
        args: &E::Args,
        listener: F,
    ) -> Result<Subscription, FingerprintError>
    where
        E: QueryEndpoint,
        F: Fn(&QueryState<E::Output>) + Send + Sync + 'static,
    {
        let fingerprint = endpoint.fingerprint(args)?;
        let listener = Arc::new(move |snapshot: &EntrySnapshot| {
            listener(&QueryState::from_snapshot(snapshot));
        });
        Ok(Subscription::open(&self.ctx, fingerprint, listener))
    }

    fn queries(&self) -> QueryCoordinator {
        QueryCoordinator::new(Arc::clone(&self.ctx))
    }

    fn state_of<T: Any + Send + Sync>(&self, fingerprint: &Fingerprint) -> QueryState<T> {
        let snapshot = self
            .ctx
            .store
            .get(fingerprint)
            .unwrap_or_else(|| EntrySnapshot::idle(fingerprint.clone()));
        QueryState::from_snapshot(&snapshot)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.ctx.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A live query: keeps its entry subscribed until dropped.
pub struct Watch<E: QueryEndpoint> {
    client: ApiClient,
    endpoint: E,
    args: E::Args,
    subscription: Subscription,
}

impl<E: QueryEndpoint> Watch<E> {
    pub fn fingerprint(&self) -> &Fingerprint {
        self.subscription.fingerprint()
    }

    /// Current cached state.
    pub fn state(&self) -> QueryState<E::Output> {
        self.client.state_of(self.subscription.fingerprint())
    }

    pub async fn refetch(&self) -> QueryState<E::Output> {
        match self
            .client
            .refetch(&self.endpoint, self.args.clone())
            .await
        {
            Ok(state) => state,
            // The arguments were fingerprinted when the watch was created.
            Err(_) => self.state(),
        }
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}
