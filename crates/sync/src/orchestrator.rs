//! The sync state machine and the on-demand fetch path

use crate::index::{IndexEntry, RepositoryIndex};
use dashmap::DashMap;
use depot_catalog::{Registration, UnitCatalog};
use depot_errors::{Error, FetchError, SyncError};
use depot_hash::StreamHasher;
use depot_net::Fetcher;
use depot_store::ContentStore;
use depot_types::{ContentUnit, MirrorPolicy, Remote, RepositoryId, StoreKey, SyncResult};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Default number of units fetched in parallel during a sync pass
pub const DEFAULT_SYNC_CONCURRENCY: usize = 4;

/// Drives fetch → verify → store → register for whole repositories and
/// for single on-demand units
#[derive(Clone)]
pub struct SyncOrchestrator {
    fetcher: Fetcher,
    store: ContentStore,
    catalog: UnitCatalog,
    concurrency: usize,
    /// Per-path mutual-exclusion tokens for on-demand fetches; concurrent
    /// cache-miss requests coalesce into one upstream transfer
    flights: Arc<DashMap<(RepositoryId, String), Arc<Mutex<()>>>>,
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(fetcher: Fetcher, store: ContentStore, catalog: UnitCatalog) -> Self {
        Self {
            fetcher,
            store,
            catalog,
            concurrency: DEFAULT_SYNC_CONCURRENCY,
            flights: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &UnitCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    #[must_use]
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Run one sync pass over a remote repository.
    ///
    /// Under full-sync policy every listed unit is fetched and re-verified;
    /// otherwise only paths not yet satisfied in the catalog are processed.
    /// Units are fetched in parallel; per-unit failures are recorded in the
    /// result and do not abort the pass. A sync with failures but no
    /// additions is degraded, not failed.
    ///
    /// Cancelling the token abandons in-flight fetches; units registered
    /// before the cancel remain valid and a re-run picks up where this one
    /// stopped.
    ///
    /// # Errors
    /// Returns `Error::Cancelled` on cancellation and an index error if
    /// the upstream listing itself is unavailable.
    #[instrument(skip_all, fields(remote = %remote.name))]
    pub async fn sync(
        &self,
        remote: &Remote,
        index: &dyn RepositoryIndex,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, Error> {
        let repository_id = remote.repository_id();
        let entries = index.list().await?;
        info!(units = entries.len(), "listed upstream index");

        let todo: Vec<(usize, IndexEntry)> = entries
            .into_iter()
            .enumerate()
            .filter(|(_, entry)| {
                remote.policy == MirrorPolicy::FullSync
                    || !self.catalog.contains(repository_id, &entry.relative_path)
            })
            .collect();

        let mut in_flight = futures::stream::iter(todo.into_iter().map(|(position, entry)| {
            let this = self.clone();
            let remote = remote.clone();
            async move {
                let outcome = this.sync_unit(&remote, &entry).await;
                (position, entry.relative_path, outcome)
            }
        }))
        .buffer_unordered(self.concurrency);

        let mut outcomes = Vec::new();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    warn!("sync cancelled mid-flight");
                    return Err(Error::Cancelled);
                }
                next = in_flight.next() => match next {
                    Some(outcome) => outcomes.push(outcome),
                    None => break,
                },
            }
        }

        // Report failures in discovery order
        outcomes.sort_by_key(|(position, _, _)| *position);

        let mut result = SyncResult::default();
        for (_, relative_path, outcome) in outcomes {
            match outcome {
                Ok(Registration::Added(_)) => result.units_added += 1,
                Ok(Registration::Unchanged(_)) => result.units_verified += 1,
                Err(error) => {
                    warn!(relative_path, %error, "unit failed during sync");
                    result.record_failure(relative_path, error);
                }
            }
        }

        info!(
            added = result.units_added,
            verified = result.units_verified,
            failed = result.units_failed,
            "sync pass complete"
        );
        Ok(result)
    }

    /// Fetch, verify, store, and register a single unit the first time its
    /// path is requested.
    ///
    /// At most one upstream fetch is in flight per path: concurrent
    /// requesters wait on the winner's token and then see the catalog hit
    /// instead of triggering duplicate transfers.
    ///
    /// # Errors
    /// Propagates fetch, verification, and registration failures for the
    /// requested unit; `FetchError::NotFound` if the upstream index does
    /// not list the path.
    pub async fn fetch_on_demand(
        &self,
        remote: &Remote,
        index: &dyn RepositoryIndex,
        relative_path: &str,
    ) -> Result<ContentUnit, Error> {
        let repository_id = remote.repository_id();
        let flight_key = (repository_id, relative_path.to_string());

        loop {
            if let Ok(unit) = self.catalog.resolve(repository_id, relative_path) {
                return Ok(unit);
            }

            let token = self
                .flights
                .entry(flight_key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let guard = token.lock().await;

            // The fetch that owned this token already finished and failed;
            // start over so only the current token's holder goes upstream.
            let current = self
                .flights
                .get(&flight_key)
                .is_some_and(|entry| Arc::ptr_eq(entry.value(), &token));
            if !current {
                drop(guard);
                continue;
            }

            let result = self
                .fetch_on_demand_locked(remote, index, relative_path)
                .await;

            // Retire the token this fetch ran under, never a fresh one
            self.flights
                .remove_if(&flight_key, |_, value| Arc::ptr_eq(value, &token));
            drop(guard);
            return result;
        }
    }

    async fn fetch_on_demand_locked(
        &self,
        remote: &Remote,
        index: &dyn RepositoryIndex,
        relative_path: &str,
    ) -> Result<ContentUnit, Error> {
        let repository_id = remote.repository_id();

        // The winner of the race registered it while we waited
        if let Ok(unit) = self.catalog.resolve(repository_id, relative_path) {
            debug!(relative_path, "coalesced into completed fetch");
            return Ok(unit);
        }

        let entry = index.entry(relative_path).await?.ok_or_else(|| {
            let url = Fetcher::unit_url(&remote.base_url, relative_path)
                .map_or_else(|_| relative_path.to_string(), |u| u.to_string());
            Error::from(FetchError::NotFound { url })
        })?;

        let registration = self.sync_unit(remote, &entry).await?;
        Ok(registration.unit().clone())
    }

    /// Fetch one unit, verify it against its declared digest, persist the
    /// bytes, and register the path
    async fn sync_unit(
        &self,
        remote: &Remote,
        entry: &IndexEntry,
    ) -> Result<Registration, Error> {
        let (store_key, size) = self
            .fetch_verify_store(&remote.base_url, entry)
            .await?;

        let registration = self.catalog.register(
            remote.repository_id(),
            &entry.relative_path,
            entry.digest.clone(),
            store_key.clone(),
            size,
        );

        match registration {
            Ok(registration) => {
                // A re-verified unit already holds its store reference;
                // drop the one this fetch added
                if matches!(registration, Registration::Unchanged(_)) {
                    self.store.release(&store_key)?;
                }
                Ok(registration)
            }
            Err(error) => {
                self.store.release(&store_key)?;
                Err(error)
            }
        }
    }

    /// Stream a unit's bytes into a staged store entry while hashing with
    /// the declared digest's algorithm; commit only on verification.
    ///
    /// A transient mid-body failure discards the stage and retries the
    /// whole transfer from a fresh one.
    async fn fetch_verify_store(
        &self,
        base_url: &Url,
        entry: &IndexEntry,
    ) -> Result<(StoreKey, u64), Error> {
        let expected = entry.digest.clone();
        let relative_path = entry.relative_path.clone();
        let store = self.store.clone();

        self.fetcher
            .fetch_with(base_url, &entry.relative_path, move |mut payload| {
                let store = store.clone();
                let expected = expected.clone();
                let relative_path = relative_path.clone();
                async move {
                    let mut staged = store.stage().await?;
                    let mut hasher = StreamHasher::new(expected.algorithm());

                    while let Some(chunk) = payload.stream.next().await {
                        match chunk {
                            Ok(chunk) => {
                                hasher.update(&chunk);
                                staged.write(&chunk).await?;
                            }
                            Err(error) => {
                                staged.discard().await;
                                return Err(error);
                            }
                        }
                    }

                    let actual = hasher.finalize();
                    if actual == expected {
                        staged.commit().await
                    } else {
                        // Tampered or corrupted upstream bytes never reach
                        // the store
                        staged.discard().await;
                        Err(SyncError::DigestMismatch {
                            relative_path,
                            expected: expected.to_string(),
                            actual: actual.to_string(),
                        }
                        .into())
                    }
                }
            })
            .await
    }
}
