//! Host framework boundary
//!
//! The host sends declarative create/delete requests for remotes and
//! distributions and schedules syncs as background jobs. Jobs travel over
//! an explicit mpsc channel to a worker task; results come back through
//! oneshot channels.

use crate::index::RepositoryIndex;
use crate::orchestrator::SyncOrchestrator;
use dashmap::DashMap;
use depot_catalog::UnitCatalog;
use depot_errors::{CatalogError, Error, SyncError};
use depot_net::Fetcher;
use depot_store::ContentStore;
use depot_types::{ContentUnit, Distribution, MirrorPolicy, Remote, SyncResult};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

const JOB_QUEUE_DEPTH: usize = 32;

struct RemoteEntry {
    remote: Remote,
    index: Arc<dyn RepositoryIndex>,
}

struct SyncJob {
    remote: Remote,
    index: Arc<dyn RepositoryIndex>,
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<SyncResult, Error>>,
}

/// The mirror engine's public surface towards the host framework
#[derive(Clone)]
pub struct MirrorService {
    orchestrator: SyncOrchestrator,
    remotes: Arc<DashMap<Uuid, RemoteEntry>>,
    distributions: Arc<DashMap<Uuid, Distribution>>,
    jobs: mpsc::Sender<SyncJob>,
}

impl MirrorService {
    /// Start the service and its sync worker task
    #[must_use]
    pub fn start(fetcher: Fetcher, store: ContentStore, catalog: UnitCatalog) -> Self {
        Self::start_with_orchestrator(SyncOrchestrator::new(fetcher, store, catalog))
    }

    /// Start with a pre-configured orchestrator
    #[must_use]
    pub fn start_with_orchestrator(orchestrator: SyncOrchestrator) -> Self {
        let (jobs, mut job_rx) = mpsc::channel::<SyncJob>(JOB_QUEUE_DEPTH);

        let worker = orchestrator.clone();
        tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                let result = worker
                    .sync(&job.remote, job.index.as_ref(), &job.cancel)
                    .await;
                if let Err(e) = &result {
                    error!(remote = %job.remote.name, error = %e, "sync job failed");
                }
                // Caller may have given up waiting; that is not our problem
                let _ = job.reply.send(result);
            }
        });

        Self {
            orchestrator,
            remotes: Arc::new(DashMap::new()),
            distributions: Arc::new(DashMap::new()),
            jobs,
        }
    }

    /// Register a remote repository with its index discovery
    ///
    /// # Errors
    /// Returns an error if `base_url` is invalid.
    pub fn create_remote(
        &self,
        name: impl Into<String>,
        base_url: &str,
        policy: MirrorPolicy,
        index: Arc<dyn RepositoryIndex>,
    ) -> Result<Remote, Error> {
        let remote = Remote::new(name, base_url, policy)?;
        info!(remote = %remote.name, url = %remote.base_url, ?policy, "remote created");
        self.remotes.insert(
            remote.id,
            RemoteEntry {
                remote: remote.clone(),
                index,
            },
        );
        Ok(remote)
    }

    /// Delete a remote and orphan its catalog entries.
    ///
    /// Store references held by the orphaned units are released; a blob
    /// shared with another repository's units survives until its last
    /// reference goes.
    ///
    /// # Errors
    /// Returns `SyncError::UnknownRemote` if the id is not registered.
    pub async fn delete_remote(&self, remote_id: Uuid) -> Result<(), Error> {
        let (_, entry) =
            self.remotes
                .remove(&remote_id)
                .ok_or_else(|| SyncError::UnknownRemote {
                    remote_id: remote_id.to_string(),
                })?;

        let repository_id = entry.remote.repository_id();
        let orphans = self.orchestrator.catalog().forget_repository(repository_id);
        info!(remote = %entry.remote.name, orphans = orphans.len(), "remote deleted");

        for unit in orphans {
            // A missing reference here means catalog and store disagree;
            // log it and keep releasing the rest
            if let Err(e) = self.orchestrator.store().release(&unit.store_key) {
                error!(path = %unit.relative_path, error = %e, "failed to release store ref");
            }
        }
        Ok(())
    }

    /// Create a distribution serving a remote's repository snapshot at a
    /// base path. For on-demand remotes the distribution carries the
    /// remote so serve-time misses can delegate a fetch.
    ///
    /// # Errors
    /// Returns `SyncError::UnknownRemote` if the id is not registered.
    pub fn create_distribution(
        &self,
        base_path: impl Into<String>,
        remote_id: Uuid,
    ) -> Result<Distribution, Error> {
        let entry = self
            .remotes
            .get(&remote_id)
            .ok_or_else(|| SyncError::UnknownRemote {
                remote_id: remote_id.to_string(),
            })?;

        let mut distribution = Distribution::new(base_path, entry.remote.repository_id());
        if entry.remote.policy == MirrorPolicy::OnDemand {
            distribution = distribution.with_remote(entry.remote.clone());
        }

        info!(base_path = %distribution.base_path, remote = %entry.remote.name, "distribution created");
        self.distributions
            .insert(distribution.id, distribution.clone());
        Ok(distribution)
    }

    /// Delete a distribution. Catalog and store are untouched; other
    /// distributions may still reference the same snapshot.
    ///
    /// # Errors
    /// Returns an error if the id is unknown.
    pub fn delete_distribution(&self, distribution_id: Uuid) -> Result<(), Error> {
        self.distributions
            .remove(&distribution_id)
            .map(|_| ())
            .ok_or_else(|| Error::internal(format!("unknown distribution: {distribution_id}")))
    }

    /// Schedule a sync of a remote and wait for its result
    ///
    /// # Errors
    /// Returns `SyncError::UnknownRemote` for an unregistered id,
    /// `SyncError::WorkerGone` if the worker task is no longer running,
    /// and otherwise the sync outcome.
    pub async fn trigger_sync(&self, remote_id: Uuid) -> Result<SyncResult, Error> {
        self.trigger_sync_cancellable(remote_id, CancellationToken::new())
            .await
    }

    /// Schedule a sync that the caller can cancel mid-flight
    ///
    /// # Errors
    /// See [`trigger_sync`](Self::trigger_sync); additionally returns
    /// `Error::Cancelled` if the token fires before completion.
    pub async fn trigger_sync_cancellable(
        &self,
        remote_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<SyncResult, Error> {
        let (remote, index) = {
            let entry = self
                .remotes
                .get(&remote_id)
                .ok_or_else(|| SyncError::UnknownRemote {
                    remote_id: remote_id.to_string(),
                })?;
            (entry.remote.clone(), Arc::clone(&entry.index))
        };

        let (reply, response) = oneshot::channel();
        self.jobs
            .send(SyncJob {
                remote,
                index,
                cancel,
                reply,
            })
            .await
            .map_err(|_| SyncError::WorkerGone)?;

        response.await.map_err(|_| SyncError::WorkerGone)?
    }

    /// Find the distribution whose base path prefixes the request path,
    /// preferring the longest match
    #[must_use]
    pub fn resolve_distribution(&self, request_path: &str) -> Option<Distribution> {
        self.distributions
            .iter()
            .filter(|entry| entry.value().relative_path(request_path).is_some())
            .max_by_key(|entry| entry.value().base_path.len())
            .map(|entry| entry.value().clone())
    }

    /// Resolve a repository-relative path within a distribution.
    ///
    /// A miss on an on-demand distribution delegates one single-flight
    /// fetch through the backing remote, then retries the lookup once.
    /// Under full-sync policy a miss is terminal.
    ///
    /// # Errors
    /// Returns `CatalogError::UnitNotFound` on a terminal miss, or the
    /// on-demand fetch failure.
    pub async fn resolve_unit(
        &self,
        distribution: &Distribution,
        relative_path: &str,
    ) -> Result<ContentUnit, Error> {
        let catalog = self.orchestrator.catalog();
        match catalog.resolve(distribution.repository_id, relative_path) {
            Ok(unit) => Ok(unit),
            Err(Error::Catalog(CatalogError::UnitNotFound { .. })) => {
                let Some(remote) = &distribution.remote else {
                    return Err(CatalogError::UnitNotFound {
                        repository_id: distribution.repository_id.to_string(),
                        relative_path: relative_path.to_string(),
                    }
                    .into());
                };

                let index = {
                    let entry =
                        self.remotes
                            .get(&remote.id)
                            .ok_or_else(|| SyncError::UnknownRemote {
                                remote_id: remote.id.to_string(),
                            })?;
                    Arc::clone(&entry.index)
                };

                self.orchestrator
                    .fetch_on_demand(remote, index.as_ref(), relative_path)
                    .await?;

                // One retry after the on-demand fetch, never a loop
                catalog.resolve(distribution.repository_id, relative_path)
            }
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    #[must_use]
    pub fn catalog(&self) -> &UnitCatalog {
        self.orchestrator.catalog()
    }

    #[must_use]
    pub fn store(&self) -> &ContentStore {
        self.orchestrator.store()
    }
}
