//! Orphan storage collector
//!
//! Mark-and-sweep over a federation of namespaces, without any distributed
//! transaction:
//!
//! 1. [`OrphanCollector::snapshot`] lists every storage id of every namespace.
//! 2. [`OrphanCollector::remove_referenced`] walks every library of every
//!    namespace and drops the storage ids it references from the candidates.
//! 3. [`OrphanCollector::sweep`] clears and deletes what is left.
//!
//! Each phase consumes the previous phase's output, so the reference walk can
//! only start once the snapshot of all namespaces is complete. A storage
//! created during the run is either in the snapshot and protected by the
//! library that references it, or absent from the snapshot and never a
//! candidate.

mod filter;
mod report;

use futures::{stream, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::auth::OpenMode;
use crate::db::dao::{ConfigDao, ConfigDaoExt};
use crate::db::schemas::{CredentialsStore, LibraryConfig, StorageConfig};
use crate::db::Federation;
use crate::engine::StorageEngine;
use crate::logging::{AuditEvent, AuditLogger};
use crate::types::Result;

pub use filter::StorageFilter;
pub use report::{ReclaimOutcome, ReclaimReport, ReclaimSummary, UntrackedReference};

/// Collector configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Log intended actions only
    pub dry_run: bool,
    /// Maximum storages reclaimed concurrently
    pub concurrency: usize,
    pub filter: StorageFilter,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            concurrency: 8,
            filter: StorageFilter::All,
        }
    }
}

/// Storage ids per namespace, taken before any library is read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    candidates: BTreeMap<String, BTreeSet<String>>,
}

impl Snapshot {
    pub fn storage_ids(&self, namespace: &str) -> Option<&BTreeSet<String>> {
        self.candidates.get(namespace)
    }

    pub fn len(&self) -> usize {
        self.candidates.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot minus every storage id some library references
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Orphans {
    candidates: BTreeMap<String, BTreeSet<String>>,
    untracked: Vec<UntrackedReference>,
}

impl Orphans {
    /// Libraries whose credentials namespace was not part of the run
    pub fn untracked(&self) -> &[UntrackedReference] {
        &self.untracked
    }

    pub fn storage_ids(&self, namespace: &str) -> Option<&BTreeSet<String>> {
        self.candidates.get(namespace)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.candidates
            .iter()
            .flat_map(|(ns, ids)| ids.iter().map(move |id| (ns.as_str(), id.as_str())))
    }

    pub fn len(&self) -> usize {
        self.candidates.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a full collection run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionRun {
    pub reports: Vec<ReclaimReport>,
    pub untracked: Vec<UntrackedReference>,
}

impl CollectionRun {
    pub fn summary(&self) -> ReclaimSummary {
        ReclaimSummary::from_reports(&self.reports).with_untracked(&self.untracked)
    }
}

/// One orphan candidate scheduled for the sweep
struct Candidate {
    namespace: String,
    storage_id: String,
    dao: Arc<dyn ConfigDao>,
    /// Position within its namespace, for progress logs
    index: usize,
    total: usize,
}

/// Reclaims storages referenced by no library in any federated namespace
pub struct OrphanCollector {
    federation: Federation,
    engine: Arc<dyn StorageEngine>,
    config: CollectorConfig,
    audit: Option<AuditLogger>,
}

impl OrphanCollector {
    pub fn new(
        federation: Federation,
        engine: Arc<dyn StorageEngine>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            federation,
            engine,
            config,
            audit: None,
        }
    }

    /// Record every reclaim decision in `audit`
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn federation(&self) -> &Federation {
        &self.federation
    }

    /// Run all three phases
    pub async fn collect_orphans(&self) -> Result<Vec<ReclaimReport>> {
        Ok(self.run().await?.reports)
    }

    /// Run all three phases, keeping the untracked namespace references
    pub async fn run(&self) -> Result<CollectionRun> {
        info!(
            namespaces = ?self.federation.namespaces().collect::<Vec<_>>(),
            dry_run = self.config.dry_run,
            filter = ?self.config.filter,
            "Starting orphan storage collection"
        );

        let snapshot = self.snapshot().await?;
        let mut orphans = self.remove_referenced(snapshot).await?;
        let untracked = std::mem::take(&mut orphans.untracked);
        let run = CollectionRun {
            reports: self.sweep(orphans).await,
            untracked,
        };

        let summary = run.summary();
        info!(
            candidates = summary.candidates,
            reclaimed = summary.reclaimed,
            dry_run = summary.dry_run,
            filtered = summary.filtered,
            missing = summary.missing,
            failed = summary.failed,
            untracked_namespaces = ?summary.untracked_namespaces,
            "Orphan storage collection finished"
        );
        Ok(run)
    }

    /// Phase 1: list every storage of every namespace
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let mut candidates = BTreeMap::new();
        for (namespace, dao) in self.federation.iter() {
            let ids: BTreeSet<String> = dao
                .storage_ids()
                .await
                .map_err(|e| e.in_context(format!("listing storages of {}", namespace)))?
                .into_iter()
                .collect();
            info!(namespace = %namespace, storages = ids.len(), "Snapshot of storages taken");
            candidates.insert(namespace.to_string(), ids);
        }
        Ok(Snapshot { candidates })
    }

    /// Phase 2: drop every storage id referenced by a library.
    ///
    /// Any database error aborts the run; a partial reference walk would turn
    /// referenced storages into false orphans.
    pub async fn remove_referenced(&self, snapshot: Snapshot) -> Result<Orphans> {
        let mut candidates = snapshot.candidates;
        let mut untracked = Vec::new();

        for (namespace, dao) in self.federation.iter() {
            let lib_names = dao
                .library_names(None)
                .await
                .map_err(|e| e.in_context(format!("listing libraries of {}", namespace)))?;
            let total = lib_names.len();

            for (i, lib_name) in lib_names.iter().enumerate() {
                debug!(namespace = %namespace, library = %lib_name, "Checking library {}/{}", i + 1, total);

                let Some(desc) = dao
                    .find_library_config(lib_name)
                    .await
                    .map_err(|e| e.in_context(format!("library {} in {}", lib_name, namespace)))?
                else {
                    error!(
                        namespace = %namespace,
                        library = %lib_name,
                        "Library listed but its descriptor is gone"
                    );
                    continue;
                };

                let owner = match &desc.credentials_store {
                    CredentialsStore::None => namespace,
                    CredentialsStore::Namespace { namespace: referenced }
                        if self.federation.contains(referenced) =>
                    {
                        referenced.as_str()
                    }
                    CredentialsStore::Namespace { namespace: referenced } => {
                        warn!(
                            namespace = %namespace,
                            library = %lib_name,
                            referenced_namespace = %referenced,
                            "Library references a namespace that is not tracked; protecting its storages in {}",
                            namespace
                        );
                        untracked.push(UntrackedReference {
                            namespace: namespace.to_string(),
                            library: lib_name.clone(),
                            referenced_namespace: referenced.clone(),
                        });
                        namespace
                    }
                };

                if let Some(ids) = candidates.get_mut(owner) {
                    for sid in desc.referenced_storage_ids() {
                        ids.remove(sid);
                    }
                }
            }
        }

        let orphans = Orphans {
            candidates,
            untracked,
        };
        for (namespace, ids) in &orphans.candidates {
            info!(namespace = %namespace, orphans = ids.len(), "Orphan storages found");
        }
        Ok(orphans)
    }

    /// Phase 3: reclaim each orphan; failures are logged and skipped
    pub async fn sweep(&self, orphans: Orphans) -> Vec<ReclaimReport> {
        let mut work = Vec::with_capacity(orphans.len());
        for (namespace, ids) in orphans.candidates {
            let Some(dao) = self.federation.get(&namespace).cloned() else {
                error!(namespace = %namespace, "Orphans reported for unknown namespace");
                continue;
            };
            let total = ids.len();
            for (i, storage_id) in ids.into_iter().enumerate() {
                work.push(Candidate {
                    namespace: namespace.clone(),
                    storage_id,
                    dao: dao.clone(),
                    index: i + 1,
                    total,
                });
            }
        }

        stream::iter(work)
            .map(|candidate| self.reclaim(candidate))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    async fn reclaim(&self, candidate: Candidate) -> ReclaimReport {
        let Candidate {
            namespace,
            storage_id,
            dao,
            index,
            total,
        } = candidate;

        let mut report = ReclaimReport {
            namespace,
            storage_id,
            kind: None,
            outcome: ReclaimOutcome::Missing,
        };

        let storage = match dao.find_storage_config(&report.storage_id).await {
            Ok(Some(storage)) => storage,
            Ok(None) => {
                debug!(storage_id = %report.storage_id, "Orphan already deleted");
                return self.finish(report).await;
            }
            Err(e) => {
                error!(storage_id = %report.storage_id, error = %e, "Failed to read orphan storage");
                report.outcome = ReclaimOutcome::Failed {
                    reason: e.to_string(),
                };
                return self.finish(report).await;
            }
        };
        report.kind = Some(storage.kind());

        if !self.config.filter.matches(&report.storage_id, &storage) {
            report.outcome = ReclaimOutcome::Filtered;
            return self.finish(report).await;
        }

        if self.config.dry_run {
            info!(
                namespace = %report.namespace,
                storage_id = %report.storage_id,
                kind = %storage.kind(),
                "[dry run] Would reclaim orphan storage {}/{}",
                index,
                total
            );
            report.outcome = ReclaimOutcome::DryRun;
            return self.finish(report).await;
        }

        info!(
            namespace = %report.namespace,
            storage_id = %report.storage_id,
            kind = %storage.kind(),
            "Reclaiming orphan storage {}/{}",
            index,
            total
        );

        report.outcome = match self
            .clear_and_delete(dao.as_ref(), &report.storage_id, storage)
            .await
        {
            Ok(()) => ReclaimOutcome::Reclaimed,
            Err(e) => {
                error!(
                    namespace = %report.namespace,
                    storage_id = %report.storage_id,
                    error = %e,
                    "Failed to reclaim orphan storage, skipping"
                );
                ReclaimOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        self.finish(report).await
    }

    /// Clear the data through a disposable single-storage library, then drop
    /// the descriptor. The descriptor outlives a failed clear so a rerun retries.
    async fn clear_and_delete(
        &self,
        dao: &dyn ConfigDao,
        storage_id: &str,
        storage: StorageConfig,
    ) -> Result<()> {
        let cfg = LibraryConfig::single_storage(storage_id, storage);
        let handle = self
            .engine
            .construct_store(cfg, dao.env(), OpenMode::Delete)
            .await?;
        self.engine.clear_all_data(&handle).await?;
        dao.delete_storage_config(storage_id).await?;
        Ok(())
    }

    async fn finish(&self, report: ReclaimReport) -> ReclaimReport {
        if let Some(audit) = &self.audit {
            audit
                .log(AuditEvent::from_report(&report, self.config.dry_run))
                .await;
        }
        report
    }
}
