//! Registry store
//!
//! Owns the current published snapshot and serializes every
//! read-modify-write cycle behind one writer lock. Readers clone an
//! `Arc<PublishedRegistry>` and never block writers or observe a partial
//! update.
//!
//! Commit order is fixed: merge, seal, persist, then publish. If
//! persistence fails the published snapshot does not move.

use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::persistence::RegistryPersistence;
use super::seal::{seal, Seal};
use super::snapshot::RegistrySnapshot;
use crate::clock::DomainMoment;
use crate::merge::{harvest, MergeEngine, RawRecord, Rejection};
use crate::observability::{Event, Logger, MetricsRegistry};

/// A committed snapshot with its seal and cached listing order
#[derive(Debug)]
pub struct PublishedRegistry {
    snapshot: RegistrySnapshot,
    seal: Seal,
    urls: Vec<String>,
    latest: Option<DomainMoment>,
}

impl PublishedRegistry {
    pub fn new(snapshot: RegistrySnapshot, seal: Seal) -> Self {
        let urls = snapshot.iter().map(|e| e.source.clone()).collect();
        let latest = snapshot.latest_moment();
        Self {
            snapshot,
            seal,
            urls,
            latest,
        }
    }

    pub fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    pub fn seal(&self) -> Seal {
        self.seal
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn latest_moment(&self) -> Option<DomainMoment> {
        self.latest
    }

    /// All source URLs in canonical token order
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Source URLs in canonical token order, `limit` items from `offset`
    pub fn urls_page(&self, offset: usize, limit: usize) -> &[String] {
        let start = offset.min(self.urls.len());
        let end = start.saturating_add(limit).min(self.urls.len());
        &self.urls[start..end]
    }
}

/// Outcome of one inhale call
#[derive(Debug, Clone)]
pub struct InhaleReport {
    pub received: usize,
    pub accepted: usize,
    pub applied: usize,
    pub rejected: Vec<Rejection>,
    pub changed: bool,
    /// Entries dropped by the retention cap
    pub pruned: usize,
    /// Seal after the call (unchanged seal if nothing changed)
    pub seal: Seal,
    pub total: usize,
    /// Registry as published right after this call
    pub registry: Arc<PublishedRegistry>,
}

/// Thread-safe owner of the registry
pub struct RegistryStore {
    engine: MergeEngine,
    keep: usize,
    persistence: Arc<dyn RegistryPersistence>,
    writer: Mutex<()>,
    published: RwLock<Arc<PublishedRegistry>>,
    metrics: Arc<MetricsRegistry>,
}

impl std::fmt::Debug for RegistryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryStore")
            .field("engine", &self.engine)
            .field("keep", &self.keep)
            .finish_non_exhaustive()
    }
}

impl RegistryStore {
    /// Load persisted state and publish it
    ///
    /// `keep` caps the number of entries (0 = unlimited).
    pub fn open(
        engine: MergeEngine,
        keep: usize,
        persistence: Arc<dyn RegistryPersistence>,
        metrics: Arc<MetricsRegistry>,
    ) -> StoreResult<Self> {
        let snapshot = persistence.load()?;
        let sealed = seal(&snapshot);

        metrics.set_entries(snapshot.len() as u64);
        Logger::event(Event::RegistryLoaded)
            .field("entries", snapshot.len())
            .field("seal", sealed)
            .info();

        Ok(Self {
            engine,
            keep,
            persistence,
            writer: Mutex::new(()),
            published: RwLock::new(Arc::new(PublishedRegistry::new(snapshot, sealed))),
            metrics,
        })
    }

    pub fn engine(&self) -> &MergeEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// The currently published registry
    pub fn current(&self) -> StoreResult<Arc<PublishedRegistry>> {
        self.published
            .read()
            .map(|p| Arc::clone(&p))
            .map_err(|_| StoreError::Unavailable("published registry lock poisoned".to_string()))
    }

    /// Seal of the currently published snapshot
    pub fn seal(&self) -> StoreResult<Seal> {
        Ok(self.current()?.seal())
    }

    /// Merge a batch, committing and publishing only if content changed
    pub fn inhale(&self, batch: Vec<RawRecord>) -> StoreResult<InhaleReport> {
        self.metrics.increment_inhale_requests();
        let received = batch.len();

        let _writer = self
            .writer
            .lock()
            .map_err(|_| StoreError::Unavailable("writer lock poisoned".to_string()))?;
        let current = self.current()?;

        let result = match self.engine.merge(current.snapshot(), batch) {
            Ok(r) => r,
            Err(e) => {
                self.metrics.increment_oversized_batches();
                Logger::event(Event::InhaleRejected)
                    .field("code", e.code())
                    .field("reason", &e)
                    .warn();
                return Err(e.into());
            }
        };

        self.metrics.record_batch(
            result.accepted as u64,
            result.rejected.len() as u64,
            result.applied as u64,
        );

        let mut next = result.next;
        let mut changed = result.changed;
        let pruned = if self.keep > 0 { next.retain_newest(self.keep) } else { 0 };
        if pruned > 0 {
            changed = !next.same_content(current.snapshot());
        }

        if !changed {
            Logger::event(Event::InhaleUnchanged)
                .field("accepted", result.accepted)
                .field("rejected", result.rejected.len())
                .trace();
            return Ok(InhaleReport {
                received,
                accepted: result.accepted,
                applied: 0,
                rejected: result.rejected,
                changed: false,
                pruned: 0,
                seal: current.seal(),
                total: current.len(),
                registry: current,
            });
        }

        let next_seal = seal(&next);
        if let Err(e) = self.persistence.commit(&next, &next_seal) {
            self.metrics.increment_commit_failures();
            Logger::event(Event::CommitFailed)
                .field("code", e.code())
                .field("reason", &e)
                .error();
            return Err(e.into());
        }

        let total = next.len();
        let registry = Arc::new(PublishedRegistry::new(next, next_seal));
        {
            let mut published = self
                .published
                .write()
                .map_err(|_| StoreError::Unavailable("published registry lock poisoned".to_string()))?;
            *published = Arc::clone(&registry);
        }

        self.metrics.increment_commits();
        self.metrics.set_entries(total as u64);
        if pruned > 0 {
            self.metrics.add_entries_pruned(pruned as u64);
            Logger::event(Event::RegistryPruned)
                .field("pruned", pruned)
                .field("keep", self.keep)
                .info();
        }
        Logger::event(Event::InhaleCommitted)
            .field("applied", result.applied)
            .field("rejected", result.rejected.len())
            .field("entries", total)
            .field("seal", next_seal)
            .info();

        Ok(InhaleReport {
            received,
            accepted: result.accepted,
            applied: result.applied,
            rejected: result.rejected,
            changed: true,
            pruned,
            seal: next_seal,
            total,
            registry,
        })
    }

    /// Harvest a krystal document and inhale what it yields
    pub fn inhale_krystal(&self, doc: &Value) -> StoreResult<InhaleReport> {
        let found = harvest(doc, self.engine.normalizer());
        Logger::event(Event::KrystalHarvested)
            .field("candidates", found.candidates)
            .field("records", found.records.len())
            .trace();
        self.inhale(found.records)
    }
}
