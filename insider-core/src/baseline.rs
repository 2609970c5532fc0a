//! User Baseline Tracker (spec §4.3): per-actor rolling statistics answering
//! the three baseline questions the Intent Classifier consults.
//!
//! Persistence is behind [`BaselineStore`], a narrow contract symmetric with
//! [`crate::recon_store::ReconStateStore`] so the in-memory backend here and
//! `insider-kv`'s redb-backed `baseline:<actor>` table (spec §6) are
//! interchangeable.

use crate::error::Result;
use crate::types::{Actor, ExfilEvent, UserBaseline};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Minimal contract a User Baseline backend must implement: read the
/// actor's current baseline, and replace it wholesale. Single-actor work is
/// always dispatched to one worker (spec §5's per-actor partitioning), so
/// unlike `ReconStateStore` no CAS is required here.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn get(&self, actor: &Actor) -> Result<Option<UserBaseline>>;
    async fn put(&self, baseline: UserBaseline) -> Result<()>;
}

/// In-memory backend: one `RwLock`-guarded map, the default when
/// `recon_state_backend` is `memory` (spec §6).
#[derive(Default)]
pub struct InMemoryBaselineStore {
    baselines: RwLock<HashMap<Actor, UserBaseline>>,
}

impl InMemoryBaselineStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl BaselineStore for InMemoryBaselineStore {
    async fn get(&self, actor: &Actor) -> Result<Option<UserBaseline>> {
        Ok(self.baselines.read().get(actor).cloned())
    }

    async fn put(&self, baseline: UserBaseline) -> Result<()> {
        self.baselines.write().insert(baseline.actor.clone(), baseline);
        Ok(())
    }
}

/// Per-actor baseline tracker, backed by a pluggable [`BaselineStore`].
pub struct UserBaselineTracker {
    store: Arc<dyn BaselineStore>,
}

impl UserBaselineTracker {
    #[must_use]
    pub fn new(store: Arc<dyn BaselineStore>) -> Self {
        Self { store }
    }

    /// An in-memory-backed tracker, for callers with no persistent backend
    /// configured.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(InMemoryBaselineStore::shared())
    }

    /// Updates the actor's baseline with an observed exfil event, regardless
    /// of whether it produced a finding (spec §4.3). Best-effort: a backend
    /// failure is logged and the observation is dropped, matching the Recon
    /// State Store's `observe_recon` policy.
    pub async fn record(&self, event: &ExfilEvent) {
        let current = match self.store.get(&event.actor).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(actor = %event.actor, error = %err, "baseline store get failed, dropping observation");
                return;
            }
        };

        let mut entry = current.unwrap_or_else(|| UserBaseline {
            actor: event.actor.clone(),
            known_external_domains: Default::default(),
            external_share_count: 0,
            total_share_count: 0,
            own_file_share_count: 0,
            last_update_ts: event.timestamp,
            window_start_ts: event.timestamp,
        });

        // Roll the 30-day window forward: if the new event is more than 30
        // days past the window start, reset counters and start a fresh window.
        if event.timestamp - entry.window_start_ts > chrono::Duration::days(30) {
            entry.external_share_count = 0;
            entry.total_share_count = 0;
            entry.own_file_share_count = 0;
            entry.window_start_ts = event.timestamp;
        }

        entry.total_share_count += 1;
        entry.last_update_ts = event.timestamp;

        if event.is_external_reach() {
            entry.external_share_count += 1;
            if let Some(domain) = event.destination_domain() {
                entry.known_external_domains.insert(domain);
            }
        }

        if let Err(err) = self.store.put(entry).await {
            warn!(actor = %event.actor, error = %err, "baseline store write failed, dropping observation");
        }
    }

    /// Marks an exfil event as targeting a file the actor owns, adjusting
    /// `own_file_share_count`. Called by the correlator once ownership is
    /// known from the file context (recorded separately from [`record`]
    /// since ownership requires the enrichment lookup).
    pub async fn record_ownership(&self, actor: &Actor, owns_file: bool) {
        if !owns_file {
            return;
        }
        let entry = match self.store.get(actor).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(err) => {
                warn!(%actor, error = %err, "baseline store get failed, dropping ownership update");
                return;
            }
        };
        let mut entry = entry;
        entry.own_file_share_count += 1;
        if let Err(err) = self.store.put(entry).await {
            warn!(%actor, error = %err, "baseline store write failed, dropping ownership update");
        }
    }

    /// Whether the actor has previously shared with `domain`.
    #[must_use]
    pub async fn has_seen_domain(&self, actor: &Actor, domain: &str) -> bool {
        self.baseline(actor)
            .await
            .is_some_and(|b| b.known_external_domains.contains(domain))
    }

    /// Snapshot of the actor's current baseline, if any history exists. A
    /// backend failure is treated as "no history", matching the Recon State
    /// Store's fail-open policy.
    #[must_use]
    pub async fn baseline(&self, actor: &Actor) -> Option<UserBaseline> {
        match self.store.get(actor).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%actor, error = %err, "baseline store read failed, treating as no history");
                None
            }
        }
    }

    #[must_use]
    pub async fn external_share_frequency(&self, actor: &Actor) -> f64 {
        self.baseline(actor)
            .await
            .map(|b| b.external_share_frequency())
            .unwrap_or(0.0)
    }
}
