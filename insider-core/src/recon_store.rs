//! Recon State Store (spec §4.1): a persistent per-actor cumulative recon
//! score with exponential time decay.
//!
//! Backends implement [`ReconStateStore`], a narrow contract modeled on the
//! teacher's [`StorageBackend`](../storage/index.html)-style trait so the
//! in-memory backend here and `insider-kv`'s redb-backed backend are
//! symmetric (spec §9's re-architecture note).

use crate::error::Result;
use crate::types::{Actor, ReconAction, ReconScoreEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// `score' = stored_score * 2^(-Δt/half_life)`, per spec §3/§4.1.
#[must_use]
pub fn decay(score: f64, elapsed: chrono::Duration, half_life_hours: f64) -> f64 {
    if score <= 0.0 {
        return 0.0;
    }
    let elapsed_hours = elapsed.num_seconds() as f64 / 3_600.0;
    if elapsed_hours <= 0.0 {
        return score;
    }
    score * 2f64.powf(-elapsed_hours / half_life_hours)
}

/// Minimal contract a Recon State Store backend must implement: atomic get,
/// compare-and-swap write (actor-level mutual exclusion, so
/// `observe_recon`'s read-decay-add-write is never lost across concurrent
/// detector runs), and eviction once a score decays below threshold.
#[async_trait]
pub trait ReconStateStore: Send + Sync {
    /// Atomic read of the raw stored entry (no decay applied).
    async fn get(&self, actor: &Actor) -> Result<Option<ReconScoreEntry>>;

    /// Compare-and-swap write: `expected` must match the currently stored
    /// entry (`None` means "no entry yet") or the write is rejected and the
    /// caller must retry with a fresh read. Implementations serialize this
    /// per actor.
    async fn put_with_cas(
        &self,
        expected: Option<ReconScoreEntry>,
        new_entry: ReconScoreEntry,
    ) -> Result<bool>;

    /// Evicts the actor's entry if its current (decayed) score is below
    /// `floor` (spec §3: evicted when score decays below 0.1).
    async fn delete_if_below(&self, actor: &Actor, floor: f64, half_life_hours: f64) -> Result<()>;
}

/// Applies one recon observation to `store`, handling the decay-then-add and
/// the CAS retry loop. On backend failure, the update is logged and dropped
/// (spec §4.1: recon tracking is best-effort, never blocks detection).
pub async fn observe_recon(
    store: &dyn ReconStateStore,
    actor: &Actor,
    action: ReconAction,
    timestamp: DateTime<Utc>,
    half_life_hours: f64,
) {
    for _ in 0..3 {
        let current = match store.get(actor).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%actor, error = %err, "recon state store get failed, dropping observation");
                return;
            }
        };

        let decayed = current
            .as_ref()
            .map(|e| decay(e.score, timestamp - e.last_update_ts, half_life_hours))
            .unwrap_or(0.0);
        let new_score = (decayed + action.weight()).min(100.0);
        let new_entry = ReconScoreEntry {
            actor: actor.clone(),
            score: new_score,
            last_update_ts: timestamp,
        };

        match store.put_with_cas(current, new_entry).await {
            Ok(true) => return,
            Ok(false) => continue, // lost the race, retry with a fresh read
            Err(err) => {
                warn!(%actor, error = %err, "recon state store write failed, dropping observation");
                return;
            }
        }
    }
    warn!(%actor, "recon state store CAS retries exhausted, dropping observation");
}

/// Returns the decayed score at `at_ts` without mutating storage. A backend
/// error returns 0 (spec §4.1: fail open toward non-delayed detection).
pub async fn current_score(
    store: &dyn ReconStateStore,
    actor: &Actor,
    at_ts: DateTime<Utc>,
    half_life_hours: f64,
) -> f64 {
    match store.get(actor).await {
        Ok(Some(entry)) => decay(entry.score, at_ts - entry.last_update_ts, half_life_hours),
        Ok(None) => 0.0,
        Err(err) => {
            warn!(%actor, error = %err, "recon state store read failed, returning 0");
            0.0
        }
    }
}

/// In-memory backend: one mutex-guarded map, matching spec §4.1's
/// "in-memory backend uses a local mutex per actor" (approximated here with
/// a single map mutex, sufficient for a single-process batch run; the CAS
/// contract is still honored so callers behave identically against either
/// backend).
#[derive(Default)]
pub struct InMemoryReconStateStore {
    entries: Mutex<HashMap<Actor, ReconScoreEntry>>,
}

impl InMemoryReconStateStore {
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
impl ReconStateStore for InMemoryReconStateStore {
    async fn get(&self, actor: &Actor) -> Result<Option<ReconScoreEntry>> {
        Ok(self.entries.lock().get(actor).cloned())
    }

    async fn put_with_cas(
        &self,
        expected: Option<ReconScoreEntry>,
        new_entry: ReconScoreEntry,
    ) -> Result<bool> {
        let mut entries = self.entries.lock();
        let current = entries.get(&new_entry.actor).cloned();
        if current != expected {
            return Ok(false);
        }
        entries.insert(new_entry.actor.clone(), new_entry);
        Ok(true)
    }

    async fn delete_if_below(&self, actor: &Actor, floor: f64, half_life_hours: f64) -> Result<()> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(actor) {
            let now = Utc::now();
            let decayed = decay(entry.score, now - entry.last_update_ts, half_life_hours);
            if decayed < floor {
                entries.remove(actor);
            }
        }
        Ok(())
    }
}
