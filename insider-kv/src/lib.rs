//! # Insider KV
//!
//! `redb`-backed persistent Recon State Store and User Baseline backend —
//! the `"kv"` backend named in spec §6, playing the role the teacher's
//! `memory-storage-redb` crate plays for episodes: a durable embedded store
//! behind the same trait the in-memory backend implements.
//!
//! redb serializes writers, so a single write transaction around the
//! read-compare-write sequence gives the CAS semantics
//! [`insider_core::recon_store::ReconStateStore::put_with_cas`] requires,
//! without any extra actor-level locking.

use async_trait::async_trait;
use chrono::Utc;
use insider_core::baseline::BaselineStore;
use insider_core::error::{Error, Result};
use insider_core::recon_store::{decay, ReconStateStore};
use insider_core::types::{Actor, ReconScoreEntry, UserBaseline};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const RECON_SCORE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("recon_score");
const BASELINE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("baseline");

/// Lazy-TTL window for `baseline:<actor>` rows, per spec §6: redb has no
/// native TTL, so a row older than this is treated as absent on read and
/// then deleted, the same trick `delete_if_below` uses for decayed scores.
const BASELINE_TTL: chrono::Duration = chrono::Duration::days(35);

/// `recon_score:<actor>` persistence, as named in spec §6.
pub struct RedbReconStateStore {
    db: Arc<Database>,
}

impl RedbReconStateStore {
    /// Opens (creating if absent) a redb database at `path`. `path` plays
    /// the role of the `"kv"` backend's connection string from spec §6. The
    /// same physical database backs both the recon-score and baseline
    /// tables; use [`Self::baseline_store`] to get a handle sharing this
    /// connection.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())
            .map_err(|e| Error::Configuration(format!("failed to open redb database: {e}")))?;
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            write_txn
                .open_table(RECON_SCORE_TABLE)
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            write_txn
                .open_table(BASELINE_TABLE)
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    fn key(actor: &str) -> String {
        format!("recon_score:{actor}")
    }

    /// A `baseline:<actor>` store sharing this connection's underlying
    /// database.
    #[must_use]
    pub fn baseline_store(&self) -> RedbBaselineStore {
        RedbBaselineStore { db: self.db.clone() }
    }
}

fn encode(entry: &ReconScoreEntry) -> Result<Vec<u8>> {
    serde_json::to_vec(entry).map_err(Error::Serialization)
}

fn decode(bytes: &[u8]) -> Result<ReconScoreEntry> {
    serde_json::from_slice(bytes).map_err(Error::Serialization)
}

#[async_trait]
impl ReconStateStore for RedbReconStateStore {
    async fn get(&self, actor: &Actor) -> Result<Option<ReconScoreEntry>> {
        let db = self.db.clone();
        let key = Self::key(actor);
        tokio::task::spawn_blocking(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            let table = read_txn
                .open_table(RECON_SCORE_TABLE)
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            match table.get(key.as_str()).map_err(|e| Error::BackendTransient(e.to_string()))? {
                Some(value) => decode(value.value()).map(Some),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| Error::BackendTransient(e.to_string()))?
    }

    async fn put_with_cas(
        &self,
        expected: Option<ReconScoreEntry>,
        new_entry: ReconScoreEntry,
    ) -> Result<bool> {
        let db = self.db.clone();
        let key = Self::key(&new_entry.actor);
        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            {
                let mut table = write_txn
                    .open_table(RECON_SCORE_TABLE)
                    .map_err(|e| Error::BackendTransient(e.to_string()))?;
                let current = table
                    .get(key.as_str())
                    .map_err(|e| Error::BackendTransient(e.to_string()))?
                    .map(|v| decode(v.value()))
                    .transpose()?;
                if current != expected {
                    return Ok(false);
                }
                let encoded = encode(&new_entry)?;
                table
                    .insert(key.as_str(), encoded.as_slice())
                    .map_err(|e| Error::BackendTransient(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            Ok(true)
        })
        .await
        .map_err(|e| Error::BackendTransient(e.to_string()))?
    }

    async fn delete_if_below(&self, actor: &Actor, floor: f64, half_life_hours: f64) -> Result<()> {
        let db = self.db.clone();
        let key = Self::key(actor);
        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            {
                let mut table = write_txn
                    .open_table(RECON_SCORE_TABLE)
                    .map_err(|e| Error::BackendTransient(e.to_string()))?;
                let current = table
                    .get(key.as_str())
                    .map_err(|e| Error::BackendTransient(e.to_string()))?
                    .map(|v| decode(v.value()))
                    .transpose()?;
                if let Some(entry) = current {
                    let now = Utc::now();
                    let decayed = decay(entry.score, now - entry.last_update_ts, half_life_hours);
                    if decayed < floor {
                        debug!(actor = %entry.actor, decayed, "evicting decayed recon score entry");
                        table
                            .remove(key.as_str())
                            .map_err(|e| Error::BackendTransient(e.to_string()))?;
                    }
                }
            }
            write_txn
                .commit()
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::BackendTransient(e.to_string()))?
    }
}

fn baseline_key(actor: &str) -> String {
    format!("baseline:{actor}")
}

fn encode_baseline(baseline: &UserBaseline) -> Result<Vec<u8>> {
    serde_json::to_vec(baseline).map_err(Error::Serialization)
}

fn decode_baseline(bytes: &[u8]) -> Result<UserBaseline> {
    serde_json::from_slice(bytes).map_err(Error::Serialization)
}

/// `baseline:<actor>` persistence, as named in spec §6. Shares its
/// underlying `redb::Database` with a [`RedbReconStateStore`] opened on the
/// same path, so the two tables live in one file.
pub struct RedbBaselineStore {
    db: Arc<Database>,
}

#[async_trait]
impl BaselineStore for RedbBaselineStore {
    async fn get(&self, actor: &Actor) -> Result<Option<UserBaseline>> {
        let db = self.db.clone();
        let key = baseline_key(actor);
        tokio::task::spawn_blocking(move || {
            let stored = {
                let read_txn = db
                    .begin_read()
                    .map_err(|e| Error::BackendTransient(e.to_string()))?;
                let table = read_txn
                    .open_table(BASELINE_TABLE)
                    .map_err(|e| Error::BackendTransient(e.to_string()))?;
                table
                    .get(key.as_str())
                    .map_err(|e| Error::BackendTransient(e.to_string()))?
                    .map(|v| decode_baseline(v.value()))
                    .transpose()?
            };
            let Some(baseline) = stored else {
                return Ok(None);
            };
            if Utc::now() - baseline.last_update_ts > BASELINE_TTL {
                debug!(actor = %baseline.actor, "evicting expired baseline entry");
                let write_txn = db
                    .begin_write()
                    .map_err(|e| Error::BackendTransient(e.to_string()))?;
                {
                    let mut table = write_txn
                        .open_table(BASELINE_TABLE)
                        .map_err(|e| Error::BackendTransient(e.to_string()))?;
                    table
                        .remove(key.as_str())
                        .map_err(|e| Error::BackendTransient(e.to_string()))?;
                }
                write_txn
                    .commit()
                    .map_err(|e| Error::BackendTransient(e.to_string()))?;
                return Ok(None);
            }
            Ok(Some(baseline))
        })
        .await
        .map_err(|e| Error::BackendTransient(e.to_string()))?
    }

    async fn put(&self, baseline: UserBaseline) -> Result<()> {
        let db = self.db.clone();
        let key = baseline_key(&baseline.actor);
        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            {
                let mut table = write_txn
                    .open_table(BASELINE_TABLE)
                    .map_err(|e| Error::BackendTransient(e.to_string()))?;
                let encoded = encode_baseline(&baseline)?;
                table
                    .insert(key.as_str(), encoded.as_slice())
                    .map_err(|e| Error::BackendTransient(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::BackendTransient(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::BackendTransient(e.to_string()))?
    }
}
