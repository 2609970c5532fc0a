//! Event Ingest Adapter boundary (spec §2/§6): the out-of-scope external
//! collaborator that hands the engine two time-bounded event sequences.
//!
//! `insider-cli` supplies the concrete implementation (a fixture-backed
//! adapter reading JSON from disk); a real Workspace audit-log client is
//! explicitly not built here.

use crate::error::Result;
use crate::types::{ExfilEvent, ReconEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ReconAdapter: Send + Sync {
    /// Fetches recon events in `[start, end]`. Finite, unordered,
    /// deduplicated by `event_id` is the adapter's responsibility; the
    /// correlator deduplicates defensively again (spec §4.4 edge case).
    async fn fetch_recon(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<ReconEvent>>;
}

#[async_trait]
pub trait ExfilAdapter: Send + Sync {
    async fn fetch_exfil(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<ExfilEvent>>;
}
