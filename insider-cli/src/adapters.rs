//! Reference adapters standing in for the out-of-scope Workspace audit-log
//! client (spec §1/§6): fixture-backed readers over two JSON files, plus
//! JSON-map-backed file-context and actor-directory lookups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use insider_core::adapters::{ExfilAdapter, ReconAdapter};
use insider_core::engine::ActorDirectory;
use insider_core::error::Error;
use insider_core::file_context::{FileContextSource, RawFileMetadata};
use insider_core::types::{Actor, ExfilEvent, ReconEvent};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Reads a JSON array of `ReconEvent`/`ExfilEvent` from disk on every fetch.
/// A real adapter would page a Workspace Admin SDK reports API; that
/// client, and the credentials it needs, are explicitly out of scope here.
pub struct FixtureAdapter {
    recon_path: PathBuf,
    exfil_path: PathBuf,
}

impl FixtureAdapter {
    #[must_use]
    pub fn new(recon_path: impl Into<PathBuf>, exfil_path: impl Into<PathBuf>) -> Self {
        Self {
            recon_path: recon_path.into(),
            exfil_path: exfil_path.into(),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> insider_core::error::Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&content).map_err(Error::Serialization)
}

#[async_trait]
impl ReconAdapter for FixtureAdapter {
    async fn fetch_recon(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> insider_core::error::Result<Vec<ReconEvent>> {
        let events: Vec<ReconEvent> = read_json(&self.recon_path)?;
        Ok(events
            .into_iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect())
    }
}

#[async_trait]
impl ExfilAdapter for FixtureAdapter {
    async fn fetch_exfil(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> insider_core::error::Result<Vec<ExfilEvent>> {
        let events: Vec<ExfilEvent> = read_json(&self.exfil_path)?;
        Ok(events
            .into_iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FixtureFileRecord {
    pub owner: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub shared_externally_before: bool,
}

/// JSON-map-backed `FileContextSource`: `{ "doc_id": { owner, labels, ... } }`.
pub struct FixtureFileContextSource {
    records: HashMap<String, FixtureFileRecord>,
}

impl FixtureFileContextSource {
    pub fn load(path: &Path) -> insider_core::error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
        let records: HashMap<String, FixtureFileRecord> =
            serde_json::from_str(&content).map_err(Error::Serialization)?;
        Ok(Self { records })
    }
}

#[async_trait]
impl FileContextSource for FixtureFileContextSource {
    async fn fetch(&self, doc_id: &str) -> insider_core::error::Result<Option<RawFileMetadata>> {
        Ok(self.records.get(doc_id).map(|r| RawFileMetadata {
            owner: r.owner.clone(),
            labels: r.labels.clone(),
            shared_externally_before: r.shared_externally_before,
        }))
    }
}

/// JSON-map-backed `ActorDirectory`: `{ "actor@domain": "/OU/Path" }`.
pub struct FixtureActorDirectory {
    ous: HashMap<Actor, String>,
}

impl FixtureActorDirectory {
    pub fn load(path: &Path) -> insider_core::error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
        let ous: HashMap<Actor, String> = serde_json::from_str(&content).map_err(Error::Serialization)?;
        Ok(Self { ous })
    }
}

#[async_trait]
impl ActorDirectory for FixtureActorDirectory {
    async fn ou(&self, actor: &Actor) -> Option<String> {
        self.ous.get(actor).cloned()
    }
}
