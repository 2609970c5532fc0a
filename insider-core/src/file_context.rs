//! File Context Provider (spec §4.2): on-demand `FileContext` lookup with a
//! bounded LRU cache, TTL-based staleness, and a shorter negative-result TTL.
//!
//! The cache itself is modeled directly on the teacher's
//! `memory_core::retrieval::cache::lru::QueryCache`: an `lru::LruCache`
//! behind a lock, with entries carrying their own `cached_at`/`ttl` so
//! expiry is checked lazily on read rather than via a background sweep.

use crate::error::Result;
use crate::types::{FileContext, Sensitivity};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// The out-of-scope external collaborator (spec §1/§6): the real file
/// service client. `insider-cli` supplies a concrete implementation; the
/// engine only depends on this trait.
#[async_trait]
pub trait FileContextSource: Send + Sync {
    /// Fetches raw file metadata. `Ok(None)` means not found or permission
    /// denied (both cached with the shorter negative TTL per spec §4.2).
    async fn fetch(&self, doc_id: &str) -> Result<Option<RawFileMetadata>>;
}

/// Metadata as returned by the file service, before sensitivity derivation.
#[derive(Debug, Clone)]
pub struct RawFileMetadata {
    pub owner: String,
    pub labels: BTreeSet<String>,
    pub shared_externally_before: bool,
}

struct CachedEntry {
    context: FileContext,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Sensitivity-derivation config consulted on every fetch (spec §4.2).
pub struct SensitivityConfig {
    pub sensitive_labels: BTreeSet<String>,
    pub high_risk_owners: BTreeSet<String>,
}

fn derive_sensitivity(meta: &RawFileMetadata, config: &SensitivityConfig) -> Sensitivity {
    if meta.labels.iter().any(|l| config.sensitive_labels.contains(l)) {
        return Sensitivity::High;
    }
    if config.high_risk_owners.contains(&meta.owner) {
        return Sensitivity::High;
    }
    if !meta.labels.is_empty() {
        return Sensitivity::Medium;
    }
    Sensitivity::Low
}

/// Bounded LRU + TTL cache in front of a [`FileContextSource`].
pub struct FileContextProvider {
    source: Arc<dyn FileContextSource>,
    cache: Mutex<LruCache<String, CachedEntry>>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

impl FileContextProvider {
    #[must_use]
    pub fn new(
        source: Arc<dyn FileContextSource>,
        capacity: usize,
        positive_ttl: Duration,
        negative_ttl: Duration,
    ) -> Self {
        Self {
            source,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
            positive_ttl,
            negative_ttl,
        }
    }

    /// Looks up `doc_id`, serving a fresh cache hit or fetching on miss/stale.
    /// On provider error, returns a synthetic unknown `FileContext` and logs
    /// (spec §4.2: enrichment failure must never fail the finding).
    pub async fn get(&self, doc_id: &str, config: &SensitivityConfig) -> FileContext {
        {
            let mut cache = self.cache.lock().await;
            if let Some(entry) = cache.get(doc_id) {
                if !entry.is_expired() {
                    return entry.context.clone();
                }
                cache.pop(doc_id);
            }
        }

        let now = chrono::Utc::now();
        match self.source.fetch(doc_id).await {
            Ok(Some(meta)) => {
                let context = FileContext {
                    doc_id: doc_id.to_string(),
                    owner: meta.owner.clone(),
                    labels: meta.labels.clone(),
                    sensitivity: derive_sensitivity(&meta, config),
                    shared_externally_before: meta.shared_externally_before,
                    fetched_at: now,
                };
                self.cache.lock().await.put(
                    doc_id.to_string(),
                    CachedEntry {
                        context: context.clone(),
                        cached_at: Instant::now(),
                        ttl: self.positive_ttl,
                    },
                );
                context
            }
            Ok(None) => {
                let context = FileContext::unknown(doc_id, now);
                self.cache.lock().await.put(
                    doc_id.to_string(),
                    CachedEntry {
                        context: context.clone(),
                        cached_at: Instant::now(),
                        ttl: self.negative_ttl,
                    },
                );
                context
            }
            Err(err) => {
                warn!(%doc_id, error = %err, "file context provider fetch failed, returning unknown context");
                FileContext::unknown(doc_id, now)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        meta: Option<RawFileMetadata>,
    }

    #[async_trait]
    impl FileContextSource for CountingSource {
        async fn fetch(&self, _doc_id: &str) -> Result<Option<RawFileMetadata>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.meta.clone())
        }
    }

    fn no_op_config() -> SensitivityConfig {
        SensitivityConfig {
            sensitive_labels: BTreeSet::new(),
            high_risk_owners: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn cache_hit_avoids_refetch() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            meta: Some(RawFileMetadata {
                owner: "owner@x.com".into(),
                labels: BTreeSet::new(),
                shared_externally_before: false,
            }),
        });
        let provider = FileContextProvider::new(
            source.clone(),
            10,
            Duration::from_secs(3600),
            Duration::from_secs(300),
        );
        let _ = provider.get("D1", &no_op_config()).await;
        let _ = provider.get("D1", &no_op_config()).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sensitive_label_forces_high_sensitivity() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            meta: Some(RawFileMetadata {
                owner: "owner@x.com".into(),
                labels: BTreeSet::from(["confidential".to_string()]),
                shared_externally_before: false,
            }),
        });
        let provider = FileContextProvider::new(
            source,
            10,
            Duration::from_secs(3600),
            Duration::from_secs(300),
        );
        let config = SensitivityConfig {
            sensitive_labels: BTreeSet::from(["confidential".to_string()]),
            high_risk_owners: BTreeSet::new(),
        };
        let context = provider.get("D1", &config).await;
        assert_eq!(context.sensitivity, Sensitivity::High);
    }

    #[tokio::test]
    async fn provider_error_yields_unknown_context() {
        struct FailingSource;
        #[async_trait]
        impl FileContextSource for FailingSource {
            async fn fetch(&self, _doc_id: &str) -> Result<Option<RawFileMetadata>> {
                Err(crate::error::Error::BackendTransient("boom".into()))
            }
        }
        let provider = FileContextProvider::new(
            Arc::new(FailingSource),
            10,
            Duration::from_secs(3600),
            Duration::from_secs(300),
        );
        let context = provider.get("D1", &no_op_config()).await;
        assert_eq!(context.sensitivity, Sensitivity::Unknown);
    }
}
