// Single-flight caches for the slow-changing datasource catalogs
use crate::error::Result;
use std::future::Future;
use tokio::sync::OnceCell;

/// Memoizes the topic and aggregator lists independently, once per owning
/// client instance. Concurrent callers share the same in-flight fetch; after
/// the first success the stored value is immutable.
#[derive(Debug, Default)]
pub struct MetadataCache {
    topics: OnceCell<Vec<String>>,
    aggregators: OnceCell<Vec<String>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn topics<F, Fut>(&self, fetch: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        self.topics.get_or_try_init(fetch).await.cloned()
    }

    pub async fn aggregators<F, Fut>(&self, fetch: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        self.aggregators.get_or_try_init(fetch).await.cloned()
    }
}
