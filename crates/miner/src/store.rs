//! Persistence seam for results and extra seed URLs.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{Result, types::ExtractionResult};

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Called once per result, after it is appended to the topic bundle.
    async fn save_result(&self, topic: &str, result: &ExtractionResult) -> Result<()>;
    /// Extra URLs mined after the configured ones.
    async fn load_seeds(&self, instance_id: &str) -> Result<Vec<String>>;
}

/// Discards results and has no seeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResultStore;

#[async_trait]
impl ResultStore for NoopResultStore {
    async fn save_result(&self, _topic: &str, _result: &ExtractionResult) -> Result<()> {
        Ok(())
    }

    async fn load_seeds(&self, _instance_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// In-memory store for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryResultStore {
    results: Mutex<HashMap<String, Vec<Arc<ExtractionResult>>>>,
    seeds: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_seeds(&self, instance_id: &str, urls: impl IntoIterator<Item = String>) {
        self.seeds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(instance_id.to_string())
            .or_default()
            .extend(urls);
    }

    pub fn results(&self, topic: &str) -> Vec<Arc<ExtractionResult>> {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save_result(&self, topic: &str, result: &ExtractionResult) -> Result<()> {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(result.clone()));
        Ok(())
    }

    async fn load_seeds(&self, instance_id: &str) -> Result<Vec<String>> {
        Ok(self
            .seeds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(instance_id)
            .unwrap_or_default())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::ResultStatus};

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryResultStore::new();
        let result = ExtractionResult::new("https://a.test/", ResultStatus::Success);
        store.save_result("t", &result).await.unwrap();
        store.save_result("t", &result).await.unwrap();
        assert_eq!(store.results("t").len(), 2);
        assert!(store.results("other").is_empty());
    }

    #[tokio::test]
    async fn seeds_are_handed_out_once() {
        let store = MemoryResultStore::new();
        store.add_seeds("i1", ["https://a.test/x".to_string()]);
        assert_eq!(store.load_seeds("i1").await.unwrap(), ["https://a.test/x"]);
        assert!(store.load_seeds("i1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn noop_store_has_no_seeds() {
        let store = NoopResultStore;
        assert!(store.load_seeds("any").await.unwrap().is_empty());
        let result = ExtractionResult::new("https://a.test/", ResultStatus::Failed);
        store.save_result("t", &result).await.unwrap();
    }
}
