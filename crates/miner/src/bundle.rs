//! Append-only result collections keyed by topic.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::types::ExtractionResult;

/// Snapshot of a topic's results in append order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBundle {
    pub topic: String,
    pub results: Vec<Arc<ExtractionResult>>,
}

impl DataBundle {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results
            .iter()
            .map(Arc::as_ref)
            .filter(|r| r.is_success())
    }
}

/// Bundles shared by every instance. Only the orchestrator appends.
#[derive(Default)]
pub(crate) struct BundleStore {
    bundles: RwLock<HashMap<String, Vec<Arc<ExtractionResult>>>>,
}

impl BundleStore {
    pub(crate) fn append(&self, topic: &str, result: Arc<ExtractionResult>) {
        self.bundles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic.to_string())
            .or_default()
            .push(result);
    }

    pub(crate) fn snapshot(&self, topic: &str) -> Option<DataBundle> {
        let bundles = self.bundles.read().unwrap_or_else(|e| e.into_inner());
        bundles.get(topic).map(|results| DataBundle {
            topic: topic.to_string(),
            results: results.clone(),
        })
    }

    pub(crate) fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .bundles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        topics.sort();
        topics
    }
}
