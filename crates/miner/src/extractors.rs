//! Named user-supplied page extractors.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, RwLock},
};

use {pagemine_browser::PageHandle, serde_json::Value};

use crate::{MinerError, Result};

pub type ExtractorFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// Custom extractor: runs on a loaded page and returns any JSON value.
pub type CustomExtractorFn = Arc<dyn Fn(PageHandle) -> ExtractorFuture + Send + Sync>;

#[derive(Default)]
pub(crate) struct ExtractorRegistry {
    extractors: RwLock<HashMap<String, CustomExtractorFn>>,
}

impl ExtractorRegistry {
    pub(crate) fn register(&self, name: &str, f: CustomExtractorFn) -> Result<()> {
        let mut extractors = self.extractors.write().unwrap_or_else(|e| e.into_inner());
        if extractors.contains_key(name) {
            return Err(MinerError::DuplicateExtractor {
                name: name.to_string(),
            });
        }
        extractors.insert(name.to_string(), f);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<CustomExtractorFn> {
        self.extractors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn constant(v: i64) -> CustomExtractorFn {
        Arc::new(move |_page| Box::pin(async move { Ok(Value::from(v)) }))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = ExtractorRegistry::default();
        registry.register("price", constant(1)).unwrap();
        let err = registry.register("price", constant(2)).unwrap_err();
        assert!(matches!(err, MinerError::DuplicateExtractor { name } if name == "price"));
        assert!(registry.get("price").is_some());
        assert!(registry.get("missing").is_none());
    }
}
