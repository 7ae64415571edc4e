//! Turns a rendered page into a scored structural model.
//!
//! [`PageStructureExtractor::extract`] combines four views of one page:
//!
//! - **layers** from a CDP DOM snapshot, ranked by stacking depth and
//!   visual importance;
//! - a **hierarchy** of semantically meaningful DOM nodes;
//! - **structured data** (JSON-LD, microdata, RDFa) with schema.org
//!   recommendations and relationships;
//! - **SEO** metadata, a 0-100 score and findings.

pub mod attributes;
pub mod error;
pub mod hierarchy;
pub mod layers;
pub mod links;
pub mod schema_links;
pub mod seo;
pub mod snapshot;
pub mod structured;

use std::{sync::Arc, time::Duration};

use {
    dashmap::DashMap,
    pagemine_browser::PageHandle,
    pagemine_config::ExtractorConfig,
    scraper::Html,
    serde::{Deserialize, Serialize},
    tokio::time::Instant,
    tracing::{debug, warn},
    url::Url,
};

pub use {
    attributes::{AttributeValues, extract_attributes},
    error::ExtractError,
    hierarchy::HierarchyNode,
    layers::{Layer, Position},
    schema_links::SchemaLinks,
    seo::{SeoMetadata, SeoReport},
    structured::StructuredData,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageStructure {
    pub url: String,
    pub extracted_at: String,
    pub layers: Vec<Layer>,
    pub hierarchy: Option<HierarchyNode>,
    pub structured_data: StructuredData,
    pub schema: SchemaLinks,
    pub seo: SeoMetadata,
    pub seo_score: f64,
    pub seo_issues: Vec<String>,
    /// Absolute same-host links found on the page.
    pub links: Vec<String>,
}

/// Everything derived from the page HTML alone.
struct HtmlAnalysis {
    structured_data: StructuredData,
    schema: SchemaLinks,
    seo: SeoMetadata,
    report: SeoReport,
    links: Vec<String>,
}

fn analyze_html(html: &str, page_url: Option<&Url>) -> HtmlAnalysis {
    let doc = Html::parse_document(html);
    let structured_data = structured::extract_structured_data(&doc);
    let occurrences = structured_data.type_occurrences();
    let schema = schema_links::link_schemas(&doc, &occurrences);
    let link_summary = links::summarize_links(&doc, page_url);
    let seo = SeoMetadata::from_document(&doc, &link_summary, page_url);
    let report = seo::score(&seo, schema.discovered.len());
    HtmlAnalysis {
        structured_data,
        schema,
        seo,
        report,
        links: link_summary.same_host,
    }
}

pub struct PageStructureExtractor {
    config: ExtractorConfig,
    cache: DashMap<String, (Instant, Arc<PageStructure>)>,
}

impl PageStructureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            cache: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    fn cached(&self, url: &str) -> Option<Arc<PageStructure>> {
        if !self.config.cache_enabled {
            return None;
        }
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let hit = self
            .cache
            .get(url)
            .filter(|entry| entry.0.elapsed() < ttl)
            .map(|entry| Arc::clone(&entry.1));
        if hit.is_none() {
            self.cache.remove(url);
        }
        hit
    }

    /// Extract the structure of a page that has already been navigated.
    pub async fn extract(&self, page: &PageHandle) -> Result<Arc<PageStructure>, ExtractError> {
        let url = page.url().await?.unwrap_or_default();
        if let Some(hit) = self.cached(&url) {
            debug!(url, "structure served from cache");
            #[cfg(feature = "metrics")]
            pagemine_metrics::counter!(pagemine_metrics::extract::CACHE_HITS_TOTAL).increment(1);
            return Ok(hit);
        }
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let raw = page.capture_snapshot(&snapshot::COMPUTED_STYLES).await?;
        let layers = layers::build_layers(
            snapshot::parse_snapshot(raw)?,
            self.config.min_importance_score,
            self.config.max_layers,
        );

        let hierarchy = match page
            .evaluate(&hierarchy::hierarchy_script(self.config.max_depth))
            .await?
        {
            serde_json::Value::Null => None,
            value => hierarchy::build_hierarchy(
                serde_json::from_value(value)?,
                self.config.min_importance_score,
            ),
        };

        let html = page.content().await?;
        let page_url = Url::parse(&url).ok();
        if page_url.is_none() {
            warn!(url, "page URL unparsable, link classification degraded");
        }
        let analysis = analyze_html(&html, page_url.as_ref());

        let structure = Arc::new(PageStructure {
            url: url.clone(),
            extracted_at: pagemine_common::time::now_rfc3339(),
            layers,
            hierarchy,
            structured_data: analysis.structured_data,
            schema: analysis.schema,
            seo: analysis.seo,
            seo_score: analysis.report.score,
            seo_issues: analysis.report.issues,
            links: analysis.links,
        });
        debug!(
            url,
            layers = structure.layers.len(),
            seo_score = structure.seo_score,
            types = structure.schema.discovered.len(),
            "extracted page structure"
        );

        #[cfg(feature = "metrics")]
        {
            use pagemine_metrics::{counter, extract, histogram};
            counter!(extract::EXTRACTIONS_TOTAL).increment(1);
            histogram!(extract::DURATION_SECONDS).record(started.elapsed().as_secs_f64());
            histogram!(extract::LAYERS_PER_PAGE).record(structure.layers.len() as f64);
            histogram!(extract::SEO_SCORE).record(structure.seo_score);
        }

        if self.config.cache_enabled {
            self.remember(url, &structure);
        }
        Ok(structure)
    }

    /// Insert into the cache, first sweeping expired entries and then the
    /// oldest ones while the cache is full.
    fn remember(&self, url: String, structure: &Arc<PageStructure>) {
        let limit = self.config.cache_max_entries.max(1);
        if self.cache.len() >= limit {
            let ttl = Duration::from_secs(self.config.cache_ttl_secs);
            self.cache.retain(|_, entry| entry.0.elapsed() < ttl);
        }
        while self.cache.len() >= limit {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|entry| entry.value().0)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.cache.remove(&key);
                },
                None => break,
            }
        }
        self.cache
            .insert(url, (Instant::now(), Arc::clone(structure)));
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::snapshot::fixture::{El, SnapshotBuilder},
        pagemine_browser::{
            AcquireOptions, BrowserPool, PoolConfig,
            testing::{MockLauncher, MockSite},
        },
        serde_json::json,
    };

    const URL: &str = "https://shop.example/kettle";

    async fn pool(launcher: &MockLauncher) -> Arc<BrowserPool> {
        let pool = Arc::new(BrowserPool::new(
            PoolConfig {
                min_browsers: 1,
                max_browsers: 1,
                pages_per_browser: 2,
                auto_scale: false,
                ..Default::default()
            },
            Arc::new(launcher.clone()),
        ));
        pool.initialize().await.unwrap();
        pool
    }

    fn config() -> ExtractorConfig {
        ExtractorConfig {
            min_importance_score: 0.0,
            ..Default::default()
        }
    }

    async fn extract_with(
        launcher: &MockLauncher,
        extractor: &PageStructureExtractor,
    ) -> Arc<PageStructure> {
        let pool = pool(launcher).await;
        let page = pool.acquire_page(AcquireOptions::default()).await.unwrap();
        page.goto(URL).await.unwrap();
        let out = extractor.extract(&page).await.unwrap();
        pool.shutdown().await;
        out
    }

    fn html(head: &str, body: &str) -> String {
        format!("<html><head>{head}</head><body>{body}</body></html>")
    }

    #[tokio::test]
    async fn empty_page_scores_baseline() {
        let launcher = MockLauncher::new().with_site(URL, &html("", ""));
        let out = extract_with(&launcher, &PageStructureExtractor::new(config())).await;
        assert!(out.seo_score <= 10.0);
        assert!((out.seo_score - 5.0).abs() < f64::EPSILON);
        assert!(out.layers.is_empty());
        assert!(out.hierarchy.is_none());
    }

    #[tokio::test]
    async fn title_description_h1_and_json_ld_add_forty_five() {
        let title = "A".repeat(45);
        let description = "B".repeat(130);
        let launcher = MockLauncher::new().with_site(
            URL,
            &html(
                &format!(
                    r#"<title>{title}</title><meta name="description" content="{description}">
                    <script type="application/ld+json">{{"@type":"Product","name":"Kettle"}}</script>"#
                ),
                "<h1>Kettle</h1>",
            ),
        );
        let out = extract_with(&launcher, &PageStructureExtractor::new(config())).await;
        assert!((out.seo_score - 50.0).abs() < f64::EPSILON, "{}", out.seo_score);
        assert_eq!(out.schema.discovered.len(), 1);
        assert_eq!(out.structured_data.types(), ["Product"]);
    }

    #[tokio::test]
    async fn combines_layers_hierarchy_and_links() {
        let launcher = MockLauncher::new();
        launcher.set_site(URL, MockSite {
            html: html("", r#"<a href="/cart">cart</a><a href="https://other.example/">x</a>"#),
            snapshot: Some(SnapshotBuilder::page(&[
                El {
                    attrs: &[("id", "banner")],
                    styles: ["block", "visible", "1", "fixed", "5"],
                    paint_order: 2,
                    ..El::new("div", 300.0, 100.0)
                },
                El::new("p", 300.0, 20.0),
            ])),
            final_url: None,
        });
        launcher.set_eval(Arc::new(|script: &str, _url: &str| {
            if script.contains(hierarchy::HIERARCHY_MARKER) {
                Ok(json!({
                    "tag": "body",
                    "children": [{ "tag": "main", "id": "content", "textLength": 120 }],
                }))
            } else {
                Ok(serde_json::Value::Null)
            }
        }));

        let out = extract_with(&launcher, &PageStructureExtractor::new(config())).await;
        assert_eq!(out.layers.len(), 2);
        assert_eq!(out.layers[0].id.as_deref(), Some("banner"));
        assert_eq!(out.layers[0].z, 2 + 500 + 10_000);
        let tree = out.hierarchy.as_ref().unwrap();
        assert_eq!(tree.children[0].tag, "main");
        assert!((tree.children[0].score - 0.9).abs() < 1e-9);
        assert_eq!(out.links, ["https://shop.example/cart"]);
        assert_eq!(out.seo.external_links, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_serves_repeat_extractions_until_ttl() {
        let launcher = MockLauncher::new().with_site(URL, &html("<title>One</title>", ""));
        let extractor = PageStructureExtractor::new(ExtractorConfig {
            cache_enabled: true,
            cache_ttl_secs: 60,
            ..config()
        });
        let pool = pool(&launcher).await;
        let page = pool.acquire_page(AcquireOptions::default()).await.unwrap();
        page.goto(URL).await.unwrap();

        let first = extractor.extract(&page).await.unwrap();
        launcher.set_site(URL, MockSite {
            html: html("<title>Two</title>", ""),
            ..Default::default()
        });
        let second = extractor.extract(&page).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        tokio::time::advance(Duration::from_secs(61)).await;
        let third = extractor.extract(&page).await.unwrap();
        assert_eq!(third.seo.title.as_deref(), Some("Two"));
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cache_is_bounded_and_sweeps_expired_entries() {
        let urls: Vec<String> = (0..4).map(|i| format!("https://shop.example/{i}")).collect();
        let mut launcher = MockLauncher::new();
        for url in &urls {
            launcher = launcher.with_site(url, &html("<title>Item</title>", ""));
        }
        let extractor = PageStructureExtractor::new(ExtractorConfig {
            cache_enabled: true,
            cache_ttl_secs: 60,
            cache_max_entries: 2,
            ..config()
        });
        let pool = pool(&launcher).await;
        let page = pool.acquire_page(AcquireOptions::default()).await.unwrap();

        for url in &urls[..3] {
            page.goto(url).await.unwrap();
            extractor.extract(&page).await.unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert_eq!(extractor.cached_entries(), 2);
        // the oldest entry went first
        assert!(extractor.cached(&urls[0]).is_none());
        assert!(extractor.cached(&urls[2]).is_some());

        tokio::time::advance(Duration::from_secs(120)).await;
        page.goto(&urls[3]).await.unwrap();
        extractor.extract(&page).await.unwrap();
        assert_eq!(extractor.cached_entries(), 1);
        pool.shutdown().await;
    }
}
