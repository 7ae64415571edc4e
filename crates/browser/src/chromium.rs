//! Chrome/Chromium driver over CDP (chromiumoxide).

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    chromiumoxide::{
        Browser, BrowserConfig as CdpBrowserConfig, Page,
        cdp::browser_protocol::{
            browser::BrowserContextId,
            dom_snapshot::CaptureSnapshotParams,
            emulation::{SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams},
            target::{
                CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
            },
        },
        handler::viewport::Viewport,
    },
    futures::StreamExt,
    tracing::{debug, info, warn},
};

use crate::{
    driver::{BrowserLauncher, BrowserProcess, PageDriver},
    error::BrowserError,
    types::PoolConfig,
};

const CLEAR_STORAGE_JS: &str =
    "(() => { try { localStorage.clear(); sessionStorage.clear(); } catch (e) {} return true; })()";

/// Launches host Chrome/Chromium processes.
pub struct ChromiumLauncher {
    config: PoolConfig,
}

impl ChromiumLauncher {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    fn viewport(&self) -> Viewport {
        Viewport {
            width: self.config.viewport_width,
            height: self.config.viewport_height,
            device_scale_factor: Some(self.config.device_scale_factor),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, browser_id: &str) -> Result<Box<dyn BrowserProcess>, BrowserError> {
        let detection = crate::detect::detect_browser(self.config.chrome_path.as_deref());
        let Some(executable) = detection.path else {
            return Err(BrowserError::LaunchFailed(format!(
                "Chrome/Chromium not found. {}",
                detection.install_hint
            )));
        };

        let mut builder = CdpBrowserConfig::builder()
            .chrome_executable(executable)
            .viewport(self.viewport())
            .request_timeout(Duration::from_millis(self.config.navigation_timeout_ms));

        // chromiumoxide runs headless unless asked for a window
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref ua) = self.config.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }
        builder = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox");

        let cdp_config = builder.build().map_err(|e| {
            BrowserError::LaunchFailed(format!("failed to build browser config: {e}"))
        })?;

        let (browser, mut handler) = Browser::launch(cdp_config).await.map_err(|e| {
            let hint = crate::detect::install_instructions();
            BrowserError::LaunchFailed(format!("browser launch failed: {e}\n\n{hint}"))
        })?;

        let id = browser_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(browser_id = id, error = %e, "browser handler error");
                }
            }
            debug!(browser_id = id, "browser event handler exited");
        });

        info!(
            browser_id,
            headless = self.config.headless,
            viewport_width = self.config.viewport_width,
            viewport_height = self.config.viewport_height,
            "launched chromium"
        );

        Ok(Box::new(ChromiumProcess {
            browser: Arc::new(browser),
            config: self.config.clone(),
        }))
    }
}

struct ChromiumProcess {
    browser: Arc<Browser>,
    config: PoolConfig,
}

impl ChromiumProcess {
    async fn open_context(&self, proxy: &str) -> Result<BrowserContextId, BrowserError> {
        let mut params = CreateBrowserContextParams::default();
        params.proxy_server = Some(proxy.to_string());
        params.dispose_on_detach = Some(true);
        let resp = self.browser.execute(params).await?;
        Ok(resp.result.browser_context_id)
    }

    async fn configure_page(&self, page: &Page) -> Result<(), BrowserError> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(self.config.viewport_width)
            .height(self.config.viewport_height)
            .device_scale_factor(self.config.device_scale_factor)
            .mobile(false)
            .build()
            .map_err(BrowserError::Cdp)?;
        page.execute(metrics).await?;

        if let Some(ref ua) = self.config.user_agent {
            page.execute(SetUserAgentOverrideParams::new(ua.clone()))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserProcess for ChromiumProcess {
    async fn new_page(&self, proxy: Option<&str>) -> Result<Arc<dyn PageDriver>, BrowserError> {
        let mut target = CreateTargetParams::new("about:blank");
        let context = match proxy {
            Some(server) => {
                let ctx = self.open_context(server).await?;
                target.browser_context_id = Some(ctx.clone());
                Some(ctx)
            },
            None => None,
        };

        let page = self
            .browser
            .new_page(target)
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("failed to open page: {e}")))?;

        if let Err(e) = self.configure_page(&page).await {
            warn!(error = %e, "failed to apply page viewport or user agent");
        }

        Ok(Arc::new(ChromiumPage {
            page,
            browser: Arc::clone(&self.browser),
            context,
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let pages = self.browser.pages().await?;
        for page in pages {
            let _ = page.close().await;
        }
        // The child process is killed when the last Browser reference drops.
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
    browser: Arc<Browser>,
    context: Option<BrowserContextId>,
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn url(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.page.url().await?)
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self.page.content().await?)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::JsEvalFailed(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::JsEvalFailed(format!("{e:?}")))
    }

    async fn capture_snapshot(
        &self,
        computed_styles: &[&str],
    ) -> Result<serde_json::Value, BrowserError> {
        let mut params =
            CaptureSnapshotParams::new(computed_styles.iter().map(|s| s.to_string()).collect());
        params.include_paint_order = Some(true);
        params.include_dom_rects = Some(true);
        let resp = self.page.execute(params).await?;
        serde_json::to_value(resp.result).map_err(|e| BrowserError::Cdp(e.to_string()))
    }

    async fn clear_storage(&self) -> Result<(), BrowserError> {
        self.evaluate(CLEAR_STORAGE_JS).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.page.clone().close().await?;
        if let Some(ref ctx) = self.context {
            self.browser
                .execute(DisposeBrowserContextParams::new(ctx.clone()))
                .await?;
        }
        Ok(())
    }
}
