//! Browser engine lifecycle.

use crate::error::{BrowserError, Result};
use crate::page::CdpPage;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt;
use tokio::task::JoinHandle;

/// Owns the Chromium process for the duration of a run.
pub struct BrowserEngine {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserEngine {
    /// Launch Chromium with anti-automation flags.
    ///
    /// # Errors
    /// Returns error if the browser binary cannot be launched.
    pub async fn launch(headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Chromium)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;

        // Drain the CDP event stream for the lifetime of the browser
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        tracing::info!("Browser launched (headless: {headless})");
        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Open a fresh page with the stealth script and watchers attached.
    ///
    /// # Errors
    /// Returns error if the page cannot be created.
    pub async fn new_page(&self) -> Result<CdpPage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;
        CdpPage::attach(page).await
    }

    /// Close the browser gracefully.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Browser close error (non-critical): {e}");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        tracing::info!("Browser closed");
    }
}
