//! The page driver seam.
//!
//! [`PageDriver`] is the surface the agent consumes: navigation, evaluation,
//! element interaction and load-state waits. The production implementation
//! [`CdpPage`] drives a chromiumoxide page; tests substitute scripted fakes.

use crate::error::{BrowserError, Result};
use crate::scripts;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{EventRequestWillBeSent, EventResponseReceived};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventJavascriptDialogOpening,
    HandleJavaScriptDialogParams,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// Parsed reason a navigation failed.
#[must_use]
pub fn parse_navigation_error(error: &str) -> String {
    if error.contains("ERR_CERT") {
        "SSL certificate error".to_string()
    } else if error.contains("ERR_NAME_NOT_RESOLVED") {
        "Domain not found".to_string()
    } else if error.contains("ERR_CONNECTION_REFUSED") {
        "Connection refused".to_string()
    } else if error.contains("ERR_CONNECTION_TIMED_OUT") || error.contains("Timeout") {
        "Connection timed out".to_string()
    } else if error.contains("ERR_CONNECTION_RESET") {
        "Connection reset".to_string()
    } else if error.contains("ERR_TOO_MANY_REDIRECTS") {
        "Too many redirects".to_string()
    } else if error.contains("ERR_EMPTY_RESPONSE") {
        "Empty response from server".to_string()
    } else if error.contains("ERR_ABORTED") {
        "Page load aborted".to_string()
    } else if error.contains("has been closed") {
        "Browser was closed".to_string()
    } else {
        let mut short: String = error.chars().take(100).collect();
        short.insert_str(0, "Navigation failed: ");
        short
    }
}

/// Async surface the agent drives a page through.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL. Errors carry the parsed load-failure reason.
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<()>;

    /// Current URL.
    async fn current_url(&self) -> Result<String>;

    /// Document title.
    async fn title(&self) -> Result<String>;

    /// Full page HTML.
    async fn content(&self) -> Result<String>;

    /// Evaluate a script, returning its JSON value (null for undefined).
    async fn eval_json(&self, script: &str) -> Result<Value>;

    /// PNG screenshot, full page when requested.
    async fn screenshot_png(&self, full_page: bool) -> Result<Vec<u8>>;

    /// Poll until the selector is attached (not necessarily visible).
    /// Returns false on deadline.
    async fn wait_for_attached(&self, selector: &str, deadline: Duration) -> Result<bool>;

    /// Whether the first match is visible.
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Checked state of the first match.
    async fn is_checked(&self, selector: &str) -> Result<bool>;

    /// Toggle a visible checkbox/radio with a trusted click. Returns the
    /// final checked state.
    async fn set_checked(&self, selector: &str, checked: bool) -> Result<bool>;

    /// Fill an input via the native setter. Returns the value read back.
    async fn fill_text(&self, selector: &str, value: &str) -> Result<String>;

    /// Current value of an input.
    async fn input_value(&self, selector: &str) -> Result<String>;

    /// Select a dropdown option by value, then by label. True on success.
    async fn select_option(&self, selector: &str, value: &str) -> Result<bool>;

    /// Scroll into view and click the first visible match (trusted click).
    async fn click(&self, selector: &str) -> Result<()>;

    /// Click the first visible element of `tag` whose text contains `text`.
    async fn click_text(&self, tag: &str, text: &str) -> Result<()>;

    /// Trusted click at viewport coordinates.
    async fn click_at(&self, x: f64, y: f64) -> Result<()>;

    /// Press the Escape key.
    async fn press_escape(&self) -> Result<()>;

    /// Scroll one viewport (or to the bottom when near it).
    async fn scroll_viewport(&self) -> Result<()>;

    /// Wait for `document.readyState` to reach interactive/complete.
    /// Returns false on deadline.
    async fn wait_dom_content_loaded(&self, deadline: Duration) -> Result<bool>;

    /// Wait until no resource has finished loading for ~500 ms.
    /// Returns false on deadline.
    async fn wait_network_idle(&self, deadline: Duration) -> Result<bool>;

    /// Length of `document.body.innerText`.
    async fn body_text_len(&self) -> Result<usize>;

    /// Whether a POST/PUT response with 2xx status has been observed since
    /// the last reset.
    fn network_success_seen(&self) -> bool;

    /// Clear the network-success latch (called before a submit click).
    fn reset_network_success(&self);
}

/// Production page driver over a chromiumoxide [`Page`].
pub struct CdpPage {
    page: Page,
    network_success: Arc<AtomicBool>,
}

impl CdpPage {
    /// Wrap a raw page: install the stealth init script, auto-accept
    /// dialogs and start the network watcher.
    ///
    /// # Errors
    /// Returns error if the init script cannot be installed.
    pub async fn attach(page: Page) -> Result<Self> {
        let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(scripts::STEALTH_INIT)
            .build()
            .map_err(BrowserError::Chromium)?;
        page.execute(stealth)
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;

        let network_success = Arc::new(AtomicBool::new(false));
        Self::spawn_network_watcher(&page, Arc::clone(&network_success)).await?;
        Self::spawn_dialog_handler(&page).await?;

        Ok(Self {
            page,
            network_success,
        })
    }

    /// The underlying chromiumoxide page.
    #[must_use]
    pub fn inner(&self) -> &Page {
        &self.page
    }

    // Correlates request methods with response statuses so the success
    // oracle can require a 2xx POST/PUT after submit.
    async fn spawn_network_watcher(page: &Page, flag: Arc<AtomicBool>) -> Result<()> {
        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;

        let write_ids: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let read_ids = Arc::clone(&write_ids);

        tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let method = event.request.method.to_ascii_uppercase();
                if method == "POST" || method == "PUT" {
                    let key = serde_json::to_string(&event.request_id).unwrap_or_default();
                    if let Ok(mut ids) = write_ids.lock() {
                        ids.insert(key);
                        // Keep the set bounded across long sessions
                        if ids.len() > 512 {
                            ids.clear();
                        }
                    }
                }
            }
        });
        tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let status = event.response.status;
                if (200..300).contains(&status) {
                    let key = serde_json::to_string(&event.request_id).unwrap_or_default();
                    let matched = read_ids.lock().map(|ids| ids.contains(&key)).unwrap_or(false);
                    if matched {
                        tracing::debug!("Write request completed with status {status}");
                        flag.store(true, Ordering::SeqCst);
                    }
                }
            }
        });
        Ok(())
    }

    async fn spawn_dialog_handler(page: &Page) -> Result<()> {
        let mut dialogs = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;
        let page_clone = page.clone();
        tokio::spawn(async move {
            while let Some(dialog) = dialogs.next().await {
                tracing::debug!("Auto-accepting dialog: {}", dialog.message);
                let params = HandleJavaScriptDialogParams::builder().accept(true).build();
                if let Ok(params) = params {
                    let _ = page_clone.execute(params).await;
                }
            }
        });
        Ok(())
    }

    fn map_eval_error(error: chromiumoxide::error::CdpError) -> BrowserError {
        let text = error.to_string();
        if text.contains("has been closed")
            || text.contains("context was destroyed")
            || text.contains("Session with given id not found")
        {
            BrowserError::PageGone(text)
        } else {
            BrowserError::Evaluation(text)
        }
    }

    async fn eval_bool(&self, script: &str) -> Result<bool> {
        Ok(self.eval_json(script).await?.as_bool().unwrap_or(false))
    }

    async fn mouse_event(&self, kind: DispatchMouseEventType, x: f64, y: f64) -> Result<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(BrowserError::Chromium)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<()> {
        tracing::debug!("Navigating to {url}");
        match timeout(deadline, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                // Let the initial render settle before observation
                let _ = self
                    .wait_dom_content_loaded(Duration::from_secs(10))
                    .await;
                sleep(Duration::from_secs(2)).await;
                Ok(())
            }
            Ok(Err(e)) => Err(BrowserError::Navigation(parse_navigation_error(
                &e.to_string(),
            ))),
            Err(_) => Err(BrowserError::Navigation("Connection timed out".to_string())),
        }
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map(|u| u.unwrap_or_default())
            .map_err(Self::map_eval_error)
    }

    async fn title(&self) -> Result<String> {
        self.page
            .get_title()
            .await
            .map(|t| t.unwrap_or_default())
            .map_err(Self::map_eval_error)
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(Self::map_eval_error)
    }

    async fn eval_json(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(Self::map_eval_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn screenshot_png(&self, full_page: bool) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder().full_page(full_page).build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))
    }

    async fn wait_for_attached(&self, selector: &str, deadline: Duration) -> Result<bool> {
        let probe = format!(
            "document.querySelector({}) !== null",
            scripts::js_string(selector)
        );
        let started = Instant::now();
        loop {
            if self.eval_bool(&probe).await? {
                return Ok(true);
            }
            if started.elapsed() >= deadline {
                return Ok(false);
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let script = format!(
            r"(() => {{
                const el = document.querySelector({});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                return style.display !== 'none' && style.visibility !== 'hidden' &&
                       parseFloat(style.opacity) > 0 && rect.width > 0 && rect.height > 0;
            }})()",
            scripts::js_string(selector)
        );
        self.eval_bool(&script).await
    }

    async fn is_checked(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? !!el.checked : false; }})()",
            scripts::js_string(selector)
        );
        self.eval_bool(&script).await
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<bool> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::SelectorNotFound(e.to_string()))?;
        let _ = element.scroll_into_view().await;
        if self.is_checked(selector).await? != checked {
            element
                .click()
                .await
                .map_err(|e| BrowserError::Chromium(e.to_string()))?;
            sleep(Duration::from_millis(300)).await;
        }
        self.is_checked(selector).await
    }

    async fn fill_text(&self, selector: &str, value: &str) -> Result<String> {
        // A trusted click first, so focus handlers run
        if let Ok(element) = self.page.find_element(selector).await {
            let _ = element.scroll_into_view().await;
            let _ = element.click().await;
            sleep(Duration::from_millis(300)).await;
        }
        let script = scripts::NATIVE_FILL
            .replace("__SELECTOR__", &scripts::js_string(selector))
            .replace("__VALUE__", &scripts::js_string(value));
        match self.eval_json(&script).await? {
            Value::String(read_back) => Ok(read_back),
            Value::Null => Err(BrowserError::SelectorNotFound(selector.to_string())),
            other => Ok(other.to_string()),
        }
    }

    async fn input_value(&self, selector: &str) -> Result<String> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? String(el.value || '') : null; }})()",
            scripts::js_string(selector)
        );
        match self.eval_json(&script).await? {
            Value::String(value) => Ok(value),
            _ => Err(BrowserError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<bool> {
        let script = scripts::SELECT_OPTION
            .replace("__SELECTOR__", &scripts::js_string(selector))
            .replace("__VALUE__", &scripts::js_string(value));
        self.eval_bool(&script).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::SelectorNotFound(e.to_string()))?;
        let _ = element.scroll_into_view().await;
        if !self.is_visible(selector).await? {
            return Err(BrowserError::ElementHidden(selector.to_string()));
        }
        element
            .click()
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;
        Ok(())
    }

    async fn click_text(&self, tag: &str, text: &str) -> Result<()> {
        let script = scripts::MARK_TEXT_TARGET
            .replace("__TAG__", &scripts::js_string(tag))
            .replace("__TEXT__", &scripts::js_string(text));
        if !self.eval_bool(&script).await? {
            return Err(BrowserError::SelectorNotFound(format!(
                "{tag} with text '{text}'"
            )));
        }
        let result = self.click("[data-optin-target=\"1\"]").await;
        let _ = self
            .eval_json("document.querySelectorAll('[data-optin-target]').forEach(el => el.removeAttribute('data-optin-target'))")
            .await;
        result
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        self.mouse_event(DispatchMouseEventType::MousePressed, x, y)
            .await?;
        self.mouse_event(DispatchMouseEventType::MouseReleased, x, y)
            .await
    }

    async fn press_escape(&self) -> Result<()> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key("Escape")
                .build()
                .map_err(BrowserError::Chromium)?;
            self.page
                .execute(params)
                .await
                .map_err(|e| BrowserError::Chromium(e.to_string()))?;
        }
        Ok(())
    }

    async fn scroll_viewport(&self) -> Result<()> {
        self.eval_json(scripts::SCROLL_STEP).await?;
        Ok(())
    }

    async fn wait_dom_content_loaded(&self, deadline: Duration) -> Result<bool> {
        let started = Instant::now();
        loop {
            let ready = self
                .eval_json("document.readyState")
                .await?
                .as_str()
                .map(|s| s == "interactive" || s == "complete")
                .unwrap_or(false);
            if ready {
                return Ok(true);
            }
            if started.elapsed() >= deadline {
                return Ok(false);
            }
            sleep(Duration::from_millis(200)).await;
        }
    }

    async fn wait_network_idle(&self, deadline: Duration) -> Result<bool> {
        const QUIET_PROBE: &str = r"(() => {
            const entries = performance.getEntriesByType('resource');
            if (entries.length === 0) return true;
            const last = entries[entries.length - 1];
            const end = last.responseEnd || last.startTime;
            return (performance.now() - end) > 500;
        })()";
        let started = Instant::now();
        loop {
            if self.eval_bool(QUIET_PROBE).await? {
                return Ok(true);
            }
            if started.elapsed() >= deadline {
                return Ok(false);
            }
            sleep(Duration::from_millis(300)).await;
        }
    }

    async fn body_text_len(&self) -> Result<usize> {
        let value = self
            .eval_json("document.body ? document.body.innerText.length : 0")
            .await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    fn network_success_seen(&self) -> bool {
        self.network_success.load(Ordering::SeqCst)
    }

    fn reset_network_success(&self) {
        self.network_success.store(false, Ordering::SeqCst);
    }
}

/// Post-click navigation discipline.
///
/// After any click: if the URL changed, await DOM-content-loaded (≤ 10 s)
/// then network-idle (≤ 10 s), sleeping extra when the network never quiets
/// or the body looks empty. CTA clicks without a URL change get a shorter
/// settle; plain clicks a fixed pause.
pub async fn settle_after_click(driver: &dyn PageDriver, url_before: &str, is_cta: bool) {
    sleep(Duration::from_millis(500)).await;

    let url_after = driver.current_url().await.unwrap_or_default();
    if url_after != url_before && !url_after.is_empty() {
        tracing::debug!("Navigation after click: {url_before} -> {url_after}");
        let _ = driver.wait_dom_content_loaded(Duration::from_secs(10)).await;
        let idle = driver
            .wait_network_idle(Duration::from_secs(10))
            .await
            .unwrap_or(false);
        if !idle {
            sleep(Duration::from_secs(4)).await;
            let body_len = driver.body_text_len().await.unwrap_or(0);
            if body_len < 200 {
                sleep(Duration::from_secs(3)).await;
            }
        }
        sleep(Duration::from_secs(2)).await;
    } else if is_cta {
        sleep(Duration::from_secs(1)).await;
        let idle = driver
            .wait_network_idle(Duration::from_secs(5))
            .await
            .unwrap_or(false);
        if !idle {
            sleep(Duration::from_secs(3)).await;
        }
        sleep(Duration::from_millis(1500)).await;
    } else {
        sleep(Duration::from_millis(1500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_navigation_errors() {
        assert_eq!(
            parse_navigation_error("net::ERR_NAME_NOT_RESOLVED at https://x"),
            "Domain not found"
        );
        assert_eq!(
            parse_navigation_error("net::ERR_CERT_AUTHORITY_INVALID"),
            "SSL certificate error"
        );
        assert_eq!(
            parse_navigation_error("net::ERR_CONNECTION_REFUSED"),
            "Connection refused"
        );
        assert_eq!(
            parse_navigation_error("net::ERR_TOO_MANY_REDIRECTS"),
            "Too many redirects"
        );
        assert_eq!(
            parse_navigation_error("net::ERR_EMPTY_RESPONSE"),
            "Empty response from server"
        );
        assert!(parse_navigation_error("something odd").starts_with("Navigation failed:"));
    }
}
