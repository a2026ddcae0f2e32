//! Scripted in-memory [`PageDriver`] for tests.
//!
//! No browser involved: observations are queued JSON payloads, evaluation
//! results are matched by script substring, and clicks/fills mutate simple
//! in-memory state. Agent and executor tests drive whole scenarios through
//! this fake.

use crate::error::{BrowserError, Result};
use crate::page::PageDriver;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Side effect attached to a click in a fake scenario.
#[derive(Debug, Clone, Default)]
pub struct ClickEffect {
    /// Navigate to this URL after the click
    pub new_url: Option<String>,
    /// Flip the network-success latch after the click
    pub network_success: bool,
}

/// A scripted page driver.
#[derive(Default)]
pub struct FakePage {
    url: Mutex<String>,
    title: Mutex<String>,
    content: Mutex<String>,
    observations: Mutex<VecDeque<Value>>,
    last_observation: Mutex<Option<Value>>,
    eval_overrides: Mutex<Vec<(String, Value)>>,
    attached: Mutex<HashSet<String>>,
    visible: Mutex<HashSet<String>>,
    checked: Mutex<HashSet<String>>,
    values: Mutex<HashMap<String, String>>,
    fill_rewrites: Mutex<HashMap<String, String>>,
    clicks: Mutex<Vec<String>>,
    click_effects: Mutex<HashMap<String, ClickEffect>>,
    network_success: AtomicBool,
}

impl FakePage {
    /// Empty fake at the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let page = Self::default();
        *page.url.lock().expect("url lock") = url.into();
        page
    }

    /// Queue an observation payload (raw observation-script JSON). The last
    /// queued payload repeats once the queue drains.
    pub fn push_observation(&self, value: Value) {
        self.observations
            .lock()
            .expect("observations lock")
            .push_back(value);
    }

    /// Respond to any evaluated script containing `needle` with `value`.
    pub fn stub_eval(&self, needle: impl Into<String>, value: Value) {
        self.eval_overrides
            .lock()
            .expect("overrides lock")
            .push((needle.into(), value));
    }

    /// Make a selector attached and visible.
    pub fn add_element(&self, selector: impl Into<String>) {
        let selector = selector.into();
        self.attached
            .lock()
            .expect("attached lock")
            .insert(selector.clone());
        self.visible.lock().expect("visible lock").insert(selector);
    }

    /// Make a selector attached but invisible.
    pub fn add_hidden_element(&self, selector: impl Into<String>) {
        self.attached
            .lock()
            .expect("attached lock")
            .insert(selector.into());
    }

    /// Set the page content returned by [`PageDriver::content`].
    pub fn set_content(&self, html: impl Into<String>) {
        *self.content.lock().expect("content lock") = html.into();
    }

    /// Set the page title.
    pub fn set_title(&self, title: impl Into<String>) {
        *self.title.lock().expect("title lock") = title.into();
    }

    /// Set the current URL.
    pub fn set_url(&self, url: impl Into<String>) {
        *self.url.lock().expect("url lock") = url.into();
    }

    /// Attach a side effect to clicks on the given selector.
    pub fn on_click(&self, selector: impl Into<String>, effect: ClickEffect) {
        self.click_effects
            .lock()
            .expect("effects lock")
            .insert(selector.into(), effect);
    }

    /// Rewrite the read-back value of a fill (input-mask simulation).
    pub fn rewrite_fill(&self, selector: impl Into<String>, value: impl Into<String>) {
        self.fill_rewrites
            .lock()
            .expect("rewrites lock")
            .insert(selector.into(), value.into());
    }

    /// Selectors clicked so far, in order.
    #[must_use]
    pub fn clicked(&self) -> Vec<String> {
        self.clicks.lock().expect("clicks lock").clone()
    }

    /// Values filled so far, by selector.
    #[must_use]
    pub fn filled(&self) -> HashMap<String, String> {
        self.values.lock().expect("values lock").clone()
    }

    fn apply_click(&self, selector: &str) {
        self.clicks
            .lock()
            .expect("clicks lock")
            .push(selector.to_string());
        let effect = self
            .click_effects
            .lock()
            .expect("effects lock")
            .get(selector)
            .cloned();
        if let Some(effect) = effect {
            if let Some(new_url) = effect.new_url {
                *self.url.lock().expect("url lock") = new_url;
            }
            if effect.network_success {
                self.network_success.store(true, Ordering::SeqCst);
            }
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str, _deadline: Duration) -> Result<()> {
        *self.url.lock().expect("url lock") = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().expect("url lock").clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.title.lock().expect("title lock").clone())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.content.lock().expect("content lock").clone())
    }

    async fn eval_json(&self, script: &str) -> Result<Value> {
        // The observation script is recognised by its result marker
        if script.contains("simplifiedHtml") {
            let mut queue = self.observations.lock().expect("observations lock");
            if let Some(value) = queue.pop_front() {
                *self.last_observation.lock().expect("last lock") = Some(value.clone());
                return Ok(value);
            }
            if let Some(value) = self.last_observation.lock().expect("last lock").clone() {
                return Ok(value);
            }
            return Ok(Value::Null);
        }

        let overrides = self.eval_overrides.lock().expect("overrides lock");
        for (needle, value) in overrides.iter() {
            if script.contains(needle.as_str()) {
                return Ok(value.clone());
            }
        }
        drop(overrides);

        if script.contains("document.readyState") {
            return Ok(Value::String("complete".to_string()));
        }
        if script.contains("querySelectorAll('form').length") {
            return Ok(Value::Number(0.into()));
        }
        if script.contains("innerText.length") {
            return Ok(Value::Number(1000.into()));
        }
        if script.contains("performance.getEntriesByType") {
            return Ok(Value::Bool(true));
        }
        Ok(Value::Null)
    }

    async fn screenshot_png(&self, _full_page: bool) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn wait_for_attached(&self, selector: &str, _deadline: Duration) -> Result<bool> {
        Ok(self.attached.lock().expect("attached lock").contains(selector))
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.visible.lock().expect("visible lock").contains(selector))
    }

    async fn is_checked(&self, selector: &str) -> Result<bool> {
        Ok(self.checked.lock().expect("checked lock").contains(selector))
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<bool> {
        if !self.attached.lock().expect("attached lock").contains(selector) {
            return Err(BrowserError::SelectorNotFound(selector.to_string()));
        }
        let mut set = self.checked.lock().expect("checked lock");
        if checked {
            set.insert(selector.to_string());
        } else {
            set.remove(selector);
        }
        Ok(checked)
    }

    async fn fill_text(&self, selector: &str, value: &str) -> Result<String> {
        if !self.attached.lock().expect("attached lock").contains(selector) {
            return Err(BrowserError::SelectorNotFound(selector.to_string()));
        }
        let stored = self
            .fill_rewrites
            .lock()
            .expect("rewrites lock")
            .get(selector)
            .cloned()
            .unwrap_or_else(|| value.to_string());
        self.values
            .lock()
            .expect("values lock")
            .insert(selector.to_string(), stored.clone());
        Ok(stored)
    }

    async fn input_value(&self, selector: &str) -> Result<String> {
        self.values
            .lock()
            .expect("values lock")
            .get(selector)
            .cloned()
            .ok_or_else(|| BrowserError::SelectorNotFound(selector.to_string()))
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<bool> {
        if !self.attached.lock().expect("attached lock").contains(selector) {
            return Ok(false);
        }
        self.values
            .lock()
            .expect("values lock")
            .insert(selector.to_string(), value.to_string());
        Ok(true)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if !self.attached.lock().expect("attached lock").contains(selector) {
            return Err(BrowserError::SelectorNotFound(selector.to_string()));
        }
        if !self.visible.lock().expect("visible lock").contains(selector) {
            return Err(BrowserError::ElementHidden(selector.to_string()));
        }
        self.apply_click(selector);
        Ok(())
    }

    async fn click_text(&self, tag: &str, text: &str) -> Result<()> {
        let key = format!("{tag}:has-text('{text}')");
        let known = self
            .attached
            .lock()
            .expect("attached lock")
            .contains(key.as_str());
        if known {
            self.apply_click(&key);
            Ok(())
        } else {
            Err(BrowserError::SelectorNotFound(key))
        }
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        self.apply_click(&format!("@{x},{y}"));
        Ok(())
    }

    async fn press_escape(&self) -> Result<()> {
        Ok(())
    }

    async fn scroll_viewport(&self) -> Result<()> {
        Ok(())
    }

    async fn wait_dom_content_loaded(&self, _deadline: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn wait_network_idle(&self, _deadline: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn body_text_len(&self) -> Result<usize> {
        Ok(1000)
    }

    fn network_success_seen(&self) -> bool {
        self.network_success.load(Ordering::SeqCst)
    }

    fn reset_network_success(&self) {
        self.network_success.store(false, Ordering::SeqCst);
    }
}
