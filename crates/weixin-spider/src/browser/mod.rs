//! Page driver abstraction over the headless browser.
//!
//! The loader only needs a handful of page operations, so they are kept
//! behind [`PageDriver`]. The Chromium implementation lives in
//! [`chromium`]; tests drive the loader with scripted fakes.

pub mod chromium;

use async_trait::async_trait;

use crate::types::SpiderResult;

pub use chromium::{find_system_chromium, ChromiumSession};

const FIND_ALL_SCRIPT: &str = r#"(function(sel) {
    try {
        return Array.from(document.querySelectorAll(sel)).map(function(e) { return e.outerHTML; });
    } catch (e) {
        return [];
    }
})"#;

/// A single browser tab the loader can drive.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to a URL and wait for the document to load.
    async fn navigate(&mut self, url: &str) -> SpiderResult<()>;
    /// Run a script in the page and return its JSON result.
    async fn evaluate(&mut self, script: &str) -> SpiderResult<serde_json::Value>;
    /// Whether at least one element matches `selector`.
    async fn element_exists(&mut self, selector: &str) -> SpiderResult<bool>;
    /// Serialized markup of the live DOM.
    async fn page_source(&mut self) -> SpiderResult<String>;
    /// The URL the tab is currently showing.
    async fn current_url(&mut self) -> SpiderResult<String>;
    /// Whether the underlying browser still answers.
    async fn is_alive(&mut self) -> bool;
    /// Release the browser. Safe to call more than once.
    async fn close(&mut self) -> SpiderResult<()>;

    /// First selector in `selectors` that matches an element.
    ///
    /// Lookup errors count as "not found".
    async fn first_present(&mut self, selectors: &[&str]) -> Option<String> {
        for selector in selectors {
            match self.element_exists(selector).await {
                Ok(true) => return Some((*selector).to_string()),
                Ok(false) => {}
                Err(e) => tracing::debug!("Selector lookup {selector} failed: {e}"),
            }
        }
        None
    }

    /// Outer markup of every element matching `selector`, in document order.
    async fn find_all(&mut self, selector: &str) -> SpiderResult<Vec<String>> {
        let quoted = serde_json::to_string(selector)?;
        let value = self.evaluate(&format!("{FIND_ALL_SCRIPT}({quoted})")).await?;
        Ok(match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        })
    }
}
