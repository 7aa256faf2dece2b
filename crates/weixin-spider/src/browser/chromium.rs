//! Chromium-backed page driver using chromiumoxide.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig, BrowserConfigBuilder};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::PageDriver;
use crate::config::{SpiderConfig, USER_AGENT};
use crate::types::{SpiderError, SpiderResult};

/// Env var pointing at a specific Chrome/Chromium binary.
pub const CHROME_PATH_ENV: &str = "WEIXIN_SPIDER_CHROME";

const WINDOW_WIDTH: u32 = 1920;
const WINDOW_HEIGHT: u32 = 1080;

/// Desktop-sized page viewport. chromiumoxide emulates 800x600 otherwise.
fn desktop_viewport() -> Viewport {
    Viewport {
        width: WINDOW_WIDTH,
        height: WINDOW_HEIGHT,
        ..Viewport::default()
    }
}

/// Scripts installed before any page script runs, hiding the most obvious
/// automation markers and suppressing popups.
const STEALTH_SCRIPTS: &[&str] = &[
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });",
    "Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });",
    "Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en'] });",
    "window.chrome = window.chrome || { runtime: {} };",
    "window.open = function() { return null; };",
];

const ELEMENT_EXISTS_SCRIPT: &str = r#"(function(sel) {
    try { return document.querySelector(sel) !== null; } catch (e) { return false; }
})"#;

/// Find an installed Chrome or Chromium binary.
///
/// Checks the env override, then PATH, then common install locations.
pub fn find_system_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROME_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("{CHROME_PATH_ENV}={p} does not exist, ignoring");
    }

    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    let common: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &["/usr/bin/google-chrome", "/usr/bin/chromium", "/snap/bin/chromium"]
    };
    common.iter().map(PathBuf::from).find(|p| p.exists())
}

/// Find a browser provisioned under `~/.weixin-spider/chromium/`.
pub fn find_provisioned_chromium() -> Option<PathBuf> {
    let root = dirs::home_dir()?.join(".weixin-spider/chromium");
    let candidates = if cfg!(target_os = "macos") {
        let app = "Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing";
        vec![
            root.join("chrome-mac-arm64").join(app),
            root.join("chrome-mac-x64").join(app),
            root.join("chrome"),
        ]
    } else {
        vec![root.join("chrome-linux64/chrome"), root.join("chrome")]
    };
    candidates.into_iter().find(|c| c.exists())
}

/// A launched browser with one tab.
pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    navigation_timeout: std::time::Duration,
}

impl ChromiumSession {
    /// Launch a browser, trying each strategy in order until one starts.
    ///
    /// Strategies: installed binary, provisioned binary, chromiumoxide's
    /// own lookup. Fails with [`SpiderError::DriverInit`] when none works.
    pub async fn open(config: &SpiderConfig) -> SpiderResult<Self> {
        let strategies: Vec<(&str, Option<PathBuf>)> = vec![
            ("system", find_system_chromium()),
            ("provisioned", find_provisioned_chromium()),
            ("default", None),
        ];

        let mut failures = Vec::new();
        for (label, executable) in strategies {
            if label != "default" && executable.is_none() {
                continue;
            }
            tracing::info!(
                "Launching browser ({label}, headless={}){}",
                config.headless,
                executable
                    .as_ref()
                    .map(|p| format!(" from {}", p.display()))
                    .unwrap_or_default()
            );
            match Self::launch(config, executable).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    tracing::warn!("Browser launch strategy {label} failed: {e}");
                    failures.push(format!("{label}: {e}"));
                }
            }
        }

        Err(SpiderError::DriverInit(failures.join("; ")))
    }

    fn builder(config: &SpiderConfig, executable: Option<PathBuf>) -> BrowserConfigBuilder {
        let mut builder = BrowserConfig::builder()
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .viewport(desktop_viewport());
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        if !config.headless {
            builder = builder.with_head();
        }
        builder
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-notifications")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--lang=zh-CN")
            .arg(format!("--user-agent={USER_AGENT}"))
    }

    async fn launch(config: &SpiderConfig, executable: Option<PathBuf>) -> SpiderResult<Self> {
        let browser_config = Self::builder(config, executable)
            .build()
            .map_err(|e| SpiderError::DriverInit(format!("failed to build browser config: {e}")))?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SpiderError::DriverInit(format!("failed to launch: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match Self::prepare_page(&browser).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                return Err(e);
            }
        };

        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
            navigation_timeout: config.navigation_timeout,
        })
    }

    async fn prepare_page(browser: &Browser) -> SpiderResult<Page> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SpiderError::DriverInit(format!("failed to open tab: {e}")))?;

        page.set_user_agent(SetUserAgentOverrideParams::new(USER_AGENT))
            .await
            .map_err(|e| SpiderError::DriverInit(format!("failed to set user agent: {e}")))?;

        for script in STEALTH_SCRIPTS {
            if let Err(e) = page
                .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(*script))
                .await
            {
                tracing::debug!("Stealth script not installed: {e}");
            }
        }
        Ok(page)
    }

    fn page(&self) -> SpiderResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| SpiderError::Browser("browser session is closed".to_string()))
    }
}

#[async_trait]
impl PageDriver for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> SpiderResult<()> {
        let timeout = self.navigation_timeout;
        let page = self.page()?;
        // The load wait counts against the same deadline as the request.
        let load = async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        };
        match tokio::time::timeout(timeout, load).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SpiderError::Browser(format!("navigation failed: {e}"))),
            Err(_) => Err(SpiderError::Browser(format!(
                "navigation timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn evaluate(&mut self, script: &str) -> SpiderResult<serde_json::Value> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| SpiderError::Browser(format!("JS execution failed: {e}")))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn element_exists(&mut self, selector: &str) -> SpiderResult<bool> {
        let quoted = serde_json::to_string(selector)?;
        let value = self
            .evaluate(&format!("{ELEMENT_EXISTS_SCRIPT}({quoted})"))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn page_source(&mut self) -> SpiderResult<String> {
        self.page()?
            .content()
            .await
            .map_err(|e| SpiderError::Browser(format!("failed to read page source: {e}")))
    }

    async fn current_url(&mut self) -> SpiderResult<String> {
        let url = self
            .page()?
            .url()
            .await
            .map_err(|e| SpiderError::Browser(format!("failed to read URL: {e}")))?;
        Ok(url.unwrap_or_default())
    }

    async fn is_alive(&mut self) -> bool {
        let Ok(page) = self.page() else {
            return false;
        };
        matches!(
            tokio::time::timeout(std::time::Duration::from_secs(5), page.evaluate("1 + 1")).await,
            Ok(Ok(_))
        )
    }

    async fn close(&mut self) -> SpiderResult<()> {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = self.browser.take() {
            tracing::info!("Closing browser");
            if let Err(e) = browser.close().await {
                tracing::debug!("Browser close reported: {e}");
            }
            let _ = browser.wait().await;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_viewport() {
        let viewport = desktop_viewport();
        assert_eq!((viewport.width, viewport.height), (1920, 1080));
        assert!(!viewport.emulating_mobile);
        assert!(!viewport.has_touch);
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_open_navigate_and_close() {
        let mut session = ChromiumSession::open(&SpiderConfig::default())
            .await
            .expect("failed to launch browser");
        session
            .navigate("data:text/html,<h1 id='activity-name'>Hello</h1>")
            .await
            .expect("navigation failed");
        assert!(session.element_exists("#activity-name").await.unwrap());
        assert!(!session.element_exists("#missing").await.unwrap());
        assert_eq!(session.find_all("h1").await.unwrap().len(), 1);
        let width = session.evaluate("window.innerWidth").await.unwrap();
        assert_eq!(width.as_u64(), Some(u64::from(WINDOW_WIDTH)));
        assert!(session.page_source().await.unwrap().contains("Hello"));
        assert!(session.is_alive().await);

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(!session.is_alive().await);
    }
}
