//! Page loading with readiness waits, lazy-content scrolling, and retries.

use std::time::Duration;

use tokio::time::Instant;

use crate::browser::PageDriver;
use crate::config::SpiderConfig;
use crate::extract::extract_article;
use crate::selectors::{READY_FALLBACK, READY_PRIMARY};
use crate::types::{ArticleRecord, AttemptFailure, SpiderError, SpiderResult, CRAWL_TIME_FORMAT};

const SCROLL_HEIGHT_SCRIPT: &str = "document.body ? document.body.scrollHeight : 0";
const SCROLL_BOTTOM_SCRIPT: &str =
    "window.scrollTo(0, document.body ? document.body.scrollHeight : 0)";
const SCROLL_TOP_SCRIPT: &str = "window.scrollTo(0, 0)";

/// Lifecycle of one load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Loading,
    Extracting,
    Succeeded,
    Failed,
}

/// What happened on one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    /// 1-based attempt number.
    pub attempt: u32,
    pub state: AttemptState,
    pub failure: Option<AttemptFailure>,
}

/// Reject anything that is not an article URL under `prefix`.
pub fn validate_article_url(url: &str, prefix: &str) -> SpiderResult<()> {
    if url.starts_with(prefix) {
        Ok(())
    } else {
        Err(SpiderError::Validation(format!(
            "URL must start with {prefix}, got {url}"
        )))
    }
}

/// Drives one browser tab through navigate, wait, scroll, and extract.
pub struct PageLoader<'d, D: PageDriver + ?Sized> {
    driver: &'d mut D,
    config: &'d SpiderConfig,
    attempts: Vec<AttemptReport>,
}

impl<'d, D: PageDriver + ?Sized> PageLoader<'d, D> {
    pub fn new(driver: &'d mut D, config: &'d SpiderConfig) -> Self {
        Self {
            driver,
            config,
            attempts: Vec::new(),
        }
    }

    /// Reports for every attempt made by the last fetch.
    pub fn attempts(&self) -> &[AttemptReport] {
        &self.attempts
    }

    /// Fetch and extract an article, retrying up to `max_attempts` times.
    ///
    /// Attempt failures are logged and retried after the configured
    /// backoff. Only the last failure is returned, wrapped in
    /// [`SpiderError::FetchExhausted`].
    pub async fn fetch_article(
        &mut self,
        url: &str,
        max_attempts: u32,
    ) -> SpiderResult<ArticleRecord> {
        validate_article_url(url, &self.config.url_prefix)?;
        if max_attempts == 0 {
            return Err(SpiderError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        self.attempts.clear();
        let mut last_failure = AttemptFailure::EmptyTitle;

        for attempt in 1..=max_attempts {
            tracing::info!("Fetching {url} (attempt {attempt}/{max_attempts})");
            self.attempts.push(AttemptReport {
                attempt,
                state: AttemptState::Pending,
                failure: None,
            });

            match self.attempt_once(url).await {
                Ok(record) => {
                    self.set_state(AttemptState::Succeeded, None);
                    tracing::info!("Fetched \"{}\" on attempt {attempt}", record.title);
                    return Ok(record);
                }
                Err(failure) => {
                    tracing::warn!("Attempt {attempt}/{max_attempts} for {url} failed: {failure}");
                    self.set_state(AttemptState::Failed, Some(failure.clone()));
                    last_failure = failure;
                }
            }

            if attempt < max_attempts && !self.config.retry_backoff.is_zero() {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        Err(SpiderError::FetchExhausted {
            url: url.to_string(),
            attempts: max_attempts,
            last_failure,
        })
    }

    fn set_state(&mut self, state: AttemptState, failure: Option<AttemptFailure>) {
        if let Some(report) = self.attempts.last_mut() {
            report.state = state;
            if failure.is_some() {
                report.failure = failure;
            }
        }
    }

    async fn attempt_once(&mut self, url: &str) -> Result<ArticleRecord, AttemptFailure> {
        self.set_state(AttemptState::Loading, None);
        self.driver
            .navigate(url)
            .await
            .map_err(|e| AttemptFailure::Navigation(e.to_string()))?;

        self.wait_until_ready().await?;

        self.set_state(AttemptState::Extracting, None);
        let limit = self.config.extraction_timeout;
        let record = match tokio::time::timeout(limit, self.scroll_and_snapshot()).await {
            Ok(result) => result?,
            Err(_) => return Err(AttemptFailure::ExtractionTimeout(limit)),
        };

        if record.title.trim().is_empty()
            || (self.config.sentinel_title_is_failure && record.has_sentinel_title())
        {
            return Err(AttemptFailure::EmptyTitle);
        }
        Ok(record)
    }

    /// Poll until the primary title element, or any fallback, is present.
    ///
    /// The whole wait, including slow element lookups, is bounded by
    /// `readiness_timeout`. A zero timeout still checks the page once.
    async fn wait_until_ready(&mut self) -> Result<(), AttemptFailure> {
        let timeout = self.config.readiness_timeout;
        let poll = self.config.readiness_poll;
        let deadline = Instant::now() + timeout;

        let polling = async {
            loop {
                if self.driver.first_present(&[READY_PRIMARY]).await.is_some() {
                    return true;
                }
                if let Some(found) = self.driver.first_present(READY_FALLBACK).await {
                    tracing::debug!("Primary title missing, page ready via {found}");
                    return true;
                }
                if Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(poll).await;
            }
        };

        match tokio::time::timeout(timeout, polling).await {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(AttemptFailure::ReadinessTimeout(timeout)),
        }
    }

    async fn scroll_and_snapshot(&mut self) -> Result<ArticleRecord, AttemptFailure> {
        self.auto_scroll().await;

        let html = self
            .driver
            .page_source()
            .await
            .map_err(|e| AttemptFailure::Extraction(e.to_string()))?;
        let page_url = self
            .driver
            .current_url()
            .await
            .map_err(|e| AttemptFailure::Extraction(e.to_string()))?;
        let retrieved_at = chrono::Local::now().format(CRAWL_TIME_FORMAT).to_string();

        Ok(extract_article(&html, &page_url, &retrieved_at))
    }

    /// Scroll to the bottom until the document stops growing, then back to
    /// the top. Scroll errors never fail the attempt.
    async fn auto_scroll(&mut self) {
        let mut last_height = self.scroll_height().await;

        for round in 0..self.config.max_scroll_rounds {
            if let Err(e) = self.driver.evaluate(SCROLL_BOTTOM_SCRIPT).await {
                tracing::debug!("Scroll round {round} failed: {e}");
                break;
            }
            pause(self.config.scroll_pause).await;

            let height = self.scroll_height().await;
            if height == last_height {
                break;
            }
            last_height = height;
        }

        if let Err(e) = self.driver.evaluate(SCROLL_TOP_SCRIPT).await {
            tracing::debug!("Scroll to top failed: {e}");
        }
        pause(self.config.settle_pause).await;
    }

    async fn scroll_height(&mut self) -> Option<i64> {
        match self.driver.evaluate(SCROLL_HEIGHT_SCRIPT).await {
            Ok(value) => value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)),
            Err(e) => {
                tracing::debug!("Could not read scroll height: {e}");
                None
            }
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::types::UNKNOWN_TITLE;

    pub const ARTICLE_URL: &str = "https://mp.weixin.qq.com/s/test-article";

    pub const ARTICLE_HTML: &str = r#"<html><body>
        <h1 id="activity-name">测试文章</h1>
        <a id="js_name">作者甲</a>
        <em id="publish_time">2024-05-01</em>
        <div id="js_content"><p>正文内容</p><img data-src="https://img.example/1.png"></div>
    </body></html>"#;

    /// A scripted page: each navigation pops the next outcome.
    #[derive(Default)]
    pub struct ScriptedDriver {
        pub outcomes: VecDeque<Outcome>,
        pub current: Option<Outcome>,
        pub heights: VecDeque<i64>,
        pub navigations: Vec<String>,
        pub scroll_calls: usize,
        pub closed: bool,
        /// Added to every element lookup.
        pub lookup_delay: Duration,
    }

    #[derive(Clone)]
    pub enum Outcome {
        NavigationError,
        NeverReady,
        Page(&'static str),
    }

    impl ScriptedDriver {
        pub fn new(outcomes: Vec<Outcome>) -> Self {
            Self {
                outcomes: outcomes.into(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PageDriver for ScriptedDriver {
        async fn navigate(&mut self, url: &str) -> SpiderResult<()> {
            self.navigations.push(url.to_string());
            let outcome = self.outcomes.pop_front().unwrap_or(Outcome::NeverReady);
            if matches!(outcome, Outcome::NavigationError) {
                self.current = None;
                return Err(SpiderError::Browser("connection reset".to_string()));
            }
            self.current = Some(outcome);
            Ok(())
        }

        async fn evaluate(&mut self, script: &str) -> SpiderResult<Value> {
            if script == SCROLL_HEIGHT_SCRIPT {
                return Ok(json!(self.heights.pop_front().unwrap_or(1000)));
            }
            if script == SCROLL_BOTTOM_SCRIPT {
                self.scroll_calls += 1;
            }
            Ok(Value::Null)
        }

        async fn element_exists(&mut self, selector: &str) -> SpiderResult<bool> {
            if !self.lookup_delay.is_zero() {
                tokio::time::sleep(self.lookup_delay).await;
            }
            match &self.current {
                Some(Outcome::Page(html)) => {
                    let doc = scraper::Html::parse_document(html);
                    let parsed = scraper::Selector::parse(selector)
                        .map_err(|e| SpiderError::Browser(format!("{e:?}")))?;
                    let found = doc.select(&parsed).next().is_some();
                    Ok(found)
                }
                _ => Ok(false),
            }
        }

        async fn page_source(&mut self) -> SpiderResult<String> {
            match &self.current {
                Some(Outcome::Page(html)) => Ok(html.to_string()),
                _ => Ok("<html></html>".to_string()),
            }
        }

        async fn current_url(&mut self) -> SpiderResult<String> {
            Ok(self.navigations.last().cloned().unwrap_or_default())
        }

        async fn is_alive(&mut self) -> bool {
            !self.closed
        }

        async fn close(&mut self) -> SpiderResult<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let mut driver = ScriptedDriver::new(vec![Outcome::Page(ARTICLE_HTML)]);
        let config = SpiderConfig::immediate();
        let mut loader = PageLoader::new(&mut driver, &config);

        let record = loader.fetch_article(ARTICLE_URL, 3).await.unwrap();
        assert_eq!(record.title, "测试文章");
        assert_eq!(record.author, "作者甲");
        assert_eq!(record.source_url, ARTICLE_URL);
        assert_eq!(record.images.len(), 1);
        assert_eq!(loader.attempts().len(), 1);
        assert_eq!(loader.attempts()[0].state, AttemptState::Succeeded);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let mut driver = ScriptedDriver::new(vec![
            Outcome::NavigationError,
            Outcome::NeverReady,
            Outcome::Page(ARTICLE_HTML),
        ]);
        let config = SpiderConfig::immediate();
        let mut loader = PageLoader::new(&mut driver, &config);

        let record = loader.fetch_article(ARTICLE_URL, 3).await.unwrap();
        assert_eq!(record.title, "测试文章");

        let states: Vec<_> = loader.attempts().iter().map(|a| a.state).collect();
        assert_eq!(
            states,
            vec![AttemptState::Failed, AttemptState::Failed, AttemptState::Succeeded]
        );
        assert!(matches!(
            loader.attempts()[0].failure,
            Some(AttemptFailure::Navigation(_))
        ));
        assert!(matches!(
            loader.attempts()[1].failure,
            Some(AttemptFailure::ReadinessTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_failure() {
        let mut driver = ScriptedDriver::new(vec![
            Outcome::NavigationError,
            Outcome::NavigationError,
            Outcome::NeverReady,
        ]);
        let config = SpiderConfig::immediate();
        let mut loader = PageLoader::new(&mut driver, &config);

        let err = loader.fetch_article(ARTICLE_URL, 3).await.unwrap_err();
        match err {
            SpiderError::FetchExhausted {
                url,
                attempts,
                last_failure,
            } => {
                assert_eq!(url, ARTICLE_URL);
                assert_eq!(attempts, 3);
                assert!(matches!(last_failure, AttemptFailure::ReadinessTimeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.navigations.len(), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_makes_one_navigation() {
        let mut driver =
            ScriptedDriver::new(vec![Outcome::NavigationError, Outcome::Page(ARTICLE_HTML)]);
        let config = SpiderConfig::immediate();
        let mut loader = PageLoader::new(&mut driver, &config);

        assert!(loader.fetch_article(ARTICLE_URL, 1).await.is_err());
        assert_eq!(driver.navigations.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_foreign_url_without_navigating() {
        let mut driver = ScriptedDriver::new(vec![Outcome::Page(ARTICLE_HTML)]);
        let config = SpiderConfig::immediate();
        let mut loader = PageLoader::new(&mut driver, &config);

        let err = loader
            .fetch_article("https://example.com/s/abc", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, SpiderError::Validation(_)));
        assert!(driver.navigations.is_empty());
    }

    #[tokio::test]
    async fn test_zero_attempts_rejected() {
        let mut driver = ScriptedDriver::default();
        let config = SpiderConfig::immediate();
        let mut loader = PageLoader::new(&mut driver, &config);

        let err = loader.fetch_article(ARTICLE_URL, 0).await.unwrap_err();
        assert!(matches!(err, SpiderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_slow_lookups_cannot_outlast_readiness_timeout() {
        let mut driver = ScriptedDriver::new(vec![Outcome::Page(ARTICLE_HTML)]);
        driver.lookup_delay = Duration::from_millis(500);
        let config = SpiderConfig {
            readiness_timeout: Duration::from_millis(50),
            ..SpiderConfig::immediate()
        };

        let started = Instant::now();
        let err = PageLoader::new(&mut driver, &config)
            .fetch_article(ARTICLE_URL, 1)
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(matches!(
            err,
            SpiderError::FetchExhausted {
                last_failure: AttemptFailure::ReadinessTimeout(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fallback_readiness_selector() {
        const FALLBACK_PAGE: &str = r#"<html><body>
            <h2 class="rich_media_title">备用</h2>
            <div id="js_content"><p>x</p></div>
        </body></html>"#;
        let mut driver = ScriptedDriver::new(vec![Outcome::Page(FALLBACK_PAGE)]);
        let config = SpiderConfig::immediate();
        let mut loader = PageLoader::new(&mut driver, &config);

        let record = loader.fetch_article(ARTICLE_URL, 1).await.unwrap();
        assert_eq!(record.title, "备用");
    }

    #[tokio::test]
    async fn test_sentinel_title_policy() {
        const UNTITLED: &str = "<html><body><h1></h1><div id='js_content'>x</div></body></html>";

        let config = SpiderConfig::immediate();
        let mut driver = ScriptedDriver::new(vec![Outcome::Page(UNTITLED)]);
        let record = PageLoader::new(&mut driver, &config)
            .fetch_article(ARTICLE_URL, 1)
            .await
            .unwrap();
        assert_eq!(record.title, UNKNOWN_TITLE);

        let strict = SpiderConfig {
            sentinel_title_is_failure: true,
            ..SpiderConfig::immediate()
        };
        let mut driver = ScriptedDriver::new(vec![Outcome::Page(UNTITLED)]);
        let err = PageLoader::new(&mut driver, &strict)
            .fetch_article(ARTICLE_URL, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpiderError::FetchExhausted {
                last_failure: AttemptFailure::EmptyTitle,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_scrolls_until_height_stabilizes() {
        let mut driver = ScriptedDriver::new(vec![Outcome::Page(ARTICLE_HTML)]);
        driver.heights = vec![1000, 2000, 3000, 3000].into();
        let config = SpiderConfig::immediate();

        PageLoader::new(&mut driver, &config)
            .fetch_article(ARTICLE_URL, 1)
            .await
            .unwrap();
        assert_eq!(driver.scroll_calls, 3);
    }

    #[tokio::test]
    async fn test_scroll_rounds_are_capped() {
        let mut driver = ScriptedDriver::new(vec![Outcome::Page(ARTICLE_HTML)]);
        driver.heights = (1..=100).map(|h| h * 100).collect();
        let config = SpiderConfig {
            max_scroll_rounds: 4,
            ..SpiderConfig::immediate()
        };

        PageLoader::new(&mut driver, &config)
            .fetch_article(ARTICLE_URL, 1)
            .await
            .unwrap();
        assert_eq!(driver.scroll_calls, 4);
    }

    #[test]
    fn test_validate_article_url() {
        let prefix = crate::config::ARTICLE_URL_PREFIX;
        assert!(validate_article_url(ARTICLE_URL, prefix).is_ok());
        assert!(validate_article_url("http://mp.weixin.qq.com/s/x", prefix).is_err());
        assert!(validate_article_url("", prefix).is_err());
    }
}
