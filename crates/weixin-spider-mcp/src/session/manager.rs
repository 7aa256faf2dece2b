//! Browser session lifecycle and the crawl pipeline behind the tools.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use weixin_spider::persist::validate_custom_name;
use weixin_spider::{
    validate_article_url, ArticleRecord, ArticleWriter, ChromiumSession, ImageAcquirer,
    PageDriver, PageLoader, SavedArticle, SpiderConfig, SpiderResult, StoredLocation,
};

use crate::types::{CrawlParams, McpResult};

/// Number of entries served by the recent-articles resource.
pub const RECENT_LIMIT: usize = 10;

/// Starts browser drivers for the session manager.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self, config: &SpiderConfig) -> SpiderResult<Box<dyn PageDriver>>;
}

/// Launches a local Chromium through chromiumoxide.
pub struct ChromiumLauncher;

#[async_trait]
impl DriverLauncher for ChromiumLauncher {
    async fn launch(&self, config: &SpiderConfig) -> SpiderResult<Box<dyn PageDriver>> {
        let session = ChromiumSession::open(config).await?;
        Ok(Box::new(session))
    }
}

/// Result of one crawl-and-save.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub record: ArticleRecord,
    pub location: StoredLocation,
    pub images_requested: bool,
}

#[derive(Serialize)]
struct ArticleSummary<'a> {
    title: &'a str,
    author: &'a str,
    publish_time: &'a str,
    url: &'a str,
    content_length: usize,
    images_count: usize,
    crawl_time: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images_downloaded: Option<String>,
}

impl CrawlOutcome {
    /// JSON summary returned by the crawl tool and the `fetch` command.
    pub fn summary(&self) -> Value {
        let record = &self.record;
        let article = ArticleSummary {
            title: &record.title,
            author: &record.author,
            publish_time: &record.publish_time,
            url: &record.source_url,
            content_length: record.body_text.chars().count(),
            images_count: record.images.len(),
            crawl_time: &record.retrieved_at,
            images_downloaded: self.images_requested.then(|| {
                format!("{}/{}", record.resolved_image_count(), record.images.len())
            }),
        };
        json!({
            "status": "success",
            "message": "文章爬取成功",
            "article": article,
            "files_saved": {
                "directory": self.location.directory,
                "json_file": self.location.json_path,
                "text_file": self.location.transcript_path,
                "images_dir": self.location.images_dir,
            }
        })
    }
}

/// Owns the browser, the image HTTP client and the article writer.
///
/// The browser starts on the first crawl and is reused afterwards. Each
/// crawl checks it is still alive and replaces it when it is not.
pub struct SpiderSessionManager {
    config: SpiderConfig,
    writer: ArticleWriter,
    images: ImageAcquirer,
    browser: Option<Box<dyn PageDriver>>,
    launcher: Box<dyn DriverLauncher>,
    crawl_count: u64,
}

impl SpiderSessionManager {
    pub fn new(config: SpiderConfig, articles_dir: impl Into<PathBuf>) -> McpResult<Self> {
        Self::with_launcher(config, articles_dir, Box::new(ChromiumLauncher))
    }

    pub fn with_launcher(
        config: SpiderConfig,
        articles_dir: impl Into<PathBuf>,
        launcher: Box<dyn DriverLauncher>,
    ) -> McpResult<Self> {
        let articles_dir = articles_dir.into();
        let images = ImageAcquirer::new(&config)?;
        tracing::info!("Articles directory: {}", articles_dir.display());
        Ok(Self {
            config,
            writer: ArticleWriter::new(articles_dir),
            images,
            browser: None,
            launcher,
            crawl_count: 0,
        })
    }

    pub fn config(&self) -> &SpiderConfig {
        &self.config
    }

    pub fn articles_dir(&self) -> &Path {
        self.writer.root()
    }

    /// Whether a browser session is currently held.
    pub fn is_ready(&self) -> bool {
        self.browser.is_some()
    }

    pub fn crawl_count(&self) -> u64 {
        self.crawl_count
    }

    /// Fetch, extract and save one article.
    ///
    /// Arguments are validated before the browser is touched.
    pub async fn crawl(&mut self, params: &CrawlParams) -> McpResult<CrawlOutcome> {
        validate_article_url(&params.url, &self.config.url_prefix)?;
        if let Some(name) = params.custom_filename.as_deref() {
            validate_custom_name(name)?;
        }

        self.ensure_browser().await?;
        let mut record = {
            let driver = self.browser.as_deref_mut().ok_or_else(|| {
                weixin_spider::SpiderError::DriverInit("browser not started".to_string())
            })?;
            let mut loader = PageLoader::new(driver, &self.config);
            loader.fetch_article(&params.url, self.config.max_attempts).await?
        };

        let acquirer = params.download_images.then_some(&self.images);
        let location = self
            .writer
            .save(&mut record, params.custom_filename.as_deref(), acquirer)
            .await?;

        self.crawl_count += 1;
        tracing::info!(
            "Crawled \"{}\" into {}",
            record.title,
            location.directory.display()
        );

        Ok(CrawlOutcome {
            record,
            location,
            images_requested: params.download_images,
        })
    }

    /// Recently saved articles, newest first.
    pub fn recent(&self, limit: usize) -> McpResult<Vec<SavedArticle>> {
        Ok(self.writer.recent(limit)?)
    }

    async fn ensure_browser(&mut self) -> McpResult<()> {
        if let Some(driver) = self.browser.as_mut() {
            if driver.is_alive().await {
                return Ok(());
            }
            tracing::warn!("Browser session no longer responds, restarting");
            if let Err(e) = driver.close().await {
                tracing::debug!("Closing dead browser failed: {e}");
            }
            self.browser = None;
        }

        let driver = self.launcher.launch(&self.config).await?;
        tracing::info!("Browser session started");
        self.browser = Some(driver);
        Ok(())
    }

    /// Release the browser. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut driver) = self.browser.take() {
            match driver.close().await {
                Ok(()) => tracing::info!("Browser session closed"),
                Err(e) => tracing::warn!("Error closing browser: {e}"),
            }
        }
    }
}
