//! WeixinSpider: headless retrieval of WeChat official-account articles,
//! with image acquisition and on-disk persistence.

pub mod analysis;
pub mod browser;
pub mod config;
pub mod extract;
pub mod images;
pub mod orchestrator;
pub mod persist;
pub mod selectors;
pub mod types;

pub use analysis::{analyze, record_from_value, statistics, AnalysisKind};
pub use browser::{ChromiumSession, PageDriver};
pub use config::{SpiderConfig, ARTICLE_URL_PREFIX, USER_AGENT};
pub use extract::{extract_article, project_text};
pub use images::{image_filename, AcquisitionReport, ImageAcquirer, ImageOutcome, Normalized};
pub use orchestrator::{validate_article_url, AttemptReport, AttemptState, PageLoader};
pub use persist::{render_transcript, ArticleWriter, SavedArticle, StoredLocation};
pub use types::*;
