//! Core data types for retrieved articles and their images.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::extract::project_text;

/// Fallback title when no title selector matches.
pub const UNKNOWN_TITLE: &str = "未知标题";

/// Fallback author when no author selector matches.
pub const UNKNOWN_AUTHOR: &str = "未知作者";

/// Fallback publish time when no time selector matches.
pub const UNKNOWN_PUBLISH_TIME: &str = "未知时间";

/// Format of `crawl_time` in saved records.
pub const CRAWL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One retrieved article.
///
/// Serialized field names follow the on-disk JSON layout read by
/// downstream tooling, so several Rust names carry a `rename`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_publish_time")]
    pub publish_time: String,
    /// Raw markup of the content region, as captured.
    #[serde(rename = "content_html", default)]
    pub body_markup: String,
    /// Plain-text projection of `body_markup`.
    #[serde(rename = "content_text", default)]
    pub body_text: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(rename = "url", default)]
    pub source_url: String,
    #[serde(rename = "crawl_time", default)]
    pub retrieved_at: String,
}

fn default_author() -> String {
    UNKNOWN_AUTHOR.to_string()
}

fn default_publish_time() -> String {
    UNKNOWN_PUBLISH_TIME.to_string()
}

impl ArticleRecord {
    /// Whether the title is the fallback sentinel rather than page text.
    pub fn has_sentinel_title(&self) -> bool {
        self.title == UNKNOWN_TITLE
    }

    /// Recompute the plain-text projection from the stored markup.
    pub fn derive_body_text(&self) -> String {
        project_text(&self.body_markup)
    }

    /// Number of images whose bytes were written to storage.
    pub fn resolved_image_count(&self) -> usize {
        self.images.iter().filter(|img| img.resolved).count()
    }
}

/// One image found in the article body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// 1-based position in document order.
    pub index: usize,
    /// Remote URL or `data:` locator.
    #[serde(rename = "url")]
    pub source_locator: String,
    #[serde(rename = "alt", default)]
    pub alt_text: String,
    #[serde(rename = "title", default)]
    pub title_text: String,
    #[serde(rename = "filename", default)]
    pub stored_filename: Option<String>,
    #[serde(rename = "local_path", default)]
    pub stored_path: Option<PathBuf>,
    #[serde(rename = "download_success", default)]
    pub resolved: bool,
}

impl ImageRef {
    pub fn new(index: usize, source_locator: String, alt_text: String, title_text: String) -> Self {
        Self {
            index,
            source_locator,
            alt_text,
            title_text,
            stored_filename: None,
            stored_path: None,
            resolved: false,
        }
    }

    /// Whether the locator carries inline data instead of a remote URL.
    pub fn is_inline(&self) -> bool {
        self.source_locator.starts_with("data:")
    }

    /// Record a successful acquisition. Terminal.
    pub fn mark_resolved(&mut self, filename: String, path: PathBuf) {
        self.stored_filename = Some(filename);
        self.stored_path = Some(path);
        self.resolved = true;
    }

    /// Record a failed acquisition. Terminal; leaves filename and path unset.
    pub fn mark_failed(&mut self) {
        self.stored_filename = None;
        self.stored_path = None;
        self.resolved = false;
    }
}

/// Why a single load/extract attempt failed.
///
/// Attempt failures are swallowed by the retry loop; only the last one
/// surfaces, inside [`SpiderError::FetchExhausted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Navigation(String),
    ReadinessTimeout(Duration),
    Extraction(String),
    ExtractionTimeout(Duration),
    EmptyTitle,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Navigation(e) => write!(f, "navigation failed: {e}"),
            AttemptFailure::ReadinessTimeout(d) => {
                write!(f, "no title element appeared within {}ms", d.as_millis())
            }
            AttemptFailure::Extraction(e) => write!(f, "extraction failed: {e}"),
            AttemptFailure::ExtractionTimeout(d) => {
                write!(f, "extraction timed out after {}ms", d.as_millis())
            }
            AttemptFailure::EmptyTitle => write!(f, "extracted record has no title"),
        }
    }
}

/// Errors that can occur in the spider library.
#[derive(thiserror::Error, Debug)]
pub enum SpiderError {
    #[error("Browser driver initialization failed: {0}")]
    DriverInit(String),

    #[error("Failed to fetch {url} after {attempts} attempts: {last_failure}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        last_failure: AttemptFailure,
    },

    #[error("Image {index} could not be resolved: {reason}")]
    ImageResolution { index: usize, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience result type.
pub type SpiderResult<T> = Result<T, SpiderError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ArticleRecord {
        ArticleRecord {
            title: "T".to_string(),
            author: "A".to_string(),
            publish_time: "2024-01-01".to_string(),
            body_markup: "<p>one</p><p>two</p>".to_string(),
            body_text: "one\ntwo".to_string(),
            images: vec![ImageRef::new(
                1,
                "https://x/y.jpg".to_string(),
                "图片_1".to_string(),
                String::new(),
            )],
            source_url: "https://mp.weixin.qq.com/s/abc".to_string(),
            retrieved_at: "2024-01-01 12:00:00".to_string(),
        }
    }

    #[test]
    fn test_json_uses_on_disk_field_names() {
        let value = serde_json::to_value(sample_record()).unwrap();
        assert_eq!(value["content_html"], "<p>one</p><p>two</p>");
        assert_eq!(value["content_text"], "one\ntwo");
        assert_eq!(value["url"], "https://mp.weixin.qq.com/s/abc");
        assert_eq!(value["crawl_time"], "2024-01-01 12:00:00");
        assert_eq!(value["images"][0]["url"], "https://x/y.jpg");
        assert_eq!(value["images"][0]["download_success"], false);
        assert!(value["images"][0]["filename"].is_null());
        assert!(value["images"][0]["local_path"].is_null());
    }

    #[test]
    fn test_minimal_record_defaults() {
        let record: ArticleRecord = serde_json::from_str(r#"{"title":"T"}"#).unwrap();
        assert_eq!(record.author, UNKNOWN_AUTHOR);
        assert_eq!(record.publish_time, UNKNOWN_PUBLISH_TIME);
        assert!(record.images.is_empty());
        assert!(record.body_text.is_empty());
    }

    #[test]
    fn test_missing_title_rejected() {
        let result: Result<ArticleRecord, _> = serde_json::from_str(r#"{"author":"A"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_image_resolution_transitions() {
        let mut img = ImageRef::new(
            3,
            "data:image/png;base64,AAAA".to_string(),
            String::new(),
            String::new(),
        );
        assert!(img.is_inline());
        img.mark_resolved("img_003.png".to_string(), PathBuf::from("/tmp/img_003.png"));
        assert!(img.resolved);
        assert_eq!(img.stored_filename.as_deref(), Some("img_003.png"));

        let mut failed =
            ImageRef::new(4, "https://x/z.jpg".to_string(), String::new(), String::new());
        failed.mark_failed();
        assert!(!failed.resolved);
        assert!(failed.stored_filename.is_none());
        assert!(failed.stored_path.is_none());
    }

    #[test]
    fn test_derived_body_text_matches_stored() {
        let record = sample_record();
        assert_eq!(record.derive_body_text(), record.body_text);
    }
}
