//! Tunables for browser sessions, page loading, and image downloads.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Only article URLs under this prefix are accepted.
pub const ARTICLE_URL_PREFIX: &str = "https://mp.weixin.qq.com/";

/// Desktop Chrome user agent shared by the browser and the image client.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/131.0.0.0 Safari/537.36";

/// Spider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiderConfig {
    pub headless: bool,
    pub download_images: bool,
    pub max_attempts: u32,
    /// How long to wait for a title-bearing element after navigation.
    #[serde(with = "millis")]
    pub readiness_timeout: Duration,
    #[serde(with = "millis")]
    pub readiness_poll: Duration,
    #[serde(with = "millis")]
    pub navigation_timeout: Duration,
    /// Bound on scrolling plus snapshotting within one attempt.
    #[serde(with = "millis")]
    pub extraction_timeout: Duration,
    #[serde(with = "millis")]
    pub retry_backoff: Duration,
    #[serde(with = "millis")]
    pub scroll_pause: Duration,
    #[serde(with = "millis")]
    pub settle_pause: Duration,
    /// Upper bound on scroll rounds for pages that never stop growing.
    pub max_scroll_rounds: u32,
    #[serde(with = "millis")]
    pub image_timeout: Duration,
    #[serde(with = "millis")]
    pub image_delay: Duration,
    /// Treat the fallback title as a failed attempt instead of a result.
    pub sentinel_title_is_failure: bool,
    pub url_prefix: String,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            headless: true,
            download_images: true,
            max_attempts: 3,
            readiness_timeout: Duration::from_secs(10),
            readiness_poll: Duration::from_millis(250),
            navigation_timeout: Duration::from_secs(30),
            extraction_timeout: Duration::from_secs(120),
            retry_backoff: Duration::from_secs(2),
            scroll_pause: Duration::from_secs(2),
            settle_pause: Duration::from_secs(1),
            max_scroll_rounds: 30,
            image_timeout: Duration::from_secs(30),
            image_delay: Duration::from_millis(500),
            sentinel_title_is_failure: false,
            url_prefix: ARTICLE_URL_PREFIX.to_string(),
        }
    }
}

impl SpiderConfig {
    /// A configuration with every pause and timeout collapsed, for tests
    /// that drive scripted pages.
    pub fn immediate() -> Self {
        Self {
            readiness_timeout: Duration::ZERO,
            readiness_poll: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            settle_pause: Duration::ZERO,
            image_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
