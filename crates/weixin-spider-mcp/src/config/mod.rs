//! Configuration loading and resolution.

use std::path::PathBuf;
use std::time::Duration;

use weixin_spider::SpiderConfig;

/// Environment variable naming the articles root.
pub const ARTICLES_DIR_ENV: &str = "WEIXIN_ARTICLES_DIR";

/// Resolve the directory articles are saved under.
///
/// Order: explicit flag, `WEIXIN_ARTICLES_DIR`, `./articles` when it
/// already exists, then `~/.weixin-spider/articles`.
pub fn resolve_articles_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(ARTICLES_DIR_ENV) {
        if !env_path.trim().is_empty() {
            return PathBuf::from(env_path);
        }
    }

    let cwd_articles = PathBuf::from("articles");
    if cwd_articles.is_dir() {
        return cwd_articles;
    }

    resolve_default_articles_dir()
}

fn resolve_default_articles_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".weixin-spider")
        .join("articles")
}

/// Command-line overrides applied on top of [`SpiderConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct SpiderOverrides {
    pub headful: bool,
    pub max_attempts: Option<u32>,
    /// Readiness wait in seconds.
    pub wait_timeout: Option<u64>,
}

impl SpiderOverrides {
    pub fn apply(&self, mut config: SpiderConfig) -> SpiderConfig {
        if self.headful {
            config.headless = false;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(secs) = self.wait_timeout {
            config.readiness_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn build(&self) -> SpiderConfig {
        self.apply(SpiderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dir_wins() {
        assert_eq!(
            resolve_articles_dir(Some("/tmp/somewhere")),
            PathBuf::from("/tmp/somewhere")
        );
    }

    #[test]
    fn test_overrides_apply() {
        let config = SpiderOverrides {
            headful: true,
            max_attempts: Some(5),
            wait_timeout: Some(20),
        }
        .build();
        assert!(!config.headless);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.readiness_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_no_overrides_keep_defaults() {
        assert_eq!(SpiderOverrides::default().build(), SpiderConfig::default());
    }
}
