//! On-disk article layout: one directory per article holding the JSON
//! record, a plain-text transcript, and an `images/` folder.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::images::ImageAcquirer;
use crate::types::{ArticleRecord, SpiderError, SpiderResult, UNKNOWN_TITLE};

/// Maximum number of title characters kept in a slug.
pub const MAX_SLUG_CHARS: usize = 50;

/// Timestamp appended to generated slugs.
pub const SLUG_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name of the per-article image folder.
pub const IMAGES_DIR: &str = "images";

const RULE_WIDTH: usize = 80;

/// Characters that cannot appear in a directory name on common platforms.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace filesystem-illegal characters and cap the length.
pub fn slugify_title(title: &str) -> String {
    let capped: String = title
        .trim()
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .take(MAX_SLUG_CHARS)
        .collect();
    if capped.trim().is_empty() {
        "article".to_string()
    } else {
        capped
    }
}

/// Reject caller-supplied names that would escape the articles root.
pub fn validate_custom_name(name: &str) -> SpiderResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SpiderError::Validation("custom filename is empty".to_string()));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed.contains("..") {
        return Err(SpiderError::Validation(format!(
            "custom filename must not contain path separators or '..': {name}"
        )));
    }
    // "." would resolve to the articles root itself.
    if trimmed.chars().all(|c| c == '.') {
        return Err(SpiderError::Validation(format!(
            "custom filename must name a directory: {name}"
        )));
    }
    Ok(())
}

fn to_pretty_json<T: Serialize>(value: &T) -> SpiderResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| SpiderError::Persistence(format!("cannot serialize record: {e}")))
}

/// Where an article was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredLocation {
    pub slug: String,
    pub directory: PathBuf,
    pub json_path: PathBuf,
    pub transcript_path: PathBuf,
    pub images_dir: Option<PathBuf>,
}

/// Short listing entry for a saved article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedArticle {
    pub title: String,
    pub author: String,
    pub crawl_time: String,
    pub directory: PathBuf,
}

/// Writes articles under a root directory.
#[derive(Debug, Clone)]
pub struct ArticleWriter {
    root: PathBuf,
}

impl ArticleWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pick the slug and create the article directory.
    ///
    /// Generated slugs never reuse an existing directory; custom names are
    /// taken verbatim and may overwrite a previous save.
    pub fn prepare(
        &self,
        record: &ArticleRecord,
        custom_name: Option<&str>,
        with_images: bool,
        now: DateTime<Local>,
    ) -> SpiderResult<StoredLocation> {
        let slug = match custom_name {
            Some(name) => {
                validate_custom_name(name)?;
                name.trim().to_string()
            }
            None => self.unique_slug(&record.title, now),
        };

        let directory = self.root.join(&slug);
        std::fs::create_dir_all(&directory).map_err(|e| {
            SpiderError::Persistence(format!("cannot create {}: {e}", directory.display()))
        })?;

        let images_dir = if with_images && !record.images.is_empty() {
            let dir = directory.join(IMAGES_DIR);
            std::fs::create_dir_all(&dir).map_err(|e| {
                SpiderError::Persistence(format!("cannot create {}: {e}", dir.display()))
            })?;
            Some(dir)
        } else {
            None
        };

        Ok(StoredLocation {
            json_path: directory.join(format!("{slug}.json")),
            transcript_path: directory.join(format!("{slug}.txt")),
            slug,
            directory,
            images_dir,
        })
    }

    fn unique_slug(&self, title: &str, now: DateTime<Local>) -> String {
        let title = if title.trim().is_empty() { UNKNOWN_TITLE } else { title };
        let base = format!("{}_{}", slugify_title(title), now.format(SLUG_TIMESTAMP_FORMAT));
        if !self.root.join(&base).exists() {
            return base;
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.root.join(candidate).exists())
            .unwrap_or(base)
    }

    /// Write the JSON record and the transcript into a prepared location.
    ///
    /// If the transcript write fails the JSON file stays where it is.
    pub fn write(&self, record: &ArticleRecord, location: &StoredLocation) -> SpiderResult<()> {
        let json = to_pretty_json(record)?;
        std::fs::write(&location.json_path, json).map_err(|e| {
            SpiderError::Persistence(format!(
                "cannot write {}: {e}",
                location.json_path.display()
            ))
        })?;
        tracing::info!("Saved JSON: {}", location.json_path.display());

        std::fs::write(&location.transcript_path, render_transcript(record)).map_err(|e| {
            SpiderError::Persistence(format!(
                "cannot write {}: {e}",
                location.transcript_path.display()
            ))
        })?;
        tracing::info!("Saved transcript: {}", location.transcript_path.display());
        Ok(())
    }

    /// Persist an article, acquiring its images into final storage first.
    ///
    /// Pass `None` for `images` to skip downloads; image refs then stay
    /// unresolved.
    pub async fn save(
        &self,
        record: &mut ArticleRecord,
        custom_name: Option<&str>,
        images: Option<&ImageAcquirer>,
    ) -> SpiderResult<StoredLocation> {
        let location = self.prepare(record, custom_name, images.is_some(), Local::now())?;

        if let (Some(acquirer), Some(dir)) = (images, location.images_dir.as_deref()) {
            tracing::info!("Downloading {} images", record.images.len());
            acquirer.acquire_all(&mut record.images, dir).await;
        }

        self.write(record, &location)?;
        Ok(location)
    }

    /// Most recently modified article directories, newest first.
    ///
    /// Only directories holding `<dir>/<dir>.json` count. Records that fail
    /// to parse are skipped.
    pub fn recent(&self, limit: usize) -> SpiderResult<Vec<SavedArticle>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SpiderError::Persistence(format!(
                    "cannot list {}: {e}",
                    self.root.display()
                )))
            }
        };

        let mut dirs: Vec<(std::time::SystemTime, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?.to_string();
                if !path.join(format!("{name}.json")).is_file() {
                    return None;
                }
                let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, path))
            })
            .collect();
        dirs.sort_by(|a, b| b.0.cmp(&a.0));

        let articles = dirs
            .into_iter()
            .filter_map(|(_, dir)| read_summary(&dir))
            .take(limit)
            .collect();
        Ok(articles)
    }
}

fn read_summary(dir: &Path) -> Option<SavedArticle> {
    let name = dir.file_name()?.to_str()?;
    let raw = std::fs::read_to_string(dir.join(format!("{name}.json"))).ok()?;
    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Skipping unreadable record in {}: {e}", dir.display());
            return None;
        }
    };
    let field = |key: &str| value.get(key).and_then(|v| v.as_str()).unwrap_or("N/A").to_string();
    Some(SavedArticle {
        title: field("title"),
        author: field("author"),
        crawl_time: field("crawl_time"),
        directory: dir.to_path_buf(),
    })
}

/// Render the plain-text transcript of a record.
pub fn render_transcript(record: &ArticleRecord) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "标题: {}", record.title);
    let _ = writeln!(out, "作者: {}", record.author);
    let _ = writeln!(out, "发布时间: {}", record.publish_time);
    let _ = writeln!(out, "抓取时间: {}", record.retrieved_at);
    let _ = writeln!(out, "链接: {}", record.source_url);
    let _ = write!(out, "\n{rule}\n\n");
    out.push_str(&record.body_text);

    if !record.images.is_empty() {
        let _ = write!(out, "\n\n{rule}\n");
        out.push_str("图片信息:\n");
        for image in &record.images {
            let _ = write!(out, "\n图片 {}: {}\n", image.index, image.alt_text);
            let _ = writeln!(out, "原始URL: {}", image.source_locator);
            match (&image.stored_filename, image.resolved) {
                (Some(filename), true) => {
                    let _ = writeln!(out, "本地文件: {filename}");
                }
                _ => out.push_str("下载失败\n"),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::SpiderConfig;
    use crate::types::ImageRef;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, 9, 30, 5).single().unwrap()
    }

    fn record_with_image(url: &str) -> ArticleRecord {
        ArticleRecord {
            title: "T".to_string(),
            author: "A".to_string(),
            publish_time: "2024-03-01".to_string(),
            body_markup: "<p>body</p>".to_string(),
            body_text: "body".to_string(),
            images: vec![ImageRef::new(1, url.to_string(), "图片_1".to_string(), String::new())],
            source_url: "https://mp.weixin.qq.com/s/abc".to_string(),
            retrieved_at: "2024-03-01 09:30:05".to_string(),
        }
    }

    #[test]
    fn test_slugify_replaces_illegal_chars() {
        assert_eq!(slugify_title(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_slugify_caps_by_chars() {
        let title = "长".repeat(80);
        let slug = slugify_title(&title);
        assert_eq!(slug.chars().count(), MAX_SLUG_CHARS);
    }

    #[test]
    fn test_slugify_empty_title() {
        assert_eq!(slugify_title("   "), "article");
    }

    #[test]
    fn test_custom_name_validation() {
        assert!(validate_custom_name("demo").is_ok());
        assert!(validate_custom_name("a/b").is_err());
        assert!(validate_custom_name(r"a\b").is_err());
        assert!(validate_custom_name("..").is_err());
        assert!(validate_custom_name("  ").is_err());
        assert!(validate_custom_name(".").is_err());
        assert!(validate_custom_name(" . ").is_err());
        assert!(validate_custom_name(".hidden").is_ok());
    }

    #[test]
    fn test_generated_slugs_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArticleWriter::new(dir.path());
        let record = record_with_image("https://x/y.jpg");

        let first = writer.prepare(&record, None, false, fixed_now()).unwrap();
        let second = writer.prepare(&record, None, false, fixed_now()).unwrap();
        let third = writer.prepare(&record, None, false, fixed_now()).unwrap();
        assert_eq!(first.slug, "T_20240301_093005");
        assert_eq!(second.slug, "T_20240301_093005_2");
        assert_eq!(third.slug, "T_20240301_093005_3");
    }

    #[test]
    fn test_prepare_skips_images_dir_without_images() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArticleWriter::new(dir.path());
        let mut record = record_with_image("https://x/y.jpg");
        record.images.clear();

        let location = writer.prepare(&record, Some("plain"), true, fixed_now()).unwrap();
        assert!(location.images_dir.is_none());
        assert!(!dir.path().join("plain").join(IMAGES_DIR).exists());
    }

    #[test]
    fn test_transcript_layout() {
        let mut record = record_with_image("https://x/y.jpg");
        record.images.push(ImageRef::new(
            2,
            "https://x/z.jpg".to_string(),
            "图片_2".to_string(),
            String::new(),
        ));
        record.images[0]
            .mark_resolved("img_001.png".to_string(), PathBuf::from("/tmp/img_001.png"));
        record.images[1].mark_failed();

        let rule = "=".repeat(80);
        let expected = format!(
            "标题: T\n作者: A\n发布时间: 2024-03-01\n抓取时间: 2024-03-01 09:30:05\n\
             链接: https://mp.weixin.qq.com/s/abc\n\n{rule}\n\nbody\n\n{rule}\n图片信息:\n\n\
             图片 1: 图片_1\n原始URL: https://x/y.jpg\n本地文件: img_001.png\n\n\
             图片 2: 图片_2\n原始URL: https://x/z.jpg\n下载失败\n"
        );
        assert_eq!(render_transcript(&record), expected);
    }

    #[test]
    fn test_transcript_without_images_ends_with_body() {
        let mut record = record_with_image("https://x/y.jpg");
        record.images.clear();
        assert!(render_transcript(&record).ends_with("\n\nbody"));
    }

    #[tokio::test]
    async fn test_save_with_custom_name_and_failed_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let writer = ArticleWriter::new(dir.path());
        let acquirer = ImageAcquirer::new(&SpiderConfig::immediate()).unwrap();
        let mut record = record_with_image(&format!("{}/y.jpg", server.uri()));

        let location = writer.save(&mut record, Some("demo"), Some(&acquirer)).await.unwrap();
        let article_dir = dir.path().join("demo");
        assert_eq!(location.directory, article_dir);
        assert!(article_dir.join("demo.json").is_file());
        assert!(article_dir.join("demo.txt").is_file());
        assert!(!article_dir.join("images/img_001.png").exists());

        assert_eq!(record.images.len(), 1);
        assert!(!record.images[0].resolved);

        let json = std::fs::read_to_string(article_dir.join("demo.json")).unwrap();
        let saved: ArticleRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(saved, record);
        let transcript = std::fs::read_to_string(article_dir.join("demo.txt")).unwrap();
        assert!(transcript.starts_with("标题: T\n"));
        assert!(transcript.contains("下载失败"));
    }

    #[tokio::test]
    async fn test_save_inline_image() {
        use base64::Engine;
        let mut png = Vec::new();
        image::DynamicImage::new_rgba8(1, 1)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let locator = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );

        let dir = tempfile::tempdir().unwrap();
        let writer = ArticleWriter::new(dir.path());
        let acquirer = ImageAcquirer::new(&SpiderConfig::immediate()).unwrap();
        let mut record = record_with_image(&locator);

        let location = writer.save(&mut record, Some("inline"), Some(&acquirer)).await.unwrap();
        assert!(record.images[0].resolved);
        assert_eq!(record.images[0].stored_filename.as_deref(), Some("img_001.png"));
        assert!(location.directory.join("images/img_001.png").is_file());
    }

    #[tokio::test]
    async fn test_save_without_downloads_leaves_images_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArticleWriter::new(dir.path());
        let mut record = record_with_image("https://x/y.jpg");

        let location = writer.save(&mut record, None, None).await.unwrap();
        assert!(location.images_dir.is_none());
        assert!(!record.images[0].resolved);
        assert!(location.json_path.is_file());
    }

    #[test]
    fn test_serialization_failure_is_persistence_error() {
        let mut unserializable = std::collections::BTreeMap::new();
        unserializable.insert((1u8, 2u8), "tuple keys are not JSON object keys");

        let err = to_pretty_json(&unserializable).unwrap_err();
        assert!(matches!(err, SpiderError::Persistence(_)));
        assert!(to_pretty_json(&record_with_image("https://x/y.jpg")).is_ok());
    }

    #[tokio::test]
    async fn test_dot_custom_name_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArticleWriter::new(dir.path());
        let mut record = record_with_image("https://x/y.jpg");

        let err = writer.save(&mut record, Some("."), None).await.unwrap_err();
        assert!(matches!(err, SpiderError::Validation(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_partial_write_keeps_json() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArticleWriter::new(dir.path());
        let record = record_with_image("https://x/y.jpg");
        let mut location = writer
            .prepare(&record, Some("partial"), false, fixed_now())
            .unwrap();
        location.transcript_path = dir.path().join("missing-dir").join("partial.txt");

        let err = writer.write(&record, &location).unwrap_err();
        assert!(matches!(err, SpiderError::Persistence(_)));
        assert!(location.json_path.is_file());
    }

    #[test]
    fn test_recent_lists_only_article_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArticleWriter::new(dir.path());
        let record = record_with_image("https://x/y.jpg");

        let first = writer.prepare(&record, Some("first"), false, fixed_now()).unwrap();
        writer.write(&record, &first).unwrap();
        std::fs::create_dir_all(dir.path().join("stray")).unwrap();
        std::fs::write(dir.path().join("loose.json"), "{}").unwrap();

        let recent = writer.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "T");
        assert_eq!(recent[0].author, "A");
        assert_eq!(recent[0].directory, first.directory);
    }

    #[test]
    fn test_recent_missing_root() {
        let writer = ArticleWriter::new("/nonexistent/weixin-spider-articles");
        assert!(writer.recent(10).unwrap().is_empty());
    }
}
