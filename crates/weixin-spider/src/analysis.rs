//! Lightweight content analysis and statistics over a saved record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ArticleRecord, SpiderError, SpiderResult};

/// Characters kept in the body preview.
pub const PREVIEW_CHARS: usize = 200;

/// Number of keywords reported.
pub const KEYWORD_LIMIT: usize = 10;

/// Number of images detailed in the images section.
pub const IMAGE_DETAIL_LIMIT: usize = 5;

/// Which sections an analysis includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Summary,
    Keywords,
    Images,
    #[default]
    Full,
}

impl AnalysisKind {
    pub fn parse(s: &str) -> SpiderResult<Self> {
        match s {
            "summary" => Ok(Self::Summary),
            "keywords" => Ok(Self::Keywords),
            "images" => Ok(Self::Images),
            "full" => Ok(Self::Full),
            other => Err(SpiderError::Validation(format!(
                "unknown analysis_type '{other}', expected summary, keywords, images or full"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Keywords => "keywords",
            Self::Images => "images",
            Self::Full => "full",
        }
    }

    fn includes(&self, section: AnalysisKind) -> bool {
        *self == AnalysisKind::Full || *self == section
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleSummary {
    pub title: String,
    pub author: String,
    pub publish_time: String,
    pub content_preview: String,
    pub word_count: usize,
    pub paragraph_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDetail {
    pub filename: String,
    pub alt_text: String,
    pub download_success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagesAnalysis {
    pub total_count: usize,
    pub downloaded_count: usize,
    pub failed_count: usize,
    pub image_details: Vec<ImageDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub analysis_type: AnalysisKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ArticleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images_analysis: Option<ImagesAnalysis>,
}

/// Parse a caller-supplied record. A missing title is a validation error.
pub fn record_from_value(value: &serde_json::Value) -> SpiderResult<ArticleRecord> {
    let Some(object) = value.as_object() else {
        return Err(SpiderError::Validation(
            "article_data must be an object".to_string(),
        ));
    };
    if !object.get("title").is_some_and(|t| t.is_string()) {
        return Err(SpiderError::Validation(
            "article_data is missing a title".to_string(),
        ));
    }
    serde_json::from_value(value.clone())
        .map_err(|e| SpiderError::Validation(format!("invalid article_data: {e}")))
}

fn paragraph_count(text: &str) -> usize {
    text.lines().filter(|l| !l.trim().is_empty()).count()
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

pub fn summarize(record: &ArticleRecord) -> ArticleSummary {
    ArticleSummary {
        title: record.title.clone(),
        author: record.author.clone(),
        publish_time: record.publish_time.clone(),
        content_preview: preview(&record.body_text),
        word_count: record.body_text.chars().count(),
        paragraph_count: paragraph_count(&record.body_text),
    }
}

/// Most frequent whitespace-separated tokens longer than one character.
///
/// Ties keep first-appearance order.
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, token) in text.split_whitespace().enumerate() {
        if token.chars().count() <= 1 {
            continue;
        }
        counts.entry(token).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(token, (count, first))| (token, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(token, _, _)| token.to_string())
        .collect()
}

pub fn analyze_images(record: &ArticleRecord) -> ImagesAnalysis {
    let downloaded = record.resolved_image_count();
    ImagesAnalysis {
        total_count: record.images.len(),
        downloaded_count: downloaded,
        failed_count: record.images.len() - downloaded,
        image_details: record
            .images
            .iter()
            .take(IMAGE_DETAIL_LIMIT)
            .map(|img| ImageDetail {
                filename: img.stored_filename.clone().unwrap_or_default(),
                alt_text: img.alt_text.clone(),
                download_success: img.resolved,
            })
            .collect(),
    }
}

pub fn analyze(record: &ArticleRecord, kind: AnalysisKind) -> Analysis {
    Analysis {
        analysis_type: kind,
        summary: kind
            .includes(AnalysisKind::Summary)
            .then(|| summarize(record)),
        keywords: kind
            .includes(AnalysisKind::Keywords)
            .then(|| extract_keywords(&record.body_text, KEYWORD_LIMIT)),
        images_analysis: kind
            .includes(AnalysisKind::Images)
            .then(|| analyze_images(record)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicInfo {
    pub title: String,
    pub author: String,
    pub publish_time: String,
    pub crawl_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentStatistics {
    pub total_characters: usize,
    pub total_words: usize,
    pub paragraphs: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageStatistics {
    pub total_images: usize,
    pub downloaded_successfully: usize,
    pub download_failed: usize,
    pub download_success_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleStatistics {
    pub basic_info: BasicInfo,
    pub content_statistics: ContentStatistics,
    pub image_statistics: ImageStatistics,
}

pub fn statistics(record: &ArticleRecord) -> ArticleStatistics {
    let text = &record.body_text;
    let total = record.images.len();
    let ok = record.resolved_image_count();
    let rate = if total == 0 {
        "0%".to_string()
    } else {
        format!("{:.1}%", ok as f64 / total as f64 * 100.0)
    };

    ArticleStatistics {
        basic_info: BasicInfo {
            title: record.title.clone(),
            author: record.author.clone(),
            publish_time: record.publish_time.clone(),
            crawl_time: record.retrieved_at.clone(),
        },
        content_statistics: ContentStatistics {
            total_characters: text.chars().count(),
            total_words: text.split_whitespace().count(),
            paragraphs: paragraph_count(text),
            lines: if text.is_empty() { 0 } else { text.split('\n').count() },
        },
        image_statistics: ImageStatistics {
            total_images: total,
            downloaded_successfully: ok,
            download_failed: total - ok,
            download_success_rate: rate,
        },
    }
}
