//! Resource: weixin://config/spider

use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::json;

use crate::session::SpiderSessionManager;
use crate::types::{McpResult, ReadResourceResult, ResourceContent};

use super::templates::SPIDER_CONFIG_URI;

const SUPPORTED_FEATURES: &[&str] = &[
    "文章标题提取",
    "作者信息提取",
    "发布时间提取",
    "正文内容提取",
    "图片下载",
    "JSON格式保存",
    "TXT格式保存",
];

pub async fn read_config(
    session: &Arc<Mutex<SpiderSessionManager>>,
) -> McpResult<ReadResourceResult> {
    let session = session.lock().await;
    let config = session.config();
    let status = if session.is_ready() {
        "ready"
    } else {
        "not_initialized"
    };

    let body = json!({
        "spider_status": status,
        "default_settings": {
            "headless": config.headless,
            "wait_time": config.readiness_timeout.as_secs(),
            "download_images": config.download_images,
            "max_attempts": config.max_attempts,
        },
        "articles_directory": session.articles_dir(),
        "crawl_count": session.crawl_count(),
        "supported_features": SUPPORTED_FEATURES,
    });

    Ok(ReadResourceResult {
        contents: vec![ResourceContent::json(SPIDER_CONFIG_URI, &body)],
    })
}
