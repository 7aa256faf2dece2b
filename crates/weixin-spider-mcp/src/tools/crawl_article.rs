//! Tool: crawl_weixin_article: fetch a WeChat article and save it to disk.

use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::{json, Value};

use crate::session::SpiderSessionManager;
use crate::types::{CrawlParams, McpError, McpResult, ToolCallResult, ToolDefinition};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "crawl_weixin_article".to_string(),
        description: Some(
            "Crawl a WeChat official-account article and save its text, metadata and images"
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Article URL, must start with https://mp.weixin.qq.com/"
                },
                "download_images": {
                    "type": "boolean",
                    "description": "Download the article's images",
                    "default": true
                },
                "custom_filename": {
                    "type": "string",
                    "description": "Directory name to save under instead of the generated one"
                }
            },
            "required": ["url"]
        }),
    }
}

/// Bad arguments surface as JSON-RPC errors. Failures after validation
/// (browser, fetch, save) become an error result the client can read.
pub async fn execute(
    args: Value,
    session: &Arc<Mutex<SpiderSessionManager>>,
) -> McpResult<ToolCallResult> {
    let params: CrawlParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;

    let mut session = session.lock().await;
    match session.crawl(&params).await {
        Ok(outcome) => Ok(ToolCallResult::json(&outcome.summary())),
        Err(e @ McpError::InvalidParams(_)) => Err(e),
        Err(e) => {
            tracing::error!("Crawl of {} failed: {e}", params.url);
            Ok(ToolCallResult::error(format!("爬取失败: {e}")))
        }
    }
}
