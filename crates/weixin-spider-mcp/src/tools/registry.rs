//! Tool registration and dispatch.

use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::Value;

use crate::session::SpiderSessionManager;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::{analyze_article, article_statistics, crawl_article};

pub struct ToolRegistry;

impl ToolRegistry {
    pub fn list_tools() -> Vec<ToolDefinition> {
        vec![
            crawl_article::definition(),
            analyze_article::definition(),
            article_statistics::definition(),
        ]
    }

    pub async fn call(
        name: &str,
        arguments: Option<Value>,
        session: &Arc<Mutex<SpiderSessionManager>>,
    ) -> McpResult<ToolCallResult> {
        let args = arguments.unwrap_or(Value::Object(serde_json::Map::new()));

        match name {
            "crawl_weixin_article" => crawl_article::execute(args, session).await,
            "analyze_article_content" => analyze_article::execute(args).await,
            "get_article_statistics" => article_statistics::execute(args).await,
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}
