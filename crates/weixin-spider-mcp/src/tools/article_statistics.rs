//! Tool: get_article_statistics: character, paragraph and image counts.

use serde_json::{json, Value};

use weixin_spider::{record_from_value, statistics};

use crate::types::{McpError, McpResult, StatisticsParams, ToolCallResult, ToolDefinition};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "get_article_statistics".to_string(),
        description: Some("Content and image statistics for a crawled article".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "article_data": {
                    "type": "object",
                    "description": "Article record as returned or saved by the crawler"
                }
            },
            "required": ["article_data"]
        }),
    }
}

pub async fn execute(args: Value) -> McpResult<ToolCallResult> {
    let params: StatisticsParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;
    let record = record_from_value(&params.article_data)?;
    Ok(ToolCallResult::json(&statistics(&record)))
}
