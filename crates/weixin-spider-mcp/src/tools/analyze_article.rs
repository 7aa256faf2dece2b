//! Tool: analyze_article_content: summary, keywords and image report for a record.

use serde_json::{json, Value};

use weixin_spider::{analyze, record_from_value, AnalysisKind};

use crate::types::{AnalyzeParams, McpError, McpResult, ToolCallResult, ToolDefinition};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "analyze_article_content".to_string(),
        description: Some("Analyze a crawled article: summary, keywords, images".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "article_data": {
                    "type": "object",
                    "description": "Article record as returned or saved by the crawler"
                },
                "analysis_type": {
                    "type": "string",
                    "enum": ["summary", "keywords", "images", "full"],
                    "default": "full"
                }
            },
            "required": ["article_data"]
        }),
    }
}

pub async fn execute(args: Value) -> McpResult<ToolCallResult> {
    let params: AnalyzeParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;

    let kind = match params.analysis_type.as_deref() {
        Some(s) => AnalysisKind::parse(s)?,
        None => AnalysisKind::default(),
    };
    let record = record_from_value(&params.article_data)?;

    Ok(ToolCallResult::json(&analyze(&record, kind)))
}
