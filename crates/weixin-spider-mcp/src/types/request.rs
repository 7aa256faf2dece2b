//! MCP request parameter types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReadParams {
    pub uri: String,
}

/// Arguments of `crawl_weixin_article`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlParams {
    pub url: String,
    #[serde(default = "default_true")]
    pub download_images: bool,
    #[serde(default)]
    pub custom_filename: Option<String>,
}

/// Arguments of `analyze_article_content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeParams {
    pub article_data: Value,
    #[serde(default)]
    pub analysis_type: Option<String>,
}

/// Arguments of `get_article_statistics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsParams {
    pub article_data: Value,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crawl_params_defaults() {
        let params: CrawlParams =
            serde_json::from_value(json!({"url": "https://mp.weixin.qq.com/s/x"})).unwrap();
        assert!(params.download_images);
        assert!(params.custom_filename.is_none());
    }

    #[test]
    fn test_crawl_params_require_url() {
        assert!(serde_json::from_value::<CrawlParams>(json!({"download_images": false})).is_err());
    }
}
