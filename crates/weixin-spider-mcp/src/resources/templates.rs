//! Static resource definitions.

use crate::types::ResourceDefinition;

pub const RECENT_ARTICLES_URI: &str = "weixin://articles/recent";
pub const SPIDER_CONFIG_URI: &str = "weixin://config/spider";

pub fn list_resources() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition {
            uri: RECENT_ARTICLES_URI.to_string(),
            name: "Recent Articles".to_string(),
            description: Some("Most recently saved articles".to_string()),
            mime_type: Some("application/json".to_string()),
        },
        ResourceDefinition {
            uri: SPIDER_CONFIG_URI.to_string(),
            name: "Spider Configuration".to_string(),
            description: Some("Spider status and default settings".to_string()),
            mime_type: Some("application/json".to_string()),
        },
    ]
}
