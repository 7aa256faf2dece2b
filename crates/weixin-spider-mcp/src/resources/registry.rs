//! Resource registration and dispatch.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::session::SpiderSessionManager;
use crate::types::{McpError, McpResult, ReadResourceResult, ResourceDefinition};

use super::templates::{RECENT_ARTICLES_URI, SPIDER_CONFIG_URI};
use super::{articles, spider_config, templates};

pub struct ResourceRegistry;

impl ResourceRegistry {
    pub fn list_resources() -> Vec<ResourceDefinition> {
        templates::list_resources()
    }

    pub async fn read(
        uri: &str,
        session: &Arc<Mutex<SpiderSessionManager>>,
    ) -> McpResult<ReadResourceResult> {
        match uri {
            RECENT_ARTICLES_URI => articles::read_recent(session).await,
            SPIDER_CONFIG_URI => spider_config::read_config(session).await,
            _ => Err(McpError::ResourceNotFound(uri.to_string())),
        }
    }
}
