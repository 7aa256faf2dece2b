//! Resource: weixin://articles/recent

use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::json;

use crate::session::manager::RECENT_LIMIT;
use crate::session::SpiderSessionManager;
use crate::types::{McpResult, ReadResourceResult, ResourceContent};

use super::templates::RECENT_ARTICLES_URI;

pub async fn read_recent(
    session: &Arc<Mutex<SpiderSessionManager>>,
) -> McpResult<ReadResourceResult> {
    let session = session.lock().await;
    let recent = session.recent(RECENT_LIMIT)?;
    let total = recent.len();

    let body = json!({
        "recent_articles": recent,
        "articles_directory": session.articles_dir(),
        "total_found": total,
    });

    Ok(ReadResourceResult {
        contents: vec![ResourceContent::json(RECENT_ARTICLES_URI, &body)],
    })
}
