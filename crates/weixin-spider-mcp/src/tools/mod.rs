//! MCP tool implementations.

pub mod analyze_article;
pub mod article_statistics;
pub mod crawl_article;
pub mod registry;

pub use registry::ToolRegistry;
