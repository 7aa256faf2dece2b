//! MCP resource implementations.

pub mod articles;
pub mod registry;
pub mod spider_config;
pub mod templates;

pub use registry::ResourceRegistry;
