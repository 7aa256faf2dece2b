//! WeixinSpider MCP server: crawl, analyze and list WeChat articles over
//! JSON-RPC on stdio.

pub mod config;
pub mod protocol;
pub mod repl;
pub mod resources;
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::{resolve_articles_dir, SpiderOverrides};
pub use protocol::ProtocolHandler;
pub use session::SpiderSessionManager;
pub use transport::StdioTransport;
