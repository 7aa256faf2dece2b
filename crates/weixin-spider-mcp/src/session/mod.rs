//! Spider session management: one shared browser, writer and image client.

pub mod manager;

pub use manager::{ChromiumLauncher, CrawlOutcome, DriverLauncher, SpiderSessionManager};
