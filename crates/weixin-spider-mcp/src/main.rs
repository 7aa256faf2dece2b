//! WeixinSpider MCP server: entry point.

use std::sync::Arc;
use tokio::sync::Mutex;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use weixin_spider_mcp::config::{resolve_articles_dir, SpiderOverrides};
use weixin_spider_mcp::protocol::ProtocolHandler;
use weixin_spider_mcp::session::SpiderSessionManager;
use weixin_spider_mcp::tools::ToolRegistry;
use weixin_spider_mcp::transport::StdioTransport;
use weixin_spider_mcp::types::CrawlParams;

#[derive(Parser)]
#[command(
    name = "weixin-spider-mcp",
    about = "MCP server that crawls WeChat official-account articles to disk",
    version
)]
struct Cli {
    /// Directory articles are saved under.
    #[arg(long, global = true)]
    articles_dir: Option<String>,

    /// Show the browser window instead of running headless.
    #[arg(long, global = true)]
    headful: bool,

    /// Load attempts per article.
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Seconds to wait for the article title to appear.
    #[arg(long, global = true)]
    wait_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve,

    /// Crawl one article and save it.
    Fetch {
        /// Article URL (https://mp.weixin.qq.com/...).
        url: String,

        /// Save under this directory name.
        #[arg(long)]
        name: Option<String>,

        /// Skip image downloads.
        #[arg(long)]
        no_images: bool,
    },

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   weixin-spider-mcp completions bash > /etc/bash_completion.d/weixin-spider-mcp
    ///   weixin-spider-mcp completions zsh > ~/.zfunc/_weixin-spider-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides = SpiderOverrides {
        headful: cli.headful,
        max_attempts: cli.max_attempts,
        wait_timeout: cli.wait_timeout,
    };
    let articles_dir = resolve_articles_dir(cli.articles_dir.as_deref());

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            tracing::info!("WeixinSpider MCP server");
            let session = SpiderSessionManager::new(overrides.build(), articles_dir)?;
            let session = Arc::new(Mutex::new(session));
            let handler = ProtocolHandler::new(session);
            let transport = StdioTransport::new(handler);
            transport.run().await?;
        }

        Commands::Fetch {
            url,
            name,
            no_images,
        } => {
            let mut session = SpiderSessionManager::new(overrides.build(), articles_dir)?;
            let params = CrawlParams {
                url,
                download_images: !no_images,
                custom_filename: name,
            };
            let result = session.crawl(&params).await;
            session.close().await;
            let outcome = result?;
            println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
        }

        Commands::Info => {
            let capabilities = weixin_spider_mcp::types::InitializeResult::default_result();
            let tools = ToolRegistry::list_tools();
            let info = serde_json::json!({
                "server": capabilities.server_info,
                "protocol_version": capabilities.protocol_version,
                "capabilities": capabilities.capabilities,
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
                "articles_directory": articles_dir,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "weixin-spider-mcp", &mut std::io::stdout());
        }

        Commands::Repl => {
            weixin_spider_mcp::repl::run(overrides, articles_dir).await?;
        }
    }

    Ok(())
}
