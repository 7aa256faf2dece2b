//! Interactive REPL for the WeixinSpider MCP server.
//!
//! Launch with `weixin-spider-mcp repl` to enter interactive mode.
//! Type `/help` for available commands, Tab for completion.

use std::path::PathBuf;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use crate::config::SpiderOverrides;
use crate::session::manager::RECENT_LIMIT;
use crate::session::SpiderSessionManager;
use crate::tools::ToolRegistry;
use crate::types::CrawlParams;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/fetch", "Crawl an article: /fetch <url> [name]"),
    ("/recent", "List recently saved articles"),
    ("/tools", "List available MCP tools"),
    ("/info", "Show server capabilities and tools"),
    ("/config", "Show spider settings"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion.
#[derive(Default)]
struct SpiderHelper;

impl Completer for SpiderHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for SpiderHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for SpiderHelper {}
impl Validator for SpiderHelper {}
impl Helper for SpiderHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Run the interactive REPL.
///
/// The browser is started by the first `/fetch` and closed on exit.
pub async fn run(overrides: SpiderOverrides, articles_dir: PathBuf) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mweixin-spider-mcp v{}\x1b[0m \
         \x1b[90m- WeChat article crawler\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \
         \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<SpiderHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(SpiderHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".weixin_spider_mcp_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut session = SpiderSessionManager::new(overrides.build(), articles_dir)?;
    let prompt = " \x1b[36mweixin>\x1b[0m ";

    loop {
        let read = tokio::task::block_in_place(|| rl.readline(prompt));
        match read {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let mut parts = input.splitn(2, ' ');
                let cmd = parts.next().unwrap_or("");
                let args = parts.next().unwrap_or("").trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "info" => cmd_info(),
                    "tools" => cmd_tools(),
                    "config" => cmd_config(&session),
                    "recent" => cmd_recent(&session),
                    "fetch" => cmd_fetch(args, &mut session).await,
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    session.close().await;
    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
}

fn cmd_info() {
    let capabilities = crate::types::InitializeResult::default_result();
    let tools = ToolRegistry::list_tools();
    eprintln!();
    eprintln!(
        "  Server:   {} v{}",
        capabilities.server_info.name, capabilities.server_info.version
    );
    eprintln!("  Protocol: {}", capabilities.protocol_version);
    eprintln!("  Tools:    {}", tools.len());
    eprintln!();
}

fn cmd_tools() {
    let tools = ToolRegistry::list_tools();
    eprintln!();
    eprintln!("  {} MCP tools available:", tools.len());
    eprintln!();
    for tool in &tools {
        eprintln!(
            "    {:<28} {}",
            tool.name,
            tool.description.as_deref().unwrap_or("")
        );
    }
    eprintln!();
}

fn cmd_config(session: &SpiderSessionManager) {
    let config = session.config();
    eprintln!();
    eprintln!("  Articles:     {}", session.articles_dir().display());
    eprintln!(
        "  Browser:      {}",
        if session.is_ready() { "ready" } else { "not started" }
    );
    eprintln!("  Headless:     {}", config.headless);
    eprintln!("  Max attempts: {}", config.max_attempts);
    eprintln!("  Wait:         {}s", config.readiness_timeout.as_secs());
    eprintln!("  Images:       {}", config.download_images);
    eprintln!();
}

fn cmd_recent(session: &SpiderSessionManager) {
    match session.recent(RECENT_LIMIT) {
        Ok(articles) if articles.is_empty() => {
            eprintln!("  No saved articles in {}", session.articles_dir().display());
        }
        Ok(articles) => {
            eprintln!();
            for article in &articles {
                eprintln!(
                    "    {:<20} {}  \x1b[90m{}\x1b[0m",
                    article.crawl_time,
                    article.title,
                    article.directory.display()
                );
            }
            eprintln!();
        }
        Err(e) => eprintln!("  Cannot list articles: {e}"),
    }
}

async fn cmd_fetch(args: &str, session: &mut SpiderSessionManager) {
    let mut parts = args.split_whitespace();
    let Some(url) = parts.next() else {
        eprintln!("  Usage: /fetch <url> [name]");
        return;
    };
    let params = CrawlParams {
        url: url.to_string(),
        download_images: session.config().download_images,
        custom_filename: parts.next().map(str::to_string),
    };

    eprintln!("  Fetching {url} ...");
    match session.crawl(&params).await {
        Ok(outcome) => {
            let record = &outcome.record;
            eprintln!("  \x1b[32mSaved\x1b[0m {}", record.title);
            eprintln!("    Author:    {}", record.author);
            eprintln!("    Published: {}", record.publish_time);
            eprintln!(
                "    Images:    {}/{}",
                record.resolved_image_count(),
                record.images.len()
            );
            eprintln!("    Directory: {}", outcome.location.directory.display());
        }
        Err(e) => eprintln!("  \x1b[31mFailed\x1b[0m {e}"),
    }
}
