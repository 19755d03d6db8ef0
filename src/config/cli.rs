use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the lexquery binary.
#[derive(Debug, Parser)]
#[command(
    name = "lexquery",
    version,
    about = "Query the legal-services site backend through the lexquery cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "LEXQUERY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the backend base URL.
    #[arg(long = "api-base-url", value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    /// Override the per-request timeout.
    #[arg(long = "api-timeout-ms", value_name = "MILLISECONDS", global = true)]
    pub api_timeout_ms: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List calendar events.
    Events,
    /// Search legal news, loading one or more pages into one feed.
    News(NewsArgs),
    /// List support tickets, or show a single ticket.
    Tickets(TicketsArgs),
    /// Send a message to the AI assistant.
    Chat(ChatArgs),
}

#[derive(Debug, Args, Clone)]
pub struct NewsArgs {
    /// Search terms.
    #[arg(long = "q", value_name = "QUERY")]
    pub q: String,

    /// First page to load.
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    #[arg(long = "page-size", default_value_t = 10)]
    pub page_size: u32,

    /// Number of consecutive pages to load and merge.
    #[arg(long, default_value_t = 1)]
    pub pages: u32,
}

#[derive(Debug, Args, Clone)]
pub struct TicketsArgs {
    /// Show only this ticket.
    #[arg(long, value_name = "ID")]
    pub id: Option<i64>,
}

#[derive(Debug, Args, Clone)]
pub struct ChatArgs {
    #[arg(long, value_name = "TEXT")]
    pub prompt: String,
}
