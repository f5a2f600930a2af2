//! rswappalyzer-server 启动入口
//! 解析命令行 -> 初始化日志 -> 加载规则并装配服务 -> 监听，Ctrl-C 优雅停机

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rswappalyzer_server::config::{DEFAULT_USER_AGENT, WAPPALYZERGO_RULES_URL};
use rswappalyzer_server::{ConfigManager, GlobalConfig, RuleSource, build_state, serve};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "rswappalyzer-server",
    about = "Fetch a website and report its technology stack over HTTP",
    version
)]
struct Cli {
    /// Bind host
    #[arg(long, env = "RSW_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(short, long, env = "RSW_PORT", default_value_t = 8080)]
    port: u16,

    /// Maximum number of analyses running at once
    #[arg(
        long,
        env = "RSW_POOL_SIZE",
        default_value_t = 10,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pool_size: u16,

    /// Reject requests with 503 once this many analyses are waiting [default: unbounded]
    #[arg(long, env = "RSW_MAX_QUEUE_DEPTH")]
    max_queue_depth: Option<usize>,

    /// Page fetch timeout in seconds
    #[arg(long, env = "RSW_HTTP_TIMEOUT", default_value_t = 30)]
    http_timeout: u64,

    /// Give up waiting for an analysis after this many seconds (504) [default: wait forever]
    #[arg(long, env = "RSW_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Maximum accepted response body size in bytes
    #[arg(long, env = "RSW_MAX_BODY_BYTES", default_value_t = 5 * 1024 * 1024)]
    max_body_bytes: usize,

    /// User-Agent sent when fetching pages
    #[arg(long, env = "RSW_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Load rules from a local Wappalyzer / wappalyzergo JSON file
    #[arg(long, env = "RSW_RULES_FILE", value_name = "FILE", conflicts_with = "rules_url")]
    rules_file: Option<PathBuf>,

    /// Load rules from a remote JSON file; use without value for the wappalyzergo fingerprints
    #[arg(
        long,
        env = "RSW_RULES_URL",
        value_name = "URL",
        num_args = 0..=1,
        default_missing_value = WAPPALYZERGO_RULES_URL
    )]
    rules_url: Option<String>,

    /// MessagePack cache for remote rules
    #[arg(long, env = "RSW_RULE_CACHE", value_name = "FILE", default_value = "wappalyzer_rules.mp")]
    rule_cache: PathBuf,

    /// Enable debug logging for this crate
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> GlobalConfig {
        let rule_source = match (self.rules_file, self.rules_url) {
            (Some(path), _) => RuleSource::LocalFile(path),
            (None, Some(url)) => RuleSource::Remote(url),
            (None, None) => RuleSource::Embedded,
        };

        ConfigManager::custom()
            .bind_host(self.host)
            .port(self.port)
            .pool_size(usize::from(self.pool_size))
            .max_queue_depth(self.max_queue_depth)
            .http_timeout(self.http_timeout)
            .request_timeout(self.request_timeout)
            .max_body_bytes(self.max_body_bytes)
            .user_agent(self.user_agent)
            .rule_source(rule_source)
            .rule_cache_path(self.rule_cache)
            .verbose(self.verbose)
            .build()
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "info,rswappalyzer_server=debug,tower_http=debug"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config();
    init_tracing(config.verbose);

    tracing::info!("规则来源：{:?}", config.rule_source);
    let state = build_state(&config)
        .await
        .context("failed to initialise technology detector")?;

    serve(&config, state)
        .await
        .with_context(|| format!("server on {} terminated abnormally", config.bind_addr()))?;
    Ok(())
}
