//! 全局配置管理,存储所有可配置项

use std::path::PathBuf;
use std::time::Duration;

use crate::pool::MAX_CAPACITY;

/// wappalyzergo 完整指纹文件地址
pub const WAPPALYZERGO_RULES_URL: &str =
    "https://raw.githubusercontent.com/projectdiscovery/wappalyzergo/refs/heads/main/fingerprints_data.json";

/// 默认抓取 User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("rswappalyzer-server/", env!("CARGO_PKG_VERSION"));

/// 规则来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// 随二进制内置的规则文件
    Embedded,
    /// 本地规则文件（Wappalyzer / wappalyzergo JSON）
    LocalFile(PathBuf),
    /// 远程规则文件，首次拉取后以 MessagePack 缓存到本地
    Remote(String),
}

/// 全局配置
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    // 监听地址
    pub bind_host: String,
    pub port: u16,
    // 工作池并发上限
    pub pool_size: usize,
    // 排队上限，None 表示不限制
    pub max_queue_depth: Option<usize>,
    // 页面抓取超时（单位：秒）
    pub http_timeout: u64,
    // 单次请求等待分析结果的上限（单位：秒），None 表示一直等待
    pub request_timeout: Option<u64>,
    // 响应体大小上限（字节）
    pub max_body_bytes: usize,
    pub user_agent: String,
    // 规则来源与缓存路径
    pub rule_source: RuleSource,
    pub rule_cache_path: PathBuf,
    // 是否启用详细日志
    pub verbose: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            pool_size: 10,
            max_queue_depth: None,
            http_timeout: 30,
            request_timeout: None,
            max_body_bytes: 5 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            rule_source: RuleSource::Embedded,
            rule_cache_path: PathBuf::from("wappalyzer_rules.mp"),
            verbose: false,
        }
    }
}

impl GlobalConfig {
    /// 监听地址（host:port）
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    pub fn request_wait_limit(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs)
    }
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> GlobalConfig {
        GlobalConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone, Default)]
pub struct CustomConfigBuilder {
    config: GlobalConfig,
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.config.bind_host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// 工作池容量，限定在 1..=MAX_CAPACITY
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size.clamp(1, MAX_CAPACITY);
        self
    }

    pub fn max_queue_depth(mut self, depth: Option<usize>) -> Self {
        self.config.max_queue_depth = depth;
        self
    }

    pub fn http_timeout(mut self, timeout: u64) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Option<u64>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn rule_source(mut self, source: RuleSource) -> Self {
        self.config.rule_source = source;
        self
    }

    pub fn rule_cache_path(mut self, path: PathBuf) -> Self {
        self.config.rule_cache_path = path;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn build(self) -> GlobalConfig {
        self.config
    }
}
