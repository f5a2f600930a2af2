//! rswappalyzer-server - 网站技术栈识别服务
//!
//! 给定目标 URL，抓取页面并基于 Wappalyzer 规则识别所用的技术（框架、服务器、前端库、统计工具等），
//! 输出 技术名 -> {版本, 分类}。
//!
//! 请求链路：`server::handler` -> `validator` -> `pool::WorkerPool` -> `worker::AnalysisWorker`
//! -> (`fetcher::PageFetcher`, `fingerprint::Fingerprinter`)

// 导出全局错误类型
pub use self::error::{RswResult, RswappalyzerError};

// 导出配置模块
pub use self::config::{ConfigManager, CustomConfigBuilder, GlobalConfig, RuleSource};

// 导出规则模块核心接口
pub use self::rule::{CategoryRule, RuleCacheManager, RuleLibrary, RuleLoader, TechRule};

// 导出提取模块核心接口
pub use self::extractor::{HtmlExtractor, PageSignals};

// 导出编译模块核心接口
pub use self::compiler::{CompiledPattern, CompiledRuleLibrary, CompiledTechRule, RuleCompiler};

// 导出检测模块核心接口
pub use self::detector::TechDetector;

// 导出请求链路核心接口
pub use self::fetcher::{FetchedPage, HttpPageFetcher, PageFetcher};
pub use self::fingerprint::{Fingerprinter, TechInfo, TechMap};
pub use self::pool::{Ticket, WorkerPool};
pub use self::server::{AppState, build_state, create_router, serve};
pub use self::validator::{AnalysisRequest, is_valid_url, validate_url};
pub use self::worker::{AnalysisResult, AnalysisWorker};

// 声明所有子模块
pub mod compiler;
pub mod config;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod fingerprint;
pub mod pool;
pub mod rule;
pub mod server;
pub mod utils;
pub mod validator;
pub mod worker;
