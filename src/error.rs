//! 全局错误类型定义
//!
//! 请求链路上的错误分为两层：
//! - 传输层：`InvalidInput`、`Timeout`、`PoolSaturated`、`PoolClosed`，直接映射为 HTTP 状态码
//! - 业务层：`FetchError`、`AnalysisError`、`InternalFault`，在分析工作者边界被转换为结果数据

use thiserror::Error;
use regex::Error as RegexError;
use std::io::Error as IoError;
use std::time::Duration;

#[derive(Error, Debug)]
pub enum RswappalyzerError {
    // 请求链路错误
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("fetch failed: {0}")]
    FetchError(String),
    #[error("analysis failed: {0}")]
    AnalysisError(String),
    #[error("internal fault: {0}")]
    InternalFault(String),
    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),

    // 工作池错误
    #[error("worker pool saturated: {0} jobs already queued")]
    PoolSaturated(usize),
    #[error("worker pool is shutting down")]
    PoolClosed,

    // 规则相关错误
    #[error("rule load failed: {0}")]
    RuleLoadError(String),
    #[error("rule cache failed: {0}")]
    RuleCacheError(String),
    #[error("rule parse failed: {0}")]
    RuleParseError(String),

    // 编译相关错误
    #[error("regex compile failed: {0}")]
    RegexCompileError(#[from] RegexError),

    // 网络相关错误
    #[error("http client error: {0}")]
    HttpError(#[from] reqwest::Error),

    // 基础错误
    #[error("io error: {0}")]
    IoError(#[from] IoError),
}

/// 拼接错误及其 source 链，便于完整呈现底层原因（如 DNS/连接/TLS 失败）
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }
    message
}

// 全局Result类型
pub type RswResult<T> = Result<T, RswappalyzerError>;
