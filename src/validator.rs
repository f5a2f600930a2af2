//! URL validator
//! 纯语法校验：只接受带主机名的绝对 http/https 地址，不做任何网络访问

use std::net::Ipv4Addr;

use url::{Host, Url};

use crate::error::{RswResult, RswappalyzerError};

/// 400 响应使用的固定错误信息
pub const INVALID_URL_MESSAGE: &str = "Invalid or missing URL";

/// 单个域名标签最大长度
const MAX_LABEL_LEN: usize = 63;

/// 已通过校验的分析请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// 调用方传入的原始字符串，结果中原样回显
    pub raw: String,
    pub url: Url,
}

impl AnalysisRequest {
    /// 缺失或非法输入统一返回 `InvalidInput`
    pub fn parse(input: Option<&str>) -> RswResult<Self> {
        let raw = input.ok_or_else(invalid_input)?;
        let url = validate_url(raw).ok_or_else(invalid_input)?;
        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }
}

fn invalid_input() -> RswappalyzerError {
    RswappalyzerError::InvalidInput(INVALID_URL_MESSAGE.to_string())
}

/// 是否为合法的绝对 URL
pub fn is_valid_url(input: &str) -> bool {
    validate_url(input).is_some()
}

/// 校验并解析 URL
pub fn validate_url(input: &str) -> Option<Url> {
    if input.is_empty() || input.chars().any(char::is_whitespace) {
        return None;
    }

    let url = Url::parse(input).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    // url 会把 `http:example.com` 宽松地补全，这里要求显式的 `scheme://`
    let prefix = format!("{}://", url.scheme());
    if !input
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(&prefix))
    {
        return None;
    }

    match url.host()? {
        // url 会把 `0x7f.1`、`2130706433` 之类的简写改写为 IPv4，这里只认原文中的点分十进制
        Host::Ipv4(_) => raw_host(&input[prefix.len()..])
            .parse::<Ipv4Addr>()
            .is_ok()
            .then_some(url),
        Host::Ipv6(_) => Some(url),
        Host::Domain(domain) => is_valid_domain(domain).then_some(url),
    }
}

/// 取 `scheme://` 之后原文中的主机部分（去掉用户信息与端口）
fn raw_host(rest: &str) -> &str {
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    host_port.split(':').next().unwrap_or_default()
}

/// 至少两级标签，顶级域为字母或 punycode
fn is_valid_domain(domain: &str) -> bool {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|label| is_valid_label(label)) {
        return false;
    }

    let tld = labels[labels.len() - 1];
    tld.starts_with("xn--") || (tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
