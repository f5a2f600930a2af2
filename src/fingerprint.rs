//! Fingerprint engine contract
//! 指纹识别引擎接口：页面内容/响应头 -> 技术名 -> {版本, 分类}
//!
//! 未识别到任何技术时返回空表，这是合法结果；仅在内容无法解析时返回 `AnalysisError`

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::RswResult;
use crate::fetcher::FetchedPage;

/// 单项技术的识别结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechInfo {
    pub version: Option<String>,
    pub categories: BTreeSet<String>,
}

/// 技术名 -> 识别结果（按名称排序，输出稳定）
pub type TechMap = BTreeMap<String, TechInfo>;

/// 指纹识别引擎
///
/// 实现需为无状态的纯计算，可被多个工作者并发调用
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, page: &FetchedPage) -> RswResult<TechMap>;
}
