//! Tech detector core module
//! 检测器核心：整合各类分析器，输出 技术名 -> {版本, 分类}
use std::collections::BTreeSet;
use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, HeaderMap};
use tracing::debug;

use super::analyzer::{
    CookieAnalyzer, HeaderAnalyzer, HtmlAnalyzer, MetaAnalyzer, ScriptAnalyzer, UrlAnalyzer,
};
use crate::compiler::{CompiledRuleLibrary, RuleCompiler};
use crate::config::GlobalConfig;
use crate::error::{RswResult, RswappalyzerError};
use crate::extractor::HtmlExtractor;
use crate::fetcher::FetchedPage;
use crate::fingerprint::{Fingerprinter, TechInfo, TechMap};
use crate::rule::{RuleLibrary, RuleLoader};
use crate::utils::{DetectedMap, DetectionUpdater, HeaderConverter};

/// 规则未声明分类时使用的兜底分类
const FALLBACK_CATEGORY: &str = "Miscellaneous";

/// 技术检测器
#[derive(Debug, Clone)]
pub struct TechDetector {
    compiled_lib: Arc<CompiledRuleLibrary>,
}

impl TechDetector {
    /// 按配置的规则来源创建检测器
    pub async fn new(config: &GlobalConfig) -> RswResult<Self> {
        let rule_lib = RuleLoader::load(config).await?;
        Self::with_rules(&rule_lib)
    }

    /// 使用内置规则创建检测器
    pub fn with_embedded_rules() -> RswResult<Self> {
        Self::with_rules(&RuleLoader::load_embedded()?)
    }

    /// 使用内存中的RuleLibrary创建检测器
    pub fn with_rules(rule_lib: &RuleLibrary) -> RswResult<Self> {
        let compiled_lib = RuleCompiler::compile(rule_lib)?;
        Ok(Self {
            compiled_lib: Arc::new(compiled_lib),
        })
    }

    /// 已加载的技术规则数
    pub fn technology_count(&self) -> usize {
        self.compiled_lib.tech_patterns.len()
    }

    /// 核心检测接口（HeaderMap + URL + Body）
    pub fn detect(&self, headers: &HeaderMap, urls: &[&str], body: &[u8]) -> TechMap {
        let header_map = HeaderConverter::to_hashmap(headers);
        let cookies = HeaderConverter::cookies(headers);

        let html = String::from_utf8_lossy(body);
        let signals = HtmlExtractor::extract(&html);

        let lib = self.compiled_lib.as_ref();
        let mut detected = DetectedMap::new();
        UrlAnalyzer::analyze(lib, urls, &mut detected);
        HeaderAnalyzer::analyze(lib, &header_map, &mut detected);
        CookieAnalyzer::analyze(lib, &cookies, &mut detected);
        HtmlAnalyzer::analyze(lib, &html, &mut detected);
        ScriptAnalyzer::analyze(lib, &signals.script_srcs, &mut detected);
        MetaAnalyzer::analyze(lib, &signals.meta_tags, &mut detected);

        DetectionUpdater::apply_implies(lib, &mut detected);
        DetectionUpdater::apply_excludes(lib, &mut detected);

        debug!("检测完成，命中技术{}项", detected.len());
        self.to_tech_map(detected)
    }

    /// 分类ID转换为分类名称
    fn to_tech_map(&self, detected: DetectedMap) -> TechMap {
        detected
            .into_iter()
            .map(|(tech_name, detection)| {
                let mut categories: BTreeSet<String> = self
                    .compiled_lib
                    .tech_patterns
                    .get(&tech_name)
                    .map(|tech| {
                        tech.category_ids
                            .iter()
                            .filter_map(|cat_id| self.compiled_lib.category_map.get(cat_id).cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                if categories.is_empty() {
                    categories.insert(FALLBACK_CATEGORY.to_string());
                }

                (
                    tech_name,
                    TechInfo {
                        version: detection.version,
                        categories,
                    },
                )
            })
            .collect()
    }
}

impl Fingerprinter for TechDetector {
    fn fingerprint(&self, page: &FetchedPage) -> RswResult<TechMap> {
        if let Some(content_type) = page.headers.get(CONTENT_TYPE) {
            let content_type = content_type.to_str().map_err(|_| {
                RswappalyzerError::AnalysisError("unreadable Content-Type header".to_string())
            })?;
            if is_binary_content_type(content_type) {
                return Err(RswappalyzerError::AnalysisError(format!(
                    "unsupported content type: {}",
                    content_type
                )));
            }
        }

        Ok(self.detect(&page.headers, &[page.url.as_str()], &page.body))
    }
}

/// 非文本内容类型无法做 HTML 指纹识别
fn is_binary_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    ["image/", "audio/", "video/", "font/"]
        .iter()
        .any(|prefix| essence.starts_with(prefix))
        || matches!(
            essence.as_str(),
            "application/octet-stream"
                | "application/pdf"
                | "application/zip"
                | "application/gzip"
                | "application/x-tar"
                | "application/x-7z-compressed"
                | "application/vnd.rar"
                | "application/wasm"
        )
}
