//! 检测分析器：按信号类型（URL/Header/Cookie/HTML/Script/Meta）匹配规则
use std::collections::HashMap;
use tracing::debug;

use crate::compiler::{CompiledPattern, CompiledRuleLibrary};
use crate::utils::{DetectedMap, DetectionUpdater};

/// 用一组模式匹配输入，命中的每条模式都累积一次
fn apply_patterns(
    tech_name: &str,
    patterns: &[CompiledPattern],
    input: &str,
    detected: &mut DetectedMap,
) -> bool {
    let mut hit = false;
    for pattern in patterns {
        if let Some(version) = pattern.match_version(input) {
            DetectionUpdater::update(detected, tech_name, pattern.confidence, version);
            hit = true;
        }
    }
    hit
}

/// URL分析器
pub struct UrlAnalyzer;

impl UrlAnalyzer {
    pub fn analyze(compiled_lib: &CompiledRuleLibrary, urls: &[&str], detected: &mut DetectedMap) {
        for compiled_tech in compiled_lib.tech_patterns.values() {
            if compiled_tech.url_patterns.is_empty() {
                continue;
            }
            for url in urls {
                // 同一技术命中一个URL即可
                if apply_patterns(&compiled_tech.name, &compiled_tech.url_patterns, url, detected) {
                    debug!("URL匹配成功：技术={}，URL={}", compiled_tech.name, url);
                    break;
                }
            }
        }
    }
}

/// Header分析器
pub struct HeaderAnalyzer;

impl HeaderAnalyzer {
    pub fn analyze(
        compiled_lib: &CompiledRuleLibrary,
        headers: &HashMap<String, Vec<String>>,
        detected: &mut DetectedMap,
    ) {
        for compiled_tech in compiled_lib.tech_patterns.values() {
            for (header_name, patterns) in &compiled_tech.header_patterns {
                let Some(values) = headers.get(header_name) else {
                    continue;
                };
                for value in values {
                    if apply_patterns(&compiled_tech.name, patterns, value, detected) {
                        debug!("Header匹配成功：技术={}，Header={}", compiled_tech.name, header_name);
                        break;
                    }
                }
            }
        }
    }
}

/// Cookie分析器
pub struct CookieAnalyzer;

impl CookieAnalyzer {
    pub fn analyze(
        compiled_lib: &CompiledRuleLibrary,
        cookies: &HashMap<String, String>,
        detected: &mut DetectedMap,
    ) {
        if cookies.is_empty() {
            return;
        }
        for compiled_tech in compiled_lib.tech_patterns.values() {
            for (cookie_name, patterns) in &compiled_tech.cookie_patterns {
                if let Some(value) = cookies.get(cookie_name) {
                    apply_patterns(&compiled_tech.name, patterns, value, detected);
                }
            }
        }
    }
}

/// HTML分析器
pub struct HtmlAnalyzer;

impl HtmlAnalyzer {
    pub fn analyze(compiled_lib: &CompiledRuleLibrary, html: &str, detected: &mut DetectedMap) {
        for compiled_tech in compiled_lib.tech_patterns.values() {
            apply_patterns(&compiled_tech.name, &compiled_tech.html_patterns, html, detected);
        }
    }
}

/// Script分析器
pub struct ScriptAnalyzer;

impl ScriptAnalyzer {
    pub fn analyze(
        compiled_lib: &CompiledRuleLibrary,
        script_srcs: &[String],
        detected: &mut DetectedMap,
    ) {
        for compiled_tech in compiled_lib.tech_patterns.values() {
            if compiled_tech.script_patterns.is_empty() {
                continue;
            }
            for src in script_srcs {
                apply_patterns(&compiled_tech.name, &compiled_tech.script_patterns, src, detected);
            }
        }
    }
}

/// Meta分析器
pub struct MetaAnalyzer;

impl MetaAnalyzer {
    pub fn analyze(
        compiled_lib: &CompiledRuleLibrary,
        meta_tags: &[(String, String)],
        detected: &mut DetectedMap,
    ) {
        for (meta_name, content) in meta_tags {
            for compiled_tech in compiled_lib.tech_patterns.values() {
                if let Some(patterns) = compiled_tech.meta_patterns.get(meta_name) {
                    apply_patterns(&compiled_tech.name, patterns, content, detected);
                }
            }
        }
    }
}
