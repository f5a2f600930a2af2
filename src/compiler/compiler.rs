//! 规则编译器核心
//! 将原始规则编译为可执行的正则模式，兼容 Wappalyzer 正则方言

use std::collections::HashMap;
use std::time::Instant;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::debug;

use super::pattern::{CompiledPattern, CompiledRuleLibrary, CompiledTechRule, ImpliedTech};
use crate::error::RswResult;
use crate::rule::{RuleLibrary, TechRule, value_to_strings};

/// 关联技术未声明置信度时的默认值
const DEFAULT_IMPLIED_CONFIDENCE: u8 = 50;

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 编译规则库
    pub fn compile(rule_lib: &RuleLibrary) -> RswResult<CompiledRuleLibrary> {
        let start = Instant::now();
        let mut stats = CompileStats::default();

        let tech_patterns = rule_lib
            .tech_rules
            .iter()
            .map(|(tech_name, tech_rule)| {
                let compiled = Self::compile_tech_rule(tech_name, tech_rule, &mut stats);
                (tech_name.clone(), compiled)
            })
            .collect();

        debug!("✅ 规则编译完成，总耗时{:?}", start.elapsed());
        debug!(
            "📊 编译统计：URL模式{}条、HTML模式{}条、Script模式{}条、Header模式{}条、Meta模式{}条、Cookie模式{}条，跳过{}条",
            stats.url_count,
            stats.html_count,
            stats.script_count,
            stats.header_count,
            stats.meta_count,
            stats.cookie_count,
            stats.skipped_count
        );

        Ok(CompiledRuleLibrary {
            tech_patterns,
            category_map: rule_lib.category_names(),
        })
    }

    /// 编译单个技术规则
    fn compile_tech_rule(
        tech_name: &str,
        tech_rule: &TechRule,
        stats: &mut CompileStats,
    ) -> CompiledTechRule {
        let mut script_patterns = Self::compile_pattern_list(tech_rule.scripts.as_ref(), stats, PatternKind::Script);
        script_patterns.extend(Self::compile_pattern_list(tech_rule.script_src.as_ref(), stats, PatternKind::Script));

        CompiledTechRule {
            name: tech_name.to_string(),
            url_patterns: Self::compile_pattern_list(tech_rule.url.as_ref(), stats, PatternKind::Url),
            html_patterns: Self::compile_pattern_list(tech_rule.html.as_ref(), stats, PatternKind::Html),
            script_patterns,
            meta_patterns: Self::compile_keyed_patterns(tech_rule.meta.as_ref(), stats, PatternKind::Meta),
            header_patterns: Self::compile_keyed_patterns(tech_rule.headers.as_ref(), stats, PatternKind::Header),
            cookie_patterns: Self::compile_keyed_patterns(tech_rule.cookies.as_ref(), stats, PatternKind::Cookie),
            category_ids: tech_rule.category_ids.clone(),
            implies: tech_rule
                .implies
                .as_ref()
                .map(Self::parse_implies)
                .unwrap_or_default(),
            excludes: tech_rule
                .excludes
                .as_ref()
                .map(|v| value_to_strings(v).into_iter().map(|s| strip_tags(&s).to_string()).collect())
                .unwrap_or_default(),
        }
    }

    /// 编译列表型模式（url/html/script等）
    fn compile_pattern_list(
        value: Option<&Value>,
        stats: &mut CompileStats,
        kind: PatternKind,
    ) -> Vec<CompiledPattern> {
        let Some(value) = value else {
            return Vec::new();
        };

        let mut patterns = Vec::new();
        for raw in value_to_strings(value) {
            match Self::compile_single_pattern(&raw) {
                Ok(pattern) => {
                    patterns.push(pattern);
                    stats.record(kind);
                }
                Err(e) => {
                    stats.skipped_count += 1;
                    debug!("跳过无法编译的{:?}模式：{}，错误：{}", kind, raw, e);
                }
            }
        }
        patterns
    }

    /// 编译键值对型模式（meta/header/cookie），键统一小写
    fn compile_keyed_patterns(
        value: Option<&HashMap<String, Value>>,
        stats: &mut CompileStats,
        kind: PatternKind,
    ) -> HashMap<String, Vec<CompiledPattern>> {
        let Some(value) = value else {
            return HashMap::new();
        };

        value
            .iter()
            .filter_map(|(key, val)| {
                let patterns = Self::compile_pattern_list(Some(val), stats, kind);
                (!patterns.is_empty()).then(|| (key.to_lowercase(), patterns))
            })
            .collect()
    }

    /// 编译单个模式：`正则\;version:\1\;confidence:50`
    pub fn compile_single_pattern(raw_pattern: &str) -> RswResult<CompiledPattern> {
        let mut parts = raw_pattern.split("\\;");
        let body = parts.next().unwrap_or_default();

        let mut version_template = None;
        let mut confidence = 100u8;
        for tag in parts {
            if let Some(version) = tag.strip_prefix("version:") {
                version_template = Some(version.to_string());
            } else if let Some(value) = tag.strip_prefix("confidence:") {
                confidence = value.trim().parse::<u8>().map(|c| c.min(100)).unwrap_or(100);
            }
        }

        let regex = RegexBuilder::new(&Self::clean_pattern(body))
            .case_insensitive(true)
            .build()?;

        Ok(CompiledPattern {
            regex,
            confidence,
            version_template,
        })
    }

    /// 清理 Wappalyzer 正则中 Rust regex 不支持的写法
    fn clean_pattern(body: &str) -> String {
        static LOOK_AROUND_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r#"\(\?<?[=!][^()]*\)"#).expect("static look-around regex")
        });

        let mut cleaned = body;
        // 移除PCRE分隔符
        if cleaned.len() > 1 && cleaned.starts_with('/') && cleaned.ends_with('/') {
            cleaned = &cleaned[1..cleaned.len() - 1];
        }

        // 移除环视语法
        let cleaned = LOOK_AROUND_REGEX.replace_all(cleaned, "");
        let cleaned = Self::clean_invalid_escapes(&cleaned);
        Self::fix_unbalanced_groups(&cleaned)
    }

    /// 清理无效转义符：保留合法转义，去掉字母/尖括号前多余的反斜杠
    fn clean_invalid_escapes(s: &str) -> String {
        let mut cleaned = String::with_capacity(s.len());
        let mut chars = s.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '\\' {
                cleaned.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some(next_c) if is_supported_escape(next_c) => {
                    cleaned.push('\\');
                    cleaned.push(next_c);
                    chars.next();
                }
                Some(next_c) => {
                    cleaned.push(next_c);
                    chars.next();
                }
                // 末尾孤立反斜杠直接丢弃
                None => {}
            }
        }

        cleaned
    }

    /// 修复未闭合分组：丢弃多余的右括号，移除最靠后的未闭合左括号
    fn fix_unbalanced_groups(s: &str) -> String {
        let mut result: Vec<char> = Vec::with_capacity(s.len());
        let mut open_positions = Vec::new();
        let mut escaped = false;
        let mut in_class = false;

        for c in s.chars() {
            if escaped {
                escaped = false;
                result.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    result.push(c);
                }
                '[' if !in_class => {
                    in_class = true;
                    result.push(c);
                }
                ']' if in_class => {
                    in_class = false;
                    result.push(c);
                }
                '(' if !in_class => {
                    open_positions.push(result.len());
                    result.push(c);
                }
                ')' if !in_class => {
                    if open_positions.pop().is_some() {
                        result.push(c);
                    }
                }
                _ => result.push(c),
            }
        }

        for pos in open_positions.into_iter().rev() {
            result.remove(pos);
        }

        result.into_iter().collect()
    }

    /// 解析implies规则（逗号分隔字符串或数组，支持 `\;confidence:` 标记）
    fn parse_implies(implies: &Value) -> Vec<ImpliedTech> {
        value_to_strings(implies)
            .iter()
            .flat_map(|entry| entry.split(',').map(str::to_string).collect::<Vec<_>>())
            .filter_map(|entry| {
                let name = strip_tags(&entry).trim();
                if name.is_empty() {
                    return None;
                }
                let confidence = entry
                    .split("\\;")
                    .find_map(|tag| tag.strip_prefix("confidence:"))
                    .and_then(|c| c.trim().parse::<u8>().ok())
                    .unwrap_or(DEFAULT_IMPLIED_CONFIDENCE);
                Some(ImpliedTech {
                    name: name.to_string(),
                    confidence,
                })
            })
            .collect()
    }
}

/// 去掉 `\;` 之后的标记部分
fn strip_tags(entry: &str) -> &str {
    entry.split("\\;").next().unwrap_or(entry)
}

/// Rust regex 可接受的转义：字符类/断言/控制字符，以及除尖括号外的 ASCII 标点
fn is_supported_escape(c: char) -> bool {
    matches!(
        c,
        'd' | 'D' | 'w' | 'W' | 's' | 'S' | 'b' | 'B' | 'A' | 'z'
            | 'n' | 'r' | 't' | 'f' | 'v' | 'x' | 'u' | 'U' | 'p' | 'P'
    ) || c.is_ascii_digit()
        || (c.is_ascii_punctuation() && c != '<' && c != '>')
}

#[derive(Debug, Clone, Copy)]
enum PatternKind {
    Url,
    Html,
    Script,
    Header,
    Meta,
    Cookie,
}

/// 编译统计信息
#[derive(Debug, Clone, Default)]
struct CompileStats {
    url_count: usize,
    html_count: usize,
    script_count: usize,
    header_count: usize,
    meta_count: usize,
    cookie_count: usize,
    skipped_count: usize,
}

impl CompileStats {
    fn record(&mut self, kind: PatternKind) {
        match kind {
            PatternKind::Url => self.url_count += 1,
            PatternKind::Html => self.html_count += 1,
            PatternKind::Script => self.script_count += 1,
            PatternKind::Header => self.header_count += 1,
            PatternKind::Meta => self.meta_count += 1,
            PatternKind::Cookie => self.cookie_count += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_and_confidence_tags() {
        let pattern = RuleCompiler::compile_single_pattern(r"nginx(?:/([\d.]+))?\;version:\1\;confidence:75").unwrap();
        assert_eq!(pattern.confidence, 75);
        assert_eq!(pattern.version_template.as_deref(), Some(r"\1"));
        assert_eq!(pattern.match_version("NGINX/1.25.3"), Some(Some("1.25.3".to_string())));
        assert_eq!(pattern.match_version("nginx"), Some(None));
        assert_eq!(pattern.match_version("apache"), None);
    }

    #[test]
    fn test_look_around_removed() {
        let pattern = RuleCompiler::compile_single_pattern(r"jquery(?!-ui)\.js").unwrap();
        assert!(pattern.regex.is_match("jquery.js"));

        let pattern = RuleCompiler::compile_single_pattern(r"(?<!x)react\.js").unwrap();
        assert!(pattern.regex.is_match("react.js"));
    }

    #[test]
    fn test_invalid_escapes_and_groups_repaired() {
        assert_eq!(RuleCompiler::clean_invalid_escapes(r"\<div\>\.\d"), r"<div>\.\d");
        assert_eq!(RuleCompiler::clean_invalid_escapes(r"trailing\"), "trailing");
        assert_eq!(RuleCompiler::fix_unbalanced_groups("(abc"), "abc");
        assert_eq!(RuleCompiler::fix_unbalanced_groups("abc)"), "abc");
        assert_eq!(RuleCompiler::fix_unbalanced_groups(r"[(]x\("), r"[(]x\(");
    }

    #[test]
    fn test_uncompilable_patterns_are_skipped() {
        let mut lib = RuleLibrary::default();
        lib.tech_rules.insert(
            "Broken".to_string(),
            TechRule {
                html: Some(json!(["(a)\\1", "ok"])),
                ..TechRule::default()
            },
        );

        let compiled = RuleCompiler::compile(&lib).unwrap();
        // 反向引用不受支持，只保留第二条
        assert_eq!(compiled.tech_patterns["Broken"].html_patterns.len(), 1);
    }

    #[test]
    fn test_keyed_patterns_lowercased_and_implies_parsed() {
        let mut lib = RuleLibrary::default();
        lib.tech_rules.insert(
            "Django".to_string(),
            TechRule {
                headers: Some([("X-Frame".to_string(), json!(""))].into_iter().collect()),
                implies: Some(json!(["Python\\;confidence:80", "Jinja, HTMX"])),
                excludes: Some(json!("Flask")),
                ..TechRule::default()
            },
        );

        let compiled = RuleCompiler::compile(&lib).unwrap();
        let django = &compiled.tech_patterns["Django"];
        assert!(django.header_patterns.contains_key("x-frame"));
        assert_eq!(
            django.implies,
            vec![
                ImpliedTech { name: "Python".into(), confidence: 80 },
                ImpliedTech { name: "Jinja".into(), confidence: 50 },
                ImpliedTech { name: "HTMX".into(), confidence: 50 },
            ]
        );
        assert_eq!(django.excludes, vec!["Flask"]);
    }
}
