//! 版本提取工具模块
//! 根据版本模板从正则捕获结果中提取版本号
//! 支持 \1/$1 分组引用，以及 Wappalyzer 三元写法 `\1?有:无`

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// 版本提取工具类
pub struct VersionExtractor;

impl VersionExtractor {
    /// 从正则捕获结果中提取有效版本号
    ///
    /// 未发生分组替换、结果为空或残留占位符时返回 `None`
    pub fn extract(version_template: &Option<String>, captures: &Captures) -> Option<String> {
        let template = version_template.as_deref()?.trim();
        if template.is_empty() {
            return None;
        }

        let template = Self::resolve_ternary(template, captures);
        let mut version = template.clone();
        let mut replaced = false;

        // 0 是整体匹配，不参与版本提取；倒序替换避免 \1 误伤 \10
        for group_index in (1..captures.len()).rev() {
            let placeholder_backslash = format!("\\{}", group_index);
            let placeholder_dollar = format!("${}", group_index);
            if !version.contains(&placeholder_backslash) && !version.contains(&placeholder_dollar) {
                continue;
            }

            let matched_str = captures.get(group_index).map(|m| m.as_str().trim()).unwrap_or("");
            if !matched_str.is_empty() {
                replaced = true;
            }
            version = version.replace(&placeholder_backslash, matched_str);
            version = version.replace(&placeholder_dollar, matched_str);
        }

        // 三元写法可能直接给出字面量版本
        if template_is_literal(&template) {
            replaced = true;
        }

        let final_version = version.trim().to_string();
        let is_valid = replaced
            && !final_version.is_empty()
            && !final_version.contains('\\')
            && !final_version.contains('$');

        is_valid.then_some(final_version)
    }

    /// 展开三元模板：`\1?a:b` 分组非空取 a，否则取 b
    fn resolve_ternary(template: &str, captures: &Captures) -> String {
        static TERNARY_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r#"^\\(\d+)\?([^:]*):(.*)$"#).expect("static ternary regex")
        });

        let Some(parts) = TERNARY_REGEX.captures(template) else {
            return template.to_string();
        };
        let group_matched = parts[1]
            .parse::<usize>()
            .ok()
            .and_then(|index| captures.get(index))
            .is_some_and(|m| !m.as_str().trim().is_empty());

        if group_matched {
            parts[2].to_string()
        } else {
            parts[3].to_string()
        }
    }
}

fn template_is_literal(template: &str) -> bool {
    !template.is_empty() && !template.contains('\\') && !template.contains('$')
}
