//! 编译后模式模型
//! 正则编译后的结构

use std::collections::HashMap;
use regex::{Captures, Regex};

use crate::utils::VersionExtractor;

/// 编译后的正则模式
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub confidence: u8,
    pub version_template: Option<String>,
}

impl CompiledPattern {
    /// 匹配输入，命中时返回提取到的版本（可能为空）
    pub fn match_version(&self, input: &str) -> Option<Option<String>> {
        let captures: Captures = self.regex.captures(input)?;
        Some(VersionExtractor::extract(&self.version_template, &captures))
    }
}

/// 关联技术（implies）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpliedTech {
    pub name: String,
    pub confidence: u8,
}

/// 技术编译后的规则
#[derive(Debug, Clone, Default)]
pub struct CompiledTechRule {
    pub name: String,
    pub url_patterns: Vec<CompiledPattern>,
    pub html_patterns: Vec<CompiledPattern>,
    pub script_patterns: Vec<CompiledPattern>,
    // 键统一小写
    pub meta_patterns: HashMap<String, Vec<CompiledPattern>>,
    pub header_patterns: HashMap<String, Vec<CompiledPattern>>,
    pub cookie_patterns: HashMap<String, Vec<CompiledPattern>>,
    pub category_ids: Vec<u32>,
    pub implies: Vec<ImpliedTech>,
    pub excludes: Vec<String>,
}

/// 编译后的规则库
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleLibrary {
    pub tech_patterns: HashMap<String, CompiledTechRule>,
    pub category_map: HashMap<u32, String>, // 分类ID -> 分类名称
}
