//! 检测结果更新工具
//! 负责叠加置信度、保留版本，并应用 implies / excludes 关联规则

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::debug;

use crate::compiler::CompiledRuleLibrary;

/// 单个技术的中间检测状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    pub confidence: u8,
    pub version: Option<String>,
}

/// 技术名 -> 检测状态
pub type DetectedMap = HashMap<String, Detection>;

/// 检测结果更新工具
pub struct DetectionUpdater;

impl DetectionUpdater {
    /// 更新检测结果：置信度累加（上限100），版本取首个非空值
    pub fn update(
        detected: &mut DetectedMap,
        tech_name: &str,
        confidence: u8,
        version: Option<String>,
    ) {
        match detected.entry(tech_name.to_string()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.confidence = existing.confidence.saturating_add(confidence).min(100);
                if existing.version.is_none() {
                    existing.version = version;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Detection {
                    confidence: confidence.min(100),
                    version,
                });
            }
        }
    }

    /// 应用关联推导规则（implies），传递闭包；规则库中不存在的技术忽略
    pub fn apply_implies(compiled_lib: &CompiledRuleLibrary, detected: &mut DetectedMap) {
        let mut pending: Vec<String> = detected.keys().cloned().collect();

        while let Some(tech_name) = pending.pop() {
            let Some(tech) = compiled_lib.tech_patterns.get(&tech_name) else {
                continue;
            };
            for implied in &tech.implies {
                if detected.contains_key(&implied.name) {
                    continue;
                }
                if !compiled_lib.tech_patterns.contains_key(&implied.name) {
                    debug!("关联技术 {} 不在规则库中，忽略（来源：{}）", implied.name, tech_name);
                    continue;
                }
                detected.insert(
                    implied.name.clone(),
                    Detection {
                        confidence: implied.confidence,
                        version: None,
                    },
                );
                pending.push(implied.name.clone());
            }
        }
    }

    /// 应用排斥规则（excludes）
    pub fn apply_excludes(compiled_lib: &CompiledRuleLibrary, detected: &mut DetectedMap) {
        let excluded: Vec<String> = detected
            .keys()
            .filter_map(|name| compiled_lib.tech_patterns.get(name))
            .flat_map(|tech| tech.excludes.iter().cloned())
            .collect();

        for name in excluded {
            if detected.remove(&name).is_some() {
                debug!("技术 {} 被排斥规则移除", name);
            }
        }
    }
}
