//! 规则加载管理器
//! 负责从内置规则、本地文件或远程源（带本地缓存）加载规则库

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::cache::RuleCacheManager;
use super::model::{CategoryRule, RuleLibrary, TechRule};
use crate::config::{GlobalConfig, RuleSource};
use crate::error::{RswResult, RswappalyzerError};

/// 内置规则文件
static EMBEDDED_RULES: &str = include_str!("../../data/rules.json");

/// 规则文件结构：兼容 Wappalyzer（technologies + categories）与 wappalyzergo（apps）
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(alias = "apps")]
    technologies: HashMap<String, TechRule>,
    #[serde(default)]
    categories: HashMap<String, CategoryRule>,
}

/// 规则加载管理器
pub struct RuleLoader;

impl RuleLoader {
    /// 按配置的规则来源加载规则库
    pub async fn load(config: &GlobalConfig) -> RswResult<RuleLibrary> {
        match &config.rule_source {
            RuleSource::Embedded => Self::load_embedded(),
            RuleSource::LocalFile(path) => Self::load_file(path).await,
            RuleSource::Remote(url) => Self::load_remote(config, url).await,
        }
    }

    /// 加载内置规则
    pub fn load_embedded() -> RswResult<RuleLibrary> {
        Self::parse_json(EMBEDDED_RULES.as_bytes())
    }

    /// 加载本地规则文件
    pub async fn load_file(path: &Path) -> RswResult<RuleLibrary> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            RswappalyzerError::RuleLoadError(format!("读取规则文件 {} 失败：{}", path.display(), e))
        })?;
        let rule_lib = Self::parse_json(&data)?;
        debug!("从本地文件 {} 加载规则库成功", path.display());
        Ok(rule_lib)
    }

    /// 远程规则（优先本地缓存，缓存失效则拉取远程）
    async fn load_remote(config: &GlobalConfig, url: &str) -> RswResult<RuleLibrary> {
        if let Ok(rule_lib) = RuleCacheManager::load_from_cache(&config.rule_cache_path).await {
            debug!("从本地缓存加载规则库成功");
            return Ok(rule_lib);
        }
        warn!("本地缓存不存在或损坏，将拉取远程规则库：{}", url);

        let rule_lib = Self::fetch_remote(config, url).await?;

        if let Err(e) = RuleCacheManager::save_to_cache(&config.rule_cache_path, &rule_lib).await {
            warn!("规则库缓存到本地失败：{}", e);
        } else {
            debug!("远程规则库已缓存到本地：{}", config.rule_cache_path.display());
        }

        Ok(rule_lib)
    }

    /// 拉取远程规则文件
    pub async fn fetch_remote(config: &GlobalConfig, url: &str) -> RswResult<RuleLibrary> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RswappalyzerError::RuleLoadError(format!(
                "URL {} 返回状态码 {}",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        let rule_lib = Self::parse_json(&bytes)?;
        debug!("成功拉取远程规则库，规则总数：{}", rule_lib.tech_rules.len());
        Ok(rule_lib)
    }

    /// 解析 JSON 规则文件
    pub fn parse_json(data: &[u8]) -> RswResult<RuleLibrary> {
        let file: RuleFile = serde_json::from_slice(data)
            .map_err(|e| RswappalyzerError::RuleParseError(format!("规则 JSON 解析失败：{}", e)))?;

        let category_rules = if file.categories.is_empty() {
            default_categories()
        } else {
            // Wappalyzer 分类文件以 ID 作为键，条目本身不带 id
            file.categories
                .into_iter()
                .map(|(key, mut cat)| {
                    if cat.id == 0 {
                        cat.id = key.parse().unwrap_or(0);
                    }
                    (key, cat)
                })
                .collect()
        };

        debug!(
            "规则解析完成，技术规则数：{}，分类规则数：{}",
            file.technologies.len(),
            category_rules.len()
        );

        Ok(RuleLibrary {
            tech_rules: file.technologies,
            category_rules,
        })
    }
}

/// Wappalyzer 分类表（规则源未携带分类时使用）
static DEFAULT_CATEGORIES: Lazy<Vec<(u32, &'static str)>> = Lazy::new(|| {
    vec![
        (1, "CMS"), (2, "Message boards"), (3, "Database managers"), (4, "Documentation"),
        (5, "Widgets"), (6, "Ecommerce"), (7, "Photo galleries"), (8, "Wikis"),
        (9, "Hosting panels"), (10, "Analytics"), (11, "Blogs"), (12, "JavaScript frameworks"),
        (13, "Issue trackers"), (14, "Video players"), (15, "Comment systems"), (16, "Security"),
        (17, "Font scripts"), (18, "Web frameworks"), (19, "Miscellaneous"), (20, "Editors"),
        (21, "LMS"), (22, "Web servers"), (23, "Caching"), (24, "Rich text editors"),
        (25, "JavaScript graphics"), (26, "Mobile frameworks"), (27, "Programming languages"),
        (28, "Operating systems"), (29, "Search engines"), (30, "Webmail"), (31, "CDN"),
        (32, "Marketing automation"), (33, "Web server extensions"), (34, "Databases"),
        (35, "Maps"), (36, "Advertising"), (37, "Network devices"), (38, "Media servers"),
        (39, "Webcams"), (41, "Payment processors"), (42, "Tag managers"), (44, "CI"),
        (45, "Control systems"), (46, "Remote access"), (47, "Development"),
        (48, "Network storage"), (49, "Feed readers"), (50, "Document management systems"),
        (51, "Page builders"), (52, "Live chat"), (53, "CRM"), (55, "Accounting"),
        (56, "Cryptominers"), (57, "Static site generator"), (58, "User onboarding"),
        (59, "JavaScript libraries"), (60, "Containers"), (61, "SaaS"), (62, "PaaS"), (63, "IaaS"),
        (64, "Reverse proxies"), (65, "Load balancers"), (66, "UI frameworks"),
        (67, "Cookie compliance"), (68, "Accessibility"), (69, "Authentication"),
        (70, "SSL/TLS certificate authorities"), (71, "Affiliate programs"),
        (72, "Appointment scheduling"), (73, "Surveys"), (74, "A/B Testing"), (75, "Email"),
        (76, "Personalisation"), (77, "Retargeting"), (78, "RUM"), (79, "Geolocation"),
        (88, "Hosting"), (89, "Translation"), (90, "Reviews"), (92, "Performance"),
    ]
});

fn default_categories() -> HashMap<String, CategoryRule> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(id, name)| {
            (
                id.to_string(),
                CategoryRule {
                    name: name.to_string(),
                    priority: None,
                    id: *id,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;

    #[test]
    fn test_embedded_rules_parse() {
        let lib = RuleLoader::load_embedded().unwrap();
        assert!(lib.tech_rules.contains_key("Nginx"));
        assert!(lib.tech_rules.contains_key("jQuery"));
        let names = lib.category_names();
        assert_eq!(names[&22], "Web servers");
        assert_eq!(names[&19], "Miscellaneous");
    }

    #[test]
    fn test_wappalyzergo_file_uses_default_categories() {
        let data = br#"{
            "apps": {
                "Express": { "cats": [18, 22], "headers": { "X-Powered-By": "^Express$" } }
            }
        }"#;
        let lib = RuleLoader::parse_json(data).unwrap();
        assert_eq!(lib.tech_rules["Express"].category_ids, vec![18, 22]);
        assert_eq!(lib.category_names()[&18], "Web frameworks");
    }

    #[test]
    fn test_category_id_taken_from_key() {
        let data = br#"{
            "technologies": {},
            "categories": { "42": { "name": "Tag managers", "priority": 9 } }
        }"#;
        let lib = RuleLoader::parse_json(data).unwrap();
        assert_eq!(lib.category_rules["42"].id, 42);
    }

    #[test]
    fn test_malformed_rule_file() {
        let err = RuleLoader::parse_json(b"{\"apps\": 3}").unwrap_err();
        assert!(matches!(err, RswappalyzerError::RuleParseError(_)));
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprints.json");
        tokio::fs::write(&path, br#"{"apps": {"Caddy": {"cats": [22], "headers": {"Server": "^Caddy$"}}}}"#)
            .await
            .unwrap();

        let config = ConfigManager::custom()
            .rule_source(RuleSource::LocalFile(path))
            .build();
        let lib = RuleLoader::load(&config).await.unwrap();
        assert!(lib.tech_rules.contains_key("Caddy"));
    }

    #[tokio::test]
    async fn test_remote_source_prefers_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("rules.mp");
        let cached = RuleLoader::parse_json(br#"{"apps": {"Cached": {"cats": [19]}}}"#).unwrap();
        RuleCacheManager::save_to_cache(&cache_path, &cached).await.unwrap();

        // 远程地址不可达，命中缓存时不会发起请求
        let config = ConfigManager::custom()
            .rule_source(RuleSource::Remote("http://127.0.0.1:1/rules.json".to_string()))
            .rule_cache_path(cache_path)
            .build();
        let lib = RuleLoader::load(&config).await.unwrap();
        assert!(lib.tech_rules.contains_key("Cached"));
    }
}
