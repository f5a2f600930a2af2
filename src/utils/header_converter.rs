//! Header格式转换工具
//! HeaderMap -> 小写键的多值表，并从 Set-Cookie 中解析 cookie 名称与值

use std::collections::HashMap;
use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::warn;

/// 单次响应处理的 Header 条目上限
const MAX_HEADER_ENTRIES: usize = 1000;

/// Header转换工具
pub struct HeaderConverter;

impl HeaderConverter {
    /// 将HeaderMap转换为HashMap<String, Vec<String>>（键小写，非 UTF-8 值按有损方式保留）
    pub fn to_hashmap(header_map: &HeaderMap) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();

        for (index, (key, value)) in header_map.iter().enumerate() {
            if index >= MAX_HEADER_ENTRIES {
                warn!("Header条目超过{}条，其余忽略", MAX_HEADER_ENTRIES);
                break;
            }
            let value_str = String::from_utf8_lossy(value.as_bytes()).into_owned();
            map.entry(key.as_str().to_lowercase())
                .or_default()
                .push(value_str);
        }

        map
    }

    /// 解析 Set-Cookie，返回 cookie 名（小写）-> 值
    pub fn cookies(header_map: &HeaderMap) -> HashMap<String, String> {
        header_map
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|raw| {
                let pair = raw.split(';').next()?;
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_lowercase(), value.trim().to_string()))
            })
            .collect()
    }
}
