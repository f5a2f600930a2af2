//! Analysis worker
//! 单次 抓取 -> 指纹识别 流程，所有结果（包括 panic）都归一为 `AnalysisResult`

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{RswResult, RswappalyzerError};
use crate::fetcher::PageFetcher;
use crate::fingerprint::{Fingerprinter, TechMap};
use crate::validator::AnalysisRequest;

/// 单个 URL 的分析结果
///
/// 成功与失败都是合法的业务结果，序列化为
/// `{"url", "analysis"}` 或 `{"url", "error"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    Success { url: String, analysis: TechMap },
    Failure { url: String, error: String },
}

impl AnalysisResult {
    pub fn success(url: impl Into<String>, analysis: TechMap) -> Self {
        Self::Success {
            url: url.into(),
            analysis,
        }
    }

    pub fn failure(url: impl Into<String>, err: &RswappalyzerError) -> Self {
        Self::Failure {
            url: url.into(),
            error: err.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Success { url, .. } | Self::Failure { url, .. } => url,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// 分析工作者：持有抓取器与识别引擎，可廉价克隆后投递到工作池
#[derive(Clone)]
pub struct AnalysisWorker {
    fetcher: Arc<dyn PageFetcher>,
    fingerprinter: Arc<dyn Fingerprinter>,
}

impl fmt::Debug for AnalysisWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisWorker").finish_non_exhaustive()
    }
}

impl AnalysisWorker {
    pub fn new(fetcher: Arc<dyn PageFetcher>, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        Self {
            fetcher,
            fingerprinter,
        }
    }

    /// 分析单个 URL，永不向调用方抛出错误或 panic
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisResult {
        let AnalysisRequest { raw, url } = request;

        match AssertUnwindSafe(self.fetch_and_fingerprint(&url))
            .catch_unwind()
            .await
        {
            Ok(Ok(analysis)) => {
                info!("分析完成：{}，识别技术{}项", raw, analysis.len());
                AnalysisResult::success(raw, analysis)
            }
            Ok(Err(err)) => {
                warn!("分析失败：{}，原因：{}", raw, err);
                AnalysisResult::failure(raw, &err)
            }
            Err(panic) => {
                let err = RswappalyzerError::InternalFault(panic_message(panic.as_ref()));
                error!("分析过程异常：{}，原因：{}", raw, err);
                AnalysisResult::failure(raw, &err)
            }
        }
    }

    async fn fetch_and_fingerprint(&self, url: &Url) -> RswResult<TechMap> {
        // 抓取失败直接短路，不进入识别阶段
        let page = self.fetcher.fetch(url).await?;
        debug!("开始指纹识别：{}", page.url);

        // 正则匹配属于 CPU 密集计算，放到阻塞线程池
        let fingerprinter = Arc::clone(&self.fingerprinter);
        tokio::task::spawn_blocking(move || fingerprinter.fingerprint(&page))
            .await
            .map_err(|join_err| {
                if join_err.is_panic() {
                    RswappalyzerError::InternalFault(panic_message(join_err.into_panic().as_ref()))
                } else {
                    RswappalyzerError::InternalFault(join_err.to_string())
                }
            })?
    }
}

/// 提取 panic 载荷中的文本
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchedPage;
    use crate::fingerprint::TechInfo;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum FetchBehavior {
        Page,
        Fail,
        Panic,
    }

    struct StubFetcher(FetchBehavior);

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> RswResult<FetchedPage> {
            match self.0 {
                FetchBehavior::Page => Ok(FetchedPage {
                    url: url.clone(),
                    status: 200,
                    headers: HeaderMap::new(),
                    body: b"<html></html>".to_vec(),
                }),
                FetchBehavior::Fail => Err(RswappalyzerError::FetchError(
                    "connection refused".to_string(),
                )),
                FetchBehavior::Panic => panic!("fetcher exploded"),
            }
        }
    }

    enum EngineBehavior {
        Detect,
        Fail,
        Panic,
    }

    struct StubEngine {
        behavior: EngineBehavior,
        calls: AtomicUsize,
    }

    impl StubEngine {
        fn new(behavior: EngineBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Fingerprinter for StubEngine {
        fn fingerprint(&self, _page: &FetchedPage) -> RswResult<TechMap> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                EngineBehavior::Detect => {
                    let mut map = TechMap::new();
                    map.insert(
                        "Nginx".to_string(),
                        TechInfo {
                            version: Some("1.25.3".to_string()),
                            categories: ["Web servers".to_string()].into_iter().collect(),
                        },
                    );
                    Ok(map)
                }
                EngineBehavior::Fail => Err(RswappalyzerError::AnalysisError(
                    "unsupported content type: image/png".to_string(),
                )),
                EngineBehavior::Panic => panic!("engine exploded"),
            }
        }
    }

    fn request(raw: &str) -> AnalysisRequest {
        AnalysisRequest::parse(Some(raw)).unwrap()
    }

    #[tokio::test]
    async fn test_success_echoes_raw_url() {
        let engine = StubEngine::new(EngineBehavior::Detect);
        let worker = AnalysisWorker::new(Arc::new(StubFetcher(FetchBehavior::Page)), engine.clone());

        let result = worker.analyze(request("https://example.com")).await;

        assert!(result.is_success());
        assert_eq!(result.url(), "https://example.com");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["analysis"]["Nginx"]["version"], "1.25.3");
        assert_eq!(json["analysis"]["Nginx"]["categories"][0], "Web servers");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_fingerprinting() {
        let engine = StubEngine::new(EngineBehavior::Detect);
        let worker = AnalysisWorker::new(Arc::new(StubFetcher(FetchBehavior::Fail)), engine.clone());

        let result = worker.analyze(request("https://example.com")).await;

        assert_eq!(
            result,
            AnalysisResult::Failure {
                url: "https://example.com".to_string(),
                error: "fetch failed: connection refused".to_string(),
            }
        );
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_analysis_failure_is_business_result() {
        let engine = StubEngine::new(EngineBehavior::Fail);
        let worker = AnalysisWorker::new(Arc::new(StubFetcher(FetchBehavior::Page)), engine.clone());

        let result = worker.analyze(request("https://example.com")).await;

        assert!(!result.is_success());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["error"].as_str().unwrap().starts_with("analysis failed"));
        assert!(json.get("analysis").is_none());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panics_become_internal_fault() {
        let cases: Vec<(FetchBehavior, EngineBehavior, &str)> = vec![
            (FetchBehavior::Panic, EngineBehavior::Detect, "fetcher exploded"),
            (FetchBehavior::Page, EngineBehavior::Panic, "engine exploded"),
        ];

        for (fetch, engine, expected) in cases {
            let worker = AnalysisWorker::new(Arc::new(StubFetcher(fetch)), StubEngine::new(engine));
            let result = worker.analyze(request("https://example.com")).await;

            match result {
                AnalysisResult::Failure { url, error } => {
                    assert_eq!(url, "https://example.com");
                    assert_eq!(error, format!("internal fault: {}", expected));
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    #[test]
    fn test_result_deserializes_by_shape() {
        let ok: AnalysisResult =
            serde_json::from_str(r#"{"url":"https://example.com","analysis":{}}"#).unwrap();
        assert_eq!(ok, AnalysisResult::success("https://example.com", TechMap::new()));

        let failed: AnalysisResult =
            serde_json::from_str(r#"{"url":"https://example.com","error":"boom"}"#).unwrap();
        assert!(!failed.is_success());
    }
}
