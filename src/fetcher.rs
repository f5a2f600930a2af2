//! Page fetcher
//! 页面抓取器：给定 URL 返回响应体与响应头
//!
//! 抓取失败（DNS/连接/TLS/超时/非 2xx/响应体超限）统一以 `FetchError` 返回，不做重试

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, redirect};
use tracing::debug;
use url::Url;

use crate::config::GlobalConfig;
use crate::error::{RswResult, RswappalyzerError, error_chain};

/// 最大重定向次数
const MAX_REDIRECTS: usize = 10;

/// 抓取到的页面
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// 跟随重定向后的最终地址
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// 页面抓取接口
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> RswResult<FetchedPage>;
}

/// 基于 reqwest 的 HTTP(S) 抓取器
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpPageFetcher {
    pub fn new(config: &GlobalConfig) -> RswResult<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent.as_str())
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn oversized(&self, url: &Url) -> RswappalyzerError {
        RswappalyzerError::FetchError(format!(
            "response from {} exceeds {} bytes",
            url, self.max_body_bytes
        ))
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url) -> RswResult<FetchedPage> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RswappalyzerError::FetchError(error_chain(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RswappalyzerError::FetchError(format!(
                "{} returned HTTP status {}",
                response.url(),
                status
            )));
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes as u64)
        {
            return Err(self.oversized(url));
        }

        // 分块读取，超限立即中止
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RswappalyzerError::FetchError(error_chain(&e)))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(self.oversized(url));
            }
            body.extend_from_slice(&chunk);
        }

        debug!("抓取完成：{}，状态码={}，响应体{}字节", response.url(), status, body.len());

        Ok(FetchedPage {
            url: response.url().clone(),
            status: status.as_u16(),
            headers: response.headers().clone(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    fn fetcher(max_body_bytes: usize) -> HttpPageFetcher {
        HttpPageFetcher::new(&ConfigManager::custom().http_timeout(5).max_body_bytes(max_body_bytes).build()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_follows_redirect() {
        let router = Router::new()
            .route("/", get(|| async { axum::response::Redirect::temporary("/home") }))
            .route("/home", get(|| async { ([("server", "nginx/1.25.3")], "<html>hi</html>") }));
        let base = serve(router).await;

        let page = fetcher(1024).fetch(&base).await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.url.path(), "/home");
        assert_eq!(page.headers["server"], "nginx/1.25.3");
        assert_eq!(page.body, b"<html>hi</html>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let router = Router::new().route("/", get(|| async { (StatusCode::NOT_FOUND, "gone").into_response() }));
        let base = serve(router).await;

        let err = fetcher(1024).fetch(&base).await.unwrap_err();
        assert!(matches!(&err, RswappalyzerError::FetchError(msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn test_oversized_body_is_fetch_error() {
        let router = Router::new().route("/", get(|| async { "x".repeat(4096) }));
        let base = serve(router).await;

        let err = fetcher(100).fetch(&base).await.unwrap_err();
        assert!(matches!(&err, RswappalyzerError::FetchError(msg) if msg.contains("exceeds")));
    }

    #[tokio::test]
    async fn test_connection_refused_is_fetch_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{}/", addr)).unwrap();
        let err = fetcher(1024).fetch(&url).await.unwrap_err();
        assert!(matches!(err, RswappalyzerError::FetchError(_)));
    }
}
