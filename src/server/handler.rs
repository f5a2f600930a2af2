//! `GET /site_info` 请求处理
//!
//! - url 缺失或非法：400，不进入工作池
//! - 其余情况提交到工作池并等待结果，无论分析成功与否均返回 200
//! - 工作池饱和/关闭：503；超过等待上限：504

use axum::{
    Json,
    extract::{RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use super::AppState;
use crate::error::RswappalyzerError;
use crate::validator::{AnalysisRequest, INVALID_URL_MESSAGE};
use crate::worker::AnalysisResult;

pub async fn site_info(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let raw_url = query.as_deref().and_then(url_param);
    let request = match AnalysisRequest::parse(raw_url.as_deref()) {
        Ok(request) => request,
        Err(err) => {
            debug!("拒绝请求：{:?}，原因：{}", raw_url, err);
            return error_response(StatusCode::BAD_REQUEST, INVALID_URL_MESSAGE);
        }
    };

    let raw = request.raw.clone();
    let worker = state.worker.clone();
    let ticket = match state.pool.submit(async move { worker.analyze(request).await }) {
        Ok(ticket) => ticket,
        Err(err) => {
            warn!("工作池拒绝任务：{}，原因：{}", raw, err);
            return error_response(StatusCode::SERVICE_UNAVAILABLE, &err.to_string());
        }
    };

    let outcome = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, ticket.wait())
            .await
            .unwrap_or(Err(RswappalyzerError::Timeout(limit))),
        None => ticket.wait().await,
    };

    match outcome {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err @ RswappalyzerError::Timeout(_)) => {
            warn!("等待分析结果超时：{}", raw);
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "url": raw, "error": err.to_string() })),
            )
                .into_response()
        }
        // 任务在工作者边界之外异常终止，同样作为业务失败返回
        Err(err) => (StatusCode::OK, Json(AnalysisResult::failure(raw, &err))).into_response(),
    }
}

/// 宽松解析查询串，取第一个 url 参数
fn url_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
