//! HTTP service
//! 对外只暴露 `GET /site_info`，工作池与分析工作者由调用方显式构造后注入

pub mod handler;

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::GlobalConfig;
use crate::detector::TechDetector;
use crate::error::RswResult;
use crate::fetcher::HttpPageFetcher;
use crate::pool::WorkerPool;
use crate::worker::AnalysisWorker;

/// 请求处理器共享状态
#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: WorkerPool,
    pub worker: AnalysisWorker,
    /// 等待分析结果的上限，None 表示一直等待
    pub request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(pool: WorkerPool, worker: AnalysisWorker, request_timeout: Option<Duration>) -> Self {
        Self {
            pool,
            worker,
            request_timeout,
        }
    }
}

/// 按配置装配完整服务状态：规则 -> 检测器 -> 抓取器 -> 工作池
pub async fn build_state(config: &GlobalConfig) -> RswResult<AppState> {
    let detector = TechDetector::new(config).await?;
    info!("规则加载完成，共{}项技术", detector.technology_count());

    let fetcher = HttpPageFetcher::new(config)?;
    let worker = AnalysisWorker::new(Arc::new(fetcher), Arc::new(detector));
    let pool = WorkerPool::new(config.pool_size, config.max_queue_depth);

    Ok(AppState::new(pool, worker, config.request_wait_limit()))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/site_info", get(handler::site_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动服务，Ctrl-C 后停止接收连接并排空工作池
pub async fn serve(config: &GlobalConfig, state: AppState) -> RswResult<()> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!(
        "服务已启动：http://{}，工作池容量={}",
        listener.local_addr()?,
        state.pool.capacity()
    );

    let pool = state.pool.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown().await;
    info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // 无法监听信号时不主动停机
        error!("监听退出信号失败：{}", e);
        std::future::pending::<()>().await;
    }
    info!("收到退出信号，开始优雅停机");
}
