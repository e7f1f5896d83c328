//! HTTP 状态接口模块
//!
//! 为外部监督者提供只读的存活和状态查询接口：
//! - `GET /healthz` 存活探测，存活时 200，否则 503
//! - `GET /status` 完整状态报告
//! - `GET /status/{name}` 单个目标状态

pub mod handlers;

use crate::config::StatusConfig;
use crate::error::{ConfigError, Result};
use crate::status::StatusManager;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// 构建状态接口路由
pub fn router(status: Arc<StatusManager>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/status", get(handlers::status_report))
        .route("/status/{name}", get(handlers::target_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

/// 状态接口服务器
pub struct StatusServer {
    config: StatusConfig,
    status: Arc<StatusManager>,
}

impl StatusServer {
    /// 创建状态接口服务器
    pub fn new(config: StatusConfig, status: Arc<StatusManager>) -> Self {
        Self { config, status }
    }

    /// 绑定监听地址，地址无效或端口被占用时返回配置错误
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.socket_addr().map_err(ConfigError::ValidationError)?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            ConfigError::ValidationError(format!("状态接口无法监听 {}: {}", addr, e))
        })?;
        Ok(listener)
    }

    /// 在给定监听器上提供服务，直到收到关闭信号
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("状态接口已启动: http://{}", addr);

        axum::serve(listener, router(self.status))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("接收到关闭信号，正在关闭状态接口...");
            })
            .await?;

        info!("状态接口已关闭");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bind_rejects_invalid_address() {
        let config = StatusConfig {
            bind_address: "not an address".to_string(),
            ..Default::default()
        };
        let server = StatusServer::new(config, Arc::new(StatusManager::new(Duration::from_secs(1))));
        let err = server.bind().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let config = StatusConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        let server = StatusServer::new(config, Arc::new(StatusManager::new(Duration::from_secs(1))));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.serve(listener, rx));

        let response = reqwest::get(format!("http://{}/healthz", addr)).await.unwrap();
        assert_eq!(response.status(), 200);

        tx.send(()).unwrap();
        let joined = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(joined, Ok(Ok(Ok(())))));
    }
}
