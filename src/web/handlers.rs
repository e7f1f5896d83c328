//! 状态接口路由处理函数

use crate::status::StatusManager;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;

/// 错误响应
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// 存活探测：存活时返回 200，否则 503
pub async fn healthz(State(status): State<Arc<StatusManager>>) -> impl IntoResponse {
    let liveness = status.liveness().await;
    let code = if liveness.alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(liveness))
}

/// 完整状态报告
pub async fn status_report(State(status): State<Arc<StatusManager>>) -> impl IntoResponse {
    Json(status.report().await)
}

/// 单个目标状态，目标不存在时返回 404
pub async fn target_status(
    State(status): State<Arc<StatusManager>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match status.target(&name).await {
        Some(target) => Json(target).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("目标不存在: {}", name),
            }),
        )
            .into_response(),
    }
}
